use crate::state::AppState;
use server_launcher::error::LauncherError;
use server_launcher::models::{NewServer, ServerDefinition, ServerInfo, ServerPatch};
use tauri::State;

#[tauri::command]
pub async fn get_servers(state: State<'_, AppState>) -> Result<Vec<ServerDefinition>, LauncherError> {
    Ok(state.process_manager.list().await)
}

#[tauri::command]
pub async fn add_server(
    server: NewServer,
    state: State<'_, AppState>,
) -> Result<ServerDefinition, LauncherError> {
    state.process_manager.add(server).await
}

#[tauri::command]
pub async fn update_server(
    server_id: u32,
    patch: ServerPatch,
    state: State<'_, AppState>,
) -> Result<ServerDefinition, LauncherError> {
    state.process_manager.update(server_id, patch).await
}

#[tauri::command]
pub async fn remove_server(server_id: u32, state: State<'_, AppState>) -> Result<(), LauncherError> {
    state.process_manager.remove(server_id).await
}

#[tauri::command]
pub async fn start_server(
    server_id: u32,
    state: State<'_, AppState>,
) -> Result<ServerDefinition, LauncherError> {
    state.process_manager.start(server_id).await
}

/// 可能耗时数秒：graceful 方式会等待宽限期
#[tauri::command]
pub async fn stop_server(server_id: u32, state: State<'_, AppState>) -> Result<(), LauncherError> {
    state.process_manager.stop(server_id).await
}

#[tauri::command]
pub async fn stop_all_servers(state: State<'_, AppState>) -> Result<(), LauncherError> {
    state.process_manager.stop_all().await
}

#[tauri::command]
pub async fn get_server_info(
    server_id: u32,
    state: State<'_, AppState>,
) -> Result<ServerInfo, LauncherError> {
    state.process_manager.info(server_id).await
}
