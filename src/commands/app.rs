use crate::state::AppState;
use server_launcher::error::LauncherError;
use server_launcher::models::AppVersion;
use server_launcher::services::{app_version, Settings};
use tauri::State;

#[tauri::command]
pub async fn get_settings(state: State<'_, AppState>) -> Result<Settings, LauncherError> {
    Ok(state.settings.load())
}

#[tauri::command]
pub async fn save_settings(settings: Settings, state: State<'_, AppState>) -> Result<(), LauncherError> {
    state.settings.save(&settings)
}

#[tauri::command]
pub fn get_app_version() -> AppVersion {
    app_version()
}
