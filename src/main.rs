#![cfg_attr(
    all(not(debug_assertions), target_os = "windows"),
    windows_subsystem = "windows"
)]

mod commands;
mod state;

use server_launcher::utils::init_tracing;
use server_launcher::LauncherConfig;
use state::AppState;
use tauri::Manager;

fn main() {
    init_tracing("info");

    let config = LauncherConfig::default();
    tracing::info!(data_dir = %config.data_dir().display(), "启动服务器启动器");

    tauri::Builder::default()
        .setup(move |app| {
            let state = AppState::new(config);
            let process_manager = state.process_manager.clone();
            tauri::async_runtime::block_on(process_manager.start_reconciler());
            app.manage(state);

            // 关闭窗口时只停止后台检查，已启动的服务器继续运行
            if let Some(window) = app.get_window("main") {
                let app_handle = app.handle();
                window.on_window_event(move |event| {
                    if let tauri::WindowEvent::CloseRequested { .. } = event {
                        let state = app_handle.state::<AppState>();
                        tauri::async_runtime::block_on(state.process_manager.shutdown());
                    }
                });
            }

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Server commands
            commands::get_servers,
            commands::add_server,
            commands::update_server,
            commands::remove_server,
            commands::start_server,
            commands::stop_server,
            commands::stop_all_servers,
            commands::get_server_info,

            // App commands
            commands::get_settings,
            commands::save_settings,
            commands::get_app_version,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
