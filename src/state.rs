use server_launcher::config::LauncherConfig;
use server_launcher::services::{ProcessManager, SettingsStore};
use std::sync::Arc;

pub struct AppState {
    pub process_manager: Arc<ProcessManager>,
    pub settings: SettingsStore,
}

impl AppState {
    pub fn new(config: LauncherConfig) -> Self {
        let settings = SettingsStore::new(config.settings_path());
        Self {
            process_manager: Arc::new(ProcessManager::new(config)),
            settings,
        }
    }
}
