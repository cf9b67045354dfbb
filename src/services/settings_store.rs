use crate::error::{LauncherError, Result};
use crate::utils::write_atomic;
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;

pub type Settings = Map<String, Value>;

/// 前端设置，原样保存为一个 JSON 对象
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Settings {
        if !self.path.exists() {
            return Settings::new();
        }

        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str::<Settings>(&content).map_err(|e| e.to_string()));

        parsed.unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), "读取设置失败: {}", e);
            Settings::new()
        })
    }

    pub fn save(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &json).map_err(LauncherError::Persist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn saves_arbitrary_keys() {
        let dir = tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("settings.json"));
        assert!(store.load().is_empty());

        let mut settings = Settings::new();
        settings.insert("theme".to_string(), json!("dark"));
        settings.insert("columns".to_string(), json!([1, 2, 3]));
        store.save(&settings).unwrap();

        assert_eq!(store.load(), settings);
    }

    #[test]
    fn non_object_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2]").unwrap();

        assert!(SettingsStore::new(path).load().is_empty());
    }
}
