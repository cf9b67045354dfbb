use crate::error::{LauncherError, Result};
use crate::models::ServerDefinition;
use crate::utils::write_atomic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const REGISTRY_VERSION: u32 = 1;

/// 服务器列表及自增 ID 计数器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub next_id: u32,
    #[serde(default)]
    pub servers: Vec<ServerDefinition>,
}

fn current_version() -> u32 {
    REGISTRY_VERSION
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            next_id: 1,
            servers: Vec::new(),
        }
    }
}

impl Registry {
    pub fn from_servers(servers: Vec<ServerDefinition>) -> Self {
        let mut registry = Self {
            servers,
            ..Default::default()
        };
        registry.normalize();
        registry
    }

    /// 保证 next_id 大于所有已有 ID，删除过的 ID 不会被再次分配。
    /// 旧版按 `len + 1` 分配 ID，删除后再添加会产生重复，重复的记录改用新 ID
    fn normalize(&mut self) {
        let floor = self.servers.iter().map(|s| s.id).max().unwrap_or(0).saturating_add(1);
        self.next_id = self.next_id.max(floor);
        self.version = REGISTRY_VERSION;

        let mut seen = HashSet::new();
        for index in 0..self.servers.len() {
            let old_id = self.servers[index].id;
            if seen.insert(old_id) {
                continue;
            }

            let new_id = self.allocate_id();
            seen.insert(new_id);
            self.servers[index].id = new_id;
            tracing::warn!(
                old_id,
                new_id,
                name = %self.servers[index].name,
                "服务器 ID 重复，已重新分配"
            );
        }
    }

    pub fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        id
    }

    pub fn find(&self, id: u32) -> Option<&ServerDefinition> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut ServerDefinition> {
        self.servers.iter_mut().find(|s| s.id == id)
    }

    pub fn remove(&mut self, id: u32) -> Option<ServerDefinition> {
        let index = self.servers.iter().position(|s| s.id == id)?;
        Some(self.servers.remove(index))
    }
}

/// 服务器列表的持久化，整份 JSON 原子重写
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载服务器列表，文件缺失或损坏时返回空列表，不影响启动
    pub fn load(&self) -> Registry {
        if !self.path.exists() {
            return Registry::default();
        }

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "读取服务器列表失败: {}", e);
                return Registry::default();
            }
        };

        match Self::parse(&content) {
            Ok(registry) => {
                tracing::debug!(count = registry.servers.len(), "已加载服务器列表");
                registry
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "解析服务器列表失败: {}", e);
                self.backup_corrupt();
                Registry::default()
            }
        }
    }

    /// 兼容旧格式：直接是服务器数组，没有外层版本信息
    fn parse(content: &str) -> serde_json::Result<Registry> {
        let value: Value = serde_json::from_str(content)?;

        let mut registry = if value.is_array() {
            Registry::from_servers(serde_json::from_value(value)?)
        } else {
            serde_json::from_value(value)?
        };
        registry.normalize();
        Ok(registry)
    }

    // 损坏的文件会在下一次保存时被覆盖，先留一份副本
    fn backup_corrupt(&self) {
        let mut backup = self.path.clone().into_os_string();
        backup.push(".bak");
        if let Err(e) = fs::copy(&self.path, &backup) {
            tracing::warn!("备份损坏的服务器列表失败: {}", e);
        }
    }

    pub fn save(&self, registry: &Registry) -> Result<()> {
        let json = serde_json::to_vec_pretty(registry)?;
        write_atomic(&self.path, &json).map_err(LauncherError::Persist)?;
        tracing::debug!(count = registry.servers.len(), "已保存服务器列表");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewServer, ServerStatus, StopMethod};
    use tempfile::tempdir;

    fn sample_registry() -> Registry {
        let mut registry = Registry::default();
        for name in ["Survival", "Creative"] {
            let id = registry.allocate_id();
            registry
                .servers
                .push(ServerDefinition::new(id, NewServer::new(name, "/srv/run.sh", "desc")));
        }
        registry
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("servers.json"));

        let registry = store.load();
        assert!(registry.servers.is_empty());
        assert_eq!(registry.next_id, 1);
    }

    #[test]
    fn corrupt_file_loads_empty_and_keeps_backup() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(&path, "{ not json").unwrap();

        let registry = RegistryStore::new(&path).load();
        assert!(registry.servers.is_empty());
        assert!(dir.path().join("servers.json.bak").exists());
    }

    #[test]
    fn save_then_load_is_fixed_point() {
        let dir = tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("servers.json"));

        store.save(&sample_registry()).unwrap();
        let first_bytes = fs::read_to_string(store.path()).unwrap();
        let loaded = store.load();

        store.save(&loaded).unwrap();
        let second_bytes = fs::read_to_string(store.path()).unwrap();

        let first: Value = serde_json::from_str(&first_bytes).unwrap();
        let second: Value = serde_json::from_str(&second_bytes).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.load(), loaded);
    }

    #[test]
    fn legacy_array_is_migrated() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(
            &path,
            r#"[
                {"id": 1, "name": "A", "bat_path": "a.bat", "description": "",
                 "created_at": "2024-01-01T00:00:00.512000", "status": "running"},
                {"id": 3, "name": "C", "bat_path": "c.bat", "description": "",
                 "stop_method": "stop_command", "display_cmd": true,
                 "created_at": "2024-01-02T00:00:00Z", "status": "stopped"}
            ]"#,
        )
        .unwrap();

        let registry = RegistryStore::new(&path).load();
        assert_eq!(registry.servers.len(), 2);
        assert_eq!(registry.next_id, 4);
        assert_eq!(registry.servers[0].status, ServerStatus::Running);
        assert_eq!(registry.servers[1].stop_method, StopMethod::Graceful);
        assert!(registry.servers[1].display_console);
    }

    #[test]
    fn duplicate_legacy_ids_are_reassigned() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(
            &path,
            r#"[
                {"id": 1, "name": "A", "bat_path": "a.bat"},
                {"id": 3, "name": "B", "bat_path": "b.bat"},
                {"id": 3, "name": "C", "bat_path": "c.bat"}
            ]"#,
        )
        .unwrap();

        let mut registry = RegistryStore::new(&path).load();
        let ids: Vec<u32> = registry.servers.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(registry.find(4).unwrap().name, "C");
        assert_eq!(registry.find(3).unwrap().name, "B");
        assert_eq!(registry.allocate_id(), 5);
    }

    #[test]
    fn unknown_stop_method_keeps_the_rest_of_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("servers.json");
        fs::write(
            &path,
            r#"[
                {"id": 1, "name": "A", "bat_path": "a.bat", "stop_method": "stop_command"},
                {"id": 2, "name": "B", "bat_path": "b.bat", "stop_method": "close_cmd"}
            ]"#,
        )
        .unwrap();

        let registry = RegistryStore::new(&path).load();
        assert_eq!(registry.servers.len(), 2);
        assert_eq!(registry.servers[0].stop_method, StopMethod::Graceful);
        assert_eq!(registry.servers[1].stop_method, StopMethod::Force);
        assert!(!dir.path().join("servers.json.bak").exists());
    }

    #[test]
    fn next_id_never_goes_below_existing_ids() {
        let json = r#"{"version": 1, "next_id": 2, "servers": [
            {"id": 5, "name": "E", "launch_path": "e.sh"}
        ]}"#;

        let registry = RegistryStore::parse(json).unwrap();
        assert_eq!(registry.next_id, 6);
    }
}
