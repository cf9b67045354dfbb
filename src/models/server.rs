use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_SERVER_IP: &str = "127.0.0.1";
pub const DEFAULT_SERVER_PORT: u16 = 25565;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StopMethod {
    /// 等待宽限期后再强制结束
    #[default]
    Graceful,
    /// 立即结束整个进程树
    Force,
}

// 旧版只有 stop_command 走正常停止，其余取值一律强制结束
impl<'de> Deserialize<'de> for StopMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match Option::<String>::deserialize(deserializer)? {
            Some(raw) => raw,
            None => return Ok(StopMethod::default()),
        };

        Ok(match raw.as_str() {
            "graceful" | "stop_command" => StopMethod::Graceful,
            "force" => StopMethod::Force,
            other => {
                tracing::warn!(stop_method = other, "未知的停止方式，按强制结束处理");
                StopMethod::Force
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Stopped,
    Running,
}

/// 持久化的服务器定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerDefinition {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "bat_path")]
    pub launch_path: String,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub stop_method: StopMethod,
    #[serde(default, alias = "display_cmd")]
    pub display_console: bool,
    #[serde(default = "default_server_ip")]
    pub server_ip: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    #[serde(default)]
    pub status: ServerStatus,
    #[serde(default = "Utc::now", deserialize_with = "de_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
}

fn default_server_ip() -> String {
    DEFAULT_SERVER_IP.to_string()
}

fn default_server_port() -> u16 {
    DEFAULT_SERVER_PORT
}

/// 旧版记录的时间是不带时区的本地时间，例如 2024-03-01T10:00:00.123456
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some(
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    )
}

fn de_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("无法解析时间: {}", raw)))
}

fn de_opt_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("无法解析时间: {}", raw))),
        None => Ok(None),
    }
}

impl ServerDefinition {
    pub fn new(id: u32, fields: NewServer) -> Self {
        Self {
            id,
            name: fields.name.trim().to_string(),
            description: fields.description,
            launch_path: fields.launch_path.trim().to_string(),
            icon_path: fields.icon_path,
            stop_method: fields.stop_method,
            display_console: fields.display_console,
            server_ip: fields.server_ip.unwrap_or_else(default_server_ip),
            server_port: fields.server_port.unwrap_or(DEFAULT_SERVER_PORT),
            status: ServerStatus::Stopped,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn launch_path(&self) -> &Path {
        Path::new(&self.launch_path)
    }

    /// 相对路径以 base 为基准解析成绝对路径，子进程会在另一个目录中启动
    pub fn resolved_launch_path(&self, base: &Path) -> PathBuf {
        let path = self.launch_path();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }

    /// 只应用补丁中提供的字段，返回是否有字段真正发生变化
    pub fn apply(&mut self, patch: ServerPatch) -> bool {
        let mut changed = false;

        if let Some(name) = patch.name {
            changed |= replace(&mut self.name, name.trim().to_string());
        }
        if let Some(description) = patch.description {
            changed |= replace(&mut self.description, description);
        }
        if let Some(launch_path) = patch.launch_path {
            changed |= replace(&mut self.launch_path, launch_path.trim().to_string());
        }
        if let Some(icon_path) = patch.icon_path {
            changed |= replace(&mut self.icon_path, Some(icon_path));
        }
        if let Some(stop_method) = patch.stop_method {
            changed |= replace(&mut self.stop_method, stop_method);
        }
        if let Some(display_console) = patch.display_console {
            changed |= replace(&mut self.display_console, display_console);
        }
        if let Some(server_ip) = patch.server_ip {
            changed |= replace(&mut self.server_ip, server_ip);
        }
        if let Some(server_port) = patch.server_port {
            changed |= replace(&mut self.server_port, server_port);
        }

        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

/// 新建服务器时前端提交的字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub launch_path: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub stop_method: StopMethod,
    #[serde(default)]
    pub display_console: bool,
    #[serde(default)]
    pub server_ip: Option<String>,
    #[serde(default)]
    pub server_port: Option<u16>,
}

impl NewServer {
    pub fn new(
        name: impl Into<String>,
        launch_path: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            launch_path: launch_path.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn stop_method(mut self, stop_method: StopMethod) -> Self {
        self.stop_method = stop_method;
        self
    }
}

/// 部分更新：None 表示不修改该字段
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub launch_path: Option<String>,
    #[serde(default)]
    pub icon_path: Option<String>,
    #[serde(default)]
    pub stop_method: Option<StopMethod>,
    #[serde(default)]
    pub display_console: Option<bool>,
    #[serde(default)]
    pub server_ip: Option<String>,
    #[serde(default)]
    pub server_port: Option<u16>,
}
