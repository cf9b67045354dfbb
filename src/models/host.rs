use super::ServerDefinition;
use serde::{Deserialize, Serialize};

/// 运行环境概要，随服务器详情一起返回给前端
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostInfo {
    pub platform: String,
    pub platform_version: String,
    pub architecture: String,
    pub processor: String,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub server: ServerDefinition,
    pub system_info: HostInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppVersion {
    pub version: String,
    pub credits: String,
}
