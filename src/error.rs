use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LauncherError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("服务器不存在: {0}")]
    NotFound(u32),

    #[error("启动文件不存在: {}", .0.display())]
    LaunchPathMissing(PathBuf),

    #[error("服务器 {0} 未在运行")]
    NotRunning(u32),

    #[error("{context}失败: {source}")]
    Os {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("保存数据失败: {0}")]
    Persist(#[source] std::io::Error),

    #[error("序列化失败: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LauncherError>;

impl LauncherError {
    pub fn os(context: &'static str, source: std::io::Error) -> Self {
        LauncherError::Os { context, source }
    }

    /// 前端用于区分错误类型的标识
    pub fn kind(&self) -> &'static str {
        match self {
            LauncherError::Validation(_) => "validation",
            LauncherError::NotFound(_) => "not_found",
            LauncherError::LaunchPathMissing(_) => "launch_path_missing",
            LauncherError::NotRunning(_) => "not_reported_running",
            LauncherError::Os { .. } => "os_interaction",
            LauncherError::Persist(_) => "persist",
            LauncherError::Serialize(_) => "serialize",
        }
    }
}

// Tauri 命令的错误需要可序列化，输出 { kind, message }
impl Serialize for LauncherError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LauncherError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}
