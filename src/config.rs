use std::path::{Path, PathBuf};
use std::time::Duration;

const DATA_DIR_ENV: &str = "SERVER_LAUNCHER_HOME";
const DATA_DIR_NAME: &str = ".server-launcher";

const REGISTRY_FILE: &str = "servers.json";
const SETTINGS_FILE: &str = "settings.json";

/// 启动器运行参数：数据目录以及停止流程中的各个等待上限
#[derive(Debug, Clone)]
pub struct LauncherConfig {
    pub data_dir: PathBuf,
    /// graceful 停止时等待进程自行退出的时间
    pub grace_period: Duration,
    /// 发送终止信号后等待退出的时间，超时后按 PID 强杀
    pub terminate_timeout: Duration,
    /// 强杀后等待回收的时间
    pub kill_timeout: Duration,
    /// 等待进程退出时的轮询间隔
    pub poll_interval: Duration,
    /// 后台存活检查的周期
    pub reconcile_interval: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self::with_data_dir(default_data_dir())
    }
}

impl LauncherConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            grace_period: Duration::from_secs(5),
            terminate_timeout: Duration::from_secs(10),
            kill_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            reconcile_interval: Duration::from_secs(3),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join(REGISTRY_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }
}

/// 数据目录：优先环境变量，其次用户主目录，最后退回当前目录
fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }

    match dirs_next::home_dir() {
        Some(home) => home.join(DATA_DIR_NAME),
        None => {
            tracing::warn!("无法获取用户主目录，数据将保存在当前目录");
            PathBuf::from(DATA_DIR_NAME)
        }
    }
}
