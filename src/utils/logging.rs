use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志输出，RUST_LOG 优先于传入的默认级别
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Err(e) = fmt().with_env_filter(filter).with_target(false).try_init() {
        eprintln!("[logging] 日志初始化失败: {}", e);
        return;
    }

    tracing::info!("日志已初始化，默认级别: {}", level);
}
