//! 游戏服务器启动脚本的启动器与守护。
//!
//! 核心是 [`services::ProcessManager`]：维护服务器列表和正在运行的子进程，
//! 负责启动、按停止方式结束进程，并在后台检查进程是否已在外部退出。
//! 图形界面（`gui` feature）的命令桥接在二进制入口中。

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::LauncherConfig;
pub use error::{LauncherError, Result};
pub use services::ProcessManager;
