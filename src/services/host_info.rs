use crate::models::{AppVersion, HostInfo};
use once_cell::sync::Lazy;
use sysinfo::System;

const CREDITS: &str = "server-launcher contributors";

// 运行期间不会变化，首次查询后缓存
static HOST_INFO: Lazy<HostInfo> = Lazy::new(collect_host_info);

fn collect_host_info() -> HostInfo {
    let mut system = System::new();
    system.refresh_cpu_all();

    let processor = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_string())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    HostInfo {
        platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        platform_version: System::long_os_version()
            .or_else(System::os_version)
            .unwrap_or_default(),
        architecture: std::env::consts::ARCH.to_string(),
        processor,
        hostname: System::host_name(),
    }
}

pub fn host_info() -> HostInfo {
    HOST_INFO.clone()
}

pub fn app_version() -> AppVersion {
    AppVersion {
        version: env!("CARGO_PKG_VERSION").to_string(),
        credits: CREDITS.to_string(),
    }
}
