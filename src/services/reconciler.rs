use crate::services::process_manager::Inner;
use crate::services::Liveness;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// 周期性检查被跟踪的进程，发现进程已在外部退出时修正状态
pub(crate) fn spawn(
    inner: Arc<Mutex<Inner>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = interval.as_millis() as u64, "存活检查已启动");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // 退出信号只在两轮之间检查，进行中的一轮总会完整执行
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let reaped = reconcile(&inner).await;
                    if !reaped.is_empty() {
                        tracing::debug!(?reaped, "本轮清理的服务器");
                    }
                }
            }
        }

        tracing::info!("存活检查已停止");
    })
}

/// 执行一轮检查，返回被判定为已退出的服务器 ID
pub(crate) async fn reconcile(inner: &Mutex<Inner>) -> Vec<u32> {
    let mut inner = inner.lock().await;
    let mut reaped = Vec::new();

    for id in inner.processes.ids() {
        let Some(liveness) = inner.processes.probe(id) else {
            continue;
        };

        match liveness {
            Liveness::Alive => continue,
            Liveness::Exited(status) => {
                tracing::info!(server_id = id, %status, "服务器进程已退出");
            }
            Liveness::Unknown(e) => {
                tracing::warn!(server_id = id, "查询进程状态失败，按已退出处理: {}", e);
            }
        }

        if inner.registry.find(id).is_none() {
            tracing::warn!(server_id = id, "进程表中的服务器已不在列表中");
        }

        // 单个服务器保存失败不影响本轮其余检查
        if let Err(e) = inner.mark_stopped(id) {
            tracing::warn!(server_id = id, "保存服务器状态失败: {}", e);
        }
        reaped.push(id);
    }

    reaped
}
