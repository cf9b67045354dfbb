use crate::config::LauncherConfig;
use crate::error::{LauncherError, Result};
use crate::models::{NewServer, ServerDefinition, ServerInfo, ServerPatch, ServerStatus, StopMethod};
use crate::services::{host_info, reconciler, ProcessTable, Registry, RegistryStore, TrackedProcess};
use crate::utils::{kill_stragglers, kill_tree, spawn_detached, terminate_tree, wait_for_exit};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// 服务器列表、进程表和持久化，三者只在同一把锁下修改
pub(crate) struct Inner {
    pub(crate) registry: Registry,
    pub(crate) store: RegistryStore,
    pub(crate) processes: ProcessTable,
}

impl Inner {
    fn persist(&self) -> Result<()> {
        self.store.save(&self.registry)
    }

    fn set_status(&mut self, id: u32, status: ServerStatus, started_at: Option<DateTime<Utc>>) {
        if let Some(server) = self.registry.find_mut(id) {
            server.status = status;
            server.started_at = started_at;
        }
    }

    /// 移除进程表条目、状态改为 stopped 并立即落盘
    pub(crate) fn mark_stopped(&mut self, id: u32) -> Result<()> {
        self.processes.remove(id);
        if let Some(server) = self.registry.find_mut(id) {
            server.status = ServerStatus::Stopped;
        }
        self.persist()
    }
}

/// 服务器进程的生命周期管理
///
/// 所有操作都在返回前完成落盘。`stop` 会同步等待进程结束，
/// 最长可达 宽限期 + 终止超时 + 强杀超时，调用方应按耗时操作对待。
pub struct ProcessManager {
    inner: Arc<Mutex<Inner>>,
    config: LauncherConfig,
    shutdown_tx: watch::Sender<bool>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessManager {
    pub fn new(config: LauncherConfig) -> Self {
        let store = RegistryStore::new(config.registry_path());
        let mut registry = store.load();

        // 刚启动时没有任何被跟踪的进程，残留的 running 状态全部复位
        let mut stale = 0;
        for server in registry.servers.iter_mut() {
            if server.status == ServerStatus::Running {
                server.status = ServerStatus::Stopped;
                stale += 1;
            }
        }
        if stale > 0 {
            tracing::info!(count = stale, "复位上次运行遗留的服务器状态");
            if let Err(e) = store.save(&registry) {
                tracing::warn!("保存复位后的服务器列表失败: {}", e);
            }
        }

        let (shutdown_tx, _) = watch::channel(false);

        Self {
            inner: Arc::new(Mutex::new(Inner {
                registry,
                store,
                processes: ProcessTable::new(),
            })),
            config,
            shutdown_tx,
            reconciler: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LauncherConfig {
        &self.config
    }

    /// 启动后台存活检查，需要在 tokio 运行时中调用。`shutdown` 之后可以再次启动
    pub async fn start_reconciler(&self) {
        let mut handle = self.reconciler.lock().await;
        if handle.is_some() {
            return;
        }

        self.shutdown_tx.send_replace(false);
        *handle = Some(reconciler::spawn(
            self.inner.clone(),
            self.config.reconcile_interval,
            self.shutdown_tx.subscribe(),
        ));
    }

    /// 通知存活检查退出并等待当前一轮完成。已启动的服务器不受影响
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);

        let handle = self.reconciler.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("存活检查任务异常退出: {}", e);
            }
        }
    }

    /// 立即执行一轮存活检查，返回被清理的服务器 ID
    pub async fn reconcile_now(&self) -> Vec<u32> {
        reconciler::reconcile(&self.inner).await
    }

    pub async fn list(&self) -> Vec<ServerDefinition> {
        self.inner.lock().await.registry.servers.clone()
    }

    pub async fn get(&self, id: u32) -> Result<ServerDefinition> {
        let inner = self.inner.lock().await;
        inner.registry.find(id).cloned().ok_or(LauncherError::NotFound(id))
    }

    /// 服务器详情及运行环境信息
    pub async fn info(&self, id: u32) -> Result<ServerInfo> {
        let server = self.get(id).await?;
        Ok(ServerInfo {
            server,
            system_info: host_info(),
        })
    }

    pub async fn is_running(&self, id: u32) -> bool {
        self.inner.lock().await.processes.contains(id)
    }

    pub async fn pid(&self, id: u32) -> Option<u32> {
        self.inner.lock().await.processes.pid(id)
    }

    pub async fn running_ids(&self) -> Vec<u32> {
        self.inner.lock().await.processes.ids()
    }

    /// 添加服务器
    pub async fn add(&self, fields: NewServer) -> Result<ServerDefinition> {
        validate_required("名称", &fields.name)?;
        validate_required("启动路径", &fields.launch_path)?;

        let mut inner = self.inner.lock().await;
        let id = inner.registry.allocate_id();
        let server = ServerDefinition::new(id, fields);
        inner.registry.servers.push(server.clone());

        if let Err(e) = inner.persist() {
            inner.registry.servers.pop();
            return Err(e);
        }

        tracing::info!(server_id = id, name = %server.name, "已添加服务器");
        Ok(server)
    }

    /// 更新服务器配置，只修改补丁中提供的字段；没有实际变化时不写盘
    pub async fn update(&self, id: u32, patch: ServerPatch) -> Result<ServerDefinition> {
        if let Some(name) = &patch.name {
            validate_required("名称", name)?;
        }
        if let Some(launch_path) = &patch.launch_path {
            validate_required("启动路径", launch_path)?;
        }

        let mut inner = self.inner.lock().await;
        let server = inner.registry.find_mut(id).ok_or(LauncherError::NotFound(id))?;
        let before = server.clone();
        let changed = server.apply(patch);
        let updated = server.clone();

        if !changed {
            return Ok(updated);
        }

        if let Err(e) = inner.persist() {
            if let Some(server) = inner.registry.find_mut(id) {
                *server = before;
            }
            return Err(e);
        }

        tracing::info!(server_id = id, "已更新服务器配置");
        Ok(updated)
    }

    /// 删除服务器，正在运行的会先停止
    pub async fn remove(&self, id: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.registry.find(id).is_none() {
            return Err(LauncherError::NotFound(id));
        }

        if inner.processes.contains(id) {
            self.stop_locked(&mut inner, id).await?;
        }

        inner.registry.remove(id);
        inner.persist()?;

        tracing::info!(server_id = id, "已删除服务器");
        Ok(())
    }

    /// 启动服务器。已在运行时直接返回成功，不会重复启动
    pub async fn start(&self, id: u32) -> Result<ServerDefinition> {
        let mut inner = self.inner.lock().await;
        let server = inner.registry.find(id).cloned().ok_or(LauncherError::NotFound(id))?;

        if inner.processes.contains(id) {
            tracing::debug!(server_id = id, "服务器已在运行");
            return Ok(server);
        }

        let cwd = std::env::current_dir().map_err(|e| LauncherError::os("获取当前目录", e))?;
        let launch_path = server.resolved_launch_path(&cwd);
        if !launch_path.exists() {
            return Err(LauncherError::LaunchPathMissing(launch_path));
        }

        let working_dir = launch_path.parent().map(Path::to_path_buf).unwrap_or(cwd);

        let child = spawn_detached(&launch_path, &working_dir, server.display_console)
            .map_err(|e| LauncherError::os("启动服务器进程", e))?;
        let pid = child.id();

        let process = TrackedProcess::new(child);
        let started_at = process.started_at;
        inner.processes.insert(id, process);
        inner.set_status(id, ServerStatus::Running, Some(started_at));

        if let Err(e) = inner.persist() {
            tracing::warn!(server_id = id, pid, "保存运行状态失败，结束刚启动的进程: {}", e);
            if let Some(mut process) = inner.processes.remove(id) {
                let _ = kill_tree(pid);
                let _ = process.child_mut().kill();
                let _ = wait_for_exit(
                    process.child_mut(),
                    self.config.kill_timeout,
                    self.config.poll_interval,
                )
                .await;
            }
            inner.set_status(id, server.status, server.started_at);
            return Err(e);
        }

        tracing::info!(server_id = id, pid, name = %server.name, "服务器已启动");
        inner.registry.find(id).cloned().ok_or(LauncherError::NotFound(id))
    }

    /// 按服务器的停止方式停止进程，返回时进程已结束且状态已保存
    pub async fn stop(&self, id: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.stop_locked(&mut inner, id).await
    }

    /// 停止所有运行中的服务器，单个失败不影响其余，返回第一个错误
    pub async fn stop_all(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let mut first_error = None;

        for id in inner.processes.ids() {
            if let Err(e) = self.stop_locked(&mut inner, id).await {
                tracing::warn!(server_id = id, "停止服务器失败: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn stop_locked(&self, inner: &mut Inner, id: u32) -> Result<()> {
        let stop_method = inner
            .registry
            .find(id)
            .map(|s| s.stop_method)
            .unwrap_or_default();
        let process = inner.processes.get_mut(id).ok_or(LauncherError::NotRunning(id))?;
        let pid = process.pid();

        tracing::info!(server_id = id, pid, ?stop_method, "正在停止服务器");

        match stop_method {
            StopMethod::Graceful => {
                // 没有与服务器通信的协议，只能等待其自行退出
                match wait_for_exit(
                    process.child_mut(),
                    self.config.grace_period,
                    self.config.poll_interval,
                )
                .await
                {
                    Ok(Some(status)) => {
                        tracing::debug!(server_id = id, %status, "服务器在宽限期内退出");
                    }
                    Ok(None) => {
                        tracing::info!(server_id = id, pid, "宽限期内未退出，强制结束");
                        self.force_stop(process).await?;
                    }
                    Err(e) => {
                        tracing::warn!(server_id = id, pid, "查询进程状态失败: {}", e);
                        self.force_stop(process).await?;
                    }
                }
            }
            StopMethod::Force => self.force_stop(process).await?,
        }

        // 主进程已回收，组内可能还有忽略终止信号的后代进程
        if let Err(e) = kill_stragglers(pid) {
            tracing::warn!(server_id = id, pid, "清理残留子进程失败: {}", e);
        }

        inner.mark_stopped(id)?;
        tracing::info!(server_id = id, "服务器已停止");
        Ok(())
    }

    /// 先终止整个进程组，主进程超时未退出再强杀整个进程组
    async fn force_stop(&self, process: &mut TrackedProcess) -> Result<()> {
        let pid = process.pid();
        let poll = self.config.poll_interval;

        if let Err(e) = terminate_tree(pid) {
            tracing::warn!(pid, "发送终止信号失败: {}", e);
        }

        match wait_for_exit(process.child_mut(), self.config.terminate_timeout, poll).await {
            Ok(Some(_)) => return Ok(()),
            Ok(None) => tracing::debug!(pid, "终止超时，强制结束进程"),
            Err(e) => tracing::warn!(pid, "等待进程退出失败: {}", e),
        }

        let killed = kill_tree(pid);
        let _ = process.child_mut().kill();

        match wait_for_exit(process.child_mut(), self.config.kill_timeout, poll).await {
            Ok(Some(_)) => Ok(()),
            _ => match killed {
                Ok(()) => {
                    tracing::warn!(pid, "已强制结束，但进程尚未被回收");
                    Ok(())
                }
                Err(e) => Err(LauncherError::os("强制结束进程", e)),
            },
        }
    }
}

impl Drop for ProcessManager {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

fn validate_required(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LauncherError::Validation(format!("{}不能为空", field)));
    }
    Ok(())
}
