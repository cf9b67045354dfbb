use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(target_os = "windows")]
use std::os::windows::process::CommandExt;

#[cfg(target_os = "windows")]
const CREATE_NEW_CONSOLE: u32 = 0x00000010;
#[cfg(target_os = "windows")]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// 以独立进程组启动脚本，启动器退出时不会连带结束它
pub fn spawn_detached(launch_path: &Path, working_dir: &Path, display_console: bool) -> io::Result<Child> {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = Command::new("cmd.exe");
        command.arg("/c").arg(launch_path);

        let flags = if display_console {
            CREATE_NEW_CONSOLE
        } else {
            CREATE_NO_WINDOW | CREATE_NEW_PROCESS_GROUP
        };
        command.creation_flags(flags);
        command
    };

    #[cfg(not(target_os = "windows"))]
    let mut command = {
        use std::os::unix::process::CommandExt;

        // .sh 脚本不一定有执行权限，交给 sh 解释
        let mut command = if launch_path.extension().map_or(false, |ext| ext == "sh") {
            let mut command = Command::new("sh");
            command.arg(launch_path);
            command
        } else {
            Command::new(launch_path)
        };
        command.process_group(0);

        let output = || if display_console { Stdio::inherit() } else { Stdio::null() };
        command.stdout(output()).stderr(output());
        command
    };

    command.current_dir(working_dir).stdin(Stdio::null());

    let child = command.spawn()?;
    tracing::debug!(pid = child.id(), path = %launch_path.display(), "子进程已启动");
    Ok(child)
}

/// 向整个进程树发送终止请求 (SIGTERM / taskkill /T)
pub fn terminate_tree(pid: u32) -> io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        taskkill(pid, false)
    }

    #[cfg(not(target_os = "windows"))]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGTERM)
    }
}

/// 强制结束整个进程树 (SIGKILL / taskkill /F /T)
pub fn kill_tree(pid: u32) -> io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        taskkill(pid, true)
    }

    #[cfg(not(target_os = "windows"))]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }
}

/// 主进程退出后，清理同一进程组中残留的后代进程。
/// 需要在主进程退出后立即调用，组内仍有成员时进程组 ID 不会被系统复用
pub fn kill_stragglers(pid: u32) -> io::Result<()> {
    #[cfg(target_os = "windows")]
    {
        // 父进程退出后无法再按 PID 找到进程树，taskkill /T 已在终止阶段处理
        let _ = pid;
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    {
        signal_group(pid, nix::sys::signal::Signal::SIGKILL)
    }
}

#[cfg(not(target_os = "windows"))]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "PID 超出范围"))?;

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => {
            tracing::debug!(pid, ?signal, "已向进程组发送信号");
            Ok(())
        }
        // 进程组已不存在
        Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(io::Error::from(errno)),
    }
}

#[cfg(target_os = "windows")]
fn taskkill(pid: u32, force: bool) -> io::Result<()> {
    let mut kill_command = Command::new("taskkill");
    kill_command.args(["/PID", &pid.to_string(), "/T"]);
    if force {
        kill_command.arg("/F");
    }
    kill_command.creation_flags(CREATE_NO_WINDOW);

    // 使用 output() 等待 taskkill 完成
    let output = kill_command.output()?;
    if !output.status.success() {
        tracing::debug!(
            pid,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "taskkill 返回非零状态"
        );
    }
    Ok(())
}

/// 在限定时间内轮询等待子进程退出，超时返回 None
pub async fn wait_for_exit(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("run.sh");
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn spawn_runs_in_working_dir() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "pwd > cwd.txt\n");

        let mut child = spawn_detached(&script, dir.path(), false).unwrap();
        let status = wait_for_exit(&mut child, Duration::from_secs(5), Duration::from_millis(20))
            .await
            .unwrap();

        assert!(status.is_some());
        let cwd = fs::read_to_string(dir.path().join("cwd.txt")).unwrap();
        assert_eq!(
            fs::canonicalize(cwd.trim()).unwrap(),
            fs::canonicalize(dir.path()).unwrap()
        );
    }

    // 不存在或已成为僵尸进程（容器内 init 未必及时回收）
    #[cfg(target_os = "linux")]
    fn is_gone(pid: i32) -> bool {
        match fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rfind(')')
                .and_then(|end| stat[end + 1..].split_whitespace().next())
                .map_or(true, |state| state == "Z"),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn kill_tree_ends_whole_group() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "sleep 30 &\necho $! > child.pid\nwait\n");

        let mut child = spawn_detached(&script, dir.path(), false).unwrap();
        let pid_file = dir.path().join("child.pid");
        for _ in 0..50 {
            if fs::read_to_string(&pid_file).map_or(false, |s| !s.trim().is_empty()) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let grandchild: i32 = fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();

        kill_tree(child.id()).unwrap();
        let status = wait_for_exit(&mut child, Duration::from_secs(5), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(status.is_some());

        // 孙进程同属一个进程组，同样被结束
        let mut gone = false;
        for _ in 0..100 {
            if is_gone(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stragglers_are_killed_after_leader_exits() {
        let dir = tempdir().unwrap();
        let script = write_script(
            dir.path(),
            "sh -c 'trap \"\" TERM; while true; do sleep 1; done' &\necho $! > child.pid\nsleep 0.3\n",
        );

        let mut child = spawn_detached(&script, dir.path(), false).unwrap();
        let status = wait_for_exit(&mut child, Duration::from_secs(5), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(status.is_some());

        let grandchild: i32 = fs::read_to_string(dir.path().join("child.pid"))
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(!is_gone(grandchild));

        kill_stragglers(child.id()).unwrap();

        let mut gone = false;
        for _ in 0..100 {
            if is_gone(grandchild) {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(gone);
    }

    #[tokio::test]
    async fn wait_for_exit_times_out_on_live_process() {
        let dir = tempdir().unwrap();
        let script = write_script(dir.path(), "exec sleep 30\n");

        let mut child = spawn_detached(&script, dir.path(), false).unwrap();
        let status = wait_for_exit(&mut child, Duration::from_millis(200), Duration::from_millis(20))
            .await
            .unwrap();
        assert!(status.is_none());

        kill_tree(child.id()).unwrap();
        let _ = child.wait();
    }

    #[test]
    fn signalling_missing_group_is_ok() {
        // 远超 pid_max 的进程组不存在
        assert!(terminate_tree(i32::MAX as u32).is_ok());
    }
}
