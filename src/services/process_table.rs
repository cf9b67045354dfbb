use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io;
use std::process::{Child, ExitStatus};

/// 由启动器拉起、仍被认为在运行的子进程
pub struct TrackedProcess {
    child: Child,
    pub started_at: DateTime<Utc>,
}

impl TrackedProcess {
    pub fn new(child: Child) -> Self {
        Self {
            child,
            started_at: Utc::now(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }
}

#[derive(Debug)]
pub enum Liveness {
    Alive,
    Exited(ExitStatus),
    /// 查询失败，按已退出处理
    Unknown(io::Error),
}

impl Liveness {
    pub fn is_alive(&self) -> bool {
        matches!(self, Liveness::Alive)
    }
}

/// 服务器 ID -> 子进程句柄。没有条目即视为未运行
#[derive(Default)]
pub struct ProcessTable {
    processes: HashMap<u32, TrackedProcess>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u32, process: TrackedProcess) {
        self.processes.insert(id, process);
    }

    pub fn remove(&mut self, id: u32) -> Option<TrackedProcess> {
        self.processes.remove(&id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.processes.contains_key(&id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut TrackedProcess> {
        self.processes.get_mut(&id)
    }

    pub fn pid(&self, id: u32) -> Option<u32> {
        self.processes.get(&id).map(TrackedProcess::pid)
    }

    pub fn ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.processes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// 非阻塞检查进程是否还活着。持有未回收的 Child，PID 不会被系统复用
    pub fn probe(&mut self, id: u32) -> Option<Liveness> {
        let process = self.processes.get_mut(&id)?;
        Some(match process.child.try_wait() {
            Ok(None) => Liveness::Alive,
            Ok(Some(status)) => Liveness::Exited(status),
            Err(e) => Liveness::Unknown(e),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[test]
    fn probe_tracks_exit() {
        let mut table = ProcessTable::new();
        let child = Command::new("sh").args(["-c", "exit 3"]).spawn().unwrap();
        table.insert(1, TrackedProcess::new(child));

        let mut liveness = table.probe(1).unwrap();
        for _ in 0..100 {
            if !liveness.is_alive() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
            liveness = table.probe(1).unwrap();
        }

        match liveness {
            Liveness::Exited(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected liveness: {:?}", other),
        }
        assert!(table.probe(2).is_none());
    }

    #[test]
    fn remove_drops_entry() {
        let mut table = ProcessTable::new();
        let child = Command::new("sh").args(["-c", "exit 0"]).spawn().unwrap();
        let pid = child.id();
        table.insert(4, TrackedProcess::new(child));

        assert!(table.contains(4));
        assert_eq!(table.pid(4), Some(pid));
        assert_eq!(table.ids(), vec![4]);

        let mut removed = table.remove(4).unwrap();
        let _ = removed.child_mut().wait();
        assert!(table.is_empty());
    }
}
