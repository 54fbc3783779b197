use crate::adapters::process::{command_line, is_thread, own_task_ids};
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind};

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStats {
    pub pid: u32,
    pub port: Option<u16>,
    pub cpu_usage: f32,
    pub memory_usage_mb: u64,
    pub command_line: String,
}

/// Parse `--port N` or `--port=N` out of a worker command line.
pub fn parse_port(command_line: &str) -> Option<u16> {
    let mut parts = command_line.split_whitespace();
    while let Some(part) = parts.next() {
        if part == "--port" {
            return parts.next().and_then(|value| value.parse().ok());
        }
        if let Some(value) = part.strip_prefix("--port=") {
            return value.parse().ok();
        }
    }
    None
}

pub struct WorkerMonitor {
    system: System,
}

impl WorkerMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn refresh(&mut self) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing()
                .without_tasks()
                .with_cmd(UpdateKind::OnlyIfNotSet)
                .with_cpu()
                .with_memory(),
        );
    }

    /// Two refreshes apart are needed before CPU usage is meaningful.
    pub fn snapshot(&mut self, pattern: &str) -> Vec<WorkerStats> {
        self.refresh();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(Duration::from_millis(200)));
        self.refresh();

        let own_ids = own_task_ids();
        let mut stats: Vec<WorkerStats> = self
            .system
            .processes()
            .iter()
            .filter(|(pid, process)| !is_thread(process) && !own_ids.contains(&pid.as_u32()))
            .filter_map(|(pid, process)| {
                let command_line = command_line(process);
                if !command_line.contains(pattern) {
                    return None;
                }
                Some(WorkerStats {
                    pid: pid.as_u32(),
                    port: parse_port(&command_line),
                    cpu_usage: process.cpu_usage(),
                    memory_usage_mb: process.memory() / 1024 / 1024,
                    command_line,
                })
            })
            .collect();

        stats.sort_by_key(|s| (s.port, s.pid));
        stats
    }

    pub fn log_stats(stats: &[WorkerStats]) {
        for s in stats {
            tracing::info!(
                "📊 pid {} port {} - CPU: {:.1}%, Memory: {}MB",
                s.pid,
                s.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                s.cpu_usage,
                s.memory_usage_mb
            );
        }
    }
}

impl Default for WorkerMonitor {
    fn default() -> Self {
        Self::new()
    }
}
