use crate::domain::model::{CommandOutput, CommandSpec, LogTarget, ProcessInfo};
use crate::domain::ports::{CommandRunner, ProcessTable};
use crate::utils::error::{FleetError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::process::Stdio;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, Signal, System, UpdateKind};

/// Translate a [`CommandSpec`] into a std command with program, args, env and cwd applied.
pub fn build_std_command(spec: &CommandSpec) -> std::process::Command {
    let mut command = std::process::Command::new(&spec.program);
    command.args(&spec.args);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }
    command
}

pub fn build_tokio_command(spec: &CommandSpec) -> tokio::process::Command {
    tokio::process::Command::from(build_std_command(spec))
}

/// Open (creating parents) the file a background process will write to.
pub fn open_log(target: &LogTarget) -> Result<File> {
    if let Some(parent) = target.path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(target.append)
        .truncate(!target.append)
        .open(&target.path)?;
    Ok(file)
}

#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!("Executing: {}", command.display());

        let output = build_tokio_command(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| FleetError::SpawnError {
                command: command.program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn spawn_detached(&self, command: &CommandSpec, log: &LogTarget) -> Result<u32> {
        let stdout = open_log(log)?;
        let stderr = stdout.try_clone()?;

        let mut process = build_std_command(command);
        process
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Own process group so the child outlives the launching terminal.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            process.process_group(0);
        }

        let child = process.spawn().map_err(|source| FleetError::SpawnError {
            command: command.program.clone(),
            source,
        })?;

        tracing::debug!(
            "Spawned '{}' as pid {} -> {}",
            command.display(),
            child.id(),
            log.path.display()
        );
        Ok(child.id())
    }
}

/// Process table backed by the OS process list.
#[derive(Debug, Clone, Default)]
pub struct SysinfoProcessTable;

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn command_line(process: &sysinfo::Process) -> String {
    process
        .cmd()
        .iter()
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Threads are listed next to processes on Linux and carry their owner's command line.
pub(crate) fn is_thread(process: &sysinfo::Process) -> bool {
    process.thread_kind().is_some()
}

/// Ids of the calling process and every thread it owns.
pub(crate) fn own_task_ids() -> HashSet<u32> {
    let own_pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[own_pid]),
        true,
        ProcessRefreshKind::nothing().with_tasks(),
    );

    let mut ids: HashSet<u32> = system
        .process(own_pid)
        .and_then(|process| process.tasks())
        .map(|tasks| tasks.iter().map(|tid| tid.as_u32()).collect())
        .unwrap_or_default();
    ids.insert(own_pid.as_u32());
    ids
}

pub(crate) fn refresh_with_cmd(system: &mut System, processes: ProcessesToUpdate<'_>) {
    system.refresh_processes_specifics(
        processes,
        true,
        ProcessRefreshKind::nothing()
            .without_tasks()
            .with_cmd(UpdateKind::Always),
    );
}

impl ProcessTable for SysinfoProcessTable {
    fn find_matching(&self, pattern: &str) -> Vec<ProcessInfo> {
        let mut system = System::new();
        refresh_with_cmd(&mut system, ProcessesToUpdate::All);

        let own_ids = own_task_ids();
        let mut matches: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter(|(pid, process)| !is_thread(process) && !own_ids.contains(&pid.as_u32()))
            .filter_map(|(pid, process)| {
                let command_line = command_line(process);
                command_line.contains(pattern).then(|| ProcessInfo {
                    pid: pid.as_u32(),
                    command_line,
                })
            })
            .collect();

        matches.sort_by_key(|info| info.pid);
        matches
    }

    fn terminate(&self, pid: u32) -> bool {
        // Signalling one of our own thread ids would take the whole process down.
        if own_task_ids().contains(&pid) {
            return false;
        }

        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );

        system
            .process(pid)
            .and_then(|process| process.kill_with(Signal::Term))
            .unwrap_or(false)
    }
}
