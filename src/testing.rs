//! In-memory implementations of the domain ports for tests.

use crate::domain::model::{CommandOutput, CommandSpec, LogTarget, ProcessInfo};
use crate::domain::ports::{CommandRunner, ProcessTable};
use crate::utils::error::{FleetError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct MockResponse {
    code: Option<i32>,
    stdout: String,
    stderr: String,
    missing_program: bool,
}

impl MockResponse {
    pub fn stdout(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
            missing_program: false,
        }
    }

    pub fn failure(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
            missing_program: false,
        }
    }

    /// Simulates the program not being installed.
    pub fn missing_program() -> Self {
        Self {
            code: None,
            stdout: String::new(),
            stderr: String::new(),
            missing_program: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetachedSpawn {
    pub command: CommandSpec,
    pub log: LogTarget,
    pub pid: u32,
}

#[derive(Default)]
struct RunnerState {
    responses: HashMap<String, MockResponse>,
    calls: Vec<String>,
    spawned: Vec<DetachedSpawn>,
    next_pid: u32,
}

/// Command runner that answers from canned responses keyed by the full command line.
/// Unknown commands succeed with empty output.
#[derive(Clone, Default)]
pub struct MockCommandRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl MockCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command_line: &str, response: MockResponse) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(command_line.to_string(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn spawned(&self) -> Vec<DetachedSpawn> {
        self.state.lock().unwrap().spawned.clone()
    }
}

#[async_trait]
impl CommandRunner for MockCommandRunner {
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let line = command.display();
        state.calls.push(line.clone());

        match state.responses.get(&line).cloned() {
            Some(response) if response.missing_program => Err(FleetError::SpawnError {
                command: command.program.clone(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
            Some(response) => Ok(CommandOutput {
                code: response.code,
                stdout: response.stdout,
                stderr: response.stderr,
            }),
            None => Ok(CommandOutput {
                code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            }),
        }
    }

    fn spawn_detached(&self, command: &CommandSpec, log: &LogTarget) -> Result<u32> {
        let mut state = self.state.lock().unwrap();
        state.next_pid += 1;
        let pid = 40_000 + state.next_pid;
        state.calls.push(command.display());
        state.spawned.push(DetachedSpawn {
            command: command.clone(),
            log: log.clone(),
            pid,
        });
        Ok(pid)
    }
}

/// Process table over a fixed list; terminated processes disappear from it.
#[derive(Clone, Default)]
pub struct MockProcessTable {
    processes: Arc<Mutex<Vec<ProcessInfo>>>,
    stubborn: Arc<Mutex<Vec<u32>>>,
    terminated: Arc<Mutex<Vec<u32>>>,
}

impl MockProcessTable {
    pub fn with_processes(command_lines: &[(u32, &str)]) -> Self {
        let processes = command_lines
            .iter()
            .map(|(pid, line)| ProcessInfo {
                pid: *pid,
                command_line: line.to_string(),
            })
            .collect();
        Self {
            processes: Arc::new(Mutex::new(processes)),
            ..Default::default()
        }
    }

    /// Signals to `pid` will fail to deliver.
    pub fn refuse_signal(&self, pid: u32) {
        self.stubborn.lock().unwrap().push(pid);
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessTable for MockProcessTable {
    fn find_matching(&self, pattern: &str) -> Vec<ProcessInfo> {
        self.processes
            .lock()
            .unwrap()
            .iter()
            .filter(|info| info.command_line.contains(pattern))
            .cloned()
            .collect()
    }

    fn terminate(&self, pid: u32) -> bool {
        if self.stubborn.lock().unwrap().contains(&pid) {
            return false;
        }
        self.processes.lock().unwrap().retain(|info| info.pid != pid);
        self.terminated.lock().unwrap().push(pid);
        true
    }
}
