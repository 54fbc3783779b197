use crate::domain::model::{CommandOutput, CommandSpec, ContainerId, LogTarget, ProcessInfo};
use crate::utils::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is not an error here.
    async fn output(&self, command: &CommandSpec) -> Result<CommandOutput>;

    /// Start in the background with stdout and stderr sent to `log`; returns the pid.
    fn spawn_detached(&self, command: &CommandSpec, log: &LogTarget) -> Result<u32>;
}

pub trait ProcessTable: Send + Sync {
    /// Processes whose full command line contains `pattern`, excluding the caller.
    fn find_matching(&self, pattern: &str) -> Vec<ProcessInfo>;

    /// Ask a process to terminate. Returns false when the signal could not be delivered.
    fn terminate(&self, pid: u32) -> bool;
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_all(&self) -> Result<Vec<ContainerId>>;
    async fn stop(&self, ids: &[ContainerId]) -> Result<()>;
    async fn remove(&self, ids: &[ContainerId]) -> Result<()>;
}
