use crate::domain::model::{CommandSpec, ContainerId};
use crate::domain::ports::{CommandRunner, ContainerRuntime};
use crate::utils::error::{FleetError, Result};
use async_trait::async_trait;

/// Container runtime driven through its CLI (`docker`, or a compatible binary such as `podman`).
pub struct DockerCli<R: CommandRunner> {
    runner: R,
    binary: String,
}

impl<R: CommandRunner> DockerCli<R> {
    pub fn new(runner: R, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    async fn run_checked(&self, command: CommandSpec) -> Result<String> {
        let output = self.runner.output(&command).await?;
        if !output.success() {
            return Err(FleetError::CommandFailed {
                command: command.display(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn with_ids(&self, verb: &str, ids: &[ContainerId]) -> CommandSpec {
        CommandSpec::new(&self.binary)
            .arg(verb)
            .args(ids.iter().map(|id| id.0.clone()))
    }
}

#[async_trait]
impl<R: CommandRunner> ContainerRuntime for DockerCli<R> {
    async fn list_all(&self) -> Result<Vec<ContainerId>> {
        let stdout = self
            .run_checked(CommandSpec::new(&self.binary).args(["ps", "-aq"]))
            .await?;

        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| ContainerId(line.to_string()))
            .collect())
    }

    async fn stop(&self, ids: &[ContainerId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.run_checked(self.with_ids("stop", ids)).await?;
        Ok(())
    }

    async fn remove(&self, ids: &[ContainerId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.run_checked(self.with_ids("rm", ids)).await?;
        Ok(())
    }
}
