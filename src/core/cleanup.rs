use crate::domain::model::ProcessInfo;
use crate::domain::ports::{ContainerRuntime, ProcessTable};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub found: usize,
    pub stopped: bool,
    pub removed: bool,
}

/// Force-stops and removes every container the runtime knows about. Nothing here is fatal.
pub struct ContainerCleanup<C: ContainerRuntime> {
    runtime: C,
}

impl<C: ContainerRuntime> ContainerCleanup<C> {
    pub fn new(runtime: C) -> Self {
        Self { runtime }
    }

    pub async fn run(&self) -> CleanupReport {
        let ids = match self.runtime.list_all().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("⚠️ Could not list containers, skipping cleanup: {}", e);
                return CleanupReport::default();
            }
        };

        if ids.is_empty() {
            tracing::info!("🧹 No containers to clean up");
            return CleanupReport::default();
        }

        tracing::info!("🧹 Stopping and removing {} containers", ids.len());

        let stopped = match self.runtime.stop(&ids).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Container stop failed: {}", e);
                false
            }
        };

        let removed = match self.runtime.remove(&ids).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠️ Container removal failed: {}", e);
                false
            }
        };

        CleanupReport {
            found: ids.len(),
            stopped,
            removed,
        }
    }
}

/// Sends a termination request to every process whose command line contains `pattern`.
/// Returns the processes that accepted the signal.
pub fn terminate_matching<T: ProcessTable + ?Sized>(table: &T, pattern: &str) -> Vec<ProcessInfo> {
    let matches = table.find_matching(pattern);
    if matches.is_empty() {
        tracing::debug!("No running process matches '{}'", pattern);
        return matches;
    }

    matches
        .into_iter()
        .filter(|info| {
            let delivered = table.terminate(info.pid);
            if delivered {
                tracing::info!("🔪 Terminated pid {} ({})", info.pid, info.command_line);
            } else {
                tracing::warn!("⚠️ Could not signal pid {} ({})", info.pid, info.command_line);
            }
            delivered
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::DockerCli;
    use crate::testing::{MockCommandRunner, MockProcessTable, MockResponse};

    #[tokio::test]
    async fn test_cleanup_stops_then_removes_everything() {
        let runner = MockCommandRunner::new();
        runner.respond("docker ps -aq", MockResponse::stdout("c1\nc2\nc3\n"));
        let cleanup = ContainerCleanup::new(DockerCli::new(runner.clone(), "docker"));

        let report = cleanup.run().await;

        assert_eq!(
            report,
            CleanupReport {
                found: 3,
                stopped: true,
                removed: true
            }
        );
        assert_eq!(
            runner.calls(),
            vec!["docker ps -aq", "docker stop c1 c2 c3", "docker rm c1 c2 c3"]
        );
    }

    #[tokio::test]
    async fn test_cleanup_with_no_containers_is_a_no_op() {
        let runner = MockCommandRunner::new();
        let cleanup = ContainerCleanup::new(DockerCli::new(runner.clone(), "docker"));

        assert_eq!(cleanup.run().await, CleanupReport::default());
        assert_eq!(runner.calls(), vec!["docker ps -aq"]);
    }

    #[tokio::test]
    async fn test_cleanup_failures_are_not_fatal() {
        let runner = MockCommandRunner::new();
        runner.respond("docker ps -aq", MockResponse::stdout("c1\n"));
        runner.respond("docker stop c1", MockResponse::failure(1, "no such container"));
        let cleanup = ContainerCleanup::new(DockerCli::new(runner.clone(), "docker"));

        let report = cleanup.run().await;
        assert!(!report.stopped);
        assert!(report.removed);

        let missing = MockCommandRunner::new();
        missing.respond("docker ps -aq", MockResponse::missing_program());
        let cleanup = ContainerCleanup::new(DockerCli::new(missing, "docker"));
        assert_eq!(cleanup.run().await, CleanupReport::default());
    }

    #[test]
    fn test_terminate_matching_leaves_no_match_behind() {
        let table = MockProcessTable::with_processes(&[
            (100, "python main.py --port 8000"),
            (101, "vim main.py"),
            (102, "python other.py"),
        ]);

        let killed = terminate_matching(&table, "python main.py");
        assert_eq!(killed.len(), 1);
        assert_eq!(table.terminated(), vec![100]);
        assert!(table.find_matching("python main.py").is_empty());

        assert!(terminate_matching(&table, "python main.py").is_empty());
    }

    #[test]
    fn test_terminate_matching_skips_undeliverable() {
        let table = MockProcessTable::with_processes(&[(7, "main.py"), (8, "main.py")]);
        table.refuse_signal(7);

        let killed = terminate_matching(&table, "main.py");
        assert_eq!(killed.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![8]);
    }
}
