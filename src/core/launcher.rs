use crate::adapters::process::{build_tokio_command, open_log};
use crate::config::toml_config::WorkersConfig;
use crate::domain::model::{
    CommandSpec, ExitOutcome, LaunchReport, LogTarget, WorkerExit, WorkerSpec,
};
use crate::utils::error::{FleetError, Result};
use crate::utils::validation::validate_port_list;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Child;

/// Expand the worker template into one command per port.
pub fn build_worker_specs(config: &WorkersConfig) -> Result<Vec<WorkerSpec>> {
    validate_port_list("workers.ports", &config.ports)?;

    Ok(config
        .ports
        .iter()
        .map(|&port| {
            let args = config.args.iter().map(|arg| {
                arg.replace("{port}", &port.to_string())
                    .replace("{module}", &config.module)
                    .replace("{host}", &config.host)
            });
            let mut command = CommandSpec::new(&config.program).args(args);
            if let Some(dir) = &config.working_dir {
                command = command.working_dir(dir);
            }
            WorkerSpec { port, command }
        })
        .collect())
}

struct RunningWorker {
    port: u16,
    pid: Option<u32>,
    child: Child,
}

impl RunningWorker {
    async fn stop(&mut self) -> std::io::Result<std::process::ExitStatus> {
        // Already exited is fine; wait() still reaps it.
        let _ = self.child.start_kill();
        self.child.wait().await
    }
}

/// Kill and wait on every worker, ignoring failures; used on the error paths.
async fn reap(workers: &mut [RunningWorker]) {
    for worker in workers {
        if let Err(e) = worker.stop().await {
            tracing::warn!("⚠️ Could not reap worker on port {}: {}", worker.port, e);
        }
    }
}

/// Starts one server per port and blocks until all of them are gone.
pub struct WorkerLauncher {
    log_dir: Option<PathBuf>,
}

impl WorkerLauncher {
    pub fn new(log_dir: Option<PathBuf>) -> Self {
        Self { log_dir }
    }

    fn spawn_one(&self, spec: &WorkerSpec) -> Result<RunningWorker> {
        let mut command = build_tokio_command(&spec.command);
        command.stdin(Stdio::null());

        if let Some(dir) = &self.log_dir {
            let stdout = open_log(&LogTarget {
                path: dir.join(format!("worker-{}.log", spec.port)),
                append: true,
            })?;
            let stderr = stdout.try_clone()?;
            command.stdout(Stdio::from(stdout)).stderr(Stdio::from(stderr));
        }

        let child = command.spawn().map_err(|source| FleetError::SpawnError {
            command: spec.command.display(),
            source,
        })?;
        let pid = child.id();
        tracing::info!("🚀 Worker on port {} started (pid {:?})", spec.port, pid);

        Ok(RunningWorker {
            port: spec.port,
            pid,
            child,
        })
    }

    async fn spawn_all(&self, specs: &[WorkerSpec]) -> Result<Vec<RunningWorker>> {
        let mut running = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.spawn_one(spec) {
                Ok(worker) => running.push(worker),
                Err(e) => {
                    tracing::error!("❌ Worker on port {} failed to start: {}", spec.port, e);
                    reap(&mut running).await;
                    return Err(e);
                }
            }
        }
        Ok(running)
    }

    /// Wait for every worker. When `shutdown` resolves first, the remaining workers are killed.
    pub async fn run_until<F>(&self, specs: &[WorkerSpec], shutdown: F) -> Result<LaunchReport>
    where
        F: Future<Output = ()>,
    {
        let mut running = self.spawn_all(specs).await?;
        tracing::info!("⏳ Waiting for {} workers", running.len());

        tokio::pin!(shutdown);
        let mut report = LaunchReport::default();

        for index in 0..running.len() {
            let worker = &mut running[index];
            let waited = if report.interrupted {
                None
            } else {
                tokio::select! {
                    status = worker.child.wait() => Some(status),
                    _ = &mut shutdown => {
                        tracing::warn!("🛑 Shutdown requested, stopping remaining workers");
                        report.interrupted = true;
                        None
                    }
                }
            };

            let status = match waited {
                Some(status) => status,
                None => worker.stop().await,
            };
            let status = match status {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!("❌ Lost track of worker on port {}: {}", worker.port, e);
                    reap(&mut running[index + 1..]).await;
                    return Err(e.into());
                }
            };
            let outcome = ExitOutcome::from(status);
            if !outcome.success() && !report.interrupted {
                tracing::warn!("⚠️ Worker on port {} exited with {:?}", worker.port, outcome);
            }

            report.exits.push(WorkerExit {
                port: worker.port,
                pid: worker.pid,
                outcome,
            });
        }

        tracing::info!(
            "✅ All {} workers exited ({} unsuccessful)",
            report.exits.len(),
            report.failed().count()
        );
        Ok(report)
    }

    pub async fn run(&self, specs: &[WorkerSpec]) -> Result<LaunchReport> {
        self.run_until(specs, std::future::pending()).await
    }
}
