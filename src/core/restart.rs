use crate::config::toml_config::RestartConfig;
use crate::core::cleanup::terminate_matching;
use crate::core::environment::{default_env_dirs, resolve_environment};
use crate::domain::model::{CommandSpec, Environment, LogTarget};
use crate::domain::ports::{CommandRunner, ProcessTable};
use crate::utils::error::Result;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOutcome {
    pub terminated: usize,
    pub pid: u32,
    pub log_file: PathBuf,
    pub environment: Option<Environment>,
}

/// Kill old instances, activate the environment, relaunch in the background.
pub struct RestartSequence<T: ProcessTable, R: CommandRunner> {
    table: T,
    runner: R,
    config: RestartConfig,
}

impl<T: ProcessTable, R: CommandRunner> RestartSequence<T, R> {
    pub fn new(table: T, runner: R, config: RestartConfig) -> Self {
        Self {
            table,
            runner,
            config,
        }
    }

    pub fn app_command(&self) -> CommandSpec {
        let mut command = CommandSpec::new(&self.config.interpreter)
            .arg(&self.config.entry_point)
            .args(self.config.args.iter().cloned());
        if let Some(dir) = &self.config.working_dir {
            command = command.working_dir(dir);
        }
        command
    }

    pub fn log_target(&self) -> LogTarget {
        let path = match &self.config.working_dir {
            Some(dir) if self.config.log_file.is_relative() => dir.join(&self.config.log_file),
            _ => self.config.log_file.clone(),
        };
        LogTarget {
            path,
            append: self.config.append_log,
        }
    }

    pub async fn run(&self) -> Result<RestartOutcome> {
        let pattern = self.config.kill_pattern();
        tracing::info!("🔄 Restarting '{}'", self.app_command().display());

        // No wait for the old processes to exit; a slow shutdown can overlap the new start.
        let terminated = terminate_matching(&self.table, pattern).len();

        let environment = match &self.config.environment {
            Some(name) => {
                let search_dirs = if self.config.env_dirs.is_empty() {
                    default_env_dirs()
                } else {
                    self.config.env_dirs.clone()
                };
                let env = resolve_environment(&self.runner, name, &search_dirs).await?;
                tracing::info!("🐍 Activated environment '{}' ({})", env.name, env.prefix.display());
                Some(env)
            }
            None => None,
        };

        let mut command = self.app_command();
        if let Some(env) = &environment {
            env.activate(&mut command);
        }

        let log = self.log_target();
        write_banner(&log, &command)?;
        // Any truncation already happened with the banner; the child writes after it.
        let pid = self.runner.spawn_detached(
            &command,
            &LogTarget {
                append: true,
                ..log.clone()
            },
        )?;

        tracing::info!("🚀 Started pid {}, output -> {}", pid, log.path.display());

        Ok(RestartOutcome {
            terminated,
            pid,
            log_file: log.path,
            environment,
        })
    }
}

fn write_banner(log: &LogTarget, command: &CommandSpec) -> Result<()> {
    let mut file = crate::adapters::process::open_log(log)?;
    writeln!(
        file,
        "==== {} restart: {} ====",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        command.display()
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCommandRunner, MockProcessTable, MockResponse};
    use crate::utils::error::FleetError;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> RestartConfig {
        RestartConfig {
            log_file: dir.path().join("logs/server.log"),
            ..RestartConfig::default()
        }
    }

    #[tokio::test]
    async fn test_restart_kills_then_spawns_once() {
        let dir = TempDir::new().unwrap();
        let table = MockProcessTable::with_processes(&[
            (11, "python main.py"),
            (12, "python main.py --debug"),
            (13, "nginx"),
        ]);
        let runner = MockCommandRunner::new();
        let sequence = RestartSequence::new(table.clone(), runner.clone(), config_in(&dir));

        let outcome = sequence.run().await.unwrap();

        assert_eq!(outcome.terminated, 2);
        assert_eq!(table.terminated(), vec![11, 12]);
        let spawned = runner.spawned();
        assert_eq!(spawned.len(), 1);
        assert_eq!(spawned[0].command.display(), "python main.py");
        assert_eq!(spawned[0].pid, outcome.pid);
        assert!(spawned[0].log.append);
        assert_eq!(spawned[0].log.path, dir.path().join("logs/server.log"));
    }

    #[tokio::test]
    async fn test_restart_with_nothing_running_still_launches() {
        let dir = TempDir::new().unwrap();
        let sequence = RestartSequence::new(
            MockProcessTable::default(),
            MockCommandRunner::new(),
            config_in(&dir),
        );

        let outcome = sequence.run().await.unwrap();
        assert_eq!(outcome.terminated, 0);

        let log = fs::read_to_string(&outcome.log_file).unwrap();
        assert!(log.contains("restart: python main.py"));
    }

    #[tokio::test]
    async fn test_restart_activates_environment() {
        let dir = TempDir::new().unwrap();
        let envs = dir.path().join("envs");
        fs::create_dir_all(envs.join("gym/bin")).unwrap();
        fs::write(envs.join("gym/bin/python"), "").unwrap();

        let config = RestartConfig {
            environment: Some("gym".to_string()),
            env_dirs: vec![envs.clone()],
            ..config_in(&dir)
        };
        let runner = MockCommandRunner::new();
        let sequence = RestartSequence::new(MockProcessTable::default(), runner.clone(), config);

        let outcome = sequence.run().await.unwrap();
        assert_eq!(outcome.environment.unwrap().prefix, envs.join("gym"));

        let spawned = &runner.spawned()[0];
        assert_eq!(
            spawned.command.program,
            envs.join("gym/bin/python").to_string_lossy()
        );
        assert_eq!(spawned.command.env.get("CONDA_DEFAULT_ENV").unwrap(), "gym");
    }

    #[tokio::test]
    async fn test_missing_environment_blocks_launch() {
        let dir = TempDir::new().unwrap();
        let config = RestartConfig {
            environment: Some("missing".to_string()),
            env_dirs: vec![dir.path().join("envs")],
            ..config_in(&dir)
        };
        let runner = MockCommandRunner::new();
        runner.respond("conda env list --json", MockResponse::missing_program());
        let table = MockProcessTable::with_processes(&[(5, "python main.py")]);
        let sequence = RestartSequence::new(table.clone(), runner.clone(), config);

        let err = sequence.run().await.unwrap_err();
        assert!(matches!(err, FleetError::EnvironmentNotFound { .. }));
        assert_eq!(table.terminated(), vec![5]);
        assert!(runner.spawned().is_empty());
    }

    #[tokio::test]
    async fn test_truncated_log_keeps_fresh_banner() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("logs/server.log");
        fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        fs::write(&log_path, "output of the previous run\n").unwrap();

        let config = RestartConfig {
            append_log: false,
            ..config_in(&dir)
        };
        let runner = MockCommandRunner::new();
        let sequence = RestartSequence::new(MockProcessTable::default(), runner.clone(), config);
        sequence.run().await.unwrap();

        let log = fs::read_to_string(&log_path).unwrap();
        assert!(!log.contains("previous run"));
        assert!(log.starts_with("==== "));
        assert!(log.contains("restart: python main.py"));
        // The child must not truncate a second time over the banner.
        assert!(runner.spawned()[0].log.append);
    }

    #[test]
    fn test_relative_log_follows_working_dir() {
        let config = RestartConfig {
            working_dir: Some(PathBuf::from("/srv/app")),
            log_file: PathBuf::from("server.log"),
            args: vec!["--workers".to_string(), "4".to_string()],
            ..RestartConfig::default()
        };
        let sequence =
            RestartSequence::new(MockProcessTable::default(), MockCommandRunner::new(), config);

        assert_eq!(sequence.log_target().path, PathBuf::from("/srv/app/server.log"));
        assert_eq!(sequence.app_command().display(), "python main.py --workers 4");
    }
}
