use clap::Parser;
use fleetctl::config::cli::{Command, PoolAction};
use fleetctl::core::cleanup::terminate_matching;
use fleetctl::core::launcher::build_worker_specs;
use fleetctl::core::router;
use fleetctl::utils::monitor::WorkerMonitor;
use fleetctl::utils::{logger, validation::Validate};
use fleetctl::{
    CliConfig, ContainerCleanup, DockerCli, FleetConfig, FleetError, RestartSequence,
    SysinfoProcessTable, TokioCommandRunner, VmPool, WorkerLauncher,
};
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI args: {:?}", cli);

    let mut config = match FleetConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };
    cli.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        exit_with(&e);
    }

    match run(&cli, config).await {
        Ok(code) => std::process::exit(code),
        Err(e) => exit_with(&e),
    }
}

fn exit_with(e: &FleetError) -> ! {
    tracing::error!(
        "❌ {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code());
}

/// Returns the process exit code on success.
async fn run(cli: &CliConfig, config: FleetConfig) -> fleetctl::Result<i32> {
    match &cli.command {
        Command::Restart(_) => {
            let sequence = RestartSequence::new(
                SysinfoProcessTable::new(),
                TokioCommandRunner::new(),
                config.restart,
            );
            let outcome = sequence.run().await?;
            println!(
                "✅ Restarted (pid {}, {} old processes terminated)",
                outcome.pid, outcome.terminated
            );
            println!("📁 Output: {}", outcome.log_file.display());
            Ok(0)
        }
        Command::Launch(_) => {
            let specs = build_worker_specs(&config.workers)?;
            if config.workers.cleanup_containers {
                cleanup_containers(&config).await;
            }

            let launcher = WorkerLauncher::new(config.workers.log_dir.clone());
            let report = launcher.run_until(&specs, shutdown_signal()).await?;
            for exit in report.failed() {
                eprintln!("⚠️ Worker on port {} exited with code {}", exit.port, exit.outcome.code());
            }
            Ok(report.exit_code())
        }
        Command::Cleanup { kill } => {
            if let Some(pattern) = kill {
                let killed = terminate_matching(&SysinfoProcessTable::new(), pattern);
                println!("🔪 Terminated {} processes matching '{}'", killed.len(), pattern);
            }
            let report = cleanup_containers(&config).await;
            println!("🧹 Removed {} containers", if report.removed { report.found } else { 0 });
            Ok(0)
        }
        Command::Status { pattern } => {
            let pattern = pattern.as_deref().unwrap_or(&config.workers.program);
            let stats = WorkerMonitor::new().snapshot(pattern);
            WorkerMonitor::log_stats(&stats);
            println!("{:>8} {:>6} {:>7} {:>8}  COMMAND", "PID", "PORT", "CPU%", "MEM(MB)");
            for s in &stats {
                println!(
                    "{:>8} {:>6} {:>7.1} {:>8}  {}",
                    s.pid,
                    s.port.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                    s.cpu_usage,
                    s.memory_usage_mb,
                    s.command_line
                );
            }
            Ok(0)
        }
        Command::Pool(args) => run_pool(&args.action, &config).await,
        Command::Route(_) => {
            let listener = router::bind(config.router.bind_addr()?).await?;
            router::serve(listener, config.workers.ports.clone(), shutdown_signal()).await?;
            Ok(0)
        }
    }
}

async fn cleanup_containers(config: &FleetConfig) -> fleetctl::core::cleanup::CleanupReport {
    let runtime = DockerCli::new(TokioCommandRunner::new(), &config.containers.runtime);
    ContainerCleanup::new(runtime).run().await
}

async fn run_pool(action: &PoolAction, config: &FleetConfig) -> fleetctl::Result<i32> {
    let pool = VmPool::open(&config.pool.state_dir, config.pool.max_vm_id)?;
    let interval = config.pool.sweep_interval_secs;

    match action {
        PoolAction::Allocate => println!("{}", serde_json::json!({ "vm_id": pool.allocate()? })),
        PoolAction::Release { target } => {
            let released = pool.release(*target)?;
            println!("{}", serde_json::json!({ "released": released }));
        }
        PoolAction::Touch { vm_id } => pool.touch(*vm_id)?,
        PoolAction::SetTimeout { vm_id, seconds } => pool.set_timeout(*vm_id, *seconds)?,
        PoolAction::Sweep { .. } => {
            let reclaimed = pool.sweep(interval)?;
            println!("{}", serde_json::json!({ "reclaimed": reclaimed }));
        }
        PoolAction::Watch { .. } => {
            tracing::info!("⏰ Sweeping {} every {}s", pool.state_dir().display(), interval);
            let mut ticker = tokio::time::interval(Duration::from_secs(interval));
            // The first tick fires immediately; leases only age after a full interval.
            ticker.tick().await;
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = pool.sweep(interval) {
                            tracing::error!("❌ Sweep failed: {}", e);
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
        }
        PoolAction::Status => {
            let snapshot = pool.snapshot()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }
    Ok(0)
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl-C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
