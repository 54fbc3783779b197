use crate::config::toml_config::FleetConfig;
use crate::domain::model::ReleaseTarget;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "fleet")]
#[command(about = "Restart the env server, launch its worker fleet and manage VM slots")]
pub struct CliConfig {
    /// Path to TOML configuration file (defaults to ./fleet.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Kill running instances of the app and start it again in the background
    Restart(RestartArgs),
    /// Remove all containers, start one worker per port and wait for them
    Launch(LaunchArgs),
    /// Stop and remove all containers, optionally killing matching processes
    Cleanup {
        /// Also terminate processes whose command line contains this text
        #[arg(long)]
        kill: Option<String>,
    },
    /// Show running workers with CPU and memory usage
    Status {
        /// Command-line substring to look for (defaults to the worker program)
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Inspect or change the shared VM slot pool
    Pool(PoolArgs),
    /// Serve GET /route, handing out worker ports round-robin
    Route(RouteArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RestartArgs {
    /// Environment to activate before launching
    #[arg(long = "env")]
    pub environment: Option<String>,

    #[arg(long)]
    pub entry_point: Option<String>,

    #[arg(long)]
    pub kill_pattern: Option<String>,

    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Start the log file fresh instead of appending
    #[arg(long)]
    pub truncate_log: bool,
}

#[derive(Debug, Clone, Args)]
pub struct LaunchArgs {
    #[arg(long, value_delimiter = ',')]
    pub ports: Vec<u16>,

    #[arg(long)]
    pub module: Option<String>,

    /// Write each worker's output to <dir>/worker-<port>.log
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Do not stop and remove containers first
    #[arg(long)]
    pub skip_cleanup: bool,
}

#[derive(Debug, Clone, Args)]
pub struct PoolArgs {
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    #[arg(long)]
    pub max_vm_id: Option<u32>,

    #[command(subcommand)]
    pub action: PoolAction,
}

#[derive(Debug, Clone, Subcommand)]
pub enum PoolAction {
    /// Take the next free VM id
    Allocate,
    /// Return a VM id (or `all`) to the pool
    Release { target: ReleaseTarget },
    /// Mark a VM as recently used
    Touch { vm_id: u32 },
    /// Start the idle timeout for a VM
    SetTimeout { vm_id: u32, seconds: u64 },
    /// Age leases once and reclaim expired VMs
    Sweep {
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Sweep on a timer until interrupted
    Watch {
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print pool state as JSON
    Status,
}

#[derive(Debug, Clone, Args)]
pub struct RouteArgs {
    #[arg(long)]
    pub bind: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub ports: Vec<u16>,
}

impl CliConfig {
    /// 命令列參數覆蓋設定檔
    pub fn apply_overrides(&self, config: &mut FleetConfig) {
        match &self.command {
            Command::Restart(args) => {
                if let Some(name) = &args.environment {
                    config.restart.environment = Some(name.clone());
                }
                if let Some(entry_point) = &args.entry_point {
                    config.restart.entry_point = entry_point.clone();
                }
                if let Some(pattern) = &args.kill_pattern {
                    config.restart.kill_pattern = Some(pattern.clone());
                }
                if let Some(log_file) = &args.log_file {
                    config.restart.log_file = log_file.clone();
                }
                if args.truncate_log {
                    config.restart.append_log = false;
                }
            }
            Command::Launch(args) => {
                if !args.ports.is_empty() {
                    config.workers.ports = args.ports.clone();
                }
                if let Some(module) = &args.module {
                    config.workers.module = module.clone();
                }
                if let Some(dir) = &args.log_dir {
                    config.workers.log_dir = Some(dir.clone());
                }
                if args.skip_cleanup {
                    config.workers.cleanup_containers = false;
                }
            }
            Command::Pool(args) => {
                if let Some(dir) = &args.state_dir {
                    config.pool.state_dir = dir.clone();
                }
                if let Some(max_vm_id) = args.max_vm_id {
                    config.pool.max_vm_id = max_vm_id;
                }
                match args.action {
                    PoolAction::Sweep {
                        interval: Some(secs),
                    }
                    | PoolAction::Watch {
                        interval: Some(secs),
                    } => config.pool.sweep_interval_secs = secs,
                    _ => {}
                }
            }
            Command::Route(args) => {
                if let Some(bind) = &args.bind {
                    config.router.bind = bind.clone();
                }
                if !args.ports.is_empty() {
                    config.workers.ports = args.ports.clone();
                }
            }
            Command::Cleanup { .. } | Command::Status { .. } => {}
        }
    }
}
