pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod testing;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{DockerCli, SysinfoProcessTable, TokioCommandRunner};
pub use config::FleetConfig;
pub use crate::core::{
    cleanup::ContainerCleanup, launcher::WorkerLauncher, pool::VmPool, restart::RestartSequence,
};
pub use utils::error::{FleetError, Result};
