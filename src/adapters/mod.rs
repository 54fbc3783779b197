// Adapters layer: concrete implementations of the domain ports (OS processes, container CLI).

pub mod docker;
pub mod process;

pub use docker::DockerCli;
pub use process::{SysinfoProcessTable, TokioCommandRunner};
