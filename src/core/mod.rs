pub mod cleanup;
pub mod environment;
pub mod launcher;
pub mod pool;
pub mod restart;
pub mod router;

pub use crate::domain::model::{CommandSpec, LaunchReport, WorkerSpec};
pub use crate::domain::ports::{CommandRunner, ContainerRuntime, ProcessTable};
pub use crate::utils::error::Result;
