use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Failed to spawn '{command}': {source}")]
    SpawnError {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{command}' failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Environment '{name}' not found")]
    EnvironmentNotFound { name: String },

    #[error("No available VMs")]
    NoAvailableVm,

    #[error("VM ID {vm_id} not available")]
    VmNotActive { vm_id: u32 },

    #[error("Failed to lock state at {path}: {source}")]
    LockError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {message}")]
    ServerError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Process,
    Environment,
    Pool,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl FleetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FleetError::ConfigError { .. }
            | FleetError::ConfigValidationError { .. }
            | FleetError::InvalidConfigValueError { .. }
            | FleetError::MissingConfigError { .. } => ErrorCategory::Configuration,
            FleetError::SpawnError { .. } | FleetError::CommandFailed { .. } => {
                ErrorCategory::Process
            }
            FleetError::EnvironmentNotFound { .. } => ErrorCategory::Environment,
            FleetError::NoAvailableVm | FleetError::VmNotActive { .. } => ErrorCategory::Pool,
            FleetError::IoError(_)
            | FleetError::SerializationError(_)
            | FleetError::LockError { .. }
            | FleetError::ServerError { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            FleetError::NoAvailableVm
            | FleetError::VmNotActive { .. }
            | FleetError::CommandFailed { .. } => ErrorSeverity::Medium,
            FleetError::ConfigError { .. }
            | FleetError::ConfigValidationError { .. }
            | FleetError::InvalidConfigValueError { .. }
            | FleetError::MissingConfigError { .. }
            | FleetError::EnvironmentNotFound { .. }
            | FleetError::SpawnError { .. } => ErrorSeverity::High,
            FleetError::IoError(_)
            | FleetError::SerializationError(_)
            | FleetError::LockError { .. }
            | FleetError::ServerError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            FleetError::ConfigError { .. } | FleetError::ConfigValidationError { .. } => {
                "Check fleet.toml syntax and field names".to_string()
            }
            FleetError::InvalidConfigValueError { field, .. } => {
                format!("Fix the value of '{}' in fleet.toml or on the command line", field)
            }
            FleetError::MissingConfigError { field } => {
                format!("Set '{}' in fleet.toml or pass it as a flag", field)
            }
            FleetError::SpawnError { command, .. } => {
                format!("Make sure '{}' is installed and on PATH", command)
            }
            FleetError::CommandFailed { command, .. } => {
                format!("Run '{}' by hand to see the full error", command)
            }
            FleetError::EnvironmentNotFound { name } => format!(
                "Create the environment with 'conda create -n {}' or add its parent to restart.env_dirs",
                name
            ),
            FleetError::NoAvailableVm => {
                "Release idle VMs with 'fleet pool release all' or run 'fleet pool sweep'".to_string()
            }
            FleetError::VmNotActive { .. } => {
                "Allocate a VM first with 'fleet pool allocate'".to_string()
            }
            FleetError::LockError { path, .. } => {
                format!("Check permissions on {}", path.display())
            }
            FleetError::IoError(_) | FleetError::SerializationError(_) => {
                "Check disk space and file permissions; delete corrupted state files".to_string()
            }
            FleetError::ServerError { .. } => {
                "Make sure the bind address is free".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Process => format!("Process problem: {}", self),
            ErrorCategory::Environment => format!("Environment problem: {}", self),
            ErrorCategory::Pool => format!("VM pool: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    /// CLI exit code derived from severity; never 0.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low | ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
