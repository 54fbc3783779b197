use crate::utils::error::{FleetError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "fleet.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub restart: RestartConfig,
    pub workers: WorkersConfig,
    pub containers: ContainersConfig,
    pub pool: PoolConfig,
    pub router: RouterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub interpreter: String,
    pub entry_point: String,
    pub args: Vec<String>,
    /// Substring matched against running command lines; defaults to `entry_point`.
    pub kill_pattern: Option<String>,
    pub environment: Option<String>,
    pub env_dirs: Vec<PathBuf>,
    pub log_file: PathBuf,
    pub append_log: bool,
    pub working_dir: Option<PathBuf>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            entry_point: "main.py".to_string(),
            args: Vec::new(),
            kill_pattern: None,
            environment: None,
            env_dirs: Vec::new(),
            log_file: PathBuf::from("server.log"),
            append_log: true,
            working_dir: None,
        }
    }
}

impl RestartConfig {
    pub fn kill_pattern(&self) -> &str {
        self.kill_pattern.as_deref().unwrap_or(&self.entry_point)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub program: String,
    /// Argument template; `{port}`, `{module}` and `{host}` are substituted per worker.
    pub args: Vec<String>,
    pub module: String,
    pub host: String,
    pub ports: Vec<u16>,
    pub log_dir: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
    pub cleanup_containers: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            program: "uvicorn".to_string(),
            args: ["{module}", "--host", "{host}", "--port", "{port}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            module: "main:app".to_string(),
            host: "0.0.0.0".to_string(),
            ports: (20001..=20020).collect(),
            log_dir: None,
            working_dir: None,
            cleanup_containers: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    pub runtime: String,
}

impl Default for ContainersConfig {
    fn default() -> Self {
        Self {
            runtime: "docker".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub state_dir: PathBuf,
    pub max_vm_id: u32,
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("vm_cache"),
            max_vm_id: 50,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub bind: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:20000".to_string(),
        }
    }
}

impl RouterConfig {
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| FleetError::InvalidConfigValueError {
                field: "router.bind".to_string(),
                value: self.bind.clone(),
                reason: format!("Invalid socket address: {}", e),
            })
    }
}

impl FleetConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(FleetError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| FleetError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// An explicit path must exist; otherwise `fleet.toml` is used when present, defaults when not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE),
            None => {
                tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_FILE);
                Ok(Self::default())
            }
        }
    }

    /// 替換環境變數 (例如 ${CONDA_ENV})，未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| FleetError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("restart.interpreter", &self.restart.interpreter)?;
        validation::validate_non_empty_string("restart.entry_point", &self.restart.entry_point)?;
        validation::validate_non_empty_string("restart.kill_pattern", self.restart.kill_pattern())?;
        validation::validate_path(
            "restart.log_file",
            &self.restart.log_file.to_string_lossy(),
        )?;
        if let Some(name) = &self.restart.environment {
            validation::validate_non_empty_string("restart.environment", name)?;
        }

        validation::validate_non_empty_string("workers.program", &self.workers.program)?;
        validation::validate_port_list("workers.ports", &self.workers.ports)?;

        validation::validate_non_empty_string("containers.runtime", &self.containers.runtime)?;

        validation::validate_path("pool.state_dir", &self.pool.state_dir.to_string_lossy())?;
        validation::validate_positive_number(
            "pool.sweep_interval_secs",
            self.pool.sweep_interval_secs,
            1,
        )?;

        self.router.bind_addr()?;
        Ok(())
    }
}

impl Validate for FleetConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = FleetConfig::from_toml_str("").unwrap();

        assert_eq!(config.workers.ports.len(), 20);
        assert_eq!(config.workers.ports.first(), Some(&20001));
        assert_eq!(config.workers.ports.last(), Some(&20020));
        assert_eq!(config.restart.kill_pattern(), "main.py");
        assert_eq!(config.pool.max_vm_id, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
[restart]
entry_point = "server/main.py"
environment = "gym"
log_file = "logs/server.log"

[workers]
module = "gym_server:app"
ports = [30001, 30002, 30003]
"#;

        let config = FleetConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.restart.interpreter, "python");
        assert_eq!(config.restart.kill_pattern(), "server/main.py");
        assert_eq!(config.restart.environment.as_deref(), Some("gym"));
        assert_eq!(config.workers.ports, vec![30001, 30002, 30003]);
        assert_eq!(config.workers.program, "uvicorn");
        assert_eq!(config.containers.runtime, "docker");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("FLEETCTL_TEST_ENV_NAME", "osgym");

        let toml_content = r#"
[restart]
environment = "${FLEETCTL_TEST_ENV_NAME}"
kill_pattern = "${FLEETCTL_TEST_UNSET_VAR}"
"#;

        let config = FleetConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.restart.environment.as_deref(), Some("osgym"));
        assert_eq!(
            config.restart.kill_pattern(),
            "${FLEETCTL_TEST_UNSET_VAR}"
        );

        std::env::remove_var("FLEETCTL_TEST_ENV_NAME");
    }

    #[test]
    fn test_config_validation() {
        let duplicate_ports = FleetConfig::from_toml_str("[workers]\nports = [1, 1]\n").unwrap();
        assert!(duplicate_ports.validate().is_err());

        let bad_bind = FleetConfig::from_toml_str("[router]\nbind = \"not-an-addr\"\n").unwrap();
        assert!(bad_bind.validate().is_err());

        let zero_interval =
            FleetConfig::from_toml_str("[pool]\nsweep_interval_secs = 0\n").unwrap();
        assert!(zero_interval.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = FleetConfig::from_toml_str("[workers\nports = 3").unwrap_err();
        assert!(matches!(err, FleetError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[containers]\nruntime = \"podman\"\n")
            .unwrap();

        let config = FleetConfig::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.containers.runtime, "podman");
    }
}
