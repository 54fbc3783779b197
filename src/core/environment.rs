use crate::domain::model::{CommandSpec, Environment};
use crate::domain::ports::CommandRunner;
use crate::utils::error::{FleetError, Result};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Where named environments usually live when no `env_dirs` are configured.
pub fn default_env_dirs() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| {
            vec![
                home.join("miniconda3/envs"),
                home.join("anaconda3/envs"),
                home.join(".conda/envs"),
            ]
        })
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct CondaEnvList {
    #[serde(default)]
    envs: Vec<PathBuf>,
}

/// Resolve an environment name to its prefix directory.
///
/// Lookup order: a literal existing path, `<dir>/<name>` under each search dir,
/// then the prefixes reported by `conda env list --json`.
pub async fn resolve_environment<R: CommandRunner + ?Sized>(
    runner: &R,
    name: &str,
    search_dirs: &[PathBuf],
) -> Result<Environment> {
    let literal = Path::new(name);
    if literal.components().count() > 1 && literal.is_dir() {
        return Ok(Environment {
            name: env_name(literal, name),
            prefix: literal.to_path_buf(),
        });
    }

    if let Some(prefix) = search_dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
    {
        tracing::debug!("Environment '{}' found at {}", name, prefix.display());
        return Ok(Environment {
            name: name.to_string(),
            prefix,
        });
    }

    match query_conda(runner, name).await {
        Some(prefix) => Ok(Environment {
            name: name.to_string(),
            prefix,
        }),
        None => Err(FleetError::EnvironmentNotFound {
            name: name.to_string(),
        }),
    }
}

async fn query_conda<R: CommandRunner + ?Sized>(runner: &R, name: &str) -> Option<PathBuf> {
    let command = CommandSpec::new("conda").args(["env", "list", "--json"]);
    let output = match runner.output(&command).await {
        Ok(output) if output.success() => output,
        Ok(output) => {
            tracing::debug!("conda env list exited with {:?}", output.code);
            return None;
        }
        Err(e) => {
            tracing::debug!("conda not available: {}", e);
            return None;
        }
    };

    let listing: CondaEnvList = match serde_json::from_str(&output.stdout) {
        Ok(listing) => listing,
        Err(e) => {
            tracing::warn!("Unreadable conda env list: {}", e);
            return None;
        }
    };

    // The base environment is the install root, so it never matches by file name.
    if name == "base" {
        return listing.envs.into_iter().next();
    }

    listing
        .envs
        .into_iter()
        .find(|prefix| prefix.file_name().is_some_and(|file| file == name))
}

fn env_name(prefix: &Path, fallback: &str) -> String {
    prefix
        .file_name()
        .map(|file| file.to_string_lossy().into_owned())
        .unwrap_or_else(|| fallback.to_string())
}

impl Environment {
    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// Make `command` run inside this environment, the way `conda activate` would for a shell.
    pub fn activate(&self, command: &mut CommandSpec) {
        let bin_dir = self.bin_dir();

        let inherited = command
            .env
            .get("PATH")
            .map(OsString::from)
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        let mut paths = vec![bin_dir.clone()];
        paths.extend(std::env::split_paths(&inherited));
        if let Ok(joined) = std::env::join_paths(paths) {
            command
                .env
                .insert("PATH".to_string(), joined.to_string_lossy().into_owned());
        }

        command.env.insert(
            "CONDA_PREFIX".to_string(),
            self.prefix.to_string_lossy().into_owned(),
        );
        command
            .env
            .insert("CONDA_DEFAULT_ENV".to_string(), self.name.clone());

        if !command.program.contains(std::path::MAIN_SEPARATOR) {
            let candidate = bin_dir.join(&command.program);
            if candidate.is_file() {
                command.program = candidate.to_string_lossy().into_owned();
            }
        }
    }
}
