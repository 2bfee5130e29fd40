//! Configuration file and data folder resolution
//!
//! Config file priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. `<user config dir>/mintel/<file_name>`, then `/etc/mintel/<file_name>` on Linux
//! 4. None (service falls back to compiled defaults)

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Resolve which TOML config file to load, if any
///
/// An explicitly named file (CLI or env) is returned even if it does not exist,
/// so the caller can report the misconfiguration instead of silently using defaults.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join("mintel").join(file_name));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/mintel").join(file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// OS-dependent default data folder (database lives here)
pub fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("mintel"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/mintel"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("mintel"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/mintel"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("mintel"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\mintel"))
    } else {
        PathBuf::from("./mintel_data")
    }
}

/// Read a non-empty environment variable
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
