//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name used under the OS config/data folders
pub const APP_DIR: &str = "lead-enrich";

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "LEAD_ENRICH_CONFIG";

/// Environment variable naming the root (data) folder
pub const ROOT_FOLDER_ENV_VAR: &str = "LEAD_ENRICH_ROOT";

/// User-Agent sent by every outbound HTTP client
pub fn get_user_agent() -> String {
    format!(
        "lead-enrich/{} (+https://github.com/lead-enrich/lead-enrich)",
        env!("CARGO_PKG_VERSION")
    )
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. `root_folder` key of the TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config_file: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(config_path) = config_file {
        if let Ok(content) = std::fs::read_to_string(config_path) {
            if let Ok(value) = toml::from_str::<toml::Value>(&content) {
                if let Some(root) = value.get("root_folder").and_then(|v| v.as_str()) {
                    return PathBuf::from(root);
                }
            }
        }
    }

    default_root_folder()
}

/// OS-dependent default root folder (`~/.local/share/lead-enrich` on Linux)
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("./lead_enrich_data"))
}

/// Locate the config file: explicit path, then env var, then the user config dir.
///
/// Returns `None` when no file exists; callers fall back to defaults.
pub fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    let user_config = dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))?;
    user_config.exists().then_some(user_config)
}

/// Read and deserialize a TOML file
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Serialize and write a TOML file atomically (temp file + rename)
pub fn write_toml_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(value)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    write_atomic(path, content.as_bytes())
}

/// Write bytes to `path` via a sibling temp file, fsync, then rename.
///
/// A crash mid-write leaves either the previous file or the new one, never a torn file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", path.display())))?
        .to_string_lossy()
        .into_owned();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Resolve a secret from the environment, then TOML.
///
/// Blank values are ignored. Warns when both sources are set, since the
/// environment silently wins.
pub fn resolve_secret(label: &str, env_var: &str, toml_value: Option<&str>) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| is_valid_key(v));
    let toml_value = toml_value.filter(|v| is_valid_key(v));

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} credential found in both environment ({}) and TOML. Using environment.",
            label, env_var
        );
    }

    if let Some(key) = env_value {
        info!("{} credential loaded from environment variable", label);
        return Some(key.trim().to_string());
    }

    toml_value.map(|key| {
        info!("{} credential loaded from TOML config", label);
        key.trim().to_string()
    })
}

/// Validate a credential (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
