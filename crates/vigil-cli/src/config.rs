//! Configuration Vault – reads/writes `~/.vigil/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vigil_types::MonitorConfig;

/// Persisted configuration stored in `~/.vigil/config.toml`.
///
/// ```toml
/// [monitor]
/// base_url = "http://localhost:5000"
/// ultrasonic_threshold = 50.0
/// light_threshold = 700.0
/// poll_interval_ms = 1000
/// request_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Path of the config file: `VIGIL_CONFIG` when set, otherwise
/// `~/.vigil/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(explicit) = std::env::var("VIGIL_CONFIG") {
        return PathBuf::from(explicit);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vigil").join("config.toml")
}

/// Load the config from disk with `VIGIL_*` overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut loaded = load_from(&config_path())?;
    if let Some(cfg) = loaded.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(loaded)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `VIGIL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VIGIL_BASE_URL` | `monitor.base_url` |
/// | `VIGIL_ULTRASONIC_THRESHOLD` | `monitor.ultrasonic_threshold` |
/// | `VIGIL_LIGHT_THRESHOLD` | `monitor.light_threshold` |
/// | `VIGIL_POLL_INTERVAL_MS` | `monitor.poll_interval_ms` |
/// | `VIGIL_REQUEST_TIMEOUT_MS` | `monitor.request_timeout_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let m = &mut cfg.monitor;
    if let Some(v) = lookup("VIGIL_BASE_URL") {
        m.base_url = v;
    }
    if let Some(v) = lookup("VIGIL_ULTRASONIC_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
        m.ultrasonic_threshold = v;
    }
    if let Some(v) = lookup("VIGIL_LIGHT_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
        m.light_threshold = v;
    }
    if let Some(v) = lookup("VIGIL_POLL_INTERVAL_MS").and_then(|v| v.trim().parse().ok()) {
        m.poll_interval_ms = v;
    }
    if let Some(v) = lookup("VIGIL_REQUEST_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
        m.request_timeout_ms = v;
    }
}

/// Save the config to disk, creating `~/.vigil/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
