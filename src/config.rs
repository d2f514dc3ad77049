use crate::utils::get_data_dir;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Topology file used when neither the CLI nor the config names one
pub const DEFAULT_TOPOLOGY_PATH: &str = match option_env!("PODFW_DEFAULT_TOPOLOGY") {
    Some(path) => path,
    None => "/opt/robot/config.json",
};

/// Settings for reaching the PodNet nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Node topology file (IPv6 subnet and enabled flags)
    #[serde(default = "default_topology_path")]
    pub topology_path: PathBuf,
    /// Remote user for ssh
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// ssh client binary
    #[serde(default = "default_ssh_program")]
    pub ssh_program: String,
    /// Passed to ssh as `ConnectTimeout`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Node-local directory where candidate documents are staged
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    /// Base chain priority used when `--priority` is not given
    #[serde(default)]
    pub default_priority: i32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            topology_path: default_topology_path(),
            ssh_user: default_ssh_user(),
            ssh_program: default_ssh_program(),
            connect_timeout_secs: default_connect_timeout(),
            temp_dir: default_temp_dir(),
            default_priority: 0,
        }
    }
}

fn default_topology_path() -> PathBuf {
    PathBuf::from(DEFAULT_TOPOLOGY_PATH)
}

fn default_ssh_user() -> String {
    "robot".to_string()
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

/// Path of the persisted config file, if the data directory is known
pub fn config_path() -> Option<PathBuf> {
    get_data_dir().map(|mut path| {
        path.push("config.json");
        path
    })
}

/// Saves the config to disk using an atomic write pattern.
/// 1. Writes to a temporary file.
/// 2. Sets restrictive permissions (0o600).
/// 3. Atomically renames to the target path.
///
/// # Errors
///
/// Returns `Err` if the data directory is unknown or the file cannot be written.
pub async fn save_config(config: &AppConfig) -> std::io::Result<PathBuf> {
    let path = config_path().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "Data directory not found")
    })?;
    save_config_to(config, &path).await?;
    Ok(path)
}

/// Atomic write of `config` to an explicit path.
///
/// # Errors
///
/// Returns `Err` if the temp file cannot be written or renamed.
pub async fn save_config_to(config: &AppConfig, path: &std::path::Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    // Create file with restrictive permissions from the start
    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        use tokio::io::AsyncWriteExt;

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save configuration. Free up space and try again.",
            )
        } else {
            e
        }
    })
}

/// Loads the config from disk, or returns default if not found.
pub async fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path).await,
        None => AppConfig::default(),
    }
}

/// Loads the config from an explicit path, falling back to defaults when
/// the file is missing or unreadable.
pub async fn load_config_from(path: &std::path::Path) -> AppConfig {
    if let Ok(json) = tokio::fs::read_to_string(path).await {
        match serde_json::from_str::<AppConfig>(&json) {
            Ok(config) => return config,
            Err(e) => tracing::warn!("Ignoring unreadable config {}: {}", path.display(), e),
        }
    }
    AppConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ssh_user, "robot");
        assert_eq!(config.temp_dir, PathBuf::from("/tmp"));
        assert_eq!(config.topology_path, PathBuf::from(DEFAULT_TOPOLOGY_PATH));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"ssh_user": "ops"}"#).unwrap();
        assert_eq!(config.ssh_user, "ops");
        assert_eq!(config.ssh_program, "ssh");
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = AppConfig {
            ssh_user: "ops".into(),
            default_priority: -10,
            ..AppConfig::default()
        };
        save_config_to(&config, &path).await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        assert_eq!(load_config_from(&path).await, config);
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_load_missing_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.json")).await;
        assert_eq!(config, AppConfig::default());
    }
}
