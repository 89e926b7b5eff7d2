use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_NAME: &str = "gmdex";
const CONFIG_FILE: &str = "config.json";
const ENRICHMENT_CACHE_FILE: &str = "extra_xml_data.json";

/// Environment variable that overrides the relay host
pub const HOST_ENV: &str = "GMDEX_HOST";

/// Relay endpoint and server tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Bytes per receive; also the largest message a client may send
    pub frame_size: usize,
    /// Concurrent connections the server accepts before closing new ones
    pub max_connections: usize,
    /// How long shutdown waits for readers before force-closing their sockets
    pub stop_timeout_ms: u64,
    /// Read timeout used by readers and the accept loop to poll the stop flag
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1300,
            frame_size: 100,
            max_connections: 64,
            stop_timeout_ms: 2000,
            poll_interval_ms: 100,
            connect_timeout_ms: 3000,
        }
    }
}

impl RelayConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        // A zero read timeout is rejected by the socket layer
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// Apply the `GMDEX_HOST` override if set
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var(HOST_ENV)
            && !host.trim().is_empty()
        {
            self.host = host.trim().to_string();
        }
        self
    }
}

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub relay: RelayConfig,

    /// Numeric ids shorter than this are left-padded with zeros
    #[serde(default = "default_id_width")]
    pub id_width: usize,

    /// Reuse the derived enrichment cache instead of rescanning item XML
    #[serde(default = "default_use_enrichment_cache")]
    pub use_enrichment_cache: bool,

    /// Location of the enrichment cache; defaults to the app data directory
    #[serde(default)]
    pub enrichment_cache: Option<PathBuf>,

    /// Location of the paths record
    #[serde(default = "default_paths_file")]
    pub paths_file: PathBuf,
}

fn default_id_width() -> usize {
    8
}

fn default_use_enrichment_cache() -> bool {
    true
}

fn default_paths_file() -> PathBuf {
    PathBuf::from("paths.json")
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            relay: RelayConfig::default(),
            id_width: default_id_width(),
            use_enrichment_cache: default_use_enrichment_cache(),
            enrichment_cache: None,
            paths_file: default_paths_file(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        Ok(Self::load_stored(None)?.with_env_overrides())
    }

    /// Load the config as stored on disk, without environment overrides.
    ///
    /// `path` defaults to the app data config file. A missing default file
    /// yields the defaults; a missing explicit file is an error.
    pub fn load_stored(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let config_path = get_config_path()?;
                if config_path.exists() {
                    Self::load_from(&config_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Load config from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply `GMDEX_HOST` on top of the stored values
    pub fn with_env_overrides(self) -> Self {
        Self {
            relay: self.relay.with_env_overrides(),
            ..self
        }
    }

    /// Save config to the app data directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&get_config_path()?)
    }

    /// Save config to an explicit file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Resolve the enrichment cache location
    pub fn enrichment_cache_path(&self) -> Result<PathBuf> {
        match &self.enrichment_cache {
            Some(path) => Ok(path.clone()),
            None => Ok(get_app_data_dir()?.join(ENRICHMENT_CACHE_FILE)),
        }
    }
}

/// Filesystem locations of the descriptor sources (`paths.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathsConfig {
    /// Primary item descriptor (`itemname.xml`)
    pub itemname_xml_path: PathBuf,
    /// Primary map descriptor (`mapname.xml`)
    #[serde(default)]
    pub mapname_xml_path: Option<PathBuf>,
    /// Root of the per-item XML tree used for enrichment
    #[serde(default)]
    pub item_xml_path: Option<PathBuf>,
    /// Root that icon paths are resolved against
    #[serde(default)]
    pub image_folder_path: Option<PathBuf>,
}

impl PathsConfig {
    /// Load the paths record. A missing file is an error for the caller to
    /// report; nothing else in the process depends on it.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found", path.display());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let paths: PathsConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(paths.normalized())
    }

    /// Strip trailing slashes the way hand-written records tend to carry them
    pub fn normalized(self) -> Self {
        Self {
            itemname_xml_path: trim_trailing_slash(&self.itemname_xml_path),
            mapname_xml_path: self.mapname_xml_path.as_deref().map(trim_trailing_slash),
            item_xml_path: self.item_xml_path.as_deref().map(trim_trailing_slash),
            image_folder_path: self.image_folder_path.as_deref().map(trim_trailing_slash),
        }
    }
}

fn trim_trailing_slash(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        path.to_path_buf()
    } else {
        PathBuf::from(trimmed)
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
