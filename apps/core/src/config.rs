use crate::package_manager::VersionComparator;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REGISTRY: &str = "https://registry.npmmirror.com/";
pub const DEFAULT_CDN_BASE: &str = "https://cdn.jsdelivr.net/npm/";
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to encode TOML config: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("failed to parse JSON config: {0}")]
    Json5(#[from] json5::Error),
    #[error("failed to encode JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub install_dir: PathBuf,
    pub registry: String,
    pub cdn_base: String,
    pub program: String,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    pub registry_timeout_ms: u64,
    pub version_comparator: VersionComparator,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            install_dir: stable_app_data_dir().join("plugins"),
            registry: DEFAULT_REGISTRY.to_string(),
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            program: "npm".to_string(),
            retries: 3,
            retry_backoff_ms: 0,
            registry_timeout_ms: 2_000,
            version_comparator: VersionComparator::default(),
        }
    }
}

impl PluginConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub match_cache_capacity: usize,
    pub plugin_cache_ttl_ms: u64,
    pub icon_cache_capacity: usize,
    pub debounce_ms: u64,
    pub debounce_leading: bool,
    pub debounce_trailing: bool,
    pub incremental: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            match_cache_capacity: 1_000,
            plugin_cache_ttl_ms: 10_000,
            icon_cache_capacity: 100,
            debounce_ms: 100,
            debounce_leading: true,
            debounce_trailing: false,
            incremental: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_height: u32,
    pub plugin_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 900,
            height: 60,
            min_height: 60,
            plugin_height: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppsConfig {
    pub roots: Vec<PathBuf>,
    pub icon_roots: Vec<PathBuf>,
    pub max_depth: usize,
}

impl Default for AppsConfig {
    fn default() -> Self {
        Self {
            roots: default_app_roots(),
            icon_roots: default_icon_roots(),
            max_depth: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub default_icon: PathBuf,
    pub dark_mode: bool,
    pub dev_mode: bool,
    pub history_limit: usize,
    pub plugins: PluginConfig,
    pub search: SearchConfig,
    pub window: WindowConfig,
    pub apps: AppsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let base = stable_app_data_dir();
        Self {
            config_path: base.join("config.toml"),
            db_path: base.join("hopper.sqlite3"),
            log_dir: base.join("logs"),
            default_icon: base.join("logo.png"),
            dark_mode: false,
            dev_mode: false,
            history_limit: 8,
            plugins: PluginConfig::default(),
            search: SearchConfig::default(),
            window: WindowConfig::default(),
            apps: AppsConfig::default(),
        }
    }
}

pub fn stable_app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("hopper")
}

pub fn default_config_path() -> PathBuf {
    stable_app_data_dir().join("config.toml")
}

fn default_app_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if cfg!(target_os = "macos") {
        roots.push(PathBuf::from("/Applications"));
        roots.push(PathBuf::from("/System/Applications"));
    } else if cfg!(target_os = "windows") {
        if let Some(data) = dirs::data_dir() {
            roots.push(data.join("Microsoft/Windows/Start Menu/Programs"));
        }
        roots.push(PathBuf::from(
            "C:/ProgramData/Microsoft/Windows/Start Menu/Programs",
        ));
    } else {
        roots.push(PathBuf::from("/usr/share/applications"));
        if let Some(data) = dirs::data_dir() {
            roots.push(data.join("applications"));
        }
    }
    roots
}

fn default_icon_roots() -> Vec<PathBuf> {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        Vec::new()
    } else {
        vec![
            PathBuf::from("/usr/share/icons/hicolor"),
            PathBuf::from("/usr/share/pixmaps"),
        ]
    }
}

/// Loads `path` (or the default location). A missing file yields defaults.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_config_path);

    let mut cfg = match fs::read_to_string(&path) {
        Ok(raw) => parse(&path, &raw)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Config::default(),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    cfg.config_path = path;
    validate(&cfg)?;
    Ok(cfg)
}

fn parse(path: &Path, raw: &str) -> Result<Config, ConfigError> {
    if is_json(path) {
        Ok(json5::from_str(raw)?)
    } else {
        Ok(toml::from_str(raw)?)
    }
}

pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    validate(cfg)?;
    let encoded = if is_json(&cfg.config_path) {
        serde_json::to_string_pretty(cfg)?
    } else {
        toml::to_string_pretty(cfg)?
    };
    if let Some(parent) = cfg.config_path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&cfg.config_path, encoded).map_err(|source| ConfigError::Io {
        path: cfg.config_path.clone(),
        source,
    })
}

fn is_json(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json") | Some("json5")
    )
}

pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let invalid = |message: &str| Err(ConfigError::Invalid(message.to_string()));

    if cfg.history_limit == 0 || cfg.history_limit > MAX_HISTORY_LIMIT {
        return invalid("history_limit out of range");
    }
    if cfg.db_path.as_os_str().is_empty() {
        return invalid("db_path is required");
    }
    if cfg.plugins.install_dir.as_os_str().is_empty() {
        return invalid("plugins.install_dir is required");
    }
    if !is_http_url(&cfg.plugins.registry) {
        return invalid("plugins.registry must be an http(s) URL");
    }
    if !is_http_url(&cfg.plugins.cdn_base) {
        return invalid("plugins.cdn_base must be an http(s) URL");
    }
    if cfg.plugins.program.trim().is_empty() {
        return invalid("plugins.program is required");
    }
    if cfg.plugins.retries > 10 {
        return invalid("plugins.retries out of range");
    }
    if cfg.plugins.registry_timeout_ms == 0 {
        return invalid("plugins.registry_timeout_ms must be positive");
    }
    if cfg.search.match_cache_capacity == 0 || cfg.search.icon_cache_capacity == 0 {
        return invalid("cache capacities must be positive");
    }
    let window = &cfg.window;
    if window.width == 0 || window.height == 0 || window.min_height == 0 {
        return invalid("window dimensions must be positive");
    }
    if window.plugin_height < window.height {
        return invalid("window.plugin_height must not be below window.height");
    }
    Ok(())
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::{load, save, validate, Config, ConfigError};
    use crate::package_manager::VersionComparator;
    use std::fs;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        validate(&cfg).unwrap();
        assert_eq!(cfg.plugins.retries, 3);
        assert_eq!(cfg.search.match_cache_capacity, 1_000);
        assert_eq!(cfg.window.plugin_height, 600);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.config_path, path);
        assert_eq!(cfg.history_limit, 8);
    }

    #[test]
    fn partial_toml_and_json5_fill_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("config.toml");
        fs::write(
            &toml_path,
            "dark_mode = true\n[plugins]\nversion_comparator = \"numeric\"\n",
        )
        .unwrap();
        let cfg = load(Some(&toml_path)).unwrap();
        assert!(cfg.dark_mode);
        assert_eq!(cfg.plugins.version_comparator, VersionComparator::Numeric);
        assert_eq!(cfg.plugins.program, "npm");

        let json_path = dir.path().join("config.json5");
        fs::write(&json_path, "{ // comment\n history_limit: 4, search: { incremental: false } }").unwrap();
        let cfg = load(Some(&json_path)).unwrap();
        assert_eq!(cfg.history_limit, 4);
        assert!(!cfg.search.incremental);
    }

    #[test]
    fn save_round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.config_path = dir.path().join("nested").join("config.toml");
        cfg.history_limit = 5;
        save(&cfg).unwrap();

        let loaded = load(Some(&cfg.config_path)).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut cfg = Config::default();
        cfg.plugins.registry = "ftp://mirror".to_string();
        match validate(&cfg) {
            Err(ConfigError::Invalid(message)) => assert!(message.contains("registry")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
