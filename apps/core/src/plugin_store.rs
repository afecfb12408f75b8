use crate::model::PluginDescriptor;
use crate::package_manager::{InstallOptions, PackageError, PackageManager};
use crate::plugin_index::PluginSource;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const LOCAL_PLUGINS_FILE: &str = "local-plugins.json";

/// The persisted installed-plugin list, read straight from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginListFile {
    path: PathBuf,
}

impl PluginListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(install_dir: &Path) -> Self {
        Self::new(install_dir.join(LOCAL_PLUGINS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Result<Vec<PluginDescriptor>, PackageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_str(&raw).map_err(|err| {
            PackageError::MalformedDescriptor(format!("{}: {err}", self.path.display()))
        })
    }

    pub fn write(&self, plugins: &[PluginDescriptor]) -> Result<(), PackageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let encoded = serde_json::to_string_pretty(plugins)
            .map_err(|err| PackageError::MalformedDescriptor(err.to_string()))?;
        fs::write(&self.path, encoded)?;
        Ok(())
    }
}

impl PluginSource for PluginListFile {
    fn load_plugins(&self) -> Vec<PluginDescriptor> {
        self.read().unwrap_or_else(|err| {
            log::warn!("installed plugin list unreadable: {err}");
            Vec::new()
        })
    }
}

/// In-memory view of the installed plugins, written through on every change.
pub struct LocalPlugins {
    file: PluginListFile,
    install_root: PathBuf,
    plugins: Vec<PluginDescriptor>,
    loaded: bool,
}

impl LocalPlugins {
    pub fn new(file: PluginListFile, install_root: impl Into<PathBuf>) -> Self {
        Self {
            file,
            install_root: install_root.into(),
            plugins: Vec::new(),
            loaded: false,
        }
    }

    pub fn for_manager(manager: &PackageManager) -> Self {
        Self::new(PluginListFile::in_dir(manager.base_dir()), manager.install_root())
    }

    pub fn file(&self) -> &PluginListFile {
        &self.file
    }

    pub fn all(&mut self) -> &[PluginDescriptor] {
        if !self.loaded {
            self.plugins = self.file.load_plugins();
            self.loaded = true;
        }
        &self.plugins
    }

    pub fn names(&mut self) -> Vec<String> {
        self.all().iter().map(|plugin| plugin.name.clone()).collect()
    }

    pub fn find(&mut self, name: &str) -> Option<PluginDescriptor> {
        self.all().iter().find(|plugin| plugin.name == name).cloned()
    }

    /// Prepends `plugin` unless one with the same name exists.
    pub fn add(&mut self, plugin: PluginDescriptor) -> Result<bool, PackageError> {
        if self.all().iter().any(|existing| existing.name == plugin.name) {
            return Ok(false);
        }
        self.plugins.insert(0, plugin);
        self.persist()?;
        Ok(true)
    }

    pub fn update(&mut self, plugin: PluginDescriptor) -> Result<(), PackageError> {
        self.all();
        for existing in self.plugins.iter_mut().filter(|p| p.name == plugin.name) {
            *existing = plugin.clone();
        }
        self.persist()
    }

    /// Re-reads the package metadata of `name` and merges it into the entry.
    pub fn refresh(&mut self, name: &str) -> Result<PluginDescriptor, PackageError> {
        let current = self
            .find(name)
            .ok_or_else(|| PackageError::NotFound(name.to_string()))?;
        let refreshed = merge_package_metadata(&current, &self.plugin_dir(name))?;
        self.update(refreshed.clone())?;
        Ok(refreshed)
    }

    /// Queues the uninstall and drops the entry right away.
    pub fn delete(
        &mut self,
        manager: &PackageManager,
        plugin: &PluginDescriptor,
    ) -> Result<(), PackageError> {
        manager.uninstall(
            &[plugin.name.clone()],
            InstallOptions {
                is_dev: plugin.dev_mode,
            },
        );
        self.all();
        self.plugins.retain(|existing| existing.name != plugin.name);
        self.persist()
    }

    /// Installs `plugin`, completes its metadata and records it.
    pub fn download(
        &mut self,
        manager: &PackageManager,
        plugin: PluginDescriptor,
    ) -> Result<Vec<PluginDescriptor>, PackageError> {
        manager
            .install(
                &[plugin.name.clone()],
                InstallOptions {
                    is_dev: plugin.dev_mode,
                },
            )
            .wait()?;

        let plugin_dir = self.plugin_dir(&plugin.name);
        let mut plugin = if plugin.dev_mode {
            if !plugin_dir.exists() {
                return Err(PackageError::MissingPath(plugin_dir));
            }
            merge_package_metadata(&plugin, &plugin_dir)?
        } else {
            plugin
        };

        let logo_path = plugin_dir.join(format!("logo{}", logo_extension(&plugin.logo)));
        if plugin.logo.starts_with("http://") || plugin.logo.starts_with("https://") {
            if let Err(err) = manager.download_file(&plugin.logo, &logo_path) {
                log::warn!("logo download for {} failed: {err}", plugin.name);
            }
        }
        if logo_path.is_file() {
            plugin.logo_path = Some(logo_path.display().to_string());
        }

        self.add(plugin)?;
        Ok(self.plugins.clone())
    }

    fn plugin_dir(&self, name: &str) -> PathBuf {
        self.install_root.join(name)
    }

    fn persist(&self) -> Result<(), PackageError> {
        self.file.write(&self.plugins)
    }
}

fn logo_extension(logo: &str) -> String {
    let path = logo.split(['?', '#']).next().unwrap_or(logo);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default()
}

/// Overlays `<plugin_dir>/package.json` onto `plugin`.
pub fn merge_package_metadata(
    plugin: &PluginDescriptor,
    plugin_dir: &Path,
) -> Result<PluginDescriptor, PackageError> {
    let package_path = plugin_dir.join("package.json");
    let raw = fs::read_to_string(&package_path)?;
    let package: Value = serde_json::from_str(&raw).map_err(|err| {
        PackageError::MalformedDescriptor(format!("{}: {err}", package_path.display()))
    })?;
    let mut merged = serde_json::to_value(plugin)
        .map_err(|err| PackageError::MalformedDescriptor(err.to_string()))?;
    if let (Value::Object(target), Value::Object(source)) = (&mut merged, package) {
        for (key, value) in source {
            let mut single = Map::new();
            single.insert(key.clone(), value.clone());
            // Keys whose shape does not fit the descriptor are left out.
            match serde_json::from_value::<PluginDescriptor>(Value::Object(single)) {
                Ok(_) => {
                    target.insert(key, value);
                }
                Err(err) => log::debug!("skipping package.json key {key}: {err}"),
            }
        }
    }
    serde_json::from_value(merged).map_err(|err| {
        PackageError::MalformedDescriptor(format!("{}: {err}", package_path.display()))
    })
}
