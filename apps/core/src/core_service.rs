use std::rc::Rc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use crate::action_executor::{AppLauncher, LaunchError, ProcessLauncher};
use crate::config::{validate, Config, ConfigError};
use crate::contract::KeyInput;
use crate::debounce::Debouncer;
use crate::detach::{DetachController, DetachOptions};
use crate::discovery::{DiscoveryProvider, ProviderError};
use crate::document_store::{DocumentStore, SqliteDocumentStore, StoreError};
use crate::history::{HistoryEntry, PluginHistory};
use crate::model::{
    CmdType, FeaturePayload, LocalApp, PluginDescriptor, PluginType, SYSTEM_PLUGIN_NAME,
};
use crate::package_manager::{PackageError, PackageManager, PackageManagerOptions};
use crate::plugin_store::LocalPlugins;
use crate::search::{ActionDispatcher, ActionOption, PluginLaunch, SearchEngine, SearchOptions};
use crate::transport;
use crate::view_runtime::{RuntimeOptions, ViewRuntime};
use crate::window::{
    HostWindow, LifecycleHook, SurfaceFactory, SurfaceId, Theme, ViewError, WindowFactory,
    WindowId,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("package error: {0}")]
    Package(#[from] PackageError),
    #[error("view error: {0}")]
    View(#[from] ViewError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),
    #[error("discovery error: {0}")]
    Discovery(#[from] ProviderError),
    #[error("plugin {name} only supports {supported}, not {os}")]
    UnsupportedPlatform {
        name: String,
        os: String,
        supported: String,
    },
    #[error("plugin not found: {0}")]
    PluginNotFound(String),
}

/// User-facing notifications raised by the host shell.
pub trait Notifier {
    fn notify(&self, title: &str, body: &str);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        log::warn!("{title}: {body}");
    }
}

pub struct ServiceParts {
    pub host: Rc<dyn HostWindow>,
    pub surfaces: Rc<dyn SurfaceFactory>,
    pub windows: Rc<dyn WindowFactory>,
    pub packages: PackageManager,
    pub store: Box<dyn DocumentStore>,
    pub notifier: Box<dyn Notifier>,
    pub launcher: Box<dyn AppLauncher>,
}

/// Ties search, plugin lifecycle, detached windows and history together for
/// one main window.
pub struct CoreService {
    config: Config,
    host: Rc<dyn HostWindow>,
    packages: PackageManager,
    plugins: LocalPlugins,
    search: SearchEngine,
    runtime: ViewRuntime,
    detach: DetachController,
    history: PluginHistory,
    store: Box<dyn DocumentStore>,
    notifier: Box<dyn Notifier>,
    launcher: Box<dyn AppLauncher>,
    debouncer: Debouncer<String>,
    current_plugin: Option<PluginDescriptor>,
}

impl CoreService {
    /// Real package manager, on-disk document store and process launcher.
    pub fn new(
        config: Config,
        host: Rc<dyn HostWindow>,
        surfaces: Rc<dyn SurfaceFactory>,
        windows: Rc<dyn WindowFactory>,
    ) -> Result<Self, ServiceError> {
        validate(&config)?;
        let packages = PackageManager::with_defaults(PackageManagerOptions::from(&config.plugins))?;
        let store = SqliteDocumentStore::open_file(&config.db_path)?;
        Self::with_parts(
            config,
            ServiceParts {
                host,
                surfaces,
                windows,
                packages,
                store: Box::new(store),
                notifier: Box::new(LogNotifier),
                launcher: Box::new(ProcessLauncher),
            },
        )
    }

    pub fn with_parts(config: Config, parts: ServiceParts) -> Result<Self, ServiceError> {
        validate(&config)?;
        let theme = Theme::from_dark_mode(config.dark_mode);
        let install_root = parts.packages.install_root();

        let plugins = LocalPlugins::for_manager(&parts.packages);
        let search = SearchEngine::new(
            Box::new(plugins.file().clone()),
            SearchOptions {
                match_cache_capacity: config.search.match_cache_capacity,
                plugin_cache_ttl: Duration::from_millis(config.search.plugin_cache_ttl_ms),
                incremental: config.search.incremental,
            },
        );
        let runtime = ViewRuntime::new(
            parts.surfaces,
            RuntimeOptions {
                install_root: install_root.clone(),
                dev_mode: config.dev_mode,
                theme,
                window: config.window,
            },
        );
        let detach = DetachController::new(
            parts.windows,
            DetachOptions {
                install_root,
                default_icon: config.default_icon.clone(),
                theme,
                window: config.window,
            },
        );
        let history = PluginHistory::load(parts.store.as_ref(), config.history_limit)?;
        let debouncer = Debouncer::new(
            Duration::from_millis(config.search.debounce_ms),
            config.search.debounce_leading,
            config.search.debounce_trailing,
        );

        Ok(Self {
            config,
            host: parts.host,
            packages: parts.packages,
            plugins,
            search,
            runtime,
            detach,
            history,
            store: parts.store,
            notifier: parts.notifier,
            launcher: parts.launcher,
            debouncer,
            current_plugin: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn packages(&self) -> &PackageManager {
        &self.packages
    }

    pub fn plugins(&mut self) -> &mut LocalPlugins {
        &mut self.plugins
    }

    pub fn runtime(&self) -> &ViewRuntime {
        &self.runtime
    }

    pub fn detach(&self) -> &DetachController {
        &self.detach
    }

    pub fn history(&self) -> &PluginHistory {
        &self.history
    }

    pub fn current_plugin(&self) -> Option<&PluginDescriptor> {
        self.current_plugin.as_ref()
    }

    pub fn set_dark_mode(&mut self, dark: bool) {
        let theme = Theme::from_dark_mode(dark);
        self.config.dark_mode = dark;
        self.runtime.set_theme(theme);
        self.detach.set_theme(theme);
    }

    pub fn search(&mut self, query: &str, strict: bool) -> Vec<ActionOption> {
        self.search.get_options_from_query(query, strict)
    }

    /// Feeds one keystroke of the search bar through the debouncer. Input is
    /// ignored while a plugin owns the main window.
    pub fn on_query_input(&mut self, query: &str, now: Instant) -> Option<Vec<ActionOption>> {
        if self.current_plugin.is_some() {
            return None;
        }
        let query = self.debouncer.submit(query.to_string(), now)?;
        Some(self.search(&query, false))
    }

    /// Runs a trailing search whose quiet period has elapsed.
    pub fn poll_query(&mut self, now: Instant) -> Option<Vec<ActionOption>> {
        let query = self.debouncer.poll(now)?;
        Some(self.search(&query, false))
    }

    pub fn invoke(&mut self, option: &ActionOption) -> Result<(), ServiceError> {
        option.invoke(self)
    }

    pub fn open_descriptor(&mut self, plugin: PluginDescriptor) -> Result<(), ServiceError> {
        let label = plugin.display_name().to_string();
        self.open(plugin, &label)
    }

    fn open(&mut self, mut plugin: PluginDescriptor, label: &str) -> Result<(), ServiceError> {
        let os = std::env::consts::OS;
        if !plugin.supports_platform(os) {
            let supported = plugin.platform.join(",");
            self.notifier.notify(
                &format!("Plugin does not support {os}"),
                &format!("{} only supports {supported}", plugin.display_name()),
            );
            return Err(ServiceError::UnsupportedPlatform {
                name: plugin.name,
                os: os.to_string(),
                supported,
            });
        }

        if plugin.plugin_type == PluginType::App {
            let command = plugin.action.clone().unwrap_or_default();
            let app = LocalApp::new(plugin.display_name(), &command);
            self.launcher.launch(&app)?;
            self.record_history(&plugin, label);
            return Ok(());
        }

        if plugin.name != SYSTEM_PLUGIN_NAME && !plugin.dev_mode {
            match self.packages.upgrade(plugin.origin()) {
                Ok(true) => {
                    if let Err(err) = self.plugins.refresh(&plugin.name) {
                        log::warn!("could not refresh {} after upgrade: {err}", plugin.name);
                    }
                    self.search.rebuild_index();
                }
                Ok(false) => {}
                Err(err) => log::warn!("upgrade check for {} failed: {err}", plugin.name),
            }
        }

        if plugin.ext.is_none() {
            plugin.ext = Some(FeaturePayload {
                code: plugin
                    .features
                    .first()
                    .map(|feature| feature.code.clone())
                    .unwrap_or_default(),
                kind: CmdType::Text,
                payload: Value::Null,
            });
        }

        let layout = self.config.window;
        self.host.set_size(layout.width, layout.height);
        self.remove_plugin();
        self.runtime.init(&plugin, &self.host)?;
        self.record_history(&plugin, label);
        log::info!("opened plugin {}", plugin.name);
        self.current_plugin = Some(plugin);
        self.host.show();
        Ok(())
    }

    fn record_history(&mut self, plugin: &PluginDescriptor, label: &str) {
        let mut entry = HistoryEntry::new(label, plugin.origin());
        entry.icon = plugin.logo_path.clone().or_else(|| Some(plugin.logo.clone()));
        entry.description = plugin.description.clone();
        entry.feature_code = plugin.ext.as_ref().map(|ext| ext.code.clone());
        self.history.record(entry);
        if let Err(err) = self.history.save(self.store.as_ref()) {
            log::warn!("could not persist plugin history: {err}");
        }
    }

    pub fn set_history_pinned(&mut self, name: &str, pin: bool) -> Result<bool, ServiceError> {
        let found = self.history.set_pinned(name, pin);
        if found {
            self.history.save(self.store.as_ref())?;
        }
        Ok(found)
    }

    /// Fires `PluginOut` on the open plugin and queues its disposal.
    pub fn remove_plugin(&mut self) {
        self.runtime.remove_view(&self.host);
        self.current_plugin = None;
    }

    /// Completes work deferred to the next tick.
    pub fn tick(&mut self) {
        self.runtime.run_pending();
    }

    /// First paint of surface `id`. Plugins configured with `autoDetach`
    /// move into their own window right away.
    pub fn surface_ready(&mut self, id: SurfaceId) -> bool {
        if !self.runtime.on_surface_ready(id, self.host.as_ref()) {
            return false;
        }
        let auto_detach = self
            .current_plugin
            .as_ref()
            .and_then(|plugin| plugin.plugin_setting.as_ref())
            .is_some_and(|setting| setting.auto_detach);
        if auto_detach {
            if let Err(err) = self.detach_plugin() {
                log::warn!("auto-detach failed: {err}");
            }
        }
        true
    }

    /// Moves the open plugin into its own window. `None` when no plugin is
    /// open in the main window.
    pub fn detach_plugin(&mut self) -> Result<Option<WindowId>, ServiceError> {
        let Some(plugin) = self.current_plugin.clone() else {
            return Ok(None);
        };
        let id = self.detach.init(&plugin, &self.host, &mut self.runtime)?;
        self.current_plugin = None;
        Ok(Some(id))
    }

    /// Answers one JSON control message from detached window `window`.
    pub fn handle_detach_message(&mut self, window: WindowId, payload: &str) -> String {
        transport::handle_json(&mut self.detach, &mut self.runtime, window, payload)
    }

    pub fn detach_key_input(
        &mut self,
        window: WindowId,
        input: &KeyInput,
    ) -> Result<bool, ServiceError> {
        Ok(self.detach.on_key_input(window, input, &mut self.runtime)?)
    }

    pub fn detach_focused(&self, window: WindowId) {
        self.detach.on_focus(window);
    }

    pub fn detached_window_closed(&mut self, window: WindowId) -> bool {
        self.detach.on_window_closed(window, &mut self.runtime)
    }

    pub fn main_window_shown(&self) -> bool {
        self.runtime.execute_hooks(LifecycleHook::Show, None)
    }

    pub fn main_window_hidden(&self) -> bool {
        self.runtime.execute_hooks(LifecycleHook::Hide, None)
    }

    pub fn sub_input_changed(&self, text: &str) -> bool {
        self.runtime
            .execute_hooks(LifecycleHook::SubInputChange, Some(&json!({ "text": text })))
    }

    /// Installs `plugin` and makes it searchable. Failures are also raised
    /// as a notification.
    pub fn install_plugin(&mut self, plugin: PluginDescriptor) -> Result<(), ServiceError> {
        let name = plugin.name.clone();
        match self.plugins.download(&self.packages, plugin) {
            Ok(_) => {
                self.search.rebuild_index();
                Ok(())
            }
            Err(err) => {
                self.notifier
                    .notify(&format!("Failed to install {name}"), &err.to_string());
                Err(err.into())
            }
        }
    }

    pub fn uninstall_plugin(&mut self, name: &str) -> Result<(), ServiceError> {
        let plugin = self
            .plugins
            .find(name)
            .ok_or_else(|| ServiceError::PluginNotFound(name.to_string()))?;
        self.plugins.delete(&self.packages, &plugin)?;
        if self.history.prune(&self.plugins.names()) {
            self.history.save(self.store.as_ref())?;
        }
        self.search.rebuild_index();
        Ok(())
    }

    pub fn rebuild_index(&mut self) -> usize {
        self.search.rebuild_index();
        self.search.index_len()
    }

    pub fn set_local_apps(&mut self, apps: Vec<LocalApp>) {
        self.search.set_apps(apps);
    }

    pub fn refresh_apps(
        &mut self,
        provider: &mut dyn DiscoveryProvider,
    ) -> Result<usize, ServiceError> {
        let apps = provider.discover()?;
        let count = apps.len();
        log::info!("{} discovered {count} apps", provider.provider_name());
        self.search.set_apps(apps);
        Ok(count)
    }
}

impl ActionDispatcher for CoreService {
    type Error = ServiceError;

    fn open_plugin(&mut self, launch: &PluginLaunch) -> Result<(), ServiceError> {
        let mut plugin = (*launch.plugin).clone();
        plugin.ext = Some(launch.ext.clone().unwrap_or_else(|| FeaturePayload {
            code: launch.feature_code.clone(),
            kind: CmdType::Text,
            payload: Value::Null,
        }));
        self.open(plugin, launch.cmd.label())
    }

    fn launch_app(&mut self, app: &LocalApp) -> Result<(), ServiceError> {
        self.launcher.launch(app)?;
        Ok(())
    }
}
