use crate::config::WindowConfig;
use crate::model::PluginDescriptor;
use crate::window::{
    Bounds, ContentSurface, HookError, HostWindow, LifecycleHook, SurfaceFactory, SurfaceId,
    SurfaceSpec, Theme, ViewError, WindowId,
};
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;

const DEFAULT_FONT_SIZE: u32 = 14;

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub install_root: PathBuf,
    pub dev_mode: bool,
    pub theme: Theme,
    pub window: WindowConfig,
}

impl RuntimeOptions {
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            dev_mode: false,
            theme: Theme::Light,
            window: WindowConfig::default(),
        }
    }
}

/// The surface currently tracked by the runtime.
#[derive(Clone)]
pub struct SurfaceSlot {
    pub id: SurfaceId,
    pub surface: Rc<dyn ContentSurface>,
    pub plugin: PluginDescriptor,
    pub owner: WindowId,
    pub in_detach: bool,
    ready: bool,
    closing: bool,
}

impl fmt::Debug for SurfaceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceSlot")
            .field("id", &self.id)
            .field("plugin", &self.plugin.name)
            .field("owner", &self.owner)
            .field("in_detach", &self.in_detach)
            .field("ready", &self.ready)
            .field("closing", &self.closing)
            .finish()
    }
}

struct PendingRemoval {
    snapshot: SurfaceSlot,
    host: Rc<dyn HostWindow>,
}

/// Lifecycle of the content surface hosting the running plugin:
/// idle, attached to the main window, or handed to a detached window.
///
/// Removal is two-phase. [`ViewRuntime::remove_view`] fires `PluginOut` and
/// queues a snapshot; [`ViewRuntime::run_pending`] (the next tick) disposes
/// the snapshot without touching a surface that has replaced it since.
pub struct ViewRuntime {
    factory: Rc<dyn SurfaceFactory>,
    options: RuntimeOptions,
    next_id: u64,
    current: Option<SurfaceSlot>,
    detached: HashSet<SurfaceId>,
    pending: VecDeque<PendingRemoval>,
}

impl ViewRuntime {
    pub fn new(factory: Rc<dyn SurfaceFactory>, options: RuntimeOptions) -> Self {
        Self {
            factory,
            options,
            next_id: 0,
            current: None,
            detached: HashSet::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.options.theme = theme;
    }

    /// Creates and attaches a surface unless one is already attached to the
    /// main window.
    pub fn init(
        &mut self,
        plugin: &PluginDescriptor,
        host: &Rc<dyn HostWindow>,
    ) -> Result<SurfaceId, ViewError> {
        if let Some(slot) = &self.current {
            if !slot.in_detach && !slot.closing {
                return Ok(slot.id);
            }
        }
        self.create_view(plugin, host)
    }

    fn create_view(
        &mut self,
        plugin: &PluginDescriptor,
        host: &Rc<dyn HostWindow>,
    ) -> Result<SurfaceId, ViewError> {
        let index_url = resolve_index_url(plugin, &self.options.install_root, self.options.dev_mode);
        let spec = SurfaceSpec {
            partition: format!("<{}>", plugin.name),
            preload: resolve_preload(plugin, &self.options.install_root, &index_url),
            index_url,
            dev_tools: self.options.dev_mode,
            default_font_size: DEFAULT_FONT_SIZE,
        };
        let surface = self.factory.create_surface(&spec)?;
        self.next_id += 1;
        let id = SurfaceId(self.next_id);

        host.attach_surface(id, Rc::clone(&surface));
        surface.enable_header_relaxation();
        if let Err(err) = surface.load_url(&spec.index_url) {
            host.detach_surface(id);
            surface.destroy();
            return Err(err);
        }

        log::info!("surface {} created for {} at {}", id.0, plugin.name, spec.index_url);
        self.current = Some(SurfaceSlot {
            id,
            surface,
            plugin: plugin.clone(),
            owner: host.id(),
            in_detach: false,
            ready: false,
            closing: false,
        });
        Ok(id)
    }

    /// Handles the first paint-ready signal of surface `id`. Later signals
    /// and signals from replaced surfaces are ignored.
    pub fn on_surface_ready(&mut self, id: SurfaceId, host: &dyn HostWindow) -> bool {
        let layout = self.options.window;
        let theme = self.options.theme;
        let Some(slot) = self.current.as_mut().filter(|slot| slot.id == id) else {
            return false;
        };
        if slot.ready || slot.closing {
            return false;
        }
        slot.ready = true;

        let setting_height = slot
            .plugin
            .plugin_setting
            .as_ref()
            .and_then(|setting| setting.height);
        host.set_size(layout.width, setting_height.unwrap_or(layout.plugin_height));
        slot.surface.set_bounds(Bounds {
            x: 0,
            y: layout.height as i32,
            width: layout.width,
            height: setting_height
                .unwrap_or(layout.plugin_height.saturating_sub(layout.height)),
        });
        slot.surface.set_auto_resize(true, true);

        let payload = slot
            .plugin
            .ext
            .as_ref()
            .and_then(|ext| serde_json::to_value(ext).ok());
        dispatch_hook(slot.surface.as_ref(), LifecycleHook::PluginEnter, payload.as_ref());
        dispatch_hook(slot.surface.as_ref(), LifecycleHook::PluginReady, payload.as_ref());
        if theme == Theme::Dark {
            slot.surface.apply_theme(Theme::Dark);
        }
        host.notify_plugin_loaded(&slot.plugin);
        true
    }

    pub fn get_view(&self) -> Option<&SurfaceSlot> {
        self.current.as_ref()
    }

    /// Destroys the current surface immediately, without hooks.
    pub fn close_view(&mut self) {
        if let Some(slot) = self.current.take() {
            self.detached.remove(&slot.id);
            slot.surface.destroy();
        }
    }

    /// Fires `PluginOut` and schedules disposal for the next tick.
    pub fn remove_view(&mut self, host: &Rc<dyn HostWindow>) {
        let Some(slot) = self.current.as_mut() else {
            return;
        };
        if slot.in_detach {
            // The detached window owns the surface and fires its own PluginOut.
            self.current = None;
            return;
        }
        if slot.closing {
            return;
        }
        slot.closing = true;
        let snapshot = slot.clone();
        dispatch_hook(snapshot.surface.as_ref(), LifecycleHook::PluginOut, None);
        self.pending.push_back(PendingRemoval {
            snapshot,
            host: Rc::clone(host),
        });
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Completes queued removals.
    pub fn run_pending(&mut self) {
        while let Some(PendingRemoval { snapshot, host }) = self.pending.pop_front() {
            let is_current = self
                .current
                .as_ref()
                .is_some_and(|slot| slot.id == snapshot.id);

            if self.detached.contains(&snapshot.id) {
                if is_current {
                    self.current = None;
                }
                continue;
            }

            let shown = host.attached_surface();
            host.detach_surface(snapshot.id);
            if shown == Some(snapshot.id) {
                host.clear_surface();
                if is_current {
                    host.reset_idle_chrome();
                    host.focus();
                }
            }
            if is_current {
                self.current = None;
            }
            if !snapshot.surface.is_destroyed() {
                snapshot.surface.destroy();
            }
            log::debug!("surface {} disposed", snapshot.id.0);
        }
    }

    /// Hands the current surface to a detached window. The runtime keeps a
    /// reference until [`ViewRuntime::release_detached`].
    pub fn hand_off(&mut self, window: WindowId) -> Result<SurfaceSlot, ViewError> {
        let slot = self
            .current
            .as_mut()
            .filter(|slot| !slot.in_detach && !slot.closing)
            .ok_or(ViewError::NoSurface)?;
        slot.in_detach = true;
        slot.owner = window;
        self.detached.insert(slot.id);
        Ok(slot.clone())
    }

    /// Forgets a detached surface once its window has closed.
    pub fn release_detached(&mut self, id: SurfaceId) {
        self.detached.remove(&id);
        if self.current.as_ref().is_some_and(|slot| slot.id == id) {
            self.current = None;
        }
    }

    pub fn is_detached(&self, id: SurfaceId) -> bool {
        self.detached.contains(&id)
    }

    /// Runs `hook` on the current surface if the plugin exports it.
    pub fn execute_hooks(&self, hook: LifecycleHook, payload: Option<&Value>) -> bool {
        match &self.current {
            Some(slot) => dispatch_hook(slot.surface.as_ref(), hook, payload),
            None => false,
        }
    }
}

/// Calls `hook` on `surface` when exported. Failures and panics inside the
/// plugin callback are logged and swallowed. Returns whether it ran cleanly.
pub fn dispatch_hook(
    surface: &dyn ContentSurface,
    hook: LifecycleHook,
    payload: Option<&Value>,
) -> bool {
    if surface.is_destroyed() {
        return false;
    }
    let Some(hooks) = surface.hooks() else {
        return false;
    };
    if !hooks.has_hook(hook) {
        return false;
    }
    let outcome = catch_unwind(AssertUnwindSafe(|| hooks.call_hook(hook, payload)))
        .unwrap_or_else(|_| Err(HookError::Panicked(hook.callback_name())));
    match outcome {
        Ok(()) => true,
        Err(err) => {
            log::warn!("plugin hook error: {err}");
            false
        }
    }
}

pub fn resolve_index_url(plugin: &PluginDescriptor, install_root: &Path, dev_mode: bool) -> String {
    let explicit = [plugin.tpl_path.as_deref(), plugin.index_path.as_deref()]
        .into_iter()
        .flatten()
        .find(|path| !path.trim().is_empty());
    if let Some(path) = explicit {
        return path.to_string();
    }
    if dev_mode {
        if let Some(development) = plugin.development.as_deref().filter(|d| !d.trim().is_empty()) {
            return development.to_string();
        }
    }
    let entry = plugin.main.as_deref().unwrap_or("index.html");
    format!(
        "file://{}",
        install_root.join(plugin.origin()).join(entry).display()
    )
}

/// `<plugin dir>/<preload>` when present on disk, else resolved next to the
/// index document.
pub fn resolve_preload(
    plugin: &PluginDescriptor,
    install_root: &Path,
    index_url: &str,
) -> Option<PathBuf> {
    let preload = plugin.preload.as_deref()?;
    let packaged = install_root.join(plugin.origin()).join(preload);
    if packaged.exists() {
        return Some(packaged);
    }
    let index_path = Path::new(index_url.trim_start_matches("file://"));
    let beside_index = index_path
        .parent()
        .map(|dir| dir.join(preload))
        .unwrap_or(packaged);
    Some(beside_index)
}
