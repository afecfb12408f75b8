//! Seams between the launcher core and the windowing toolkit that embeds it.
//!
//! The core never draws anything; it drives host windows and content
//! surfaces through these traits. Implementations are single-threaded and
//! use interior mutability, so handles are shared as `Rc<dyn ...>`.

use crate::model::PluginDescriptor;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub type WindowId = u64;

/// Generation number of a content surface; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark_mode(dark: bool) -> Self {
        if dark {
            Self::Dark
        } else {
            Self::Light
        }
    }

    pub fn background(self) -> &'static str {
        match self {
            Self::Light => "#fff",
            Self::Dark => "#1c1c28",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    PluginEnter,
    PluginReady,
    PluginOut,
    Show,
    Hide,
    SubInputChange,
    ScreenCapture,
}

impl LifecycleHook {
    /// Name of the callback a plugin exports for this hook.
    pub fn callback_name(self) -> &'static str {
        match self {
            Self::PluginEnter => "onPluginEnter",
            Self::PluginReady => "onPluginReady",
            Self::PluginOut => "onPluginOut",
            Self::Show => "onShow",
            Self::Hide => "onHide",
            Self::SubInputChange => "onSubInputChange",
            Self::ScreenCapture => "onScreenCapture",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("{hook} failed: {message}")]
    Failed {
        hook: &'static str,
        message: String,
    },
    #[error("{0} panicked")]
    Panicked(&'static str),
}

impl HookError {
    pub fn failed(hook: LifecycleHook, message: impl Into<String>) -> Self {
        Self::Failed {
            hook: hook.callback_name(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("failed to create content surface: {0}")]
    CreateSurface(String),
    #[error("failed to load {url}: {message}")]
    Load { url: String, message: String },
    #[error("failed to create window: {0}")]
    CreateWindow(String),
    #[error("no plugin surface is attached")]
    NoSurface,
    #[error("unknown detached window {0}")]
    UnknownWindow(WindowId),
}

/// Callbacks a running plugin may export. Every hook is optional.
pub trait PluginHooks {
    fn has_hook(&self, hook: LifecycleHook) -> bool;
    fn call_hook(&self, hook: LifecycleHook, payload: Option<&Value>) -> Result<(), HookError>;
}

type HookFn = Box<dyn Fn(Option<&Value>) -> Result<(), HookError>>;

/// Closure-backed [`PluginHooks`].
#[derive(Default)]
pub struct HookTable {
    handlers: HashMap<LifecycleHook, HookFn>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, hook: LifecycleHook, handler: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<(), HookError> + 'static,
    {
        self.handlers.insert(hook, Box::new(handler));
        self
    }
}

impl PluginHooks for HookTable {
    fn has_hook(&self, hook: LifecycleHook) -> bool {
        self.handlers.contains_key(&hook)
    }

    fn call_hook(&self, hook: LifecycleHook, payload: Option<&Value>) -> Result<(), HookError> {
        match self.handlers.get(&hook) {
            Some(handler) => handler(payload),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSpec {
    /// Isolated session partition, one per plugin name.
    pub partition: String,
    pub index_url: String,
    pub preload: Option<PathBuf>,
    pub dev_tools: bool,
    pub default_font_size: u32,
}

/// The embedded region that renders one running plugin.
pub trait ContentSurface {
    fn load_url(&self, url: &str) -> Result<(), ViewError>;
    fn set_bounds(&self, bounds: Bounds);
    fn set_auto_resize(&self, width: bool, height: bool);
    /// Route the surface's traffic through [`relax_request_headers`] and
    /// [`relax_response_headers`].
    fn enable_header_relaxation(&self);
    fn apply_theme(&self, theme: Theme);
    fn hooks(&self) -> Option<Rc<dyn PluginHooks>>;
    fn focus(&self);
    fn destroy(&self);
    fn is_destroyed(&self) -> bool;
}

pub trait SurfaceFactory {
    fn create_surface(&self, spec: &SurfaceSpec) -> Result<Rc<dyn ContentSurface>, ViewError>;
}

/// A top-level window able to own one content surface at a time.
pub trait HostWindow {
    fn id(&self) -> WindowId;
    fn bounds(&self) -> Bounds;
    fn set_size(&self, width: u32, height: u32);
    fn attached_surface(&self) -> Option<SurfaceId>;
    fn attach_surface(&self, id: SurfaceId, surface: Rc<dyn ContentSurface>);
    /// Removes `id` if it is the attached surface.
    fn detach_surface(&self, id: SurfaceId);
    fn clear_surface(&self);
    /// Puts the search bar back into its empty state.
    fn reset_idle_chrome(&self);
    fn notify_plugin_loaded(&self, plugin: &PluginDescriptor);
    fn show(&self);
    fn focus(&self);
}

pub trait DetachedWindow: HostWindow {
    fn init_detach(&self, plugin: &PluginDescriptor);
    fn set_icon(&self, icon: &Path);
    fn apply_theme(&self, theme: Theme);
    fn minimize(&self);
    fn maximize(&self);
    fn unmaximize(&self);
    fn is_maximized(&self) -> bool;
    fn set_always_on_top(&self, on_top: bool);
    fn is_full_screen(&self) -> bool;
    fn set_full_screen(&self, full_screen: bool);
    fn close(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedWindowSpec {
    pub title: String,
    pub bounds: Bounds,
    pub min_height: u32,
    pub theme: Theme,
}

pub trait WindowFactory {
    fn create_detached(&self, spec: &DetachedWindowSpec)
        -> Result<Rc<dyn DetachedWindow>, ViewError>;
}

pub fn relax_request_headers(headers: &mut BTreeMap<String, String>) {
    if !headers.keys().any(|key| key.eq_ignore_ascii_case("referer")) {
        headers.insert("referer".to_string(), "*".to_string());
    }
}

pub fn relax_response_headers(headers: &mut BTreeMap<String, Vec<String>>) {
    if !headers
        .keys()
        .any(|key| key.eq_ignore_ascii_case("access-control-allow-origin"))
    {
        headers.insert(
            "Access-Control-Allow-Origin".to_string(),
            vec!["*".to_string()],
        );
    }
}
