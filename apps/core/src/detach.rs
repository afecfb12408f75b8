use crate::config::WindowConfig;
use crate::contract::{DetachRequest, KeyEventKind, KeyInput};
use crate::model::PluginDescriptor;
use crate::view_runtime::{dispatch_hook, SurfaceSlot, ViewRuntime};
use crate::window::{
    DetachedWindow, DetachedWindowSpec, HostWindow, LifecycleHook, Theme, ViewError,
    WindowFactory, WindowId,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub const DETACH_CHANNEL: &str = "detach:service";

#[derive(Debug, Clone, PartialEq)]
pub struct DetachOptions {
    pub install_root: PathBuf,
    pub default_icon: PathBuf,
    pub theme: Theme,
    pub window: WindowConfig,
}

struct DetachedSession {
    window: Rc<dyn DetachedWindow>,
    slot: SurfaceSlot,
}

/// Moves the running plugin surface out of the main window into its own
/// window and services that window until it closes.
pub struct DetachController {
    windows: Rc<dyn WindowFactory>,
    options: DetachOptions,
    sessions: Vec<DetachedSession>,
}

impl DetachController {
    pub fn new(windows: Rc<dyn WindowFactory>, options: DetachOptions) -> Self {
        Self {
            windows,
            options,
            sessions: Vec::new(),
        }
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.options.theme = theme;
    }

    pub fn init(
        &mut self,
        plugin: &PluginDescriptor,
        host: &Rc<dyn HostWindow>,
        runtime: &mut ViewRuntime,
    ) -> Result<WindowId, ViewError> {
        if runtime.get_view().is_none_or(|slot| slot.in_detach) {
            return Err(ViewError::NoSurface);
        }
        let layout = self.options.window;
        let theme = self.options.theme;
        let window = self.windows.create_detached(&DetachedWindowSpec {
            title: plugin.display_name().to_string(),
            bounds: host.bounds(),
            min_height: layout.min_height,
            theme,
        })?;
        window.set_icon(&self.icon_for(plugin));

        let slot = match runtime.hand_off(window.id()) {
            Ok(slot) => slot,
            Err(err) => {
                window.close();
                return Err(err);
            }
        };
        host.detach_surface(slot.id);
        slot.surface.set_auto_resize(true, true);
        window.attach_surface(slot.id, Rc::clone(&slot.surface));
        if theme == Theme::Dark {
            window.apply_theme(Theme::Dark);
        }
        window.init_detach(plugin);
        window.show();

        host.reset_idle_chrome();
        host.set_size(layout.width, layout.height);

        let id = window.id();
        log::info!("plugin {} detached into window {id}", plugin.name);
        self.sessions.push(DetachedSession { window, slot });
        Ok(id)
    }

    fn icon_for(&self, plugin: &PluginDescriptor) -> PathBuf {
        let extension = Path::new(&plugin.logo)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let candidates = [
            plugin.logo_path.as_ref().map(PathBuf::from),
            Some(
                self.options
                    .install_root
                    .join(plugin.origin())
                    .join(format!("logo{extension}")),
            ),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|path| path.is_file())
            .unwrap_or_else(|| self.options.default_icon.clone())
    }

    /// Most recently detached window still open.
    pub fn get_window(&self) -> Option<Rc<dyn DetachedWindow>> {
        self.sessions
            .last()
            .map(|session| Rc::clone(&session.window))
    }

    pub fn window(&self, id: WindowId) -> Option<Rc<dyn DetachedWindow>> {
        self.session(id).map(|session| Rc::clone(&session.window))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn session(&self, id: WindowId) -> Option<&DetachedSession> {
        self.sessions
            .iter()
            .find(|session| session.window.id() == id)
    }

    pub fn handle(
        &mut self,
        id: WindowId,
        request: DetachRequest,
        runtime: &mut ViewRuntime,
    ) -> Result<(), ViewError> {
        let session = self.session(id).ok_or(ViewError::UnknownWindow(id))?;
        let window = Rc::clone(&session.window);
        let surface = Rc::clone(&session.slot.surface);
        log::debug!("{DETACH_CHANNEL} {} for window {id}", request.name());
        match request {
            DetachRequest::Minimize => {
                window.focus();
                window.minimize();
            }
            DetachRequest::Maximize => {
                if window.is_maximized() {
                    window.unmaximize();
                } else {
                    window.maximize();
                }
            }
            DetachRequest::Close => {
                window.close();
                self.on_window_closed(id, runtime);
            }
            DetachRequest::Pin => window.set_always_on_top(true),
            DetachRequest::Unpin => window.set_always_on_top(false),
            DetachRequest::EndFullScreen => {
                if window.is_full_screen() {
                    window.set_full_screen(false);
                }
            }
            DetachRequest::InputChange { text } => {
                dispatch_hook(
                    surface.as_ref(),
                    LifecycleHook::SubInputChange,
                    Some(&json!({ "text": text })),
                );
            }
        }
        Ok(())
    }

    /// Escape without modifiers leaves full screen. Returns whether handled.
    pub fn on_key_input(
        &mut self,
        id: WindowId,
        input: &KeyInput,
        runtime: &mut ViewRuntime,
    ) -> Result<bool, ViewError> {
        if input.kind != KeyEventKind::KeyDown || input.has_modifier() || input.key != "Escape" {
            return Ok(false);
        }
        self.handle(id, DetachRequest::EndFullScreen, runtime)?;
        Ok(true)
    }

    pub fn on_focus(&self, id: WindowId) {
        if let Some(session) = self.session(id) {
            session.slot.surface.focus();
        }
    }

    /// Fires `PluginOut`, disposes the surface and releases it from the
    /// runtime. Repeated notifications for the same window are ignored.
    pub fn on_window_closed(&mut self, id: WindowId, runtime: &mut ViewRuntime) -> bool {
        let Some(position) = self
            .sessions
            .iter()
            .position(|session| session.window.id() == id)
        else {
            return false;
        };
        let session = self.sessions.remove(position);
        dispatch_hook(session.slot.surface.as_ref(), LifecycleHook::PluginOut, None);
        session.window.detach_surface(session.slot.id);
        if !session.slot.surface.is_destroyed() {
            session.slot.surface.destroy();
        }
        runtime.release_detached(session.slot.id);
        log::info!("detached window {id} closed");
        true
    }
}
