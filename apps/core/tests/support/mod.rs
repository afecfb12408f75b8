#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use hopper_core::model::PluginDescriptor;
use hopper_core::package_manager::PackageError;
use hopper_core::registry::{CommandOutput, CommandRunner, RegistryClient};
use hopper_core::window::{
    Bounds, ContentSurface, DetachedWindow, DetachedWindowSpec, HostWindow, PluginHooks,
    SurfaceFactory, SurfaceId, SurfaceSpec, Theme, ViewError, WindowFactory, WindowId,
};

pub type Events = Rc<RefCell<Vec<String>>>;

pub fn events() -> Events {
    Rc::new(RefCell::new(Vec::new()))
}

pub struct FakeSurface {
    pub label: String,
    events: Events,
    hooks: Option<Rc<dyn PluginHooks>>,
    pub loaded: RefCell<Vec<String>>,
    pub bounds: Cell<Option<Bounds>>,
    pub auto_resize: Cell<Option<(bool, bool)>>,
    pub theme: Cell<Option<Theme>>,
    pub focused: Cell<u32>,
    pub destroyed: Cell<bool>,
    pub destroy_calls: Cell<u32>,
}

impl ContentSurface for FakeSurface {
    fn load_url(&self, url: &str) -> Result<(), ViewError> {
        if url.contains("broken") {
            return Err(ViewError::Load {
                url: url.to_string(),
                message: "unreachable".to_string(),
            });
        }
        self.loaded.borrow_mut().push(url.to_string());
        Ok(())
    }

    fn set_bounds(&self, bounds: Bounds) {
        self.bounds.set(Some(bounds));
    }

    fn set_auto_resize(&self, width: bool, height: bool) {
        self.auto_resize.set(Some((width, height)));
    }

    fn enable_header_relaxation(&self) {}

    fn apply_theme(&self, theme: Theme) {
        self.theme.set(Some(theme));
    }

    fn hooks(&self) -> Option<Rc<dyn PluginHooks>> {
        self.hooks.clone()
    }

    fn focus(&self) {
        self.focused.set(self.focused.get() + 1);
    }

    fn destroy(&self) {
        self.destroyed.set(true);
        self.destroy_calls.set(self.destroy_calls.get() + 1);
        self.events
            .borrow_mut()
            .push(format!("destroy:{}", self.label));
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }
}

/// Hands out [`FakeSurface`]s whose hooks are built per partition.
pub struct FakeSurfaceFactory {
    events: Events,
    hooks: RefCell<HashMap<String, Rc<dyn PluginHooks>>>,
    pub created: RefCell<Vec<(SurfaceSpec, Rc<FakeSurface>)>>,
    pub fail: Cell<bool>,
}

impl FakeSurfaceFactory {
    pub fn new(events: &Events) -> Rc<Self> {
        Rc::new(Self {
            events: Rc::clone(events),
            hooks: RefCell::new(HashMap::new()),
            created: RefCell::new(Vec::new()),
            fail: Cell::new(false),
        })
    }

    pub fn with_hooks(&self, plugin: &str, hooks: Rc<dyn PluginHooks>) {
        self.hooks.borrow_mut().insert(format!("<{plugin}>"), hooks);
    }

    pub fn surface(&self, index: usize) -> Rc<FakeSurface> {
        Rc::clone(&self.created.borrow()[index].1)
    }

    pub fn spec(&self, index: usize) -> SurfaceSpec {
        self.created.borrow()[index].0.clone()
    }

    pub fn count(&self) -> usize {
        self.created.borrow().len()
    }
}

impl SurfaceFactory for FakeSurfaceFactory {
    fn create_surface(&self, spec: &SurfaceSpec) -> Result<Rc<dyn ContentSurface>, ViewError> {
        if self.fail.get() {
            return Err(ViewError::CreateSurface("factory offline".to_string()));
        }
        let index = self.created.borrow().len();
        let surface = Rc::new(FakeSurface {
            label: format!("{}#{index}", spec.partition),
            events: Rc::clone(&self.events),
            hooks: self.hooks.borrow().get(&spec.partition).cloned(),
            loaded: RefCell::new(Vec::new()),
            bounds: Cell::new(None),
            auto_resize: Cell::new(None),
            theme: Cell::new(None),
            focused: Cell::new(0),
            destroyed: Cell::new(false),
            destroy_calls: Cell::new(0),
        });
        self.created
            .borrow_mut()
            .push((spec.clone(), Rc::clone(&surface)));
        Ok(surface)
    }
}

pub struct FakeHost {
    id: WindowId,
    events: Events,
    pub attached: Cell<Option<SurfaceId>>,
    pub size: Cell<(u32, u32)>,
    pub shown: Cell<u32>,
    pub focused: Cell<u32>,
    pub idle_resets: Cell<u32>,
    pub loaded: RefCell<Vec<String>>,
}

impl FakeHost {
    pub fn new(id: WindowId, events: &Events) -> Rc<Self> {
        Rc::new(Self::plain(id, events))
    }

    fn plain(id: WindowId, events: &Events) -> Self {
        Self {
            id,
            events: Rc::clone(events),
            attached: Cell::new(None),
            size: Cell::new((900, 60)),
            shown: Cell::new(0),
            focused: Cell::new(0),
            idle_resets: Cell::new(0),
            loaded: RefCell::new(Vec::new()),
        }
    }
}

impl HostWindow for FakeHost {
    fn id(&self) -> WindowId {
        self.id
    }

    fn bounds(&self) -> Bounds {
        let (width, height) = self.size.get();
        Bounds {
            x: 10,
            y: 20,
            width,
            height,
        }
    }

    fn set_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }

    fn attached_surface(&self) -> Option<SurfaceId> {
        self.attached.get()
    }

    fn attach_surface(&self, id: SurfaceId, _surface: Rc<dyn ContentSurface>) {
        self.attached.set(Some(id));
        self.events
            .borrow_mut()
            .push(format!("attach:{}:{}", self.id, id.0));
    }

    fn detach_surface(&self, id: SurfaceId) {
        if self.attached.get() == Some(id) {
            self.attached.set(None);
            self.events
                .borrow_mut()
                .push(format!("detach:{}:{}", self.id, id.0));
        }
    }

    fn clear_surface(&self) {
        self.attached.set(None);
    }

    fn reset_idle_chrome(&self) {
        self.idle_resets.set(self.idle_resets.get() + 1);
    }

    fn notify_plugin_loaded(&self, plugin: &PluginDescriptor) {
        self.loaded.borrow_mut().push(plugin.name.clone());
    }

    fn show(&self) {
        self.shown.set(self.shown.get() + 1);
    }

    fn focus(&self) {
        self.focused.set(self.focused.get() + 1);
    }
}

pub struct FakeDetached {
    pub host: FakeHost,
    pub spec: DetachedWindowSpec,
    pub icon: RefCell<Option<PathBuf>>,
    pub theme: Cell<Option<Theme>>,
    pub initialized: RefCell<Option<String>>,
    pub minimized: Cell<bool>,
    pub maximized: Cell<bool>,
    pub on_top: Cell<bool>,
    pub full_screen: Cell<bool>,
    pub closed: Cell<bool>,
}

impl HostWindow for FakeDetached {
    fn id(&self) -> WindowId {
        self.host.id()
    }

    fn bounds(&self) -> Bounds {
        self.spec.bounds
    }

    fn set_size(&self, width: u32, height: u32) {
        self.host.set_size(width, height);
    }

    fn attached_surface(&self) -> Option<SurfaceId> {
        self.host.attached_surface()
    }

    fn attach_surface(&self, id: SurfaceId, surface: Rc<dyn ContentSurface>) {
        self.host.attach_surface(id, surface);
    }

    fn detach_surface(&self, id: SurfaceId) {
        self.host.detach_surface(id);
    }

    fn clear_surface(&self) {
        self.host.clear_surface();
    }

    fn reset_idle_chrome(&self) {
        self.host.reset_idle_chrome();
    }

    fn notify_plugin_loaded(&self, plugin: &PluginDescriptor) {
        self.host.notify_plugin_loaded(plugin);
    }

    fn show(&self) {
        self.host.show();
    }

    fn focus(&self) {
        self.host.focus();
    }
}

impl DetachedWindow for FakeDetached {
    fn init_detach(&self, plugin: &PluginDescriptor) {
        *self.initialized.borrow_mut() = Some(plugin.name.clone());
    }

    fn set_icon(&self, icon: &Path) {
        *self.icon.borrow_mut() = Some(icon.to_path_buf());
    }

    fn apply_theme(&self, theme: Theme) {
        self.theme.set(Some(theme));
    }

    fn minimize(&self) {
        self.minimized.set(true);
    }

    fn maximize(&self) {
        self.maximized.set(true);
    }

    fn unmaximize(&self) {
        self.maximized.set(false);
    }

    fn is_maximized(&self) -> bool {
        self.maximized.get()
    }

    fn set_always_on_top(&self, on_top: bool) {
        self.on_top.set(on_top);
    }

    fn is_full_screen(&self) -> bool {
        self.full_screen.get()
    }

    fn set_full_screen(&self, full_screen: bool) {
        self.full_screen.set(full_screen);
    }

    fn close(&self) {
        self.closed.set(true);
    }
}

pub struct FakeWindowFactory {
    events: Events,
    next_id: Cell<WindowId>,
    pub created: RefCell<Vec<Rc<FakeDetached>>>,
}

impl FakeWindowFactory {
    pub fn new(events: &Events) -> Rc<Self> {
        Rc::new(Self {
            events: Rc::clone(events),
            next_id: Cell::new(100),
            created: RefCell::new(Vec::new()),
        })
    }

    pub fn window(&self, index: usize) -> Rc<FakeDetached> {
        Rc::clone(&self.created.borrow()[index])
    }
}

impl WindowFactory for FakeWindowFactory {
    fn create_detached(
        &self,
        spec: &DetachedWindowSpec,
    ) -> Result<Rc<dyn DetachedWindow>, ViewError> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let window = Rc::new(FakeDetached {
            host: FakeHost::plain(id, &self.events),
            spec: spec.clone(),
            icon: RefCell::new(None),
            theme: Cell::new(None),
            initialized: RefCell::new(None),
            minimized: Cell::new(false),
            maximized: Cell::new(false),
            on_top: Cell::new(false),
            full_screen: Cell::new(false),
            closed: Cell::new(false),
        });
        self.created.borrow_mut().push(Rc::clone(&window));
        Ok(window)
    }
}

pub enum Scripted {
    Exit(i32),
    SpawnError,
}

/// Records every invocation; replies from a script, then succeeds.
#[derive(Default)]
pub struct FakeRunner {
    pub calls: Mutex<Vec<Vec<String>>>,
    pub log: Mutex<Vec<String>>,
    script: Mutex<VecDeque<Scripted>>,
    delay: Duration,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, _program: &str, args: &[String], _cwd: &Path) -> std::io::Result<CommandOutput> {
        let label = args.get(1).cloned().unwrap_or_default();
        self.log.lock().unwrap().push(format!("start:{label}"));
        self.calls.lock().unwrap().push(args.to_vec());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.log.lock().unwrap().push(format!("end:{label}"));
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::SpawnError) => Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "program missing",
            )),
            Some(Scripted::Exit(code)) => Ok(CommandOutput {
                code: Some(code),
                output: format!("exit {code}"),
            }),
            None => Ok(CommandOutput {
                code: Some(0),
                output: String::new(),
            }),
        }
    }
}

/// In-memory registry and CDN.
#[derive(Default)]
pub struct FakeRegistry {
    pub latest: Mutex<HashMap<String, String>>,
    pub files: Mutex<HashMap<String, String>>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_latest(self: Arc<Self>, name: &str, version: &str) -> Arc<Self> {
        self.latest
            .lock()
            .unwrap()
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn with_file(self: Arc<Self>, url: &str, body: &str) -> Arc<Self> {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl RegistryClient for FakeRegistry {
    fn latest_version(&self, registry: &str, name: &str) -> Result<String, PackageError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("{registry}{name}"));
        self.latest
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| PackageError::NotFound(name.to_string()))
    }

    fn fetch_text(&self, url: &str) -> Result<String, PackageError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| PackageError::NotFound(url.to_string()))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, PackageError> {
        self.fetch_text(url).map(String::into_bytes)
    }
}

pub fn write_manifest(base_dir: &Path, dependencies: &[(&str, &str)]) {
    let deps: serde_json::Map<String, serde_json::Value> = dependencies
        .iter()
        .map(|(name, version)| (name.to_string(), serde_json::json!(version)))
        .collect();
    std::fs::create_dir_all(base_dir).unwrap();
    std::fs::write(
        base_dir.join("package.json"),
        serde_json::json!({ "dependencies": deps }).to_string(),
    )
    .unwrap();
}
