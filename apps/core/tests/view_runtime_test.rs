mod support;

use std::cell::RefCell;
use std::rc::Rc;

use hopper_core::config::WindowConfig;
use hopper_core::model::{CmdType, FeaturePayload, PluginDescriptor, PluginSetting};
use hopper_core::view_runtime::{RuntimeOptions, ViewRuntime};
use hopper_core::window::{
    Bounds, HookError, HookTable, HostWindow, LifecycleHook, Theme, ViewError,
};
use serde_json::{json, Value};
use support::{events, Events, FakeHost, FakeSurfaceFactory};

fn runtime(factory: &Rc<FakeSurfaceFactory>) -> ViewRuntime {
    ViewRuntime::new(
        factory.clone(),
        RuntimeOptions::new("/plugins/node_modules"),
    )
}

fn host(events: &Events) -> Rc<dyn HostWindow> {
    FakeHost::new(1, events)
}

fn recording_hooks(calls: &Rc<RefCell<Vec<String>>>) -> Rc<HookTable> {
    let mut table = HookTable::new();
    for hook in [
        LifecycleHook::PluginEnter,
        LifecycleHook::PluginReady,
        LifecycleHook::PluginOut,
        LifecycleHook::Show,
        LifecycleHook::Hide,
    ] {
        let calls = Rc::clone(calls);
        table = table.on(hook, move |payload: Option<&Value>| {
            let suffix = payload.map(|p| format!(":{p}")).unwrap_or_default();
            calls
                .borrow_mut()
                .push(format!("{}{suffix}", hook.callback_name()));
            Ok(())
        });
    }
    Rc::new(table)
}

#[test]
fn init_attaches_one_surface_per_window() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let host = host(&events);
    let mut runtime = runtime(&factory);
    let plugin = PluginDescriptor::new("calc");

    let first = runtime.init(&plugin, &host).unwrap();
    let again = runtime.init(&plugin, &host).unwrap();
    assert_eq!(first, again);
    assert_eq!(factory.count(), 1);
    assert_eq!(host.attached_surface(), Some(first));

    let spec = factory.spec(0);
    assert_eq!(spec.partition, "<calc>");
    assert_eq!(spec.index_url, "file:///plugins/node_modules/calc/index.html");
    assert_eq!(factory.surface(0).loaded.borrow().as_slice(), [spec.index_url.as_str()]);
}

#[test]
fn load_failure_leaves_no_surface() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let host = host(&events);
    let mut runtime = runtime(&factory);
    let mut plugin = PluginDescriptor::new("calc");
    plugin.index_path = Some("file:///broken/index.html".to_string());

    assert!(matches!(runtime.init(&plugin, &host), Err(ViewError::Load { .. })));
    assert!(runtime.get_view().is_none());
    assert!(factory.surface(0).destroyed.get());
    assert_eq!(host.attached_surface(), None);
}

#[test]
fn ready_sizes_window_and_fires_enter_once() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let calls = Rc::new(RefCell::new(Vec::new()));
    factory.with_hooks("calc", recording_hooks(&calls));
    let fake_host = FakeHost::new(1, &events);
    let host: Rc<dyn HostWindow> = fake_host.clone();
    let mut options = RuntimeOptions::new("/plugins/node_modules");
    options.theme = Theme::Dark;
    options.window = WindowConfig::default();
    let mut runtime = ViewRuntime::new(factory.clone(), options);

    let mut plugin = PluginDescriptor::new("calc");
    plugin.ext = Some(FeaturePayload {
        code: "calc".to_string(),
        kind: CmdType::Text,
        payload: Value::Null,
    });
    let id = runtime.init(&plugin, &host).unwrap();

    assert!(runtime.on_surface_ready(id, host.as_ref()));
    assert!(!runtime.on_surface_ready(id, host.as_ref()));

    let surface = factory.surface(0);
    assert_eq!(fake_host.size.get(), (900, 600));
    assert_eq!(
        surface.bounds.get(),
        Some(Bounds {
            x: 0,
            y: 60,
            width: 900,
            height: 540,
        })
    );
    assert_eq!(surface.auto_resize.get(), Some((true, true)));
    assert_eq!(surface.theme.get(), Some(Theme::Dark));
    assert_eq!(fake_host.loaded.borrow().as_slice(), ["calc"]);

    let payload = json!({"code": "calc", "type": "text", "payload": null});
    assert_eq!(
        calls.borrow().as_slice(),
        [
            format!("onPluginEnter:{payload}"),
            format!("onPluginReady:{payload}"),
        ]
    );
}

#[test]
fn plugin_setting_height_overrides_layout() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let fake_host = FakeHost::new(1, &events);
    let host: Rc<dyn HostWindow> = fake_host.clone();
    let mut runtime = runtime(&factory);

    let mut plugin = PluginDescriptor::new("tall");
    plugin.plugin_setting = Some(PluginSetting {
        height: Some(320),
        auto_detach: false,
    });
    let id = runtime.init(&plugin, &host).unwrap();
    runtime.on_surface_ready(id, host.as_ref());

    assert_eq!(fake_host.size.get(), (900, 320));
    assert_eq!(factory.surface(0).bounds.get().map(|b| b.height), Some(320));
}

#[test]
fn removal_then_immediate_init_keeps_the_new_surface() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let calls = Rc::new(RefCell::new(Vec::new()));
    factory.with_hooks("calc", recording_hooks(&calls));
    let fake_host = FakeHost::new(1, &events);
    let host: Rc<dyn HostWindow> = fake_host.clone();
    let mut runtime = runtime(&factory);

    let old = runtime.init(&PluginDescriptor::new("calc"), &host).unwrap();
    runtime.remove_view(&host);
    assert!(runtime.has_pending());
    assert_eq!(calls.borrow().as_slice(), ["onPluginOut"]);

    let new = runtime.init(&PluginDescriptor::new("notes"), &host).unwrap();
    assert_ne!(old, new);
    runtime.run_pending();

    assert!(!runtime.has_pending());
    assert_eq!(runtime.get_view().map(|slot| slot.id), Some(new));
    assert_eq!(host.attached_surface(), Some(new));
    assert!(factory.surface(0).destroyed.get());
    assert!(!factory.surface(1).destroyed.get());
    assert_eq!(fake_host.idle_resets.get(), 0);

    assert!(!runtime.on_surface_ready(old, host.as_ref()));
    assert!(runtime.on_surface_ready(new, host.as_ref()));
}

#[test]
fn plain_removal_restores_idle_window() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let fake_host = FakeHost::new(1, &events);
    let host: Rc<dyn HostWindow> = fake_host.clone();
    let mut runtime = runtime(&factory);

    runtime.init(&PluginDescriptor::new("calc"), &host).unwrap();
    runtime.remove_view(&host);
    runtime.remove_view(&host);
    runtime.run_pending();

    assert!(runtime.get_view().is_none());
    assert_eq!(host.attached_surface(), None);
    assert_eq!(fake_host.idle_resets.get(), 1);
    assert_eq!(fake_host.focused.get(), 1);
    assert_eq!(factory.surface(0).destroy_calls.get(), 1);
}

#[test]
fn failing_and_panicking_hooks_are_contained() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let table = HookTable::new()
        .on(LifecycleHook::Show, |_: Option<&Value>| {
            Err(HookError::failed(LifecycleHook::Show, "boom"))
        })
        .on(LifecycleHook::Hide, |_: Option<&Value>| panic!("plugin bug"));
    factory.with_hooks("calc", Rc::new(table));
    let host = host(&events);
    let mut runtime = runtime(&factory);

    runtime.init(&PluginDescriptor::new("calc"), &host).unwrap();
    assert!(!runtime.execute_hooks(LifecycleHook::Show, None));
    assert!(!runtime.execute_hooks(LifecycleHook::Hide, None));
    assert!(!runtime.execute_hooks(LifecycleHook::ScreenCapture, None));
    assert!(runtime.get_view().is_some());
}

#[test]
fn hooks_without_surface_are_noops() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let runtime = runtime(&factory);
    assert!(!runtime.execute_hooks(LifecycleHook::Show, None));
}

#[test]
fn handed_off_surface_is_not_disposed_by_main_window() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let host = host(&events);
    let mut runtime = runtime(&factory);

    let id = runtime.init(&PluginDescriptor::new("calc"), &host).unwrap();
    let slot = runtime.hand_off(42).unwrap();
    assert_eq!(slot.id, id);
    assert!(slot.in_detach);
    assert!(runtime.is_detached(id));
    assert!(matches!(runtime.hand_off(43), Err(ViewError::NoSurface)));

    runtime.remove_view(&host);
    runtime.run_pending();
    assert!(!factory.surface(0).destroyed.get());

    let next = runtime.init(&PluginDescriptor::new("notes"), &host).unwrap();
    assert_ne!(next, id);
    runtime.release_detached(id);
    assert!(!runtime.is_detached(id));
    assert_eq!(runtime.get_view().map(|slot| slot.id), Some(next));
}

#[test]
fn close_view_destroys_without_hooks() {
    let events = events();
    let factory = FakeSurfaceFactory::new(&events);
    let calls = Rc::new(RefCell::new(Vec::new()));
    factory.with_hooks("calc", recording_hooks(&calls));
    let host = host(&events);
    let mut runtime = runtime(&factory);

    runtime.init(&PluginDescriptor::new("calc"), &host).unwrap();
    runtime.close_view();
    assert!(runtime.get_view().is_none());
    assert!(factory.surface(0).destroyed.get());
    assert!(calls.borrow().is_empty());
}
