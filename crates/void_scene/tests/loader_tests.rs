//! Integration tests for UnitLoader

use std::sync::Arc;
use parking_lot::Mutex;
use void_scene::*;

fn record(loader: &mut UnitLoader) -> Arc<Mutex<Vec<UnitEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    loader.subscribe(move |e: &UnitEvent| sink.lock().push(e.clone()));
    events
}

fn count(events: &Mutex<Vec<UnitEvent>>, pred: impl Fn(&UnitEvent) -> bool) -> usize {
    events.lock().iter().filter(|e| pred(e)).count()
}

fn loaded(events: &Mutex<Vec<UnitEvent>>) -> usize {
    count(events, |e| matches!(e, UnitEvent::Loaded { .. }))
}

fn unloaded(events: &Mutex<Vec<UnitEvent>>) -> usize {
    count(events, |e| matches!(e, UnitEvent::Unloaded { .. }))
}

fn feed(loader: &mut UnitLoader, host: &MemoryHost) {
    for event in host.drain_events() {
        loader.handle_host_event(&event);
    }
}

#[test]
fn test_load_reports_once() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    loader.load(&mut host);
    assert!(loader.is_loading());
    assert!(!loader.is_listening_for_load());
    host.run_until_idle(10);
    feed(&mut loader, &host);
    loader.update();

    assert_eq!(loaded(&events), 1);
    assert_eq!(events.lock()[0], UnitEvent::Loaded { unit: "level1".into() });
    assert!(!loader.is_loading());
}

#[test]
fn test_load_while_loading_keeps_one_operation() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let op = loader.load_async(&mut host, false).unwrap();
    loader.load(&mut host);
    assert_eq!(host.pending_operations().len(), 1);
    assert!(!op.allow_activation());

    // Once held at the threshold, load() releases the same operation
    host.run_until_idle(10);
    loader.load(&mut host);
    assert_eq!(host.pending_operations().len(), 1);
    assert!(op.allow_activation());

    host.advance();
    loader.update();
    feed(&mut loader, &host);
    loader.update();

    assert!(host.pending_operations().is_empty());
    assert_eq!(loaded(&events), 1);
}

#[test]
fn test_repeated_load_submits_once() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    loader.load(&mut host);
    loader.load(&mut host);
    assert!(loader.load_async(&mut host, true).is_some());
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_load_after_completion_submits_again() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let first = loader.load_async(&mut host, true).unwrap();
    host.run_until_idle(10);

    // The finished load is reported, then a fresh one is submitted
    let second = loader.load_async(&mut host, true).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(loaded(&events), 1);
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_interleaved_broadcasts_reported_once_each() {
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let broadcast = |id: u64| HostEvent::UnitLoaded {
        unit: "level1".into(),
        mode: LoadMode::Single,
        operation: Some(OperationId(id)),
    };
    for id in [1, 2, 1, 2] {
        loader.handle_host_event(&broadcast(id));
    }

    assert_eq!(loaded(&events), 2);
}

#[test]
fn test_load_async_listener_first() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let op = loader.load_async(&mut host, true).unwrap();
    assert!(op.allow_activation());
    assert!(loader.is_listening_for_load());

    host.run_until_idle(10);
    assert!(op.is_done());

    loader.update();
    feed(&mut loader, &host);
    loader.update();

    assert_eq!(loaded(&events), 1);
    assert!(!loader.is_loading());
}

#[test]
fn test_load_async_broadcast_first() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    loader.load_async(&mut host, true).unwrap();
    host.run_until_idle(10);

    feed(&mut loader, &host);
    assert_eq!(loaded(&events), 0);
    loader.update();

    assert_eq!(loaded(&events), 1);
}

#[test]
fn test_repeated_broadcast_reported_once() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    loader.load(&mut host);
    host.run_until_idle(10);
    let broadcasts = host.drain_events();
    for event in broadcasts.iter().chain(broadcasts.iter()) {
        loader.handle_host_event(event);
    }

    assert_eq!(loaded(&events), 1);
}

#[test]
fn test_preload_then_release() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let op = loader.load_async(&mut host, false).unwrap();
    host.run_until_idle(10);
    assert_eq!(op.progress(), ACTIVATION_THRESHOLD);
    assert!(!op.is_done());
    assert!(!host.is_loaded("level1"));

    // Same operation, activation released, no second submit
    let polled = loader.load_async(&mut host, false).unwrap();
    assert_eq!(polled.id(), op.id());
    assert!(op.allow_activation());
    assert!(!loader.is_listening_for_load());
    assert_eq!(host.pending_operations().len(), 1);

    host.advance();
    assert!(host.is_loaded("level1"));

    loader.update();
    feed(&mut loader, &host);
    loader.update();

    assert_eq!(loaded(&events), 1);
    assert!(!loader.is_loading());
}

#[test]
fn test_poll_before_threshold_keeps_waiting() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    let op = loader.load_async(&mut host, false).unwrap();
    host.advance();

    let polled = loader.load_async(&mut host, true).unwrap();
    assert_eq!(polled.id(), op.id());
    assert!(!op.allow_activation());
    assert!(loader.is_listening_for_load());
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_preload_async_ignored_while_loading() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    assert!(loader.preload_async(&mut host).is_some());
    assert!(loader.preload_async(&mut host).is_none());
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_start_preloads_when_configured() {
    let mut host = MemoryHost::with_units(["level1"]);

    let mut idle = UnitLoader::for_unit(LoadUnit::new("level1"));
    idle.start(&mut host);
    assert!(idle.load_operation().is_none());

    let mut loader = UnitLoader::new(UnitLoaderConfig::new(LoadUnit::new("level1")).preload_on_start());
    loader.start(&mut host);

    let op = loader.load_operation().unwrap();
    assert!(!op.allow_activation());
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_invalid_unit_is_noop() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("missing"));

    loader.load(&mut host);
    assert!(loader.load_async(&mut host, true).is_none());
    assert!(host.pending_operations().is_empty());

    let mut blank = UnitLoader::for_unit(LoadUnit::new("   "));
    assert!(blank.load_async(&mut host, true).is_none());
}

#[test]
fn test_failed_load_reported() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    loader.load_async(&mut host, true).unwrap();
    host.fail_unit("level1");
    loader.update();

    assert_eq!(
        count(&events, |e| matches!(e, UnitEvent::Failed { .. })),
        1
    );
    assert_eq!(loaded(&events), 0);
    assert!(!loader.is_loading());
}

#[test]
fn test_unload_async_reports_once() {
    let mut host = MemoryHost::with_units(["level1"]);
    host.preload_unit("level1");
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    let op = loader.unload_async(&mut host).unwrap();
    let again = loader.unload_async(&mut host).unwrap();
    assert!(op.ptr_eq(&again));
    assert_eq!(host.pending_operations().len(), 1);

    host.run_until_idle(10);
    assert!(!host.is_loaded("level1"));

    feed(&mut loader, &host);
    loader.update();

    assert_eq!(unloaded(&events), 1);
    assert!(loader.unload_operation().is_none());
}

#[test]
fn test_unload_not_loaded() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    loader.unload(&mut host);
    assert!(loader.unload_async(&mut host).is_none());
    assert!(host.pending_operations().is_empty());
}

#[test]
fn test_replaced_by_single_load_reports_unloaded() {
    let mut host = MemoryHost::with_units(["menu", "level1"]);
    host.preload_unit("menu");
    let mut menu = UnitLoader::for_unit(LoadUnit::new("menu"));
    let events = record(&mut menu);

    let mut level = UnitLoader::for_unit(LoadUnit::new("level1"));
    level.load(&mut host);
    host.run_until_idle(10);

    feed(&mut menu, &host);
    assert_eq!(unloaded(&events), 1);
    assert_eq!(loaded(&events), 0);
}

#[test]
fn test_set_active_requires_loaded_unit() {
    let mut host = MemoryHost::with_units(["world", "ui"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::additive("ui"));
    let events = record(&mut loader);

    let result = loader.set_active(&mut host);
    assert_eq!(result, Err(SceneError::NoActiveInstance("ui".into())));
    assert_eq!(host.set_active_calls(), 0);
    assert!(events.lock().is_empty());

    host.preload_unit("world");
    host.preload_unit("ui");
    assert_eq!(host.active_unit().map(|u| u.name), Some("world".to_string()));

    loader.set_active(&mut host).unwrap();
    assert_eq!(host.set_active_calls(), 1);
    assert_eq!(host.active_unit().map(|u| u.name), Some("ui".to_string()));
    assert_eq!(events.lock()[0], UnitEvent::Activated { unit: "ui".into() });
}

#[test]
fn test_restart_current_unit() {
    let mut host = MemoryHost::with_units(["menu", "level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    assert!(loader.restart_current_unit(&mut host).is_none());

    host.preload_unit("menu");
    let op = loader.restart_current_unit(&mut host).unwrap();
    assert_eq!(op.unit(), "menu");
    assert_eq!(op.mode(), LoadMode::Single);

    host.run_until_idle(10);
    assert_eq!(host.loaded_units(), vec!["menu".to_string()]);
}

#[test]
fn test_restart_while_loading_keeps_one_operation() {
    let mut host = MemoryHost::with_units(["menu", "level1"]);
    host.preload_unit("menu");
    let mut loader = UnitLoader::for_unit(LoadUnit::additive("level1"));

    let op = loader.load_async(&mut host, false).unwrap();
    let restarted = loader.restart_current_unit(&mut host).unwrap();
    assert_eq!(restarted.id(), op.id());
    assert_eq!(host.pending_operations().len(), 1);

    loader.restart_current_unit(&mut host);
    loader.load(&mut host);
    assert_eq!(host.pending_operations().len(), 1);
}

#[test]
fn test_unload_current_unit() {
    let mut host = MemoryHost::with_units(["menu"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    assert!(loader.unload_current_unit(&mut host).is_none());

    host.preload_unit("menu");
    let op = loader.unload_current_unit(&mut host).unwrap();
    assert_eq!(op.unit(), "menu");
    host.run_until_idle(10);
    assert!(host.active_unit().is_none());
}

#[test]
fn test_load_batched() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut coordinator = BatchLoadCoordinator::default();

    let loader = UnitLoader::new(UnitLoaderConfig::new(LoadUnit::new("level1")).use_coordinator());
    loader.load_batched(&mut coordinator, &mut host).unwrap();
    assert!(coordinator.is_active());
    assert_eq!(coordinator.state().operations.len(), 1);
    assert!(!coordinator.state().operations[0].allow_activation());

    let missing = UnitLoader::for_unit(LoadUnit::new("missing"));
    assert_eq!(
        missing.load_batched(&mut coordinator, &mut host),
        Err(SceneError::InvalidUnit("missing".into()))
    );
}

#[test]
fn test_coordinator_flag_routes_loads() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut coordinator = BatchLoadCoordinator::default();
    let mut loader = UnitLoader::new(UnitLoaderConfig::new(LoadUnit::new("level1")).use_coordinator());

    assert!(loader.load_async(&mut host, true).is_none());
    assert!(host.pending_operations().is_empty());

    let op = loader
        .load_routed(&mut coordinator, &mut host, true)
        .unwrap()
        .unwrap();
    assert!(coordinator.is_active());
    assert!(!op.allow_activation());
    assert!(!loader.is_loading());
    assert_eq!(host.pending_operations().len(), 1);

    assert_eq!(
        loader.load_routed(&mut coordinator, &mut host, true),
        Err(SceneError::BatchInProgress)
    );
}

#[test]
fn test_load_routed_without_flag_loads_directly() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut coordinator = BatchLoadCoordinator::default();
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    let op = loader
        .load_routed(&mut coordinator, &mut host, true)
        .unwrap()
        .unwrap();
    assert!(op.allow_activation());
    assert!(loader.is_listening_for_load());
    assert_eq!(coordinator.phase(), BatchPhase::Idle);
}

#[test]
fn test_teardown_drops_listeners() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));
    let events = record(&mut loader);

    loader.load_async(&mut host, true).unwrap();
    loader.teardown();
    loader.teardown();
    assert!(!loader.is_loading());
    assert!(!loader.is_listening_for_load());

    host.run_until_idle(10);
    loader.update();
    assert_eq!(loaded(&events), 0);
}

#[test]
fn test_unsubscribe() {
    let mut host = MemoryHost::with_units(["level1"]);
    let mut loader = UnitLoader::for_unit(LoadUnit::new("level1"));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let id = loader.subscribe(move |e: &UnitEvent| sink.lock().push(e.clone()));
    assert!(loader.unsubscribe(id));
    assert!(!loader.unsubscribe(id));

    loader.load(&mut host);
    host.run_until_idle(10);
    feed(&mut loader, &host);
    assert!(events.lock().is_empty());
}
