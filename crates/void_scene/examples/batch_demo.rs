//! Batch loading demonstration
//!
//! This example shows:
//! - Reading loader configuration from TOML
//! - Preloading a unit on start and releasing it on demand
//! - Loading several units as one batch with a shared progress bar
//! - Keeping a manager instance alive across unit changes
//!
//! Run with `RUST_LOG=debug` to see the loader and coordinator logs.

use void_scene::prelude::*;
use void_scene::{MemoryHost, TypeKey};

const CONFIG: &str = r#"
[batch]
poll_interval_ms = 100
settle_before_activation_ms = 300
settle_after_activation_ms = 300
extra_delay_ms = 200

[[loaders]]
preload_on_start = true
unit = { identifier = "menu" }
"#;

struct GameManager;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    println!("Scene Batch Loading Demo");
    println!("========================\n");

    let config = SceneConfig::from_toml_str(CONFIG)?;
    let mut host = MemoryHost::with_units(["menu", "world", "ui"]).with_step(0.2);

    // Preload the menu and release it once it is ready
    let mut menu = UnitLoader::new(config.loaders[0].clone());
    menu.subscribe(|event| println!("  menu: {:?}", event));
    menu.start(&mut host);

    loop {
        host.advance();
        menu.update();
        for event in host.drain_events() {
            menu.handle_host_event(&event);
        }
        if host.is_loaded("menu") {
            break;
        }
        match menu.load_async(&mut host, false) {
            Some(op) if !op.allow_activation() => {
                println!("  menu preload at {:.0}%", op.progress() * 100.0)
            }
            Some(_) => {}
            None => break,
        }
    }
    println!("✓ Menu loaded\n");

    // A manager that should outlive the menu
    let mut registry = InstanceRegistry::new();
    let manager = host.spawn_instance("menu");
    registry.try_register(TypeKey::of::<GameManager>(), manager, true, &mut host)?;

    // Load the game as one batch
    let mut coordinator = BatchLoadCoordinator::new(config.batch.clone())?;
    coordinator.subscribe(|event| match event {
        BatchEvent::Progress { normalized } => println!("  batch {:5.1}%", normalized * 100.0),
        other => println!("  batch: {:?}", other),
    });

    coordinator.start(&[LoadUnit::new("world"), LoadUnit::additive("ui")], &mut host)?;

    let frame = config.batch.poll_interval();
    while coordinator.phase().is_active() {
        host.advance();
        coordinator.tick(frame);
    }

    if let Some(error) = coordinator.last_error() {
        eprintln!("❌ Batch failed: {}", error);
        return Ok(());
    }

    println!("\n✓ Loaded units: {:?}", host.loaded_units());
    println!(
        "✓ Manager survived: {}",
        host.instance_exists(manager) && registry.retain_live(&host) == 0
    );

    Ok(())
}
