//! Level Save/Load: build a small level, tick it, save it, and load it back.
//!
//! - a `Station` with a docked `Ship` (parented to the station)
//! - the ship burns fuel every tick through its `Fuel` component
//! - `Debris` is not in the loading order, so it is not restored
//!
//! Run with: `cargo run -p kjarni --example level_save_load`

use std::sync::Arc;

use anyhow::Context;
use kjarni::prelude::*;
use serde_json::json;

// ── Components ───────────────────────────────────────────────────────────

/// Burns a fixed amount of fuel per tick until empty.
struct Fuel {
    burn: f64,
}

impl BuildComponent for Fuel {
    const NAME: &'static str = "Fuel";

    fn build(init: &ComponentInit<'_>) -> anyhow::Result<Self> {
        let burn = init
            .config
            .get("burn_rate")
            .and_then(|v| v.as_f64())
            .unwrap_or(1.0);
        Ok(Self { burn })
    }
}

impl Component for Fuel {
    fn setup(&mut self, _entity: &mut EntityCore) -> anyhow::Result<Fields> {
        let mut fields = Fields::new();
        fields.insert("fuel".into(), json!(100.0));
        Ok(fields)
    }

    fn tick(&mut self, entity: &mut EntityCore) -> anyhow::Result<()> {
        let fuel = entity.fields.get("fuel").and_then(|v| v.as_f64()).unwrap_or(0.0);
        entity.fields.insert("fuel".into(), json!((fuel - self.burn).max(0.0)));
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(format!("burning {}/tick", self.burn))
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

fn make_registry() -> kjarni::Result<Arc<Registry>> {
    let mut reg = RegistryBuilder::new();
    reg.register_component::<CopyData>()?;
    reg.register_component::<Fuel>()?;

    reg.entity_with(EntityWith {
        name: "Station".into(),
        components: vec!["CopyData".into()],
        config: json!({ "copy_data": { "docks": 4 } }),
    })?;
    reg.register_entity(
        EntityType::builder("Ship")
            .with::<CopyData>()
            .with::<Fuel>()
            .config("burn_rate", json!(2.5))
            .config("copy_data", json!(["fuel", "cargo"]))
            .on_tick(|ship, _ctx| {
                ship.core_mut().position += Vec3::X;
                Ok(ship.tick_components()?)
            }),
    )?;
    reg.entity_with_components("Debris", Vec::<String>::new())?;
    reg.set_loading_order(["Station", "Ship"]);
    reg.build()
}

fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let registry = make_registry()?;
    let mut level = Level::new(Arc::clone(&registry));
    level.name = "Sector 7".into();
    level.events_mut().on(|event| log::info!("event: {}", event.name()));

    let station = level.spawn_ready("Station")?;
    let ship = level.spawn_ready("Ship")?;
    level.spawn_ready("Debris")?;
    level.set_parent(ship, Some(station))?;
    level.get_entity_by_id_mut(ship)?.core_mut().name = "Kestrel".into();
    level.get_entity_by_id_mut(station)?.core_mut().position = Vec3::new(10.0, 0.0, -4.0);

    for _ in 0..4 {
        level.tick()?;
    }
    println!("{}\n", level.get_entity_by_id(ship)?);
    println!(
        "absolute ship position: {}",
        kjarni::math::vector_string(level.absolute_position(ship)?, 2)
    );

    let path = std::env::temp_dir().join("kjarni_level.json");
    level.save_to_file(&path).context("save level")?;
    println!("saved {} entities to {}", level.len(), path.display());
    level.dispose_all()?;

    let restored = Level::load_from_file(registry, &path).context("load level")?;
    println!("restored {} entities:", restored.len());
    for entity in restored.entities() {
        println!("  {} {}", entity.type_name(), entity.id());
    }
    let ship = restored.entity("@Kestrel")?.context("ship missing after load")?;
    println!("\n{ship}");
    println!("fuel: {}", ship.field("fuel").cloned().unwrap_or_default());
    Ok(())
}
