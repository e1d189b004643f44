//! Strata Runtime
//!
//! Boots logging, builds a world from optional JSON settings and runs a short
//! spawn/query/destroy pass against it.
//!
//! Usage: `strata [settings.json]`

use anyhow::{Context, Result};
use strata_core::ecs::{EntityBuilder, Query, TypeSet, World};
use strata_core::{define_component, define_tag, spawn, WorldSettings};

#[derive(Clone, Debug, Default, PartialEq)]
struct Health(u32);
define_component!(Health, 1, "Health");

#[derive(Clone, Debug, Default, PartialEq)]
struct Velocity([f32; 4]);
define_component!(Velocity, 2, "Velocity");

#[derive(Clone, Debug, Default, PartialEq)]
struct Hostile;
define_tag!(Hostile, 1, "Hostile");

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Strata v{}", strata_core::VERSION);

    let settings = match std::env::args().nth(1) {
        Some(path) => WorldSettings::load(&path)
            .with_context(|| format!("loading settings from {path}"))?,
        None => WorldSettings::default(),
    };
    tracing::info!(?settings, "settings loaded");

    let types = TypeSet::new()
        .with_component::<Health>()
        .with_component::<Velocity>()
        .with_tag::<Hostile>();
    let mut world = World::new(&types, settings).context("creating world")?;

    let player = spawn!(world, Health(100), Velocity([1.0, 0.0, 0.0, 0.0]));
    let drone = spawn!(world, Velocity([0.0, 2.0, 0.0, 0.0]), Health(20));
    let debris = spawn!(world, Velocity([0.5; 4]));
    let raider = world.spawn(
        EntityBuilder::new()
            .with(Health(40))
            .with_default::<Velocity>()
            .tag::<Hostile>(),
    )?;
    let raider_twin = world.spawn_cloned(raider)?;

    let shared = world.archetype_of(player)? == world.archetype_of(drone)?;
    tracing::info!(
        shared,
        archetypes = world.archetypes().count(),
        "spawned {} entities",
        world.entity_count()
    );

    let damage = Query::new().read::<Velocity>().write::<Health>();
    let visited = world.run_query(&damage, |row| {
        let speed: f32 = row.read::<Velocity>().0.iter().sum();
        let health = row.write::<Health>();
        health.0 = health.0.saturating_sub(speed as u32);
    })?;
    tracing::info!(visited, "applied damage");

    world.destroy(debris)?;
    let hostile = Query::new().read::<Health>().tag::<Hostile>();
    world.run_query(&hostile, |row| {
        tracing::info!(
            archetype = %row.archetype(),
            column = row.column(),
            health = row.read::<Health>().0,
            "hostile"
        );
    })?;

    for entity in [player, drone, raider, raider_twin] {
        let health = world.get_component::<Health>(entity)?.map(|h| h.0);
        tracing::info!(%entity, ?health, "final state");
    }
    for (name, value) in world.counters().snapshot() {
        tracing::info!(counter = name, value, "metrics");
    }

    Ok(())
}
