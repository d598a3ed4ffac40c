//! Runs one script file on a fresh world, the way the `kestrel_lua` binary does.

use std::sync::Arc;

use anyhow::{Context, Result};
use glam::Vec3;

use crate::assets::ScriptAsset;
use crate::cli::RunnerArgs;
use crate::config::BridgeConfig;
use crate::events::WorldEvent;
use crate::pool::{InterpreterPool, PoolStats};
use crate::scripts::ScriptHost;
use crate::value::Rotator;
use crate::world::{HostWorld, ACTOR_CLASS};

/// Name of the actor the runner attaches the script to.
pub const RUNNER_ACTOR: &str = "ScriptActor";

#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: u32,
    pub initialized: bool,
    pub errors: Vec<String>,
    pub events: Vec<WorldEvent>,
    pub pool: PoolStats,
}

pub fn run(args: &RunnerArgs) -> Result<RunReport> {
    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_or_default(path),
        None => BridgeConfig::default(),
    };
    if !args.overrides.is_empty() {
        log::info!("Applying overrides: {}", args.overrides.applied_fields().join(", "));
        config.apply_overrides(&args.overrides);
    }

    let world = HostWorld::shared();
    for class in &config.classes {
        world.register_class(class).with_context(|| format!("registering class '{}'", class.name))?;
    }
    let owner = world
        .spawn_actor_named(ACTOR_CLASS, Some(RUNNER_ACTOR), Vec3::ZERO, Rotator::ZERO)
        .context("spawning the script actor")?;
    let component = world.attach_script_component(owner).context("attaching the script component")?;

    let pool = Arc::new(InterpreterPool::new(config.pool.clone()));
    let asset = ScriptAsset::load(&args.script)?;
    let mut host = ScriptHost::new(pool.clone(), world.binding(), config.host);
    host.set_owner(Some(owner));
    host.set_component(Some(component));
    host.set_asset(Some(asset));

    let mut errors = Vec::new();
    let mut events = Vec::new();
    if let Err(err) = host.execute_script() {
        log::error!("{}: {err}", args.script.display());
        errors.push(err.to_string());
    }
    events.extend(world.drain_events());

    for _ in 0..args.ticks {
        world.advance(args.dt);
        match host.reload_if_changed() {
            Ok(true) => log::info!("{} changed on disk, reloaded", args.script.display()),
            Ok(false) => {}
            Err(err) => errors.push(err.to_string()),
        }
        host.tick(args.dt);
        if let Some(err) = host.last_error() {
            errors.push(err.to_string());
            host.clear_error();
        }
        events.extend(world.drain_events());
    }

    let initialized = host.is_initialized();
    host.teardown();
    let stats = pool.stats();
    pool.shutdown();
    Ok(RunReport { ticks: args.ticks, initialized, errors, events, pool: stats })
}
