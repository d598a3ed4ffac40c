use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::assets::ScriptAsset;
use crate::pool::{InterpreterPool, PoolConfig, PoolStats};
use crate::reflect::{ObjectId, ObjectModel, WorldContext};
use crate::scripts::{ScriptHost, ScriptHostSettings};
use crate::value::{NativeValue, PrimitiveValue, Rotator};
use crate::world::{ActorSummary, ClassConfig, HostWorld, ACTOR_CLASS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessFixture {
    #[serde(default = "default_steps")]
    pub steps: usize,
    #[serde(default = "default_dt")]
    pub dt: f32,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub classes: Vec<ClassConfig>,
    #[serde(default)]
    pub actors: Vec<FixtureActor>,
    pub scripts: Vec<FixtureScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureActor {
    pub name: String,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(default)]
    pub location: Option<[f32; 3]>,
    #[serde(default)]
    pub rotation: Option<[f32; 3]>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureScript {
    /// Name of the actor the script component is attached to.
    pub owner: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub settings: ScriptHostSettings,
    #[serde(default)]
    pub reload: Option<FixtureReload>,
}

/// Replaces the script's source and hot reloads it before step `at_step` runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FixtureReload {
    pub at_step: usize,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HarnessOutput {
    pub steps: usize,
    pub dt: f32,
    pub setup: Vec<String>,
    pub results: Vec<StepResult>,
    pub scripts: Vec<ScriptSummary>,
    pub final_actors: Vec<ActorSummary>,
    pub pool: PoolStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step: usize,
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptSummary {
    pub owner: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    pub ticks: u64,
    pub gc_steps: u64,
    pub globals: BTreeMap<String, PrimitiveValue>,
}

struct HarnessScript {
    owner: String,
    host: ScriptHost,
    reload: Option<FixtureReload>,
    last_error: Option<String>,
}

pub fn run_fixture(fixture: &HarnessFixture) -> Result<HarnessOutput> {
    let world = HostWorld::shared();
    for class in &fixture.classes {
        world.register_class(class).with_context(|| format!("registering class '{}'", class.name))?;
    }
    for actor in &fixture.actors {
        spawn_fixture_actor(&world, actor)?;
    }

    let pool = Arc::new(InterpreterPool::new(fixture.pool.clone()));
    let binding = world.binding();
    let mut scripts = Vec::with_capacity(fixture.scripts.len());
    for script in &fixture.scripts {
        let owner = world
            .find_actor(&script.owner)
            .ok_or_else(|| anyhow!("script owner '{}' is not a fixture actor", script.owner))?;
        let component = world
            .attach_script_component(owner)
            .ok_or_else(|| anyhow!("could not attach a script component to '{}'", script.owner))?;
        let mut host = ScriptHost::new(pool.clone(), binding.clone(), script.settings);
        host.set_owner(Some(owner));
        host.set_component(Some(component));
        apply_source(&mut host, script.source.as_deref(), script.path.as_deref())?;
        scripts.push(HarnessScript {
            owner: script.owner.clone(),
            host,
            reload: script.reload.clone(),
            last_error: None,
        });
    }

    let mut setup = Vec::new();
    for script in &mut scripts {
        script.host.begin_play();
        collect_error(script, &mut setup);
    }
    setup.extend(world.drain_events().iter().map(ToString::to_string));

    let mut results = Vec::with_capacity(fixture.steps);
    for step in 0..fixture.steps {
        let mut events = Vec::new();
        for script in &mut scripts {
            let Some(reload) = script.reload.as_ref().filter(|reload| reload.at_step == step).cloned() else {
                continue;
            };
            apply_source(&mut script.host, reload.source.as_deref(), reload.path.as_deref())?;
            match script.host.hot_reload() {
                Ok(()) => events.push(format!("ScriptReloaded owner={}", script.owner)),
                Err(err) => {
                    events.push(format!("ScriptReloadFailed owner={} {err}", script.owner));
                    script.last_error = Some(err.to_string());
                }
            }
            script.host.clear_error();
        }
        world.advance(fixture.dt);
        for script in &mut scripts {
            script.host.tick(fixture.dt);
            collect_error(script, &mut events);
        }
        events.extend(world.drain_events().iter().map(ToString::to_string));
        results.push(StepResult { step, events });
    }

    let summaries = scripts
        .iter()
        .map(|script| ScriptSummary {
            owner: script.owner.clone(),
            initialized: script.host.is_initialized(),
            last_error: script.last_error.clone(),
            ticks: script.host.ticks(),
            gc_steps: script.host.gc_steps(),
            globals: script.host.snapshot().map(|snapshot| snapshot.values().clone()).unwrap_or_default(),
        })
        .collect();
    // Release every instance before reading the pool counters.
    drop(scripts);
    let final_actors = world.actor_summaries();

    Ok(HarnessOutput {
        steps: fixture.steps,
        dt: fixture.dt,
        setup,
        results,
        scripts: summaries,
        final_actors,
        pool: pool.stats(),
    })
}

/// Reads a fixture. Relative script paths are resolved against the fixture's directory.
pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<HarnessFixture> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening fixture '{}'", path.display()))?;
    let mut fixture: HarnessFixture =
        serde_json::from_reader(file).with_context(|| format!("parsing fixture '{}'", path.display()))?;
    let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for script in &mut fixture.scripts {
        resolve_path(&base, &mut script.path);
        if let Some(reload) = script.reload.as_mut() {
            resolve_path(&base, &mut reload.path);
        }
    }
    Ok(fixture)
}

fn resolve_path(base: &Path, path: &mut Option<String>) {
    if let Some(raw) = path.as_mut() {
        let candidate = PathBuf::from(raw.as_str());
        if candidate.is_relative() {
            *raw = base.join(candidate).to_string_lossy().into_owned();
        }
    }
}

fn spawn_fixture_actor(world: &HostWorld, actor: &FixtureActor) -> Result<ObjectId> {
    let location = actor.location.map(Vec3::from_array).unwrap_or(Vec3::ZERO);
    let rotation = actor.rotation.map(|[pitch, yaw, roll]| Rotator::new(pitch, yaw, roll)).unwrap_or_default();
    let id = world
        .spawn_actor_named(&actor.class, Some(&actor.name), location, rotation)
        .ok_or_else(|| anyhow!("actor '{}' uses unknown class '{}'", actor.name, actor.class))?;
    for (name, json) in &actor.properties {
        let property = world
            .find_property(id, name)
            .ok_or_else(|| anyhow!("actor '{}' has no property '{name}'", actor.name))?;
        if !property.writable {
            bail!("property '{name}' on actor '{}' is read-only", actor.name);
        }
        let value = NativeValue::from_json(property.kind, json)
            .ok_or_else(|| anyhow!("value for '{}.{name}' is not a valid {}", actor.name, property.kind))?;
        world.write_property(id, name, value)?;
    }
    Ok(id)
}

fn apply_source(host: &mut ScriptHost, source: Option<&str>, path: Option<&str>) -> Result<()> {
    match (source, path) {
        (_, Some(path)) => {
            let asset = ScriptAsset::load(path).with_context(|| format!("loading script '{path}'"))?;
            host.set_asset(Some(asset));
        }
        (Some(source), None) => {
            host.set_asset(None);
            host.set_inline_source(source);
        }
        (None, None) => bail!("fixture script needs either 'source' or 'path'"),
    }
    Ok(())
}

fn collect_error(script: &mut HarnessScript, events: &mut Vec<String>) {
    if let Some(err) = script.host.last_error() {
        events.push(format!("ScriptError owner={} {err}", script.owner));
        script.last_error = Some(err.to_string());
        script.host.clear_error();
    }
}

fn default_steps() -> usize {
    10
}

fn default_dt() -> f32 {
    1.0 / 60.0
}

fn default_class() -> String {
    ACTOR_CLASS.to_string()
}
