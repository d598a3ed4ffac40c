use std::sync::Arc;

use mlua::FromLua;
use serde::{Deserialize, Serialize};

use crate::assets::ScriptAsset;
use crate::bindings::{COMPONENT_GLOBAL, SELF_GLOBAL};
use crate::error::ScriptError;
use crate::pool::{InterpreterInstance, InterpreterPool};
use crate::reflect::{ObjectId, WorldBinding};
use crate::snapshot::GlobalSnapshot;

pub const INIT_FUNCTION: &str = "init";
pub const TICK_FUNCTION: &str = "tick";

const INLINE_CHUNK_NAME: &str = "=script";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptHostSettings {
    /// Run the script from `begin_play`.
    pub auto_run: bool,
    /// Call the script's `tick(dt)` every host tick.
    pub call_tick: bool,
    /// Ticks between incremental collection steps; 0 disables host-driven stepping.
    pub gc_interval: u32,
}

impl Default for ScriptHostSettings {
    fn default() -> Self {
        Self { auto_run: true, call_tick: true, gc_interval: 30 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Idle,
    Initializing,
    Ready,
    HotReloading,
}

/// Binds one pooled interpreter instance to one script-bearing actor for as long as the script
/// runs.
pub struct ScriptHost {
    pool: Arc<InterpreterPool>,
    world: WorldBinding,
    owner: Option<ObjectId>,
    component: Option<ObjectId>,
    settings: ScriptHostSettings,
    asset: Option<ScriptAsset>,
    inline_source: String,
    instance: Option<InterpreterInstance>,
    initialized: bool,
    gc_counter: u32,
    gc_steps: u64,
    ticks: u64,
    error: Option<String>,
    state: HostState,
}

impl ScriptHost {
    pub fn new(pool: Arc<InterpreterPool>, world: WorldBinding, settings: ScriptHostSettings) -> Self {
        Self {
            pool,
            world,
            owner: None,
            component: None,
            settings,
            asset: None,
            inline_source: String::new(),
            instance: None,
            initialized: false,
            gc_counter: 0,
            gc_steps: 0,
            ticks: 0,
            error: None,
            state: HostState::Idle,
        }
    }

    /// Actor exposed to the script as `self`.
    pub fn set_owner(&mut self, owner: Option<ObjectId>) {
        self.owner = owner;
    }

    /// Component exposed to the script as `component`.
    pub fn set_component(&mut self, component: Option<ObjectId>) {
        self.component = component;
    }

    pub fn set_inline_source(&mut self, source: impl Into<String>) {
        self.inline_source = source.into();
    }

    /// External source; preferred over the inline text when present.
    pub fn set_asset(&mut self, asset: Option<ScriptAsset>) {
        self.asset = asset;
    }

    pub fn asset(&self) -> Option<&ScriptAsset> {
        self.asset.as_ref()
    }

    pub fn settings(&self) -> &ScriptHostSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: ScriptHostSettings) {
        self.settings = settings;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn last_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Ticks that reached the script.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Incremental collection steps driven so far.
    pub fn gc_steps(&self) -> u64 {
        self.gc_steps
    }

    pub fn instance(&self) -> Option<&InterpreterInstance> {
        self.instance.as_ref()
    }

    pub fn global<V: FromLua>(&self, name: &str) -> Result<V, ScriptError> {
        self.instance.as_ref().ok_or(ScriptError::NotInitialized)?.global(name)
    }

    /// Primitive globals the script currently holds, i.e. what a hot reload would carry over.
    pub fn snapshot(&self) -> Option<GlobalSnapshot> {
        self.instance.as_ref().and_then(|instance| GlobalSnapshot::capture(instance.lua()).ok())
    }

    pub fn begin_play(&mut self) {
        if !self.settings.auto_run {
            return;
        }
        if let Err(err) = self.execute_script() {
            log::error!(target: "kestrel_lua::scripts", "{}: {err}", self.label());
        }
    }

    /// Starts the script from scratch on a freshly acquired instance: bind the world, inject
    /// `self` and `component`, run the chunk, then call `init()` if it is defined.
    pub fn execute_script(&mut self) -> Result<(), ScriptError> {
        self.teardown();
        self.state = HostState::Initializing;
        match self.load_and_init() {
            Ok(()) => {
                self.initialized = true;
                self.error = None;
                self.state = HostState::Ready;
                log::info!(target: "kestrel_lua::scripts", "{}: script initialized", self.label());
                Ok(())
            }
            Err(err) => {
                self.initialized = false;
                self.error = Some(err.to_string());
                self.state = HostState::Idle;
                Err(err)
            }
        }
    }

    fn load_and_init(&mut self) -> Result<(), ScriptError> {
        let (source, chunk_name) = self.source()?;
        let mut instance = self.pool.acquire()?;
        if !instance.bindings_registered() {
            log::warn!(
                target: "kestrel_lua::scripts",
                "pooled instance #{} is missing host bindings; registering again",
                instance.id()
            );
            instance.register_bindings()?;
        }
        instance.bind_world(self.world.clone());
        // Stored before running anything so a failed load is still released by teardown.
        let instance = self.instance.insert(instance);
        instance.set_global_object(SELF_GLOBAL, &self.world, self.owner)?;
        instance.set_global_object(COMPONENT_GLOBAL, &self.world, self.component)?;
        instance.exec(&source, &chunk_name)?;
        instance.call_entry(INIT_FUNCTION, ())?;
        Ok(())
    }

    fn source(&self) -> Result<(String, String), ScriptError> {
        if let Some(asset) = self.asset.as_ref().filter(|asset| !asset.contents().trim().is_empty()) {
            return Ok((asset.contents().to_string(), asset.chunk_name()));
        }
        if !self.inline_source.trim().is_empty() {
            return Ok((self.inline_source.clone(), INLINE_CHUNK_NAME.to_string()));
        }
        Err(ScriptError::NoSource)
    }

    /// Per-frame update. Errors raised by `tick` are logged and kept in `last_error`; the host
    /// stays ready for the next frame.
    pub fn tick(&mut self, dt: f32) {
        if !self.initialized || !self.settings.call_tick || !self.component_enabled() {
            return;
        }
        let Some(instance) = self.instance.as_ref() else { return };
        self.ticks += 1;
        if let Err(err) = instance.call_entry(TICK_FUNCTION, dt as f64) {
            log::error!(target: "kestrel_lua::scripts", "{}: tick failed: {err}", self.label());
            self.error = Some(err.to_string());
        }

        self.gc_counter += 1;
        if self.settings.gc_interval > 0 && self.gc_counter >= self.settings.gc_interval {
            self.gc_counter = 0;
            if let Some(instance) = self.instance.as_ref() {
                instance.step_garbage();
                self.gc_steps += 1;
            }
        }
    }

    fn component_enabled(&self) -> bool {
        let Some(component) = self.component else { return true };
        let model = self.world.model();
        if !model.is_alive(component) {
            return false;
        }
        model.read_property(component, "Enabled").and_then(|value| value.as_bool()).unwrap_or(true)
    }

    /// Calls a zero-argument global function defined by the script.
    pub fn call_function(&mut self, name: &str) -> Result<(), ScriptError> {
        let instance = match self.instance.as_ref() {
            Some(instance) if self.initialized => instance,
            _ => return Err(ScriptError::NotInitialized),
        };
        match instance.call_entry(name, ()) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ScriptError::MissingFunction(name.to_string())),
            Err(err) => {
                self.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Reloads the script and carries primitive globals over. Falls back to a plain start when
    /// nothing is running yet. On failure the new (failed) environment stays in place.
    pub fn hot_reload(&mut self) -> Result<(), ScriptError> {
        if !self.initialized {
            return self.execute_script();
        }
        self.state = HostState::HotReloading;
        let snapshot = match self.instance.as_ref().map(|instance| GlobalSnapshot::capture(instance.lua())) {
            Some(Ok(snapshot)) => snapshot,
            Some(Err(err)) => {
                let err = ScriptError::Runtime(err.to_string());
                self.error = Some(err.to_string());
                self.state = HostState::Ready;
                return Err(err);
            }
            None => GlobalSnapshot::default(),
        };
        self.execute_script()?;
        if let Some(instance) = self.instance.as_ref() {
            if let Err(err) = snapshot.restore(instance.lua()) {
                let err = ScriptError::Runtime(err.to_string());
                self.error = Some(err.to_string());
                return Err(err);
            }
        }
        log::info!(
            target: "kestrel_lua::scripts",
            "{}: hot reloaded, {} globals preserved",
            self.label(),
            snapshot.len()
        );
        Ok(())
    }

    /// Hot reloads when the external source changed on disk. Returns whether a reload ran.
    pub fn reload_if_changed(&mut self) -> Result<bool, ScriptError> {
        let Some(asset) = self.asset.as_mut() else { return Ok(false) };
        if !asset.refresh()? {
            return Ok(false);
        }
        self.hot_reload()?;
        Ok(true)
    }

    /// Releases the instance back to the pool. Safe to call any number of times.
    pub fn teardown(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.pool.release(instance);
        }
        self.initialized = false;
        self.gc_counter = 0;
        self.state = HostState::Idle;
    }

    fn label(&self) -> String {
        match &self.asset {
            Some(asset) => asset.path().display().to_string(),
            None => "inline script".to_string(),
        }
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.teardown();
    }
}
