//! Bounded pool of reusable Lua interpreter instances.
//!
//! Instances move out of the pool on `acquire` and back in on `release`, so a checked-out
//! instance is owned by exactly one host. Everything that touches the pool's shared state (the
//! free list, the shared instance, the counters) runs under a single mutex.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use mlua::{FromLua, Function, IntoLuaMulti, Lua, LuaOptions, StdLib, Table, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::bindings::{self, EventRegistry};
use crate::error::ScriptError;
use crate::marshal;
use crate::reflect::{ObjectId, WorldBinding};

/// Globals that survive a reset: language built-ins and the standard library tables.
pub const BUILTIN_GLOBALS: &[&str] = &[
    "_G",
    "_VERSION",
    "assert",
    "collectgarbage",
    "coroutine",
    "debug",
    "dofile",
    "error",
    "getmetatable",
    "io",
    "ipairs",
    "load",
    "loadfile",
    "math",
    "next",
    "os",
    "package",
    "pairs",
    "pcall",
    "print",
    "rawequal",
    "rawget",
    "rawlen",
    "rawset",
    "require",
    "select",
    "setmetatable",
    "string",
    "table",
    "tonumber",
    "tostring",
    "type",
    "utf8",
    "warn",
    "xpcall",
];

const PRISTINE_KEY: &str = "kestrel.pristine";
const PRISTINE_LOADED_KEY: &str = "kestrel.pristine_loaded";
const RESET_KEY: &str = "kestrel.reset";
const TRACED_CALL_KEY: &str = "kestrel.traced_call";
const MAX_TRACEBACK_DEPTH: usize = 16;

// Built once per instance. The helpers it uses are captured as locals so scripts that overwrite
// `next` or `rawset` cannot break the reset.
const RESET_FACTORY: &str = r#"
local next, rawget, rawset, setmetatable, type = next, rawget, rawset, setmetatable, type
local G = _ENV
return function(pristine, pristine_loaded)
    setmetatable(G, nil)
    local doomed, count = {}, 0
    for key in next, G do
        if rawget(pristine, key) == nil then
            count = count + 1
            doomed[count] = key
        end
    end
    for i = 1, count do
        rawset(G, doomed[i], nil)
    end
    for key, value in next, pristine do
        rawset(G, key, value)
    end
    local package = rawget(pristine, "package")
    local loaded = type(package) == "table" and rawget(package, "loaded")
    if type(loaded) == "table" then
        local stale, stale_count = {}, 0
        for name in next, loaded do
            if rawget(pristine_loaded, name) == nil then
                stale_count = stale_count + 1
                stale[stale_count] = name
            end
        end
        for i = 1, stale_count do
            rawset(loaded, stale[i], nil)
        end
    end
end
"#;

const TRACED_CALL_FACTORY: &str = r#"
local xpcall = xpcall
return function(chunk, handler)
    return xpcall(chunk, handler)
end
"#;

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorMode {
    Incremental,
    Generational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub mode: CollectorMode,
    /// Incremental mode: percentage the heap may grow before a new cycle starts.
    pub pause: i32,
    /// Incremental mode: collector speed relative to allocation.
    pub step_multiplier: i32,
    pub minor_multiplier: i32,
    pub major_multiplier: i32,
    /// Size of the explicit step driven by script hosts.
    pub step_kbytes: i32,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            mode: CollectorMode::Incremental,
            pause: 150,
            step_multiplier: 200,
            minor_multiplier: 20,
            major_multiplier: 100,
            step_kbytes: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_pool_size: usize,
    pub collector: CollectorConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_pool_size: 8, collector: CollectorConfig::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Unregistered,
    Registered,
    Acquired,
    Released,
    Reset,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub created: u64,
    pub reused: u64,
    pub discarded: u64,
    pub reset_failures: u64,
}

/// One Lua state plus the bookkeeping the pool needs to recycle it.
pub struct InterpreterInstance {
    lua: Lua,
    id: u64,
    generation: u64,
    state: InstanceState,
    step_kbytes: i32,
}

impl InterpreterInstance {
    /// Creates a state with the safe standard libraries, snapshots its pristine built-ins,
    /// registers the host bindings and configures the collector.
    pub fn create(collector: &CollectorConfig) -> Result<Self, ScriptError> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(|err| ScriptError::Creation(err.to_string()))?;
        let mut instance = Self {
            lua,
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            state: InstanceState::Unregistered,
            step_kbytes: collector.step_kbytes.max(1),
        };
        instance.prepare().map_err(|err| ScriptError::Creation(err.to_string()))?;
        instance.configure_collector(collector);
        instance.register_bindings()?;
        log::debug!(target: "kestrel_lua::pool", "created interpreter instance #{}", instance.id);
        Ok(instance)
    }

    fn prepare(&self) -> mlua::Result<()> {
        let globals = self.lua.globals();
        let pristine = self.lua.create_table()?;
        for name in BUILTIN_GLOBALS {
            let value: Value = globals.raw_get(*name)?;
            if !value.is_nil() {
                pristine.raw_set(*name, value)?;
            }
        }
        let pristine_loaded = self.lua.create_table()?;
        if let Some(package) = globals.raw_get::<Option<Table>>("package")? {
            if let Some(loaded) = package.raw_get::<Option<Table>>("loaded")? {
                for pair in loaded.pairs::<Value, Value>() {
                    let (name, _) = pair?;
                    pristine_loaded.raw_set(name, true)?;
                }
            }
        }
        self.lua.set_named_registry_value(PRISTINE_KEY, pristine)?;
        self.lua.set_named_registry_value(PRISTINE_LOADED_KEY, pristine_loaded)?;

        let reset: Function = self.lua.load(RESET_FACTORY).set_name("=reset").call(())?;
        self.lua.set_named_registry_value(RESET_KEY, reset)?;
        let traced: Function = self.lua.load(TRACED_CALL_FACTORY).set_name("=traced_call").call(())?;
        self.lua.set_named_registry_value(TRACED_CALL_KEY, traced)?;
        EventRegistry::clear(&self.lua)?;
        Ok(())
    }

    fn configure_collector(&self, collector: &CollectorConfig) {
        match collector.mode {
            CollectorMode::Incremental => {
                self.lua.gc_inc(collector.pause, collector.step_multiplier, 0);
            }
            CollectorMode::Generational => {
                self.lua.gc_gen(collector.minor_multiplier, collector.major_multiplier);
            }
        }
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Stable for the lifetime of the underlying Lua state, across any number of resets.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of completed resets.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn bindings_registered(&self) -> bool {
        bindings::is_registered(&self.lua)
    }

    /// Installs the host bindings unless they are already present. Returns whether any work was
    /// done.
    pub fn register_bindings(&mut self) -> Result<bool, ScriptError> {
        let installed = bindings::register(&self.lua).map_err(|err| ScriptError::Creation(err.to_string()))?;
        if self.state == InstanceState::Unregistered || self.state == InstanceState::Reset {
            self.state = InstanceState::Registered;
        }
        Ok(installed)
    }

    pub fn bind_world(&self, world: WorldBinding) {
        bindings::bind_world(&self.lua, world);
    }

    /// Sets global `name` to a handle for `object`, or `nil` when it is missing or dead.
    pub fn set_global_object(
        &self,
        name: &str,
        world: &WorldBinding,
        object: Option<ObjectId>,
    ) -> Result<(), ScriptError> {
        let value = marshal::object_to_lua(&self.lua, world.model(), object).map_err(runtime_error)?;
        self.lua.globals().raw_set(name, value).map_err(runtime_error)
    }

    pub fn global<V: FromLua>(&self, name: &str) -> Result<V, ScriptError> {
        self.lua.globals().get(name).map_err(runtime_error)
    }

    /// Sorted names of every string-keyed global.
    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lua
            .globals()
            .pairs::<Value, Value>()
            .filter_map(|pair| match pair {
                Ok((Value::String(name), _)) => Some(String::from(name.to_string_lossy())),
                _ => None,
            })
            .collect();
        names.sort();
        names
    }

    /// Compiles and runs `source` in the global environment. Compilation failures are
    /// `ScriptError::Load`, anything raised while running is `ScriptError::Runtime`.
    pub fn exec(&self, source: &str, chunk_name: &str) -> Result<(), ScriptError> {
        let chunk = self
            .lua
            .load(source)
            .set_name(chunk_name)
            .into_function()
            .map_err(|err| ScriptError::Load(err.to_string()))?;
        chunk.call::<()>(()).map_err(runtime_error)
    }

    /// Same as [`exec`](Self::exec) but runtime errors carry a stack traceback.
    pub fn exec_traced(&self, source: &str, chunk_name: &str) -> Result<(), ScriptError> {
        let chunk = self
            .lua
            .load(source)
            .set_name(chunk_name)
            .into_function()
            .map_err(|err| ScriptError::Load(err.to_string()))?;
        let traced: Function = self.lua.named_registry_value(TRACED_CALL_KEY).map_err(runtime_error)?;
        let handler =
            self.lua.create_function(|lua, message: Value| Ok(traceback(lua, &message))).map_err(runtime_error)?;
        let (ok, message): (bool, Value) = traced.call((chunk, handler)).map_err(runtime_error)?;
        if ok {
            Ok(())
        } else {
            Err(ScriptError::Runtime(marshal::display_value(&message)))
        }
    }

    /// Calls global function `name` if it exists. Returns `Ok(false)` when it is not defined.
    pub fn call_entry(&self, name: &str, args: impl IntoLuaMulti) -> Result<bool, ScriptError> {
        let Value::Function(function) = self.lua.globals().get::<Value>(name).map_err(runtime_error)? else {
            return Ok(false);
        };
        function.call::<()>(args).map_err(runtime_error)?;
        Ok(true)
    }

    pub fn collect_garbage(&self) {
        if let Err(err) = self.lua.gc_collect() {
            log::warn!(target: "kestrel_lua::pool", "instance #{}: full collection failed: {err}", self.id);
        }
    }

    /// Runs one incremental collection step. Returns whether a cycle finished.
    pub fn step_garbage(&self) -> bool {
        match self.lua.gc_step_kbytes(self.step_kbytes) {
            Ok(finished) => finished,
            Err(err) => {
                log::warn!(target: "kestrel_lua::pool", "instance #{}: collection step failed: {err}", self.id);
                false
            }
        }
    }

    pub fn used_memory(&self) -> usize {
        self.lua.used_memory()
    }

    /// Strips per-session state: every non-built-in global (including the host bindings), the
    /// event registry and the bound world. Built-ins are restored to the values captured at
    /// creation.
    pub fn reset(&mut self) -> Result<(), ScriptError> {
        bindings::unbind_world(&self.lua);
        reset_state(&self.lua).map_err(|err| ScriptError::Reset(err.to_string()))?;
        self.generation += 1;
        self.state = InstanceState::Reset;
        Ok(())
    }

    fn close(mut self) {
        self.state = InstanceState::Closed;
        log::debug!(target: "kestrel_lua::pool", "closed interpreter instance #{}", self.id);
    }
}

fn reset_state(lua: &Lua) -> mlua::Result<()> {
    let reset: Function = lua.named_registry_value(RESET_KEY)?;
    let pristine: Table = lua.named_registry_value(PRISTINE_KEY)?;
    let pristine_loaded: Table = lua.named_registry_value(PRISTINE_LOADED_KEY)?;
    reset.call::<()>((pristine, pristine_loaded))?;
    EventRegistry::clear(lua)?;
    lua.gc_collect()
}

fn runtime_error(err: mlua::Error) -> ScriptError {
    ScriptError::Runtime(err.to_string())
}

fn traceback(lua: &Lua, message: &Value) -> String {
    let mut out = marshal::display_value(message);
    out.push_str("\nstack traceback:");
    // Level 0 is the handler itself.
    for level in 1..=MAX_TRACEBACK_DEPTH {
        let Some(frame) = lua.inspect_stack(level) else { break };
        let source = frame.source();
        let location = source.short_src.as_deref().unwrap_or("?").to_string();
        let line = frame.curr_line();
        let name = frame.names().name.as_deref().unwrap_or("?").to_string();
        if line > 0 {
            out.push_str(&format!("\n\t{location}:{line}: in {name}"));
        } else {
            out.push_str(&format!("\n\t{location}: in {name}"));
        }
    }
    out
}

struct PoolInner {
    free: Vec<InterpreterInstance>,
    main: Option<InterpreterInstance>,
    stats: PoolStats,
    closed: bool,
}

/// Process-wide cache of interpreter instances, constructed once and shared by `Arc`.
pub struct InterpreterPool {
    config: PoolConfig,
    inner: Mutex<PoolInner>,
}

impl InterpreterPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(PoolInner { free: Vec::new(), main: None, stats: PoolStats::default(), closed: false }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Hands out an instance with the host bindings registered, reusing a released one when
    /// available.
    pub fn acquire(&self) -> Result<InterpreterInstance, ScriptError> {
        let mut inner = self.inner.lock();
        if let Some(mut instance) = inner.free.pop() {
            match instance.register_bindings() {
                Ok(_) => {
                    instance.collect_garbage();
                    instance.state = InstanceState::Acquired;
                    inner.stats.reused += 1;
                    log::debug!(target: "kestrel_lua::pool", "reusing interpreter instance #{}", instance.id);
                    return Ok(instance);
                }
                Err(err) => {
                    log::warn!(
                        target: "kestrel_lua::pool",
                        "discarding pooled instance #{} that failed to register bindings: {err}",
                        instance.id
                    );
                    inner.stats.discarded += 1;
                    instance.close();
                }
            }
        }
        let mut instance = InterpreterInstance::create(&self.config.collector)?;
        instance.state = InstanceState::Acquired;
        inner.stats.created += 1;
        Ok(instance)
    }

    /// Returns an instance to the pool. Never fails from the caller's point of view: an instance
    /// that cannot be reset, or that would exceed capacity, is closed instead.
    pub fn release(&self, mut instance: InterpreterInstance) {
        let mut inner = self.inner.lock();
        instance.state = InstanceState::Released;
        if inner.closed || inner.free.len() >= self.config.max_pool_size {
            inner.stats.discarded += 1;
            instance.close();
            return;
        }
        match instance.reset() {
            Ok(()) => inner.free.push(instance),
            Err(err) => {
                log::warn!(target: "kestrel_lua::pool", "discarding instance #{}: {err}", instance.id);
                inner.stats.reset_failures += 1;
                inner.stats.discarded += 1;
                instance.close();
            }
        }
    }

    pub fn idle_count(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().stats.clone()
    }

    /// Creates the shared instance used by [`execute_string`](Self::execute_string). Calling it
    /// again is a no-op.
    pub fn initialize(&self) -> Result<(), ScriptError> {
        let mut inner = self.inner.lock();
        if inner.main.is_some() {
            return Ok(());
        }
        let instance = InterpreterInstance::create(&self.config.collector)?;
        inner.stats.created += 1;
        inner.closed = false;
        inner.main = Some(instance);
        log::info!(target: "kestrel_lua::pool", "shared interpreter initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.lock().main.is_some()
    }

    pub fn bind_main_world(&self, world: WorldBinding) -> Result<(), ScriptError> {
        let inner = self.inner.lock();
        let main = inner.main.as_ref().ok_or(ScriptError::NotInitialized)?;
        main.bind_world(world);
        Ok(())
    }

    /// Runs `source` on the shared instance. Runtime errors carry a traceback.
    pub fn execute_string(&self, source: &str) -> Result<(), ScriptError> {
        let inner = self.inner.lock();
        let main = inner.main.as_ref().ok_or(ScriptError::NotInitialized)?;
        main.exec_traced(source, "=execute_string")
    }

    pub fn execute_file(&self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let path = path.as_ref();
        let source =
            fs::read_to_string(path).map_err(|source| ScriptError::Io { path: path.to_path_buf(), source })?;
        let inner = self.inner.lock();
        let main = inner.main.as_ref().ok_or(ScriptError::NotInitialized)?;
        main.exec_traced(&source, &format!("@{}", path.display()))
    }

    /// Reads a global from the shared instance.
    pub fn main_global<V: FromLua>(&self, name: &str) -> Result<V, ScriptError> {
        let inner = self.inner.lock();
        let main = inner.main.as_ref().ok_or(ScriptError::NotInitialized)?;
        main.global(name)
    }

    /// Closes the shared instance and every pooled one. Instances released afterwards are
    /// closed immediately.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let pooled = inner.free.len();
        for instance in inner.free.drain(..) {
            instance.close();
        }
        if let Some(main) = inner.main.take() {
            main.close();
        }
        inner.closed = true;
        log::info!(target: "kestrel_lua::pool", "interpreter pool shut down ({pooled} pooled instances closed)");
    }
}

impl Default for InterpreterPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}
