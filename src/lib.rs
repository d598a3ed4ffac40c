//! Lua scripting bridge: exposes a host object model to pooled Lua interpreter instances.

pub mod assets;
pub mod bindings;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handle;
pub mod marshal;
pub mod pool;
pub mod reflect;
pub mod runner;
pub mod script_harness;
pub mod scripts;
pub mod snapshot;
pub mod time;
pub mod value;
pub mod world;

pub use error::{BridgeError, ScriptError};
pub use handle::ObjectHandle;
pub use pool::{InterpreterInstance, InterpreterPool, PoolConfig};
pub use reflect::{ObjectId, ObjectModel, WorldBinding, WorldContext};
pub use scripts::{ScriptHost, ScriptHostSettings};
pub use world::HostWorld;
