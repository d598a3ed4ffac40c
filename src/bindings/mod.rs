//! The `UE` namespace installed into every interpreter instance.

mod actor;
mod core;
mod event;
mod math;

pub use event::EventRegistry;

use mlua::{Lua, Value};

use crate::reflect::WorldBinding;

/// Global table holding every host binding.
pub const NAMESPACE: &str = "UE";
/// Per-session global naming the actor that owns the script.
pub const SELF_GLOBAL: &str = "self";
/// Per-session global naming the script component itself.
pub const COMPONENT_GLOBAL: &str = "component";

/// Installs the host bindings. Returns `false` without touching the instance when the namespace
/// is already present.
pub fn register(lua: &Lua) -> mlua::Result<bool> {
    if is_registered(lua) {
        return Ok(false);
    }
    let namespace = lua.create_table()?;
    core::register(lua, &namespace)?;
    math::register(lua, &namespace)?;
    actor::register(lua, &namespace)?;
    event::register(lua, &namespace)?;
    lua.globals().raw_set(NAMESPACE, namespace)?;
    Ok(true)
}

pub fn is_registered(lua: &Lua) -> bool {
    matches!(lua.globals().raw_get::<Value>(NAMESPACE), Ok(Value::Table(_)))
}

/// Makes `binding` the world every `UE.*` call on this instance resolves against.
pub fn bind_world(lua: &Lua, binding: WorldBinding) {
    lua.set_app_data(binding);
}

pub fn unbind_world(lua: &Lua) {
    lua.remove_app_data::<WorldBinding>();
}

pub(crate) fn bound_world(lua: &Lua) -> Option<WorldBinding> {
    lua.app_data_ref::<WorldBinding>().map(|binding| (*binding).clone())
}
