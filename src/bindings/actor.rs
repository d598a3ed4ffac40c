//! `UE.Actor`: lifecycle operations against the bound world.

use glam::Vec3;
use mlua::{Lua, Table, Value};

use super::bound_world;
use crate::error::BridgeError;
use crate::marshal;
use crate::value::{NativeValue, PropertyKind, Rotator};

pub(super) fn register(lua: &Lua, namespace: &Table) -> mlua::Result<()> {
    let actor = lua.create_table()?;

    actor.raw_set(
        "Find",
        lua.create_function(|lua, name: String| {
            let Some(world) = bound_world(lua) else {
                log::warn!(target: "lua", "UE.Actor.Find('{name}') called with no world bound");
                return Ok(Value::Nil);
            };
            let found = world.context().find_actor(&name);
            marshal::object_to_lua(lua, world.model(), found)
        })?,
    )?;

    actor.raw_set(
        "Spawn",
        lua.create_function(|lua, (class, location, rotation): (String, Value, Value)| {
            let Some(world) = bound_world(lua) else {
                log::warn!(target: "lua", "UE.Actor.Spawn('{class}') called with no world bound");
                return Ok(Value::Nil);
            };
            let location = optional_vector(location);
            let rotation = optional_rotator(rotation);
            let spawned = world.context().spawn_actor(&class, location, rotation);
            if spawned.is_none() {
                log::warn!(target: "lua", "UE.Actor.Spawn: could not spawn class '{class}'");
            }
            marshal::object_to_lua(lua, world.model(), spawned)
        })?,
    )?;

    actor.raw_set(
        "Destroy",
        lua.create_function(|lua, target: Value| {
            let invalid = || BridgeError::MethodFailed {
                name: "Actor.Destroy".to_string(),
                message: "invalid actor provided for destruction".to_string(),
            };
            let world = bound_world(lua).ok_or_else(|| invalid().into_lua())?;
            let id = marshal::handle_arg(&target)
                .and_then(|handle| handle.live_id())
                .ok_or_else(|| invalid().into_lua())?;
            if world.context().destroy_actor(id) {
                Ok(true)
            } else {
                Err(invalid().into_lua())
            }
        })?,
    )?;

    namespace.raw_set("Actor", actor)?;
    Ok(())
}

// Spawn treats anything that is not a usable record as "use the origin".
fn optional_vector(value: Value) -> Vec3 {
    let Value::Table(_) = value else { return Vec3::ZERO };
    marshal::from_lua(value)
        .and_then(|record| PropertyKind::Vector.coerce("location", record))
        .ok()
        .and_then(|native| native.as_vector())
        .unwrap_or(Vec3::ZERO)
}

fn optional_rotator(value: Value) -> Rotator {
    let Value::Table(_) = value else { return Rotator::ZERO };
    match marshal::from_lua(value).and_then(|record| PropertyKind::Rotator.coerce("rotation", record)) {
        Ok(NativeValue::Rotator(rotation)) => rotation,
        _ => Rotator::ZERO,
    }
}
