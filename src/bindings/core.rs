//! `UE.Print`, `UE.GetDeltaTime` and the `UE.Log` table.

use mlua::{Lua, MultiValue, Table};

use super::bound_world;
use crate::marshal;
use crate::reflect::MessageLevel;

pub(super) fn register(lua: &Lua, namespace: &Table) -> mlua::Result<()> {
    namespace.raw_set(
        "Print",
        lua.create_function(|lua, args: MultiValue| {
            let message = args.iter().map(marshal::display_value).collect::<Vec<_>>().join("\t");
            log::info!(target: "lua", "{message}");
            if let Some(world) = bound_world(lua) {
                world.context().debug_message(MessageLevel::Info, &message);
            }
            Ok(())
        })?,
    )?;

    namespace.raw_set(
        "GetDeltaTime",
        lua.create_function(|lua, ()| {
            Ok(bound_world(lua).map_or(0.0, |world| world.context().delta_seconds() as f64))
        })?,
    )?;

    let log_table = lua.create_table()?;
    log_table.raw_set(
        "Trace",
        lua.create_function(|_, message: String| {
            log::info!(target: "lua", "{message}");
            Ok(())
        })?,
    )?;
    log_table.raw_set("Warning", leveled(lua, MessageLevel::Warning)?)?;
    log_table.raw_set("Error", leveled(lua, MessageLevel::Error)?)?;
    namespace.raw_set("Log", log_table)?;
    Ok(())
}

fn leveled(lua: &Lua, level: MessageLevel) -> mlua::Result<mlua::Function> {
    lua.create_function(move |lua, message: String| {
        match level {
            MessageLevel::Error => log::error!(target: "lua", "{message}"),
            _ => log::warn!(target: "lua", "{message}"),
        }
        if let Some(world) = bound_world(lua) {
            world.context().debug_message(level, &message);
        }
        Ok(())
    })
}
