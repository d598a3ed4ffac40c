//! `UE.Math`: value-type constructors.

use mlua::{Lua, Table};

pub(super) fn register(lua: &Lua, namespace: &Table) -> mlua::Result<()> {
    let math = lua.create_table()?;
    math.raw_set(
        "Vector",
        lua.create_function(|lua, (x, y, z): (Option<f64>, Option<f64>, Option<f64>)| {
            record(lua, [("X", x), ("Y", y), ("Z", z)])
        })?,
    )?;
    math.raw_set(
        "Rotation",
        lua.create_function(|lua, (pitch, yaw, roll): (Option<f64>, Option<f64>, Option<f64>)| {
            record(lua, [("Pitch", pitch), ("Yaw", yaw), ("Roll", roll)])
        })?,
    )?;
    namespace.raw_set("Math", math)?;
    Ok(())
}

fn record(lua: &Lua, fields: [(&str, Option<f64>); 3]) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (key, value) in fields {
        table.raw_set(key, value.unwrap_or(0.0))?;
    }
    Ok(table)
}
