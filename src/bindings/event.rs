//! `UE.Event`: the per-instance event registry.

use mlua::{Function, Lua, MultiValue, Table, Value};

const REGISTRY_KEY: &str = "kestrel.events";

/// Event name -> callbacks in registration order, kept in the Lua registry so it lives and dies
/// with its instance.
pub struct EventRegistry {
    table: Table,
}

impl EventRegistry {
    /// Returns the instance's registry, creating an empty one if needed.
    pub fn get(lua: &Lua) -> mlua::Result<Self> {
        if let Some(table) = lua.named_registry_value::<Option<Table>>(REGISTRY_KEY)? {
            return Ok(Self { table });
        }
        Self::clear(lua)
    }

    /// Replaces the registry with an empty one.
    pub fn clear(lua: &Lua) -> mlua::Result<Self> {
        let table = lua.create_table()?;
        lua.set_named_registry_value(REGISTRY_KEY, table.clone())?;
        Ok(Self { table })
    }

    /// Appends `callback` and returns how many callbacks `name` now has.
    pub fn register(&self, lua: &Lua, name: &str, callback: Function) -> mlua::Result<usize> {
        let list = match self.table.raw_get::<Option<Table>>(name)? {
            Some(list) => list,
            None => {
                let list = lua.create_table()?;
                self.table.raw_set(name, list.clone())?;
                list
            }
        };
        let next = list.raw_len() + 1;
        list.raw_set(next, callback)?;
        Ok(next)
    }

    pub fn callbacks(&self, name: &str) -> mlua::Result<Vec<Function>> {
        match self.table.raw_get::<Option<Table>>(name)? {
            Some(list) => list.sequence_values::<Function>().collect(),
            None => Ok(Vec::new()),
        }
    }

    pub fn count(&self, name: &str) -> mlua::Result<usize> {
        Ok(self.table.raw_get::<Option<Table>>(name)?.map_or(0, |list| list.raw_len()))
    }

    /// Calls every callback for `name` in registration order. The list is captured up front, so
    /// callbacks that register or unregister take effect on the next trigger. A failing callback
    /// is logged and skipped; the return value counts the ones that succeeded.
    pub fn trigger(&self, name: &str, args: MultiValue) -> mlua::Result<usize> {
        let mut succeeded = 0;
        for (idx, callback) in self.callbacks(name)?.into_iter().enumerate() {
            match callback.call::<()>(args.clone()) {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    log::warn!(target: "lua", "event '{name}' callback #{} failed: {err}", idx + 1);
                }
            }
        }
        Ok(succeeded)
    }

    /// Drops every callback for `name`. Returns whether any were registered.
    pub fn unregister(&self, name: &str) -> mlua::Result<bool> {
        let existed = self.count(name)? > 0;
        self.table.raw_set(name, Value::Nil)?;
        Ok(existed)
    }
}

pub(super) fn register(lua: &Lua, namespace: &Table) -> mlua::Result<()> {
    let event = lua.create_table()?;
    event.raw_set(
        "Register",
        lua.create_function(|lua, (name, callback): (String, Function)| {
            EventRegistry::get(lua)?.register(lua, &name, callback)
        })?,
    )?;
    event.raw_set(
        "Trigger",
        lua.create_function(|lua, (name, args): (String, MultiValue)| EventRegistry::get(lua)?.trigger(&name, args))?,
    )?;
    event.raw_set(
        "Unregister",
        lua.create_function(|lua, name: String| EventRegistry::get(lua)?.unregister(&name))?,
    )?;
    namespace.raw_set("Event", event)?;
    Ok(())
}
