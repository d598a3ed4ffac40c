//! Conversion between mlua values and the typed `ScriptValue` union.

use std::collections::BTreeMap;
use std::sync::Arc;

use mlua::{Lua, Table, Value};

use crate::error::BridgeError;
use crate::handle::ObjectHandle;
use crate::reflect::{ObjectId, ObjectModel};
use crate::value::{format_number, ScriptValue};

const MAX_RECORD_DEPTH: usize = 16;

pub fn to_lua(lua: &Lua, value: ScriptValue) -> mlua::Result<Value> {
    Ok(match value {
        ScriptValue::Nil => Value::Nil,
        ScriptValue::Bool(value) => Value::Boolean(value),
        ScriptValue::Int(value) => Value::Integer(value),
        ScriptValue::Float(value) => Value::Number(value),
        ScriptValue::Text(value) => Value::String(lua.create_string(&value)?),
        ScriptValue::Object(handle) => Value::UserData(lua.create_userdata(handle)?),
        ScriptValue::Record(fields) => {
            let table = lua.create_table()?;
            for (key, value) in fields {
                table.raw_set(key, to_lua(lua, value)?)?;
            }
            Value::Table(table)
        }
    })
}

pub fn from_lua(value: Value) -> Result<ScriptValue, BridgeError> {
    from_lua_at(value, 0)
}

fn from_lua_at(value: Value, depth: usize) -> Result<ScriptValue, BridgeError> {
    match value {
        Value::Nil => Ok(ScriptValue::Nil),
        Value::Boolean(value) => Ok(ScriptValue::Bool(value)),
        Value::Integer(value) => Ok(ScriptValue::Int(value)),
        Value::Number(value) => Ok(ScriptValue::Float(value)),
        Value::String(value) => Ok(ScriptValue::Text(String::from(value.to_string_lossy()))),
        Value::Table(table) => record_from_table(&table, depth),
        Value::UserData(ref data) => match data.borrow::<ObjectHandle>() {
            Ok(handle) => Ok(ScriptValue::Object((*handle).clone())),
            Err(_) => Err(BridgeError::Unsupported { kind: "userdata" }),
        },
        other => Err(BridgeError::Unsupported { kind: other.type_name() }),
    }
}

fn record_from_table(table: &Table, depth: usize) -> Result<ScriptValue, BridgeError> {
    if depth >= MAX_RECORD_DEPTH {
        return Err(BridgeError::Unsupported { kind: "deeply nested table" });
    }
    let mut fields = BTreeMap::new();
    for pair in table.pairs::<Value, Value>() {
        let (key, value) = pair.map_err(|_| BridgeError::Unsupported { kind: "table" })?;
        // Records are field-keyed; array parts and other key types are not marshalled.
        let Value::String(key) = key else { continue };
        fields.insert(String::from(key.to_string_lossy()), from_lua_at(value, depth + 1)?);
    }
    Ok(ScriptValue::Record(fields))
}

/// Pushes a native object into script scope: a handle, or `nil` for a missing/dead object.
pub fn object_to_lua(lua: &Lua, model: &Arc<dyn ObjectModel>, object: Option<ObjectId>) -> mlua::Result<Value> {
    match ObjectHandle::wrap(model, object) {
        Some(handle) => Ok(Value::UserData(lua.create_userdata(handle)?)),
        None => Ok(Value::Nil),
    }
}

pub fn handle_arg(value: &Value) -> Option<ObjectHandle> {
    match value {
        Value::UserData(data) => data.borrow::<ObjectHandle>().ok().map(|handle| (*handle).clone()),
        _ => None,
    }
}

pub fn is_handle_to(value: &Value, object: ObjectId) -> bool {
    handle_arg(value).is_some_and(|handle| handle.id() == object)
}

/// Renders a value the way Lua's `tostring` would for logging.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(value) => value.to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Number(value) => format_number(*value),
        Value::String(value) => String::from(value.to_string_lossy()),
        Value::UserData(_) => match handle_arg(value) {
            Some(handle) => handle.to_string(),
            None => "userdata".to_string(),
        },
        Value::Error(err) => error_message(err),
        other => other.type_name().to_string(),
    }
}

/// Message of an error raised from Rust, without the callback wrappers mlua adds around it.
pub fn error_message(err: &mlua::Error) -> String {
    match err {
        mlua::Error::CallbackError { cause, .. } => error_message(cause),
        mlua::Error::ExternalError(cause) => cause.to_string(),
        other => other.to_string(),
    }
}
