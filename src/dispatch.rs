//! Resolves script-side member names against an object's reflection metadata.
//!
//! Lookup order is property, then method, then nothing. Reads of unknown names are soft
//! (`Member::Missing`); writes to unknown names and any access through a dead object are hard
//! errors.

use std::sync::Arc;

use crate::error::BridgeError;
use crate::reflect::{MethodDescriptor, ObjectId, ObjectModel};
use crate::value::ScriptValue;

#[derive(Debug, Clone)]
pub enum Member {
    Value(ScriptValue),
    Method(MethodDescriptor),
    Missing,
}

pub fn read_member(model: &Arc<dyn ObjectModel>, object: ObjectId, name: &str) -> Result<Member, BridgeError> {
    ensure_alive(model.as_ref(), object, name)?;
    if model.find_property(object, name).is_some() {
        let value = model
            .read_property(object, name)
            .map(|native| native.into_script(model))
            .unwrap_or(ScriptValue::Nil);
        return Ok(Member::Value(value));
    }
    if let Some(method) = model.find_method(object, name) {
        return Ok(Member::Method(method));
    }
    Ok(Member::Missing)
}

pub fn write_member(
    model: &Arc<dyn ObjectModel>,
    object: ObjectId,
    name: &str,
    value: ScriptValue,
) -> Result<(), BridgeError> {
    ensure_alive(model.as_ref(), object, name)?;
    let Some(property) = model.find_property(object, name) else {
        return Err(BridgeError::UnknownProperty { name: name.to_string() });
    };
    if !property.writable {
        return Err(BridgeError::ReadOnly { name: property.name });
    }
    let native = property.kind.coerce(&property.name, value)?;
    model.write_property(object, &property.name, native)
}

/// Invokes `name` on `object`. Arguments are coerced to the declared parameter kinds; missing
/// trailing arguments take the kind's zero value and surplus ones are ignored.
pub fn call_method(
    model: &Arc<dyn ObjectModel>,
    object: ObjectId,
    name: &str,
    args: Vec<ScriptValue>,
) -> Result<ScriptValue, BridgeError> {
    ensure_alive(model.as_ref(), object, name)?;
    let Some(method) = model.find_method(object, name) else {
        return Err(BridgeError::UnknownMethod { name: name.to_string() });
    };
    let mut supplied = args.into_iter();
    let mut native_args = Vec::with_capacity(method.params.len());
    for (idx, kind) in method.params.iter().enumerate() {
        let native = match supplied.next() {
            Some(value) => kind.coerce(&format!("{}#{}", method.name, idx + 1), value)?,
            None => kind.default_value(),
        };
        native_args.push(native);
    }
    let result = model.invoke_method(object, &method.name, native_args)?;
    Ok(result.map(|native| native.into_script(model)).unwrap_or(ScriptValue::Nil))
}

fn ensure_alive(model: &dyn ObjectModel, object: ObjectId, member: &str) -> Result<(), BridgeError> {
    if model.is_alive(object) {
        Ok(())
    } else {
        Err(BridgeError::InvalidHandle { member: member.to_string() })
    }
}
