//! Primitive-global snapshots carried across a hot reload.
//!
//! Only booleans, numbers and strings survive. Functions, tables, userdata and coroutines are
//! dropped: the new chunk is expected to rebuild them.

use std::collections::BTreeMap;

use mlua::{Lua, Value};
use serde::{Deserialize, Serialize};

use crate::bindings::{COMPONENT_GLOBAL, NAMESPACE, SELF_GLOBAL};
use crate::pool::BUILTIN_GLOBALS;
use crate::value::PrimitiveValue;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalSnapshot {
    values: BTreeMap<String, PrimitiveValue>,
}

impl GlobalSnapshot {
    /// Collects every script-defined primitive global.
    pub fn capture(lua: &Lua) -> mlua::Result<Self> {
        let mut values = BTreeMap::new();
        for pair in lua.globals().pairs::<Value, Value>() {
            let (key, value) = pair?;
            let Value::String(key) = key else { continue };
            let Ok(name) = key.to_str().map(|name| name.to_string()) else { continue };
            if !is_preservable_name(&name) {
                continue;
            }
            if let Some(primitive) = primitive_of(&value) {
                values.insert(name, primitive);
            }
        }
        Ok(Self { values })
    }

    /// Writes the captured values back as globals, overwriting whatever the new chunk assigned.
    pub fn restore(&self, lua: &Lua) -> mlua::Result<()> {
        let globals = lua.globals();
        for (name, value) in &self.values {
            let value = match value {
                PrimitiveValue::Bool(value) => Value::Boolean(*value),
                PrimitiveValue::Int(value) => Value::Integer(*value),
                PrimitiveValue::Float(value) => Value::Number(*value),
                PrimitiveValue::Text(value) => Value::String(lua.create_string(value)?),
            };
            globals.raw_set(name.as_str(), value)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&PrimitiveValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &BTreeMap<String, PrimitiveValue> {
        &self.values
    }
}

fn is_preservable_name(name: &str) -> bool {
    name != NAMESPACE && name != SELF_GLOBAL && name != COMPONENT_GLOBAL && !BUILTIN_GLOBALS.contains(&name)
}

fn primitive_of(value: &Value) -> Option<PrimitiveValue> {
    match value {
        Value::Boolean(value) => Some(PrimitiveValue::Bool(*value)),
        Value::Integer(value) => Some(PrimitiveValue::Int(*value)),
        Value::Number(value) => Some(PrimitiveValue::Float(*value)),
        Value::String(value) => Some(PrimitiveValue::Text(String::from(value.to_string_lossy()))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_bindings_and_builtins() {
        assert!(!is_preservable_name("UE"));
        assert!(!is_preservable_name("self"));
        assert!(!is_preservable_name("_VERSION"));
        assert!(is_preservable_name("score"));
    }

    #[test]
    fn captures_only_primitives() {
        let lua = Lua::new();
        lua.load(r#"score = 5; ratio = 0.5; name = "x"; alive = true; items = {}; function f() end"#)
            .exec()
            .expect("seed globals");
        let snapshot = GlobalSnapshot::capture(&lua).expect("capture");
        assert_eq!(snapshot.get("score"), Some(&PrimitiveValue::Int(5)));
        assert_eq!(snapshot.get("ratio"), Some(&PrimitiveValue::Float(0.5)));
        assert_eq!(snapshot.get("name"), Some(&PrimitiveValue::Text("x".into())));
        assert_eq!(snapshot.get("alive"), Some(&PrimitiveValue::Bool(true)));
        assert!(snapshot.get("items").is_none());
        assert!(snapshot.get("f").is_none());
        assert_eq!(snapshot.len(), 4);
    }

    #[test]
    fn restore_keeps_integer_subtype() {
        let source = Lua::new();
        source.load("score = 5").exec().expect("seed");
        let snapshot = GlobalSnapshot::capture(&source).expect("capture");

        let target = Lua::new();
        target.load("score = 0").exec().expect("seed target");
        snapshot.restore(&target).expect("restore");
        let is_integer: bool = target.load("return math.type(score) == 'integer' and score == 5").eval().expect("eval");
        assert!(is_integer);
    }
}
