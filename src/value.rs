use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;
use crate::handle::ObjectHandle;
use crate::reflect::{ObjectId, ObjectModel};

/// The fixed type table used when converting between native properties and script values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Text,
    Object,
    Vector,
    Rotator,
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int => "int",
            PropertyKind::Float => "float",
            PropertyKind::Text => "text",
            PropertyKind::Object => "object",
            PropertyKind::Vector => "vector",
            PropertyKind::Rotator => "rotator",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl Rotator {
    pub const ZERO: Rotator = Rotator { pitch: 0.0, yaw: 0.0, roll: 0.0 };

    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        Self { pitch, yaw, roll }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.pitch, self.yaw, self.roll]
    }
}

/// Host-side value stored in properties and exchanged with native methods.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(Option<ObjectId>),
    Vector(Vec3),
    Rotator(Rotator),
}

impl NativeValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            NativeValue::Bool(_) => PropertyKind::Bool,
            NativeValue::Int(_) => PropertyKind::Int,
            NativeValue::Float(_) => PropertyKind::Float,
            NativeValue::Text(_) => PropertyKind::Text,
            NativeValue::Object(_) => PropertyKind::Object,
            NativeValue::Vector(_) => PropertyKind::Vector,
            NativeValue::Rotator(_) => PropertyKind::Rotator,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<Vec3> {
        match self {
            NativeValue::Vector(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            NativeValue::Object(value) => *value,
            _ => None,
        }
    }

    /// Converts a native value into its script representation. Value types become records;
    /// objects become handles, or nil when the object is gone.
    pub fn into_script(self, model: &Arc<dyn ObjectModel>) -> ScriptValue {
        match self {
            NativeValue::Bool(value) => ScriptValue::Bool(value),
            NativeValue::Int(value) => ScriptValue::Int(value),
            NativeValue::Float(value) => ScriptValue::Float(value),
            NativeValue::Text(value) => ScriptValue::Text(value),
            NativeValue::Object(id) => {
                ObjectHandle::wrap(model, id).map(ScriptValue::Object).unwrap_or(ScriptValue::Nil)
            }
            NativeValue::Vector(value) => ScriptValue::vector(value),
            NativeValue::Rotator(value) => ScriptValue::rotator(value),
        }
    }

    /// Parses a JSON literal (used by class and fixture configs) as a value of `kind`.
    pub fn from_json(kind: PropertyKind, json: &serde_json::Value) -> Option<NativeValue> {
        use serde_json::Value as Json;
        match (kind, json) {
            (PropertyKind::Bool, Json::Bool(value)) => Some(NativeValue::Bool(*value)),
            (PropertyKind::Int, Json::Number(value)) => value.as_i64().map(NativeValue::Int),
            (PropertyKind::Float, Json::Number(value)) => value.as_f64().map(NativeValue::Float),
            (PropertyKind::Text, Json::String(value)) => Some(NativeValue::Text(value.clone())),
            (PropertyKind::Object, Json::Null) => Some(NativeValue::Object(None)),
            (PropertyKind::Vector, Json::Array(items)) => {
                let [x, y, z] = json_triple(items)?;
                Some(NativeValue::Vector(Vec3::new(x, y, z)))
            }
            (PropertyKind::Rotator, Json::Array(items)) => {
                let [pitch, yaw, roll] = json_triple(items)?;
                Some(NativeValue::Rotator(Rotator::new(pitch, yaw, roll)))
            }
            _ => None,
        }
    }

    /// JSON form used in reports. Objects are rendered as their id, or `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            NativeValue::Bool(value) => json!(value),
            NativeValue::Int(value) => json!(value),
            NativeValue::Float(value) => json!(value),
            NativeValue::Text(value) => json!(value),
            NativeValue::Object(Some(id)) => json!(id.to_string()),
            NativeValue::Object(None) => serde_json::Value::Null,
            NativeValue::Vector(value) => json!(value.to_array()),
            NativeValue::Rotator(value) => json!(value.to_array()),
        }
    }
}

fn json_triple(items: &[serde_json::Value]) -> Option<[f32; 3]> {
    if items.len() != 3 {
        return None;
    }
    let mut out = [0.0; 3];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()? as f32;
    }
    Some(out)
}

impl PropertyKind {
    pub fn default_value(self) -> NativeValue {
        match self {
            PropertyKind::Bool => NativeValue::Bool(false),
            PropertyKind::Int => NativeValue::Int(0),
            PropertyKind::Float => NativeValue::Float(0.0),
            PropertyKind::Text => NativeValue::Text(String::new()),
            PropertyKind::Object => NativeValue::Object(None),
            PropertyKind::Vector => NativeValue::Vector(Vec3::ZERO),
            PropertyKind::Rotator => NativeValue::Rotator(Rotator::ZERO),
        }
    }

    /// Converts a script value into the native type described by `self`.
    ///
    /// `name` only feeds the error message. Booleans follow Lua truthiness, numbers convert
    /// between integer and float when no precision is lost, and records fill missing vector or
    /// rotator fields with zero.
    pub fn coerce(self, name: &str, value: ScriptValue) -> Result<NativeValue, BridgeError> {
        let mismatch = |value: &ScriptValue| BridgeError::TypeMismatch {
            name: name.to_string(),
            expected: self,
            found: value.type_name(),
        };
        match self {
            PropertyKind::Bool => Ok(NativeValue::Bool(value.truthy())),
            PropertyKind::Int => match value {
                ScriptValue::Int(value) => Ok(NativeValue::Int(value)),
                ScriptValue::Float(value) if is_integral(value) => Ok(NativeValue::Int(value as i64)),
                ScriptValue::Text(ref text) => {
                    text.trim().parse::<i64>().map(NativeValue::Int).map_err(|_| mismatch(&value))
                }
                other => Err(mismatch(&other)),
            },
            PropertyKind::Float => match value {
                ScriptValue::Int(value) => Ok(NativeValue::Float(value as f64)),
                ScriptValue::Float(value) => Ok(NativeValue::Float(value)),
                ScriptValue::Text(ref text) => {
                    text.trim().parse::<f64>().map(NativeValue::Float).map_err(|_| mismatch(&value))
                }
                other => Err(mismatch(&other)),
            },
            PropertyKind::Text => match value {
                ScriptValue::Text(value) => Ok(NativeValue::Text(value)),
                ScriptValue::Int(value) => Ok(NativeValue::Text(value.to_string())),
                ScriptValue::Float(value) => Ok(NativeValue::Text(format_number(value))),
                other => Err(mismatch(&other)),
            },
            PropertyKind::Object => match value {
                ScriptValue::Nil => Ok(NativeValue::Object(None)),
                ScriptValue::Object(handle) => Ok(NativeValue::Object(handle.live_id())),
                other => Err(mismatch(&other)),
            },
            PropertyKind::Vector => match value {
                ScriptValue::Record(ref fields) => {
                    let [x, y, z] = record_triple(fields, ["X", "Y", "Z"]).ok_or_else(|| mismatch(&value))?;
                    Ok(NativeValue::Vector(Vec3::new(x, y, z)))
                }
                other => Err(mismatch(&other)),
            },
            PropertyKind::Rotator => match value {
                ScriptValue::Record(ref fields) => {
                    let [pitch, yaw, roll] =
                        record_triple(fields, ["Pitch", "Yaw", "Roll"]).ok_or_else(|| mismatch(&value))?;
                    Ok(NativeValue::Rotator(Rotator::new(pitch, yaw, roll)))
                }
                other => Err(mismatch(&other)),
            },
        }
    }
}

// `i64::MAX as f64` rounds up to 2^63, which is already out of range.
fn is_integral(value: f64) -> bool {
    value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64
}

fn record_triple(fields: &BTreeMap<String, ScriptValue>, keys: [&str; 3]) -> Option<[f32; 3]> {
    let mut out = [0.0; 3];
    for (slot, key) in out.iter_mut().zip(keys) {
        *slot = match fields.get(key) {
            None | Some(ScriptValue::Nil) => 0.0,
            Some(ScriptValue::Int(value)) => *value as f32,
            Some(ScriptValue::Float(value)) => *value as f32,
            Some(_) => return None,
        };
    }
    Some(out)
}

/// Typed marshalling union between Lua values and the dispatcher.
#[derive(Debug, Clone)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object(ObjectHandle),
    Record(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    pub fn vector(value: Vec3) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("X".to_string(), ScriptValue::Float(value.x as f64));
        fields.insert("Y".to_string(), ScriptValue::Float(value.y as f64));
        fields.insert("Z".to_string(), ScriptValue::Float(value.z as f64));
        ScriptValue::Record(fields)
    }

    pub fn rotator(value: Rotator) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("Pitch".to_string(), ScriptValue::Float(value.pitch as f64));
        fields.insert("Yaw".to_string(), ScriptValue::Float(value.yaw as f64));
        fields.insert("Roll".to_string(), ScriptValue::Float(value.roll as f64));
        ScriptValue::Record(fields)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Int(_) => "integer",
            ScriptValue::Float(_) => "number",
            ScriptValue::Text(_) => "string",
            ScriptValue::Object(_) => "object",
            ScriptValue::Record(_) => "table",
        }
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, ScriptValue::Nil | ScriptValue::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, ScriptValue::Nil)
    }
}

/// Globals preserved across a hot reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimitiveValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveValue::Bool(value) => write!(f, "{value}"),
            PrimitiveValue::Int(value) => write!(f, "{value}"),
            PrimitiveValue::Float(value) => f.write_str(&format_number(*value)),
            PrimitiveValue::Text(value) => f.write_str(value),
        }
    }
}

/// Formats a float like Lua's `tostring` (`%.14g`, plus `.0` when the result reads as an
/// integer).
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let scientific = format!("{value:.13e}");
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if !(-4..14).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{sign}{:02}", trim_fraction(mantissa), exponent.abs());
    }
    let precision = (13 - exponent) as usize;
    let fixed = format!("{value:.precision$}");
    let trimmed = trim_fraction(&fixed);
    if trimmed.contains('.') {
        trimmed.to_string()
    } else {
        format!("{trimmed}.0")
    }
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, ScriptValue)]) -> ScriptValue {
        ScriptValue::Record(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn vector_record_defaults_missing_fields_to_zero() {
        let value = record(&[("X", ScriptValue::Int(3)), ("Z", ScriptValue::Float(1.5))]);
        let native = PropertyKind::Vector.coerce("Location", value).expect("coerce vector");
        assert_eq!(native, NativeValue::Vector(Vec3::new(3.0, 0.0, 1.5)));
    }

    #[test]
    fn rotator_record_rejects_non_numeric_fields() {
        let value = record(&[("Yaw", ScriptValue::Text("north".into()))]);
        let err = PropertyKind::Rotator.coerce("Rotation", value).unwrap_err();
        assert!(err.to_string().contains("Rotation"), "error should name the property: {err}");
    }

    #[test]
    fn int_accepts_integral_floats_only() {
        assert_eq!(PropertyKind::Int.coerce("Health", ScriptValue::Float(4.0)).unwrap(), NativeValue::Int(4));
        assert!(PropertyKind::Int.coerce("Health", ScriptValue::Float(4.5)).is_err());
    }

    #[test]
    fn int_rejects_floats_outside_i64_range() {
        for value in [1e300, -1e300, 9_223_372_036_854_775_808.0] {
            let err = PropertyKind::Int.coerce("Health", ScriptValue::Float(value)).unwrap_err();
            assert!(matches!(err, BridgeError::TypeMismatch { .. }), "{value} should not saturate: {err}");
        }
        assert_eq!(
            PropertyKind::Int.coerce("Health", ScriptValue::Float(-9_223_372_036_854_775_808.0)).unwrap(),
            NativeValue::Int(i64::MIN)
        );
    }

    #[test]
    fn bool_follows_lua_truthiness() {
        assert_eq!(PropertyKind::Bool.coerce("Hidden", ScriptValue::Nil).unwrap(), NativeValue::Bool(false));
        assert_eq!(PropertyKind::Bool.coerce("Hidden", ScriptValue::Int(0)).unwrap(), NativeValue::Bool(true));
    }

    #[test]
    fn json_defaults_parse_per_kind() {
        let json = serde_json::json!([1.0, 2.0, 3.0]);
        assert_eq!(
            NativeValue::from_json(PropertyKind::Vector, &json),
            Some(NativeValue::Vector(Vec3::new(1.0, 2.0, 3.0)))
        );
        assert_eq!(NativeValue::from_json(PropertyKind::Int, &serde_json::json!("7")), None);
    }

    #[test]
    fn numbers_format_like_lua() {
        assert_eq!(format_number(5.0), "5.0");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(100.0), "100.0");
        assert_eq!(format_number(-0.0), "-0.0");
        assert_eq!(format_number(1.0 / 3.0), "0.33333333333333");
        assert_eq!(format_number(1e15), "1e+15");
        assert_eq!(format_number(1e16), "1e+16");
        assert_eq!(format_number(2.5e100), "2.5e+100");
        assert_eq!(format_number(1e-5), "1e-05");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(f64::INFINITY), "inf");
    }
}
