use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bevy_ecs::prelude::Entity;
use glam::Vec3;
use kestrel_lua::dispatch::{self, Member};
use kestrel_lua::reflect::{MethodDescriptor, PropertyDescriptor};
use kestrel_lua::value::{NativeValue, PropertyKind, ScriptValue};
use kestrel_lua::{BridgeError, ObjectHandle, ObjectId, ObjectModel};
use mlua::Lua;
use parking_lot::Mutex;

/// A single in-memory "Door" object.
struct FakeDoor {
    alive: AtomicBool,
    values: Mutex<HashMap<String, NativeValue>>,
    calls: Mutex<Vec<(String, Vec<NativeValue>)>>,
}

impl FakeDoor {
    fn new() -> Arc<Self> {
        let mut values = HashMap::new();
        values.insert("Open".to_string(), NativeValue::Bool(false));
        values.insert("Label".to_string(), NativeValue::Text("front".into()));
        values.insert("Position".to_string(), NativeValue::Vector(Vec3::ZERO));
        Arc::new(Self { alive: AtomicBool::new(true), values: Mutex::new(values), calls: Mutex::new(Vec::new()) })
    }

    fn id() -> ObjectId {
        ObjectId::from_entity(Entity::from_raw(7))
    }

    fn value(&self, name: &str) -> Option<NativeValue> {
        self.values.lock().get(name).cloned()
    }
}

impl ObjectModel for FakeDoor {
    fn is_alive(&self, object: ObjectId) -> bool {
        object == Self::id() && self.alive.load(Ordering::SeqCst)
    }

    fn class_name(&self, _object: ObjectId) -> Option<String> {
        Some("Door".into())
    }

    fn find_property(&self, _object: ObjectId, name: &str) -> Option<PropertyDescriptor> {
        let (kind, writable) = match name {
            "Open" => (PropertyKind::Bool, true),
            "Label" => (PropertyKind::Text, false),
            "Position" => (PropertyKind::Vector, true),
            _ => return None,
        };
        Some(PropertyDescriptor { name: name.into(), kind, writable })
    }

    fn read_property(&self, _object: ObjectId, name: &str) -> Option<NativeValue> {
        self.value(name)
    }

    fn write_property(&self, _object: ObjectId, name: &str, value: NativeValue) -> Result<(), BridgeError> {
        self.values.lock().insert(name.to_string(), value);
        Ok(())
    }

    fn find_method(&self, _object: ObjectId, name: &str) -> Option<MethodDescriptor> {
        match name {
            "Toggle" => Some(MethodDescriptor { name: name.into(), params: vec![], returns: Some(PropertyKind::Bool) }),
            "Slide" => Some(MethodDescriptor {
                name: name.into(),
                params: vec![PropertyKind::Float, PropertyKind::Text],
                returns: None,
            }),
            _ => None,
        }
    }

    fn invoke_method(
        &self,
        _object: ObjectId,
        name: &str,
        args: Vec<NativeValue>,
    ) -> Result<Option<NativeValue>, BridgeError> {
        self.calls.lock().push((name.to_string(), args));
        match name {
            "Toggle" => {
                let open = !self.value("Open").and_then(|value| value.as_bool()).unwrap_or(false);
                self.values.lock().insert("Open".into(), NativeValue::Bool(open));
                Ok(Some(NativeValue::Bool(open)))
            }
            _ => Ok(None),
        }
    }
}

fn model(door: &Arc<FakeDoor>) -> Arc<dyn ObjectModel> {
    door.clone()
}

#[test]
fn unknown_member_read_is_soft() {
    let door = FakeDoor::new();
    let member = dispatch::read_member(&model(&door), FakeDoor::id(), "Colour").expect("read unknown");
    assert!(matches!(member, Member::Missing));
}

#[test]
fn property_beats_method_lookup() {
    let door = FakeDoor::new();
    match dispatch::read_member(&model(&door), FakeDoor::id(), "Open").expect("read Open") {
        Member::Value(ScriptValue::Bool(false)) => {}
        other => panic!("unexpected member {other:?}"),
    }
    match dispatch::read_member(&model(&door), FakeDoor::id(), "Toggle").expect("read Toggle") {
        Member::Method(method) => assert_eq!(method.name, "Toggle"),
        other => panic!("unexpected member {other:?}"),
    }
}

#[test]
fn unknown_property_write_is_hard_error() {
    let door = FakeDoor::new();
    let err = dispatch::write_member(&model(&door), FakeDoor::id(), "Colour", ScriptValue::Int(3)).unwrap_err();
    assert!(matches!(err, BridgeError::UnknownProperty { ref name } if name == "Colour"));
    assert!(err.to_string().contains("Colour"));
}

#[test]
fn read_only_and_mismatched_writes_fail() {
    let door = FakeDoor::new();
    let err = dispatch::write_member(&model(&door), FakeDoor::id(), "Label", ScriptValue::Text("x".into()))
        .unwrap_err();
    assert!(matches!(err, BridgeError::ReadOnly { .. }));
    let err = dispatch::write_member(&model(&door), FakeDoor::id(), "Position", ScriptValue::Int(1)).unwrap_err();
    assert!(matches!(err, BridgeError::TypeMismatch { .. }));
}

#[test]
fn vector_record_write_fills_missing_fields() {
    let door = FakeDoor::new();
    let record = ScriptValue::Record([("Y".to_string(), ScriptValue::Float(2.5))].into_iter().collect());
    dispatch::write_member(&model(&door), FakeDoor::id(), "Position", record).expect("write position");
    assert_eq!(door.value("Position"), Some(NativeValue::Vector(Vec3::new(0.0, 2.5, 0.0))));
}

#[test]
fn dead_object_invoke_differs_from_missing() {
    let door = FakeDoor::new();
    door.alive.store(false, Ordering::SeqCst);
    let err = dispatch::call_method(&model(&door), FakeDoor::id(), "Toggle", Vec::new()).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidHandle { .. }), "got {err:?}");

    let alive = FakeDoor::new();
    let err = dispatch::call_method(&model(&alive), FakeDoor::id(), "Fly", Vec::new()).unwrap_err();
    assert!(matches!(err, BridgeError::UnknownMethod { .. }), "got {err:?}");
}

#[test]
fn missing_arguments_default_and_extras_are_dropped() {
    let door = FakeDoor::new();
    dispatch::call_method(
        &model(&door),
        FakeDoor::id(),
        "Slide",
        vec![ScriptValue::Int(3), ScriptValue::Text("left".into()), ScriptValue::Bool(true)],
    )
    .expect("call with extras");
    dispatch::call_method(&model(&door), FakeDoor::id(), "Slide", Vec::new()).expect("call without args");
    let calls = door.calls.lock();
    assert_eq!(calls[0].1, vec![NativeValue::Float(3.0), NativeValue::Text("left".into())]);
    assert_eq!(calls[1].1, vec![NativeValue::Float(0.0), NativeValue::Text(String::new())]);
}

#[test]
fn lua_side_dispatch_follows_the_same_rules() {
    let door = FakeDoor::new();
    let lua = Lua::new();
    let handle = ObjectHandle::wrap(&model(&door), Some(FakeDoor::id())).expect("wrap door");
    lua.globals().set("door", lua.create_userdata(handle).expect("userdata")).expect("set global");

    let missing: bool = lua.load("return door.Colour == nil").eval().expect("soft read");
    assert!(missing);

    let opened: bool = lua.load("return door:Toggle()").eval().expect("colon call");
    assert!(opened);
    let dotted: bool = lua.load("return door.Toggle()").eval().expect("dot call");
    assert!(!dotted);

    let (ok, message): (bool, String) = lua
        .load("local ok, err = pcall(function() door.Colour = 'red' end) return ok, tostring(err)")
        .eval()
        .expect("hard write");
    assert!(!ok);
    assert!(message.contains("Colour"), "unexpected message: {message}");

    lua.load("door.Position = { X = 4 }").exec().expect("record write");
    let x: f64 = lua.load("return door.Position.X + door.Position.Z").eval().expect("record read");
    assert_eq!(x, 4.0);
}
