use std::fmt;
use std::sync::{Arc, Weak};

use mlua::{Function, Lua, MetaMethod, MultiValue, UserData, UserDataMethods, Value};

use crate::dispatch::{self, Member};
use crate::error::BridgeError;
use crate::marshal;
use crate::reflect::{ObjectId, ObjectModel};

/// Script-visible, non-owning reference to a native object.
///
/// The handle keeps only the object's generational id, a class tag and a weak pointer to the
/// reflection provider; dropping it (when Lua collects the userdata) never touches the native
/// object.
#[derive(Clone)]
pub struct ObjectHandle {
    id: ObjectId,
    class: Arc<str>,
    model: Weak<dyn ObjectModel>,
}

impl ObjectHandle {
    /// Wraps `object` for script use. `None` and objects that are already gone map to `None`,
    /// which callers turn into script `nil`.
    pub fn wrap(model: &Arc<dyn ObjectModel>, object: Option<ObjectId>) -> Option<Self> {
        let id = object?;
        if !model.is_alive(id) {
            return None;
        }
        let class = model.class_name(id).unwrap_or_else(|| "Object".to_string());
        Some(Self { id, class: Arc::from(class), model: Arc::downgrade(model) })
    }

    /// Id the handle was created for, whether or not the object still exists.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    /// Dereferences the handle. Fails softly with `None` once the object (or the whole
    /// provider) has been destroyed.
    pub fn resolve(&self) -> Option<(Arc<dyn ObjectModel>, ObjectId)> {
        let model = self.model.upgrade()?;
        if model.is_alive(self.id) {
            Some((model, self.id))
        } else {
            None
        }
    }

    pub fn live_id(&self) -> Option<ObjectId> {
        self.resolve().map(|(_, id)| id)
    }

    pub fn is_valid(&self) -> bool {
        self.resolve().is_some()
    }

    pub fn same_object(&self, other: &ObjectHandle) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.model, &other.model)
    }

    fn resolve_for(&self, member: &str) -> mlua::Result<(Arc<dyn ObjectModel>, ObjectId)> {
        self.resolve().ok_or_else(|| BridgeError::InvalidHandle { member: member.to_string() }.into_lua())
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle").field("id", &self.id).field("class", &self.class).finish()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}({})", self.class, self.id)
        } else {
            write!(f, "{}(invalid)", self.class)
        }
    }
}

impl UserData for ObjectHandle {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_meta_method(MetaMethod::Index, |lua, this, key: String| {
            let (model, id) = this.resolve_for(&key)?;
            match dispatch::read_member(&model, id, &key).map_err(BridgeError::into_lua)? {
                Member::Value(value) => marshal::to_lua(lua, value),
                Member::Method(method) => bound_method(lua, this.clone(), method.name).map(Value::Function),
                Member::Missing => Ok(Value::Nil),
            }
        });

        methods.add_meta_method(MetaMethod::NewIndex, |_, this, (key, value): (String, Value)| {
            let (model, id) = this.resolve_for(&key)?;
            let value = marshal::from_lua(value).map_err(BridgeError::into_lua)?;
            dispatch::write_member(&model, id, &key, value).map_err(BridgeError::into_lua)
        });

        methods.add_meta_method(MetaMethod::Eq, |_, this, other: Value| {
            Ok(marshal::handle_arg(&other).map_or(false, |other| this.same_object(&other)))
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| Ok(this.to_string()));
    }
}

/// Builds the callable returned when a script reads a method name. The receiver is resolved
/// again on every call, so a function obtained before the object died fails cleanly.
fn bound_method(lua: &Lua, receiver: ObjectHandle, name: String) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let (model, id) = receiver.resolve_for(&name)?;
        let mut args: Vec<Value> = args.into_iter().collect();
        // `obj:Method(...)` passes the receiver as the first argument.
        if args.first().is_some_and(|first| marshal::is_handle_to(first, id)) {
            args.remove(0);
        }
        let script_args = args
            .into_iter()
            .map(marshal::from_lua)
            .collect::<Result<Vec<_>, _>>()
            .map_err(BridgeError::into_lua)?;
        let result = dispatch::call_method(&model, id, &name, script_args).map_err(BridgeError::into_lua)?;
        marshal::to_lua(lua, result)
    })
}
