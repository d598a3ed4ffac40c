use std::fmt;
use std::sync::Arc;

use bevy_ecs::prelude::Entity;
use glam::Vec3;

use crate::error::BridgeError;
use crate::value::{NativeValue, PropertyKind, Rotator};

/// Generational identity of a native object.
///
/// Wraps an ECS entity: the generation changes whenever a slot is reused, so an id taken from a
/// destroyed object never resolves to its successor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(Entity);

impl ObjectId {
    pub fn from_entity(entity: Entity) -> Self {
        Self(entity)
    }

    pub fn entity(self) -> Entity {
        self.0
    }

    pub fn to_bits(self) -> u64 {
        self.0.to_bits()
    }

    pub fn index(self) -> u32 {
        self.0.index()
    }

    pub fn generation(self) -> u32 {
        self.0.generation()
    }
}

impl From<Entity> for ObjectId {
    fn from(entity: Entity) -> Self {
        Self(entity)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({}:{})", self.index(), self.generation())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.generation())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
    pub writable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    pub name: String,
    pub params: Vec<PropertyKind>,
    pub returns: Option<PropertyKind>,
}

/// Reflection capability of the host's object model.
///
/// The dispatcher only ever talks to objects through this trait, so any object store can be
/// bridged (tests use small in-memory fakes).
pub trait ObjectModel: Send + Sync {
    fn is_alive(&self, object: ObjectId) -> bool;

    fn class_name(&self, object: ObjectId) -> Option<String>;

    fn find_property(&self, object: ObjectId, name: &str) -> Option<PropertyDescriptor>;

    fn read_property(&self, object: ObjectId, name: &str) -> Option<NativeValue>;

    /// Stores an already-coerced value. Called only for properties `find_property` reported as
    /// writable.
    fn write_property(&self, object: ObjectId, name: &str, value: NativeValue) -> Result<(), BridgeError>;

    fn find_method(&self, object: ObjectId, name: &str) -> Option<MethodDescriptor>;

    /// Invokes a method with arguments already coerced to the descriptor's parameter kinds.
    fn invoke_method(
        &self,
        object: ObjectId,
        name: &str,
        args: Vec<NativeValue>,
    ) -> Result<Option<NativeValue>, BridgeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MessageLevel::Info => "info",
            MessageLevel::Warning => "warning",
            MessageLevel::Error => "error",
        })
    }
}

/// World-level services the host bindings need beyond per-object reflection.
pub trait WorldContext: Send + Sync {
    /// Elapsed time of the current frame in seconds.
    fn delta_seconds(&self) -> f32;

    fn find_actor(&self, name: &str) -> Option<ObjectId>;

    /// Returns `None` when the class is unknown or cannot be spawned.
    fn spawn_actor(&self, class: &str, location: Vec3, rotation: Rotator) -> Option<ObjectId>;

    fn destroy_actor(&self, actor: ObjectId) -> bool;

    /// On-screen debug overlay, if the host has one.
    fn debug_message(&self, level: MessageLevel, text: &str);
}

/// A world as seen from one interpreter instance: the world services plus the reflection
/// provider handles are wrapped against.
#[derive(Clone)]
pub struct WorldBinding {
    context: Arc<dyn WorldContext>,
    model: Arc<dyn ObjectModel>,
}

impl WorldBinding {
    pub fn new<W>(world: Arc<W>) -> Self
    where
        W: WorldContext + ObjectModel + 'static,
    {
        Self { context: world.clone(), model: world }
    }

    pub fn from_parts(context: Arc<dyn WorldContext>, model: Arc<dyn ObjectModel>) -> Self {
        Self { context, model }
    }

    pub fn context(&self) -> &Arc<dyn WorldContext> {
        &self.context
    }

    pub fn model(&self) -> &Arc<dyn ObjectModel> {
        &self.model
    }
}
