//! In-process host world: actors and script components stored in a bevy_ecs `World`, exposed to
//! the bridge through [`ObjectModel`] and [`WorldContext`].

pub mod classes;
pub mod types;

pub use classes::{ClassConfig, ClassRegistry, PropertyConfig, ACTOR_CLASS, SCRIPT_COMPONENT_CLASS};
pub use types::ActorSummary;

use std::sync::Arc;

use anyhow::Result;
use bevy_ecs::prelude::{Entity, World};
use glam::Vec3;
use parking_lot::Mutex;

use crate::error::BridgeError;
use crate::events::{EventBus, WorldEvent};
use crate::reflect::{
    MessageLevel, MethodDescriptor, ObjectId, ObjectModel, PropertyDescriptor, WorldBinding, WorldContext,
};
use crate::time::FrameClock;
use crate::value::{NativeValue, Rotator};
use types::{ActorClass, ActorFlags, ActorName, ActorSerial, Placement, PropertyBag, ScriptComponent};

/// The world is guarded by its own mutex. Nothing in here calls back into Lua, so script
/// callbacks can take the lock freely.
pub struct HostWorld {
    world: Mutex<World>,
}

impl Default for HostWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl HostWorld {
    pub fn new() -> Self {
        let mut world = World::new();
        world.insert_resource(ClassRegistry::default());
        world.insert_resource(FrameClock::default());
        world.insert_resource(EventBus::default());
        world.insert_resource(ActorSerial::default());
        Self { world: Mutex::new(world) }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn binding(self: &Arc<Self>) -> WorldBinding {
        WorldBinding::new(self.clone())
    }

    pub fn register_class(&self, config: &ClassConfig) -> Result<()> {
        self.world.lock().resource_mut::<ClassRegistry>().register(config)
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.world.lock().resource::<ClassRegistry>().contains(name)
    }

    /// Spawns an actor of `class`. Unnamed actors are called `Class_N`. Returns `None` for
    /// unknown classes.
    pub fn spawn_actor_named(
        &self,
        class: &str,
        name: Option<&str>,
        location: Vec3,
        rotation: Rotator,
    ) -> Option<ObjectId> {
        let mut world = self.world.lock();
        let defaults = {
            let registry = world.resource::<ClassRegistry>();
            if !registry.contains(class) {
                return None;
            }
            registry.defaults_for(class)
        };
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let mut serial = world.resource_mut::<ActorSerial>();
                serial.0 += 1;
                format!("{class}_{}", serial.0)
            }
        };
        let entity = world
            .spawn((
                ActorName(name.clone()),
                ActorClass(class.to_string()),
                Placement { location, rotation },
                ActorFlags::default(),
                PropertyBag(defaults),
            ))
            .id();
        let actor = ObjectId::from_entity(entity);
        world.resource_mut::<EventBus>().push(WorldEvent::ActorSpawned {
            actor,
            class: class.to_string(),
            name,
        });
        Some(actor)
    }

    /// Attaches an enabled script component to a live actor.
    pub fn attach_script_component(&self, owner: ObjectId) -> Option<ObjectId> {
        let mut world = self.world.lock();
        world.get::<ActorClass>(owner.entity())?;
        let entity = world.spawn(ScriptComponent { owner: owner.entity(), enabled: true }).id();
        Some(ObjectId::from_entity(entity))
    }

    pub fn set_component_enabled(&self, component: ObjectId, enabled: bool) -> bool {
        let mut world = self.world.lock();
        match world.get_mut::<ScriptComponent>(component.entity()) {
            Some(mut script) => {
                script.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn advance(&self, dt: f32) {
        self.world.lock().resource_mut::<FrameClock>().advance(dt);
    }

    pub fn clock(&self) -> FrameClock {
        *self.world.lock().resource::<FrameClock>()
    }

    pub fn drain_events(&self) -> Vec<WorldEvent> {
        self.world.lock().resource_mut::<EventBus>().drain()
    }

    pub fn actor_name(&self, actor: ObjectId) -> Option<String> {
        self.world.lock().get::<ActorName>(actor.entity()).map(|name| name.0.clone())
    }

    pub fn actor_count(&self) -> usize {
        let mut world = self.world.lock();
        let mut query = world.query::<&ActorClass>();
        let count = query.iter(&world).count();
        count
    }

    /// Snapshot of every live actor, sorted by name.
    pub fn actor_summaries(&self) -> Vec<ActorSummary> {
        let mut world = self.world.lock();
        let mut components = std::collections::HashMap::<Entity, usize>::new();
        let mut component_query = world.query::<&ScriptComponent>();
        for script in component_query.iter(&world) {
            *components.entry(script.owner).or_default() += 1;
        }
        let mut query =
            world.query::<(Entity, &ActorName, &ActorClass, &Placement, &ActorFlags, &PropertyBag)>();
        let mut out: Vec<ActorSummary> = query
            .iter(&world)
            .map(|(entity, name, class, placement, flags, bag)| ActorSummary {
                id: ObjectId::from_entity(entity).to_string(),
                name: name.0.clone(),
                class: class.0.clone(),
                location: placement.location.to_array(),
                rotation: placement.rotation.to_array(),
                hidden: flags.hidden,
                properties: bag.0.iter().map(|(key, value)| (key.clone(), value.to_json())).collect(),
                script_components: components.get(&entity).copied().unwrap_or(0),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }

    fn find_actor_in(world: &mut World, name: &str) -> Option<ObjectId> {
        let mut query = world.query::<(Entity, &ActorName)>();
        let found = query.iter(world).find(|(_, actor_name)| actor_name.0 == name).map(|(entity, _)| entity);
        found.map(ObjectId::from_entity)
    }

    fn destroy_actor_in(world: &mut World, actor: ObjectId) -> bool {
        let entity = actor.entity();
        let Some(name) = world.get::<ActorName>(entity).map(|name| name.0.clone()) else {
            return false;
        };
        let mut query = world.query::<(Entity, &ScriptComponent)>();
        let attached: Vec<Entity> =
            query.iter(world).filter(|(_, script)| script.owner == entity).map(|(component, _)| component).collect();
        for component in attached {
            world.despawn(component);
        }
        world.despawn(entity);
        world.resource_mut::<EventBus>().push(WorldEvent::ActorDestroyed { actor, name });
        true
    }
}

impl ObjectModel for HostWorld {
    fn is_alive(&self, object: ObjectId) -> bool {
        let world = self.world.lock();
        world.get::<ActorClass>(object.entity()).is_some() || world.get::<ScriptComponent>(object.entity()).is_some()
    }

    fn class_name(&self, object: ObjectId) -> Option<String> {
        let world = self.world.lock();
        if let Some(class) = world.get::<ActorClass>(object.entity()) {
            return Some(class.0.clone());
        }
        world.get::<ScriptComponent>(object.entity()).map(|_| SCRIPT_COMPONENT_CLASS.to_string())
    }

    fn find_property(&self, object: ObjectId, name: &str) -> Option<PropertyDescriptor> {
        let world = self.world.lock();
        if world.get::<ScriptComponent>(object.entity()).is_some() {
            return classes::component_property(name);
        }
        let class = world.get::<ActorClass>(object.entity())?;
        classes::actor_property(name).or_else(|| {
            world.resource::<ClassRegistry>().find_property(&class.0, name).map(|spec| spec.descriptor.clone())
        })
    }

    fn read_property(&self, object: ObjectId, name: &str) -> Option<NativeValue> {
        let world = self.world.lock();
        let entity = object.entity();
        if let Some(script) = world.get::<ScriptComponent>(entity) {
            return match name {
                "Owner" => Some(NativeValue::Object(Some(ObjectId::from_entity(script.owner)))),
                "Enabled" => Some(NativeValue::Bool(script.enabled)),
                _ => None,
            };
        }
        match name {
            "Name" => world.get::<ActorName>(entity).map(|name| NativeValue::Text(name.0.clone())),
            "Location" => world.get::<Placement>(entity).map(|placement| NativeValue::Vector(placement.location)),
            "Rotation" => world.get::<Placement>(entity).map(|placement| NativeValue::Rotator(placement.rotation)),
            "Hidden" => world.get::<ActorFlags>(entity).map(|flags| NativeValue::Bool(flags.hidden)),
            _ => world.get::<PropertyBag>(entity).and_then(|bag| bag.0.get(name).cloned()),
        }
    }

    fn write_property(&self, object: ObjectId, name: &str, value: NativeValue) -> Result<(), BridgeError> {
        let mut world = self.world.lock();
        let entity = object.entity();
        let unknown = || BridgeError::UnknownProperty { name: name.to_string() };
        if let Some(mut script) = world.get_mut::<ScriptComponent>(entity) {
            return match (name, value) {
                ("Enabled", NativeValue::Bool(enabled)) => {
                    script.enabled = enabled;
                    Ok(())
                }
                _ => Err(unknown()),
            };
        }
        match (name, value) {
            ("Location", NativeValue::Vector(location)) => {
                let mut placement = world.get_mut::<Placement>(entity).ok_or_else(unknown)?;
                placement.location = location;
            }
            ("Rotation", NativeValue::Rotator(rotation)) => {
                let mut placement = world.get_mut::<Placement>(entity).ok_or_else(unknown)?;
                placement.rotation = rotation;
            }
            ("Hidden", NativeValue::Bool(hidden)) => {
                let mut flags = world.get_mut::<ActorFlags>(entity).ok_or_else(unknown)?;
                flags.hidden = hidden;
            }
            (_, value) => {
                let mut bag = world.get_mut::<PropertyBag>(entity).ok_or_else(unknown)?;
                bag.0.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    fn find_method(&self, object: ObjectId, name: &str) -> Option<MethodDescriptor> {
        let world = self.world.lock();
        if world.get::<ScriptComponent>(object.entity()).is_some() {
            return classes::component_method(name);
        }
        world.get::<ActorClass>(object.entity())?;
        classes::actor_method(name)
    }

    fn invoke_method(
        &self,
        object: ObjectId,
        name: &str,
        args: Vec<NativeValue>,
    ) -> Result<Option<NativeValue>, BridgeError> {
        let mut world = self.world.lock();
        let entity = object.entity();
        let offset = args.first().and_then(NativeValue::as_vector).unwrap_or(Vec3::ZERO);
        let unknown = || BridgeError::UnknownMethod { name: name.to_string() };
        match name {
            "GetOwner" => {
                let script = world.get::<ScriptComponent>(entity).ok_or_else(unknown)?;
                Ok(Some(NativeValue::Object(Some(ObjectId::from_entity(script.owner)))))
            }
            "GetName" => {
                let actor_name = world.get::<ActorName>(entity).ok_or_else(unknown)?;
                Ok(Some(NativeValue::Text(actor_name.0.clone())))
            }
            "GetActorLocation" => {
                let placement = world.get::<Placement>(entity).ok_or_else(unknown)?;
                Ok(Some(NativeValue::Vector(placement.location)))
            }
            "SetActorLocation" => {
                let mut placement = world.get_mut::<Placement>(entity).ok_or_else(unknown)?;
                placement.location = offset;
                Ok(None)
            }
            "AddActorWorldOffset" => {
                let mut placement = world.get_mut::<Placement>(entity).ok_or_else(unknown)?;
                placement.location += offset;
                Ok(None)
            }
            "Destroy" => Ok(Some(NativeValue::Bool(Self::destroy_actor_in(&mut world, object)))),
            _ => Err(unknown()),
        }
    }
}

impl WorldContext for HostWorld {
    fn delta_seconds(&self) -> f32 {
        self.world.lock().resource::<FrameClock>().delta_seconds()
    }

    fn find_actor(&self, name: &str) -> Option<ObjectId> {
        Self::find_actor_in(&mut self.world.lock(), name)
    }

    fn spawn_actor(&self, class: &str, location: Vec3, rotation: Rotator) -> Option<ObjectId> {
        self.spawn_actor_named(class, None, location, rotation)
    }

    fn destroy_actor(&self, actor: ObjectId) -> bool {
        Self::destroy_actor_in(&mut self.world.lock(), actor)
    }

    fn debug_message(&self, level: MessageLevel, text: &str) {
        self.world.lock().resource_mut::<EventBus>().push(WorldEvent::DebugMessage { level, text: text.to_string() });
    }
}
