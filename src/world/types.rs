use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::value::{NativeValue, Rotator};

#[derive(Component, Clone)]
pub struct ActorName(pub String);

#[derive(Component, Clone)]
pub struct ActorClass(pub String);

#[derive(Component, Clone, Copy, Default)]
pub struct Placement {
    pub location: Vec3,
    pub rotation: Rotator,
}

#[derive(Component, Clone, Copy, Default)]
pub struct ActorFlags {
    pub hidden: bool,
}

/// Values of the properties a user class declares on top of the built-in actor ones.
#[derive(Component, Clone, Default)]
pub struct PropertyBag(pub BTreeMap<String, NativeValue>);

/// A script-hosting component attached to an actor.
#[derive(Component, Clone, Copy)]
pub struct ScriptComponent {
    pub owner: Entity,
    pub enabled: bool,
}

/// Counter behind generated `Class_N` actor names.
#[derive(Resource, Default)]
pub struct ActorSerial(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorSummary {
    pub id: String,
    pub name: String,
    pub class: String,
    pub location: [f32; 3],
    pub rotation: [f32; 3],
    pub hidden: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    pub script_components: usize,
}
