use bevy_ecs::prelude::Resource;
use serde::Serialize;
use std::fmt;

use crate::reflect::{MessageLevel, ObjectId};

#[derive(Debug, Clone, PartialEq)]
pub enum WorldEvent {
    ActorSpawned { actor: ObjectId, class: String, name: String },
    ActorDestroyed { actor: ObjectId, name: String },
    DebugMessage { level: MessageLevel, text: String },
}

impl WorldEvent {
    pub fn is_message(&self) -> bool {
        matches!(self, WorldEvent::DebugMessage { .. })
    }
}

impl fmt::Display for WorldEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorldEvent::ActorSpawned { actor, class, name } => {
                write!(f, "ActorSpawned actor={actor} class={class} name={name}")
            }
            WorldEvent::ActorDestroyed { actor, name } => write!(f, "ActorDestroyed actor={actor} name={name}"),
            WorldEvent::DebugMessage { level, text } => write!(f, "DebugMessage [{level}] {text}"),
        }
    }
}

impl Serialize for WorldEvent {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Default, Resource)]
pub struct EventBus {
    events: Vec<WorldEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<WorldEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
