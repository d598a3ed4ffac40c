use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, bail, Result};
use bevy_ecs::prelude::Resource;
use serde::{Deserialize, Serialize};

use crate::reflect::{MethodDescriptor, PropertyDescriptor};
use crate::value::{NativeValue, PropertyKind};

pub const ACTOR_CLASS: &str = "Actor";
pub const SCRIPT_COMPONENT_CLASS: &str = "ScriptComponent";

// (name, kind, writable)
const ACTOR_PROPERTIES: &[(&str, PropertyKind, bool)] = &[
    ("Name", PropertyKind::Text, false),
    ("Location", PropertyKind::Vector, true),
    ("Rotation", PropertyKind::Rotator, true),
    ("Hidden", PropertyKind::Bool, true),
];

// (name, params, returns)
const ACTOR_METHODS: &[(&str, &[PropertyKind], Option<PropertyKind>)] = &[
    ("GetName", &[], Some(PropertyKind::Text)),
    ("GetActorLocation", &[], Some(PropertyKind::Vector)),
    ("SetActorLocation", &[PropertyKind::Vector], None),
    ("AddActorWorldOffset", &[PropertyKind::Vector], None),
    ("Destroy", &[], Some(PropertyKind::Bool)),
];

const COMPONENT_PROPERTIES: &[(&str, PropertyKind, bool)] =
    &[("Owner", PropertyKind::Object, false), ("Enabled", PropertyKind::Bool, true)];

const COMPONENT_METHODS: &[(&str, &[PropertyKind], Option<PropertyKind>)] =
    &[("GetOwner", &[], Some(PropertyKind::Object))];

fn property_from(table: &[(&str, PropertyKind, bool)], name: &str) -> Option<PropertyDescriptor> {
    table.iter().find(|(candidate, _, _)| *candidate == name).map(|(name, kind, writable)| PropertyDescriptor {
        name: name.to_string(),
        kind: *kind,
        writable: *writable,
    })
}

fn method_from(table: &[(&str, &[PropertyKind], Option<PropertyKind>)], name: &str) -> Option<MethodDescriptor> {
    table.iter().find(|(candidate, _, _)| *candidate == name).map(|(name, params, returns)| MethodDescriptor {
        name: name.to_string(),
        params: params.to_vec(),
        returns: *returns,
    })
}

pub fn actor_property(name: &str) -> Option<PropertyDescriptor> {
    property_from(ACTOR_PROPERTIES, name)
}

pub fn actor_method(name: &str) -> Option<MethodDescriptor> {
    method_from(ACTOR_METHODS, name)
}

pub fn component_property(name: &str) -> Option<PropertyDescriptor> {
    property_from(COMPONENT_PROPERTIES, name)
}

pub fn component_method(name: &str) -> Option<MethodDescriptor> {
    method_from(COMPONENT_METHODS, name)
}

fn default_base() -> String {
    ACTOR_CLASS.to_string()
}

fn default_writable() -> bool {
    true
}

/// A user-defined actor class, as written in configs and harness fixtures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    pub name: String,
    #[serde(default = "default_base")]
    pub base: String,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default = "default_writable")]
    pub writable: bool,
}

#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub descriptor: PropertyDescriptor,
    pub default: NativeValue,
}

#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub base: Option<String>,
    pub properties: Vec<PropertySpec>,
}

#[derive(Resource)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassDef>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        let mut classes = HashMap::new();
        classes.insert(
            ACTOR_CLASS.to_string(),
            ClassDef { name: ACTOR_CLASS.to_string(), base: None, properties: Vec::new() },
        );
        Self { classes }
    }
}

impl ClassRegistry {
    pub fn register(&mut self, config: &ClassConfig) -> Result<()> {
        let name = config.name.trim();
        if name.is_empty() {
            bail!("class name must not be empty");
        }
        if name == SCRIPT_COMPONENT_CLASS || self.classes.contains_key(name) {
            bail!("class '{name}' is already registered");
        }
        if !self.classes.contains_key(&config.base) {
            bail!("class '{name}' derives from unknown class '{}'", config.base);
        }
        let mut properties = Vec::with_capacity(config.properties.len());
        for property in &config.properties {
            if actor_property(&property.name).is_some() || self.find_property(&config.base, &property.name).is_some() {
                bail!("class '{name}' redeclares inherited property '{}'", property.name);
            }
            let default = match &property.default {
                Some(json) => NativeValue::from_json(property.kind, json).ok_or_else(|| {
                    anyhow!("default for '{name}.{}' is not a valid {} value", property.name, property.kind)
                })?,
                None => property.kind.default_value(),
            };
            properties.push(PropertySpec {
                descriptor: PropertyDescriptor {
                    name: property.name.clone(),
                    kind: property.kind,
                    writable: property.writable,
                },
                default,
            });
        }
        self.classes.insert(
            name.to_string(),
            ClassDef { name: name.to_string(), base: Some(config.base.clone()), properties },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks `name` up on `class` and then on its ancestors.
    pub fn find_property(&self, class: &str, name: &str) -> Option<&PropertySpec> {
        let mut current = self.classes.get(class);
        while let Some(def) = current {
            if let Some(spec) = def.properties.iter().find(|spec| spec.descriptor.name == name) {
                return Some(spec);
            }
            current = def.base.as_deref().and_then(|base| self.classes.get(base));
        }
        None
    }

    /// Initial property bag for a fresh actor of `class`.
    pub fn defaults_for(&self, class: &str) -> BTreeMap<String, NativeValue> {
        let mut values = BTreeMap::new();
        let mut current = self.classes.get(class);
        while let Some(def) = current {
            for spec in &def.properties {
                values.entry(spec.descriptor.name.clone()).or_insert_with(|| spec.default.clone());
            }
            current = def.base.as_deref().and_then(|base| self.classes.get(base));
        }
        values
    }
}
