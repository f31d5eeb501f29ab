//! # Components
//!
//! A component is one unit of behavior bound to exactly one entity for that
//! entity's whole life. Every hook is optional; the defaults do nothing.
//!
//! ```text
//!   construct ──► setup ──► (load) ──► tick* ──► dispose
//!       │           │          │                     │
//!   factory     mixin fields  picks its own keys   releases state
//! ```
//!
//! A component can contribute three kinds of data:
//!
//! - **mixin** fields, returned from [`Component::setup`] and merged onto the
//!   owning entity's field set,
//! - **data** fields, returned from [`Component::to_json`] and written into the
//!   entity's snapshot,
//! - **config**, read once at construction from the entity type's static
//!   config (see [`ComponentInit::config`]).
//!
//! Component kinds are registered by name in a [`ComponentRegistry`], which
//! hands out a stable [`ComponentId`] per kind. Entities keep a
//! [`ComponentSet`] of those ids so capability checks are a bit test.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::ecs::entity::{EntityCore, EntityPatch};
use crate::error::{Error, Result};

/// Named JSON fields, used for mixins, component data, and type config.
pub type Fields = serde_json::Map<String, Value>;

// ── Component trait ──────────────────────────────────────────────────────

/// Downcasting support for boxed components.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A behavior unit attached to an entity.
///
/// Hooks receive the owning entity's [`EntityCore`]: identity, pose, parent
/// and the merged field set. Hook failures are reported with `anyhow`; the
/// entity wraps them with the component name and lifecycle phase.
pub trait Component: AsAny + Send {
    /// Runs once when the entity is set up. The returned fields are merged
    /// onto the entity, in attachment order, last write wins.
    fn setup(&mut self, _entity: &mut EntityCore) -> anyhow::Result<Fields> {
        Ok(Fields::new())
    }

    /// Receives the full incoming snapshot; each component picks its own keys.
    fn load(&mut self, _entity: &mut EntityCore, _data: &EntityPatch) -> anyhow::Result<()> {
        Ok(())
    }

    /// Per-frame work. Not called by the base entity tick; an entity type
    /// that wants it calls [`Entity::tick_components`](crate::ecs::Entity::tick_components).
    fn tick(&mut self, _entity: &mut EntityCore) -> anyhow::Result<()> {
        Ok(())
    }

    fn dispose(&mut self, _entity: &mut EntityCore) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fields this component contributes to the entity snapshot.
    fn to_json(&self, _entity: &EntityCore) -> Fields {
        Fields::new()
    }

    /// Extra text for the entity's debug printout.
    fn describe(&self) -> Option<String> {
        None
    }
}

/// Borrow a boxed component as a concrete type.
pub fn downcast_ref<T: Component>(component: &dyn Component) -> Option<&T> {
    component.as_any().downcast_ref::<T>()
}

/// Mutable variant of [`downcast_ref`].
pub fn downcast_mut<T: Component>(component: &mut dyn Component) -> Option<&mut T> {
    component.as_any_mut().downcast_mut::<T>()
}

/// A component type that knows its registry name and how to build itself.
pub trait BuildComponent: Component + Sized {
    const NAME: &'static str;

    fn build(init: &ComponentInit<'_>) -> anyhow::Result<Self>;
}

// ── Construction ─────────────────────────────────────────────────────────

/// What a component factory gets to see while an entity is being built.
pub struct ComponentInit<'a> {
    pub entity_id: Uuid,
    pub entity_type: &'a str,
    /// The entity type's static config.
    pub config: &'a Fields,
}

pub type ComponentFactory =
    Arc<dyn Fn(&ComponentInit<'_>) -> anyhow::Result<Box<dyn Component>> + Send + Sync>;

/// Stable per-kind id, assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A registered component kind: its name, id, and factory.
pub struct ComponentKind {
    id: ComponentId,
    name: String,
    factory: ComponentFactory,
}

impl ComponentKind {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn build(&self, init: &ComponentInit<'_>) -> anyhow::Result<Box<dyn Component>> {
        (self.factory)(init)
    }
}

impl fmt::Debug for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentKind")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ── ComponentSet ─────────────────────────────────────────────────────────

/// Bitset of [`ComponentId`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    words: Vec<u64>,
}

impl ComponentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ComponentId) {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        self.words.get(word).is_some_and(|w| w & (1 << bit) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

// ── ComponentRegistry ────────────────────────────────────────────────────

/// Name → component kind, in registration order.
#[derive(Default)]
pub struct ComponentRegistry {
    kinds: Vec<Arc<ComponentKind>>,
    by_name: HashMap<String, ComponentId>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under its [`BuildComponent::NAME`].
    pub fn register<T: BuildComponent>(&mut self) -> Result<ComponentId> {
        self.register_fn(T::NAME, |init| Ok(Box::new(T::build(init)?)))
    }

    /// Register a component kind from a bare factory function.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F) -> Result<ComponentId>
    where
        F: Fn(&ComponentInit<'_>) -> anyhow::Result<Box<dyn Component>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(Error::DuplicateComponent(name));
        }
        let id = ComponentId(self.kinds.len() as u32);
        log::debug!("Registered component: {name}");
        self.by_name.insert(name.clone(), id);
        self.kinds.push(Arc::new(ComponentKind {
            id,
            name,
            factory: Arc::new(factory),
        }));
        Ok(id)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ComponentKind>> {
        let id = self.by_name.get(name)?;
        self.kinds.get(id.index())
    }

    pub fn id_of(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(|k| k.name())
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

// ── CopyData ─────────────────────────────────────────────────────────────

/// Copies a fixed set of fields between an entity and its snapshot.
///
/// Configured through the entity type's `copy_data` key, either a list of
/// field names or a template object whose keys are the tracked fields and
/// whose values are their defaults:
///
/// ```json
/// { "copy_data": ["fuel", "cargo"] }
/// { "copy_data": { "fuel": 100, "cargo": [] } }
/// ```
#[derive(Debug, Clone)]
pub struct CopyData {
    template: Fields,
    keys: Vec<String>,
}

impl CopyData {
    /// Tracked field names. Empty until setup.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl BuildComponent for CopyData {
    const NAME: &'static str = "CopyData";

    fn build(init: &ComponentInit<'_>) -> anyhow::Result<Self> {
        let template = match init.config.get("copy_data") {
            Some(Value::Array(names)) => names
                .iter()
                .map(|name| match name {
                    Value::String(key) => Ok((key.clone(), Value::Null)),
                    other => Err(anyhow::anyhow!("copy_data entries must be strings, got {other}")),
                })
                .collect::<anyhow::Result<Fields>>()?,
            Some(Value::Object(template)) => template.clone(),
            Some(other) => anyhow::bail!("copy_data must be a list or an object, got {other}"),
            None => anyhow::bail!("missing copy_data config"),
        };
        Ok(Self {
            template,
            keys: Vec::new(),
        })
    }
}

impl Component for CopyData {
    fn setup(&mut self, _entity: &mut EntityCore) -> anyhow::Result<Fields> {
        self.keys = self.template.keys().cloned().collect();
        Ok(self.template.clone())
    }

    fn load(&mut self, entity: &mut EntityCore, data: &EntityPatch) -> anyhow::Result<()> {
        for key in &self.keys {
            if let Some(value) = data.extra.get(key) {
                entity.fields.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn to_json(&self, entity: &EntityCore) -> Fields {
        self.keys
            .iter()
            .filter_map(|key| Some((key.clone(), entity.fields.get(key)?.clone())))
            .collect()
    }

    fn describe(&self) -> Option<String> {
        Some(format!("[{}]", self.keys.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> Fields {
        let Value::Object(map) = json!({ "copy_data": value }) else {
            unreachable!()
        };
        map
    }

    fn init(config: &Fields) -> ComponentInit<'_> {
        ComponentInit {
            entity_id: Uuid::new_v4(),
            entity_type: "Probe",
            config,
        }
    }

    #[test]
    fn registry_rejects_duplicates() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<CopyData>().unwrap();
        assert_eq!(id.index(), 0);
        match reg.register::<CopyData>() {
            Err(Error::DuplicateComponent(name)) => assert_eq!(name, "CopyData"),
            other => panic!("expected duplicate error, got {other:?}"),
        }
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["CopyData"]);
    }

    #[test]
    fn ids_follow_registration_order() {
        struct Marker;
        impl Component for Marker {}

        let mut reg = ComponentRegistry::new();
        reg.register::<CopyData>().unwrap();
        let marker = reg.register_fn("Marker", |_| Ok(Box::new(Marker))).unwrap();
        assert_eq!(marker.index(), 1);
        assert_eq!(reg.id_of("Marker"), Some(marker));
        assert_eq!(reg.get("Marker").unwrap().name(), "Marker");
        assert!(reg.get("Nope").is_none());
    }

    #[test]
    fn component_set_bits() {
        let mut set = ComponentSet::new();
        assert!(set.is_empty());
        set.insert(ComponentId(3));
        set.insert(ComponentId(70));
        assert!(set.contains(ComponentId(3)));
        assert!(set.contains(ComponentId(70)));
        assert!(!set.contains(ComponentId(4)));
        assert!(!set.contains(ComponentId(200)));
    }

    #[test]
    fn copy_data_from_list() {
        let cfg = config(json!(["fuel", "cargo"]));
        let mut copy = CopyData::build(&init(&cfg)).unwrap();
        let mut core = EntityCore::new(Uuid::new_v4(), "Probe");
        let mixin = copy.setup(&mut core).unwrap();
        assert_eq!(mixin.get("fuel"), Some(&Value::Null));
        assert_eq!(copy.keys(), ["cargo".to_string(), "fuel".to_string()]);
    }

    #[test]
    fn copy_data_picks_only_tracked_keys() {
        let cfg = config(json!({ "fuel": 100 }));
        let mut copy = CopyData::build(&init(&cfg)).unwrap();
        let mut core = EntityCore::new(Uuid::new_v4(), "Probe");
        let mixin = copy.setup(&mut core).unwrap();
        core.fields.extend(mixin);
        core.fields.insert("scratch".into(), json!(true));

        let out = copy.to_json(&core);
        assert_eq!(out.len(), 1);
        assert_eq!(out.get("fuel"), Some(&json!(100)));

        let mut patch = EntityPatch::default();
        patch.extra.insert("fuel".into(), json!(42));
        patch.extra.insert("other".into(), json!("ignored"));
        copy.load(&mut core, &patch).unwrap();
        assert_eq!(core.fields.get("fuel"), Some(&json!(42)));
        assert!(!core.fields.contains_key("other"));
    }

    #[test]
    fn copy_data_requires_config() {
        let empty = Fields::new();
        assert!(CopyData::build(&init(&empty)).is_err());
        let bad = config(json!(5));
        assert!(CopyData::build(&init(&bad)).is_err());
        let bad_entry = config(json!(["ok", 1]));
        assert!(CopyData::build(&init(&bad_entry)).is_err());
    }
}
