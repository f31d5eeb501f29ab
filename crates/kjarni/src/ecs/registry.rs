//! # Entity types and registries
//!
//! Entity types are composed, not inherited: an [`EntityType`] is a
//! descriptor naming an ordered list of component kinds, a static config
//! object those components read at construction, and optional hooks the type
//! runs itself.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kjarni::prelude::*;
//! use serde_json::json;
//!
//! let mut reg = RegistryBuilder::new();
//! reg.register_component::<CopyData>()?;
//! reg.entity_with(EntityWith {
//!     name: "Crate".into(),
//!     components: vec!["CopyData".into()],
//!     config: json!({ "copy_data": ["contents"] }),
//! })?;
//! reg.register_entity(
//!     EntityType::builder("Ship")
//!         .with::<CopyData>()
//!         .config("copy_data", json!({ "fuel": 100 }))
//!         .on_tick(|ship, _ctx| Ok(ship.tick_components()?)),
//! )?;
//! reg.set_loading_order(["Ship", "Crate"]);
//! let registry = reg.build()?;   // Arc<Registry>, frozen
//! ```
//!
//! All registration happens on a [`RegistryBuilder`] owned by the host; once
//! built, the [`Registry`] is immutable and shared by every level.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::ecs::component::{
    BuildComponent, Component, ComponentInit, ComponentKind, ComponentRegistry, ComponentId,
    Fields,
};
use crate::ecs::entity::{Entity, EntityContext};
use crate::error::{Error, Result};

// ── Hooks ────────────────────────────────────────────────────────────────

/// A hook an entity type runs on its own instances.
pub type EntityHook =
    Arc<dyn Fn(&mut Entity, &mut EntityContext<'_>) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone, Default)]
pub struct EntityHooks {
    pub on_setup: Option<EntityHook>,
    pub on_tick: Option<EntityHook>,
    pub on_dispose: Option<EntityHook>,
}

// ── EntityType ───────────────────────────────────────────────────────────

/// A composed entity type: name, component kinds, config, hooks.
pub struct EntityType {
    name: String,
    components: Vec<Arc<ComponentKind>>,
    config: Fields,
    hooks: EntityHooks,
}

impl EntityType {
    pub fn builder(name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            components: Vec::new(),
            config: Fields::new(),
            hooks: EntityHooks::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[Arc<ComponentKind>] {
        &self.components
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|k| k.name())
    }

    pub fn has_component(&self, id: ComponentId) -> bool {
        self.components.iter().any(|k| k.id() == id)
    }

    pub fn config(&self) -> &Fields {
        &self.config
    }

    pub fn hooks(&self) -> &EntityHooks {
        &self.hooks
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("name", &self.name)
            .field("components", &self.component_names().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`EntityType`]. Component names are resolved when the
/// builder is registered.
pub struct EntityTypeBuilder {
    name: String,
    components: Vec<String>,
    config: Fields,
    hooks: EntityHooks,
}

impl EntityTypeBuilder {
    /// Attach a component kind by registered name.
    pub fn component(mut self, name: impl Into<String>) -> Self {
        self.components.push(name.into());
        self
    }

    /// Attach a component kind by type.
    pub fn with<T: BuildComponent>(self) -> Self {
        self.component(T::NAME)
    }

    /// Set one static config key.
    pub fn config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    /// Merge a whole config object. Non-object values are ignored.
    pub fn config_object(mut self, config: Value) -> Self {
        if let Value::Object(map) = config {
            self.config.extend(map);
        } else {
            log::warn!("config for {} is not an object; ignored", self.name);
        }
        self
    }

    pub fn on_setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Entity, &mut EntityContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.on_setup = Some(Arc::new(hook));
        self
    }

    pub fn on_tick<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Entity, &mut EntityContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.on_tick = Some(Arc::new(hook));
        self
    }

    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Entity, &mut EntityContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.on_dispose = Some(Arc::new(hook));
        self
    }

    fn resolve(self, components: &ComponentRegistry) -> Result<EntityType> {
        let kinds = self
            .components
            .iter()
            .map(|name| {
                components
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::UnknownComponent(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(EntityType {
            name: self.name,
            components: kinds,
            config: self.config,
            hooks: self.hooks,
        })
    }
}

/// Declarative form of an entity type: name, components, config.
#[derive(Debug, Clone)]
pub struct EntityWith {
    pub name: String,
    pub components: Vec<String>,
    pub config: Value,
}

impl From<EntityWith> for EntityTypeBuilder {
    fn from(opt: EntityWith) -> Self {
        opt.components
            .into_iter()
            .fold(EntityType::builder(opt.name), EntityTypeBuilder::component)
            .config_object(opt.config)
    }
}

// ── EntityRegistry ───────────────────────────────────────────────────────

/// Name → entity type, in registration order.
#[derive(Default)]
pub struct EntityRegistry {
    types: Vec<Arc<EntityType>>,
    by_name: HashMap<String, usize>,
}

impl EntityRegistry {
    pub fn register(&mut self, ty: EntityType) -> Result<Arc<EntityType>> {
        if self.by_name.contains_key(&ty.name) {
            return Err(Error::DuplicateEntityType(ty.name));
        }
        log::debug!("Registered entity type: {}", ty.name);
        let ty = Arc::new(ty);
        self.by_name.insert(ty.name.clone(), self.types.len());
        self.types.push(Arc::clone(&ty));
        Ok(ty)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EntityType>> {
        self.types.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Frozen registries shared by every level: component kinds, entity types,
/// and the loading order.
pub struct Registry {
    components: ComponentRegistry,
    entities: EntityRegistry,
    loading_order: Vec<String>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Entity types in dependency order: referenced types come first.
    pub fn loading_order(&self) -> &[String] {
        &self.loading_order
    }

    /// Position of a type in the loading order.
    pub fn loading_index(&self, type_name: &str) -> Option<usize> {
        self.loading_order.iter().position(|t| t == type_name)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.components.names().collect::<Vec<_>>())
            .field("entities", &self.entities.names().collect::<Vec<_>>())
            .field("loading_order", &self.loading_order)
            .finish()
    }
}

/// Mutable registration phase. Consumed by [`RegistryBuilder::build`].
#[derive(Default)]
pub struct RegistryBuilder {
    components: ComponentRegistry,
    entities: EntityRegistry,
    loading_order: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_component<T: BuildComponent>(&mut self) -> Result<ComponentId> {
        self.components.register::<T>()
    }

    pub fn register_component_fn<F>(&mut self, name: impl Into<String>, factory: F) -> Result<ComponentId>
    where
        F: Fn(&ComponentInit<'_>) -> anyhow::Result<Box<dyn Component>> + Send + Sync + 'static,
    {
        self.components.register_fn(name, factory)
    }

    /// Resolve a type's component names and register it.
    pub fn register_entity(&mut self, ty: impl Into<EntityTypeBuilder>) -> Result<Arc<EntityType>> {
        let ty = ty.into().resolve(&self.components)?;
        self.entities.register(ty)
    }

    /// Build and register a type from its declarative form.
    pub fn entity_with(&mut self, opt: EntityWith) -> Result<Arc<EntityType>> {
        self.register_entity(opt)
    }

    /// Build and register a config-less type from a list of component names.
    pub fn entity_with_components<I, S>(&mut self, name: &str, components: I) -> Result<Arc<EntityType>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let builder = components
            .into_iter()
            .fold(EntityType::builder(name), EntityTypeBuilder::component);
        self.register_entity(builder)
    }

    /// Persistable entity types, referenced types first. Checked by
    /// [`build`](Self::build).
    pub fn set_loading_order<I, S>(&mut self, order: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.loading_order = order.into_iter().map(Into::into).collect();
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Freeze. Fails if the loading order names an unregistered type.
    pub fn build(self) -> Result<Arc<Registry>> {
        if let Some(missing) = self
            .loading_order
            .iter()
            .find(|name| !self.entities.contains(name))
        {
            return Err(Error::UnknownEntityType(missing.clone()));
        }
        Ok(Arc::new(Registry {
            components: self.components,
            entities: self.entities,
            loading_order: self.loading_order,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::CopyData;
    use serde_json::json;

    fn builder() -> RegistryBuilder {
        let mut reg = RegistryBuilder::new();
        reg.register_component::<CopyData>().unwrap();
        reg
    }

    #[test]
    fn duplicate_entity_type_is_rejected() {
        let mut reg = builder();
        reg.entity_with_components("Rock", Vec::<String>::new()).unwrap();
        match reg.entity_with_components("Rock", ["CopyData"]) {
            Err(Error::DuplicateEntityType(name)) => assert_eq!(name, "Rock"),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_component_is_rejected() {
        let mut reg = builder();
        let err = reg
            .register_entity(EntityType::builder("Ghost").component("Phantom"))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownComponent(name) if name == "Phantom"));
        assert!(reg.entities().is_empty());
    }

    #[test]
    fn entity_with_keeps_declaration_order_and_config() {
        let mut reg = builder();
        reg.register_component_fn("Hull", |_| {
            struct Hull;
            impl Component for Hull {}
            Ok(Box::new(Hull))
        })
        .unwrap();
        let ty = reg
            .entity_with(EntityWith {
                name: "Ship".into(),
                components: vec!["Hull".into(), "CopyData".into()],
                config: json!({ "copy_data": ["fuel"] }),
            })
            .unwrap();
        assert_eq!(ty.component_names().collect::<Vec<_>>(), vec!["Hull", "CopyData"]);
        assert_eq!(ty.config()["copy_data"], json!(["fuel"]));
        let copy_id = reg.components().id_of("CopyData").unwrap();
        assert!(ty.has_component(copy_id));
    }

    #[test]
    fn loading_order_must_name_registered_types() {
        let mut reg = builder();
        reg.entity_with_components("Station", ["CopyData"]).unwrap();
        reg.set_loading_order(["Station", "Ship"]);
        assert!(matches!(reg.build(), Err(Error::UnknownEntityType(name)) if name == "Ship"));

        let mut reg = builder();
        reg.entity_with_components("Station", ["CopyData"]).unwrap();
        reg.entity_with_components("Ship", ["CopyData"]).unwrap();
        reg.set_loading_order(["Station", "Ship"]);
        let registry = reg.build().unwrap();
        assert_eq!(registry.loading_index("Ship"), Some(1));
        assert_eq!(registry.loading_index("Probe"), None);
    }
}
