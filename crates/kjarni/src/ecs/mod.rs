//! # Entities and Components
//!
//! Entities are built from a registered [`EntityType`](registry::EntityType):
//! a name, an ordered list of component kinds, and a config object the
//! component factories read from. Components attach at construction and
//! never change afterwards.
//!
//! ## Module Overview
//!
//! - [`component`]: The `Component` trait, factories, and the component registry
//! - [`entity`]: Entity state, lifecycle, and its JSON form
//! - [`registry`]: Entity types and the frozen `Registry`
//! - [`selector`]: `*`, `@name`, `#id`, and type-name selectors

pub mod component;
pub mod entity;
pub mod registry;
pub mod selector;

pub use component::{BuildComponent, Component, ComponentId, ComponentInit, CopyData, Fields};
pub use entity::{Entity, EntityContext, EntityCore, EntityJson, EntityPatch, Lifecycle};
pub use registry::{EntityType, EntityWith, Registry, RegistryBuilder};
pub use selector::Selector;
