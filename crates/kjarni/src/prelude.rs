//! Common imports for kjarni users.
//!
//! ```ignore
//! use kjarni::prelude::*;
//! ```

pub use crate::command::{Command, CommandRegistry, ExecutionContext};
pub use crate::config::{AccessLists, ServerConfig};
pub use crate::ecs::{
    BuildComponent, Component, ComponentInit, CopyData, Entity, EntityContext, EntityCore,
    EntityJson, EntityPatch, EntityType, EntityWith, Fields, Lifecycle, Registry, RegistryBuilder,
    Selector,
};
pub use crate::error::{Error, Phase, Result};
pub use crate::events::{EventBus, LevelEvent};
pub use crate::level::{Level, LevelJson};
pub use crate::math::Vec3;
pub use crate::server::{Account, Incoming, Outgoing, Server, Ticker};
