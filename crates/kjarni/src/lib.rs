//! # Kjarni: Entity Level Core
//!
//! A small game-server core: registered component kinds, entity types
//! composed from them, and levels that own, tick, save, and load entities.
//! An optional server host adds clients, admission, and text commands on top
//! without committing to a transport.
//!
//! Start with `use kjarni::prelude::*`, describe your types with a
//! [`RegistryBuilder`](ecs::RegistryBuilder), and create a
//! [`Level`](level::Level).

pub mod command;
pub mod config;
pub mod ecs;
pub mod error;
pub mod events;
pub mod level;
pub mod math;
pub mod prelude;
pub mod server;
pub mod time;

#[cfg(feature = "diagnostics")]
pub mod diag;

pub use error::{Error, Result};
