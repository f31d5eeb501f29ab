//! # Levels
//!
//! A [`Level`] is the sole owner of its entities. Joining happens through
//! [`Level::spawn`], leaving through [`Level::dispose_entity`]; an entity that
//! is not in the level's set is, by definition, gone.
//!
//! ## Quick Start
//!
//! ```ignore
//! use kjarni::prelude::*;
//!
//! let mut level = Level::new(registry.clone());
//! let ship = level.spawn_ready("Ship")?;
//! level.tick()?;
//!
//! // Save, then restore into a fresh level.
//! let json = level.to_json();
//! let restored = Level::from_json(registry, json)?;
//! assert!(restored.get_entity_by_id(ship).is_ok());
//! ```
//!
//! ## Tick pass
//!
//! ```text
//!   sample timing ─► emit `tick` ─► snapshot ids ─► for each id:
//!                                                  ├─ gone or not ready? skip
//!                                                  ├─ entity.tick(ctx)
//!                                                  └─ apply queued disposals
//! ```
//!
//! Entities spawned during a pass wait for the next one. A failing entity
//! aborts the rest of the pass; earlier entities keep their results.
//!
//! ## Snapshots
//!
//! [`Level::to_json`] sorts entities by their index in the *reversed* loading
//! order. [`Level::load`] sorts ascending by loading order before building
//! anything, so parents always exist by the time their children resolve
//! them. Records whose type is not in the loading order are skipped.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ecs::entity::{Entity, EntityContext, EntityJson, EntityPatch, Lifecycle};
use crate::ecs::registry::Registry;
use crate::ecs::selector::{self, FilterEntities};
use crate::error::{Error, Result};
use crate::events::{EventBus, LevelEvent};
use crate::math::Vec3;
use crate::time::TickMonitor;

// ── Level JSON (wire format) ─────────────────────────────────────────────

/// A serialized level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelJson {
    pub date: DateTime<Utc>,
    pub difficulty: f64,
    pub name: String,
    pub id: Uuid,
    #[serde(default)]
    pub entities: Vec<EntityJson>,
}

// ── Level ────────────────────────────────────────────────────────────────

pub struct Level {
    pub id: Uuid,
    pub name: String,
    pub difficulty: f64,
    pub date: DateTime<Utc>,
    entities: Vec<Entity>,
    events: EventBus,
    monitor: TickMonitor,
    registry: Arc<Registry>,
}

impl Level {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: String::new(),
            difficulty: 1.0,
            date: Utc::now(),
            entities: Vec::new(),
            events: EventBus::new(),
            monitor: TickMonitor::default(),
            registry,
        }
    }

    /// Build a fresh level and load a snapshot into it.
    pub fn from_json(registry: Arc<Registry>, json: LevelJson) -> Result<Self> {
        let mut level = Self::new(registry);
        level.load(json)?;
        Ok(level)
    }

    pub fn load_from_file(registry: Arc<Registry>, path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let json: LevelJson = serde_json::from_str(&text)?;
        Self::from_json(registry, json)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// Emit an event on behalf of the host (deaths, path starts, ...).
    pub fn emit(&mut self, event: LevelEvent) {
        self.events.emit(&event);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index_of(id).is_some()
    }

    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.entities.iter().position(|e| e.id() == id)
    }

    pub fn get_entity_by_id(&self, id: Uuid) -> Result<&Entity> {
        self.entities
            .iter()
            .find(|e| e.id() == id)
            .ok_or(Error::EntityNotFound(id))
    }

    pub fn get_entity_by_id_mut(&mut self, id: Uuid) -> Result<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|e| e.id() == id)
            .ok_or(Error::EntityNotFound(id))
    }

    /// Lazily filter live entities by selector.
    pub fn select_entities(&self, selector: &str) -> Result<FilterEntities<std::slice::Iter<'_, Entity>>> {
        selector::filter_entities(&self.entities, selector)
    }

    /// First entity matching the selector, if any.
    pub fn entity(&self, selector: &str) -> Result<Option<&Entity>> {
        Ok(self.select_entities(selector)?.next())
    }

    /// Live entity count per type name.
    pub fn count_by_type(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entity in &self.entities {
            *counts.entry(entity.type_name()).or_insert(0) += 1;
        }
        counts
    }

    /// Position summed along the parent chain. A parent that no longer
    /// exists ends the chain.
    pub fn absolute_position(&self, id: Uuid) -> Result<Vec3> {
        self.sum_along_parents(id, |e| e.core().position)
    }

    /// Rotation summed along the parent chain.
    pub fn absolute_rotation(&self, id: Uuid) -> Result<Vec3> {
        self.sum_along_parents(id, |e| e.core().rotation)
    }

    fn sum_along_parents(&self, id: Uuid, value: impl Fn(&Entity) -> Vec3) -> Result<Vec3> {
        let mut entity = self.get_entity_by_id(id)?;
        let mut total = value(entity);
        // More steps than entities means the chain loops.
        for _ in 0..self.entities.len() {
            let Some(parent) = entity.core().parent.and_then(|p| self.get_entity_by_id(p).ok()) else {
                return Ok(total);
            };
            entity = parent;
            total += value(entity);
        }
        Err(Error::ParentCycle(id))
    }

    /// Reparent an entity. `None` makes it a root.
    pub fn set_parent(&mut self, id: Uuid, parent: Option<Uuid>) -> Result<()> {
        if let Some(parent) = parent {
            self.check_parent(id, parent)?;
        }
        self.get_entity_by_id_mut(id)?.core_mut().parent = parent;
        Ok(())
    }

    /// The parent must exist, and must not be `id` or one of its descendants.
    fn check_parent(&self, id: Uuid, parent: Uuid) -> Result<()> {
        if parent == id {
            return Err(Error::ParentCycle(id));
        }
        let mut ancestor = self
            .get_entity_by_id(parent)
            .map_err(|_| Error::ParentNotFound { entity: id, parent })?;
        for _ in 0..self.entities.len() {
            let Some(next) = ancestor.core().parent else {
                return Ok(());
            };
            if next == id {
                return Err(Error::ParentCycle(id));
            }
            // A dangling ancestor ends the chain.
            let Ok(entity) = self.get_entity_by_id(next) else {
                return Ok(());
            };
            ancestor = entity;
        }
        Err(Error::ParentCycle(parent))
    }

    // ── Timing ───────────────────────────────────────────────────────

    /// Measured ticks per second.
    pub fn tps(&self) -> f32 {
        self.monitor.tps()
    }

    pub fn tick_count(&self) -> u64 {
        self.monitor.tick_count()
    }

    pub fn monitor(&self) -> &TickMonitor {
        &self.monitor
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Construct an entity of a registered type and add it to the level.
    ///
    /// The entity starts in [`Lifecycle::Constructed`]; call
    /// [`setup_entity`](Self::setup_entity) (or use [`spawn_ready`](Self::spawn_ready)).
    pub fn spawn(&mut self, type_name: &str, id: Option<Uuid>) -> Result<Uuid> {
        let ty = self
            .registry
            .entities()
            .get(type_name)
            .ok_or_else(|| Error::UnknownEntityType(type_name.to_string()))?;
        let id = id.filter(|id| !id.is_nil()).unwrap_or_else(Uuid::new_v4);
        if self.contains(id) {
            return Err(Error::DuplicateEntityId(id));
        }
        let entity = Entity::instantiate(ty, id)?;
        self.entities.push(entity);
        Ok(id)
    }

    /// Spawn and set up in one step. A failed setup retires the entity
    /// again through its dispose hooks.
    pub fn spawn_ready(&mut self, type_name: &str) -> Result<Uuid> {
        let id = self.spawn(type_name, None)?;
        if let Err(err) = self.setup_entity(id) {
            let announced = self
                .get_entity_by_id(id)
                .is_ok_and(|e| e.state() == Lifecycle::Ready);
            if !announced {
                self.retire(id);
            }
            return Err(err);
        }
        Ok(id)
    }

    /// Run setup for a constructed entity and announce it with `entity_added`.
    pub fn setup_entity(&mut self, id: Uuid) -> Result<()> {
        let index = self.index_of(id).ok_or(Error::EntityNotFound(id))?;
        let mut disposals = Vec::new();
        let result = {
            let mut ctx = EntityContext::new(&mut self.events, &mut disposals);
            self.entities[index].setup(&mut ctx)
        };
        if result.is_ok() {
            let snapshot = self.entities[index].to_json();
            self.events.emit(&LevelEvent::EntityAdded(snapshot));
        }
        let drained = self.apply_disposals(disposals);
        result.and(drained)
    }

    /// Apply a partial snapshot to an entity. A `parent` in the data must
    /// name an entity already in this level.
    pub fn load_entity(&mut self, id: Uuid, data: &EntityPatch) -> Result<()> {
        let index = self.index_of(id).ok_or(Error::EntityNotFound(id))?;
        if let Some(other) = data.id.filter(|other| *other != id) {
            log::warn!("Ignoring id {other} while loading entity {id}");
        }
        if let Some(parent) = data.parent {
            self.check_parent(id, parent)?;
        }
        self.entities[index].load(data)
    }

    /// Advance every ready entity by one tick.
    pub fn tick(&mut self) -> Result<()> {
        self.monitor.sample();
        self.events.emit(&LevelEvent::Tick);

        let ids: Vec<Uuid> = self.entities.iter().map(Entity::id).collect();
        for id in ids {
            let Some(index) = self.index_of(id) else {
                continue;
            };
            if self.entities[index].state() != Lifecycle::Ready {
                continue;
            }
            let mut disposals = Vec::new();
            let result = {
                let mut ctx = EntityContext::new(&mut self.events, &mut disposals);
                self.entities[index].tick(&mut ctx)
            };
            let drained = self.apply_disposals(disposals);
            if let Err(err) = result.and(drained) {
                log::error!("{err}");
                return Err(err);
            }
        }
        Ok(())
    }

    /// Dispose an entity: hooks, removal, then `entity_removed` with the
    /// final snapshot. Returns `false` if the entity is already gone.
    pub fn dispose_entity(&mut self, id: Uuid) -> Result<bool> {
        let mut queue = VecDeque::new();
        let result = self.dispose_one(id, &mut queue);
        let drained = self.drain_disposals(queue);
        let removed = result?;
        drained?;
        Ok(removed)
    }

    /// Dispose every entity, e.g. on shutdown. Every entity is attempted;
    /// the first failure is returned.
    pub fn dispose_all(&mut self) -> Result<()> {
        let ids: Vec<Uuid> = self.entities.iter().map(Entity::id).collect();
        let mut first_err = None;
        for id in ids {
            if let Err(err) = self.dispose_entity(id) {
                log::error!("{err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn dispose_one(&mut self, id: Uuid, queue: &mut VecDeque<Uuid>) -> Result<bool> {
        let Some(index) = self.index_of(id) else {
            return Ok(false);
        };
        if matches!(
            self.entities[index].state(),
            Lifecycle::Disposing | Lifecycle::Disposed
        ) {
            return Ok(false);
        }
        let mut requested = Vec::new();
        let result = {
            let mut ctx = EntityContext::new(&mut self.events, &mut requested);
            self.entities[index].dispose(&mut ctx)
        };
        queue.extend(requested);
        result?;

        let mut entity = self.entities.remove(index);
        entity.mark_disposed();
        self.events.emit(&LevelEvent::EntityRemoved(entity.to_json()));
        Ok(true)
    }

    fn apply_disposals(&mut self, requested: Vec<Uuid>) -> Result<()> {
        self.drain_disposals(requested.into())
    }

    /// Dispose everything queued, including disposals the hooks queue on
    /// the way. Every id is attempted; the first failure is returned.
    fn drain_disposals(&mut self, mut queue: VecDeque<Uuid>) -> Result<()> {
        let mut first_err = None;
        while let Some(id) = queue.pop_front() {
            if let Err(err) = self.dispose_one(id, &mut queue) {
                log::error!("{err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Take back an entity that was never announced. Dispose hooks run, but
    /// no `entity_removed` follows, and the entity goes even if a hook fails.
    fn retire(&mut self, id: Uuid) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let mut requested = Vec::new();
        let result = {
            let mut ctx = EntityContext::new(&mut self.events, &mut requested);
            self.entities[index].dispose(&mut ctx)
        };
        if let Err(err) = result {
            log::error!("{err}");
        }
        if let Some(index) = self.index_of(id) {
            self.entities.remove(index).mark_disposed();
        }
        if let Err(err) = self.apply_disposals(requested) {
            log::error!("{err}");
        }
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Snapshot the level. The date is the time of the call.
    pub fn to_json(&self) -> LevelJson {
        let order = self.registry.loading_order();
        let rank = |ty: &str| -> isize {
            order
                .iter()
                .rev()
                .position(|t| t == ty)
                .map_or(-1, |i| i as isize)
        };
        let mut entities: Vec<EntityJson> = self.entities.iter().map(Entity::to_json).collect();
        entities.sort_by_key(|e| rank(&e.entity_type));
        LevelJson {
            date: Utc::now(),
            difficulty: self.difficulty,
            name: self.name.clone(),
            id: self.id,
            entities,
        }
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(&self.to_json())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore metadata and add every entity whose type is in the loading
    /// order. Each record is constructed, set up, loaded, then announced.
    ///
    /// On failure the failing entity is disposed again without an
    /// `entity_removed` and the error is returned; entities loaded before
    /// it stay.
    pub fn load(&mut self, json: LevelJson) -> Result<()> {
        self.id = json.id;
        self.name = json.name;
        self.difficulty = json.difficulty;
        self.date = json.date;

        log::info!("Loading {} entities", json.entities.len());
        let registry = Arc::clone(&self.registry);
        let mut records: Vec<(usize, EntityJson)> = Vec::with_capacity(json.entities.len());
        for data in json.entities {
            match registry.loading_index(&data.entity_type) {
                Some(index) => records.push((index, data)),
                None => log::debug!("Loading {} {} (skipped)", data.entity_type, data.id),
            }
        }
        records.sort_by_key(|(index, _)| *index);

        for (_, data) in records {
            log::debug!("Loading {} {}", data.entity_type, data.id);
            let id = self.spawn(&data.entity_type, Some(data.id))?;
            if let Err(err) = self.load_one(id, data) {
                log::error!("{err}");
                self.retire(id);
                return Err(err);
            }
        }
        Ok(())
    }

    fn load_one(&mut self, id: Uuid, data: EntityJson) -> Result<()> {
        let index = self.index_of(id).ok_or(Error::EntityNotFound(id))?;
        let mut disposals = Vec::new();
        let setup = {
            let mut ctx = EntityContext::new(&mut self.events, &mut disposals);
            self.entities[index].setup(&mut ctx)
        };
        let drained = self.apply_disposals(disposals);
        setup.and(drained)?;
        self.load_entity(id, &EntityPatch::from(data))?;
        let snapshot = self.get_entity_by_id(id)?.to_json();
        self.events.emit(&LevelEvent::EntityAdded(snapshot));
        Ok(())
    }
}

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Level")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("difficulty", &self.difficulty)
            .field("date", &self.date)
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}
