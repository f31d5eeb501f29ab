//! # Entities
//!
//! An [`Entity`] is an addressable object inside a [`Level`](crate::level::Level):
//! a UUID, a type name, a display name, an optional parent, a local pose, and
//! an ordered list of attached components.
//!
//! ```text
//!  Entity
//!  ├── core: EntityCore      id · type · name · parent · position · rotation · fields
//!  ├── ty: Arc<EntityType>   shared descriptor: component kinds, config, hooks
//!  ├── components            [Attached { kind, inner, mixin keys }, ...]
//!  ├── mask: ComponentSet    bitset over ComponentId
//!  └── state: Lifecycle
//! ```
//!
//! Lifecycle transitions are driven by the level, which owns every entity.
//! The entity itself never touches the level's entity set; hooks that want to
//! affect other entities go through an [`EntityContext`].
//!
//! ## Comparison
//!
//! | Operation         | Who calls it                 | Emits              |
//! |-------------------|------------------------------|--------------------|
//! | construct         | `Level::spawn`               | nothing            |
//! | setup             | `Level::setup_entity`        | `entity_added`     |
//! | load              | `Level::load_entity`         | nothing            |
//! | tick              | `Level::tick`                | whatever hooks do  |
//! | dispose           | `Level::dispose_entity`      | `entity_removed`   |

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ecs::component::{
    self, Component, ComponentId, ComponentInit, ComponentKind, ComponentSet, Fields,
};
use crate::ecs::registry::{EntityHook, EntityType};
use crate::ecs::selector::Selector;
use crate::error::{Error, Phase, Result};
use crate::events::{EventBus, LevelEvent};
use crate::math::{self, Vec3};

/// Snapshot keys owned by the entity itself. Components cannot write them.
pub const BASE_KEYS: [&str; 6] = ["id", "type", "name", "parent", "position", "rotation"];

// ── EntityCore ───────────────────────────────────────────────────────────

/// The part of an entity every component hook can see and edit.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCore {
    id: Uuid,
    type_name: String,
    pub name: String,
    /// Weak reference by id; the level resolves it.
    pub parent: Option<Uuid>,
    pub position: Vec3,
    /// Euler angles in radians.
    pub rotation: Vec3,
    /// Mixin fields merged in by components.
    pub fields: Fields,
}

impl EntityCore {
    pub fn new(id: Uuid, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            name: String::new(),
            parent: None,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            fields: Fields::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }
}

// ── Lifecycle ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Constructed,
    SettingUp,
    Ready,
    Disposing,
    Disposed,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Constructed => "constructed",
            Lifecycle::SettingUp => "setting up",
            Lifecycle::Ready => "ready",
            Lifecycle::Disposing => "disposing",
            Lifecycle::Disposed => "disposed",
        }
    }
}

// ── EntityContext ────────────────────────────────────────────────────────

/// Level access handed to entity hooks.
///
/// Hooks run while the level is mutably borrowed, so anything touching other
/// entities is queued and applied by the level once the hook returns.
pub struct EntityContext<'a> {
    events: &'a mut EventBus,
    disposals: &'a mut Vec<Uuid>,
}

impl<'a> EntityContext<'a> {
    pub(crate) fn new(events: &'a mut EventBus, disposals: &'a mut Vec<Uuid>) -> Self {
        Self { events, disposals }
    }

    /// Emit a level event right away.
    pub fn emit(&mut self, event: LevelEvent) {
        self.events.emit(&event);
    }

    /// Ask the level to dispose an entity after the current hook returns.
    pub fn dispose(&mut self, id: Uuid) {
        if !self.disposals.contains(&id) {
            self.disposals.push(id);
        }
    }
}

// ── Snapshot types (wire format) ────────────────────────────────────────

/// An entity snapshot: the base envelope plus every component's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityJson {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Uuid>,
    pub position: Vec3,
    pub rotation: Vec3,
    #[serde(flatten)]
    pub extra: Fields,
}

/// Partial update applied by [`Entity::load`]. Absent fields keep their
/// current values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityPatch {
    pub id: Option<Uuid>,
    #[serde(rename = "type")]
    pub entity_type: Option<String>,
    pub name: Option<String>,
    pub parent: Option<Uuid>,
    pub position: Option<Vec3>,
    pub rotation: Option<Vec3>,
    #[serde(flatten)]
    pub extra: Fields,
}

impl From<EntityJson> for EntityPatch {
    fn from(json: EntityJson) -> Self {
        Self {
            id: Some(json.id),
            entity_type: Some(json.entity_type),
            name: Some(json.name),
            parent: json.parent,
            position: Some(json.position),
            rotation: Some(json.rotation),
            extra: json.extra,
        }
    }
}

// ── Entity ───────────────────────────────────────────────────────────────

struct Attached {
    kind: Arc<ComponentKind>,
    inner: Box<dyn Component>,
    /// Keys this component contributed during setup.
    mixin: Vec<String>,
}

pub struct Entity {
    core: EntityCore,
    ty: Arc<EntityType>,
    components: Vec<Attached>,
    mask: ComponentSet,
    state: Lifecycle,
}

impl Entity {
    /// Build every declared component in declaration order. Fails as a whole
    /// if any component factory fails.
    pub(crate) fn instantiate(ty: &Arc<EntityType>, id: Uuid) -> Result<Self> {
        let init = ComponentInit {
            entity_id: id,
            entity_type: ty.name(),
            config: ty.config(),
        };
        let mut components = Vec::with_capacity(ty.components().len());
        let mut mask = ComponentSet::new();
        for kind in ty.components() {
            let inner = kind.build(&init).map_err(|source| Error::Component {
                component: kind.name().to_string(),
                entity_type: ty.name().to_string(),
                phase: Phase::Construct,
                source,
            })?;
            mask.insert(kind.id());
            components.push(Attached {
                kind: Arc::clone(kind),
                inner,
                mixin: Vec::new(),
            });
        }
        Ok(Self {
            core: EntityCore::new(id, ty.name()),
            ty: Arc::clone(ty),
            components,
            mask,
            state: Lifecycle::Constructed,
        })
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn type_name(&self) -> &str {
        &self.core.type_name
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn core(&self) -> &EntityCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut EntityCore {
        &mut self.core
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.ty
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    /// Read a mixin field.
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.core.fields.get(key)
    }

    // ── Components ───────────────────────────────────────────────────

    /// O(1) capability check by registered kind.
    pub fn has_component(&self, id: ComponentId) -> bool {
        self.mask.contains(id)
    }

    /// Capability check by concrete type.
    pub fn has<T: Component>(&self) -> bool {
        self.component::<T>().is_some()
    }

    pub fn component<T: Component>(&self) -> Option<&T> {
        self.components
            .iter()
            .find_map(|c| component::downcast_ref::<T>(c.inner.as_ref()))
    }

    pub fn component_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.components
            .iter_mut()
            .find_map(|c| component::downcast_mut::<T>(c.inner.as_mut()))
    }

    /// Attached component names, in attachment order.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.kind.name())
    }

    /// Mixin keys each component contributed during setup.
    pub fn mixin_attribution(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.components
            .iter()
            .map(|c| (c.kind.name(), c.mixin.as_slice()))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    fn expect_state(&self, allowed: &[Lifecycle], phase: Phase) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                id: self.core.id,
                state: self.state.as_str(),
                phase,
            })
        }
    }

    fn component_error(&self, attached: &Attached, phase: Phase, source: anyhow::Error) -> Error {
        Error::Component {
            component: attached.kind.name().to_string(),
            entity_type: self.core.type_name.clone(),
            phase,
            source,
        }
    }

    fn hook_error(&self, phase: Phase, source: anyhow::Error) -> Error {
        Error::Entity {
            entity_type: self.core.type_name.clone(),
            phase,
            source,
        }
    }

    fn run_hook(
        &mut self,
        hook: Option<EntityHook>,
        phase: Phase,
        ctx: &mut EntityContext<'_>,
    ) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        hook(self, ctx).map_err(|source| self.hook_error(phase, source))
    }

    /// Constructed → Ready. Merges each component's mixin, then runs the
    /// type's own setup hook. On failure the entity stays constructed.
    pub(crate) fn setup(&mut self, ctx: &mut EntityContext<'_>) -> Result<()> {
        self.expect_state(&[Lifecycle::Constructed], Phase::Setup)?;
        self.state = Lifecycle::SettingUp;
        let result = self.setup_inner(ctx);
        self.state = match result {
            Ok(()) => Lifecycle::Ready,
            Err(_) => Lifecycle::Constructed,
        };
        result
    }

    fn setup_inner(&mut self, ctx: &mut EntityContext<'_>) -> Result<()> {
        for index in 0..self.components.len() {
            let attached = &mut self.components[index];
            let mixin = match attached.inner.setup(&mut self.core) {
                Ok(mixin) => mixin,
                Err(source) => {
                    return Err(self.component_error(&self.components[index], Phase::Setup, source));
                }
            };
            attached.mixin.clear();
            for (key, value) in mixin {
                if BASE_KEYS.contains(&key.as_str()) {
                    log::warn!(
                        "{} tried to overwrite `{key}` on {}; ignored",
                        attached.kind.name(),
                        self.core.type_name
                    );
                    continue;
                }
                attached.mixin.push(key.clone());
                self.core.fields.insert(key, value);
            }
        }
        let hook = self.ty.hooks().on_setup.clone();
        self.run_hook(hook, Phase::Setup, ctx)
    }

    /// Wrap `rotation.y` into (-π, π] and run the type's tick hook.
    pub(crate) fn tick(&mut self, ctx: &mut EntityContext<'_>) -> Result<()> {
        self.expect_state(&[Lifecycle::Ready], Phase::Tick)?;
        self.core.rotation.y = math::wrap_angle(self.core.rotation.y);
        let hook = self.ty.hooks().on_tick.clone();
        self.run_hook(hook, Phase::Tick, ctx)
    }

    /// Run every component's tick hook in attachment order.
    pub fn tick_components(&mut self) -> Result<()> {
        for index in 0..self.components.len() {
            if let Err(source) = self.components[index].inner.tick(&mut self.core) {
                return Err(self.component_error(&self.components[index], Phase::Tick, source));
            }
        }
        Ok(())
    }

    /// Apply a partial snapshot. The parent id must already have been
    /// checked against the level.
    pub(crate) fn load(&mut self, data: &EntityPatch) -> Result<()> {
        self.expect_state(&[Lifecycle::Constructed, Lifecycle::Ready], Phase::Load)?;
        if let Some(name) = &data.name {
            self.core.name.clone_from(name);
        }
        if let Some(position) = data.position {
            self.core.position = position;
        }
        if let Some(rotation) = data.rotation {
            self.core.rotation = rotation;
        }
        if data.parent.is_some() {
            self.core.parent = data.parent;
        }
        for index in 0..self.components.len() {
            if let Err(source) = self.components[index].inner.load(&mut self.core, data) {
                return Err(self.component_error(&self.components[index], Phase::Load, source));
            }
        }
        Ok(())
    }

    /// Ready → Disposing. Runs the type's dispose hook, then every
    /// component's dispose. On failure the previous state is restored.
    pub(crate) fn dispose(&mut self, ctx: &mut EntityContext<'_>) -> Result<()> {
        self.expect_state(
            &[Lifecycle::Constructed, Lifecycle::Ready],
            Phase::Dispose,
        )?;
        let previous = self.state;
        self.state = Lifecycle::Disposing;
        let result = self.dispose_inner(ctx);
        if result.is_err() {
            self.state = previous;
        }
        result
    }

    fn dispose_inner(&mut self, ctx: &mut EntityContext<'_>) -> Result<()> {
        let hook = self.ty.hooks().on_dispose.clone();
        self.run_hook(hook, Phase::Dispose, ctx)?;
        for index in 0..self.components.len() {
            if let Err(source) = self.components[index].inner.dispose(&mut self.core) {
                return Err(self.component_error(&self.components[index], Phase::Dispose, source));
            }
        }
        Ok(())
    }

    pub(crate) fn mark_disposed(&mut self) {
        self.state = Lifecycle::Disposed;
    }

    // ── Serialization ────────────────────────────────────────────────

    /// Base envelope merged with every component's contribution.
    pub fn to_json(&self) -> EntityJson {
        let mut extra = Fields::new();
        for attached in &self.components {
            for (key, value) in attached.inner.to_json(&self.core) {
                if BASE_KEYS.contains(&key.as_str()) {
                    log::warn!(
                        "{} tried to serialize `{key}` for {}; ignored",
                        attached.kind.name(),
                        self.core.type_name
                    );
                    continue;
                }
                extra.insert(key, value);
            }
        }
        EntityJson {
            id: self.core.id,
            entity_type: self.core.type_name.clone(),
            name: self.core.name.clone(),
            parent: self.core.parent,
            position: self.core.position,
            rotation: self.core.rotation,
            extra,
        }
    }

    // ── Selectors ────────────────────────────────────────────────────

    /// Test this entity against a selector string (`*`, `@name`, `#id`, `.type`).
    pub fn matches(&self, selector: &str) -> Result<bool> {
        Ok(Selector::parse(selector)?.matches(self))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("core", &self.core)
            .field("components", &self.component_names().collect::<Vec<_>>())
            .field("state", &self.state)
            .finish()
    }
}

/// Multi-line debug printout: type and name, pose, then one line per component.
impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::Value::String(self.core.name.clone());
        writeln!(f, "{} {name}", self.core.type_name)?;
        writeln!(f, "position: {}", math::vector_string(self.core.position, 2))?;
        write!(f, "rotation: {}", math::vector_string(self.core.rotation, 2))?;
        for attached in &self.components {
            match attached.inner.describe() {
                Some(text) => write!(f, "\n{} {text}", attached.kind.name())?,
                None => write!(f, "\n{}", attached.kind.name())?,
            }
        }
        Ok(())
    }
}
