//! Error types shared by the runtime.
//!
//! Registration conflicts, missing references, and malformed selectors are
//! reported as [`Error`] values. Lifecycle hooks return `anyhow::Result` so a
//! component can attach whatever context it likes; the runtime wraps those
//! failures in [`Error::Component`] or [`Error::Entity`] together with the
//! [`Phase`] that failed.
//!
//! Dispatch problems (unknown command, missing permission) are never errors:
//! the command dispatcher always answers with a plain string.

use std::fmt;

use uuid::Uuid;

/// Library result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The lifecycle step during which a hook failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Construct,
    Setup,
    Load,
    Tick,
    Dispose,
}

impl Phase {
    /// Progressive verb used in error messages ("setting up", "ticking", ...).
    pub fn verb(self) -> &'static str {
        match self {
            Phase::Construct => "constructing",
            Phase::Setup => "setting up",
            Phase::Load => "loading",
            Phase::Tick => "ticking",
            Phase::Dispose => "disposing",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Registration ─────────────────────────────────────────────────────
    #[error("Component with name \"{0}\" already exists")]
    DuplicateComponent(String),
    #[error("Entity with name \"{0}\" already exists")]
    DuplicateEntityType(String),
    #[error("Command with name \"{0}\" already exists")]
    DuplicateCommand(String),
    #[error("Component \"{0}\" is not registered")]
    UnknownComponent(String),
    #[error("Entity type \"{0}\" is not registered")]
    UnknownEntityType(String),

    // ── References ───────────────────────────────────────────────────────
    #[error("Entity does not exist: {0}")]
    EntityNotFound(Uuid),
    #[error("Parent {parent} of entity {entity} does not exist")]
    ParentNotFound { entity: Uuid, parent: Uuid },
    #[error("An entity with id {0} already exists in this level")]
    DuplicateEntityId(Uuid),
    #[error("Parent chain of entity {0} contains a cycle")]
    ParentCycle(Uuid),

    // ── Selectors ────────────────────────────────────────────────────────
    #[error("Invalid selector: {0:?}")]
    InvalidSelector(String),

    // ── Lifecycle ────────────────────────────────────────────────────────
    #[error("Error {phase} component {component} for {entity_type}: {source}")]
    Component {
        component: String,
        entity_type: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
    #[error("Error {phase} {entity_type}: {source}")]
    Entity {
        entity_type: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
    #[error("Entity {id} is {state}, cannot run {phase}")]
    InvalidState {
        id: Uuid,
        state: &'static str,
        phase: Phase,
    },

    // ── Ambient ──────────────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// The lifecycle phase for hook failures, `None` for everything else.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Component { phase, .. }
            | Error::Entity { phase, .. }
            | Error::InvalidState { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_error_names_phase_and_owner() {
        let err = Error::Component {
            component: "CopyData".into(),
            entity_type: "Ship".into(),
            phase: Phase::Setup,
            source: anyhow::anyhow!("missing field"),
        };
        assert_eq!(
            err.to_string(),
            "Error setting up component CopyData for Ship: missing field"
        );
        assert_eq!(err.phase(), Some(Phase::Setup));
    }

    #[test]
    fn entity_error_message() {
        let err = Error::Entity {
            entity_type: "Station".into(),
            phase: Phase::Dispose,
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Error disposing Station: boom");
    }

    #[test]
    fn registration_errors_quote_the_name() {
        assert_eq!(
            Error::DuplicateCommand("kick".into()).to_string(),
            "Command with name \"kick\" already exists"
        );
        assert!(Error::DuplicateComponent("a".into()).phase().is_none());
    }
}
