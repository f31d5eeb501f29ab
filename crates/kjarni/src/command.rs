//! # Commands
//!
//! Text commands with a minimum permission level, matched by name prefix.
//!
//! ```text
//!   "kick bob spamming"
//!     │
//!     ├─ first registered name that prefixes the text ── "kick"
//!     ├─ permission check (skipped when bypassed)
//!     └─ exec(context, ["bob", "spamming"]) ──► Option<String>
//! ```
//!
//! Matching is first-match in registration order, not longest-match: a
//! short name registered early shadows a longer one sharing its prefix.
//!
//! Dispatch never fails. Unknown commands, missing permissions, and
//! unimplemented commands all come back as ordinary reply strings.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::ecs::registry::Registry;
use crate::error::{Error, Result};

pub const PERMISSION_DENIED: &str = "You do not have permission to execute that command";
pub const NOT_IMPLEMENTED: &str = "Command is not implemented";
pub const DOES_NOT_EXIST: &str = "Command does not exist";

/// Prefix of internal tooling commands, hidden from `debug:list_commands`.
pub const DEBUG_PREFIX: &str = "debug:";

/// Whoever is running a command.
pub trait ExecutionContext {
    /// The executor's permission level. `None` counts as 0.
    fn permission_level(&self) -> Option<u32>;
}

pub type CommandFn<C> =
    Box<dyn Fn(&CommandRegistry<C>, &mut C, &[&str]) -> Option<String> + Send + Sync>;

pub struct Command<C> {
    pub name: String,
    pub permission_level: u32,
    /// `None` registers a placeholder that answers "not implemented".
    pub exec: Option<CommandFn<C>>,
}

impl<C> Command<C> {
    pub fn new<F>(name: impl Into<String>, permission_level: u32, exec: F) -> Self
    where
        F: Fn(&CommandRegistry<C>, &mut C, &[&str]) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            permission_level,
            exec: Some(Box::new(exec)),
        }
    }

    pub fn unimplemented(name: impl Into<String>, permission_level: u32) -> Self {
        Self {
            name: name.into(),
            permission_level,
            exec: None,
        }
    }
}

impl<C> fmt::Debug for Command<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("permission_level", &self.permission_level)
            .field("implemented", &self.exec.is_some())
            .finish()
    }
}

/// Commands in registration order.
pub struct CommandRegistry<C> {
    commands: Vec<Command<C>>,
    names: HashSet<String>,
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            names: HashSet::new(),
        }
    }
}

impl<C: ExecutionContext> CommandRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_command(&mut self, command: Command<C>) -> Result<()> {
        if !self.names.insert(command.name.clone()) {
            return Err(Error::DuplicateCommand(command.name));
        }
        log::debug!("Added command: {}", command.name);
        self.commands.push(command);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Command<C>> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Run one line of text. `bypass` skips the permission check (console).
    pub fn exec_command_string(&self, text: &str, context: &mut C, bypass: bool) -> Option<String> {
        let Some(command) = self.commands.iter().find(|c| text.starts_with(c.name.as_str())) else {
            return Some(DOES_NOT_EXIST.to_string());
        };

        let level = context.permission_level().unwrap_or(0);
        if level < command.permission_level && !bypass {
            return Some(PERMISSION_DENIED.to_string());
        }

        let Some(exec) = &command.exec else {
            return Some(NOT_IMPLEMENTED.to_string());
        };

        let args: Vec<&str> = text[command.name.len()..].split_whitespace().collect();
        exec(self, context, &args)
    }

    /// Call a command by exact name, skipping the permission check.
    pub fn invoke(&self, name: &str, context: &mut C, args: &[&str]) -> Option<String> {
        match self.get(name) {
            Some(Command { exec: Some(exec), .. }) => exec(self, context, args),
            Some(_) => Some(NOT_IMPLEMENTED.to_string()),
            None => Some(DOES_NOT_EXIST.to_string()),
        }
    }
}

// ── Debug commands ───────────────────────────────────────────────────────

/// Register `debug:list_commands`, `debug:list_entities`, and
/// `debug:list_components`.
pub fn register_debug_commands<C: ExecutionContext + 'static>(
    commands: &mut CommandRegistry<C>,
    registry: Arc<Registry>,
) -> Result<()> {
    commands.add_command(Command::new("debug:list_commands", 0, |commands, _, _| {
        let names: Vec<&str> = commands
            .names()
            .filter(|name| !name.starts_with(DEBUG_PREFIX))
            .collect();
        Some(names.join(", "))
    }))?;

    {
        let registry = Arc::clone(&registry);
        commands.add_command(Command::new("debug:list_entities", 0, move |_, _, args| {
            let entities = registry.entities();
            if args.first() == Some(&"true") {
                let lines: Vec<String> = entities
                    .iter()
                    .map(|ty| {
                        let components: Vec<&str> = ty.component_names().collect();
                        format!("{0} => {0} {{{1}}}", ty.name(), components.join(", "))
                    })
                    .collect();
                Some(lines.join("\n"))
            } else {
                Some(entities.names().collect::<Vec<_>>().join(", "))
            }
        }))?;
    }

    commands.add_command(Command::new("debug:list_components", 0, move |_, _, _| {
        Some(registry.components().names().collect::<Vec<_>>().join(", "))
    }))
}
