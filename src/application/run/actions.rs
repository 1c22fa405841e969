//! Named actions the host exposes to run controls.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, RwLock},
};

use thiserror::Error;
use tracing::debug;

use crate::cache::{rw_read, rw_write};

/// Action that runs a block in an external terminal.
pub const TERMINAL_RUN_ACTION: &str = "xterm.run-code";

const SOURCE: &str = "application::run::actions";

/// Arguments of a run-code action: `(language, code, keep_alive)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCodeArgs {
    pub language: Option<String>,
    pub code: String,
    /// Keep the interpreter open after the code finishes.
    pub keep_alive: bool,
}

pub type RunCodeAction = Arc<dyn Fn(RunCodeArgs) -> Result<(), ActionError> + Send + Sync>;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action `{name}` is not registered")]
    NotRegistered { name: String },
    #[error("action `{name}` failed: {message}")]
    Failed { name: String, message: String },
}

impl ActionError {
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Registry of named actions. Clones share the same table.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: Arc<RwLock<HashMap<String, RunCodeAction>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `action` under `name`, replacing any previous registration.
    pub fn register(&self, name: impl Into<String>, action: RunCodeAction) {
        let name = name.into();
        debug!(target = "fencerun::actions", action = %name, "Registered action");
        rw_write(&self.actions, SOURCE, "register").insert(name, action);
    }

    pub fn contains(&self, name: &str) -> bool {
        rw_read(&self.actions, SOURCE, "contains").contains_key(name)
    }

    pub fn invoke(&self, name: &str, args: RunCodeArgs) -> Result<(), ActionError> {
        let action = rw_read(&self.actions, SOURCE, "invoke")
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::NotRegistered {
                name: name.to_string(),
            })?;
        action(args)
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = rw_read(&self.actions, SOURCE, "debug")
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ActionRegistry")
            .field("actions", &names)
            .finish()
    }
}
