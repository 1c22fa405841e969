//! Running code blocks: the executor contract, the per-block controller and
//! the services every controller shares.

mod actions;
mod controller;
mod executor;
mod process;

use std::{fmt, sync::Arc};

pub use actions::{ActionError, ActionRegistry, RunCodeAction, RunCodeArgs, TERMINAL_RUN_ACTION};
pub use controller::{RUNNING_PLACEHOLDER, RunController, RunPhase, RunView};
pub use executor::{ChunkHandler, CodeExecutor, ExecutionError, RunName, RunOptions};
pub use process::{Interpreter, Interpreters, ProcessExecutor};
pub(crate) use process::write_script;

use crate::{cache::ResultCache, domain::block::CodeBlock};

/// Host services shared by all run controllers of one pipeline.
#[derive(Clone)]
pub struct RunServices {
    pub cache: ResultCache,
    pub executor: Arc<dyn CodeExecutor>,
    pub actions: ActionRegistry,
}

impl RunServices {
    pub fn new(
        cache: ResultCache,
        executor: Arc<dyn CodeExecutor>,
        actions: ActionRegistry,
    ) -> Self {
        Self {
            cache,
            executor,
            actions,
        }
    }

    /// A fresh controller for one rendered occurrence of `block`.
    pub fn controller(&self, block: CodeBlock) -> RunController {
        RunController::new(
            block,
            self.cache.clone(),
            Arc::clone(&self.executor),
            self.actions.clone(),
        )
    }
}

impl fmt::Debug for RunServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunServices")
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}
