//! Contract between run controllers and the code execution backend.

use std::{
    fmt, io,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::digest::ContentDigest;

/// Callback receiving one output chunk at a time, in emission order.
pub type ChunkHandler = Arc<dyn Fn(String) + Send + Sync>;

static RUN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Identifier of a single run, used by backends to route out-of-band output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunName(String);

impl RunName {
    /// A name unique to this invocation: wall-clock millis, a process-wide
    /// sequence number and the block digest.
    pub fn fresh(digest: &ContentDigest) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let sequence = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("_l_{millis}_{sequence}_{digest}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-run options handed to [`CodeExecutor::execute`].
#[derive(Clone)]
pub struct RunOptions {
    pub name: RunName,
    pub handler: ChunkHandler,
}

impl RunOptions {
    /// Forward one chunk to the run's handler.
    pub fn emit(&self, chunk: impl Into<String>) {
        (self.handler)(chunk.into());
    }
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Failure of the execution request itself. The display text is what the
/// control shows in place of output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("code block has no language tag")]
    MissingLanguage,
    #[error("no interpreter configured for language `{language}`")]
    UnsupportedLanguage { language: String },
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("execution io error: {0}")]
    Io(#[from] io::Error),
    #[error("{message}")]
    Failed { message: String },
}

impl ExecutionError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Asynchronous code execution backend.
///
/// Implementations stream output through `options.handler` and resolve once
/// the run is over. Returning `Err` means the request failed; output already
/// streamed stays where the handler put it.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(
        &self,
        language: Option<&str>,
        code: &str,
        options: RunOptions,
    ) -> Result<(), ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn run_names_are_fresh_and_carry_the_digest() {
        let digest = ContentDigest::of("--run--\nls");
        let first = RunName::fresh(&digest);
        let second = RunName::fresh(&digest);

        assert_ne!(first, second);
        assert!(first.as_str().starts_with("_l_"));
        assert!(first.as_str().ends_with(digest.as_str()));
    }

    #[test]
    fn emit_forwards_to_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = RunOptions {
            name: RunName::fresh(&ContentDigest::of("x")),
            handler: Arc::new(move |chunk| sink.lock().expect("lock").push(chunk)),
        };

        options.emit("one");
        options.emit(String::from("two"));

        assert_eq!(*seen.lock().expect("lock"), vec!["one", "two"]);
        assert!(format!("{options:?}").contains("RunOptions"));
    }

    #[test]
    fn failure_message_is_displayed_verbatim() {
        let err = ExecutionError::failed("backend unreachable");
        assert_eq!(err.to_string(), "backend unreachable");
    }
}
