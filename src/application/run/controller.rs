//! Per-block run state machine.
//!
//! ```text
//! Idle --run()--> Running --chunk--> Streaming --done--> Idle
//!                    \_____________failure____________/
//! any --destroy()--> Destroyed
//! ```
//!
//! Chunk handlers hold a weak reference to the state and check both the phase
//! and the run generation before writing, so a destroyed (or dropped)
//! controller and a superseded run can never mutate state or cache.

use std::{
    fmt,
    sync::{Arc, Mutex, Weak},
    time::Instant,
};

use metrics::counter;
use tracing::{debug, info, warn};

use crate::{
    application::render::{Element, RenderNode},
    cache::{ResultCache, mutex_lock},
    domain::{block::CodeBlock, digest::ContentDigest},
};

use super::{
    actions::{ActionError, ActionRegistry, RunCodeArgs, TERMINAL_RUN_ACTION},
    executor::{ChunkHandler, CodeExecutor, RunName, RunOptions},
};

/// Output shown while a run waits for its first chunk.
pub const RUNNING_PLACEHOLDER: &str = "Running…";

const SOURCE: &str = "application::run::controller";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    Streaming,
    Destroyed,
}

#[derive(Debug)]
struct RunState {
    phase: RunPhase,
    output: Option<String>,
    has_received_any_chunk: bool,
    generation: u64,
}

impl RunState {
    fn new() -> Self {
        Self {
            phase: RunPhase::Idle,
            output: None,
            has_received_any_chunk: false,
            generation: 0,
        }
    }

    fn accepts(&self, generation: u64) -> bool {
        self.phase != RunPhase::Destroyed && self.generation == generation
    }

    fn append(&mut self, chunk: String) -> &str {
        if self.has_received_any_chunk {
            let output = self.output.get_or_insert_with(String::new);
            output.push('\n');
            output.push_str(&chunk);
        } else {
            self.output = Some(chunk);
            self.has_received_any_chunk = true;
        }
        self.phase = RunPhase::Streaming;
        self.output.as_deref().unwrap_or_default()
    }
}

/// Snapshot of what a control displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunView {
    pub digest: ContentDigest,
    pub phase: RunPhase,
    /// Output of this instance, else the cached output, else `None`.
    pub output: Option<String>,
}

/// Interactive control attached to one rendered occurrence of a runnable block.
pub struct RunController {
    block: CodeBlock,
    cache: ResultCache,
    executor: Arc<dyn CodeExecutor>,
    actions: ActionRegistry,
    state: Arc<Mutex<RunState>>,
}

impl RunController {
    pub fn new(
        block: CodeBlock,
        cache: ResultCache,
        executor: Arc<dyn CodeExecutor>,
        actions: ActionRegistry,
    ) -> Self {
        Self {
            block,
            cache,
            executor,
            actions,
            state: Arc::new(Mutex::new(RunState::new())),
        }
    }

    pub fn block(&self) -> &CodeBlock {
        &self.block
    }

    pub fn phase(&self) -> RunPhase {
        mutex_lock(&self.state, SOURCE, "phase").phase
    }

    /// Output produced by this instance only, ignoring the cache.
    pub fn output(&self) -> Option<String> {
        mutex_lock(&self.state, SOURCE, "output").output.clone()
    }

    /// Execute the block and wait for the backend to finish.
    ///
    /// Triggering a new run while one is in flight supersedes the earlier
    /// run: its remaining chunks and its outcome are dropped.
    pub async fn run(&self) {
        let generation = {
            let mut state = mutex_lock(&self.state, SOURCE, "run.start");
            if state.phase == RunPhase::Destroyed {
                debug!(
                    target = "fencerun::run",
                    digest = %self.block.digest(),
                    "Ignoring run on destroyed control"
                );
                return;
            }
            state.generation = state.generation.wrapping_add(1);
            state.phase = RunPhase::Running;
            state.output = Some(RUNNING_PLACEHOLDER.to_string());
            state.has_received_any_chunk = false;
            state.generation
        };

        let name = RunName::fresh(self.block.digest());
        let started_at = Instant::now();
        counter!("fencerun_runs_total").increment(1);
        info!(
            target = "fencerun::run",
            op = "run::start",
            run = %name,
            language = self.block.language().unwrap_or("plain"),
            "Run started"
        );

        let options = RunOptions {
            name: name.clone(),
            handler: self.chunk_handler(generation),
        };
        let result = self
            .executor
            .execute(self.block.language(), self.block.content(), options)
            .await;

        let mut state = mutex_lock(&self.state, SOURCE, "run.finish");
        if !state.accepts(generation) {
            debug!(
                target = "fencerun::run",
                run = %name,
                phase = ?state.phase,
                "Dropping outcome of superseded or destroyed run"
            );
            return;
        }

        state.phase = RunPhase::Idle;
        match result {
            Ok(()) => {
                info!(
                    target = "fencerun::run",
                    op = "run::finish",
                    run = %name,
                    result = "ok",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    received_output = state.has_received_any_chunk,
                    "Run finished"
                );
            }
            Err(err) => {
                counter!("fencerun_run_failures_total").increment(1);
                warn!(
                    target = "fencerun::run",
                    op = "run::finish",
                    run = %name,
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Run request failed"
                );
                // Failures are shown but never cached.
                state.output = Some(err.to_string());
            }
        }
    }

    /// Make the control inert. Pending and future chunks are ignored.
    pub fn destroy(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "destroy");
        if state.phase != RunPhase::Destroyed {
            state.phase = RunPhase::Destroyed;
            debug!(
                target = "fencerun::run",
                digest = %self.block.digest(),
                "Run control destroyed"
            );
        }
    }

    /// Hand the block to the terminal action. Leaves run state and cache alone.
    pub fn run_in_terminal(&self, keep_alive: bool) -> Result<(), ActionError> {
        self.actions.invoke(
            TERMINAL_RUN_ACTION,
            RunCodeArgs {
                language: self.block.language().map(str::to_string),
                code: self.block.content().to_string(),
                keep_alive,
            },
        )
    }

    pub fn view(&self) -> RunView {
        let (phase, output) = {
            let state = mutex_lock(&self.state, SOURCE, "view");
            (state.phase, state.output.clone())
        };
        let output = output
            .filter(|output| !output.is_empty())
            .or_else(|| self.cached_output());

        RunView {
            digest: self.block.digest().clone(),
            phase,
            output,
        }
    }

    /// Visual state of the control: the action bar and the result area.
    pub fn render(&self) -> RenderNode {
        let view = self.view();
        let phase = match view.phase {
            RunPhase::Idle => "idle",
            RunPhase::Running => "running",
            RunPhase::Streaming => "streaming",
            RunPhase::Destroyed => "destroyed",
        };

        let actions = Element::new("div")
            .attr("class", "run-code-action")
            .child(
                Element::new("button")
                    .attr("type", "button")
                    .attr("title", "Run code")
                    .attr("data-action", "run")
                    .attr("data-digest", view.digest.as_str()),
            )
            .child(
                Element::new("button")
                    .attr("type", "button")
                    .attr(
                        "title",
                        "Run code in terminal; keep the interpreter open with the modifier key",
                    )
                    .attr("data-action", "run-in-terminal")
                    .attr("data-digest", view.digest.as_str()),
            );

        let mut result = Element::new("div")
            .attr("class", "run-code-result")
            .attr("data-phase", phase);
        if let Some(output) = view.output {
            result = result.child(Element::new("pre").child(RenderNode::Text(output)));
        }

        Element::new("div")
            .attr("class", "run-code")
            .child(actions)
            .child(result)
            .into()
    }

    fn cached_output(&self) -> Option<String> {
        match self.cache.get(self.block.digest()) {
            Ok(cached) => cached,
            Err(err) => {
                warn!(
                    target = "fencerun::cache",
                    digest = %self.block.digest(),
                    error = %err,
                    "Failed to read cached run result"
                );
                None
            }
        }
    }

    fn chunk_handler(&self, generation: u64) -> ChunkHandler {
        let state = Arc::downgrade(&self.state);
        let cache = self.cache.clone();
        let digest = self.block.digest().clone();
        Arc::new(move |chunk: String| accept_chunk(&state, generation, &cache, &digest, chunk))
    }
}

impl fmt::Debug for RunController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunController")
            .field("digest", self.block.digest())
            .field("language", &self.block.language())
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

fn accept_chunk(
    state: &Weak<Mutex<RunState>>,
    generation: u64,
    cache: &ResultCache,
    digest: &ContentDigest,
    chunk: String,
) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = mutex_lock(&state, SOURCE, "accept_chunk");
    if !state.accepts(generation) {
        return;
    }

    counter!("fencerun_chunks_total").increment(1);
    let accumulated = state.append(chunk);
    // The state lock is held across the write so the cache sees chunks in order.
    if let Err(err) = cache.set(digest, accumulated) {
        warn!(
            target = "fencerun::cache",
            digest = %digest,
            error = %err,
            "Failed to persist run output; continuing without cache"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::run::executor::ExecutionError;
    use async_trait::async_trait;

    struct Scripted {
        chunks: Vec<&'static str>,
        failure: Option<&'static str>,
    }

    #[async_trait]
    impl CodeExecutor for Scripted {
        async fn execute(
            &self,
            _language: Option<&str>,
            _code: &str,
            options: RunOptions,
        ) -> Result<(), ExecutionError> {
            for chunk in &self.chunks {
                options.emit(*chunk);
            }
            match self.failure {
                Some(message) => Err(ExecutionError::failed(message)),
                None => Ok(()),
            }
        }
    }

    fn controller(executor: Scripted, cache: &ResultCache) -> RunController {
        RunController::new(
            CodeBlock::new("--run--\necho a; echo b", Some("sh".into())),
            cache.clone(),
            Arc::new(executor),
            ActionRegistry::new(),
        )
    }

    #[test]
    fn first_chunk_replaces_placeholder_then_lines_are_joined() {
        let mut state = RunState::new();
        state.output = Some(RUNNING_PLACEHOLDER.to_string());

        assert_eq!(state.append("a".into()), "a");
        assert_eq!(state.append("b".into()), "a\nb");
        assert_eq!(state.phase, RunPhase::Streaming);
    }

    #[tokio::test]
    async fn chunks_accumulate_into_state_and_cache() {
        let cache = ResultCache::in_memory();
        let control = controller(
            Scripted {
                chunks: vec!["a", "b"],
                failure: None,
            },
            &cache,
        );

        control.run().await;

        assert_eq!(control.phase(), RunPhase::Idle);
        assert_eq!(control.output().as_deref(), Some("a\nb"));
        assert_eq!(
            cache.get(control.block().digest()).expect("get").as_deref(),
            Some("a\nb")
        );
    }

    #[tokio::test]
    async fn failure_is_shown_but_not_cached() {
        let cache = ResultCache::in_memory();
        let control = controller(
            Scripted {
                chunks: Vec::new(),
                failure: Some("backend offline"),
            },
            &cache,
        );
        cache.set(control.block().digest(), "previous").expect("seed");

        control.run().await;

        assert_eq!(control.view().output.as_deref(), Some("backend offline"));
        assert_eq!(
            cache.get(control.block().digest()).expect("get").as_deref(),
            Some("previous")
        );
    }

    #[test]
    fn fresh_control_falls_back_to_cache() {
        let cache = ResultCache::in_memory();
        let control = controller(
            Scripted {
                chunks: Vec::new(),
                failure: None,
            },
            &cache,
        );
        assert_eq!(control.view().output, None);

        cache.set(control.block().digest(), "from last session").expect("seed");
        let view = control.view();
        assert_eq!(view.phase, RunPhase::Idle);
        assert_eq!(view.output.as_deref(), Some("from last session"));
    }

    #[tokio::test]
    async fn destroyed_control_ignores_run() {
        let cache = ResultCache::in_memory();
        let control = controller(
            Scripted {
                chunks: vec!["late"],
                failure: None,
            },
            &cache,
        );

        control.destroy();
        control.run().await;

        assert_eq!(control.phase(), RunPhase::Destroyed);
        assert_eq!(control.output(), None);
        assert_eq!(cache.get(control.block().digest()).expect("get"), None);
    }

    #[test]
    fn render_escapes_output() {
        let cache = ResultCache::in_memory();
        let control = controller(
            Scripted {
                chunks: Vec::new(),
                failure: None,
            },
            &cache,
        );
        cache
            .set(control.block().digest(), "<b>bold</b>")
            .expect("seed");

        let html = control.render().to_html();
        assert!(html.contains("class=\"run-code-action\""));
        assert!(html.contains("data-action=\"run-in-terminal\""));
        assert!(html.contains("&lt;b&gt;bold&lt;&#47;b&gt;"), "{html}");
        assert!(!html.contains("<b>bold</b>"));
    }
}
