//! Runnable fenced code blocks.

use std::sync::Arc;

use tracing::debug;

use crate::{
    application::{
        render::{FenceRule, FenceToken, MarkdownPipeline, RenderEnv, RenderNode},
        run::RunServices,
    },
    domain::block::{CodeBlock, runnable_code},
};

use super::{Hook, Plugin, PluginContext};

/// Name of the startup hook that drops results cached by earlier sessions.
pub const CLEAR_CACHE_HOOK: &str = "run-code.clear-cache";

/// Fence rule that attaches a run control to blocks whose first line carries
/// the run marker. Every other fence goes straight to the wrapped rule.
pub struct RunFenceInterceptor {
    inner: Box<dyn FenceRule>,
    services: RunServices,
}

impl RunFenceInterceptor {
    pub fn new(inner: Box<dyn FenceRule>, services: RunServices) -> Self {
        Self { inner, services }
    }
}

impl FenceRule for RunFenceInterceptor {
    fn render(&self, tokens: &[FenceToken], index: usize, env: &RenderEnv) -> RenderNode {
        let Some(code) = tokens
            .get(index)
            .and_then(|token| runnable_code(&token.content))
        else {
            return self.inner.render(tokens, index, env);
        };

        let baseline = self.inner.render(tokens, index, env);
        let info = &tokens[index].info;
        let block = CodeBlock::new(code, (!info.is_empty()).then(|| info.clone()));
        let control = Arc::new(self.services.controller(block));

        match baseline.with_child(RenderNode::Control(control)) {
            Ok(composite) => composite,
            Err(baseline) => {
                debug!(
                    target = "fencerun::render",
                    slug = %env.slug,
                    fence = index,
                    "Fence output has no child list; run control omitted"
                );
                baseline
            }
        }
    }
}

/// Makes `--run--` fences executable and clears stale results on startup.
#[derive(Debug, Clone)]
pub struct RunCodePlugin {
    services: RunServices,
}

impl RunCodePlugin {
    pub fn new(services: RunServices) -> Self {
        Self { services }
    }

    /// Install the interceptor around the pipeline's current fence rule.
    pub fn install_fence(&self, markdown: &mut MarkdownPipeline) {
        let services = self.services.clone();
        markdown.decorate_fence(move |inner| Box::new(RunFenceInterceptor::new(inner, services)));
    }
}

impl Plugin for RunCodePlugin {
    fn name(&self) -> &'static str {
        "run-code"
    }

    fn register(&self, ctx: &mut PluginContext<'_>) {
        self.install_fence(ctx.markdown);

        let cache = self.services.cache.clone();
        ctx.hooks.register(
            Hook::Startup,
            CLEAR_CACHE_HOOK,
            move || cache.clear_all().map_err(Into::into),
        );
    }
}
