//! Plugin host: a markdown pipeline plus lifecycle hooks that plugins extend
//! at registration time.

mod hooks;
mod run_code;

use tracing::info;

use crate::application::render::{MarkdownPipeline, RenderEnv, RenderError, RenderedDocument};

pub use hooks::{Hook, HookError, HookFn, HookRegistry};
pub use run_code::{CLEAR_CACHE_HOOK, RunCodePlugin, RunFenceInterceptor};

/// Mutable view of the host handed to [`Plugin::register`].
pub struct PluginContext<'a> {
    pub markdown: &'a mut MarkdownPipeline,
    pub hooks: &'a mut HookRegistry,
}

pub trait Plugin {
    fn name(&self) -> &'static str;

    fn register(&self, ctx: &mut PluginContext<'_>);
}

#[derive(Debug, Default)]
pub struct PluginHost {
    markdown: MarkdownPipeline,
    hooks: HookRegistry,
}

impl PluginHost {
    pub fn new(markdown: MarkdownPipeline) -> Self {
        Self {
            markdown,
            hooks: HookRegistry::new(),
        }
    }

    pub fn install(&mut self, plugin: &dyn Plugin) {
        let mut ctx = PluginContext {
            markdown: &mut self.markdown,
            hooks: &mut self.hooks,
        };
        plugin.register(&mut ctx);
        info!(
            target = "fencerun::plugin",
            plugin = plugin.name(),
            "Plugin installed"
        );
    }

    /// Fire [`Hook::Startup`]; later calls are no-ops.
    pub fn startup(&self) -> Result<(), HookError> {
        self.hooks.fire(Hook::Startup)
    }

    pub fn render(&self, markdown: &str, env: &RenderEnv) -> Result<RenderedDocument, RenderError> {
        self.markdown.render(markdown, env)
    }

    pub fn markdown(&self) -> &MarkdownPipeline {
        &self.markdown
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }
}
