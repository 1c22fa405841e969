mod config;
mod highlight;
mod rewrite;

use std::{fmt, mem, sync::Arc, time::Instant};

use comrak::{Arena, format_html, nodes::AstNode, parse_document};
use tracing::debug;

use crate::application::{
    render::{
        fence::{FenceRule, HighlightFenceRule},
        node::RenderNode,
        types::{FenceToken, RenderEnv, RenderError},
    },
    run::RunController,
};

use config::default_options;
use rewrite::{extract_fences, fence_placeholder, placeholder_nonce};

pub(crate) use highlight::{build_plain_code_block, highlight_code};

/// Comrak based markdown pipeline whose fenced code blocks go through a
/// replaceable [`FenceRule`].
pub struct MarkdownPipeline {
    options: comrak::Options<'static>,
    fence_rule: Box<dyn FenceRule>,
}

impl MarkdownPipeline {
    /// Pipeline with GFM extensions and [`HighlightFenceRule`] for fences.
    pub fn new() -> Self {
        Self {
            options: default_options(),
            fence_rule: Box::new(HighlightFenceRule::new()),
        }
    }

    /// Replace the active fence rule with a wrapper around it.
    pub fn decorate_fence<F>(&mut self, decorate: F)
    where
        F: FnOnce(Box<dyn FenceRule>) -> Box<dyn FenceRule>,
    {
        let current = mem::replace(&mut self.fence_rule, Box::new(HighlightFenceRule::new()));
        self.fence_rule = decorate(current);
    }

    pub fn render(&self, markdown: &str, env: &RenderEnv) -> Result<RenderedDocument, RenderError> {
        let started_at = Instant::now();
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);

        let nonce = placeholder_nonce(markdown);
        let tokens = extract_fences(root, &nonce);
        let html = render_html_stage(root, &self.options)?;
        let fences = (0..tokens.len())
            .map(|index| self.fence_rule.render(&tokens, index, env))
            .collect::<Vec<_>>();
        let document = assemble_stage(&html, &nonce, fences)?;

        debug!(
            target = "fencerun::render",
            op = "render::document",
            slug = %env.slug,
            fences = tokens.len(),
            controls = document.controls().len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Rendered markdown document"
        );
        Ok(document)
    }

    /// Fence tokens of `markdown` in document order, without rendering them.
    pub fn fences(&self, markdown: &str) -> Vec<FenceToken> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        extract_fences(root, &placeholder_nonce(markdown))
    }
}

impl Default for MarkdownPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MarkdownPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownPipeline").finish_non_exhaustive()
    }
}

/// Static HTML interleaved with the nodes produced by the fence rule.
#[derive(Debug, Default)]
pub struct RenderedDocument {
    nodes: Vec<RenderNode>,
}

impl RenderedDocument {
    pub fn nodes(&self) -> &[RenderNode] {
        &self.nodes
    }

    /// Current HTML; run controls are rendered from their present state.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for node in &self.nodes {
            node.write_html(&mut html);
        }
        html
    }

    /// Run controls in document order.
    pub fn controls(&self) -> Vec<Arc<RunController>> {
        self.nodes.iter().flat_map(RenderNode::controls).collect()
    }

    /// Destroy every control of the document.
    pub fn unmount(&self) {
        for control in self.controls() {
            control.destroy();
        }
    }
}

fn render_html_stage<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn assemble_stage(
    html: &str,
    nonce: &str,
    fences: Vec<RenderNode>,
) -> Result<RenderedDocument, RenderError> {
    let mut nodes = Vec::with_capacity(fences.len() * 2 + 1);
    let mut rest = html;

    for (index, fence) in fences.into_iter().enumerate() {
        let placeholder = fence_placeholder(nonce, index);
        let Some(position) = rest.find(&placeholder) else {
            return Err(RenderError::Document {
                message: format!("placeholder for fence {index} missing from rendered html"),
            });
        };
        let (before, after) = rest.split_at(position);
        if !before.is_empty() {
            nodes.push(RenderNode::Html(before.to_string()));
        }
        nodes.push(fence);
        rest = &after[placeholder.len()..];
    }

    if !rest.is_empty() {
        nodes.push(RenderNode::Html(rest.to_string()));
    }
    Ok(RenderedDocument { nodes })
}
