use once_cell::sync::Lazy;
use syntect::{html::ClassStyle, parsing::SyntaxSet};
use tracing::warn;

use super::{
    node::{Element, RenderNode},
    service::{build_plain_code_block, highlight_code},
    types::{FenceToken, RenderEnv},
};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Renders the fence at `index` of a document's fence tokens.
pub trait FenceRule: Send + Sync {
    fn render(&self, tokens: &[FenceToken], index: usize, env: &RenderEnv) -> RenderNode;
}

impl<F> FenceRule for F
where
    F: Fn(&[FenceToken], usize, &RenderEnv) -> RenderNode + Send + Sync,
{
    fn render(&self, tokens: &[FenceToken], index: usize, env: &RenderEnv) -> RenderNode {
        self(tokens, index, env)
    }
}

/// Default fence rule: a `div.code-block` wrapping a syntax highlighted `<pre>`.
#[derive(Debug, Clone)]
pub struct HighlightFenceRule {
    class_style: ClassStyle,
}

impl HighlightFenceRule {
    pub fn new() -> Self {
        Self {
            class_style: ClassStyle::SpacedPrefixed { prefix: "syntax-" },
        }
    }
}

impl Default for HighlightFenceRule {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceRule for HighlightFenceRule {
    fn render(&self, tokens: &[FenceToken], index: usize, env: &RenderEnv) -> RenderNode {
        let Some(token) = tokens.get(index) else {
            return RenderNode::Html(String::new());
        };

        let language = token.language();
        let meta = token
            .info
            .trim_start()
            .split_once(char::is_whitespace)
            .map(|(_, meta)| meta.trim());
        let pre = highlight_code(
            language,
            meta,
            &token.content,
            &SYNTAX_SET,
            &self.class_style,
        )
        .unwrap_or_else(|err| {
            warn!(
                target = "fencerun::render::highlight",
                slug = %env.slug,
                error = %err,
                "Highlighting failed; falling back to plain code block"
            );
            build_plain_code_block(language, &token.content)
        });

        let mut block = Element::new("div").attr("class", "code-block");
        if let Some(language) = language {
            block = block.attr("data-language", language);
        }
        block.child(RenderNode::Html(pre)).into()
    }
}
