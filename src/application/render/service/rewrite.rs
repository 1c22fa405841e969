use comrak::nodes::{AstNode, NodeHtmlBlock, NodeValue};

use crate::{application::render::types::FenceToken, domain::digest::ContentDigest};

const NONCE_LEN: usize = 16;

/// Token that does not occur anywhere in `markdown`, so raw HTML in the source
/// can never collide with a fence placeholder.
pub(crate) fn placeholder_nonce(markdown: &str) -> String {
    let mut salt = 0u64;
    loop {
        let digest = ContentDigest::of(&format!("{salt}:{markdown}"));
        let nonce = digest.as_str()[..NONCE_LEN].to_string();
        if !markdown.contains(&nonce) {
            return nonce;
        }
        salt += 1;
    }
}

/// Markup standing in for fence `index` in comrak's output.
pub(crate) fn fence_placeholder(nonce: &str, index: usize) -> String {
    format!("<div>__RUN_FENCE_{nonce}_{index}__</div>")
}

/// Replace every fenced code block under `root` with a placeholder HTML block
/// and return the fences in document order.
///
/// Indented code blocks are not fences and keep comrak's rendering.
pub(crate) fn extract_fences<'a>(root: &'a AstNode<'a>, nonce: &str) -> Vec<FenceToken> {
    let mut tokens = Vec::new();
    visit_nodes(root, nonce, &mut tokens);
    tokens
}

fn visit_nodes<'a>(node: &'a AstNode<'a>, nonce: &str, tokens: &mut Vec<FenceToken>) {
    if let Some(token) = take_fence(node) {
        let placeholder = fence_placeholder(nonce, tokens.len());
        tokens.push(token);

        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: format!("{placeholder}\n"),
        });
        return;
    }

    let mut child = node.first_child();
    while let Some(next) = child {
        visit_nodes(next, nonce, tokens);
        child = next.next_sibling();
    }
}

fn take_fence(node: &AstNode<'_>) -> Option<FenceToken> {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::CodeBlock(block) if block.fenced => Some(FenceToken::new(
            block.info.trim(),
            block.literal.clone(),
        )),
        _ => None,
    }
}
