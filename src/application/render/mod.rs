//! Markdown rendering with pluggable fence rules.
//!
//! The pipeline is synchronous and deterministic for static content. Fence
//! rules may attach live run controls; their markup is produced on demand by
//! [`RenderedDocument::to_html`].

mod fence;
mod node;
mod service;
mod types;

pub use fence::{FenceRule, HighlightFenceRule};
pub use node::{Element, RenderNode};
pub use service::{MarkdownPipeline, RenderedDocument};
pub use types::{FenceToken, RenderEnv, RenderError};
