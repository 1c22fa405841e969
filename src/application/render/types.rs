use thiserror::Error;

/// Raw fence token handed to a [`FenceRule`](super::FenceRule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceToken {
    /// Info string after the opening fence, verbatim (may be empty).
    pub info: String,
    /// Body of the fence without the fence lines.
    pub content: String,
}

impl FenceToken {
    pub fn new(info: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            info: info.into(),
            content: content.into(),
        }
    }

    /// First whitespace-separated token of the info string.
    pub fn language(&self) -> Option<&str> {
        self.info.split_whitespace().next()
    }
}

/// Per-render context shared by every fence of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderEnv {
    /// Identifier of the document, used in log events.
    pub slug: String,
}

impl RenderEnv {
    pub fn new(slug: impl Into<String>) -> Self {
        Self { slug: slug.into() }
    }
}

/// Structured errors surfaced by the rendering pipeline.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("syntax highlighting failed: {language}: {message}")]
    Highlighting { language: String, message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
}
