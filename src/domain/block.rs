//! Runnable code blocks and the `--run--` directive.

use super::digest::ContentDigest;

/// Directive that opts a fenced block into run mode when it appears on the
/// block's first line.
pub const RUN_MARKER: &str = "--run--";

/// Code captured from a runnable fence. Immutable for the lifetime of a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    content: String,
    language: Option<String>,
    digest: ContentDigest,
}

impl CodeBlock {
    /// Build a block; an empty language tag is treated as absent.
    pub fn new(content: impl Into<String>, language: Option<String>) -> Self {
        let content = content.into();
        let digest = ContentDigest::of(&content);
        let language = language.filter(|lang| !lang.trim().is_empty());
        Self {
            content,
            language,
            digest,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Cache identity. Derived from `content` only.
    pub fn digest(&self) -> &ContentDigest {
        &self.digest
    }
}

/// Returns the trimmed code when the fence's first line carries [`RUN_MARKER`].
///
/// Only the first line is inspected; a marker further down the block is plain
/// content.
pub fn runnable_code(raw: &str) -> Option<&str> {
    let code = raw.trim();
    let first_line = code.lines().next().unwrap_or_default().trim();
    first_line.contains(RUN_MARKER).then_some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_on_first_line_opts_in() {
        let code = runnable_code("--run--\necho hi\n").expect("runnable");
        assert_eq!(code, "--run--\necho hi");
    }

    #[test]
    fn marker_may_sit_inside_a_comment() {
        assert!(runnable_code("# --run--\nprint('hi')\n").is_some());
        assert!(runnable_code("   // --run-- node\nconsole.log(1)").is_some());
    }

    #[test]
    fn marker_on_later_line_is_ignored() {
        assert!(runnable_code("print(\"hi\")\n--run--\n").is_none());
    }

    #[test]
    fn leading_blank_lines_are_trimmed_before_detection() {
        let code = runnable_code("\n\n  --run--\nls\n\n").expect("runnable");
        assert_eq!(code, "--run--\nls");
    }

    #[test]
    fn empty_content_is_not_runnable() {
        assert!(runnable_code("").is_none());
        assert!(runnable_code("   \n").is_none());
    }

    #[test]
    fn language_does_not_affect_digest() {
        let python = CodeBlock::new("# --run--\nprint(1)", Some("python".into()));
        let bare = CodeBlock::new("# --run--\nprint(1)", None);
        assert_eq!(python.digest(), bare.digest());
        assert_eq!(python.language(), Some("python"));
        assert_eq!(bare.language(), None);
    }

    #[test]
    fn blank_language_is_absent() {
        let block = CodeBlock::new("--run--", Some("  ".into()));
        assert_eq!(block.language(), None);
    }
}
