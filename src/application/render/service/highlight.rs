use syntect::{
    html::{ClassStyle, ClassedHTMLGenerator},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use crate::application::render::types::RenderError;

pub(crate) fn highlight_code(
    language: Option<&str>,
    meta: Option<&str>,
    code: &str,
    syntax_set: &SyntaxSet,
    class_style: &ClassStyle,
) -> Result<String, RenderError> {
    let lang_token = language.unwrap_or("text");
    let syntax =
        find_syntax(syntax_set, lang_token).unwrap_or_else(|| syntax_set.find_syntax_plain_text());

    let mut code_with_newline = code.to_string();
    if !code_with_newline.ends_with('\n') {
        code_with_newline.push('\n');
    }

    let mut generator =
        ClassedHTMLGenerator::new_with_class_style(syntax, syntax_set, *class_style);

    for line in LinesWithEndings::from(code_with_newline.as_str()) {
        generator
            .parse_html_for_line_which_includes_newline(line)
            .map_err(|err| RenderError::Highlighting {
                language: lang_token.to_string(),
                message: err.to_string(),
            })?;
    }

    let highlighted = generator.finalize();
    let lang_class = class_token(lang_token);

    let meta_attr = meta
        .filter(|m| !m.is_empty())
        .map(|m| format!(" data-meta=\"{}\"", ammonia::clean_text(m)))
        .unwrap_or_default();

    Ok(format!(
        "<pre class=\"syntax-highlight syntax-lang-{lang_class}\" data-language=\"{}\"><code class=\"language-{lang_class} syntax-code\"{meta_attr}>{highlighted}</code></pre>",
        ammonia::clean_text(lang_token),
    ))
}

/// Escaped `<pre>` used when highlighting is unavailable.
pub(crate) fn build_plain_code_block(language: Option<&str>, literal: &str) -> String {
    let escaped_code = ammonia::clean_text(literal);
    let mut html = String::from("<pre class=\"syntax-highlight\"");
    if let Some(language) = language.filter(|language| !language.is_empty()) {
        html.push_str(" data-language=\"");
        html.push_str(&ammonia::clean_text(language));
        html.push('"');
    }
    html.push_str("><code>");
    html.push_str(&escaped_code);
    html.push_str("</code></pre>");
    html
}

/// Lowercased `token` restricted to characters safe inside a class list.
fn class_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(&lowercase))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_with_prefixed_classes() {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let style = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

        let html = highlight_code(Some("Python"), None, "print(\"hi\")", &syntax_set, &style)
            .expect("highlight");
        assert!(html.starts_with("<pre class=\"syntax-highlight syntax-lang-python\""));
        assert!(html.contains("class=\"language-python syntax-code\""));
        assert!(html.contains("syntax-"));
    }

    #[test]
    fn unknown_languages_fall_back_to_plain_text() {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let style = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

        let html = highlight_code(Some("nope"), Some("title=x"), "a < b", &syntax_set, &style)
            .expect("highlight");
        assert!(html.contains("data-meta=\"title&#61;x\""));
        assert!(html.contains("&lt;"));
    }

    #[test]
    fn language_classes_cannot_break_out_of_attributes() {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let style = ClassStyle::SpacedPrefixed { prefix: "syntax-" };

        let html = highlight_code(Some("sh\"onload=x"), None, "ls", &syntax_set, &style)
            .expect("highlight");
        assert!(html.starts_with("<pre class=\"syntax-highlight syntax-lang-shonloadx\""));
        assert!(!html.contains("\"onload"));
    }

    #[test]
    fn plain_block_escapes_code() {
        let html = build_plain_code_block(Some("sh"), "echo <hi>");
        assert_eq!(
            html,
            "<pre class=\"syntax-highlight\" data-language=\"sh\"><code>echo&#32;&lt;hi&gt;</code></pre>"
        );
    }
}
