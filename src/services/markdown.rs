//! Markdown rendering
//!
//! pulldown-cmark for parsing and syntect for fenced code highlighting. Raw
//! HTML in the source is escaped rather than passed through, so rendered
//! content is safe to embed in the public site.

use once_cell::sync::Lazy;
use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use std::sync::Arc;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const DEFAULT_THEME: &str = "base16-ocean.dark";

static SHARED: Lazy<Arc<MarkdownRenderer>> = Lazy::new(|| Arc::new(MarkdownRenderer::new()));

/// Thread-safe renderer; loading the syntax definitions is expensive, so
/// share one instance via [`MarkdownRenderer::shared`].
#[derive(Clone)]
pub struct MarkdownRenderer {
    syntax_set: SyntaxSet,
    theme_set: Arc<ThemeSet>,
    theme_name: String,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }

    /// Unknown theme names fall back to the default theme
    pub fn with_theme(theme_name: &str) -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name
        } else {
            DEFAULT_THEME
        };

        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: Arc::new(theme_set),
            theme_name: theme_name.to_string(),
        }
    }

    pub fn shared() -> Arc<MarkdownRenderer> {
        SHARED.clone()
    }

    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_SMART_PUNCTUATION);
        options
    }

    pub fn render(&self, markdown: &str) -> String {
        let parser = Parser::new_ext(markdown, Self::options());
        let events = self.process_events(parser);

        let mut output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut output, events.into_iter());
        output
    }

    /// Visible text of the document with block boundaries turned into spaces
    /// and whitespace collapsed
    pub fn plain_text(&self, markdown: &str) -> String {
        let mut text = String::with_capacity(markdown.len());
        for event in Parser::new_ext(markdown, Self::options()) {
            match event {
                Event::Text(t) | Event::Code(t) => text.push_str(&t),
                Event::SoftBreak
                | Event::HardBreak
                | Event::Rule
                | Event::End(
                    TagEnd::Paragraph
                    | TagEnd::Heading(_)
                    | TagEnd::Item
                    | TagEnd::CodeBlock
                    | TagEnd::TableCell
                    | TagEnd::TableRow,
                ) => text.push(' '),
                _ => {}
            }
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn process_events<'a>(&self, parser: Parser<'a>) -> Vec<Event<'a>> {
        let mut events = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, body)) = code.take() {
                        let block = match lang {
                            Some(lang) => self.highlight_code(&body, &lang),
                            None => plain_code_block(&body, None),
                        };
                        events.push(Event::Html(block.into()));
                    }
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::Html(raw) | Event::InlineHtml(raw) => {
                    events.push(Event::Text(raw));
                }
                other => events.push(other),
            }
        }

        events
    }

    fn highlight_code(&self, code: &str, lang: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang));

        let (Some(syntax), Some(theme)) = (syntax, self.theme_set.themes.get(&self.theme_name))
        else {
            return plain_code_block(code, Some(lang));
        };

        highlighted_html_for_string(code, &self.syntax_set, syntax, theme)
            .unwrap_or_else(|_| plain_code_block(code, Some(lang)))
    }
}

fn plain_code_block(code: &str, lang: Option<&str>) -> String {
    match lang {
        Some(lang) => format!(
            "<pre><code class=\"language-{}\">{}</code></pre>",
            html_escape(lang),
            html_escape(code)
        ),
        None => format!("<pre><code>{}</code></pre>", html_escape(code)),
    }
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_theme_falls_back() {
        let renderer = MarkdownRenderer::with_theme("nonexistent-theme");
        assert_eq!(renderer.theme_name, DEFAULT_THEME);
    }

    #[test]
    fn test_render_basic_markup() {
        let html = MarkdownRenderer::shared().render("# Title\n\nSome **bold** and ~~old~~ text.");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(html.contains("<del>old</del>"));
    }

    #[test]
    fn test_fenced_rust_is_highlighted() {
        let html = MarkdownRenderer::shared().render("```rust\nfn main() {}\n```");
        assert!(html.contains("<pre style="));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_unknown_language_keeps_class() {
        let html = MarkdownRenderer::shared().render("```nosuchlang\n<x>\n```");
        assert!(html.contains("class=\"language-nosuchlang\""));
        assert!(html.contains("&lt;x&gt;"));
    }

    #[test]
    fn test_raw_html_is_escaped() {
        let html = MarkdownRenderer::shared().render("hello <script>alert(1)</script>\n\n<div>block</div>");
        assert!(!html.contains("<script>"));
        assert!(!html.contains("<div>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_table() {
        let html = MarkdownRenderer::shared().render("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
    }

    #[test]
    fn test_plain_text_collapses_blocks() {
        let text = MarkdownRenderer::shared()
            .plain_text("# Heading\n\nFirst *para*.\n\n- one\n- two\n\n`code`");
        assert_eq!(text, "Heading First para. one two code");
    }
}
