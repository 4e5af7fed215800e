//! Output rendering.
//!
//! Model output is highlighted with `syntect` into a small span tree, then a
//! second pass picks out TeX tokens (`\command`, `$`, `{`, `}`) inside the
//! leaf text. Emitters turn the tree into HTML or ANSI-colored terminal text.

use std::sync::LazyLock;

use regex::Regex;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEMES: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);
static TEX_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\\[a-zA-Z]+|\$|\{|\}").ok());

/// CSS class for TeX commands.
pub const COMMAND_CLASS: &str = "syntax-blue";
/// CSS class for `$`, `{` and `}`.
pub const DELIMITER_CLASS: &str = "syntax-red";

const COMMAND_RGB: (u8, u8, u8) = (0x4e, 0xa1, 0xff);
const DELIMITER_RGB: (u8, u8, u8) = (0xff, 0x6b, 0x6b);

/// Foreground color and weight from the highlighting theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenColor {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Bold text.
    pub bold: bool,
    /// Italic text.
    pub italic: bool,
}

impl From<Style> for TokenColor {
    fn from(style: Style) -> Self {
        Self {
            r: style.foreground.r,
            g: style.foreground.g,
            b: style.foreground.b,
            bold: style.font_style.contains(FontStyle::BOLD),
            italic: style.font_style.contains(FontStyle::ITALIC),
        }
    }
}

/// Styling carried by a [`Node::Span`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStyle {
    /// A token colored by the syntax theme.
    Syntax(TokenColor),
    /// A `\command`.
    TexCommand,
    /// `$`, `{` or `}`.
    TexDelimiter,
}

/// A node in the rendered output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Unstyled text.
    Text(String),
    /// Styled run of child nodes.
    Span {
        /// How the children are styled.
        style: NodeStyle,
        /// Child nodes.
        children: Vec<Node>,
    },
}

/// Highlight `text` as `language` with the named theme.
///
/// Unknown languages or themes and highlighter failures fall back to a single
/// plain text node.
pub fn highlight(text: &str, language: &str, theme: &str) -> Vec<Node> {
    let Some(theme) = THEMES.themes.get(theme) else {
        debug!(theme, "unknown highlight theme; rendering plain text");
        return vec![Node::Text(text.to_owned())];
    };
    let syntax = SYNTAXES
        .find_syntax_by_token(language)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());

    let mut highlighter = HighlightLines::new(syntax, theme);
    let mut nodes = Vec::new();
    for line in LinesWithEndings::from(text) {
        let ranges = match highlighter.highlight_line(line, &SYNTAXES) {
            Ok(ranges) => ranges,
            Err(e) => {
                debug!("highlighting failed: {e}");
                return vec![Node::Text(text.to_owned())];
            }
        };
        nodes.extend(ranges.into_iter().map(|(style, piece)| Node::Span {
            style: NodeStyle::Syntax(style.into()),
            children: vec![Node::Text(piece.to_owned())],
        }));
    }
    nodes
}

/// Split every text leaf into TeX command, delimiter and plain pieces.
pub fn apply_tex_tokens(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .flat_map(|node| match node {
            Node::Text(text) => split_tex(&text),
            Node::Span { style, children } => vec![Node::Span {
                style,
                children: apply_tex_tokens(children),
            }],
        })
        .collect()
}

fn split_tex(text: &str) -> Vec<Node> {
    let Some(re) = TEX_TOKEN.as_ref() else {
        return vec![Node::Text(text.to_owned())];
    };
    let mut out = Vec::new();
    let mut last = 0;
    for m in re.find_iter(text) {
        if m.start() > last {
            out.push(Node::Text(text[last..m.start()].to_owned()));
        }
        let style = if m.as_str().starts_with('\\') {
            NodeStyle::TexCommand
        } else {
            NodeStyle::TexDelimiter
        };
        out.push(Node::Span {
            style,
            children: vec![Node::Text(m.as_str().to_owned())],
        });
        last = m.end();
    }
    if last < text.len() {
        out.push(Node::Text(text[last..].to_owned()));
    }
    out
}

/// Highlight and tokenize in one step.
pub fn render(text: &str, language: &str, theme: &str) -> Vec<Node> {
    apply_tex_tokens(highlight(text, language, theme))
}

/// The text content of `nodes`, with all styling dropped.
pub fn plain_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    push_plain(nodes, &mut out);
    out
}

fn push_plain(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Span { children, .. } => push_plain(children, out),
        }
    }
}

/// HTML fragment for `nodes`.
pub fn to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    push_html(nodes, &mut out);
    out
}

fn push_html(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(&html_escape(text)),
            Node::Span { style, children } => {
                match style {
                    NodeStyle::Syntax(color) => {
                        out.push_str(&format!(
                            "<span style=\"color:#{:02x}{:02x}{:02x}",
                            color.r, color.g, color.b
                        ));
                        if color.bold {
                            out.push_str(";font-weight:bold");
                        }
                        if color.italic {
                            out.push_str(";font-style:italic");
                        }
                        out.push_str("\">");
                    }
                    NodeStyle::TexCommand => {
                        out.push_str(&format!("<span class=\"{COMMAND_CLASS}\">"));
                    }
                    NodeStyle::TexDelimiter => {
                        out.push_str(&format!("<span class=\"{DELIMITER_CLASS}\">"));
                    }
                }
                push_html(children, out);
                out.push_str("</span>");
            }
        }
    }
}

/// Standalone HTML page showing `nodes` in a `<pre>` block.
pub fn html_page(nodes: &[Node], title: &str) -> String {
    let (cr, cg, cb) = COMMAND_RGB;
    let (dr, dg, db) = DELIMITER_RGB;
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n\
         <style>\n\
         body {{ background: #2b303b; color: #c0c5ce; }}\n\
         pre {{ white-space: pre-wrap; font-family: monospace; }}\n\
         .{COMMAND_CLASS} {{ color: #{cr:02x}{cg:02x}{cb:02x}; }}\n\
         .{DELIMITER_CLASS} {{ color: #{dr:02x}{dg:02x}{db:02x}; }}\n\
         </style>\n</head>\n<body>\n<pre><code>{}</code></pre>\n</body>\n</html>\n",
        html_escape(title),
        to_html(nodes),
    )
}

/// Terminal rendering with 24-bit color escapes.
pub fn to_ansi(nodes: &[Node]) -> String {
    let mut out = String::new();
    push_ansi(nodes, None, &mut out);
    out
}

fn push_ansi(nodes: &[Node], inherited: Option<&str>, out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Span { style, children } => {
                let code = ansi_code(style);
                out.push_str(&code);
                push_ansi(children, Some(&code), out);
                out.push_str("\x1b[0m");
                if let Some(parent) = inherited {
                    out.push_str(parent);
                }
            }
        }
    }
}

fn ansi_code(style: &NodeStyle) -> String {
    let rgb = |(r, g, b): (u8, u8, u8)| format!("\x1b[38;2;{r};{g};{b}m");
    match style {
        NodeStyle::Syntax(color) => {
            let mut code = rgb((color.r, color.g, color.b));
            if color.bold {
                code.push_str("\x1b[1m");
            }
            if color.italic {
                code.push_str("\x1b[3m");
            }
            code
        }
        NodeStyle::TexCommand => rgb(COMMAND_RGB),
        NodeStyle::TexDelimiter => rgb(DELIMITER_RGB),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
