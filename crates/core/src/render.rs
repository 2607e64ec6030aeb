//! Markup rendering seam.
//!
//! The engine never renders on its own: every read or save that needs a
//! fresh HTML/outline pair is handed a [`Renderer`] and a [`LinkContext`]
//! by the caller. Two small renderers ship with the crate so that it is
//! usable without an external markup library.

use crate::document::Document;
use crate::structure::{anchor_id, HeadingMark, Structure};

/// Link namespace used when nothing more specific is known.
pub const DEFAULT_LINK_PREFIX: &str = "page";

/// Output of one renderer pass. Both halves always describe the same source.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub html: String,
    pub structure: Structure,
}

/// Turns source text into HTML and an outline. Must be pure.
pub trait Renderer: Send + Sync {
    fn render(&self, source: &str, link_prefix: &str) -> Rendered;
}

/// Supplies the namespace a renderer uses for internal links.
pub trait LinkContext: Send + Sync {
    fn resolve(&self, document: &Document) -> String;
}

/// A renderer paired with the link context it should use, passed to every
/// engine call that may need fresh output.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub renderer: &'a dyn Renderer,
    pub links: &'a dyn LinkContext,
}

impl<'a> RenderContext<'a> {
    pub fn new(renderer: &'a dyn Renderer, links: &'a dyn LinkContext) -> Self {
        Self { renderer, links }
    }
}

/// A [`LinkContext`] that always returns the same prefix.
#[derive(Debug, Clone)]
pub struct FixedLinkContext(pub String);

impl Default for FixedLinkContext {
    fn default() -> Self {
        Self(DEFAULT_LINK_PREFIX.to_string())
    }
}

impl LinkContext for FixedLinkContext {
    fn resolve(&self, _document: &Document) -> String {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Heading scanner
// ---------------------------------------------------------------------------

/// Find textile-style headings (`h1. Title` .. `h6. Title`) in `source`.
pub fn scan_headings(source: &str) -> Vec<HeadingMark> {
    let mut marks = Vec::new();
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        if let Some((level, name)) = parse_heading(line) {
            marks.push(HeadingMark {
                name: name.to_string(),
                level,
                start: offset,
                heading_end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    marks
}

fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let rest = line.strip_prefix('h')?;
    let mut chars = rest.chars();
    let level = chars.next()?.to_digit(10)?;
    if !(1..=6).contains(&level) {
        return None;
    }
    let name = chars.as_str().strip_prefix(". ")?.trim();
    if name.is_empty() {
        return None;
    }
    Some((level as u8, name))
}

fn outline(source: &str) -> Structure {
    Structure::from_headings(source.len(), scan_headings(source))
}

// ---------------------------------------------------------------------------
// HeadingRenderer
// ---------------------------------------------------------------------------

/// Minimal markup: headings become anchored `<hN>` tags, blank-line
/// separated blocks become paragraphs, and `[[Target]]` becomes a link
/// under the link prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadingRenderer;

impl Renderer for HeadingRenderer {
    fn render(&self, source: &str, link_prefix: &str) -> Rendered {
        let structure = outline(source);
        let mut html = String::new();
        let mut paragraph: Vec<&str> = Vec::new();
        let mut sections = structure.sections().iter();

        for line in source.lines() {
            if let Some((level, _)) = parse_heading(line) {
                flush_paragraph(&mut html, &mut paragraph, link_prefix);
                if let Some(section) = sections.next() {
                    html.push_str(&format!(
                        "<h{level}><a name=\"{}\">{}</a></h{level}>\n",
                        section.id,
                        render_inline(&section.name, link_prefix)
                    ));
                }
            } else if line.trim().is_empty() {
                flush_paragraph(&mut html, &mut paragraph, link_prefix);
            } else {
                paragraph.push(line.trim());
            }
        }
        flush_paragraph(&mut html, &mut paragraph, link_prefix);

        Rendered { html, structure }
    }
}

fn flush_paragraph(html: &mut String, lines: &mut Vec<&str>, link_prefix: &str) {
    if lines.is_empty() {
        return;
    }
    let text = lines.join("\n");
    html.push_str(&format!("<p>{}</p>\n", render_inline(&text, link_prefix)));
    lines.clear();
}

/// Escape text and expand `[[Target]]` links.
fn render_inline(text: &str, link_prefix: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("[[") {
        let Some(close) = rest[open + 2..].find("]]") else {
            break;
        };
        let target = &rest[open + 2..open + 2 + close];
        out.push_str(&escape_html(&rest[..open]));
        out.push_str(&format!(
            "<a href=\"/{}/{}\">{}</a>",
            escape_html(link_prefix),
            anchor_id(target),
            escape_html(target)
        ));
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(&escape_html(rest));
    out
}

// ---------------------------------------------------------------------------
// PlainTextRenderer
// ---------------------------------------------------------------------------

/// Fallback that shows the source verbatim. The outline is still computed
/// so section editing keeps working.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextRenderer;

impl Renderer for PlainTextRenderer {
    fn render(&self, source: &str, _link_prefix: &str) -> Rendered {
        let html = if source.is_empty() {
            String::new()
        } else {
            format!("<pre>{}</pre>", escape_html(source))
        };
        Rendered {
            html,
            structure: outline(source),
        }
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
