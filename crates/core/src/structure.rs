//! Typed document outline (structure index).
//!
//! The outline is produced by a [`Renderer`](crate::render::Renderer) and
//! holds one [`Section`] per heading, in document order, with byte spans
//! into the source text it was built from. A section runs from its heading
//! line up to the next heading of the same or a shallower level, so it
//! contains its own sub-sections.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fallback anchor used when a heading has no alphanumeric characters.
const EMPTY_ANCHOR: &str = "section";

/// A heading found by a renderer, before anchors and spans are resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMark {
    pub name: String,
    pub level: u8,
    /// Byte offset of the first character of the heading line.
    pub start: usize,
    /// Byte offset just past the heading line (including its newline).
    pub heading_end: usize,
}

/// A named, contiguous range of the source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Stable anchor identifier, unique within the document.
    pub id: String,
    /// Heading text as written.
    pub name: String,
    pub level: u8,
    pub start: usize,
    pub heading_end: usize,
    pub end: usize,
}

/// Ordered outline of a document's sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure {
    sections: Vec<Section>,
}

impl Structure {
    pub const EMPTY: Structure = Structure {
        sections: Vec::new(),
    };

    /// Resolve anchors and spans for headings found in a source of
    /// `source_len` bytes. `marks` must be in document order.
    pub fn from_headings(source_len: usize, marks: Vec<HeadingMark>) -> Self {
        let mut taken: HashSet<String> = HashSet::with_capacity(marks.len());
        let mut sections = Vec::with_capacity(marks.len());

        for (i, mark) in marks.iter().enumerate() {
            let base = anchor_id(&mark.name);
            let mut id = base.clone();
            let mut n = 1;
            while !taken.insert(id.clone()) {
                n += 1;
                id = format!("{base}-{n}");
            }

            let end = marks[i + 1..]
                .iter()
                .find(|next| next.level <= mark.level)
                .map_or(source_len, |next| next.start);

            sections.push(Section {
                id,
                name: mark.name.clone(),
                level: mark.level,
                start: mark.start,
                heading_end: mark.heading_end,
                end,
            });
        }

        Self { sections }
    }

    /// All sections in document order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// The heading that closes `id`: the next section at the same or a
    /// shallower level. `None` if `id` runs to the end of the document or
    /// does not exist.
    pub fn successor(&self, id: &str) -> Option<&Section> {
        let index = self.position(id)?;
        let level = self.sections[index].level;
        self.sections[index + 1..].iter().find(|s| s.level <= level)
    }

    /// The next section in document order, regardless of level.
    pub fn next_in_order(&self, id: &str) -> Option<&Section> {
        let index = self.position(id)?;
        self.sections.get(index + 1)
    }

    /// Byte span of a section within the source text.
    pub fn span(&self, id: &str) -> Result<std::ops::Range<usize>, CoreError> {
        self.get(id)
            .map(|s| s.start..s.end)
            .ok_or_else(|| CoreError::SectionNotFound(id.to_string()))
    }

    /// The text of a section (heading line included).
    pub fn text_for<'a>(&self, source: &'a str, id: &str) -> Result<&'a str, CoreError> {
        let span = self.span(id)?;
        source
            .get(span)
            .ok_or_else(|| out_of_bounds(id, source.len()))
    }

    /// Replace the span of section `id` with `text`, leaving every other
    /// byte of `source` untouched.
    ///
    /// When the replacement is followed by more text and does not end in a
    /// newline, one is inserted so the next heading stays on its own line.
    pub fn replace_section(&self, source: &str, id: &str, text: &str) -> Result<String, CoreError> {
        let span = self.span(id)?;
        let (Some(before), Some(after)) = (source.get(..span.start), source.get(span.end..)) else {
            return Err(out_of_bounds(id, source.len()));
        };

        let mut body = String::with_capacity(before.len() + text.len() + after.len() + 1);
        body.push_str(before);
        body.push_str(text);
        if !after.is_empty() && !text.is_empty() && !text.ends_with('\n') {
            body.push('\n');
        }
        body.push_str(after);
        Ok(body)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }
}

/// Outline spans that do not fit the source mean the cached structure was
/// built from different text.
fn out_of_bounds(id: &str, len: usize) -> CoreError {
    CoreError::Internal(format!(
        "section '{id}' span does not fit a source of {len} bytes"
    ))
}

/// Generate an anchor identifier from heading text.
///
/// Lowercases, replaces anything that is not ASCII alphanumeric with a
/// hyphen, collapses runs of hyphens, and trims them from both ends.
pub fn anchor_id(name: &str) -> String {
    let mut anchor = String::with_capacity(name.len());
    let mut prev_hyphen = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            anchor.push(c.to_ascii_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen {
            anchor.push('-');
            prev_hyphen = true;
        }
    }

    let trimmed = anchor.trim_end_matches('-');
    if trimmed.is_empty() {
        EMPTY_ANCHOR.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
