//! Live-rendering payloads.
//!
//! The browser either gets the document untouched plus validated offsets ([`prepare_live`]),
//! or (legacy) a copy where every logical character is wrapped in an indexed span.

use crate::dom::{Dom, ParseOptions};
use crate::extract::{CharWrap, Extraction};
use serde::Serialize;
use spanmark_core::Highlight;

/// Wrap every logical character in `<span class="char" data-char-index="N">`.
///
/// `<br>` is wrapped as a whole; stripped elements and block layout whitespace are copied
/// through without wrappers.
pub fn inject_char_spans(html: &str) -> String {
    Extraction::from_dom(Dom::parse(html), CharWrap::Spans).html
}

/// Undo [`inject_char_spans`]: unwrap the per-character spans and merge adjacent text.
pub fn strip_char_spans(html: &str) -> String {
    let dom = Dom::parse_with(
        html,
        ParseOptions {
            unwrap_char_spans: true,
        },
    );
    Extraction::from_dom(dom, CharWrap::None).html
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LiveHighlight {
    /// Position of the record in the caller's input.
    pub record: usize,
    pub start_char: usize,
    pub end_char: usize,
    pub tag: String,
    pub author: String,
    pub light_colour: String,
    pub dark_colour: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LiveDocument {
    pub html: String,
    pub chars: usize,
    pub highlights: Vec<LiveHighlight>,
    pub skipped: usize,
}

/// Validate highlights against the document and hand the HTML back untouched.
pub fn prepare_live(html: &str, highlights: &[Highlight]) -> LiveDocument {
    let chars = Extraction::from_html(html).sequence.len();
    let mut out = Vec::with_capacity(highlights.len());
    let mut skipped = 0;
    for (record, h) in highlights.iter().enumerate() {
        match h.span(chars) {
            Ok(span) => out.push(LiveHighlight {
                record,
                start_char: span.start,
                end_char: span.end,
                tag: h.tag.clone(),
                author: h.author.clone(),
                light_colour: h.light_colour(),
                dark_colour: h.dark_colour(),
            }),
            Err(reason) => {
                skipped += 1;
                tracing::warn!(record, %reason, "skipping highlight for live view");
            }
        }
    }
    LiveDocument {
        html: html.to_string(),
        chars,
        highlights: out,
        skipped,
    }
}
