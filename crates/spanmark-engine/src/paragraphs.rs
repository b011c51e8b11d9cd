//! Paragraph numbering: character offset -> paragraph number.
//!
//! Two modes, never mixed for one document:
//! - **auto**: number paragraph units sequentially in document order.
//! - **source**: copy numbers from `li[value]` (legal judgments carry their own numbering).
//!
//! Notes:
//! - A paragraph unit is the nearest `<li>` around the text, else its nearest block.
//!   Heading text (`h1`–`h6`) is never numbered.
//! - Keys always point at a non-whitespace character of the extraction, so a lookup with
//!   [`paragraph_at`] agrees with the offsets highlights use.

use crate::dom::{is_heading_tag, Dom, NodeId};
use crate::extract::Extraction;
use html_scraper::{Html, Selector};
use spanmark_core::{NumberingChoice, NumberingMode, ParagraphMap};
use std::collections::HashSet;
use std::ops::Range;

/// `build_paragraph_map(html, auto_number)`.
pub fn build_paragraph_map(html: &str, auto_number: bool) -> ParagraphMap {
    let mode = if auto_number {
        NumberingMode::Auto
    } else {
        NumberingMode::Source
    };
    build_paragraph_map_in(&Extraction::from_html(html), mode)
}

pub fn build_paragraph_map_in(ex: &Extraction, mode: NumberingMode) -> ParagraphMap {
    match mode {
        NumberingMode::Auto => auto_map(ex),
        NumberingMode::Source => source_map(ex),
    }
}

/// True iff the document has at least two `li[value]` elements.
pub fn detect_source_numbering(html: &str) -> bool {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("li[value]") else {
        return false;
    };
    doc.select(&sel).take(2).count() >= 2
}

/// Resolve a caller's choice against the document.
pub fn resolve_numbering(html: &str, choice: NumberingChoice) -> NumberingMode {
    match choice {
        NumberingChoice::Auto => NumberingMode::Auto,
        NumberingChoice::Source => NumberingMode::Source,
        NumberingChoice::Detect => {
            if detect_source_numbering(html) {
                NumberingMode::Source
            } else {
                NumberingMode::Auto
            }
        }
    }
}

/// Paragraph number in force at `offset` (the nearest key at or before it).
pub fn paragraph_at(map: &ParagraphMap, offset: usize) -> Option<u32> {
    map.range(..=offset).next_back().map(|(_, n)| *n)
}

/// `[N]` when the span stays in one paragraph, `[N]–[M]` when it crosses.
pub fn paragraph_ref(map: &ParagraphMap, span: Range<usize>) -> Option<String> {
    if span.start >= span.end {
        return None;
    }
    let first = paragraph_at(map, span.start);
    let last = paragraph_at(map, span.end - 1);
    match (first, last) {
        (Some(a), Some(b)) if a == b => Some(format!("[{a}]")),
        (Some(a), Some(b)) => Some(format!("[{a}]–[{b}]")),
        (None, Some(b)) => Some(format!("[{b}]")),
        (Some(_), None) | (None, None) => None,
    }
}

fn paragraph_unit(dom: &Dom, block: NodeId) -> NodeId {
    std::iter::once(block)
        .chain(dom.ancestors(block))
        .find(|id| dom.tag(*id) == Some("li"))
        .unwrap_or(block)
}

fn in_heading(dom: &Dom, block: NodeId) -> bool {
    std::iter::once(block)
        .chain(dom.ancestors(block))
        .any(|id| dom.tag(id).is_some_and(is_heading_tag))
}

fn ol_start(dom: &Dom, ol: NodeId) -> Option<u32> {
    dom.attr(ol, "start")?.trim().parse::<u32>().ok()
}

/// An `<ol>` without `start` directly after a start-numbered list (or after another
/// continuation) continues that list's numbering instead of opening new paragraphs.
fn is_continuation(dom: &Dom, ol: NodeId) -> bool {
    if dom.tag(ol) != Some("ol") || ol_start(dom, ol).is_some() {
        return false;
    }
    match dom.prev_element_sibling(ol) {
        Some(prev) if dom.tag(prev) == Some("ol") => {
            ol_start(dom, prev).is_some() || is_continuation(dom, prev)
        }
        _ => false,
    }
}

enum UnitNumber {
    Fixed(u32),
    Next,
    Continuation,
}

fn unit_number(dom: &Dom, unit: NodeId) -> UnitNumber {
    if dom.tag(unit) != Some("li") {
        return UnitNumber::Next;
    }
    let Some(ol) = dom.parent(unit).filter(|p| dom.tag(*p) == Some("ol")) else {
        return UnitNumber::Next;
    };
    if let Some(start) = ol_start(dom, ol) {
        let k = dom
            .children(ol)
            .iter()
            .filter(|c| dom.tag(**c) == Some("li"))
            .position(|c| *c == unit)
            .unwrap_or(0);
        return UnitNumber::Fixed(start.saturating_add(k as u32));
    }
    if is_continuation(dom, ol) {
        UnitNumber::Continuation
    } else {
        UnitNumber::Next
    }
}

fn auto_map(ex: &Extraction) -> ParagraphMap {
    let dom = &ex.dom;
    let mut map = ParagraphMap::new();
    let mut counter: u32 = 0;
    let mut current: Option<NodeId> = None;
    // A unit is keyed once, even when the walk leaves it for a nested block and comes back.
    let mut numbered: HashSet<NodeId> = HashSet::new();
    let mut awaiting_first = false;
    let mut breaks = 0usize;
    let mut split_pending = false;
    let mut run_cache: Option<(usize, NodeId, bool)> = None;

    for (i, slot) in ex.sequence.slots().iter().enumerate() {
        let (unit, heading) = match run_cache {
            Some((r, unit, heading)) if r == slot.run => (unit, heading),
            _ => {
                let block = ex.runs[slot.run].block;
                let v = (paragraph_unit(dom, block), in_heading(dom, block));
                run_cache = Some((slot.run, v.0, v.1));
                v
            }
        };
        if heading {
            continue;
        }
        if current != Some(unit) {
            current = Some(unit);
            awaiting_first = !numbered.contains(&unit);
            breaks = 0;
            split_pending = false;
        }
        if slot.is_line_break() {
            breaks += 1;
            if breaks >= 2 && !awaiting_first {
                split_pending = true;
            }
            continue;
        }
        if slot.ch.is_whitespace() {
            continue;
        }
        breaks = 0;
        if awaiting_first {
            awaiting_first = false;
            numbered.insert(unit);
            match unit_number(dom, unit) {
                UnitNumber::Fixed(n) => {
                    counter = n;
                    map.insert(i, n);
                }
                UnitNumber::Next => {
                    counter += 1;
                    map.insert(i, counter);
                }
                UnitNumber::Continuation => {}
            }
        } else if split_pending {
            split_pending = false;
            counter += 1;
            map.insert(i, counter);
        }
    }
    map
}

fn nearest_valued_li(dom: &Dom, node: NodeId) -> Option<NodeId> {
    dom.ancestors(node)
        .find(|id| dom.tag(*id) == Some("li") && dom.attr(*id, "value").is_some())
}

fn source_map(ex: &Extraction) -> ParagraphMap {
    let dom = &ex.dom;
    let mut map = ParagraphMap::new();
    let mut seen: HashSet<NodeId> = HashSet::new();
    for (i, slot) in ex.sequence.slots().iter().enumerate() {
        if slot.ch.is_whitespace() {
            continue;
        }
        let Some(li) = nearest_valued_li(dom, slot.node) else {
            continue;
        };
        if !seen.insert(li) {
            continue;
        }
        let raw = dom.attr(li, "value").unwrap_or_default();
        match raw.trim().parse::<u32>() {
            Ok(n) => {
                map.insert(i, n);
            }
            Err(_) => tracing::warn!(value = raw, "ignoring non-numeric li[value]"),
        }
    }
    map
}
