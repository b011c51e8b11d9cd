//! Structural split points for highlights.
//!
//! A highlight that crosses a block (`<p>`→`<p>`, `<td>`→`<td>`) or an inline formatting edge
//! (`plain <b>bold</b>`) would leave its markers in different Pandoc containers. We split such
//! spans into segments that each stay inside one container; all segments share one index.
//!
//! Block and inline detection read the run context recorded by the forward walk in
//! [`crate::extract`]. A third source, [`layout_gaps`], catches serialized text that counts as
//! no character (layout whitespace, stripped elements) sitting between two runs.

use crate::extract::{Extraction, TextRun};
use std::collections::BTreeSet;
use std::ops::Range;

/// Offsets where consecutive runs resolve to different nearest block ancestors.
pub fn block_boundaries(runs: &[TextRun]) -> BTreeSet<usize> {
    runs.windows(2)
        .filter(|w| w[0].block != w[1].block)
        .map(|w| w[1].chars.start)
        .collect()
}

/// Offsets where the open inline formatting elements change between consecutive runs.
///
/// Elements are compared by identity, so `<b>x</b><b>y</b>` splits too: the two `<b>`s become
/// separate Pandoc nodes.
pub fn inline_boundaries(runs: &[TextRun]) -> BTreeSet<usize> {
    runs.windows(2)
        .filter(|w| w[0].block == w[1].block && w[0].inline != w[1].inline)
        .map(|w| w[1].chars.start)
        .collect()
}

/// Offsets where uncounted text lies between consecutive runs in the serialization.
pub fn layout_gaps(ex: &Extraction) -> BTreeSet<usize> {
    ex.runs
        .windows(2)
        .filter(|w| has_text_outside_tags(&ex.html[w[0].bytes.end..w[1].bytes.start]))
        .map(|w| w[1].chars.start)
        .collect()
}

fn has_text_outside_tags(gap: &str) -> bool {
    let mut in_tag = false;
    for ch in gap.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => return true,
            _ => {}
        }
    }
    false
}

/// Union of block, inline and layout-gap boundaries for one extraction.
pub fn split_points(ex: &Extraction) -> BTreeSet<usize> {
    let mut all = block_boundaries(&ex.runs);
    all.extend(inline_boundaries(&ex.runs));
    all.extend(layout_gaps(ex));
    all
}

/// Cut `span` at every boundary strictly inside it.
pub fn split_at_boundaries(span: Range<usize>, boundaries: &BTreeSet<usize>) -> Vec<Range<usize>> {
    if span.start >= span.end {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut cur = span.start;
    for &b in boundaries.range(span.start + 1..span.end) {
        out.push(cur..b);
        cur = b;
    }
    out.push(cur..span.end);
    out
}
