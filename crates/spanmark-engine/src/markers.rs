//! Position markers: projecting character-offset highlights back into HTML.
//!
//! Notes:
//! - Markers are plain text tokens (`HLSTART{i}ENDHL`, `HLEND{i}ENDHL`, `ANNMARKER{i}ENDMARKER`)
//!   so they survive Pandoc's HTML reader as ordinary `Str` content.
//! - They are inserted into the canonical serialization from [`crate::extract`], which keeps
//!   the source text and document shell, only at character byte boundaries (never inside a
//!   tag, an entity, a multi-byte char or a collapsed whitespace run).
//! - `i` is the highlight's position after a stable sort by document position; spans crossing
//!   a structural boundary get one `HLSTART/HLEND` pair per segment.

use crate::boundaries::{split_at_boundaries, split_points};
use crate::extract::Extraction;
use regex::Regex;
use serde::Serialize;
use spanmark_core::{Error, Highlight, Result};
use std::ops::Range;
use std::sync::LazyLock;

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"HLSTART(\d+)ENDHL|HLEND(\d+)ENDHL|ANNMARKER(\d+)ENDMARKER")
        .expect("valid marker regex")
});

pub fn start_token(i: usize) -> String {
    format!("HLSTART{i}ENDHL")
}

pub fn end_token(i: usize) -> String {
    format!("HLEND{i}ENDHL")
}

pub fn annot_token(i: usize) -> String {
    format!("ANNMARKER{i}ENDMARKER")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerToken {
    Start(usize),
    End(usize),
    Annot(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Marker(MarkerToken),
}

/// Split `s` into text and marker pieces. Empty text pieces are not emitted.
pub fn tokenize(s: &str) -> Vec<Piece<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in MARKER_RE.captures_iter(s) {
        let Some(m) = caps.get(0) else { continue };
        // Out-of-range digits are left as text.
        let parsed = |i: usize| caps.get(i).and_then(|d| d.as_str().parse::<usize>().ok());
        let token = if caps.get(1).is_some() {
            parsed(1).map(MarkerToken::Start)
        } else if caps.get(2).is_some() {
            parsed(2).map(MarkerToken::End)
        } else {
            parsed(3).map(MarkerToken::Annot)
        };
        let Some(token) = token else { continue };
        if m.start() > last {
            out.push(Piece::Text(&s[last..m.start()]));
        }
        out.push(Piece::Marker(token));
        last = m.end();
    }
    if last < s.len() {
        out.push(Piece::Text(&s[last..]));
    }
    out
}

pub fn contains_marker(s: &str) -> bool {
    MARKER_RE.is_match(s)
}

/// Remove every marker token.
pub fn strip_markers(s: &str) -> String {
    MARKER_RE.replace_all(s, "").into_owned()
}

/// A highlight after validation and re-ordering.
#[derive(Debug, Clone, Serialize)]
pub struct OrderedHighlight {
    pub index: usize,
    pub span: Range<usize>,
    pub segments: Vec<Range<usize>>,
    pub highlight: Highlight,
}

#[derive(Debug, Clone)]
pub struct MarkedHtml {
    pub html: String,
    pub highlights: Vec<OrderedHighlight>,
}

/// `insert_markers(html, highlights) -> (marked_html, ordered_highlights)`.
pub fn insert_markers(html: &str, highlights: &[Highlight]) -> Result<MarkedHtml> {
    if highlights.is_empty() {
        return Ok(MarkedHtml {
            html: html.to_string(),
            highlights: Vec::new(),
        });
    }
    insert_markers_in(&Extraction::from_html(html), highlights)
}

/// Same as [`insert_markers`], reusing an extraction the caller already has.
pub fn insert_markers_in(ex: &Extraction, highlights: &[Highlight]) -> Result<MarkedHtml> {
    let slots = ex.sequence.slots();
    if !highlights.is_empty() && slots.is_empty() {
        return Err(Error::InvalidInput(
            "document has no characters to highlight".to_string(),
        ));
    }
    let ordered = order_highlights(ex, highlights);

    // (byte position, rank, tie-break, token). At one position: ends, then annots, then starts.
    let mut inserts: Vec<(usize, u8, i64, String)> = Vec::new();
    for oh in &ordered {
        let i = oh.index;
        for seg in &oh.segments {
            inserts.push((slots[seg.start].bytes.start, 2, i as i64, start_token(i)));
            inserts.push((slots[seg.end - 1].bytes.end, 0, -(i as i64), end_token(i)));
        }
        let last = oh.span.end - 1;
        inserts.push((slots[last].bytes.end, 1, i as i64, annot_token(i)));
    }
    inserts.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

    let src = ex.html.as_str();
    let mut out = String::with_capacity(src.len() + inserts.len() * 16);
    let mut cur = 0;
    for (pos, _, _, tok) in &inserts {
        out.push_str(&src[cur..*pos]);
        out.push_str(tok);
        cur = *pos;
    }
    out.push_str(&src[cur..]);

    tracing::debug!(
        highlights = ordered.len(),
        markers = inserts.len(),
        "inserted position markers"
    );
    Ok(MarkedHtml {
        html: out,
        highlights: ordered,
    })
}

/// Validate, stable-sort by document position, and split at structural boundaries.
pub fn order_highlights(ex: &Extraction, highlights: &[Highlight]) -> Vec<OrderedHighlight> {
    let slots = ex.sequence.slots();
    let mut valid: Vec<(Range<usize>, &Highlight)> = Vec::new();
    for (n, h) in highlights.iter().enumerate() {
        match h.span(slots.len()) {
            Ok(span) => valid.push((span, h)),
            Err(reason) => tracing::warn!(
                record = n,
                start = h.start_char,
                end = h.end_char,
                %reason,
                "skipping highlight"
            ),
        }
    }
    valid.sort_by_key(|(span, _)| slots[span.start].bytes.start);

    let boundaries = split_points(ex);
    valid
        .into_iter()
        .enumerate()
        .map(|(index, (span, h))| OrderedHighlight {
            index,
            segments: split_at_boundaries(span.clone(), &boundaries),
            span,
            highlight: h.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract;

    /// Text between every `HLSTART{i}`/`HLEND{i}` pair, joined, read back as characters.
    fn text_between_markers(marked: &str, i: usize) -> String {
        let start = start_token(i);
        let end = end_token(i);
        let mut out = String::new();
        let mut rest = marked;
        while let Some(s) = rest.find(&start) {
            let after = &rest[s + start.len()..];
            let Some(e) = after.find(&end) else { break };
            out.push_str(&read_back(&after[..e]));
            rest = &after[e + end.len()..];
        }
        out
    }

    fn read_back(fragment: &str) -> String {
        let ws = Regex::new(r"\s+").unwrap();
        let mut s = ws.replace_all(fragment, " ").into_owned();
        for tag in ["script", "style", "noscript", "template"] {
            let re = Regex::new(&format!(r"(?s)<{tag}\b[^>]*>.*?</{tag}>")).unwrap();
            s = re.replace_all(&s, "").into_owned();
        }
        let br = Regex::new(r"<br\b[^>]*>").unwrap();
        s = br.replace_all(&s, "\n").into_owned();
        let tags = Regex::new(r"<[^>]*>").unwrap();
        s = tags.replace_all(&s, "").into_owned();
        s = strip_markers(&s);
        html_escape::decode_html_entities(&s).into_owned()
    }

    #[test]
    fn marks_hello_in_entity_paragraph() {
        let out = insert_markers("<p>Hello &amp; world</p>", &[Highlight::new(0, 5, "a")]).unwrap();
        assert_eq!(
            out.html,
            "<p>HLSTART0ENDHLHelloHLEND0ENDHLANNMARKER0ENDMARKER &amp; world</p>"
        );
        assert_eq!(text_between_markers(&out.html, 0), "Hello");
    }

    #[test]
    fn preformatted_text_and_document_shell_survive_marking() {
        let html = "<!DOCTYPE html><html><head><title>T</title></head><body class=\"j\">\
                    <pre>fn main() {\n    x();\n}</pre><p>a&nbsp;&nbsp;b</p></body></html>";
        let seq = extract(html);
        let out = insert_markers(
            html,
            &[Highlight::new(0, 2, "a"), Highlight::new(10, 16, "b")],
        )
        .unwrap();
        assert_eq!(
            out.html,
            concat!(
                "<!DOCTYPE html><html><head><title>T</title></head><body class=\"j\">",
                "<pre>HLSTART0ENDHLfnHLEND0ENDHLANNMARKER0ENDMARKER main() ",
                "HLSTART1ENDHL{\n    x();HLEND1ENDHLANNMARKER1ENDMARKER\n}</pre>",
                "<p>a\u{a0}\u{a0}b</p></body></html>"
            )
        );
        assert_eq!(text_between_markers(&out.html, 1), "{ x();");
        assert_eq!(seq.slice(10..16), "{ x();");
    }

    #[test]
    fn whitespace_run_is_marked_as_one_character() {
        let html = "<p>a \n\t b</p>";
        let out = insert_markers(html, &[Highlight::new(1, 2, "a")]).unwrap();
        assert_eq!(out.html, "<p>aHLSTART0ENDHL \n\t HLEND0ENDHLANNMARKER0ENDMARKERb</p>");
        assert_eq!(text_between_markers(&out.html, 0), " ");
    }

    #[test]
    fn entity_is_one_char_and_never_split() {
        let html = "<p>Hello &amp; world</p>";
        let out = insert_markers(html, &[Highlight::new(6, 7, "a")]).unwrap();
        assert!(out.html.contains("HLSTART0ENDHL&amp;HLEND0ENDHL"));
        assert_eq!(text_between_markers(&out.html, 0), "&");
    }

    #[test]
    fn empty_highlight_list_returns_input_unchanged() {
        let html = "<div>\n <p>keep   me</p></div>";
        let out = insert_markers(html, &[]).unwrap();
        assert_eq!(out.html, html);
        assert!(out.highlights.is_empty());
    }

    #[test]
    fn highlights_against_empty_document_are_rejected() {
        let err = insert_markers("<p>  </p>", &[Highlight::new(0, 1, "a")]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn invalid_records_are_skipped_not_fatal() {
        let hs = vec![
            Highlight::new(-1, 2, "bad"),
            Highlight::new(3, 3, "bad"),
            Highlight::new(0, 99, "bad"),
            Highlight::new(1, 3, "good"),
        ];
        let out = insert_markers("<p>abcdef</p>", &hs).unwrap();
        assert_eq!(out.highlights.len(), 1);
        assert_eq!(out.highlights[0].highlight.tag, "good");
        assert_eq!(text_between_markers(&out.html, 0), "bc");
    }

    #[test]
    fn ordering_is_by_document_position_and_stable() {
        let hs = vec![
            Highlight::new(4, 6, "late"),
            Highlight::new(0, 2, "first"),
            Highlight::new(0, 3, "second"),
        ];
        let out = insert_markers("<p>abcdefgh</p>", &hs).unwrap();
        let tags: Vec<&str> = out
            .highlights
            .iter()
            .map(|o| o.highlight.tag.as_str())
            .collect();
        assert_eq!(tags, vec!["first", "second", "late"]);
        assert_eq!(text_between_markers(&out.html, 1), "abc");
        assert_eq!(text_between_markers(&out.html, 2), "ef");
    }

    #[test]
    fn cross_paragraph_span_is_split_per_block() {
        let html = "<p>one</p><p>two</p>";
        let out = insert_markers(html, &[Highlight::new(1, 5, "a")]).unwrap();
        assert_eq!(out.highlights[0].segments, vec![1..3, 3..5]);
        assert_eq!(
            out.html,
            "<p>oHLSTART0ENDHLneHLEND0ENDHL</p><p>HLSTART0ENDHLtwHLEND0ENDHLANNMARKER0ENDMARKERo</p>"
        );
        assert_eq!(text_between_markers(&out.html, 0), "netw");
    }

    #[test]
    fn nested_inline_formatting_round_trips() {
        let html = "<p>plain <b>bold <i>both</i></b> tail</p>";
        let seq = extract(html);
        let out = insert_markers(html, &[Highlight::new(2, 16, "a")]).unwrap();
        assert_eq!(text_between_markers(&out.html, 0), seq.slice(2..16));
        assert_eq!(out.highlights[0].segments, vec![2..6, 6..11, 11..15, 15..16]);
    }

    #[test]
    fn cjk_and_br_round_trip() {
        let html = "<p>漢字かな<br>한국어 text</p>";
        let seq = extract(html);
        for (s, e) in [(0, 3), (2, 6), (3, 9)] {
            let out = insert_markers(html, &[Highlight::new(s, e, "a")]).unwrap();
            assert_eq!(
                text_between_markers(&out.html, 0),
                seq.slice(s as usize..e as usize)
            );
        }
    }

    #[test]
    fn adjacent_highlights_close_before_opening() {
        let out = insert_markers(
            "<p>abcd</p>",
            &[Highlight::new(0, 2, "a"), Highlight::new(2, 4, "b")],
        )
        .unwrap();
        assert!(out
            .html
            .contains("HLEND0ENDHLANNMARKER0ENDMARKERHLSTART1ENDHL"));
    }

    #[test]
    fn tokenize_splits_text_and_markers() {
        let pieces = tokenize("aHLSTART12ENDHLbHLEND12ENDHLANNMARKER3ENDMARKER");
        assert_eq!(
            pieces,
            vec![
                Piece::Text("a"),
                Piece::Marker(MarkerToken::Start(12)),
                Piece::Text("b"),
                Piece::Marker(MarkerToken::End(12)),
                Piece::Marker(MarkerToken::Annot(3)),
            ]
        );
        assert_eq!(strip_markers("xHLEND0ENDHLy"), "xy");
        assert!(!contains_marker("HLSTARTxENDHL"));
    }
}
