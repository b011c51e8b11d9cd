//! Marker filter: turns position markers inside Pandoc's AST into highlight spans.
//!
//! Notes:
//! - The active highlight set is carried across the whole document walk, so a marker pair
//!   that Pandoc put into different inline containers still brackets the right text.
//! - Consecutive inlines under one non-empty active set are wrapped in a single
//!   `Span` carrying `data-hl` (ascending indices) and `data-colors` (matching light colours).
//! - Containers (emphasis, links, notes) are never wrapped themselves; their children are.
//! - `ANNMARKER{i}` becomes an empty `Span` carrying `data-annots`.
//! - Every marker is consumed here, including inside code and raw content.

use crate::markers::{tokenize, MarkerToken, Piece};
use crate::pandoc::{Attr, Block, Document, Inline, Table};
use std::collections::BTreeSet;

pub const ATTR_HL: &str = "data-hl";
pub const ATTR_COLORS: &str = "data-colors";
pub const ATTR_ANNOTS: &str = "data-annots";

/// Per ordered-highlight rendering data, indexed by highlight index.
#[derive(Debug, Clone, Default)]
pub struct MarkerStyles {
    pub colours: Vec<String>,
    pub annots: Vec<String>,
}

impl MarkerStyles {
    fn known(&self, i: usize) -> bool {
        i < self.colours.len()
    }
}

pub fn apply_markers(doc: Document, styles: &MarkerStyles) -> Document {
    let mut f = MarkerFilter {
        styles,
        active: BTreeSet::new(),
        deferred: Vec::new(),
    };
    Document {
        blocks: f.blocks(doc.blocks),
    }
}

struct MarkerFilter<'a> {
    styles: &'a MarkerStyles,
    active: BTreeSet<usize>,
    /// Annotations met inside code or raw content, emitted after the enclosing block.
    deferred: Vec<usize>,
}

impl MarkerFilter<'_> {
    fn blocks(&mut self, blocks: Vec<Block>) -> Vec<Block> {
        let mut out = Vec::with_capacity(blocks.len());
        for b in blocks {
            out.push(self.block(b));
            if !self.deferred.is_empty() {
                let spans = std::mem::take(&mut self.deferred)
                    .into_iter()
                    .filter_map(|i| self.annot_span(i))
                    .collect();
                out.push(Block::Plain(spans));
            }
        }
        out
    }

    fn block_lists(&mut self, lists: Vec<Vec<Block>>) -> Vec<Vec<Block>> {
        lists.into_iter().map(|l| self.blocks(l)).collect()
    }

    fn block(&mut self, b: Block) -> Block {
        match b {
            Block::Plain(xs) => Block::Plain(self.inlines(xs)),
            Block::Para(xs) => Block::Para(self.inlines(xs)),
            Block::LineBlock(lines) => {
                Block::LineBlock(lines.into_iter().map(|l| self.inlines(l)).collect())
            }
            Block::CodeBlock(a, s) => Block::CodeBlock(a, self.consume_markers(&s)),
            Block::RawBlock(f, s) => Block::RawBlock(f, self.consume_markers(&s)),
            Block::BlockQuote(bs) => Block::BlockQuote(self.blocks(bs)),
            Block::OrderedList(start, items) => Block::OrderedList(start, self.block_lists(items)),
            Block::BulletList(items) => Block::BulletList(self.block_lists(items)),
            Block::DefinitionList(items) => Block::DefinitionList(
                items
                    .into_iter()
                    .map(|(term, defs)| (self.inlines(term), self.block_lists(defs)))
                    .collect(),
            ),
            Block::Header(level, a, xs) => Block::Header(level, a, self.inlines(xs)),
            Block::Table(t) => Block::Table(Table {
                caption: self.blocks(t.caption),
                rows: t
                    .rows
                    .into_iter()
                    .map(|row| self.block_lists(row))
                    .collect(),
            }),
            Block::Div(a, bs) => Block::Div(a, self.blocks(bs)),
            other @ (Block::HorizontalRule | Block::Unsupported(_)) => other,
        }
    }

    /// Apply the markers in `s` to the active set and return the remaining text.
    fn consume_markers(&mut self, s: &str) -> String {
        let mut out = String::new();
        for piece in tokenize(s) {
            match piece {
                Piece::Text(t) => out.push_str(t),
                Piece::Marker(m) => self.toggle(m),
            }
        }
        out
    }

    fn toggle(&mut self, m: MarkerToken) {
        match m {
            MarkerToken::Start(i) if self.styles.known(i) => {
                self.active.insert(i);
            }
            MarkerToken::End(i) => {
                self.active.remove(&i);
            }
            MarkerToken::Annot(i) if self.styles.known(i) => self.deferred.push(i),
            MarkerToken::Start(i) | MarkerToken::Annot(i) => {
                tracing::debug!(index = i, "ignoring marker");
            }
        }
    }

    fn inlines(&mut self, xs: Vec<Inline>) -> Vec<Inline> {
        let mut out = Vec::new();
        let mut run: Vec<Inline> = Vec::new();
        for x in xs {
            match x {
                Inline::Str(s) => {
                    for piece in tokenize(&s) {
                        match piece {
                            Piece::Text(t) => run.push(Inline::Str(t.to_string())),
                            Piece::Marker(m) => self.marker(m, &mut run, &mut out),
                        }
                    }
                }
                Inline::Code(a, s) => {
                    for piece in tokenize(&s) {
                        match piece {
                            Piece::Text(t) => run.push(Inline::Code(a.clone(), t.to_string())),
                            Piece::Marker(m) => self.marker(m, &mut run, &mut out),
                        }
                    }
                }
                Inline::RawInline(f, s) => {
                    let s = self.consume_markers(&s);
                    run.push(Inline::RawInline(f, s));
                }
                Inline::Space | Inline::SoftBreak | Inline::Unsupported(_) => run.push(x),
                Inline::LineBreak => {
                    self.flush(&mut run, &mut out);
                    out.push(Inline::LineBreak);
                }
                container => {
                    self.flush(&mut run, &mut out);
                    out.push(self.container(container));
                }
            }
        }
        self.flush(&mut run, &mut out);
        out
    }

    fn container(&mut self, x: Inline) -> Inline {
        match x {
            Inline::Emph(xs) => Inline::Emph(self.inlines(xs)),
            Inline::Strong(xs) => Inline::Strong(self.inlines(xs)),
            Inline::Underline(xs) => Inline::Underline(self.inlines(xs)),
            Inline::Strikeout(xs) => Inline::Strikeout(self.inlines(xs)),
            Inline::Superscript(xs) => Inline::Superscript(self.inlines(xs)),
            Inline::Subscript(xs) => Inline::Subscript(self.inlines(xs)),
            Inline::SmallCaps(xs) => Inline::SmallCaps(self.inlines(xs)),
            Inline::Quoted(k, xs) => Inline::Quoted(k, self.inlines(xs)),
            Inline::Link(a, xs, url) => Inline::Link(a, self.inlines(xs), url),
            Inline::Span(a, xs) => Inline::Span(a, self.inlines(xs)),
            Inline::Note(bs) => Inline::Note(self.blocks(bs)),
            other => other,
        }
    }

    fn marker(&mut self, m: MarkerToken, run: &mut Vec<Inline>, out: &mut Vec<Inline>) {
        self.flush(run, out);
        match m {
            MarkerToken::Annot(i) if self.styles.known(i) => out.extend(self.annot_span(i)),
            other => self.toggle(other),
        }
    }

    fn annot_span(&self, i: usize) -> Option<Inline> {
        let latex = self.styles.annots.get(i).filter(|s| !s.is_empty())?;
        Some(Inline::Span(
            Attr {
                classes: vec!["annot".to_string()],
                ..Attr::default()
            }
            .with(ATTR_ANNOTS, latex.clone()),
            Vec::new(),
        ))
    }

    fn flush(&self, run: &mut Vec<Inline>, out: &mut Vec<Inline>) {
        if run.is_empty() {
            return;
        }
        let content = std::mem::take(run);
        if self.active.is_empty() {
            out.extend(content);
            return;
        }
        let hl = self
            .active
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let colors = self
            .active
            .iter()
            .map(|i| self.styles.colours[*i].as_str())
            .collect::<Vec<_>>()
            .join(",");
        let attr = Attr {
            classes: vec!["hl".to_string()],
            ..Attr::default()
        }
        .with(ATTR_HL, hl)
        .with(ATTR_COLORS, colors);
        out.push(Inline::Span(attr, content));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn styles(n: usize) -> MarkerStyles {
        MarkerStyles {
            colours: (0..n).map(|i| format!("tag-t{i}-light")).collect(),
            annots: (0..n).map(|i| format!("\\annot{{t{i}}}{{x}}")).collect(),
        }
    }

    fn s(t: &str) -> Inline {
        Inline::Str(t.to_string())
    }

    fn para(xs: Vec<Inline>) -> Document {
        Document {
            blocks: vec![Block::Para(xs)],
        }
    }

    fn inlines_of(doc: &Document) -> &[Inline] {
        match &doc.blocks[0] {
            Block::Para(xs) => xs,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn wraps_marked_text_and_emits_annot() {
        let doc = para(vec![
            s("HLSTART0ENDHLHelloHLEND0ENDHLANNMARKER0ENDMARKER"),
            Inline::Space,
            s("world"),
        ]);
        let out = apply_markers(doc, &styles(1));
        let xs = inlines_of(&out);
        assert_eq!(xs.len(), 4);
        match &xs[0] {
            Inline::Span(a, inner) => {
                assert_eq!(a.get(ATTR_HL), Some("0"));
                assert_eq!(a.get(ATTR_COLORS), Some("tag-t0-light"));
                assert_eq!(inner, &vec![s("Hello")]);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &xs[1],
            Inline::Span(a, inner) if a.get(ATTR_ANNOTS).is_some() && inner.is_empty()
        ));
        assert_eq!(xs[2], Inline::Space);
    }

    #[test]
    fn overlapping_markers_split_runs_by_active_set() {
        let doc = para(vec![s("HLSTART0ENDHLaHLSTART1ENDHLbHLEND0ENDHLcHLEND1ENDHL")]);
        let out = apply_markers(doc, &styles(2));
        let sets: Vec<Option<&str>> = inlines_of(&out)
            .iter()
            .map(|x| match x {
                Inline::Span(a, _) => a.get(ATTR_HL),
                _ => None,
            })
            .collect();
        assert_eq!(sets, vec![Some("0"), Some("0,1"), Some("1")]);
    }

    #[test]
    fn active_set_crosses_containers() {
        let doc = para(vec![
            s("aHLSTART0ENDHLb"),
            Inline::Emph(vec![s("c")]),
            s("dHLEND0ENDHLe"),
        ]);
        let out = apply_markers(doc, &styles(1));
        let xs = inlines_of(&out);
        assert_eq!(xs[0], s("a"));
        assert!(matches!(&xs[1], Inline::Span(_, inner) if inner == &vec![s("b")]));
        match &xs[2] {
            Inline::Emph(inner) => {
                assert!(matches!(
                    &inner[0],
                    Inline::Span(a, c) if a.get(ATTR_HL) == Some("0") && c == &vec![s("c")]
                ))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&xs[3], Inline::Span(_, inner) if inner == &vec![s("d")]));
        assert_eq!(xs[4], s("e"));
    }

    #[test]
    fn markers_in_code_blocks_are_consumed() {
        let doc = Document {
            blocks: vec![
                Block::CodeBlock(
                    Attr::default(),
                    "xHLSTART0ENDHLyHLEND0ENDHLANNMARKER0ENDMARKER".into(),
                ),
                Block::Para(vec![s("z")]),
            ],
        };
        let out = apply_markers(doc, &styles(1));
        assert_eq!(out.blocks[0], Block::CodeBlock(Attr::default(), "xy".into()));
        assert!(matches!(&out.blocks[1], Block::Plain(xs) if xs.len() == 1));
        assert_eq!(out.blocks[2], Block::Para(vec![s("z")]));
    }

    #[test]
    fn unknown_indices_are_dropped() {
        let doc = para(vec![s("HLSTART7ENDHLqHLEND7ENDHLANNMARKER7ENDMARKER")]);
        let out = apply_markers(doc, &styles(1));
        assert_eq!(inlines_of(&out), &[s("q")]);
    }
}
