//! Export pipeline: HTML + highlights -> LaTeX.
//!
//! ```text
//! prepare_export   (pure)   markers, paragraph map, annotation bodies, colours
//! converter                 marked HTML -> Pandoc JSON (pandoc subprocess in production)
//! render_prepared  (pure)   JSON -> marker filter -> LaTeX writer
//! ```
//!
//! Nothing is written anywhere until the caller takes the returned string.

use crate::annot::format_annot;
use crate::config::{ExportConfig, PandocMode};
use crate::emoji::EmojiNames;
use crate::extract::Extraction;
use crate::filter::{apply_markers, MarkerStyles};
use crate::latex::write_latex;
use crate::markers::{
    contains_marker, insert_markers_in, strip_markers, MarkedHtml, OrderedHighlight,
};
use crate::pandoc::{parse_document, Block, Document, Inline};
use crate::paragraphs::{build_paragraph_map_in, paragraph_ref, resolve_numbering};
use crate::preamble::wrap_document;
use serde::Serialize;
use spanmark_core::{
    DocumentConverter, Error, Highlight, NumberingChoice, NumberingMode, ParagraphMap, Result,
};

#[derive(Debug, Clone, Serialize)]
pub struct PreparedExport {
    pub marked_html: String,
    pub highlights: Vec<OrderedHighlight>,
    pub numbering: NumberingMode,
    pub paragraphs: ParagraphMap,
    #[serde(skip)]
    pub styles: MarkerStyles,
    /// Tags in first-appearance (document) order, for the preamble.
    pub tags: Vec<String>,
}

pub fn prepare_export(
    html: &str,
    highlights: &[Highlight],
    numbering: NumberingChoice,
    emoji: EmojiNames<'_>,
) -> Result<PreparedExport> {
    let ex = Extraction::from_html(html);
    let marked = if highlights.is_empty() {
        MarkedHtml {
            html: html.to_string(),
            highlights: Vec::new(),
        }
    } else {
        insert_markers_in(&ex, highlights)?
    };
    let mode = resolve_numbering(html, numbering);
    let paragraphs = build_paragraph_map_in(&ex, mode);

    let mut styles = MarkerStyles::default();
    let mut tags = Vec::new();
    for oh in &marked.highlights {
        let h = &oh.highlight;
        let para = h
            .paragraph_ref
            .clone()
            .or_else(|| paragraph_ref(&paragraphs, oh.span.clone()));
        styles.colours.push(h.light_colour());
        styles.annots.push(format_annot(h, para.as_deref(), emoji));
        if !tags.contains(&h.tag) {
            tags.push(h.tag.clone());
        }
    }
    tracing::debug!(
        highlights = marked.highlights.len(),
        paragraphs = paragraphs.len(),
        numbering = ?mode,
        "prepared export"
    );
    Ok(PreparedExport {
        marked_html: marked.html,
        highlights: marked.highlights,
        numbering: mode,
        paragraphs,
        styles,
        tags,
    })
}

/// Render Pandoc's JSON for `prepared.marked_html` into a LaTeX fragment.
pub fn render_prepared(
    prepared: &PreparedExport,
    pandoc_json: &str,
    emoji: EmojiNames<'_>,
) -> Result<String> {
    let doc = parse_document(pandoc_json)?;
    Ok(render_document(prepared, doc, emoji))
}

fn render_document(prepared: &PreparedExport, doc: Document, emoji: EmojiNames<'_>) -> String {
    let filtered = apply_markers(doc, &prepared.styles);
    let latex = write_latex(&filtered, emoji);
    if contains_marker(&latex) {
        tracing::warn!("stray position markers in latex output; removing");
        return strip_markers(&latex);
    }
    latex
}

/// Names of AST nodes the writer cannot render.
pub fn unsupported_nodes(doc: &Document) -> Vec<String> {
    let mut out = Vec::new();
    for b in &doc.blocks {
        collect_block(b, &mut out);
    }
    out.sort();
    out.dedup();
    out
}

fn collect_block(b: &Block, out: &mut Vec<String>) {
    match b {
        Block::Unsupported(name) => out.push(name.clone()),
        Block::Plain(xs) | Block::Para(xs) | Block::Header(_, _, xs) => collect_inlines(xs, out),
        Block::LineBlock(lines) => lines.iter().for_each(|l| collect_inlines(l, out)),
        Block::BlockQuote(bs) | Block::Div(_, bs) => bs.iter().for_each(|b| collect_block(b, out)),
        Block::OrderedList(_, items) | Block::BulletList(items) => {
            items.iter().flatten().for_each(|b| collect_block(b, out))
        }
        Block::DefinitionList(items) => {
            for (term, defs) in items {
                collect_inlines(term, out);
                defs.iter().flatten().for_each(|b| collect_block(b, out));
            }
        }
        Block::Table(t) => {
            t.caption.iter().for_each(|b| collect_block(b, out));
            t.rows
                .iter()
                .flatten()
                .flatten()
                .for_each(|b| collect_block(b, out));
        }
        Block::CodeBlock(..) | Block::RawBlock(..) | Block::HorizontalRule => {}
    }
}

fn collect_inlines(xs: &[Inline], out: &mut Vec<String>) {
    for x in xs {
        match x {
            Inline::Unsupported(name) => out.push(name.clone()),
            Inline::Emph(ys)
            | Inline::Strong(ys)
            | Inline::Underline(ys)
            | Inline::Strikeout(ys)
            | Inline::Superscript(ys)
            | Inline::Subscript(ys)
            | Inline::SmallCaps(ys)
            | Inline::Quoted(_, ys)
            | Inline::Link(_, ys, _)
            | Inline::Span(_, ys) => collect_inlines(ys, out),
            Inline::Note(bs) => bs.iter().for_each(|b| collect_block(b, out)),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LatexExport {
    /// LaTeX body fragment.
    pub latex: String,
    pub tags: Vec<String>,
    pub numbering: NumberingMode,
    pub highlights: usize,
}

impl LatexExport {
    /// Standalone document: preamble + body.
    pub fn standalone(&self) -> String {
        wrap_document(&self.latex, &self.tags)
    }
}

/// Full export through a [`DocumentConverter`].
pub fn export_latex(
    html: &str,
    highlights: &[Highlight],
    config: &ExportConfig,
    converter: &dyn DocumentConverter,
    emoji: EmojiNames<'_>,
) -> Result<LatexExport> {
    if config.pandoc_mode == PandocMode::Off {
        return Err(Error::NotConfigured(
            "document conversion disabled (SPANMARK_PANDOC=off)".to_string(),
        ));
    }
    let prepared = prepare_export(html, highlights, config.numbering, emoji)?;
    tracing::debug!(converter = converter.name(), "converting marked html");
    let json = converter.html_to_pandoc_json(&prepared.marked_html)?;
    let doc = parse_document(&json)?;
    if config.pandoc_mode == PandocMode::Strict {
        let missing = unsupported_nodes(&doc);
        if !missing.is_empty() {
            return Err(Error::NotSupported(format!(
                "pandoc nodes without a latex rendering: {}",
                missing.join(", ")
            )));
        }
    }
    let latex = render_document(&prepared, doc, emoji);
    Ok(LatexExport {
        latex,
        tags: prepared.tags,
        numbering: prepared.numbering,
        highlights: prepared.highlights.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emoji::EmojiTable;
    use serde_json::json;

    /// Converter that answers with a Pandoc document of one paragraph per `<p>`, splitting
    /// words the way Pandoc's HTML reader does.
    struct ParagraphConverter;

    impl DocumentConverter for ParagraphConverter {
        fn name(&self) -> &'static str {
            "paragraph-stub"
        }

        fn html_to_pandoc_json(&self, html: &str) -> Result<String> {
            let blocks: Vec<serde_json::Value> = html
                .split("<p>")
                .filter_map(|p| p.split("</p>").next())
                .filter(|p| !p.trim().is_empty())
                .map(|p| {
                    let text = html_escape::decode_html_entities(p).into_owned();
                    let mut inlines = Vec::new();
                    for (i, w) in text.split(' ').enumerate() {
                        if i > 0 {
                            inlines.push(json!({"t": "Space"}));
                        }
                        inlines.push(json!({"t": "Str", "c": w}));
                    }
                    json!({"t": "Para", "c": inlines})
                })
                .collect();
            Ok(json!({"pandoc-api-version": [1, 23, 1], "meta": {}, "blocks": blocks}).to_string())
        }
    }

    fn names() -> EmojiTable {
        EmojiTable::empty()
    }

    #[test]
    fn prepare_computes_annots_with_paragraph_refs() {
        let t = names();
        let html = "<p>First para</p><p>Second para</p>";
        let p = prepare_export(
            html,
            &[Highlight::new(6, 16, "Issue")],
            NumberingChoice::Auto,
            EmojiNames::Table(&t),
        )
        .unwrap();
        assert_eq!(p.numbering, NumberingMode::Auto);
        assert_eq!(p.styles.colours, vec!["tag-issue-light".to_string()]);
        assert_eq!(p.styles.annots[0], "\\annot{issue}{\\textbf{Issue} [1]–[2]}");
        assert_eq!(p.tags, vec!["Issue".to_string()]);
    }

    #[test]
    fn explicit_paragraph_ref_wins() {
        let t = names();
        let mut h = Highlight::new(0, 3, "x");
        h.paragraph_ref = Some("[12]".into());
        let p = prepare_export("<p>abc</p>", &[h], NumberingChoice::Auto, EmojiNames::Table(&t))
            .unwrap();
        assert!(p.styles.annots[0].contains("[12]"));
    }

    #[test]
    fn end_to_end_with_stub_converter() {
        let t = names();
        let cfg = ExportConfig::default();
        let out = export_latex(
            "<p>Hello &amp; world</p>",
            &[Highlight::new(0, 5, "a"), Highlight::new(0, 5, "b")],
            &cfg,
            &ParagraphConverter,
            EmojiNames::Table(&t),
        )
        .unwrap();
        assert!(out.latex.starts_with(r"\highLight[tag-a-light]{\highLight[tag-b-light]{"));
        assert!(out.latex.contains("{Hello}}}}\\annot{a}{"));
        assert!(out.latex.contains(" \\& world"));
        assert!(!contains_marker(&out.latex));
        assert_eq!(out.highlights, 2);
        assert!(out.standalone().contains("\\definecolor{tag-b-dark}"));
    }

    #[test]
    fn pandoc_off_is_not_configured() {
        let t = names();
        let cfg = ExportConfig {
            pandoc_mode: PandocMode::Off,
            ..ExportConfig::default()
        };
        let err = export_latex("<p>x</p>", &[], &cfg, &ParagraphConverter, EmojiNames::Table(&t))
            .unwrap_err();
        assert!(matches!(err, Error::NotConfigured(_)));
    }

    #[test]
    fn strict_mode_rejects_unrenderable_nodes() {
        struct MathConverter;
        impl DocumentConverter for MathConverter {
            fn name(&self) -> &'static str {
                "math-stub"
            }
            fn html_to_pandoc_json(&self, _html: &str) -> Result<String> {
                Ok(r#"{"blocks":[{"t":"Para","c":[{"t":"Math","c":[{"t":"InlineMath"},"x"]}]}]}"#
                    .to_string())
            }
        }
        let t = names();
        let cfg = ExportConfig {
            pandoc_mode: PandocMode::Strict,
            ..ExportConfig::default()
        };
        let err = export_latex("<p>x</p>", &[], &cfg, &MathConverter, EmojiNames::Table(&t))
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(m) if m.contains("Math")));
    }

    #[test]
    fn render_prepared_is_pure_over_given_json() {
        let t = names();
        let p = prepare_export(
            "<p>abc def</p>",
            &[Highlight::new(4, 7, "k")],
            NumberingChoice::Auto,
            EmojiNames::Table(&t),
        )
        .unwrap();
        let json = ParagraphConverter
            .html_to_pandoc_json(&p.marked_html)
            .unwrap();
        let a = render_prepared(&p, &json, EmojiNames::Table(&t)).unwrap();
        let b = render_prepared(&p, &json, EmojiNames::Table(&t)).unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("abc \\highLight[tag-k-light]"));
    }
}
