//! Pandoc AST -> LaTeX body.
//!
//! Notes:
//! - Highlight spans (`data-hl`/`data-colors`) go through [`wrap_tiers`]; annotation spans
//!   (`data-annots`) are emitted after the closing braces of their run.
//! - Inside a sectioning command's argument nothing is emitted that could break it: annots
//!   (and footnotes) are deferred until after the heading, and highlighted content is wrapped
//!   in `\texorpdfstring` so bookmarks get plain text.
//! - Leftover marker tokens never reach the output; the export pipeline checks again.

use super::escape::{escape_latex, escape_pdf_string, escape_url, strip_invalid_chars};
use super::tiers::wrap_tiers;
use crate::emoji::EmojiNames;
use crate::filter::{ATTR_ANNOTS, ATTR_COLORS};
use crate::pandoc::{plain_text, Attr, Block, Document, Inline, QuoteKind, Table};

pub fn write_latex(doc: &Document, emoji: EmojiNames<'_>) -> String {
    let mut w = LatexWriter::new(emoji);
    let body = w.blocks(&doc.blocks);
    let mut out = body.trim_end().to_string();
    out.push('\n');
    out
}

pub fn section_command(level: u8) -> &'static str {
    match level {
        1 => "section",
        2 => "subsection",
        3 => "subsubsection",
        4 => "paragraph",
        _ => "subparagraph",
    }
}

const ENUM_COUNTERS: [&str; 4] = ["enumi", "enumii", "enumiii", "enumiv"];

/// Light colours of a highlight span, in ascending index order.
fn span_colours(attr: &Attr) -> Vec<&str> {
    attr.get(ATTR_COLORS)
        .or_else(|| attr.get("colors"))
        .map(|s| s.split(',').map(str::trim).filter(|c| !c.is_empty()).collect())
        .unwrap_or_default()
}

fn span_annots(attr: &Attr) -> Option<&str> {
    attr.get(ATTR_ANNOTS)
        .or_else(|| attr.get("annots"))
        .filter(|s| !s.is_empty())
}

struct LatexWriter<'a> {
    emoji: EmojiNames<'a>,
    enum_depth: usize,
    /// `Some` while rendering a heading argument.
    deferred: Option<Vec<String>>,
}

impl<'a> LatexWriter<'a> {
    fn new(emoji: EmojiNames<'a>) -> Self {
        Self {
            emoji,
            enum_depth: 0,
            deferred: None,
        }
    }

    fn text(&self, s: &str) -> String {
        escape_latex(s, self.emoji)
    }

    fn blocks(&mut self, blocks: &[Block]) -> String {
        let mut out = String::new();
        for b in blocks {
            out.push_str(&self.block(b));
        }
        out
    }

    /// Blocks rendered for use inside an argument or list item: no trailing blank lines.
    fn blocks_inline(&mut self, blocks: &[Block]) -> String {
        self.blocks(blocks).trim_end().to_string()
    }

    fn block(&mut self, b: &Block) -> String {
        match b {
            Block::Plain(xs) | Block::Para(xs) => {
                let body = self.inlines(xs);
                if body.trim().is_empty() {
                    String::new()
                } else {
                    format!("{body}\n\n")
                }
            }
            Block::LineBlock(lines) => {
                let rendered: Vec<String> = lines.iter().map(|l| self.inlines(l)).collect();
                format!("{}\n\n", rendered.join("\\\\\n"))
            }
            Block::Header(level, _, xs) => self.heading(*level, xs),
            Block::BlockQuote(bs) => {
                format!("\\begin{{quote}}\n{}\n\\end{{quote}}\n\n", self.blocks_inline(bs))
            }
            Block::BulletList(items) => {
                format!("\\begin{{itemize}}\n{}\\end{{itemize}}\n\n", self.items(items))
            }
            Block::OrderedList(start, items) => self.ordered_list(*start, items),
            Block::DefinitionList(items) => {
                let mut out = String::from("\\begin{description}\n");
                for (term, defs) in items {
                    let term = self.inlines(term);
                    out.push_str(&format!("\\item[{term}] "));
                    for d in defs {
                        out.push_str(&self.blocks_inline(d));
                        out.push('\n');
                    }
                }
                out.push_str("\\end{description}\n\n");
                out
            }
            Block::CodeBlock(_, code) => format!(
                "\\begin{{verbatim}}\n{}\n\\end{{verbatim}}\n\n",
                strip_invalid_chars(code).replace("\\end{verbatim}", "\\end {verbatim}")
            ),
            Block::RawBlock(format, raw) => {
                if is_latex_format(format) {
                    format!("{raw}\n\n")
                } else {
                    tracing::debug!(format = %format, "dropping raw block");
                    String::new()
                }
            }
            Block::HorizontalRule => "\\noindent\\rule{\\linewidth}{0.4pt}\n\n".to_string(),
            Block::Table(t) => self.table(t),
            Block::Div(_, bs) => self.blocks(bs),
            Block::Unsupported(name) => {
                tracing::debug!(node = %name, "skipping unsupported block");
                String::new()
            }
        }
    }

    fn heading(&mut self, level: u8, xs: &[Inline]) -> String {
        let outer = self.deferred.replace(Vec::new());
        let title = self.inlines(xs);
        let deferred = std::mem::replace(&mut self.deferred, outer).unwrap_or_default();
        let mut out = format!("\\{}{{{}}}\n", section_command(level), title.trim());
        for d in deferred {
            out.push_str(&d);
            out.push('\n');
        }
        out.push('\n');
        out
    }

    fn items(&mut self, items: &[Vec<Block>]) -> String {
        let mut out = String::new();
        for item in items {
            out.push_str("\\item ");
            out.push_str(&self.blocks_inline(item));
            out.push('\n');
        }
        out
    }

    fn ordered_list(&mut self, start: u32, items: &[Vec<Block>]) -> String {
        self.enum_depth += 1;
        let mut out = String::from("\\begin{enumerate}\n");
        if start != 1 {
            if let Some(counter) = ENUM_COUNTERS.get(self.enum_depth - 1) {
                out.push_str(&format!(
                    "\\setcounter{{{counter}}}{{{}}}\n",
                    start.saturating_sub(1)
                ));
            }
        }
        out.push_str(&self.items(items));
        out.push_str("\\end{enumerate}\n\n");
        self.enum_depth -= 1;
        out
    }

    fn table(&mut self, t: &Table) -> String {
        let cols = t.rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut out = String::new();
        if cols > 0 {
            let width = ((0.9 / cols as f64) * 100.0).floor() / 100.0;
            let colspec = format!("p{{{width:.2}\\linewidth}}").repeat(cols);
            out.push_str(&format!("\\begin{{tabular}}{{{colspec}}}\n"));
            for row in &t.rows {
                let mut cells: Vec<String> = row
                    .iter()
                    .map(|cell| self.blocks_inline(cell).replace("\n\n", "\\par "))
                    .collect();
                cells.resize(cols, String::new());
                out.push_str(&cells.join(" & "));
                out.push_str(" \\\\\n");
            }
            out.push_str("\\end{tabular}\n\n");
        }
        out.push_str(&self.blocks(&t.caption));
        out
    }

    fn inlines(&mut self, xs: &[Inline]) -> String {
        let mut out = String::new();
        for x in xs {
            out.push_str(&self.inline(x));
        }
        out
    }

    fn wrap(&mut self, cmd: &str, xs: &[Inline]) -> String {
        format!("\\{cmd}{{{}}}", self.inlines(xs))
    }

    fn inline(&mut self, x: &Inline) -> String {
        match x {
            Inline::Str(s) => self.text(s),
            Inline::Space | Inline::SoftBreak => " ".to_string(),
            Inline::LineBreak => {
                if self.deferred.is_some() {
                    " ".to_string()
                } else {
                    "\\\\\n".to_string()
                }
            }
            Inline::Emph(xs) => self.wrap("emph", xs),
            Inline::Strong(xs) => self.wrap("textbf", xs),
            Inline::Underline(xs) => self.wrap("underLine", xs),
            Inline::Strikeout(xs) => self.wrap("strikeThrough", xs),
            Inline::Superscript(xs) => self.wrap("textsuperscript", xs),
            Inline::Subscript(xs) => self.wrap("textsubscript", xs),
            Inline::SmallCaps(xs) => self.wrap("textsc", xs),
            Inline::Quoted(kind, xs) => {
                let body = self.inlines(xs);
                match kind {
                    QuoteKind::Single => format!("`{body}'"),
                    QuoteKind::Double => format!("``{body}''"),
                }
            }
            Inline::Code(_, code) => format!("\\texttt{{{}}}", self.text(code)),
            Inline::Link(_, xs, url) => {
                format!("\\href{{{}}}{{{}}}", escape_url(url), self.inlines(xs))
            }
            Inline::Span(attr, xs) => self.span(attr, xs),
            Inline::RawInline(format, raw) => {
                if is_latex_format(format) {
                    raw.clone()
                } else {
                    String::new()
                }
            }
            Inline::Note(bs) => {
                let note = format!("\\footnote{{{}}}", self.blocks_inline(bs));
                match self.deferred.as_mut() {
                    Some(d) => {
                        d.push(note);
                        String::new()
                    }
                    None => note,
                }
            }
            Inline::Unsupported(name) => {
                tracing::debug!(node = %name, "skipping unsupported inline");
                String::new()
            }
        }
    }

    fn span(&mut self, attr: &Attr, xs: &[Inline]) -> String {
        let body = self.inlines(xs);
        let colours = span_colours(attr);
        let mut out = if colours.is_empty() {
            body
        } else {
            let wrapped = wrap_tiers(&body, &colours);
            if self.deferred.is_some() {
                let plain = escape_pdf_string(&plain_text(xs));
                format!("\\texorpdfstring{{{wrapped}}}{{{plain}}}")
            } else {
                wrapped
            }
        };
        if let Some(annots) = span_annots(attr) {
            match self.deferred.as_mut() {
                Some(d) => d.push(annots.to_string()),
                None => out.push_str(annots),
            }
        }
        out
    }
}

fn is_latex_format(f: &str) -> bool {
    matches!(f, "latex" | "tex")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emoji::EmojiTable;
    use crate::filter::ATTR_HL;

    fn s(t: &str) -> Inline {
        Inline::Str(t.to_string())
    }

    fn hl(indices: &str, colours: &str, xs: Vec<Inline>) -> Inline {
        Inline::Span(
            Attr::default()
                .with(ATTR_HL, indices)
                .with(ATTR_COLORS, colours),
            xs,
        )
    }

    fn annot(latex: &str) -> Inline {
        Inline::Span(Attr::default().with(ATTR_ANNOTS, latex), vec![])
    }

    fn render(blocks: Vec<Block>) -> String {
        let t = EmojiTable::empty();
        write_latex(&Document { blocks }, EmojiNames::Table(&t))
    }

    #[test]
    fn paragraphs_escape_text() {
        assert_eq!(
            render(vec![Block::Para(vec![s("50%"), Inline::Space, s("&c")])]),
            "50\\% \\&c\n"
        );
    }

    #[test]
    fn two_highlights_nest() {
        let out = render(vec![Block::Para(vec![hl(
            "0,1",
            "tag-a-light,tag-b-light",
            vec![s("both")],
        )])]);
        assert!(out.starts_with(r"\highLight[tag-a-light]{\highLight[tag-b-light]{"));
        assert!(out.contains("{both}"));
    }

    #[test]
    fn annots_follow_the_run() {
        let out = render(vec![Block::Para(vec![
            hl("0", "tag-a-light", vec![s("x")]),
            annot(r"\annot{a}{A}"),
            s("y"),
        ])]);
        assert_eq!(
            out,
            "\\highLight[tag-a-light]{\\underLine[color=tag-a-dark, height=1pt, bottom=-3pt]{x}}\\annot{a}{A}y\n"
        );
    }

    #[test]
    fn headings_never_contain_annots() {
        let out = render(vec![Block::Header(
            2,
            Attr::default(),
            vec![
                s("Title"),
                Inline::Space,
                hl("0", "tag-a-light", vec![s("marked")]),
                annot(r"\annot{a}{A}"),
            ],
        )]);
        let first = out.lines().next().unwrap();
        assert!(first.starts_with("\\subsection{Title \\texorpdfstring{\\highLight"));
        assert!(first.ends_with("}{marked}}"));
        assert!(!first.contains("\\annot{"));
        assert_eq!(out.lines().nth(1), Some(r"\annot{a}{A}"));
    }

    #[test]
    fn section_levels_map_to_commands() {
        assert_eq!(section_command(1), "section");
        assert_eq!(section_command(4), "paragraph");
        assert_eq!(section_command(6), "subparagraph");
    }

    #[test]
    fn ordered_lists_keep_their_start() {
        let out = render(vec![Block::OrderedList(
            45,
            vec![vec![Block::Plain(vec![s("item")])]],
        )]);
        assert_eq!(
            out,
            "\\begin{enumerate}\n\\setcounter{enumi}{44}\n\\item item\n\\end{enumerate}\n"
        );
    }

    #[test]
    fn tables_render_rows_of_cells() {
        let cell = |t: &str| vec![Block::Plain(vec![s(t)])];
        let out = render(vec![Block::Table(Table {
            caption: vec![],
            rows: vec![vec![cell("a"), cell("b")], vec![cell("c")]],
        })]);
        assert!(out.contains("\\begin{tabular}{p{0.45\\linewidth}p{0.45\\linewidth}}"));
        assert!(out.contains("a & b \\\\\n"));
        assert!(out.contains("c &  \\\\\n"));
    }

    #[test]
    fn code_and_raw_content() {
        let out = render(vec![
            Block::CodeBlock(Attr::default(), "x_1 & y".into()),
            Block::RawBlock("html".into(), "<hr>".into()),
            Block::RawBlock("latex".into(), "\\newpage".into()),
        ]);
        assert_eq!(out, "\\begin{verbatim}\nx_1 & y\n\\end{verbatim}\n\n\\newpage\n");
    }
}
