//! Canonical character extraction.
//!
//! Notes:
//! - One walk produces both the logical character sequence and a canonical serialization of
//!   the document, so every character knows the exact byte range it occupies in that HTML.
//! - Whitespace runs collapse per text node; whitespace-only text directly inside a block
//!   container contributes nothing; `<br>` is one `\n`; stripped elements contribute nothing.
//! - The serialization keeps every text node's original text (`<pre>` newlines, `&nbsp;`)
//!   and a full document's doctype, `<head>` and `<body>` attributes. A collapsed whitespace
//!   character owns the bytes of its whole run, so text between two character byte offsets
//!   reads back as exactly those characters once whitespace runs are collapsed.

use crate::dom::{
    is_block_tag, is_inline_format_tag, is_stripped_tag, is_void_tag, write_close_tag,
    write_open_tag, write_subtree, Dom, NodeId, NodeKind,
};
use std::ops::Range;

/// One logical character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSlot {
    pub ch: char,
    /// Text node (or `<br>` element) the character came from.
    pub node: NodeId,
    /// Index into [`Extraction::runs`].
    pub run: usize,
    /// Byte range in the canonical serialization. A collapsed space covers its whole run.
    pub bytes: Range<usize>,
}

impl CharSlot {
    pub fn is_line_break(&self) -> bool {
        self.ch == '\n'
    }
}

/// A contributing text node (or a `<br>`) with the ancestor context it was found under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRun {
    pub node: NodeId,
    pub chars: Range<usize>,
    pub bytes: Range<usize>,
    /// Innermost block-level ancestor.
    pub block: NodeId,
    /// Open inline formatting elements between `block` and the text, outermost first.
    pub inline: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterSequence {
    slots: Vec<CharSlot>,
}

impl CharacterSequence {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&CharSlot> {
        self.slots.get(i)
    }

    pub fn slots(&self) -> &[CharSlot] {
        &self.slots
    }

    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        self.slots.iter().map(|s| s.ch)
    }

    pub fn text(&self) -> String {
        self.chars().collect()
    }

    /// `"".join(sequence[range])`, clamped to the sequence.
    pub fn slice(&self, range: Range<usize>) -> String {
        let end = range.end.min(self.slots.len());
        let start = range.start.min(end);
        self.slots[start..end].iter().map(|s| s.ch).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharWrap {
    /// Plain canonical serialization.
    #[default]
    None,
    /// Wrap every logical character in `<span class="char" data-char-index="N">`.
    Spans,
}

/// Everything one extraction pass knows about a document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub dom: Dom,
    /// Canonical serialization: the body content, inside the document shell when there is one.
    pub html: String,
    pub sequence: CharacterSequence,
    pub runs: Vec<TextRun>,
}

impl Extraction {
    pub fn from_html(html: &str) -> Self {
        Self::from_dom(Dom::parse(html), CharWrap::None)
    }

    pub fn from_dom(dom: Dom, wrap: CharWrap) -> Self {
        let mut b = LayoutBuilder {
            dom: &dom,
            wrap,
            out: String::new(),
            slots: Vec::new(),
            runs: Vec::new(),
            open: vec![dom.root()],
        };
        dom.write_document_open(&mut b.out);
        for c in dom.children(dom.root()) {
            b.node(*c);
        }
        dom.write_document_close(&mut b.out);
        let LayoutBuilder {
            out, slots, runs, ..
        } = b;
        Extraction {
            html: out,
            sequence: CharacterSequence { slots },
            runs,
            dom,
        }
    }

    /// Run that owns character `offset`.
    pub fn run_at(&self, offset: usize) -> Option<&TextRun> {
        self.sequence.get(offset).map(|s| &self.runs[s.run])
    }
}

/// `extract(html) -> CharacterSequence`.
pub fn extract(html: &str) -> CharacterSequence {
    Extraction::from_html(html).sequence
}

/// Convenience: the extracted characters as a `String`.
pub fn extract_text(html: &str) -> String {
    extract(html).text()
}

fn is_collapsible(ch: char) -> bool {
    ch.is_whitespace() || ch == '\u{a0}'
}

/// What a logical character is written as.
enum Glyph<'a> {
    /// Source text: one character, or a whole whitespace run collapsed to one space.
    Text(&'a str),
    /// A `<br>` element with its attributes.
    Break(&'a [(String, String)]),
}

struct LayoutBuilder<'a> {
    dom: &'a Dom,
    wrap: CharWrap,
    out: String,
    slots: Vec<CharSlot>,
    runs: Vec<TextRun>,
    /// Open elements, root first.
    open: Vec<NodeId>,
}

impl LayoutBuilder<'_> {
    fn node(&mut self, id: NodeId) {
        let dom = self.dom;
        match &dom.node(id).kind {
            NodeKind::Text(text) => self.text(id, text),
            NodeKind::Element { name, attrs } => {
                if name == "br" {
                    self.line_break(id, attrs);
                    return;
                }
                if is_stripped_tag(name) {
                    write_subtree(dom, id, false, &mut self.out);
                    return;
                }
                write_open_tag(&mut self.out, name, attrs);
                if is_void_tag(name) {
                    return;
                }
                self.open.push(id);
                for c in dom.children(id) {
                    self.node(*c);
                }
                self.open.pop();
                write_close_tag(&mut self.out, name);
            }
        }
    }

    fn context(&self) -> (NodeId, Vec<NodeId>) {
        let dom = self.dom;
        let block_pos = self
            .open
            .iter()
            .rposition(|id| dom.tag(*id).is_some_and(is_block_tag))
            .unwrap_or(0);
        let inline = self.open[block_pos + 1..]
            .iter()
            .copied()
            .filter(|id| dom.tag(*id).is_some_and(is_inline_format_tag))
            .collect();
        (self.open[block_pos], inline)
    }

    fn text(&mut self, id: NodeId, text: &str) {
        let parent_is_block = self.dom.parent(id).map_or(true, |p| self.dom.is_block(p));
        if parent_is_block && text.trim().is_empty() {
            // Indentation between sibling blocks: keep it in the HTML, count nothing.
            self.out.push_str(&html_escape::encode_text(text));
            return;
        }
        let run = self.runs.len();
        let char_start = self.slots.len();
        let byte_start = self.out.len();
        let mut chars = text.char_indices().peekable();
        while let Some((i, ch)) = chars.next() {
            let mut end = i + ch.len_utf8();
            if is_collapsible(ch) {
                while let Some(&(j, next)) = chars.peek() {
                    if !is_collapsible(next) {
                        break;
                    }
                    end = j + next.len_utf8();
                    chars.next();
                }
                self.push_char(' ', id, run, Glyph::Text(&text[i..end]));
            } else {
                self.push_char(ch, id, run, Glyph::Text(&text[i..end]));
            }
        }
        let (block, inline) = self.context();
        self.runs.push(TextRun {
            node: id,
            chars: char_start..self.slots.len(),
            bytes: byte_start..self.out.len(),
            block,
            inline,
        });
    }

    fn line_break(&mut self, id: NodeId, attrs: &[(String, String)]) {
        let run = self.runs.len();
        let char_start = self.slots.len();
        let byte_start = self.out.len();
        self.push_char('\n', id, run, Glyph::Break(attrs));
        let (block, inline) = self.context();
        self.runs.push(TextRun {
            node: id,
            chars: char_start..self.slots.len(),
            bytes: byte_start..self.out.len(),
            block,
            inline,
        });
    }

    fn push_char(&mut self, ch: char, node: NodeId, run: usize, glyph: Glyph<'_>) {
        let start = self.out.len();
        if self.wrap == CharWrap::Spans {
            self.out.push_str("<span class=\"char\" data-char-index=\"");
            self.out.push_str(&self.slots.len().to_string());
            self.out.push_str("\">");
        }
        match glyph {
            Glyph::Break(attrs) => write_open_tag(&mut self.out, "br", attrs),
            Glyph::Text(source) => self.out.push_str(&html_escape::encode_text(source)),
        }
        if self.wrap == CharWrap::Spans {
            self.out.push_str("</span>");
        }
        self.slots.push(CharSlot {
            ch,
            node,
            run,
            bytes: start..self.out.len(),
        });
    }
}

/// Decode document bytes: UTF-8, falling back to Latin-1 (every byte is one code point).
pub fn decode_document(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.strip_prefix('\u{feff}').unwrap_or(s).to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Best-effort guess for whether text is HTML rather than plain prose.
pub fn looks_like_html(text: &str) -> bool {
    let head: String = text.trim_start().chars().take(4096).collect();
    let lower = head.to_ascii_lowercase();
    // Common prefixes for full documents; keep it conservative.
    if lower.starts_with("<!doctype") || lower.starts_with("<html") || lower.starts_with("<body")
    {
        return true;
    }
    [
        "<p", "<div", "<br", "<span", "<li", "<ol", "<ul", "<table", "<h1", "<h2", "<h3",
        "<blockquote", "<pre", "<section", "<article",
    ]
    .iter()
    .any(|tag| {
        lower.match_indices(tag).any(|(i, _)| {
            matches!(
                lower.as_bytes().get(i + tag.len()),
                Some(b'>') | Some(b' ') | Some(b'/') | Some(b'\n') | Some(b'\t')
            )
        })
    })
}

/// Wrap plain text as HTML: blank lines separate `<p>`, single newlines become `<br>`.
pub fn plain_text_to_html(text: &str) -> String {
    let t = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::new();
    let mut para: Vec<&str> = Vec::new();
    let flush = |para: &mut Vec<&str>, out: &mut String| {
        if para.is_empty() {
            return;
        }
        out.push_str("<p>");
        for (i, line) in para.iter().enumerate() {
            if i > 0 {
                out.push_str("<br>");
            }
            out.push_str(&html_escape::encode_text(line));
        }
        out.push_str("</p>\n");
        para.clear();
    };
    for line in t.split('\n') {
        if line.trim().is_empty() {
            flush(&mut para, &mut out);
        } else {
            para.push(line);
        }
    }
    flush(&mut para, &mut out);
    out
}
