//! Read-only arena view of a parsed HTML document.
//!
//! The HTML parser (`scraper`, html5ever underneath) does the hard part: entity decoding,
//! CRLF normalization, implied/unclosed tags. We copy the `<body>` subtree into a flat arena
//! of `{Element, Text}` nodes indexed by [`NodeId`], which the extractor, marker engine,
//! boundary detector and paragraph builder all walk. Every consumer sees the same tree, so
//! offsets agree across them by construction.
//!
//! When the source is a full document, the markup around the body (doctype, `<html>`
//! attributes, `<head>`) is kept as a [`DocumentShell`] so re-serialization can restore it.

use html_scraper::{ElementRef, Html, Node as HtmlNode, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub kind: NodeKind,
}

/// Block-level containers: whitespace-only text directly inside these is layout, not content.
pub const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "body",
    "caption",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hgroup",
    "hr",
    "html",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
    "ul",
];

/// Inline formatting elements a marker must not straddle.
pub const INLINE_FORMAT_TAGS: &[&str] = &[
    "a", "abbr", "b", "big", "cite", "code", "del", "em", "font", "i", "ins", "kbd", "mark", "q",
    "s", "samp", "small", "span", "strike", "strong", "sub", "sup", "tt", "u", "var",
];

/// Elements whose subtree contributes no characters.
pub const STRIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

pub const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn is_block_tag(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

pub fn is_inline_format_tag(name: &str) -> bool {
    INLINE_FORMAT_TAGS.contains(&name)
}

pub fn is_stripped_tag(name: &str) -> bool {
    STRIPPED_TAGS.contains(&name)
}

pub fn is_heading_tag(name: &str) -> bool {
    HEADING_TAGS.contains(&name)
}

pub fn is_void_tag(name: &str) -> bool {
    VOID_TAGS.contains(&name)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Splice `<span class="char" data-char-index>` wrappers back into their parent.
    pub unwrap_char_spans: bool,
}

/// Markup around the body of a full document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentShell {
    /// Serialized `<!DOCTYPE ...>`, if the source had one.
    pub doctype: Option<String>,
    pub html_attrs: Vec<(String, String)>,
    /// Serialized `<head>` element.
    pub head: String,
}

#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    shell: Option<DocumentShell>,
}

impl Dom {
    /// Parse `html` and keep the `<body>` subtree. Node 0 is always the body element.
    pub fn parse(html: &str) -> Self {
        Self::parse_with(html, ParseOptions::default())
    }

    pub fn parse_with(html: &str, opts: ParseOptions) -> Self {
        let doc = Html::parse_document(html);
        let mut dom = Dom {
            nodes: Vec::new(),
            shell: declares_document(html).then(|| document_shell(&doc)),
        };
        let root = dom.alloc(
            None,
            NodeKind::Element {
                name: "body".to_string(),
                attrs: Vec::new(),
            },
        );
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| doc.select(&sel).next());
        if let Some(body) = body {
            if let NodeKind::Element { attrs, .. } = &mut dom.nodes[root.0].kind {
                *attrs = attrs_of(&body);
            }
            dom.append_children(body, root, opts);
        }
        dom
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// `None` for fragments.
    pub fn shell(&self) -> Option<&DocumentShell> {
        self.shell.as_ref()
    }

    /// Everything a full document has before its body content, up to and including `<body>`.
    pub(crate) fn write_document_open(&self, out: &mut String) {
        let Some(shell) = &self.shell else { return };
        if let Some(doctype) = &shell.doctype {
            out.push_str(doctype);
        }
        write_open_tag(out, "html", &shell.html_attrs);
        out.push_str(&shell.head);
        if let NodeKind::Element { attrs, .. } = &self.nodes[0].kind {
            write_open_tag(out, "body", attrs);
        }
    }

    pub(crate) fn write_document_close(&self, out: &mut String) {
        if self.shell.is_some() {
            out.push_str("</body></html>");
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Tag name for elements, `None` for text.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(is_block_tag)
    }

    /// Ancestors from the parent outwards.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |p| self.parent(*p))
    }

    /// Previous sibling element, skipping text nodes that are only whitespace.
    pub fn prev_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        for sib in siblings[..pos].iter().rev() {
            match &self.nodes[sib.0].kind {
                NodeKind::Element { .. } => return Some(*sib),
                NodeKind::Text(t) if t.trim().is_empty() => continue,
                NodeKind::Text(_) => return None,
            }
        }
        None
    }

    fn alloc(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent,
            children: Vec::new(),
            kind,
        });
        if let Some(p) = parent {
            self.nodes[p.0].children.push(id);
        }
        id
    }

    fn push_text(&mut self, parent: NodeId, text: &str) {
        // Adjacent text nodes merge, as a DOM `normalize()` would.
        if let Some(last) = self.nodes[parent.0].children.last().copied() {
            if let NodeKind::Text(prev) = &mut self.nodes[last.0].kind {
                prev.push_str(text);
                return;
            }
        }
        self.alloc(Some(parent), NodeKind::Text(text.to_string()));
    }

    fn append_children(&mut self, el: ElementRef<'_>, parent: NodeId, opts: ParseOptions) {
        for child in el.children() {
            match child.value() {
                HtmlNode::Text(text) => {
                    let s: &str = text;
                    self.push_text(parent, s);
                }
                HtmlNode::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else {
                        continue;
                    };
                    if opts.unwrap_char_spans && is_char_span(&child_el) {
                        self.append_children(child_el, parent, opts);
                        continue;
                    }
                    let id = self.alloc(
                        Some(parent),
                        NodeKind::Element {
                            name: child_el.value().name().to_ascii_lowercase(),
                            attrs: attrs_of(&child_el),
                        },
                    );
                    self.append_children(child_el, id, opts);
                }
                // Comments, doctypes and processing instructions carry no text.
                _ => {}
            }
        }
    }
}

fn attrs_of(el: &ElementRef<'_>) -> Vec<(String, String)> {
    el.value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Whether the source spells out its own document structure rather than being a fragment.
fn declares_document(html: &str) -> bool {
    let mut rest = html.trim_start_matches('\u{feff}').trim_start();
    while let Some(after) = rest.strip_prefix("<!--") {
        let Some(end) = after.find("-->") else {
            return false;
        };
        rest = after[end + 3..].trim_start();
    }
    ["<!doctype", "<html", "<head", "<body"].iter().any(|open| {
        rest.get(..open.len())
            .is_some_and(|s| s.eq_ignore_ascii_case(open))
            && rest[open.len()..]
                .chars()
                .next()
                .map_or(true, |c| c == '>' || c == '/' || c.is_ascii_whitespace())
    })
}

fn document_shell(doc: &Html) -> DocumentShell {
    let doctype = doc.tree.root().children().find_map(|n| {
        n.value().as_doctype().map(|d| {
            let mut s = format!("<!DOCTYPE {}", d.name());
            if !d.public_id().is_empty() {
                s.push_str(&format!(" PUBLIC \"{}\"", d.public_id()));
                if !d.system_id().is_empty() {
                    s.push_str(&format!(" \"{}\"", d.system_id()));
                }
            } else if !d.system_id().is_empty() {
                s.push_str(&format!(" SYSTEM \"{}\"", d.system_id()));
            }
            s.push('>');
            s
        })
    });
    let root = doc.root_element();
    let head = root
        .children()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "head")
        .map(|el| el.html())
        .unwrap_or_default();
    DocumentShell {
        doctype,
        html_attrs: attrs_of(&root),
        head,
    }
}

fn is_char_span(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    v.name() == "span"
        && v.attr("data-char-index").is_some()
        && v.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == "char"))
}

/// Write an element's open tag (`<p class="x">`).
pub(crate) fn write_open_tag(out: &mut String, name: &str, attrs: &[(String, String)]) {
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&html_escape::encode_double_quoted_attribute(v));
        out.push('"');
    }
    out.push('>');
}

pub(crate) fn write_close_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Serialize a subtree without any character bookkeeping.
///
/// `raw_text` writes text unescaped (contents of `script`/`style`).
pub(crate) fn write_subtree(dom: &Dom, id: NodeId, raw_text: bool, out: &mut String) {
    match &dom.node(id).kind {
        NodeKind::Text(t) => {
            if raw_text {
                out.push_str(t);
            } else {
                out.push_str(&html_escape::encode_text(t));
            }
        }
        NodeKind::Element { name, attrs } => {
            write_open_tag(out, name, attrs);
            if is_void_tag(name) {
                return;
            }
            let raw = raw_text || name == "script" || name == "style";
            for c in dom.children(id) {
                write_subtree(dom, *c, raw, out);
            }
            write_close_tag(out, name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_body_into_arena() {
        let dom = Dom::parse("<p>Hello <b>bold</b></p>");
        let root = dom.root();
        assert_eq!(dom.tag(root), Some("body"));
        let p = dom.children(root)[0];
        assert_eq!(dom.tag(p), Some("p"));
        let kids = dom.children(p);
        assert_eq!(kids.len(), 2);
        assert!(matches!(&dom.node(kids[0]).kind, NodeKind::Text(t) if t == "Hello "));
        assert_eq!(dom.tag(kids[1]), Some("b"));
        assert_eq!(dom.ancestors(kids[1]).collect::<Vec<_>>(), vec![p, root]);
    }

    #[test]
    fn entities_and_crlf_are_decoded_by_the_parser() {
        let dom = Dom::parse("<p>a &amp; b\r\nc</p>");
        let p = dom.children(dom.root())[0];
        let t = dom.children(p)[0];
        assert!(matches!(&dom.node(t).kind, NodeKind::Text(s) if s == "a & b\nc"));
    }

    #[test]
    fn head_content_is_not_part_of_the_body() {
        let dom = Dom::parse("<html><head><title>T</title></head><body><p>x</p></body></html>");
        assert_eq!(dom.children(dom.root()).len(), 1);
    }

    #[test]
    fn full_documents_keep_their_shell() {
        let dom = Dom::parse(
            "<!DOCTYPE html><html lang=\"en\"><head><title>T</title></head>\
             <body class=\"j\"><p>x</p></body></html>",
        );
        let shell = dom.shell().unwrap();
        assert_eq!(shell.doctype.as_deref(), Some("<!DOCTYPE html>"));
        assert_eq!(shell.html_attrs, vec![("lang".to_string(), "en".to_string())]);
        assert_eq!(shell.head, "<head><title>T</title></head>");
        assert_eq!(dom.attr(dom.root(), "class"), Some("j"));

        let mut out = String::new();
        dom.write_document_open(&mut out);
        assert_eq!(
            out,
            "<!DOCTYPE html><html lang=\"en\"><head><title>T</title></head><body class=\"j\">"
        );
    }

    #[test]
    fn fragments_have_no_shell() {
        assert!(Dom::parse("<p>x</p>").shell().is_none());
        assert!(Dom::parse("<header>x</header>").shell().is_none());
        assert!(Dom::parse("<!-- saved --> <BODY><p>x</p></BODY>").shell().is_some());
    }

    #[test]
    fn char_spans_are_unwrapped_and_text_merged() {
        let html = r#"<p><span class="char" data-char-index="0">a</span><span class="char" data-char-index="1">b</span></p>"#;
        let dom = Dom::parse_with(
            html,
            ParseOptions {
                unwrap_char_spans: true,
            },
        );
        let p = dom.children(dom.root())[0];
        assert_eq!(dom.children(p).len(), 1);
        let t = dom.children(p)[0];
        assert!(matches!(&dom.node(t).kind, NodeKind::Text(s) if s == "ab"));
    }

    #[test]
    fn prev_element_sibling_skips_layout_whitespace() {
        let dom = Dom::parse("<ol start=\"3\"><li>a</li></ol>\n  <ol><li>b</li></ol>");
        let kids: Vec<_> = dom
            .children(dom.root())
            .iter()
            .copied()
            .filter(|c| dom.tag(*c) == Some("ol"))
            .collect();
        assert_eq!(dom.prev_element_sibling(kids[1]), Some(kids[0]));
        assert_eq!(dom.attr(kids[0], "start"), Some("3"));
    }
}
