//! Pandoc JSON AST reader (`pandoc -t json`).
//!
//! Only the node types the LaTeX writer renders are typed; anything else becomes
//! `Unsupported(name)` so a newer Pandoc never fails an export outright.
//!
//! Tables are flattened to `rows -> cells -> blocks` (head, bodies, foot in that order).
//! Pandoc 3 `Figure` blocks are read as a `Div` holding their content and caption.

use serde_json::Value;

#[derive(thiserror::Error, Debug)]
pub enum PandocError {
    #[error("pandoc json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("pandoc json: malformed {node}: {detail}")]
    Shape { node: &'static str, detail: String },
}

impl From<PandocError> for spanmark_core::Error {
    fn from(e: PandocError) -> Self {
        spanmark_core::Error::Convert(e.to_string())
    }
}

type Result<T> = std::result::Result<T, PandocError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attr {
    pub id: String,
    pub classes: Vec<String>,
    pub attrs: Vec<(String, String)>,
}

impl Attr {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.push((key.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Single,
    Double,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    Str(String),
    Space,
    SoftBreak,
    LineBreak,
    Emph(Vec<Inline>),
    Strong(Vec<Inline>),
    Underline(Vec<Inline>),
    Strikeout(Vec<Inline>),
    Superscript(Vec<Inline>),
    Subscript(Vec<Inline>),
    SmallCaps(Vec<Inline>),
    Quoted(QuoteKind, Vec<Inline>),
    Code(Attr, String),
    Link(Attr, Vec<Inline>, String),
    Span(Attr, Vec<Inline>),
    RawInline(String, String),
    Note(Vec<Block>),
    Unsupported(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub caption: Vec<Block>,
    pub rows: Vec<Vec<Vec<Block>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Plain(Vec<Inline>),
    Para(Vec<Inline>),
    LineBlock(Vec<Vec<Inline>>),
    CodeBlock(Attr, String),
    RawBlock(String, String),
    BlockQuote(Vec<Block>),
    OrderedList(u32, Vec<Vec<Block>>),
    BulletList(Vec<Vec<Block>>),
    DefinitionList(Vec<(Vec<Inline>, Vec<Vec<Block>>)>),
    Header(u8, Attr, Vec<Inline>),
    HorizontalRule,
    Table(Table),
    Div(Attr, Vec<Block>),
    Unsupported(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub blocks: Vec<Block>,
}

pub fn parse_document(json: &str) -> Result<Document> {
    let v: Value = serde_json::from_str(json)?;
    let blocks = v
        .get("blocks")
        .ok_or_else(|| shape("document", "missing `blocks`"))?;
    Ok(Document {
        blocks: block_list(blocks)?,
    })
}

fn shape(node: &'static str, detail: impl Into<String>) -> PandocError {
    PandocError::Shape {
        node,
        detail: detail.into(),
    }
}

fn arr<'a>(v: &'a Value, node: &'static str) -> Result<&'a Vec<Value>> {
    v.as_array()
        .ok_or_else(|| shape(node, format!("expected array, got {v}")))
}

fn string(v: &Value, node: &'static str) -> Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| shape(node, "expected string"))
}

fn nth<'a>(items: &'a [Value], i: usize, node: &'static str) -> Result<&'a Value> {
    items
        .get(i)
        .ok_or_else(|| shape(node, format!("missing field {i}")))
}

fn tag_of(v: &Value) -> Result<&str> {
    v.get("t")
        .and_then(Value::as_str)
        .ok_or_else(|| shape("node", "missing `t`"))
}

fn content(v: &Value) -> &Value {
    v.get("c").unwrap_or(&Value::Null)
}

fn attr(v: &Value) -> Result<Attr> {
    let a = arr(v, "attr")?;
    let id = string(nth(a, 0, "attr")?, "attr")?;
    let classes = arr(nth(a, 1, "attr")?, "attr")?
        .iter()
        .map(|c| string(c, "attr"))
        .collect::<Result<Vec<_>>>()?;
    let mut attrs = Vec::new();
    for kv in arr(nth(a, 2, "attr")?, "attr")? {
        let kv = arr(kv, "attr")?;
        attrs.push((
            string(nth(kv, 0, "attr")?, "attr")?,
            string(nth(kv, 1, "attr")?, "attr")?,
        ));
    }
    Ok(Attr { id, classes, attrs })
}

fn block_list(v: &Value) -> Result<Vec<Block>> {
    arr(v, "blocks")?.iter().map(block).collect()
}

fn inline_list(v: &Value) -> Result<Vec<Inline>> {
    arr(v, "inlines")?.iter().map(inline).collect()
}

fn block_lists(v: &Value) -> Result<Vec<Vec<Block>>> {
    arr(v, "list")?.iter().map(block_list).collect()
}

fn block(v: &Value) -> Result<Block> {
    let t = tag_of(v)?;
    let c = content(v);
    Ok(match t {
        "Plain" => Block::Plain(inline_list(c)?),
        "Para" => Block::Para(inline_list(c)?),
        "LineBlock" => Block::LineBlock(
            arr(c, "LineBlock")?
                .iter()
                .map(inline_list)
                .collect::<Result<_>>()?,
        ),
        "CodeBlock" => {
            let a = arr(c, "CodeBlock")?;
            Block::CodeBlock(
                attr(nth(a, 0, "CodeBlock")?)?,
                string(nth(a, 1, "CodeBlock")?, "CodeBlock")?,
            )
        }
        "RawBlock" => {
            let a = arr(c, "RawBlock")?;
            Block::RawBlock(
                string(nth(a, 0, "RawBlock")?, "RawBlock")?,
                string(nth(a, 1, "RawBlock")?, "RawBlock")?,
            )
        }
        "BlockQuote" => Block::BlockQuote(block_list(c)?),
        "OrderedList" => {
            let a = arr(c, "OrderedList")?;
            let list_attrs = arr(nth(a, 0, "OrderedList")?, "OrderedList")?;
            let start = nth(list_attrs, 0, "OrderedList")?
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(1);
            Block::OrderedList(start, block_lists(nth(a, 1, "OrderedList")?)?)
        }
        "BulletList" => Block::BulletList(block_lists(c)?),
        "DefinitionList" => {
            let mut items = Vec::new();
            for item in arr(c, "DefinitionList")? {
                let pair = arr(item, "DefinitionList")?;
                items.push((
                    inline_list(nth(pair, 0, "DefinitionList")?)?,
                    block_lists(nth(pair, 1, "DefinitionList")?)?,
                ));
            }
            Block::DefinitionList(items)
        }
        "Header" => {
            let a = arr(c, "Header")?;
            let level = nth(a, 0, "Header")?.as_u64().unwrap_or(1).clamp(1, 6) as u8;
            Block::Header(level, attr(nth(a, 1, "Header")?)?, inline_list(nth(a, 2, "Header")?)?)
        }
        "HorizontalRule" => Block::HorizontalRule,
        "Table" => Block::Table(table(c)?),
        "Div" => {
            let a = arr(c, "Div")?;
            Block::Div(attr(nth(a, 0, "Div")?)?, block_list(nth(a, 1, "Div")?)?)
        }
        "Figure" => {
            let a = arr(c, "Figure")?;
            let mut blocks = block_list(nth(a, 2, "Figure")?)?;
            blocks.extend(caption(nth(a, 1, "Figure")?)?);
            Block::Div(attr(nth(a, 0, "Figure")?)?, blocks)
        }
        "Null" => Block::Div(Attr::default(), Vec::new()),
        other => {
            tracing::debug!(node = other, "unsupported pandoc block");
            Block::Unsupported(other.to_string())
        }
    })
}

fn caption(v: &Value) -> Result<Vec<Block>> {
    // [short caption | null, blocks]
    let a = arr(v, "Caption")?;
    block_list(nth(a, 1, "Caption")?)
}

/// Rows of a `TableHead`/`TableFoot` (`[attr, rows]`) or body row list.
fn rows(v: &Value, out: &mut Vec<Vec<Vec<Block>>>) -> Result<()> {
    for row in arr(v, "Row")? {
        // Row = [attr, cells]; Cell = [attr, align, rowspan, colspan, blocks]
        let r = arr(row, "Row")?;
        let mut cells = Vec::new();
        for cell in arr(nth(r, 1, "Row")?, "Cell")? {
            let cell = arr(cell, "Cell")?;
            cells.push(block_list(nth(cell, 4, "Cell")?)?);
        }
        out.push(cells);
    }
    Ok(())
}

fn table(c: &Value) -> Result<Table> {
    // [attr, caption, colspecs, head, bodies, foot]
    let a = arr(c, "Table")?;
    let mut t = Table {
        caption: caption(nth(a, 1, "Table")?)?,
        rows: Vec::new(),
    };
    let head = arr(nth(a, 3, "Table")?, "TableHead")?;
    rows(nth(head, 1, "TableHead")?, &mut t.rows)?;
    for body in arr(nth(a, 4, "Table")?, "TableBody")? {
        // TableBody = [attr, row-head-columns, head rows, body rows]
        let b = arr(body, "TableBody")?;
        rows(nth(b, 2, "TableBody")?, &mut t.rows)?;
        rows(nth(b, 3, "TableBody")?, &mut t.rows)?;
    }
    let foot = arr(nth(a, 5, "Table")?, "TableFoot")?;
    rows(nth(foot, 1, "TableFoot")?, &mut t.rows)?;
    Ok(t)
}

fn inline(v: &Value) -> Result<Inline> {
    let t = tag_of(v)?;
    let c = content(v);
    Ok(match t {
        "Str" => Inline::Str(string(c, "Str")?),
        "Space" => Inline::Space,
        "SoftBreak" => Inline::SoftBreak,
        "LineBreak" => Inline::LineBreak,
        "Emph" => Inline::Emph(inline_list(c)?),
        "Strong" => Inline::Strong(inline_list(c)?),
        "Underline" => Inline::Underline(inline_list(c)?),
        "Strikeout" => Inline::Strikeout(inline_list(c)?),
        "Superscript" => Inline::Superscript(inline_list(c)?),
        "Subscript" => Inline::Subscript(inline_list(c)?),
        "SmallCaps" => Inline::SmallCaps(inline_list(c)?),
        "Quoted" => {
            let a = arr(c, "Quoted")?;
            let kind = match tag_of(nth(a, 0, "Quoted")?)? {
                "SingleQuote" => QuoteKind::Single,
                _ => QuoteKind::Double,
            };
            Inline::Quoted(kind, inline_list(nth(a, 1, "Quoted")?)?)
        }
        "Code" => {
            let a = arr(c, "Code")?;
            Inline::Code(attr(nth(a, 0, "Code")?)?, string(nth(a, 1, "Code")?, "Code")?)
        }
        "Link" => {
            let a = arr(c, "Link")?;
            let target = arr(nth(a, 2, "Link")?, "Link")?;
            Inline::Link(
                attr(nth(a, 0, "Link")?)?,
                inline_list(nth(a, 1, "Link")?)?,
                string(nth(target, 0, "Link")?, "Link")?,
            )
        }
        "Span" => {
            let a = arr(c, "Span")?;
            Inline::Span(attr(nth(a, 0, "Span")?)?, inline_list(nth(a, 1, "Span")?)?)
        }
        "RawInline" => {
            let a = arr(c, "RawInline")?;
            Inline::RawInline(
                string(nth(a, 0, "RawInline")?, "RawInline")?,
                string(nth(a, 1, "RawInline")?, "RawInline")?,
            )
        }
        "Note" => Inline::Note(block_list(c)?),
        other => {
            tracing::debug!(node = other, "unsupported pandoc inline");
            Inline::Unsupported(other.to_string())
        }
    })
}

/// Plain text of an inline list (no formatting, markers kept as-is).
pub fn plain_text(inlines: &[Inline]) -> String {
    let mut out = String::new();
    push_plain(inlines, &mut out);
    out
}

fn push_plain(inlines: &[Inline], out: &mut String) {
    for i in inlines {
        match i {
            Inline::Str(s) | Inline::Code(_, s) => out.push_str(s),
            Inline::Space | Inline::SoftBreak | Inline::LineBreak => out.push(' '),
            Inline::Emph(xs)
            | Inline::Strong(xs)
            | Inline::Underline(xs)
            | Inline::Strikeout(xs)
            | Inline::Superscript(xs)
            | Inline::Subscript(xs)
            | Inline::SmallCaps(xs)
            | Inline::Quoted(_, xs)
            | Inline::Link(_, xs, _)
            | Inline::Span(_, xs) => push_plain(xs, out),
            Inline::RawInline(..) | Inline::Note(_) | Inline::Unsupported(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_paragraphs_headers_and_inlines() {
        let json = r#"{"pandoc-api-version":[1,23,1],"meta":{},"blocks":[
            {"t":"Header","c":[2,["intro",["x"],[["k","v"]]],[{"t":"Str","c":"Intro"}]]},
            {"t":"Para","c":[{"t":"Str","c":"Hello"},{"t":"Space"},
                {"t":"Strong","c":[{"t":"Str","c":"bold"}]},
                {"t":"Link","c":[["",[],[]],[{"t":"Str","c":"l"}],["https://x.test",""]]}]}
        ]}"#;
        let doc = parse_document(json).unwrap();
        assert_eq!(doc.blocks.len(), 2);
        match &doc.blocks[0] {
            Block::Header(2, a, inl) => {
                assert_eq!(a.id, "intro");
                assert_eq!(a.get("k"), Some("v"));
                assert_eq!(plain_text(inl), "Intro");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &doc.blocks[1] {
            Block::Para(inl) => {
                assert_eq!(plain_text(inl), "Hello boldl");
                assert!(matches!(&inl[3], Inline::Link(_, _, url) if url == "https://x.test"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ordered_list_keeps_start() {
        let json = r#"{"blocks":[{"t":"OrderedList","c":[[45,{"t":"Decimal"},{"t":"Period"}],
            [[{"t":"Plain","c":[{"t":"Str","c":"a"}]}]]]}]}"#;
        let doc = parse_document(json).unwrap();
        assert!(matches!(&doc.blocks[0], Block::OrderedList(45, items) if items.len() == 1));
    }

    #[test]
    fn tables_flatten_to_rows_of_cells() {
        let cell = |s: &str| {
            format!(
                r#"[["",[],[]],{{"t":"AlignDefault"}},1,1,[{{"t":"Plain","c":[{{"t":"Str","c":"{s}"}}]}}]]"#
            )
        };
        let row = |a: &str, b: &str| format!(r#"[["",[],[]],[{},{}]]"#, cell(a), cell(b));
        let json = format!(
            r#"{{"blocks":[{{"t":"Table","c":[["",[],[]],[null,[]],[],
                [["",[],[]],[{}]],
                [[["",[],[]],0,[],[{}]]],
                [["",[],[]],[]]]}}]}}"#,
            row("h1", "h2"),
            row("a", "b")
        );
        let doc = parse_document(&json).unwrap();
        let Block::Table(t) = &doc.blocks[0] else {
            panic!("expected table");
        };
        assert_eq!(t.rows.len(), 2);
        assert_eq!(t.rows[1].len(), 2);
        assert_eq!(t.rows[1][0], vec![Block::Plain(vec![Inline::Str("a".into())])]);
    }

    #[test]
    fn unknown_nodes_become_unsupported() {
        let json = r#"{"blocks":[{"t":"Para","c":[{"t":"Math","c":[{"t":"InlineMath"},"x"]}]},
            {"t":"FancyNewBlock","c":[]}]}"#;
        let doc = parse_document(json).unwrap();
        assert_eq!(
            doc.blocks,
            vec![
                Block::Para(vec![Inline::Unsupported("Math".into())]),
                Block::Unsupported("FancyNewBlock".into())
            ]
        );
    }

    #[test]
    fn malformed_json_is_a_convert_error() {
        let err: spanmark_core::Error = parse_document("{\"blocks\": 3}").unwrap_err().into();
        assert!(matches!(err, spanmark_core::Error::Convert(_)));
        assert!(parse_document("not json").is_err());
    }
}
