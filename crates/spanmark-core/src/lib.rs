use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conversion failed: {0}")]
    Convert(String),
    #[error("latex compile failed: {0}")]
    Compile(CompileFailure),
    #[error("not configured: {0}")]
    NotConfigured(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structured LaTeX failure, built from the compiler log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileFailure {
    /// First `! ...` error line of the log (without the bang).
    pub message: String,
    /// 1-based line in the `.tex` source, when the log names one (`l.<n>`).
    pub line: Option<usize>,
    /// The offending source line, when `line` is known and in range.
    pub context: Option<String>,
    /// Last lines of the log, bounded.
    pub log_tail: String,
}

impl std::fmt::Display for CompileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(n) => write!(f, "{} (line {n})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A highlight record as produced by the annotation layer.
///
/// Offsets index the document's character sequence; `end_char` is exclusive.
/// Offsets are signed: a negative start is rejected per record (see [`validate_span`]),
/// it does not fail deserialization of the whole batch.
///
/// The legacy `start_word`/`end_word` names are read too; when a record carries both
/// spellings, `start_char`/`end_char` win.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "HighlightRecord")]
pub struct Highlight {
    pub start_char: i64,
    pub end_char: i64,
    pub tag: String,
    pub author: String,
    pub text: String,
    pub comments: Vec<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paragraph_ref: Option<String>,
}

/// Wire form of [`Highlight`].
#[derive(Deserialize)]
struct HighlightRecord {
    start_char: Option<i64>,
    start_word: Option<i64>,
    end_char: Option<i64>,
    end_word: Option<i64>,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    comments: Vec<Comment>,
    #[serde(default)]
    paragraph_ref: Option<String>,
}

impl TryFrom<HighlightRecord> for Highlight {
    type Error = String;

    fn try_from(r: HighlightRecord) -> std::result::Result<Self, Self::Error> {
        let start_char = r
            .start_char
            .or(r.start_word)
            .ok_or_else(|| "missing field `start_char`".to_string())?;
        let end_char = r
            .end_char
            .or(r.end_word)
            .ok_or_else(|| "missing field `end_char`".to_string())?;
        Ok(Self {
            start_char,
            end_char,
            tag: r.tag,
            author: r.author,
            text: r.text,
            comments: r.comments,
            paragraph_ref: r.paragraph_ref,
        })
    }
}

impl Highlight {
    pub fn new(start_char: i64, end_char: i64, tag: impl Into<String>) -> Self {
        Self {
            start_char,
            end_char,
            tag: tag.into(),
            ..Self::default()
        }
    }

    /// Validate this record against a document of `doc_chars` characters.
    pub fn span(&self, doc_chars: usize) -> std::result::Result<Range<usize>, SpanRejection> {
        validate_span(self.start_char, self.end_char, doc_chars)
    }

    pub fn light_colour(&self) -> String {
        light_colour(&self.tag)
    }

    pub fn dark_colour(&self) -> String {
        dark_colour(&self.tag)
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanRejection {
    #[error("negative start offset {start}")]
    NegativeStart { start: i64 },
    #[error("empty or inverted span {start}..{end}")]
    Empty { start: i64, end: i64 },
    #[error("span {start}..{end} runs past document end ({len} chars)")]
    PastEnd { start: i64, end: i64, len: usize },
}

pub fn validate_span(
    start: i64,
    end: i64,
    doc_chars: usize,
) -> std::result::Result<Range<usize>, SpanRejection> {
    if start < 0 {
        return Err(SpanRejection::NegativeStart { start });
    }
    if start >= end {
        return Err(SpanRejection::Empty { start, end });
    }
    let len = doc_chars as i64;
    if end > len {
        return Err(SpanRejection::PastEnd {
            start,
            end,
            len: doc_chars,
        });
    }
    Ok(start as usize..end as usize)
}

/// Parse highlight records from JSON.
///
/// Accepts either a bare array or an object with a `highlights` array (the shape the
/// persistence layer exports).
pub fn parse_highlights(json: &str) -> Result<Vec<Highlight>> {
    let v: serde_json::Value =
        serde_json::from_str(json).map_err(|e| Error::InvalidInput(e.to_string()))?;
    let arr = match v {
        serde_json::Value::Array(_) => v,
        serde_json::Value::Object(mut o) => o
            .remove("highlights")
            .ok_or_else(|| Error::InvalidInput("missing `highlights` array".to_string()))?,
        _ => {
            return Err(Error::InvalidInput(
                "expected a highlight array or object".to_string(),
            ))
        }
    };
    serde_json::from_value(arr).map_err(|e| Error::InvalidInput(e.to_string()))
}

/// Character offset -> paragraph number.
pub type ParagraphMap = BTreeMap<usize, u32>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NumberingMode {
    /// Sequentially assigned numbers.
    Auto,
    /// Numbers copied from `li[value]`.
    Source,
}

/// How a caller asks for numbering: a fixed mode, or let the document decide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NumberingChoice {
    Auto,
    Source,
    #[default]
    Detect,
}

impl std::str::FromStr for NumberingChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "source" => Ok(Self::Source),
            "detect" | "" => Ok(Self::Detect),
            other => Err(Error::InvalidInput(format!(
                "unknown numbering mode: {other}"
            ))),
        }
    }
}

/// Colour used for the tier-3+ collapsed underline.
pub const MANY_DARK: &str = "many-dark";

/// Stable, LaTeX-safe identifier for a tag (`"Legal Test"` -> `"legal-test"`).
///
/// Non-ASCII letters and digits become `u<hex>` words (`"判例"` -> `"u5224-u4f8b"`), so
/// distinct tags keep distinct slugs.
pub fn tag_slug(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    let mut last_dash = true;
    for ch in tag.chars().flat_map(|c| c.to_lowercase()) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if ch.is_alphanumeric() {
            if !last_dash {
                out.push('-');
            }
            out.push_str(&format!("u{:x}-", ch as u32));
            last_dash = true;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untagged".to_string()
    } else {
        out
    }
}

pub fn light_colour(tag: &str) -> String {
    format!("tag-{}-light", tag_slug(tag))
}

pub fn dark_colour(tag: &str) -> String {
    format!("tag-{}-dark", tag_slug(tag))
}

/// Map a light colour name to its dark partner (`tag-a-light` -> `tag-a-dark`).
pub fn dark_for_light(light: &str) -> String {
    match light.strip_suffix("-light") {
        Some(stem) => format!("{stem}-dark"),
        None => format!("{light}-dark"),
    }
}

/// HTML -> Pandoc JSON AST. The production implementation shells out to `pandoc`.
pub trait DocumentConverter: Send + Sync {
    fn name(&self) -> &'static str;
    fn html_to_pandoc_json(&self, html: &str) -> Result<String>;
}

/// `.tex` -> PDF. The production implementation shells out to `lualatex`.
pub trait LatexCompiler: Send + Sync {
    fn name(&self) -> &'static str;
    /// Compile `tex` and write the PDF to `out`; returns the written path.
    fn compile(&self, tex: &str, out: &Path) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_word_offsets_are_accepted() {
        let h: Highlight =
            serde_json::from_str(r#"{"start_word": 3, "end_word": 9, "tag": "jurisdiction"}"#)
                .unwrap();
        assert_eq!(h.start_char, 3);
        assert_eq!(h.end_char, 9);
        assert_eq!(h.span(20), Ok(3..9));
    }

    #[test]
    fn char_offsets_win_over_legacy_word_offsets() {
        let h: Highlight = serde_json::from_str(
            r#"{"start_char": 1, "start_word": 30, "end_word": 90, "end_char": 4}"#,
        )
        .unwrap();
        assert_eq!((h.start_char, h.end_char), (1, 4));
        assert!(h.tag.is_empty());

        let batch = parse_highlights(
            r#"[{"start_char":0,"start_word":0,"end_char":2,"end_word":2},
                {"start_word":1,"end_word":3}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].span(5), Ok(1..3));
    }

    #[test]
    fn missing_offsets_fail_with_the_field_name() {
        let err = serde_json::from_str::<Highlight>(r#"{"end_char": 3}"#).unwrap_err();
        assert!(err.to_string().contains("start_char"), "{err}");
    }

    #[test]
    fn span_validation_names_the_reason() {
        assert_eq!(
            validate_span(-1, 4, 10),
            Err(SpanRejection::NegativeStart { start: -1 })
        );
        assert_eq!(
            validate_span(4, 4, 10),
            Err(SpanRejection::Empty { start: 4, end: 4 })
        );
        assert!(matches!(
            validate_span(2, 11, 10),
            Err(SpanRejection::PastEnd { .. })
        ));
        assert_eq!(validate_span(0, 10, 10), Ok(0..10));
    }

    #[test]
    fn parse_highlights_accepts_wrapped_and_bare_arrays() {
        let bare = parse_highlights(r#"[{"start_char":0,"end_char":5,"tag":"a"}]"#).unwrap();
        let wrapped =
            parse_highlights(r#"{"highlights":[{"start_char":0,"end_char":5,"tag":"a"}]}"#)
                .unwrap();
        assert_eq!(bare, wrapped);
        assert!(parse_highlights("42").is_err());
    }

    #[test]
    fn tag_colours_are_slugged() {
        assert_eq!(tag_slug("Legal Test"), "legal-test");
        assert_eq!(tag_slug("  "), "untagged");
        assert_eq!(tag_slug("🙂"), "untagged");
        assert_eq!(light_colour("a"), "tag-a-light");
        assert_eq!(dark_for_light("tag-a-light"), "tag-a-dark");
        assert_eq!(dark_for_light("custom"), "custom-dark");
    }

    #[test]
    fn non_ascii_tags_keep_distinct_slugs() {
        assert_eq!(tag_slug("判例"), "u5224-u4f8b");
        assert_eq!(tag_slug("事実"), "u4e8b-u5b9f");
        assert_eq!(tag_slug("Café au lait"), "caf-ue9-au-lait");
        assert_ne!(light_colour("判例"), light_colour("事実"));
    }

    #[test]
    fn numbering_choice_parses() {
        assert_eq!(
            "Source".parse::<NumberingChoice>().unwrap(),
            NumberingChoice::Source
        );
        assert!("bogus".parse::<NumberingChoice>().is_err());
    }
}
