//! Emoji name table from the LaTeX `emoji` package.
//!
//! `\emoji{name}` only accepts names listed in the package's `emoji-table.def`. The table is
//! located with `kpsewhich` (or `SPANMARK_EMOJI_TABLE`), parsed once per process and cached.
//! Any failure degrades to an empty table: every emoji then renders through the fallback
//! font instead of by name.

use crate::config::{emoji_table_path, emoji_timeout};
use crate::shellout::{has, run_stdout_bounded};
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::{LazyLock, OnceLock};

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\__emoji_def:[A-Za-z]*\s*\{([^{}]*)\}\s*\{([^{}]*)\}").expect("valid def regex")
});

static TABLE: OnceLock<EmojiTable> = OnceLock::new();

const VS16: char = '\u{fe0f}';

#[derive(Debug, Clone, Default)]
pub struct EmojiTable {
    /// Keyed by the grapheme with variation selectors removed.
    names: HashMap<String, String>,
}

impl EmojiTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut t = Self::empty();
        for (g, name) in pairs {
            t.names.entry(key(g.as_ref())).or_insert_with(|| name.into());
        }
        t
    }

    /// Parse the body of `emoji-table.def`. Lines that do not look like definitions are ignored.
    pub fn parse_def(text: &str) -> Self {
        let mut t = Self::empty();
        for caps in DEF_RE.captures_iter(text) {
            let (Some(code), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Some(glyph) = decode_codepoints(code.as_str()) else {
                continue;
            };
            let name = name.as_str().trim();
            if glyph.is_empty() || name.is_empty() {
                continue;
            }
            t.names.entry(key(&glyph)).or_insert_with(|| name.to_string());
        }
        t
    }

    pub fn lookup(&self, grapheme: &str) -> Option<&str> {
        self.names.get(&key(grapheme)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn key(g: &str) -> String {
    g.chars().filter(|c| *c != VS16).collect()
}

/// Decode `^^^^^^01f600`, `^^^^2764`, bare hex (`1F600`) or literal glyphs.
fn decode_codepoints(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if !raw.contains('^') {
        let hex_only = !raw.is_empty()
            && raw
                .split(|c: char| c == ' ' || c == '-' || c == '~')
                .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_hexdigit()));
        if hex_only && raw.len() >= 4 {
            return raw
                .split(|c: char| c == ' ' || c == '-' || c == '~')
                .map(|p| u32::from_str_radix(p, 16).ok().and_then(char::from_u32))
                .collect();
        }
        return Some(raw.to_string());
    }
    let mut out = String::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let width = if rest.starts_with("^^^^^^") {
            6
        } else if rest.starts_with("^^^^") {
            4
        } else {
            let ch = rest.chars().next()?;
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
            continue;
        };
        let hex = rest.get(width..width * 2)?;
        out.push(char::from_u32(u32::from_str_radix(hex, 16).ok()?)?);
        rest = &rest[width * 2..];
    }
    Some(out)
}

/// The process-wide table, loaded on first use.
pub fn emoji_table() -> &'static EmojiTable {
    TABLE.get_or_init(load_table)
}

fn locate_table() -> Result<PathBuf, &'static str> {
    if let Some(p) = emoji_table_path() {
        return Ok(p);
    }
    if !has("kpsewhich") {
        return Err("kpsewhich_not_found");
    }
    let mut cmd = Command::new("kpsewhich");
    cmd.arg("emoji-table.def");
    let out = run_stdout_bounded(cmd, emoji_timeout(), 64 * 1024)?;
    let path = String::from_utf8_lossy(&out).trim().to_string();
    if path.is_empty() {
        return Err("emoji_table_not_installed");
    }
    Ok(PathBuf::from(path))
}

fn load_table() -> EmojiTable {
    let path = match locate_table() {
        Ok(p) => p,
        Err(reason) => {
            tracing::warn!(reason, "emoji table unavailable; using fallback glyphs");
            return EmojiTable::empty();
        }
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let t = EmojiTable::parse_def(&text);
            tracing::debug!(path = %path.display(), names = t.len(), "loaded emoji table");
            t
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "emoji table unreadable; using fallback glyphs"
            );
            EmojiTable::empty()
        }
    }
}

/// Where emoji names come from: the lazily loaded process table, or an explicit one.
#[derive(Debug, Clone, Copy)]
pub enum EmojiNames<'a> {
    Global,
    Table(&'a EmojiTable),
}

impl EmojiNames<'_> {
    pub fn lookup(&self, grapheme: &str) -> Option<&str> {
        match self {
            EmojiNames::Global => emoji_table().lookup(grapheme),
            EmojiNames::Table(t) => t.lookup(grapheme),
        }
    }
}
