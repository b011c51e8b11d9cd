//! Annotation bodies for `\annot{<tag-slug>}{...}`.

use crate::emoji::EmojiNames;
use crate::latex::escape_latex;
use spanmark_core::{tag_slug, Highlight};

fn squash_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `\annot{slug}{\textbf{Tag} [ref]\par \textit{author}\par \textbf{who}: comment ...}`.
///
/// `para_ref` is the record's own `paragraph_ref` when set, else one computed by the caller.
pub fn format_annot(h: &Highlight, para_ref: Option<&str>, emoji: EmojiNames<'_>) -> String {
    let esc = |s: &str| escape_latex(&squash_ws(s), emoji);
    let tag = if h.tag.trim().is_empty() {
        "Untagged".to_string()
    } else {
        esc(&h.tag)
    };
    let mut body = format!("\\textbf{{{tag}}}");
    if let Some(r) = para_ref.map(str::trim).filter(|r| !r.is_empty()) {
        body.push(' ');
        body.push_str(&esc(r));
    }
    if !h.author.trim().is_empty() {
        body.push_str("\\par \\textit{");
        body.push_str(&esc(&h.author));
        body.push('}');
    }
    for c in &h.comments {
        if c.text.trim().is_empty() {
            continue;
        }
        body.push_str("\\par ");
        if !c.author.trim().is_empty() {
            body.push_str(&format!("\\textbf{{{}}}: ", esc(&c.author)));
        }
        body.push_str(&esc(&c.text));
    }
    format!("\\annot{{{}}}{{{body}}}", tag_slug(&h.tag))
}
