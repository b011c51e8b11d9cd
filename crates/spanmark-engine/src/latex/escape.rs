//! LaTeX-safe text.
//!
//! Works on grapheme clusters: an emoji ZWJ sequence or a flag must reach `\emoji{}` or the
//! fallback font whole, and CJK runs are wrapped as a unit so the font switch happens once.

use crate::emoji::EmojiNames;
use unicode_segmentation::UnicodeSegmentation;

/// Drop characters no TeX engine should see: C0/C1 controls (tab, LF, CR kept), DEL and
/// Unicode noncharacters. Surrogates cannot occur in a Rust `str`.
pub fn strip_invalid_chars(s: &str) -> String {
    s.chars().filter(|c| !is_invalid(*c)).collect()
}

fn is_invalid(c: char) -> bool {
    let u = c as u32;
    match u {
        0x09 | 0x0a | 0x0d => false,
        0x00..=0x1f | 0x7f..=0x9f => true,
        0xfdd0..=0xfdef => true,
        _ => (u & 0xfffe) == 0xfffe,
    }
}

pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4e00..=0x9fff     // CJK Unified Ideographs
        | 0x3400..=0x4dbf   // Extension A
        | 0x3040..=0x309f   // Hiragana
        | 0x30a0..=0x30ff   // Katakana
        | 0xac00..=0xd7af   // Hangul syllables
        | 0x1100..=0x11ff   // Hangul Jamo
        | 0x3130..=0x318f)  // Hangul compatibility Jamo
}

fn is_pictograph(c: char) -> bool {
    matches!(c as u32, 0x1f000..=0x1faff)
}

/// BMP symbols that are emoji only with an explicit emoji presentation selector.
fn is_text_default_symbol(c: char) -> bool {
    matches!(c as u32,
        0x00a9 | 0x00ae | 0x203c | 0x2049 | 0x2122 | 0x2139
        | 0x2194..=0x21aa
        | 0x2300..=0x23ff
        | 0x25aa..=0x25fe
        | 0x2600..=0x27bf
        | 0x2b00..=0x2bff
        | 0x3030 | 0x303d | 0x3297 | 0x3299)
}

pub fn is_emoji_grapheme(g: &str) -> bool {
    let Some(first) = g.chars().next() else {
        return false;
    };
    if g.chars().any(is_pictograph) || g.contains('\u{20e3}') {
        return true;
    }
    is_text_default_symbol(first) && g.contains('\u{fe0f}')
}

fn push_special(c: char, out: &mut String) {
    match c {
        '\\' => out.push_str("\\textbackslash{}"),
        '&' => out.push_str("\\&"),
        '%' => out.push_str("\\%"),
        '$' => out.push_str("\\$"),
        '#' => out.push_str("\\#"),
        '_' => out.push_str("\\_"),
        '{' => out.push_str("\\{"),
        '}' => out.push_str("\\}"),
        '~' => out.push_str("\\textasciitilde{}"),
        '^' => out.push_str("\\textasciicircum{}"),
        c if is_invalid(c) => {}
        c => out.push(c),
    }
}

/// Escape the ten LaTeX specials and drop invalid characters. No CJK/emoji handling.
pub fn escape_specials(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        push_special(c, &mut out);
    }
    out
}

/// Full escaper for body text.
pub fn escape_latex(s: &str, emoji: EmojiNames<'_>) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    let mut cjk = String::new();
    for g in s.graphemes(true) {
        let first = g.chars().next().unwrap_or(' ');
        if is_cjk(first) {
            for c in g.chars() {
                push_special(c, &mut cjk);
            }
            continue;
        }
        flush_cjk(&mut cjk, &mut out);
        if is_emoji_grapheme(g) {
            match emoji.lookup(g) {
                Some(name) => {
                    out.push_str("\\emoji{");
                    out.push_str(name);
                    out.push('}');
                }
                None => {
                    out.push_str("\\emojifallbackchar{");
                    out.push_str(&escape_specials(g));
                    out.push('}');
                }
            }
            continue;
        }
        for c in g.chars() {
            push_special(c, &mut out);
        }
    }
    flush_cjk(&mut cjk, &mut out);
    out
}

fn flush_cjk(cjk: &mut String, out: &mut String) {
    if cjk.is_empty() {
        return;
    }
    out.push_str("\\cjktext{");
    out.push_str(cjk);
    out.push('}');
    cjk.clear();
}

/// Escaper for PDF strings (bookmarks, `\texorpdfstring` second argument): specials escaped,
/// emoji dropped, CJK left as plain Unicode.
pub fn escape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for g in s.graphemes(true) {
        if is_emoji_grapheme(g) {
            continue;
        }
        for c in g.chars() {
            push_special(c, &mut out);
        }
    }
    out
}

/// Escape a URL for `\href`.
pub fn escape_url(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    for c in url.chars() {
        match c {
            '\\' | '{' | '}' | '%' | '#' => {
                out.push('\\');
                out.push(c);
            }
            c if is_invalid(c) || c.is_whitespace() => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emoji::EmojiTable;

    fn esc(s: &str) -> String {
        escape_latex(s, EmojiNames::Table(&EmojiTable::empty()))
    }

    #[test]
    fn escapes_the_ten_specials() {
        assert_eq!(
            esc(r"\ & % $ # _ { } ~ ^"),
            r"\textbackslash{} \& \% \$ \# \_ \{ \} \textasciitilde{} \textasciicircum{}"
        );
    }

    #[test]
    fn strips_controls_and_noncharacters_but_keeps_whitespace() {
        let s = "a\u{0}\u{7}\tb\r\nc\u{7f}\u{85}d\u{fdd0}\u{fffe}\u{1fffe}e";
        assert_eq!(esc(s), "a\tb\r\ncde");
        assert_eq!(strip_invalid_chars("x\u{1b}y"), "xy");
    }

    #[test]
    fn wraps_maximal_cjk_runs() {
        assert_eq!(esc("see 漢字かな and 한국어."), "see \\cjktext{漢字かな} and \\cjktext{한국어}.");
        assert_eq!(esc("カタカナ"), "\\cjktext{カタカナ}");
    }

    #[test]
    fn named_emoji_use_the_table_and_others_fall_back() {
        let t = EmojiTable::from_pairs([("😀", "grinning")]);
        let names = EmojiNames::Table(&t);
        assert_eq!(escape_latex("hi 😀!", names), "hi \\emoji{grinning}!");
        assert_eq!(escape_latex("🦀", names), "\\emojifallbackchar{🦀}");
        // ZWJ family stays one cluster.
        let fam = "👨\u{200d}👩\u{200d}👧";
        assert_eq!(escape_latex(fam, names), format!("\\emojifallbackchar{{{fam}}}"));
    }

    #[test]
    fn text_symbols_need_presentation_selector() {
        assert_eq!(esc("\u{2764}"), "\u{2764}");
        assert_eq!(esc("\u{2764}\u{fe0f}"), "\\emojifallbackchar{\u{2764}\u{fe0f}}");
        assert_eq!(esc("#\u{fe0f}\u{20e3}"), "\\emojifallbackchar{\\#\u{fe0f}\u{20e3}}");
        assert!(!is_emoji_grapheme("a"));
    }

    #[test]
    fn pdf_strings_drop_emoji() {
        assert_eq!(escape_pdf_string("A & B 😀 漢"), "A \\& B  漢");
    }

    #[test]
    fn urls_escape_hash_and_percent() {
        assert_eq!(escape_url("https://x.test/a%20b#frag"), "https://x.test/a\\%20b\\#frag");
    }
}
