//! In-process implementations for `spanmark`.
//!
//! Character offsets are defined once, by [`extract`]; every other stage (markers, paragraph
//! numbering, per-character spans, the LaTeX export) walks the same [`extract::Extraction`].
//! The only subprocesses are behind [`compile`] (`pandoc`, `lualatex`) and the emoji table
//! lookup in [`emoji`].

pub mod annot;
pub mod boundaries;
pub mod char_spans;
pub mod compile;
pub mod config;
pub mod dom;
pub mod emoji;
pub mod export;
pub mod extract;
pub mod filter;
pub mod latex;
pub mod markers;
pub mod pandoc;
pub mod paragraphs;
pub mod preamble;
pub mod shellout;

pub use char_spans::{inject_char_spans, prepare_live, strip_char_spans, LiveDocument};
pub use compile::{parse_latex_log, LualatexCompiler, PandocCli};
pub use config::{ExportConfig, PandocMode};
pub use emoji::{emoji_table, EmojiNames, EmojiTable};
pub use export::{export_latex, prepare_export, render_prepared, LatexExport, PreparedExport};
pub use extract::{extract, extract_text, CharacterSequence, Extraction};
pub use markers::{insert_markers, MarkedHtml, OrderedHighlight};
pub use paragraphs::{build_paragraph_map, paragraph_ref, resolve_numbering};
pub use preamble::{preamble, wrap_document};
