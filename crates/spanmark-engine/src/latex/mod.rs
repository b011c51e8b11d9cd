//! LaTeX output: escaping, highlight tiers and the AST writer.

pub mod escape;
pub mod tiers;
pub mod writer;

pub use escape::{escape_latex, escape_specials};
pub use tiers::{wrap_tiers, Tier};
pub use writer::{section_command, write_latex};
