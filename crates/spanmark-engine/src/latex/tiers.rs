//! Highlight tiers: how many highlights overlap one rendered run, and the nesting for each.
//!
//! | Tier | Highlights | Underlines |
//! |---|---|---|
//! | 1 | one `\highLight` | one, 1pt at -3pt |
//! | 2 | two nested, lowest index outermost | outer 2pt at -5pt, inner 1pt at -3pt |
//! | 3+ | one per index, index order | a single 4pt `many-dark` at -5pt |

use spanmark_core::{dark_for_light, MANY_DARK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    None,
    One,
    Two,
    Many,
}

impl Tier {
    pub fn of(count: usize) -> Self {
        match count {
            0 => Tier::None,
            1 => Tier::One,
            2 => Tier::Two,
            _ => Tier::Many,
        }
    }
}

fn underline(colour: &str, height: &str, bottom: &str, body: &str) -> String {
    format!("\\underLine[color={colour}, height={height}, bottom={bottom}]{{{body}}}")
}

fn highlight(colour: &str, body: &str) -> String {
    format!("\\highLight[{colour}]{{{body}}}")
}

/// Wrap already-rendered `body` for the given light colours (ascending highlight index).
pub fn wrap_tiers(body: &str, lights: &[&str]) -> String {
    let inner = match Tier::of(lights.len()) {
        Tier::None => return body.to_string(),
        Tier::One => underline(&dark_for_light(lights[0]), "1pt", "-3pt", body),
        Tier::Two => underline(
            &dark_for_light(lights[0]),
            "2pt",
            "-5pt",
            &underline(&dark_for_light(lights[1]), "1pt", "-3pt", body),
        ),
        Tier::Many => underline(MANY_DARK, "4pt", "-5pt", body),
    };
    lights
        .iter()
        .rev()
        .fold(inner, |acc, light| highlight(light, &acc))
}
