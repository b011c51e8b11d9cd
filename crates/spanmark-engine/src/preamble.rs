//! LaTeX preamble: packages, font commands, `\annot`, and per-tag colours.
//!
//! Colours are assigned from a fixed palette by first appearance of each tag slug, so the
//! same highlight list always yields the same definitions. Light variants are the palette
//! colour mixed 30/70 with white.

use spanmark_core::{dark_colour, light_colour, tag_slug, MANY_DARK};
use std::collections::HashSet;
use std::fmt::Write as _;

const PALETTE: &[[u8; 3]] = &[
    [0x1f, 0x77, 0xb4],
    [0xff, 0x7f, 0x0e],
    [0x2c, 0xa0, 0x2c],
    [0xd6, 0x27, 0x28],
    [0x94, 0x67, 0xbd],
    [0x8c, 0x56, 0x4b],
    [0xe3, 0x77, 0xc2],
    [0x7f, 0x7f, 0x7f],
    [0xbc, 0xbd, 0x22],
    [0x17, 0xbe, 0xcf],
];

const MANY_DARK_RGB: [u8; 3] = [0x33, 0x33, 0x33];

const PACKAGES: &str = r"\usepackage{fontspec}
\usepackage[a4paper,left=2.2cm,right=6.2cm,marginparwidth=4.6cm,marginparsep=0.5cm]{geometry}
\usepackage{xcolor}
\usepackage{luacolor}
\usepackage{lua-ul}
\usepackage{emoji}
\usepackage{marginnote}
\usepackage{hyperref}
\newfontfamily\cjkfont{Noto Serif CJK SC}
\newfontfamily\emojifallbackfont{Noto Color Emoji}[Renderer=HarfBuzz]
\newcommand{\cjktext}[1]{{\cjkfont #1}}
\newcommand{\emojifallbackchar}[1]{{\emojifallbackfont #1}}
\newcommand{\annot}[2]{\marginnote{\footnotesize\raggedright\textcolor{tag-#1-dark}{\rule[-0.2em]{2pt}{1em}}\hspace{3pt}#2}}
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagColour {
    pub slug: String,
    pub light_name: String,
    pub dark_name: String,
    pub light: [u8; 3],
    pub dark: [u8; 3],
}

fn lighten(c: [u8; 3]) -> [u8; 3] {
    c.map(|v| ((v as u32 * 3 + 255 * 7 + 5) / 10) as u8)
}

fn hex(c: [u8; 3]) -> String {
    format!("{:02X}{:02X}{:02X}", c[0], c[1], c[2])
}

/// One colour pair per distinct tag slug, in first-appearance order.
pub fn tag_colours<S: AsRef<str>>(tags: &[S]) -> Vec<TagColour> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let tag = tag.as_ref();
        let slug = tag_slug(tag);
        if !seen.insert(slug.clone()) {
            continue;
        }
        let dark = PALETTE[out.len() % PALETTE.len()];
        out.push(TagColour {
            light_name: light_colour(tag),
            dark_name: dark_colour(tag),
            slug,
            light: lighten(dark),
            dark,
        });
    }
    out
}

pub fn colour_definitions<S: AsRef<str>>(tags: &[S]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\\definecolor{{{MANY_DARK}}}{{HTML}}{{{}}}", hex(MANY_DARK_RGB));
    for c in tag_colours(tags) {
        let _ = writeln!(out, "\\definecolor{{{}}}{{HTML}}{{{}}}", c.light_name, hex(c.light));
        let _ = writeln!(out, "\\definecolor{{{}}}{{HTML}}{{{}}}", c.dark_name, hex(c.dark));
    }
    out
}

/// Everything between `\documentclass` and `\begin{document}`.
pub fn preamble<S: AsRef<str>>(tags: &[S]) -> String {
    let mut out = String::from(PACKAGES);
    out.push_str(&colour_definitions(tags));
    out
}

/// A complete standalone document around a rendered body.
pub fn wrap_document<S: AsRef<str>>(body: &str, tags: &[S]) -> String {
    format!(
        "\\documentclass[11pt]{{article}}\n{}\\begin{{document}}\n{}\n\\end{{document}}\n",
        preamble(tags),
        body.trim_end()
    )
}
