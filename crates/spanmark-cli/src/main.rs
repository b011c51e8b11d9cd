use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spanmark_core::{
    parse_highlights, CompileFailure, DocumentConverter, Error, Highlight, LatexCompiler,
    NumberingChoice,
};
use spanmark_engine::config::{ExportConfig, PandocMode};
use spanmark_engine::emoji::{emoji_table, EmojiNames};
use spanmark_engine::export::{export_latex, prepare_export, render_prepared};
use spanmark_engine::extract::{decode_document, looks_like_html, plain_text_to_html, Extraction};
use spanmark_engine::markers::insert_markers;
use spanmark_engine::paragraphs::{build_paragraph_map_in, resolve_numbering};
use spanmark_engine::preamble::{preamble, wrap_document};
use spanmark_engine::shellout::which;
use spanmark_engine::{
    inject_char_spans, prepare_live, strip_char_spans, LualatexCompiler, PandocCli,
};
use std::io::Read as _;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "spanmark")]
#[command(
    about = "Character-offset highlights over HTML, exported to annotated LaTeX",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Canonical text of a document: the sequence every offset counts in (json).
    Extract(ExtractCmd),
    /// Insert position markers for a highlight list (json).
    Markers(MarkersCmd),
    /// Paragraph map: character offset -> paragraph number (json).
    Paragraphs(ParagraphsCmd),
    /// Wrap every character in an indexed span, or strip those spans again (html).
    CharSpans(CharSpansCmd),
    /// Live-view payload: untouched html, char count and validated highlights (json).
    Live(LiveCmd),
    /// Render LaTeX from an existing Pandoc JSON AST of the marked html (no subprocess).
    Latex(LatexCmd),
    /// Full export: markers -> pandoc -> LaTeX.
    Export(ExportCmd),
    /// Print the LaTeX preamble for a highlight list.
    Preamble(PreambleCmd),
    /// Compile a .tex file with lualatex.
    Compile(CompileCmd),
    /// Report external tool availability and effective configuration (json).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Document path (`-` for stdin). Plain text is converted to paragraphs.
    #[arg(long)]
    input: PathBuf,
}

#[derive(clap::Args, Debug)]
struct HighlightArgs {
    /// Highlight records: a JSON array or `{"highlights": [...]}`.
    #[arg(long)]
    highlights: PathBuf,
}

#[derive(clap::Args, Debug)]
struct ExtractCmd {
    #[command(flatten)]
    input: InputArgs,
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct MarkersCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    highlights: HighlightArgs,
}

#[derive(clap::Args, Debug)]
struct ParagraphsCmd {
    #[command(flatten)]
    input: InputArgs,
    /// auto|source|detect (default: SPANMARK_NUMBERING, else detect)
    #[arg(long)]
    numbering: Option<NumberingChoice>,
}

#[derive(clap::Args, Debug)]
struct CharSpansCmd {
    #[command(flatten)]
    input: InputArgs,
    /// Remove `span.char` wrappers instead of adding them.
    #[arg(long)]
    strip: bool,
}

#[derive(clap::Args, Debug)]
struct LiveCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    highlights: HighlightArgs,
}

#[derive(clap::Args, Debug)]
struct LatexCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    highlights: HighlightArgs,
    /// Pandoc JSON for the marked html (`spanmark markers` output piped through `pandoc -t json`).
    #[arg(long)]
    pandoc_json: PathBuf,
    #[arg(long)]
    numbering: Option<NumberingChoice>,
    /// Emit a complete document (preamble included).
    #[arg(long)]
    standalone: bool,
}

#[derive(clap::Args, Debug)]
struct ExportCmd {
    #[command(flatten)]
    input: InputArgs,
    #[command(flatten)]
    highlights: HighlightArgs,
    #[arg(long)]
    numbering: Option<NumberingChoice>,
    /// Emit a complete document (preamble included).
    #[arg(long)]
    standalone: bool,
    /// Write here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Pandoc timeout (ms); default SPANMARK_PANDOC_TIMEOUT_MS.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct PreambleCmd {
    #[command(flatten)]
    highlights: HighlightArgs,
}

#[derive(clap::Args, Debug)]
struct CompileCmd {
    #[arg(long)]
    tex: PathBuf,
    #[arg(long)]
    out: PathBuf,
    /// Compile timeout (ms); default SPANMARK_COMPILE_TIMEOUT_MS.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn read_input(path: &Path) -> Result<String> {
    let bytes = if path == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("read stdin")?;
        buf
    } else {
        std::fs::read(path).with_context(|| format!("read {}", path.display()))?
    };
    let text = decode_document(&bytes);
    if looks_like_html(&text) {
        Ok(text)
    } else {
        Ok(plain_text_to_html(&text))
    }
}

fn read_highlights(path: &Path) -> Result<Vec<Highlight>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(parse_highlights(&raw)?)
}

fn init_tracing() {
    let filter = ["SPANMARK_LOG", "RUST_LOG"]
        .iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
        .and_then(|v| tracing_subscriber::EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

// Opt-in (SPANMARK_ENV_FILE); sets only vars that are not already set and never logs values.
fn load_env_file() {
    let Ok(p) = std::env::var("SPANMARK_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
        }
    }
}

fn failure_json(kind: &str, f: &CompileFailure) -> serde_json::Value {
    serde_json::json!({
        "schema_version": 1,
        "kind": kind,
        "ok": false,
        "error": {
            "message": f.message,
            "line": f.line,
            "context": f.context,
            "log_tail": f.log_tail,
        },
    })
}

fn write_or_print(out: Option<&Path>, text: &str) -> Result<()> {
    match out {
        Some(p) => {
            std::fs::write(p, text).with_context(|| format!("write {}", p.display()))?;
            println!(
                "{}",
                serde_json::json!({
                    "schema_version": 1,
                    "ok": true,
                    "path": p.display().to_string(),
                })
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    load_env_file();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract(args) => {
            let html = read_input(&args.input.input)?;
            let ex = Extraction::from_html(&html);
            let text = ex.sequence.text();
            match args.output.to_ascii_lowercase().as_str() {
                "text" => print!("{text}"),
                _ => println!(
                    "{}",
                    serde_json::json!({
                        "schema_version": 1,
                        "kind": "extract",
                        "chars": ex.sequence.len(),
                        "text": text,
                    })
                ),
            }
        }
        Commands::Markers(args) => {
            let html = read_input(&args.input.input)?;
            let hs = read_highlights(&args.highlights.highlights)?;
            let marked = insert_markers(&html, &hs)?;
            let highlights: Vec<serde_json::Value> = marked
                .highlights
                .iter()
                .map(|oh| {
                    let segments: Vec<[usize; 2]> =
                        oh.segments.iter().map(|s| [s.start, s.end]).collect();
                    serde_json::json!({
                        "index": oh.index,
                        "start": oh.span.start,
                        "end": oh.span.end,
                        "tag": oh.highlight.tag,
                        "segments": segments,
                    })
                })
                .collect();
            println!(
                "{}",
                serde_json::json!({
                    "schema_version": 1,
                    "kind": "markers",
                    "marked_html": marked.html,
                    "highlights": highlights,
                    "skipped": hs.len() - marked.highlights.len(),
                })
            );
        }
        Commands::Paragraphs(args) => {
            let html = read_input(&args.input.input)?;
            let choice = args
                .numbering
                .unwrap_or_else(|| ExportConfig::from_env().numbering);
            let mode = resolve_numbering(&html, choice);
            let map = build_paragraph_map_in(&Extraction::from_html(&html), mode);
            println!(
                "{}",
                serde_json::json!({
                    "schema_version": 1,
                    "kind": "paragraphs",
                    "mode": mode,
                    "paragraphs": map,
                })
            );
        }
        Commands::CharSpans(args) => {
            let html = read_input(&args.input.input)?;
            if args.strip {
                print!("{}", strip_char_spans(&html));
            } else {
                print!("{}", inject_char_spans(&html));
            }
        }
        Commands::Live(args) => {
            let html = read_input(&args.input.input)?;
            let hs = read_highlights(&args.highlights.highlights)?;
            let live = prepare_live(&html, &hs);
            println!("{}", serde_json::to_string(&live)?);
        }
        Commands::Latex(args) => {
            let html = read_input(&args.input.input)?;
            let hs = read_highlights(&args.highlights.highlights)?;
            let json = std::fs::read_to_string(&args.pandoc_json)
                .with_context(|| format!("read {}", args.pandoc_json.display()))?;
            let choice = args
                .numbering
                .unwrap_or_else(|| ExportConfig::from_env().numbering);
            let prepared = prepare_export(&html, &hs, choice, EmojiNames::Global)?;
            let body = render_prepared(&prepared, &json, EmojiNames::Global)?;
            if args.standalone {
                print!("{}", wrap_document(&body, &prepared.tags));
            } else {
                print!("{body}");
            }
        }
        Commands::Export(args) => {
            let html = read_input(&args.input.input)?;
            let hs = read_highlights(&args.highlights.highlights)?;
            let mut cfg = ExportConfig::from_env();
            if let Some(n) = args.numbering {
                cfg.numbering = n;
            }
            if let Some(ms) = args.timeout_ms {
                cfg.pandoc_timeout = std::time::Duration::from_millis(ms.clamp(50, 600_000));
            }
            let converter = PandocCli::from_config(&cfg);
            let out = export_latex(&html, &hs, &cfg, &converter, EmojiNames::Global)?;
            tracing::info!(
                highlights = out.highlights,
                tags = out.tags.len(),
                "export finished"
            );
            let text = if args.standalone {
                out.standalone()
            } else {
                out.latex
            };
            write_or_print(args.out.as_deref(), &text)?;
        }
        Commands::Preamble(args) => {
            let hs = read_highlights(&args.highlights.highlights)?;
            let tags: Vec<&str> = hs.iter().map(|h| h.tag.as_str()).collect();
            print!("{}", preamble(&tags));
        }
        Commands::Compile(args) => {
            let tex = std::fs::read_to_string(&args.tex)
                .with_context(|| format!("read {}", args.tex.display()))?;
            let mut cfg = ExportConfig::from_env();
            if let Some(ms) = args.timeout_ms {
                cfg.compile_timeout = std::time::Duration::from_millis(ms.clamp(50, 600_000));
            }
            let compiler = LualatexCompiler::from_config(&cfg);
            match compiler.compile(&tex, &args.out) {
                Ok(p) => println!(
                    "{}",
                    serde_json::json!({
                        "schema_version": 1,
                        "kind": "compile",
                        "ok": true,
                        "path": p.display().to_string(),
                    })
                ),
                Err(Error::Compile(f)) => {
                    println!("{}", failure_json("compile", &f));
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Doctor(args) => {
            let t0 = std::time::Instant::now();
            let cfg = ExportConfig::from_env();
            let tools: Vec<serde_json::Value> = ["pandoc", "lualatex", "kpsewhich"]
                .iter()
                .map(|name| {
                    let path = which(name);
                    serde_json::json!({
                        "name": name,
                        "ok": path.is_some(),
                        "path": path.map(|p| p.display().to_string()),
                    })
                })
                .collect();
            let converter = (cfg.pandoc_mode != PandocMode::Off)
                .then(|| PandocCli::from_config(&cfg).name());
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "name": "spanmark",
                "version": env!("CARGO_PKG_VERSION"),
                "converter": converter,
                "config": cfg,
                "emoji_names": emoji_table().len(),
                "tools": tools,
                "elapsed_ms": t0.elapsed().as_millis(),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    for t in v["tools"].as_array().into_iter().flatten() {
                        let mark = if t["ok"].as_bool() == Some(true) { "ok" } else { "missing" };
                        println!("{:<10} {mark}", t["name"].as_str().unwrap_or(""));
                    }
                }
                _ => println!("{}", v),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "spanmark",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("spanmark {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{}", v),
            }
        }
    }
    Ok(())
}
