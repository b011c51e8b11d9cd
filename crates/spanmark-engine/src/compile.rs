//! External tools behind the core seams: `pandoc` (HTML -> JSON AST) and `lualatex`.
//!
//! Notes:
//! - Both run bounded via [`crate::shellout`]; nothing is retried.
//! - A failed LaTeX run is reported as a [`CompileFailure`] parsed from the `.log`: the first
//!   `! ...` error, the `l.<n>` source line when present, that line's text, and the log tail.

use crate::config::ExportConfig;
use crate::shellout::{has, run_status_bounded, run_stdout_bounded, write_temp_file};
use spanmark_core::{CompileFailure, DocumentConverter, Error, LatexCompiler, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const LOG_TAIL_LINES: usize = 30;

#[derive(Debug, Clone)]
pub struct PandocCli {
    pub program: String,
    pub timeout: Duration,
    pub max_bytes: usize,
}

impl PandocCli {
    pub fn from_config(cfg: &ExportConfig) -> Self {
        Self {
            program: "pandoc".to_string(),
            timeout: cfg.pandoc_timeout,
            max_bytes: cfg.pandoc_max_bytes,
        }
    }
}

impl DocumentConverter for PandocCli {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn html_to_pandoc_json(&self, html: &str) -> Result<String> {
        if !has(&self.program) {
            return Err(Error::NotConfigured(format!("{} not found on PATH", self.program)));
        }
        let tmp = write_temp_file(html.as_bytes(), ".html")
            .map_err(|c| Error::Convert(c.to_string()))?;
        let mut cmd = Command::new(&self.program);
        cmd.arg("-f").arg("html").arg("-t").arg("json").arg(tmp.path());
        let out = run_stdout_bounded(cmd, self.timeout, self.max_bytes)
            .map_err(|c| Error::Convert(c.to_string()))?;
        if out.len() >= self.max_bytes {
            return Err(Error::Convert("pandoc_output_truncated".to_string()));
        }
        String::from_utf8(out).map_err(|_| Error::Convert("pandoc_output_not_utf8".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct LualatexCompiler {
    pub program: String,
    pub timeout: Duration,
}

impl LualatexCompiler {
    pub fn from_config(cfg: &ExportConfig) -> Self {
        Self {
            program: "lualatex".to_string(),
            timeout: cfg.compile_timeout,
        }
    }
}

impl LatexCompiler for LualatexCompiler {
    fn name(&self) -> &'static str {
        "lualatex"
    }

    fn compile(&self, tex: &str, out: &Path) -> Result<PathBuf> {
        if !has(&self.program) {
            return Err(Error::NotConfigured(format!("{} not found on PATH", self.program)));
        }
        let dir = tempfile::Builder::new().prefix("spanmark-tex-").tempdir()?;
        let src = dir.path().join("document.tex");
        std::fs::write(&src, tex)?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("-interaction=nonstopmode")
            .arg("-halt-on-error")
            .arg(format!("-output-directory={}", dir.path().display()))
            .arg(&src)
            .current_dir(dir.path());
        tracing::debug!(program = %self.program, "running latex");
        let ok = run_status_bounded(cmd, self.timeout).map_err(|code| {
            Error::Compile(CompileFailure {
                message: code.to_string(),
                line: None,
                context: None,
                log_tail: String::new(),
            })
        })?;

        let pdf = dir.path().join("document.pdf");
        if ok && pdf.is_file() {
            std::fs::copy(&pdf, out)?;
            return Ok(out.to_path_buf());
        }
        let log = std::fs::read_to_string(dir.path().join("document.log")).unwrap_or_default();
        Err(Error::Compile(parse_latex_log(&log, tex)))
    }
}

/// Extract the first error from a TeX log.
pub fn parse_latex_log(log: &str, tex: &str) -> CompileFailure {
    let lines: Vec<&str> = log.lines().collect();
    let bang = lines.iter().position(|l| l.starts_with("! "));
    let message = bang
        .map(|i| lines[i].trim_start_matches("! ").trim().to_string())
        .unwrap_or_else(|| "latex run failed without an error line".to_string());
    let line = bang.and_then(|i| {
        lines[i..].iter().find_map(|l| {
            let rest = l.strip_prefix("l.")?;
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<usize>().ok()
        })
    });
    let context = line
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| tex.lines().nth(i))
        .map(|s| s.to_string());
    let start = lines.len().saturating_sub(LOG_TAIL_LINES);
    CompileFailure {
        message,
        line,
        context,
        log_tail: lines[start..].join("\n"),
    }
}
