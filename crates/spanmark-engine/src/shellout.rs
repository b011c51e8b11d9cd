//! Bounded shellouts to well-known local CLIs (`pandoc`, `kpsewhich`, `lualatex`).
//!
//! Goals:
//! - **Bounded**: timeouts + output caps to avoid hangs/huge output.
//! - **Quiet**: errors are short `&'static str` reason codes; callers map them to
//!   `spanmark_core::Error` at the API boundary.
//! - **No secrets**: no env dumps.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    env(key)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(default)
}

pub fn timeout_from_env_ms(key: &str, default_ms: u64) -> Duration {
    let ms = env(key)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default_ms)
        .clamp(50, 600_000);
    Duration::from_millis(ms)
}

pub fn which(bin: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

fn wait_bounded(
    child: &mut std::process::Child,
    timeout: Duration,
) -> Result<std::process::ExitStatus, &'static str> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(|_| "shellout_wait_failed")? {
            return Ok(status);
        }
        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err("shellout_timeout");
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

fn spawn_error(e: std::io::Error) -> &'static str {
    if e.kind() == std::io::ErrorKind::NotFound {
        "shellout_tool_not_found"
    } else {
        "shellout_spawn_failed"
    }
}

/// Run a command and capture stdout (bounded) with a coarse timeout.
///
/// Stdout is drained on a separate thread while we wait, so a child producing more than a
/// pipe buffer (Pandoc JSON for a long judgment) cannot stall. Bytes past
/// `max_stdout_bytes` are read and discarded.
pub fn run_stdout_bounded(
    mut cmd: Command,
    timeout: Duration,
    max_stdout_bytes: usize,
) -> Result<Vec<u8>, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let mut child = cmd.spawn().map_err(spawn_error)?;
    let stdout = child.stdout.take().ok_or("shellout_no_stdout")?;
    let reader = std::thread::spawn(move || {
        use std::io::Read;
        let mut out = Vec::new();
        let mut s = stdout;
        let kept = (&mut s).take(max_stdout_bytes as u64).read_to_end(&mut out);
        let _ = std::io::copy(&mut s, &mut std::io::sink());
        kept.map(|_| out)
    });

    let status = wait_bounded(&mut child, timeout)?;
    let out = reader
        .join()
        .map_err(|_| "shellout_read_failed")?
        .map_err(|_| "shellout_read_failed")?;
    if !status.success() {
        return Err("shellout_nonzero_exit");
    }
    Ok(out)
}

/// Run a command for its side effects (files it writes); stdout/stderr are discarded.
///
/// Returns whether the process exited successfully. Spawn failures and timeouts are errors.
pub fn run_status_bounded(mut cmd: Command, timeout: Duration) -> Result<bool, &'static str> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    let mut child = cmd.spawn().map_err(spawn_error)?;
    Ok(wait_bounded(&mut child, timeout)?.success())
}

pub fn write_temp_file(
    bytes: &[u8],
    suffix: &str,
) -> Result<tempfile::NamedTempFile, &'static str> {
    let mut tmp = tempfile::Builder::new()
        .prefix("spanmark-")
        .suffix(suffix)
        .tempfile()
        .map_err(|_| "shellout_tempfile_failed")?;
    use std::io::Write;
    tmp.write_all(bytes)
        .map_err(|_| "shellout_tempfile_write_failed")?;
    tmp.flush().map_err(|_| "shellout_tempfile_write_failed")?;
    Ok(tmp)
}

pub(crate) fn normalize_mode(s: Option<String>) -> String {
    match s.as_deref() {
        Some("off") => "off".to_string(),
        Some("strict") => "strict".to_string(),
        Some("auto") | None => "auto".to_string(),
        // Unknown value: treat as auto.
        Some(_) => "auto".to_string(),
    }
}
