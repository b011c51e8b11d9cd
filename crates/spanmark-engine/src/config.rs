//! Environment-driven export configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `SPANMARK_PANDOC` | `auto` (`auto`, `off`, `strict`) |
//! | `SPANMARK_PANDOC_TIMEOUT_MS` | 30000 |
//! | `SPANMARK_PANDOC_MAX_BYTES` | 64 MB |
//! | `SPANMARK_EMOJI_TIMEOUT_MS` | 5000 |
//! | `SPANMARK_EMOJI_TABLE` | unset (ask `kpsewhich`) |
//! | `SPANMARK_COMPILE_TIMEOUT_MS` | 120000 |
//! | `SPANMARK_NUMBERING` | `detect` |

use crate::shellout::{env, env_usize, normalize_mode, timeout_from_env_ms};
use serde::Serialize;
use spanmark_core::NumberingChoice;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PandocMode {
    /// Use `pandoc` when it is on PATH.
    #[default]
    Auto,
    /// Never shell out; exports fail with `NotConfigured`.
    Off,
    /// Like `auto`, but AST nodes we cannot render fail the export.
    Strict,
}

impl PandocMode {
    pub fn from_env() -> Self {
        Self::parse(env("SPANMARK_PANDOC"))
    }

    fn parse(raw: Option<String>) -> Self {
        match normalize_mode(raw.map(|s| s.to_ascii_lowercase())).as_str() {
            "off" => Self::Off,
            "strict" => Self::Strict,
            _ => Self::Auto,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportConfig {
    pub pandoc_mode: PandocMode,
    #[serde(with = "millis")]
    pub pandoc_timeout: Duration,
    pub pandoc_max_bytes: usize,
    #[serde(with = "millis")]
    pub emoji_timeout: Duration,
    pub emoji_table: Option<PathBuf>,
    #[serde(with = "millis")]
    pub compile_timeout: Duration,
    pub numbering: NumberingChoice,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pandoc_mode: PandocMode::Auto,
            pandoc_timeout: Duration::from_millis(30_000),
            pandoc_max_bytes: 64_000_000,
            emoji_timeout: Duration::from_millis(5_000),
            emoji_table: None,
            compile_timeout: Duration::from_millis(120_000),
            numbering: NumberingChoice::Detect,
        }
    }
}

impl ExportConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let numbering = match env("SPANMARK_NUMBERING").map(|s| s.parse::<NumberingChoice>()) {
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "ignoring SPANMARK_NUMBERING");
                d.numbering
            }
            None => d.numbering,
        };
        Self {
            pandoc_mode: PandocMode::from_env(),
            pandoc_timeout: pandoc_timeout(),
            pandoc_max_bytes: env_usize("SPANMARK_PANDOC_MAX_BYTES", d.pandoc_max_bytes)
                .clamp(64 * 1024, 512_000_000),
            emoji_timeout: emoji_timeout(),
            emoji_table: emoji_table_path(),
            compile_timeout: timeout_from_env_ms("SPANMARK_COMPILE_TIMEOUT_MS", 120_000),
            numbering,
        }
    }
}

pub fn pandoc_timeout() -> Duration {
    timeout_from_env_ms("SPANMARK_PANDOC_TIMEOUT_MS", 30_000)
}

pub fn emoji_timeout() -> Duration {
    timeout_from_env_ms("SPANMARK_EMOJI_TIMEOUT_MS", 5_000)
}

pub fn emoji_table_path() -> Option<PathBuf> {
    env("SPANMARK_EMOJI_TABLE").map(PathBuf::from)
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pandoc_mode_parses_leniently() {
        assert_eq!(PandocMode::parse(None), PandocMode::Auto);
        assert_eq!(PandocMode::parse(Some("OFF".into())), PandocMode::Off);
        assert_eq!(PandocMode::parse(Some("strict".into())), PandocMode::Strict);
        assert_eq!(PandocMode::parse(Some("maybe".into())), PandocMode::Auto);
    }

    #[test]
    fn defaults_serialize_as_millis() {
        let v = serde_json::to_value(ExportConfig::default()).unwrap();
        assert_eq!(v["pandoc_timeout"], 30_000);
        assert_eq!(v["pandoc_mode"], "auto");
        assert_eq!(v["numbering"], "detect");
    }
}
