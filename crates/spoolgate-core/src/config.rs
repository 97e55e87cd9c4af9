// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpoolgateError};
use crate::types::PaperFallback;

/// How approved jobs reach the real device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceKind {
    /// Raw byte stream over TCP (JetDirect).  `real_printer` is `host` or
    /// `host:port`.
    RawTcp,
    /// File-port style device: each document lands in `real_printer`, which
    /// is a directory.
    Directory,
}

/// Engine settings, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory the virtual printer's spool port writes into.
    pub watch_dir: PathBuf,
    /// Name of the virtual print queue whose jobs are correlated.
    pub virtual_printer: String,
    /// Device approved jobs are forwarded to.
    pub real_printer: String,
    pub device: DeviceKind,
    /// Directory sampling interval.
    pub poll_interval_ms: u64,
    /// How long a file may keep growing before it is given up on this tick.
    pub stability_timeout_secs: u64,
    /// Label for page geometry that matches no known paper size.
    pub paper_fallback: PaperFallback,
    /// SQLite database holding the virtual queue.
    pub queue_db: PathBuf,
    /// SQLite database for the decision audit trail.
    pub audit_db: Option<PathBuf>,
    pub audit_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data = default_data_dir();
        Self {
            watch_dir: data.join("spool"),
            virtual_printer: "Spoolgate Virtual Printer".into(),
            real_printer: "127.0.0.1:9100".into(),
            device: DeviceKind::RawTcp,
            poll_interval_ms: 1000,
            stability_timeout_secs: 10,
            paper_fallback: PaperFallback::A4,
            queue_db: data.join("queue.db"),
            audit_db: Some(data.join("audit.db")),
            audit_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Load settings from a JSON file.  A missing file yields the defaults;
    /// an unreadable or malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Persist settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(SpoolgateError::Config("poll_interval_ms must be > 0".into()));
        }
        if self.stability_timeout_secs == 0 {
            return Err(SpoolgateError::Config(
                "stability_timeout_secs must be > 0".into(),
            ));
        }
        if self.real_printer.trim().is_empty() {
            return Err(SpoolgateError::Config("real_printer is empty".into()));
        }
        Ok(())
    }
}

/// Conventional per-user data location (XDG data dir, then `~/.local/share`).
pub fn default_data_dir() -> PathBuf {
    let base = if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local").join("share")
    } else {
        std::env::temp_dir()
    };
    base.join("spoolgate")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.stability_timeout_secs, 10);
        assert_eq!(config.paper_fallback, PaperFallback::A4);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spoolgate.json");
        std::fs::write(
            &path,
            r#"{ "real_printer": "/srv/out", "device": { "kind": "directory" }, "paper_fallback": "Unknown" }"#,
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.device, DeviceKind::Directory);
        assert_eq!(config.real_printer, "/srv/out");
        assert_eq!(config.paper_fallback, PaperFallback::Unknown);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spoolgate.json");
        let mut config = EngineConfig::default();
        config.stability_timeout_secs = 4;
        config.save(&path).unwrap();

        assert_eq!(EngineConfig::load(&path).unwrap().stability_timeout_secs, 4);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = EngineConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SpoolgateError::Config(_))));
    }
}
