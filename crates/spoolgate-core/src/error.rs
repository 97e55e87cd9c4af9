// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Spoolgate.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all Spoolgate operations.
#[derive(Debug, Error)]
pub enum SpoolgateError {
    // -- Print queue --
    #[error("print queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("print job {0} not found")]
    JobNotFound(u32),

    // -- Real device --
    #[error("could not open device {device}: {detail}")]
    DeviceOpen { device: String, detail: String },

    #[error("device {step} failed: {detail}")]
    DeviceStep { step: &'static str, detail: String },

    // -- Document --
    #[error("document inspection failed: {0}")]
    Inspection(String),

    // -- Engine --
    #[error("watch directory {path} is not usable: {source}")]
    WatchDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("engine task failed: {0}")]
    Engine(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure taxonomy used to decide how a per-file error is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File vanished mid-poll, directory briefly unavailable: try next tick.
    TransientIo,
    /// No matching queue job: skip the file silently.
    CorrelationMiss,
    /// Malformed container: degrade to default metadata.
    Inspection,
    /// Real device unreachable or write failed: tell the operator.
    Dispatch,
    /// Engine cannot start at all.
    FatalStartup,
}

impl SpoolgateError {
    /// Classify this error into the engine's failure taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QueueUnavailable(_) | Self::JobNotFound(_) => ErrorKind::CorrelationMiss,
            Self::DeviceOpen { .. } | Self::DeviceStep { .. } => ErrorKind::Dispatch,
            Self::Inspection(_) => ErrorKind::Inspection,
            Self::WatchDirectory { .. } | Self::Config(_) => ErrorKind::FatalStartup,
            Self::Engine(_) | Self::Database(_) | Self::Io(_) | Self::Serialization(_) => {
                ErrorKind::TransientIo
            }
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SpoolgateError>;
