// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Spoolgate held-print engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File extensions (lowercase, no dot) of the zip-based job containers the
/// virtual printer's spool port produces.
pub const JOB_CONTAINER_EXTENSIONS: &[&str] = &["xps", "oxps"];

/// Whether `file_name` carries one of the recognised job-container
/// extensions.
pub fn is_job_container(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            JOB_CONTAINER_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Short label shown to the operator for a spool file.
///
/// The spool port names files `job_<N>.xps`; the label is `<N>`.  A port
/// that failed to expand its `%d` token yields `"unknown"`.
pub fn job_label(file_name: &str) -> String {
    let stem = std::path::Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let label = stem.strip_prefix("job_").unwrap_or(stem);
    if label.contains("%d") || label.is_empty() {
        "unknown".to_string()
    } else {
        label.to_string()
    }
}

/// Identifier of a job in the virtual print queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u32);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file observed in the watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoolFile {
    pub name: String,
    pub size_bytes: u64,
    pub first_seen_at: DateTime<Utc>,
}

impl SpoolFile {
    pub fn new(name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            first_seen_at: Utc::now(),
        }
    }
}

/// A logical job held by the virtual print queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: JobId,
    pub document_name: String,
    /// Page count declared by the submitting application (0 = not declared).
    pub declared_total_pages: u32,
    /// Paper width from the job's device mode, in tenths of a millimetre
    /// (0 = not declared).
    pub paper_width_units: u32,
    /// Paper height from the job's device mode, in tenths of a millimetre
    /// (0 = not declared).
    pub paper_height_units: u32,
}

impl PrintJob {
    /// Paper geometry declared by the queue, if any.
    pub fn declared_paper(&self) -> Option<PaperSize> {
        if self.paper_width_units == 0 || self.paper_height_units == 0 {
            return None;
        }
        let to_mm = |tenths: u32| (tenths + 5) / 10;
        Some(PaperSize::from_dimensions_mm(
            to_mm(self.paper_width_units),
            to_mm(self.paper_height_units),
        ))
    }
}

/// Standard paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    Letter,
    A5,
    A4,
    A3,
    A2,
    Custom { width_mm: u32, height_mm: u32 },
    /// Geometry could not be resolved.
    Unknown,
}

impl PaperSize {
    /// Dimensions in millimetres (width, height), if known.
    pub fn dimensions_mm(&self) -> Option<(u32, u32)> {
        match self {
            Self::Letter => Some((216, 279)),
            Self::A5 => Some((148, 210)),
            Self::A4 => Some((210, 297)),
            Self::A3 => Some((297, 420)),
            Self::A2 => Some((420, 594)),
            Self::Custom {
                width_mm,
                height_mm,
            } => Some((*width_mm, *height_mm)),
            Self::Unknown => None,
        }
    }

    /// Match millimetre dimensions (portrait or landscape, ±1 mm) against the
    /// named sizes; anything else becomes `Custom`.
    pub fn from_dimensions_mm(width_mm: u32, height_mm: u32) -> Self {
        const NAMED: [PaperSize; 5] = [
            PaperSize::Letter,
            PaperSize::A5,
            PaperSize::A4,
            PaperSize::A3,
            PaperSize::A2,
        ];
        let (short, long) = (width_mm.min(height_mm), width_mm.max(height_mm));
        NAMED
            .into_iter()
            .find(|size| {
                size.dimensions_mm()
                    .is_some_and(|(w, h)| short.abs_diff(w) <= 1 && long.abs_diff(h) <= 1)
            })
            .unwrap_or(Self::Custom {
                width_mm,
                height_mm,
            })
    }
}

impl std::fmt::Display for PaperSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Letter => f.write_str("Letter"),
            Self::A5 => f.write_str("A5"),
            Self::A4 => f.write_str("A4"),
            Self::A3 => f.write_str("A3"),
            Self::A2 => f.write_str("A2"),
            Self::Custom {
                width_mm,
                height_mm,
            } => write!(f, "{width_mm}x{height_mm}mm"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// What the inspector reports when page geometry matches no known size or
/// cannot be read.  Applied uniformly by the inspector, never per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaperFallback {
    /// Label unmatched geometry as A4.
    #[default]
    A4,
    /// Label unmatched geometry as `PaperSize::Unknown`.
    Unknown,
}

impl PaperFallback {
    pub fn paper_size(self) -> PaperSize {
        match self {
            Self::A4 => PaperSize::A4,
            Self::Unknown => PaperSize::Unknown,
        }
    }
}

/// Structural facts extracted from a job container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    /// Number of page-description entries (1 when the container was
    /// unreadable).
    pub page_count: u32,
    pub paper_size: PaperSize,
    /// True when the container could not be parsed and defaults were used.
    pub degraded: bool,
}

/// What the operator is shown for a held job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub job_id: JobId,
    /// Label derived from the spool file name.
    pub label: String,
    pub document_name: String,
    pub page_count: u32,
    pub paper_size: PaperSize,
}

impl JobMetadata {
    /// Combine the queue's view of a job with the inspector's findings.
    ///
    /// The declared page count wins; a zero declaration falls back to the
    /// inspected count, and never below one page.  Unknown inspected paper
    /// falls back to the geometry declared by the queue.
    pub fn resolve(label: String, job: &PrintJob, inspection: &Inspection) -> Self {
        let page_count = if job.declared_total_pages > 0 {
            job.declared_total_pages
        } else {
            inspection.page_count.max(1)
        };
        let paper_size = match inspection.paper_size {
            PaperSize::Unknown => job.declared_paper().unwrap_or(PaperSize::Unknown),
            known => known,
        };
        Self {
            job_id: job.id,
            label,
            document_name: job.document_name.clone(),
            page_count,
            paper_size,
        }
    }
}

/// The operator's verdict on a held job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approve,
    Reject,
    /// The presentation was closed without a choice.  Handled like
    /// `Reject`, recorded separately.
    Abandoned,
}

impl Decision {
    pub fn is_approve(&self) -> bool {
        matches!(self, Self::Approve)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file processing states of the engine loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileState {
    Discovered,
    Stabilizing,
    Correlating,
    Inspecting,
    AwaitingDecision,
    Forwarding,
    Discarding,
    Done,
}

/// Lifecycle of the engine service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineStatus {
    Stopped,
    Running,
    /// The loop exited with an error (e.g. unusable watch directory).
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(declared_pages: u32, width: u32, height: u32) -> PrintJob {
        PrintJob {
            id: JobId(7),
            document_name: "job_7.xps".into(),
            declared_total_pages: declared_pages,
            paper_width_units: width,
            paper_height_units: height,
        }
    }

    #[test]
    fn container_extensions_are_case_insensitive() {
        assert!(is_job_container("job_1.xps"));
        assert!(is_job_container("JOB_1.XPS"));
        assert!(is_job_container("scan.oxps"));
        assert!(!is_job_container("job_1.pdf"));
        assert!(!is_job_container("xps"));
    }

    #[test]
    fn job_label_strips_prefix_and_extension() {
        assert_eq!(job_label("job_42.xps"), "42");
        assert_eq!(job_label("report.xps"), "report");
        assert_eq!(job_label("job_%d.xps"), "unknown");
    }

    #[test]
    fn declared_pages_win() {
        let inspection = Inspection {
            page_count: 3,
            paper_size: PaperSize::A4,
            degraded: false,
        };
        let meta = JobMetadata::resolve("7".into(), &job(5, 0, 0), &inspection);
        assert_eq!(meta.page_count, 5);
    }

    #[test]
    fn zero_declared_and_zero_inspected_is_one_page() {
        let inspection = Inspection {
            page_count: 0,
            paper_size: PaperSize::A4,
            degraded: false,
        };
        let meta = JobMetadata::resolve("7".into(), &job(0, 0, 0), &inspection);
        assert_eq!(meta.page_count, 1);
        assert_eq!(meta.paper_size, PaperSize::A4);
    }

    #[test]
    fn unknown_paper_uses_queue_geometry() {
        let inspection = Inspection {
            page_count: 2,
            paper_size: PaperSize::Unknown,
            degraded: false,
        };
        let meta = JobMetadata::resolve("7".into(), &job(0, 2159, 2794), &inspection);
        assert_eq!(meta.paper_size, PaperSize::Letter);

        let meta = JobMetadata::resolve("7".into(), &job(0, 1000, 1500), &inspection);
        assert_eq!(
            meta.paper_size,
            PaperSize::Custom {
                width_mm: 100,
                height_mm: 150
            }
        );

        let meta = JobMetadata::resolve("7".into(), &job(0, 0, 0), &inspection);
        assert_eq!(meta.paper_size, PaperSize::Unknown);
        assert_eq!(meta.paper_size.to_string(), "unknown");
    }

    #[test]
    fn landscape_geometry_matches_named_size() {
        assert_eq!(PaperSize::from_dimensions_mm(297, 210), PaperSize::A4);
        assert_eq!(PaperSize::from_dimensions_mm(420, 297), PaperSize::A3);
    }
}
