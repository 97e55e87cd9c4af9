// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language notices shown to the operator when an approved job could not
// be delivered.  The job and its spool file are kept, so every notice tells
// the operator where the job still is.

use serde::{Deserialize, Serialize};

use crate::error::SpoolgateError;
use crate::types::JobMetadata;

/// A failure notice for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorNotice {
    /// Short heading, e.g. "Job 12 was not printed".
    pub title: String,
    /// What went wrong, in plain words.
    pub message: String,
    /// What the operator can do about it.
    pub suggestion: String,
}

/// Build the notice for an approved job whose dispatch to `device` failed.
pub fn dispatch_failure_notice(
    metadata: &JobMetadata,
    device: &str,
    err: &SpoolgateError,
) -> OperatorNotice {
    let title = format!("Job {} was not printed", metadata.label);
    let (message, suggestion) = match err {
        SpoolgateError::DeviceOpen { detail, .. } => (
            format!("The printer \"{device}\" could not be reached ({detail})."),
            "Check that the printer is switched on and connected, then send the job again from the print queue."
                .to_string(),
        ),
        SpoolgateError::DeviceStep { step, detail } => (
            format!("The printer \"{device}\" stopped accepting the job during {step} ({detail})."),
            "Check the printer for paper or error lights, then send the job again from the print queue."
                .to_string(),
        ),
        SpoolgateError::Io(io) => (
            format!("The spooled document could not be read ({io})."),
            "The job is still in the print queue; print the document again if it does not reappear."
                .to_string(),
        ),
        other => (
            format!("Sending the job to \"{device}\" failed ({other})."),
            "The job is still in the print queue; try sending it again.".to_string(),
        ),
    };
    OperatorNotice {
        title,
        message,
        suggestion,
    }
}

impl std::fmt::Display for OperatorNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} {}", self.title, self.message, self.suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobId, PaperSize};

    fn metadata() -> JobMetadata {
        JobMetadata {
            job_id: JobId(12),
            label: "12".into(),
            document_name: "job_12.xps".into(),
            page_count: 2,
            paper_size: PaperSize::A4,
        }
    }

    #[test]
    fn unreachable_device_notice() {
        let err = SpoolgateError::DeviceOpen {
            device: "office".into(),
            detail: "connection refused".into(),
        };
        let notice = dispatch_failure_notice(&metadata(), "office", &err);
        assert_eq!(notice.title, "Job 12 was not printed");
        assert!(notice.message.contains("could not be reached"));
        assert!(notice.message.contains("connection refused"));
    }

    #[test]
    fn step_failure_names_the_step() {
        let err = SpoolgateError::DeviceStep {
            step: "write",
            detail: "broken pipe".into(),
        };
        let notice = dispatch_failure_notice(&metadata(), "office", &err);
        assert!(notice.message.contains("during write"));
    }
}
