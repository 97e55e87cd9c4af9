// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolgate-security — Accountability for held print jobs.
//
// Every spooled document is fingerprinted with SHA-256 and every operator
// decision, together with its dispatch outcome, is appended to a SQLite audit
// trail keyed by that fingerprint.

pub mod audit;
pub mod integrity;

pub use audit::{AuditEntry, AuditLog};
pub use integrity::{hash_bytes, hash_file};
