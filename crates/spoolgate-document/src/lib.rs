// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// spoolgate-document — Structural inspection of spooled job containers.
//
// Spooled jobs are zip-based page-description packages (XPS / OpenXPS).  The
// inspector counts their page parts and reads the first page's declared
// geometry without rendering anything.

pub mod inspector;

pub use inspector::{DocumentInspector, InspectError};
