// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service layer: turns an `EngineConfig` into the queue, device, audit log,
// and engine the subcommands work with.

pub mod app_services;
pub mod console;
