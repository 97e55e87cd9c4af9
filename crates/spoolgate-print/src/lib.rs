// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolgate Print — the held-print engine.  Watches the virtual printer's
// spool directory, correlates each spooled file with its queue job, asks the
// operator through a decision gateway, and forwards approved jobs to the real
// device as a raw stream.

pub mod correlator;
pub mod device;
pub mod engine;
pub mod forwarder;
pub mod gateway;
pub mod queue;
pub mod service;
pub mod stability;

pub use correlator::{CorrelationMiss, MatchStrategy, QueueCorrelator, SubstringMatch};
pub use device::{DeviceConnector, DeviceHandle, DirectoryConnector, RawTcpConnector};
pub use engine::{Engine, ProcessOutcome, SkipReason, WatchState};
pub use forwarder::DispatchForwarder;
pub use gateway::{
    ChannelGateway, DecisionGateway, GatewayMessage, PresentationRequest, await_decision,
};
pub use queue::{PrintQueue, SqliteQueue};
pub use service::EngineService;
pub use stability::StabilityDetector;
