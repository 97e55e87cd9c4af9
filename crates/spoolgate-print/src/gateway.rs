// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Decision gateway: the boundary between the engine and whatever surface
// asks the operator to approve or reject a held job.
//
// The engine never waits on a UI call directly.  It sends a presentation
// request across a channel and awaits a one-shot reply.  A surface that
// drops the request without answering (window closed, process gone) yields
// `Decision::Abandoned` on the engine side.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use spoolgate_core::human_errors::OperatorNotice;
use spoolgate_core::types::{Decision, JobMetadata};

/// Presents held jobs to an operator and delivers failure notices.
pub trait DecisionGateway: Send + Sync {
    /// Start a presentation for one job.  The receiver resolves once the
    /// operator has decided; a closed receiver means the presentation was
    /// dismissed.
    fn present(&self, metadata: JobMetadata) -> oneshot::Receiver<Decision>;

    /// Tell the operator about a problem that needs attention.
    fn notify(&self, notice: OperatorNotice);
}

/// Wait for a presentation to resolve.  Dismissal is `Abandoned`.
pub async fn await_decision(reply: oneshot::Receiver<Decision>) -> Decision {
    reply.await.unwrap_or(Decision::Abandoned)
}

/// One pending presentation, owned by the decision surface.
#[derive(Debug)]
pub struct PresentationRequest {
    pub metadata: JobMetadata,
    reply: oneshot::Sender<Decision>,
}

impl PresentationRequest {
    pub fn new(metadata: JobMetadata) -> (Self, oneshot::Receiver<Decision>) {
        let (reply, rx) = oneshot::channel();
        (Self { metadata, reply }, rx)
    }

    /// Answer the presentation.  Dropping the request instead abandons it.
    pub fn respond(self, decision: Decision) {
        if self.reply.send(decision).is_err() {
            debug!(job_id = %self.metadata.job_id, "engine stopped waiting for decision");
        }
    }
}

/// Traffic from the engine to a decision surface.
#[derive(Debug)]
pub enum GatewayMessage {
    Present(PresentationRequest),
    Notice(OperatorNotice),
}

/// Gateway that hands every request to a channel consumer.
#[derive(Debug, Clone)]
pub struct ChannelGateway {
    tx: mpsc::UnboundedSender<GatewayMessage>,
}

impl ChannelGateway {
    /// Create the gateway and the receiving end the surface reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DecisionGateway for ChannelGateway {
    fn present(&self, metadata: JobMetadata) -> oneshot::Receiver<Decision> {
        let (request, rx) = PresentationRequest::new(metadata);
        if let Err(mpsc::error::SendError(msg)) = self.tx.send(GatewayMessage::Present(request)) {
            // The request is dropped here, so `rx` resolves as abandoned.
            if let GatewayMessage::Present(request) = msg {
                warn!(job_id = %request.metadata.job_id, "no decision surface attached");
            }
        }
        rx
    }

    fn notify(&self, notice: OperatorNotice) {
        if self.tx.send(GatewayMessage::Notice(notice)).is_err() {
            warn!("no decision surface attached; notice dropped");
        }
    }
}
