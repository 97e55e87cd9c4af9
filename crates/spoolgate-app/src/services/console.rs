// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Console decision surface.
//
// Reads presentation requests from a `ChannelGateway` on a dedicated thread
// and asks the operator on the terminal.  Presentations are answered one at a
// time in arrival order.  End of input dismisses the current and every later
// presentation.

use std::io::{BufRead, Write};

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use spoolgate_core::types::{Decision, JobMetadata};
use spoolgate_print::{GatewayMessage, PresentationRequest};

/// Parse one line of operator input.  `None` means "ask again".
pub fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "a" | "approve" | "y" | "yes" => Some(Decision::Approve),
        "r" | "reject" | "n" | "no" => Some(Decision::Reject),
        _ => None,
    }
}

/// Render the prompt shown for a held job.
pub fn describe(metadata: &JobMetadata) -> String {
    format!(
        "Held job {label}\n  document: {doc}\n  pages:    {pages}\n  paper:    {paper}\n",
        label = metadata.label,
        doc = metadata.document_name,
        pages = metadata.page_count,
        paper = metadata.paper_size,
    )
}

/// Spawn the console surface thread.
pub fn spawn(
    rx: UnboundedReceiver<GatewayMessage>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("spoolgate-console".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            serve(rx, stdin.lock(), stdout.lock());
        })
}

/// Answer requests from `rx` using `input`/`output` until the gateway closes.
pub fn serve<R: BufRead, W: Write>(
    mut rx: UnboundedReceiver<GatewayMessage>,
    mut input: R,
    mut output: W,
) {
    let mut input_open = true;
    while let Some(message) = rx.blocking_recv() {
        match message {
            GatewayMessage::Present(request) => {
                if !input_open {
                    debug!(job_id = %request.metadata.job_id, "input closed, dismissing");
                    continue;
                }
                input_open = prompt(request, &mut input, &mut output);
            }
            GatewayMessage::Notice(notice) => {
                let _ = writeln!(
                    output,
                    "\n!! {}\n   {}\n   {}",
                    notice.title, notice.message, notice.suggestion
                );
                let _ = output.flush();
            }
        }
    }
    debug!("decision gateway closed");
}

/// Ask about one job.  Returns false once input has ended.
fn prompt<R: BufRead, W: Write>(
    request: PresentationRequest,
    input: &mut R,
    output: &mut W,
) -> bool {
    let _ = write!(output, "\n{}", describe(&request.metadata));
    loop {
        let _ = write!(output, "[a]pprove / [r]eject: ");
        let _ = output.flush();

        let mut line = String::new();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => {
                info!(job_id = %request.metadata.job_id, "input ended, presentation dismissed");
                return false;
            }
            Ok(_) => {
                if let Some(decision) = parse_answer(&line) {
                    request.respond(decision);
                    return true;
                }
            }
        }
    }
}
