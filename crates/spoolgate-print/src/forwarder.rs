// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dispatch of approved jobs to the real device.
//
// One call is one attempt: there is no retry here.  The device handle is
// closed on every path, including after a failed step.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use spoolgate_core::error::{Result, SpoolgateError};

use crate::device::{DeviceConnector, DeviceHandle};

/// Sends job bytes to a named device as an uninterpreted raw stream.
#[derive(Clone)]
pub struct DispatchForwarder {
    connector: Arc<dyn DeviceConnector>,
    device_name: String,
}

impl DispatchForwarder {
    pub fn new(connector: Arc<dyn DeviceConnector>, device_name: impl Into<String>) -> Self {
        Self {
            connector,
            device_name: device_name.into(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// True only if every spool step succeeded.
    pub fn forward(&self, bytes: &[u8], job_label: &str) -> bool {
        self.try_forward(bytes, job_label).is_ok()
    }

    /// Like [`forward`](Self::forward) but reports which step failed.
    #[instrument(skip(self, bytes), fields(device = %self.device_name, len = bytes.len()))]
    pub fn try_forward(&self, bytes: &[u8], job_label: &str) -> Result<()> {
        let mut handle = self.connector.open(&self.device_name).inspect_err(|e| {
            warn!(error = %e, "device open failed");
        })?;

        let sent = transmit(handle.as_mut(), bytes, job_label);
        let closed = handle.close();

        match (sent, closed) {
            (Ok(()), Ok(())) => {
                info!(job = job_label, "job forwarded");
                Ok(())
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    warn!(error = %close_err, "device close failed after error");
                }
                warn!(error = %e, "forwarding failed");
                Err(e)
            }
            (Ok(()), Err(e)) => {
                warn!(error = %e, "device close failed");
                Err(e)
            }
        }
    }
}

fn transmit(handle: &mut dyn DeviceHandle, bytes: &[u8], job_label: &str) -> Result<()> {
    handle.start_document(job_label)?;
    handle.start_page()?;
    let written = handle.write(bytes)?;
    if written != bytes.len() {
        return Err(SpoolgateError::DeviceStep {
            step: "write",
            detail: format!("device accepted {written} of {} bytes", bytes.len()),
        });
    }
    handle.end_page()?;
    handle.end_document()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Device that records every step and can be told to fail one.
    #[derive(Default)]
    struct ScriptedDevice {
        fail_at: Option<&'static str>,
        short_write: bool,
        steps: Arc<Mutex<Vec<&'static str>>>,
    }

    struct ScriptedHandle {
        fail_at: Option<&'static str>,
        short_write: bool,
        steps: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ScriptedHandle {
        fn step(&self, name: &'static str) -> Result<()> {
            self.steps.lock().unwrap().push(name);
            if self.fail_at == Some(name) {
                return Err(SpoolgateError::DeviceStep {
                    step: name,
                    detail: "scripted failure".into(),
                });
            }
            Ok(())
        }
    }

    impl DeviceConnector for ScriptedDevice {
        fn open(&self, device_name: &str) -> Result<Box<dyn DeviceHandle>> {
            self.steps.lock().unwrap().push("open");
            if self.fail_at == Some("open") {
                return Err(SpoolgateError::DeviceOpen {
                    device: device_name.into(),
                    detail: "offline".into(),
                });
            }
            Ok(Box::new(ScriptedHandle {
                fail_at: self.fail_at,
                short_write: self.short_write,
                steps: self.steps.clone(),
            }))
        }
    }

    impl DeviceHandle for ScriptedHandle {
        fn start_document(&mut self, _label: &str) -> Result<()> {
            self.step("start-document")
        }
        fn start_page(&mut self) -> Result<()> {
            self.step("start-page")
        }
        fn write(&mut self, bytes: &[u8]) -> Result<usize> {
            self.step("write")?;
            Ok(if self.short_write { bytes.len() / 2 } else { bytes.len() })
        }
        fn end_page(&mut self) -> Result<()> {
            self.step("end-page")
        }
        fn end_document(&mut self) -> Result<()> {
            self.step("end-document")
        }
        fn close(self: Box<Self>) -> Result<()> {
            self.step("close")
        }
    }

    fn forwarder(device: ScriptedDevice) -> (DispatchForwarder, Arc<Mutex<Vec<&'static str>>>) {
        let steps = device.steps.clone();
        (DispatchForwarder::new(Arc::new(device), "office"), steps)
    }

    #[test]
    fn all_steps_in_order() {
        let (fwd, steps) = forwarder(ScriptedDevice::default());
        assert!(fwd.forward(b"PK job", "12"));
        assert_eq!(
            *steps.lock().unwrap(),
            vec![
                "open",
                "start-document",
                "start-page",
                "write",
                "end-page",
                "end-document",
                "close"
            ]
        );
    }

    #[test]
    fn failed_step_still_closes() {
        for step in ["start-document", "start-page", "write", "end-page", "end-document"] {
            let (fwd, steps) = forwarder(ScriptedDevice {
                fail_at: Some(step),
                ..Default::default()
            });
            assert!(!fwd.forward(b"PK job", "12"), "failure at {step}");
            let steps = steps.lock().unwrap();
            assert_eq!(steps.last(), Some(&"close"), "handle left open after {step}");
        }
    }

    #[test]
    fn open_failure() {
        let (fwd, steps) = forwarder(ScriptedDevice {
            fail_at: Some("open"),
            ..Default::default()
        });
        let err = fwd.try_forward(b"PK", "1").unwrap_err();
        assert!(matches!(err, SpoolgateError::DeviceOpen { .. }));
        assert_eq!(*steps.lock().unwrap(), vec!["open"]);
    }

    #[test]
    fn close_failure_is_a_failure() {
        let (fwd, _) = forwarder(ScriptedDevice {
            fail_at: Some("close"),
            ..Default::default()
        });
        assert!(!fwd.forward(b"PK", "1"));
    }

    #[test]
    fn short_write_is_a_failure() {
        let (fwd, steps) = forwarder(ScriptedDevice {
            short_write: true,
            ..Default::default()
        });
        let err = fwd.try_forward(b"PK job bytes", "1").unwrap_err();
        assert!(matches!(err, SpoolgateError::DeviceStep { step: "write", .. }));
        assert_eq!(steps.lock().unwrap().last(), Some(&"close"));
    }
}
