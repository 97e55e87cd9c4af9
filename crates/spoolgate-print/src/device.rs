// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Real-device spool facade.
//
// A device is driven like a print spooler's raw datatype: open a handle,
// start a document, start a page, write the job bytes verbatim, end the page,
// end the document, close.  The bytes are never interpreted; the device must
// understand the container format natively.
//
// Two devices ship with Spoolgate:
//
//   - `RawTcpConnector`    JetDirect-style raw socket (port 9100).
//   - `DirectoryConnector` file-port style: each document is written to a
//                          directory, appearing only once complete.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use spoolgate_core::error::{Result, SpoolgateError};

/// Default raw TCP port (HP JetDirect).
pub const RAW_PORT: u16 = 9100;

/// Timeout for raw TCP connect and writes.
const RAW_TIMEOUT_SECS: u64 = 60;

/// Chunk size for raw writes.
const CHUNK_SIZE: usize = 8192;

/// Opens handles to a real output device.
pub trait DeviceConnector: Send + Sync {
    fn open(&self, device_name: &str) -> Result<Box<dyn DeviceHandle>>;
}

/// An open device handle.  Steps are called in spool order; `close` is
/// always called last, whether or not the earlier steps succeeded.
pub trait DeviceHandle: Send {
    fn start_document(&mut self, label: &str) -> Result<()>;
    fn start_page(&mut self) -> Result<()>;
    /// Write job bytes; returns how many bytes the device accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize>;
    fn end_page(&mut self) -> Result<()>;
    fn end_document(&mut self) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
}

fn step_err(step: &'static str, e: impl std::fmt::Display) -> SpoolgateError {
    SpoolgateError::DeviceStep {
        step,
        detail: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Raw TCP
// ---------------------------------------------------------------------------

/// Raw socket device; `device_name` is `host` or `host:port`.
///
/// The socket is a `tokio` stream.  Handle methods block on the runtime that
/// was current when the handle was opened, so they must be called from a
/// blocking context such as `spawn_blocking`.
#[derive(Debug, Clone, Copy)]
pub struct RawTcpConnector {
    timeout: Duration,
}

impl Default for RawTcpConnector {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(RAW_TIMEOUT_SECS),
        }
    }
}

impl RawTcpConnector {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl DeviceConnector for RawTcpConnector {
    fn open(&self, device_name: &str) -> Result<Box<dyn DeviceHandle>> {
        let target = if device_name.contains(':') {
            device_name.to_string()
        } else {
            format!("{device_name}:{RAW_PORT}")
        };
        let open_err = |detail: String| SpoolgateError::DeviceOpen {
            device: device_name.to_string(),
            detail,
        };

        let runtime = Handle::try_current()
            .map_err(|e| open_err(format!("no async runtime: {e}")))?;

        info!(addr = %target, "connecting via raw TCP");
        let stream = runtime
            .block_on(tokio::time::timeout(self.timeout, TcpStream::connect(&target)))
            .map_err(|_| {
                open_err(format!(
                    "connection to {target} timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| open_err(format!("connect {target}: {e}")))?;

        Ok(Box::new(RawTcpHandle {
            runtime,
            stream,
            timeout: self.timeout,
            sent: 0,
        }))
    }
}

struct RawTcpHandle {
    runtime: Handle,
    stream: TcpStream,
    timeout: Duration,
    sent: usize,
}

/// Drive one socket operation to completion on `runtime`, bounded by
/// `timeout`.
fn block_on_io<T>(
    runtime: &Handle,
    timeout: Duration,
    op: impl Future<Output = std::io::Result<T>>,
) -> std::io::Result<T> {
    runtime
        .block_on(tokio::time::timeout(timeout, op))
        .unwrap_or_else(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {}s", timeout.as_secs()),
            ))
        })
}

impl DeviceHandle for RawTcpHandle {
    // A raw socket has no document or page framing.
    fn start_document(&mut self, label: &str) -> Result<()> {
        debug!(label, "raw TCP document started");
        Ok(())
    }

    fn start_page(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        for chunk in bytes.chunks(CHUNK_SIZE) {
            block_on_io(&self.runtime, self.timeout, self.stream.write_all(chunk)).map_err(|e| {
                step_err("write", format!("raw TCP send failed at byte {}: {e}", self.sent))
            })?;
            self.sent += chunk.len();
        }
        debug!(sent = self.sent, "raw TCP progress");
        Ok(bytes.len())
    }

    fn end_page(&mut self) -> Result<()> {
        Ok(())
    }

    fn end_document(&mut self) -> Result<()> {
        block_on_io(&self.runtime, self.timeout, self.stream.flush())
            .map_err(|e| step_err("end-document", format!("raw TCP flush: {e}")))
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        block_on_io(&self.runtime, self.timeout, self.stream.shutdown())
            .map_err(|e| step_err("close", format!("raw TCP shutdown: {e}")))?;
        info!(total = self.sent, "raw TCP connection closed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Directory (file port)
// ---------------------------------------------------------------------------

/// File-port device; `device_name` is an existing output directory.
///
/// Each document is written to `<label>.part` and renamed to
/// `<label>.<extension>` when the document ends, so readers of the directory
/// never see a partial job.  A document that is closed without ending is
/// removed.
#[derive(Debug, Clone)]
pub struct DirectoryConnector {
    extension: String,
}

impl Default for DirectoryConnector {
    fn default() -> Self {
        Self::new("xps")
    }
}

impl DirectoryConnector {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl DeviceConnector for DirectoryConnector {
    fn open(&self, device_name: &str) -> Result<Box<dyn DeviceHandle>> {
        let dir = PathBuf::from(device_name);
        if !dir.is_dir() {
            return Err(SpoolgateError::DeviceOpen {
                device: device_name.to_string(),
                detail: "not a directory".into(),
            });
        }
        Ok(Box::new(DirectoryHandle {
            dir,
            extension: self.extension.clone(),
            document: None,
        }))
    }
}

struct OpenDocument {
    file: File,
    part_path: PathBuf,
    final_path: PathBuf,
    pages: u32,
}

struct DirectoryHandle {
    dir: PathBuf,
    extension: String,
    document: Option<OpenDocument>,
}

impl DirectoryHandle {
    fn document(&mut self, step: &'static str) -> Result<&mut OpenDocument> {
        self.document
            .as_mut()
            .ok_or_else(|| step_err(step, "no document started"))
    }
}

/// Keep file names to a safe character set.
fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() { "job".into() } else { cleaned }
}

/// First `<stem>.<ext>`, `<stem>-1.<ext>`, ... that does not exist yet.
fn unused_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let mut candidate = dir.join(format!("{stem}.{extension}"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}-{n}.{extension}"));
        n += 1;
    }
    candidate
}

impl DeviceHandle for DirectoryHandle {
    fn start_document(&mut self, label: &str) -> Result<()> {
        if self.document.is_some() {
            return Err(step_err("start-document", "document already started"));
        }
        let stem = sanitize(label);
        let part_path = self.dir.join(format!("{stem}.part"));
        let final_path = unused_path(&self.dir, &stem, &self.extension);
        let file = File::create(&part_path).map_err(|e| step_err("start-document", e))?;
        debug!(path = %part_path.display(), "document started");
        self.document = Some(OpenDocument {
            file,
            part_path,
            final_path,
            pages: 0,
        });
        Ok(())
    }

    fn start_page(&mut self) -> Result<()> {
        self.document("start-page")?.pages += 1;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let doc = self.document("write")?;
        doc.file.write_all(bytes).map_err(|e| step_err("write", e))?;
        Ok(bytes.len())
    }

    fn end_page(&mut self) -> Result<()> {
        self.document("end-page").map(|_| ())
    }

    fn end_document(&mut self) -> Result<()> {
        let doc = self
            .document
            .take()
            .ok_or_else(|| step_err("end-document", "no document started"))?;
        doc.file
            .sync_all()
            .map_err(|e| step_err("end-document", e))?;
        drop(doc.file);
        std::fs::rename(&doc.part_path, &doc.final_path)
            .map_err(|e| step_err("end-document", e))?;
        info!(path = %doc.final_path.display(), pages = doc.pages, "document written");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        if let Some(doc) = this.document {
            drop(doc.file);
            if let Err(e) = std::fs::remove_file(&doc.part_path) {
                warn!(path = %doc.part_path.display(), error = %e, "failed to remove partial document");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn directory_device_writes_complete_document() {
        let dir = tempfile::tempdir().unwrap();
        let connector = DirectoryConnector::default();
        let mut handle = connector.open(dir.path().to_str().unwrap()).unwrap();

        handle.start_document("12").unwrap();
        handle.start_page().unwrap();
        let payload = b"PK\x03\x04 job";
        assert_eq!(handle.write(payload).unwrap(), payload.len());
        handle.end_page().unwrap();
        handle.end_document().unwrap();
        handle.close().unwrap();

        let out = dir.path().join("12.xps");
        assert_eq!(std::fs::read(&out).unwrap(), b"PK\x03\x04 job");
        assert!(!dir.path().join("12.part").exists());
    }

    #[test]
    fn directory_device_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("7.xps"), b"older").unwrap();

        let mut handle = DirectoryConnector::default()
            .open(dir.path().to_str().unwrap())
            .unwrap();
        handle.start_document("7").unwrap();
        handle.start_page().unwrap();
        handle.write(b"newer").unwrap();
        handle.end_page().unwrap();
        handle.end_document().unwrap();
        handle.close().unwrap();

        assert_eq!(std::fs::read(dir.path().join("7.xps")).unwrap(), b"older");
        assert_eq!(std::fs::read(dir.path().join("7-1.xps")).unwrap(), b"newer");
    }

    #[test]
    fn unfinished_document_is_removed_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let mut handle = DirectoryConnector::default()
            .open(dir.path().to_str().unwrap())
            .unwrap();
        handle.start_document("3").unwrap();
        handle.write(b"partial").unwrap();
        handle.close().unwrap();

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn directory_device_requires_directory() {
        let err = DirectoryConnector::default()
            .open("/no/such/printer/dir")
            .err()
            .expect("open must fail");
        assert!(matches!(err, SpoolgateError::DeviceOpen { .. }));
    }

    #[test]
    fn label_is_sanitized() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize(""), "job");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn raw_tcp_streams_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let reader = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            conn.read_to_end(&mut received).unwrap();
            received
        });

        let payload = vec![0x5Au8; 20_000];
        let sent = payload.clone();
        tokio::task::spawn_blocking(move || {
            let mut handle = RawTcpConnector::default()
                .open(&addr.to_string())
                .unwrap();
            handle.start_document("1").unwrap();
            handle.start_page().unwrap();
            assert_eq!(handle.write(&sent).unwrap(), sent.len());
            handle.end_page().unwrap();
            handle.end_document().unwrap();
            handle.close().unwrap();
        })
        .await
        .unwrap();

        assert_eq!(reader.join().unwrap(), payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn raw_tcp_refused_is_open_error() {
        // Bind then drop to get a port nobody listens on.
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = tokio::task::spawn_blocking(move || {
            RawTcpConnector::with_timeout(Duration::from_secs(2))
                .open(&format!("127.0.0.1:{port}"))
                .err()
                .expect("connect must fail")
        })
        .await
        .unwrap();
        assert!(matches!(err, SpoolgateError::DeviceOpen { .. }));
    }

    #[test]
    fn raw_tcp_needs_a_runtime() {
        let err = RawTcpConnector::default()
            .open("127.0.0.1:9")
            .err()
            .expect("open must fail outside a runtime");
        assert!(matches!(err, SpoolgateError::DeviceOpen { .. }));
    }
}
