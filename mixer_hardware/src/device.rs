//! Byte-stream command channel backed by a reader thread.
//!
//! The reader thread owns the read half of the stream and forwards chunks
//! over an unbounded channel, so `available_bytes` never blocks. Writes go
//! straight to the write half with the configured terminator appended.

use crate::error::{HwError, Result};
use crossbeam_channel as xch;
use mixer_traits::{ChannelError, CommandChannel};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Back-off when the stream reports `WouldBlock`/`TimedOut`.
const IDLE_BACKOFF: Duration = Duration::from_millis(2);

enum ReaderEvent {
    Bytes(Vec<u8>),
    Closed(String),
}

pub struct DeviceChannel<W: Write> {
    writer: W,
    terminator: Vec<u8>,
    rx: xch::Receiver<ReaderEvent>,
    buf: Vec<u8>,
    /// Why the read side ended, once it has.
    closed: Option<String>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl DeviceChannel<File> {
    /// Open a device node (e.g. `/dev/ttyACM0`) for reading and writing.
    ///
    /// Line settings (baud, raw mode) are expected to be configured already.
    pub fn open(path: &Path, terminator: &[u8]) -> Result<Self> {
        let open_err = |source| HwError::Open {
            path: path.display().to_string(),
            source,
        };
        let writer = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(open_err)?;
        let reader = writer.try_clone().map_err(open_err)?;
        tracing::info!(path = %path.display(), "device channel opened");
        Ok(Self::from_parts(reader, writer, terminator))
    }
}

impl<W: Write> DeviceChannel<W> {
    pub fn from_parts<R: Read + Send + 'static>(mut reader: R, writer: W, terminator: &[u8]) -> Self {
        let (tx, rx) = xch::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let join_handle = std::thread::spawn(move || {
            let mut chunk = [0u8; 64];
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    tracing::debug!("device reader received shutdown signal");
                    break;
                }
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        let _ = tx.send(ReaderEvent::Closed("end of stream".into()));
                        break;
                    }
                    Ok(n) => {
                        // If send fails, the channel is gone; exit quietly
                        if tx.send(ReaderEvent::Bytes(chunk[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                        std::thread::sleep(IDLE_BACKOFF);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "device read failed");
                        let _ = tx.send(ReaderEvent::Closed(e.to_string()));
                        break;
                    }
                }
            }
            tracing::trace!("device reader exiting");
        });

        Self {
            writer,
            terminator: terminator.to_vec(),
            rx,
            buf: Vec::new(),
            closed: None,
            shutdown,
            join_handle: Some(join_handle),
        }
    }

    /// Whether the read side has ended (bytes may still be buffered).
    pub fn is_closed(&mut self) -> bool {
        self.drain();
        self.closed.is_some()
    }

    fn drain(&mut self) {
        loop {
            match self.rx.try_recv() {
                Ok(ReaderEvent::Bytes(b)) => self.buf.extend_from_slice(&b),
                Ok(ReaderEvent::Closed(reason)) => {
                    tracing::info!(%reason, "device channel closed");
                    self.closed = Some(reason);
                }
                Err(xch::TryRecvError::Empty) => break,
                Err(xch::TryRecvError::Disconnected) => {
                    if self.closed.is_none() {
                        self.closed = Some("reader thread exited".into());
                    }
                    break;
                }
            }
        }
    }
}

impl<W: Write> CommandChannel for DeviceChannel<W> {
    fn send(&mut self, payload: &[u8]) -> std::result::Result<(), ChannelError> {
        self.drain();
        if self.closed.is_some() {
            return Err(Box::new(HwError::Disconnected));
        }
        let mut frame = Vec::with_capacity(payload.len() + self.terminator.len());
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&self.terminator);
        self.writer
            .write_all(&frame)
            .and_then(|()| self.writer.flush())
            .map_err(|e| Box::new(HwError::Io(e)) as ChannelError)
    }

    fn available_bytes(&mut self) -> std::result::Result<&[u8], ChannelError> {
        self.drain();
        if self.buf.is_empty() && self.closed.is_some() {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(&self.buf)
    }

    fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
    }
}

impl<W: Write> Drop for DeviceChannel<W> {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        // A reader parked in a blocking read only sees the flag once read()
        // returns, so only join threads that are already done.
        if let Some(handle) = self.join_handle.take() {
            if handle.is_finished() {
                if handle.join().is_err() {
                    tracing::warn!("device reader thread panicked");
                }
            } else {
                tracing::trace!("device reader still blocked in read; detaching");
            }
        }
    }
}
