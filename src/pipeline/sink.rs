//! Output sink adapter: the engine writes, the caller's stream receives.

use crate::bridge::OutputStream;
use std::fs::File;
use std::io::{self, IsTerminal, Stdout, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// A writable destination for exported bytes.
///
/// `is_interactive` marks targets that must stay open after the export
/// finishes (a terminal on standard output).
pub trait SinkTarget: Write + Send {
    fn is_interactive(&self) -> bool {
        false
    }
}

impl SinkTarget for Stdout {
    fn is_interactive(&self) -> bool {
        self.is_terminal()
    }
}

impl SinkTarget for File {
    fn is_interactive(&self) -> bool {
        self.is_terminal()
    }
}

impl SinkTarget for Vec<u8> {}

impl<T: SinkTarget + ?Sized> SinkTarget for Box<T> {
    fn is_interactive(&self) -> bool {
        (**self).is_interactive()
    }
}

/// A cloneable in-memory target; every clone sees the same bytes.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    pub fn into_inner(self) -> Vec<u8> {
        match Arc::try_unwrap(self.0) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()),
            Err(shared) => shared.lock().unwrap_or_else(|e| e.into_inner()).clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SinkTarget for SharedBuffer {}

/// Wraps a [`SinkTarget`] and implements the engine's output capability set.
///
/// Writes are forwarded in order without extra buffering. `close_output` is
/// idempotent and releases the target unless it is interactive.
#[derive(Debug)]
pub struct OutputSink<T: SinkTarget> {
    target: Option<T>,
    closed: bool,
    bytes_written: u64,
}

impl<T: SinkTarget> OutputSink<T> {
    pub fn new(target: T) -> Self {
        Self {
            target: Some(target),
            closed: false,
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The target, if it has not been released by `close_output`.
    pub fn into_inner(self) -> Option<T> {
        self.target
    }

    fn open_target(&mut self) -> io::Result<&mut T> {
        match (&mut self.target, self.closed) {
            (Some(target), false) => Ok(target),
            _ => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "output sink already closed",
            )),
        }
    }
}

impl<T: SinkTarget> OutputStream for OutputSink<T> {
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        self.open_target()?.write_all(data)?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.open_target()?.flush()
    }

    fn close_output(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Some(target) = self.target.as_mut() else {
            return Ok(());
        };
        target.flush()?;
        if !target.is_interactive() {
            // Dropping releases the descriptor.
            self.target = None;
        }
        Ok(())
    }
}
