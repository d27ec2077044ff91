//! Per-conversion scratch state: a private profile directory and two ports.
//!
//! The engine refuses to run two instances against one user profile, and it
//! binds its remote-object acceptor by number. Every conversion therefore
//! gets a fresh directory (which also becomes the engine's `HOME`), a port
//! for the engine's acceptor and a second one for the framed control
//! channel served by the bridge helper.
//!
//! The ports are only advisory: they are found by binding throwaway
//! listeners to port 0 and releasing them, so another process can grab one
//! before the engine or helper does. The resolver then times out.

use crate::error::{CleanupError, ConvertError};
use std::net::TcpListener;
use std::path::Path;
use tempfile::TempDir;
use tracing::debug;

/// Prefix of every scratch directory name.
pub const SCRATCH_PREFIX: &str = "oowrap-";

/// A scratch directory plus the ports chosen for the engine.
///
/// Dropping a `Scratch` removes the directory silently. Call
/// [`Scratch::release`] to learn whether removal worked.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
    port: u16,
    control_port: u16,
}

impl Scratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Port of the engine's own acceptor.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Port the bridge helper listens on, when the bridge uses one.
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// Remove the directory tree.
    pub fn release(self) -> Result<(), CleanupError> {
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .map_err(|source| CleanupError::RemoveScratch { path, source })
    }
}

/// Create a fresh scratch directory and pick two free ports.
pub fn allocate() -> Result<Scratch, ConvertError> {
    let dir = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempdir()
        .map_err(|e| ConvertError::Internal(format!("cannot create scratch directory: {e}")))?;
    let (port, control_port) = free_port_pair()
        .map_err(|e| ConvertError::Internal(format!("cannot reserve a local port: {e}")))?;
    debug!(
        "Allocated scratch {}, engine port {port}, control port {control_port}",
        dir.path().display()
    );
    Ok(Scratch {
        dir,
        port,
        control_port,
    })
}

/// Ask the OS for an unused port on the wildcard address.
pub fn free_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(("0.0.0.0", 0))?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Two distinct unused ports. Both listeners are held at once so the OS
/// cannot hand out the same number twice.
pub fn free_port_pair() -> std::io::Result<(u16, u16)> {
    let first = TcpListener::bind(("0.0.0.0", 0))?;
    let second = TcpListener::bind(("0.0.0.0", 0))?;
    Ok((first.local_addr()?.port(), second.local_addr()?.port()))
}
