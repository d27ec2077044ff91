//! The engine binding used by [`crate::convert`].
//!
//! [`UnoBridge`] writes a small Python helper into the scratch directory and
//! has the supervisor run it beside the engine. The helper connects to the
//! engine's URP acceptor with the engine's own UNO bindings and serves the
//! framed control protocol on the control port, which this bridge then dials
//! through [`TcpBridge`].

use super::tcp::{TcpBridge, TcpSession};
use super::{ConnectFailure, EngineBridge, Endpoint, HelperCommand, LaunchContext};
use crate::config::ConversionConfig;
use crate::error::ConvertError;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::debug;

/// Source of the helper, run by the engine's Python.
pub const HELPER_SCRIPT: &str = include_str!("uno_bridge.py");

/// File name the helper is written to inside the scratch directory.
pub const HELPER_FILE: &str = "oowrap_bridge.py";

/// Drives a LibreOffice/OpenOffice engine through the UNO helper.
#[derive(Debug, Clone, Default)]
pub struct UnoBridge {
    tcp: TcpBridge,
    python: Option<PathBuf>,
}

impl UnoBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the helper with this interpreter instead of searching for one.
    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    pub fn from_config(config: &ConversionConfig) -> Self {
        Self {
            tcp: TcpBridge::default(),
            python: config.python_path.clone(),
        }
    }
}

#[async_trait]
impl EngineBridge for UnoBridge {
    type Session = TcpSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpSession, ConnectFailure> {
        self.tcp.connect(endpoint).await
    }

    fn helper(&self, launch: &LaunchContext<'_>) -> Result<Option<HelperCommand>, ConvertError> {
        let python = engine_locate::locate_python(launch.engine, self.python.as_deref())
            .map_err(|e| ConvertError::Launch {
                engine: launch.engine.to_path_buf(),
                port: launch.engine_port,
                reason: e.to_string(),
            })?;

        let script = launch.scratch.join(HELPER_FILE);
        std::fs::write(&script, HELPER_SCRIPT).map_err(|e| {
            ConvertError::Internal(format!("cannot write {}: {e}", script.display()))
        })?;
        debug!("Bridge helper {} via {}", script.display(), python.display());

        let mut env = Vec::new();
        if let Some(program) = engine_locate::program_dir(launch.engine) {
            let mut paths = vec![program.clone()];
            if let Some(existing) = std::env::var_os("PYTHONPATH") {
                paths.extend(std::env::split_paths(&existing));
            }
            if let Ok(joined) = std::env::join_paths(paths) {
                env.push((OsString::from("PYTHONPATH"), joined));
            }
            let rc = program.join(if cfg!(windows) { "fundamental.ini" } else { "fundamentalrc" });
            if rc.is_file() {
                let mut bootstrap = OsString::from("vnd.sun.star.pathname:");
                bootstrap.push(&rc);
                env.push((OsString::from("URE_BOOTSTRAP"), bootstrap));
            }
        }

        Ok(Some(HelperCommand {
            program: python,
            args: vec![
                script.into_os_string(),
                "--host".into(),
                launch.host.into(),
                "--engine-port".into(),
                launch.engine_port.to_string().into(),
                "--listen-port".into(),
                launch.control_port.to_string().into(),
            ],
            env,
        }))
    }
}
