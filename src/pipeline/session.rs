//! One engine session: process, scratch state and control connection.
//!
//! An `EngineSession` is created per conversion and must end in
//! [`EngineSession::teardown`], which runs on every exit path. If a panic
//! skips it, `kill_on_drop` on the children and the `TempDir` drop still
//! clean up.

use crate::bridge::{ControlSession, EngineBridge, Endpoint, LaunchContext};
use crate::error::ConvertError;
use crate::pipeline::resolver::{self, RetryPolicy};
use crate::pipeline::scratch::Scratch;
use crate::pipeline::supervisor::{self, EngineProcess};
use crate::progress::{EngineLaunch, ProgressCallback};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct EngineSession<S> {
    process: EngineProcess,
    scratch: Scratch,
    control: Option<S>,
}

impl<S: ControlSession> EngineSession<S> {
    /// Launch `engine` inside `scratch`, plus the helper `bridge` asks for.
    ///
    /// On failure everything started so far is stopped and the scratch
    /// directory is released before returning.
    pub async fn open<B>(
        bridge: &B,
        engine: &Path,
        host: &str,
        scratch: Scratch,
        grace: Duration,
    ) -> Result<Self, ConvertError>
    where
        B: EngineBridge<Session = S>,
    {
        let mut process = match supervisor::start(engine, host, scratch.path(), scratch.port()) {
            Ok(process) => process,
            Err(e) => {
                release(scratch);
                return Err(e);
            }
        };

        let launch = LaunchContext {
            engine,
            host,
            engine_port: scratch.port(),
            control_port: scratch.control_port(),
            scratch: scratch.path(),
        };
        let attached = bridge.helper(&launch).and_then(|helper| match helper {
            Some(cmd) => process.attach_helper(&cmd, scratch.path(), scratch.control_port()),
            None => Ok(()),
        });
        if let Err(e) = attached {
            process.stop(grace).await;
            release(scratch);
            return Err(e);
        }

        Ok(Self {
            process,
            scratch,
            control: None,
        })
    }

    pub fn launch_info(&self) -> EngineLaunch {
        EngineLaunch {
            engine: self.process.engine().to_path_buf(),
            pid: self.process.pid(),
            port: self.process.port(),
            control_port: self.process.control_port(),
            helper_pid: self.process.helper_pid(),
            scratch_dir: self.scratch.path().to_path_buf(),
        }
    }

    pub fn port(&self) -> u16 {
        self.process.port()
    }

    /// Resolve the control channel, polling the engine (and helper) between
    /// attempts. Returns the number of attempts used.
    pub async fn connect<B>(
        &mut self,
        bridge: &B,
        host: &str,
        policy: &RetryPolicy,
        progress: Option<&ProgressCallback>,
    ) -> Result<u32, ConvertError>
    where
        B: EngineBridge<Session = S>,
    {
        let endpoint = Endpoint::new(host, self.process.control_port());
        let (control, attempts) =
            resolver::resolve(bridge, &endpoint, policy, Some(&mut self.process), progress)
                .await?;
        self.control = Some(control);
        Ok(attempts)
    }

    /// The control connection, once [`connect`](Self::connect) succeeded.
    pub fn control(&mut self) -> Result<&mut S, ConvertError> {
        self.control
            .as_mut()
            .ok_or_else(|| ConvertError::Internal("control channel not resolved".into()))
    }

    /// Drop the control connection, stop the process group and remove the
    /// scratch directory. Returns the engine's exit code when it reported one.
    pub async fn teardown(self, grace: Duration) -> Option<i32> {
        let EngineSession {
            process,
            scratch,
            control,
        } = self;
        drop(control);

        let pid = process.pid();
        let exit_code = process.stop(grace).await;
        release(scratch);
        debug!("Teardown of engine pid {pid} complete (exit code {exit_code:?})");
        exit_code
    }
}

fn release(scratch: Scratch) {
    let path = scratch.path().to_path_buf();
    match scratch.release() {
        Ok(()) => debug!("Removed scratch {}", path.display()),
        Err(e) => warn!("{e}"),
    }
}
