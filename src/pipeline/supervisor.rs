//! Engine process supervision: launch headless, stop with a grace period.
//!
//! The engine is started with a fixed argument set that makes it listen on
//! the allocated port and keep its profile inside the scratch directory.
//! `HOME` points at the same directory so nothing leaks into (or is read
//! from) the invoking user's configuration.
//!
//! On unix the engine leads its own process group. The stock launcher forks
//! the real office process, and a bridge helper joins the same group, so
//! [`EngineProcess::stop`] signals the whole group rather than one pid.

use crate::bridge::HelperCommand;
use crate::error::{CleanupError, ConvertError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Which supervised process went away first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exited {
    Engine(ExitStatus),
    Helper(ExitStatus),
}

impl fmt::Display for Exited {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exited::Engine(status) => write!(f, "engine exited during startup with {status}"),
            Exited::Helper(status) => write!(f, "bridge helper exited with {status}"),
        }
    }
}

#[derive(Debug)]
struct Helper {
    child: Child,
    pid: u32,
    port: u16,
}

/// A running engine process, plus its bridge helper when one was attached.
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    pid: u32,
    port: u16,
    engine: PathBuf,
    helper: Option<Helper>,
}

impl EngineProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    pub fn helper_pid(&self) -> Option<u32> {
        self.helper.as_ref().map(|h| h.pid)
    }

    /// Port the control channel is reached on: the helper's when there is
    /// one, the engine's otherwise.
    pub fn control_port(&self) -> u16 {
        self.helper.as_ref().map_or(self.port, |h| h.port)
    }

    /// Non-blocking liveness poll of the engine and its helper.
    pub fn exited(&mut self) -> Option<Exited> {
        if let Some(status) = poll(&mut self.child, self.pid) {
            return Some(Exited::Engine(status));
        }
        let helper = self.helper.as_mut()?;
        poll(&mut helper.child, helper.pid).map(Exited::Helper)
    }

    /// Start `cmd` inside the engine's process group.
    pub fn attach_helper(
        &mut self,
        cmd: &HelperCommand,
        scratch: &Path,
        port: u16,
    ) -> Result<(), ConvertError> {
        let launch_error = |reason: String| ConvertError::Launch {
            engine: self.engine.clone(),
            port: self.port,
            reason: format!("bridge helper {}: {reason}", cmd.program.display()),
        };

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.env.iter().map(|(k, v)| (k, v)))
            .env("HOME", scratch)
            .current_dir(scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(self.pid as i32);

        let child = command.spawn().map_err(|e| launch_error(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| launch_error("process reported no id".into()))?;
        info!("Started bridge helper (pid {pid}) on control port {port}");
        self.helper = Some(Helper { child, pid, port });
        Ok(())
    }

    /// Wait up to `grace` for the engine to exit on its own, then kill
    /// whatever is left of its process group.
    ///
    /// Returns the exit code when the engine exited normally within the grace
    /// period. A failed kill is logged, not returned.
    pub async fn stop(mut self, grace: Duration) -> Option<i32> {
        let exit_code = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Engine pid {} exited with {status}", self.pid);
                status.code()
            }
            Ok(Err(e)) => {
                debug!("wait on engine pid {} failed: {e}", self.pid);
                None
            }
            Err(_) => {
                debug!(
                    "Engine pid {} still running after {}ms, killing",
                    self.pid,
                    grace.as_millis()
                );
                None
            }
        };

        // Workers and the helper outlive a leader that exited on its own.
        #[cfg(unix)]
        match kill_group(self.pid) {
            Ok(true) => debug!("Killed process group {}", self.pid),
            Ok(false) => {}
            Err(source) => warn!("{}", CleanupError::Kill { pid: self.pid, source }),
        }

        reap(&mut self.child, self.pid).await;
        if let Some(mut helper) = self.helper.take() {
            reap(&mut helper.child, helper.pid).await;
        }
        exit_code
    }
}

fn poll(child: &mut Child, pid: u32) -> Option<ExitStatus> {
    match child.try_wait() {
        Ok(status) => status,
        Err(e) => {
            debug!("try_wait on pid {pid} failed: {e}");
            None
        }
    }
}

/// Kill `child` unless it already exited, and collect its status.
async fn reap(child: &mut Child, pid: u32) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    match child.kill().await {
        Ok(()) => info!("Killed pid {pid}"),
        Err(source) => warn!("{}", CleanupError::Kill { pid, source }),
    }
}

/// SIGKILL every process in group `pgid`. `Ok(false)` when the group is
/// already empty.
#[cfg(unix)]
fn kill_group(pgid: u32) -> std::io::Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
        Ok(()) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(e) => Err(std::io::Error::from(e)),
    }
}

/// Command-line arguments for a headless engine bound to `port` with its
/// profile in `scratch`.
pub fn launch_args(host: &str, port: u16, scratch: &Path) -> Vec<String> {
    vec![
        format!("--accept=socket,host={host},port={port};urp;StarOffice.ServiceManager"),
        format!("-env:UserInstallation={}", file_url(scratch)),
        "--norestore".into(),
        "--nofirststartwizard".into(),
        "--nologo".into(),
        "--nocrashreport".into(),
        "--nodefault".into(),
        "--norestart".into(),
        "--nolockcheck".into(),
        "--headless".into(),
        "--invisible".into(),
    ]
}

/// `file://` URL for an absolute path, percent-encoding everything outside
/// the RFC 3986 unreserved set and `/`.
pub fn file_url(path: &Path) -> String {
    #[cfg(unix)]
    let bytes: Vec<u8> = {
        use std::os::unix::ffi::OsStrExt;
        path.as_os_str().as_bytes().to_vec()
    };
    #[cfg(not(unix))]
    let bytes: Vec<u8> = {
        let s = path.to_string_lossy().replace('\\', "/");
        if s.starts_with('/') {
            s.into_bytes()
        } else {
            format!("/{s}").into_bytes()
        }
    };

    let mut url = String::from("file://");
    for b in bytes {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                url.push(b as char)
            }
            #[cfg(not(unix))]
            b':' => url.push(':'),
            _ => url.push_str(&format!("%{b:02X}")),
        }
    }
    url
}

/// Spawn the engine.
///
/// Fails with [`ConvertError::Launch`] when the executable cannot be spawned,
/// reports no process id, or is already gone on the first poll.
pub fn start(
    engine: &Path,
    host: &str,
    scratch: &Path,
    port: u16,
) -> Result<EngineProcess, ConvertError> {
    let launch_error = |reason: String| ConvertError::Launch {
        engine: engine.to_path_buf(),
        port,
        reason,
    };

    let mut command = Command::new(engine);
    command
        .args(launch_args(host, port, scratch))
        .env("HOME", scratch)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let mut child = command.spawn().map_err(|e| launch_error(e.to_string()))?;
    let pid = child
        .id()
        .ok_or_else(|| launch_error("process reported no id".into()))?;

    match child.try_wait() {
        Ok(Some(status)) => return Err(launch_error(format!("exited immediately with {status}"))),
        Ok(None) => {}
        Err(e) => return Err(launch_error(format!("cannot poll process: {e}"))),
    }

    info!(
        "Launched engine {} (pid {pid}) on port {port}",
        engine.display()
    );
    Ok(EngineProcess {
        child,
        pid,
        port,
        engine: engine.to_path_buf(),
        helper: None,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn args_bind_port_and_profile() {
        let args = launch_args("localhost", 40123, Path::new("/tmp/oowrap-abc"));
        assert_eq!(
            args[0],
            "--accept=socket,host=localhost,port=40123;urp;StarOffice.ServiceManager"
        );
        assert_eq!(args[1], "-env:UserInstallation=file:///tmp/oowrap-abc");
        assert!(args.contains(&"--headless".to_string()));
        assert!(args.contains(&"--invisible".to_string()));
        assert!(!args.iter().any(|a| a == "--quickstart"));
    }

    #[cfg(unix)]
    #[test]
    fn file_url_escapes_spaces_and_unicode() {
        assert_eq!(
            file_url(Path::new("/tmp/my dir/é")),
            "file:///tmp/my%20dir/%C3%A9"
        );
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let scratch = tempfile::tempdir().unwrap();
        let err = start(
            Path::new("/definitely/not/soffice"),
            "localhost",
            scratch.path(),
            4000,
        )
        .unwrap_err();
        match err {
            ConvertError::Launch { port, engine, .. } => {
                assert_eq!(port, 4000);
                assert_eq!(engine, PathBuf::from("/definitely/not/soffice"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    pub(crate) fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let p = dir.join(name);
        std::fs::write(&p, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&p, std::fs::Permissions::from_mode(0o755)).unwrap();
        p
    }

    /// Running and not a zombie.
    #[cfg(target_os = "linux")]
    pub(crate) fn alive(pid: u32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let state = stat.rsplit_once(") ")?.1.chars().next()?;
                Some(state != 'Z' && state != 'X')
            })
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    pub(crate) async fn wait_until_dead(pid: u32) -> bool {
        for _ in 0..100 {
            if !alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[cfg(unix)]
    pub(crate) async fn read_pid(path: &Path) -> u32 {
        for _ in 0..250 {
            if let Ok(raw) = std::fs::read_to_string(path) {
                if let Ok(pid) = raw.trim().parse() {
                    return pid;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} was never written", path.display());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn home_is_scratch_dir() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let marker = bin.path().join("home.txt");
        let exe = script(
            bin.path(),
            "fake-soffice",
            &format!("printf '%s' \"$HOME\" > '{}'\nexit 0", marker.display()),
        );

        let process = match start(&exe, "localhost", scratch.path(), 4001) {
            Ok(p) => p,
            // The script can finish before the first poll; the marker still tells.
            Err(ConvertError::Launch { .. }) => {
                let home = std::fs::read_to_string(&marker).unwrap();
                assert_eq!(Path::new(&home), scratch.path());
                return;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        };
        assert_eq!(process.stop(Duration::from_secs(5)).await, Some(0));
        let home = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(Path::new(&home), scratch.path());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_kills_a_process_that_ignores_terminate() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let exe = script(bin.path(), "fake-soffice", "exec sleep 30");

        let mut process = start(&exe, "localhost", scratch.path(), 4002).unwrap();
        assert!(process.exited().is_none());
        let pid = process.pid();

        let code = process.stop(Duration::from_millis(100)).await;
        assert_eq!(code, None);
        #[cfg(target_os = "linux")]
        assert!(wait_until_dead(pid).await, "engine pid {pid} survived");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn stop_takes_forked_workers_down_too() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let worker_file = bin.path().join("worker.pid");
        let exe = script(
            bin.path(),
            "fake-soffice",
            &format!("sleep 30 &\necho $! > '{}'\nwait", worker_file.display()),
        );

        let process = start(&exe, "localhost", scratch.path(), 4003).unwrap();
        let worker = read_pid(&worker_file).await;
        assert!(alive(worker));

        process.stop(Duration::from_millis(50)).await;
        assert!(wait_until_dead(worker).await, "worker pid {worker} survived");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn launcher_exiting_early_still_loses_its_worker() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let worker_file = bin.path().join("worker.pid");
        let exe = script(
            bin.path(),
            "fake-soffice",
            &format!(
                "sleep 30 &\necho $! > '{}'\nsleep 0.2\nexit 0",
                worker_file.display()
            ),
        );

        let process = start(&exe, "localhost", scratch.path(), 4004).unwrap();
        let worker = read_pid(&worker_file).await;

        assert_eq!(process.stop(Duration::from_secs(5)).await, Some(0));
        assert!(wait_until_dead(worker).await, "worker pid {worker} survived");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn helper_joins_the_engine_group_and_dies_with_it() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let exe = script(bin.path(), "fake-soffice", "exec sleep 30");
        let helper_exe = script(bin.path(), "fake-helper", "exec sleep 30");

        let mut process = start(&exe, "localhost", scratch.path(), 4005).unwrap();
        let cmd = HelperCommand {
            program: helper_exe,
            args: Vec::new(),
            env: Vec::new(),
        };
        process.attach_helper(&cmd, scratch.path(), 4006).unwrap();
        assert_eq!(process.control_port(), 4006);
        let helper = process.helper_pid().unwrap();

        let stat = std::fs::read_to_string(format!("/proc/{helper}/stat")).unwrap();
        let pgrp: u32 = stat
            .rsplit_once(") ")
            .unwrap()
            .1
            .split_whitespace()
            .nth(2)
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(pgrp, process.pid());

        process.stop(Duration::from_millis(50)).await;
        assert!(wait_until_dead(helper).await, "helper pid {helper} survived");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dead_helper_is_reported() {
        let bin = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let exe = script(bin.path(), "fake-soffice", "exec sleep 30");
        let helper_exe = script(bin.path(), "fake-helper", "exit 4");

        let mut process = start(&exe, "localhost", scratch.path(), 4007).unwrap();
        let cmd = HelperCommand {
            program: helper_exe,
            args: Vec::new(),
            env: Vec::new(),
        };
        process.attach_helper(&cmd, scratch.path(), 4008).unwrap();

        let mut exited = None;
        for _ in 0..100 {
            exited = process.exited();
            if exited.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        match exited {
            Some(Exited::Helper(status)) => assert_eq!(status.code(), Some(4)),
            other => panic!("expected the helper to exit, got {other:?}"),
        }
        process.stop(Duration::from_millis(50)).await;
    }
}
