//! Control-channel resolution with a bounded retry loop.
//!
//! A freshly launched engine needs a few seconds before its listener is up.
//! Until then every connection attempt is refused, and that is worth
//! retrying. So is an attempt that gets no handshake within
//! [`RetryPolicy::attempt_timeout`]: a listener that accepts and then stays
//! silent must not stall the loop past its budget. Anything else ends the
//! loop immediately.

use crate::bridge::{ConnectFailure, EngineBridge, Endpoint};
use crate::error::ConvertError;
use crate::pipeline::supervisor::EngineProcess;
use crate::progress::ProgressCallback;
use std::time::Duration;
use tracing::{debug, info};

/// How many times to try, and how long to pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    /// Upper bound on one attempt, handshake included.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            interval: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// Connect to the engine at `endpoint`.
///
/// Returns the session and the number of attempts it took. When `process`
/// is given it is polled before every retry, so an engine that dies during
/// startup ends the loop with [`ConvertError::Launch`] instead of a timeout.
pub async fn resolve<B: EngineBridge>(
    bridge: &B,
    endpoint: &Endpoint,
    policy: &RetryPolicy,
    mut process: Option<&mut EngineProcess>,
    progress: Option<&ProgressCallback>,
) -> Result<(B::Session, u32), ConvertError> {
    let max = policy.max_attempts.max(1);

    for attempt in 1..=max {
        if attempt > 1 {
            tokio::time::sleep(policy.interval).await;
            if let Some(proc) = process.as_deref_mut() {
                if let Some(exited) = proc.exited() {
                    return Err(ConvertError::Launch {
                        engine: proc.engine().to_path_buf(),
                        port: proc.port(),
                        reason: exited.to_string(),
                    });
                }
            }
        }

        if let Some(cb) = progress {
            cb.on_connect_attempt(attempt, max);
        }

        let attempt_result =
            match tokio::time::timeout(policy.attempt_timeout, bridge.connect(endpoint)).await {
                Ok(result) => result,
                Err(_) => {
                    debug!(
                        "Attempt {attempt}/{max} to {endpoint}: no handshake within {}ms",
                        policy.attempt_timeout.as_millis()
                    );
                    continue;
                }
            };

        match attempt_result {
            Ok(session) => {
                info!("Connected to engine at {endpoint} after {attempt} attempt(s)");
                if let Some(cb) = progress {
                    cb.on_connected(attempt);
                }
                return Ok((session, attempt));
            }
            Err(ConnectFailure::NoListener(e)) => {
                debug!("Attempt {attempt}/{max} to {endpoint}: {e}");
            }
            Err(ConnectFailure::Fatal(detail)) => {
                return Err(ConvertError::ControlChannel {
                    port: endpoint.port,
                    detail,
                });
            }
        }
    }

    Err(ConvertError::ConnectTimeout {
        port: endpoint.port,
        attempts: max,
    })
}
