use std::process::ExitStatus;
use std::time::Duration;

use bb8::ManageConnection as _;

use redis::RedisError;

use crate::connection::{self, RedisConnectionManager};

/// Bounded polling schedule for the readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts; at least one attempt is always made.
    pub attempts: u32,
    /// Pause between two attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_ATTEMPTS: u32 = 1000;
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Time spent sleeping between attempts when every attempt fails.
    pub fn worst_case(&self) -> Duration {
        self.interval.saturating_mul(self.attempts.saturating_sub(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_INTERVAL)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no answer to PING after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: RedisError },
    #[error("server exited ({status}) after {attempts} attempts: {last_error}")]
    Exited {
        status: ExitStatus,
        attempts: u32,
        last_error: RedisError,
    },
}

/// Polls the server with `PING` until it answers.
///
/// Process start and readiness to accept connections are not synchronous, and a successful
/// round-trip is the only portable readiness signal. Each attempt uses a fresh connection which is
/// released before the next one. `exit_status` is checked after each failed attempt: a server
/// that already exited will never answer, so polling stops there.
pub(crate) async fn wait_until_ready<F>(
    manager: &RedisConnectionManager,
    policy: RetryPolicy,
    mut exit_status: F,
) -> Result<(), ProbeError>
where
    F: FnMut() -> Option<ExitStatus>,
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        let last_error = match ping_once(manager).await {
            Ok(()) => {
                debug!(attempts, "Server answered PING");
                return Ok(());
            }
            Err(error) => error,
        };

        if let Some(status) = exit_status() {
            return Err(ProbeError::Exited {
                status,
                attempts,
                last_error,
            });
        }

        if attempts >= policy.attempts {
            return Err(ProbeError::Exhausted { attempts, last_error });
        }

        trace!(attempts, error = %last_error, "Server not ready yet");

        tokio::time::sleep(policy.interval).await;
    }
}

async fn ping_once(manager: &RedisConnectionManager) -> Result<(), RedisError> {
    let mut conn = manager.connect().await?;
    connection::ping(&mut conn).await
}
