//! Bounded-retry exclusive open
//!
//! A port held by another process is retried at a fixed interval up to a
//! fixed number of attempts. Any other refusal fails at once.

use std::time::Duration;

use tracing::debug;

use crate::error::{OpenFailure, ProbeError};
use crate::transport::SerialTransport;

/// Delay between attempts on a locked port
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// Total open attempts before giving up on a locked port
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Retry schedule for lock contention
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Opens ports, waiting out other processes' locks
#[derive(Debug, Clone, Default)]
pub struct LockRetryOpener {
    policy: RetryPolicy,
}

impl LockRetryOpener {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Open `path`, retrying verbatim while it is locked
    ///
    /// The wait between attempts is a timer owned by the returned future;
    /// dropping the future cancels any pending retry.
    pub async fn open<T>(
        &self,
        transport: &T,
        path: &str,
        baud_rate: u32,
    ) -> Result<T::Port, ProbeError>
    where
        T: SerialTransport,
    {
        let mut attempts = 0;

        loop {
            match transport.open(path, baud_rate) {
                Ok(port) => {
                    debug!("Opened {} at {} baud", path, baud_rate);
                    return Ok(port);
                }
                Err(OpenFailure::PortBusy(_)) => {
                    attempts += 1;
                    if attempts >= self.policy.max_attempts {
                        debug!("{} still locked after {} attempts", path, attempts);
                        return Err(ProbeError::LockTimeout {
                            port: path.to_string(),
                            attempts,
                        });
                    }
                    debug!(
                        "{} is locked (attempt {}/{}), retrying in {:?}",
                        path, attempts, self.policy.max_attempts, self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(OpenFailure::Device { reason, .. }) => {
                    debug!("Failed to open {}: {}", path, reason);
                    return Err(ProbeError::OpenFailed {
                        port: path.to_string(),
                        reason,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockDevice, MockTransport};

    const PATH: &str = "/dev/ttyUSB0";

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_lock_is_released() {
        for held in 0..DEFAULT_MAX_ATTEMPTS {
            let transport =
                MockTransport::new().with_device(PATH, MockDevice::silent().locked_for(held));

            let port = LockRetryOpener::default()
                .open(&transport, PATH, 9600)
                .await;

            assert!(port.is_ok(), "lock held {held} times");
            let attempts = transport.open_attempts(PATH);
            assert_eq!(attempts.len() as u32, held + 1);
            for pair in attempts.windows(2) {
                let gap = pair[1] - pair[0];
                assert!(gap >= DEFAULT_RETRY_DELAY, "gap {gap:?}");
                assert!(gap < DEFAULT_RETRY_DELAY + Duration::from_millis(5), "gap {gap:?}");
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let transport = MockTransport::new().with_device(PATH, MockDevice::silent().locked_for(10));

        let err = LockRetryOpener::default()
            .open(&transport, PATH, 9600)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProbeError::LockTimeout { ref port, attempts: 5 } if port == PATH
        ));
        assert_eq!(transport.open_attempts(PATH).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_held_exactly_max_attempts_times_out() {
        let transport = MockTransport::new()
            .with_device(PATH, MockDevice::silent().locked_for(DEFAULT_MAX_ATTEMPTS));

        let result = LockRetryOpener::default().open(&transport, PATH, 9600).await;

        assert!(matches!(result, Err(ProbeError::LockTimeout { .. })));
        assert_eq!(transport.open_attempts(PATH).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_error_is_not_retried() {
        let transport = MockTransport::new()
            .with_device(PATH, MockDevice::silent().failing("Permission denied"));
        let start = tokio::time::Instant::now();

        let err = LockRetryOpener::default()
            .open(&transport, PATH, 9600)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ProbeError::OpenFailed { ref reason, .. } if reason == "Permission denied"
        ));
        assert_eq!(transport.open_attempts(PATH).len(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_policy() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(250),
            max_attempts: 2,
        };
        let transport = MockTransport::new().with_device(PATH, MockDevice::silent().locked_for(2));
        let start = tokio::time::Instant::now();

        let result = LockRetryOpener::new(policy).open(&transport, PATH, 9600).await;

        assert!(matches!(result, Err(ProbeError::LockTimeout { attempts: 2, .. })));
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_the_future_cancels_the_retry() {
        let transport = MockTransport::new().with_device(PATH, MockDevice::silent().locked_for(3));
        let opener = LockRetryOpener::default();

        let result = tokio::time::timeout(
            Duration::from_millis(1500),
            opener.open(&transport, PATH, 9600),
        )
        .await;
        assert!(result.is_err());
        assert_eq!(transport.open_attempts(PATH).len(), 2);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.open_attempts(PATH).len(), 2);
    }
}
