use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancels its token shortly before the invocation deadline.
///
/// The margin leaves time for workspace cleanup after a stage is cut short.
/// Dropping the guard stops the timer.
pub struct DeadlineGuard {
    token: CancellationToken,
    timer: JoinHandle<()>,
}

impl DeadlineGuard {
    /// Arm a token that fires at `deadline - margin`
    pub fn arm(deadline: SystemTime, margin: Duration) -> Self {
        let token = CancellationToken::new();
        let remaining = deadline
            .duration_since(SystemTime::now())
            .unwrap_or_default()
            .saturating_sub(margin);

        let trigger = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            warn!(
                remaining_ms = remaining.as_millis() as u64,
                "Invocation deadline approaching, cancelling pipeline"
            );
            trigger.cancel();
        });

        Self { token, timer }
    }

    /// Convert a Lambda deadline (milliseconds since the epoch)
    pub fn arm_from_epoch_millis(deadline_ms: u64, margin: Duration) -> Self {
        Self::arm(
            SystemTime::UNIX_EPOCH + Duration::from_millis(deadline_ms),
            margin,
        )
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.timer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fires_at_deadline_minus_margin() {
        let guard = DeadlineGuard::arm(
            SystemTime::now() + Duration::from_millis(5_050),
            Duration::from_secs(5),
        );

        tokio::time::timeout(Duration::from_secs(2), guard.token().cancelled())
            .await
            .expect("token should fire within the window");
    }

    #[tokio::test]
    async fn test_past_deadline_fires_immediately() {
        let guard = DeadlineGuard::arm_from_epoch_millis(0, Duration::from_secs(1));

        tokio::time::timeout(Duration::from_secs(1), guard.token().cancelled())
            .await
            .expect("token should fire immediately");
    }

    #[tokio::test]
    async fn test_distant_deadline_does_not_fire() {
        let guard = DeadlineGuard::arm(
            SystemTime::now() + Duration::from_secs(900),
            Duration::from_secs(5),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!guard.token().is_cancelled());
    }
}
