//! Periodic removal of registrations whose code lapsed unverified.

use async_trait::async_trait;
use booking_core::environment::Clock;
use booking_runtime::Job;
use std::sync::Arc;
use tracing::{debug, info};

use crate::store::UserStore;

/// Deletes unverified users whose registration code expired.
///
/// Bookings held by a removed user are released with it.
pub struct OtpSweeper {
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl OtpSweeper {
    /// Creates a new `OtpSweeper`
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, clock: Arc<dyn Clock>) -> Self {
        Self { users, clock }
    }
}

#[async_trait]
impl Job for OtpSweeper {
    fn name(&self) -> &str {
        "otp-sweeper"
    }

    async fn run_once(&self) -> anyhow::Result<()> {
        let removed = self.users.delete_expired_unverified(self.clock.now()).await?;
        if removed > 0 {
            info!(removed, "Expired unverified registrations removed");
            metrics::counter!("accounts.registrations_expired").increment(removed);
        } else {
            debug!("No expired registrations");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use crate::types::{OtpCode, PendingOtp, User};
    use booking_runtime::{PeriodicJob, Shutdown};
    use booking_testing::{test_clock, ManualClock};
    use chrono::Duration;

    fn pending(email: &str, expires_at: chrono::DateTime<chrono::Utc>) -> User {
        let mut user = User::new_student(email.into(), "pending1".into(), "pw".into());
        user.registration_otp = Some(PendingOtp { code: OtpCode::new(123_456), expires_at });
        user
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let clock = ManualClock::new(test_clock().now());
        store
            .insert_user(&pending("a@graduate.utm.my", clock.now() + Duration::minutes(10)))
            .await
            .unwrap();
        let sweeper = OtpSweeper::new(store.clone(), Arc::new(clock.clone()));

        sweeper.run_once().await.unwrap();
        assert!(store.find_user("a@graduate.utm.my").await.unwrap().is_some());

        clock.advance(Duration::minutes(10));
        sweeper.run_once().await.unwrap();
        sweeper.run_once().await.unwrap();
        assert!(store.find_user("a@graduate.utm.my").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn supervised_sweep_stops_on_shutdown() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let clock = test_clock();
        store
            .insert_user(&pending("b@graduate.utm.my", clock.now() - Duration::seconds(1)))
            .await
            .unwrap();

        let shutdown = Shutdown::new();
        let job = PeriodicJob::spawn(
            Arc::new(OtpSweeper::new(store.clone(), Arc::new(clock))),
            std::time::Duration::from_millis(10),
            shutdown.subscribe(),
        );
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.trigger();
        let stats = job.join().await;

        assert!(stats.completed >= 1);
        assert_eq!(stats.failed, 0);
        assert!(store.find_user("b@graduate.utm.my").await.unwrap().is_none());
    }
}
