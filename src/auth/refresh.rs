// Token refresh scheduling
// One periodic task per alias group, cancelled by terminate()

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::manager::{Inner, TokenManager};

/// Periodic refresh of one alias group
///
/// The task only holds a weak reference, so dropping the last manager handle
/// ends the loop as well.
pub(super) struct RefreshDigest {
    aliases: Vec<String>,
    handle: JoinHandle<()>,
}

impl RefreshDigest {
    /// Start refreshing `aliases` every `period`, first tick after one period
    pub(super) fn start(
        manager: Weak<Inner>,
        aliases: Vec<String>,
        period: Duration,
        max_failures: Option<u32>,
    ) -> Self {
        let group = aliases.clone();

        let handle = tokio::spawn(async move {
            let Some(start) = Instant::now().checked_add(period) else {
                tracing::error!("Refresh interval {:?} is out of range, {} is not refreshed", period, group[0]);
                return;
            };
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Consecutive transient failures
            let mut failures: u32 = 0;

            loop {
                interval.tick().await;

                let Some(inner) = manager.upgrade() else {
                    break;
                };
                let manager = TokenManager::from_inner(inner);

                tracing::debug!("refresh {} token", group[0]);

                match manager.refresh(&group).await {
                    Ok(_) => failures = 0,
                    Err(e) if e.is_fatal() => {
                        tracing::error!("{}, terminating token manager", e);
                        manager.terminate();
                        break;
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(
                            aliases = ?group,
                            failures = failures,
                            "Token refresh failed: {}",
                            e
                        );

                        if max_failures.is_some_and(|limit| failures >= limit) {
                            tracing::error!(
                                "Token refresh for {} failed {} times in a row, terminating token manager",
                                group[0],
                                failures
                            );
                            manager.terminate();
                            break;
                        }
                    }
                }
            }
        });

        Self { aliases, handle }
    }

    pub(super) fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Stop the schedule; an in-flight round-trip is left to finish on its own
    pub(super) fn cancel(self) {
        self.handle.abort();
    }
}
