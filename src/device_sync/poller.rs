use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use super::controller::{Controller, PollEvent};
use super::model::{SyncAttempt, SyncStatus};
use super::notify::Notifier;
use super::service::SyncService;

/// Why the poller returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The attempt left `Syncing` (completed, errored, or was never running).
    Settled(SyncStatus),
    /// The caller stopped watching; the attempt stays persisted for a resume.
    Detached,
}

/// Fetches progress on a fixed cadence while the current attempt is syncing.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    period: Duration,
}

impl Poller {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Polls until the attempt settles or `shutdown` resolves. Each request
    /// finishes before the next tick is taken, so polls never overlap.
    pub async fn run<S, N, F>(
        &self,
        controller: &mut Controller<S, N>,
        shutdown: impl Future<Output = ()>,
        mut on_update: F,
    ) -> PollExit
    where
        S: SyncService,
        N: Notifier,
        F: FnMut(&SyncAttempt, PollEvent),
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            let Some(ticket) = controller.poll_ticket() else {
                return PollExit::Settled(controller.attempt().status);
            };

            tokio::select! {
                _ = &mut shutdown => return PollExit::Detached,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = &mut shutdown => return PollExit::Detached,
                result = controller.service().progress() => result,
            };

            let event = controller.apply_poll_result(ticket, result);
            on_update(controller.attempt(), event);
        }
    }
}
