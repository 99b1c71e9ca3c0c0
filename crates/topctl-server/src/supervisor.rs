// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Periodic reconciliation supervisor.
//!
//! Owns cadence and lifecycle. On startup it retries the provider
//! connection with capped exponential backoff; connection failure is never
//! fatal, the broker may legitimately come up after this service. Each tick
//! then runs health check -> reconnect if needed -> load desired topology
//! -> reconcile. The next tick is scheduled a full period after the
//! previous one *completes*, so a slow pass never overlaps itself.

use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use topctl_core::reconcile;
use topctl_store::load_topology;

const TICK_PERIOD: Duration = Duration::from_secs(30);
const BACKOFF_BASE: Duration = Duration::from_secs(2);
const BACKOFF_CAP: Duration = Duration::from_secs(64);
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Delay before the next connect attempt: doubling from the base, capped.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << exp).min(cap)
}

pub struct Supervisor {
    state: Arc<AppState>,
    period: Duration,
    backoff_base: Duration,
    backoff_cap: Duration,
    max_connect_attempts: u32,
}

/// Handle to a running supervisor; dropping it does not stop the task.
pub struct SupervisorHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Interrupt any inter-tick sleep and wait for the in-flight tick.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Supervisor {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            period: TICK_PERIOD,
            backoff_base: BACKOFF_BASE,
            backoff_cap: BACKOFF_CAP,
            max_connect_attempts: MAX_CONNECT_ATTEMPTS,
        }
    }

    /// Timing override for tests.
    pub fn with_timing(
        state: Arc<AppState>,
        period: Duration,
        backoff_base: Duration,
        backoff_cap: Duration,
        max_connect_attempts: u32,
    ) -> Self {
        Self {
            state,
            period,
            backoff_base,
            backoff_cap,
            max_connect_attempts,
        }
    }

    pub fn start(self) -> SupervisorHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(self.run(receiver));
        SupervisorHandle { shutdown, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(period_secs = self.period.as_secs(), "supervisor started");
        self.bootstrap(&mut shutdown).await;
        if *shutdown.borrow() {
            return;
        }

        // One reconciliation right after startup, then the periodic loop.
        self.tick().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }
            self.tick().await;
        }
        tracing::info!("supervisor stopped");
    }

    async fn bootstrap(&self, shutdown: &mut watch::Receiver<bool>) {
        let Some(provider) = &self.state.provider else {
            return;
        };
        for attempt in 1..=self.max_connect_attempts {
            match provider.connect().await {
                Ok(()) => {
                    tracing::info!(attempt, "connected to queue provider");
                    return;
                }
                Err(err) if attempt < self.max_connect_attempts => {
                    let delay = backoff_delay(self.backoff_base, self.backoff_cap, attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = self.max_connect_attempts,
                        delay_secs = delay.as_secs(),
                        "failed to connect to queue provider: {err}"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        attempts = self.max_connect_attempts,
                        "giving up on startup connect: {err}; the periodic loop will retry"
                    );
                }
            }
        }
    }

    async fn tick(&self) {
        let Some(provider) = &self.state.provider else {
            return;
        };

        let health = provider.health();
        if !health.ok {
            tracing::warn!(details = %health.details, "queue provider unhealthy, attempting reconnect");
            if let Err(err) = provider.connect().await {
                tracing::warn!("reconnect failed, skipping tick: {err}");
                return;
            }
            tracing::info!("reconnected to queue provider");
        }

        let Some(repo) = &self.state.repo else {
            tracing::debug!("store not configured, nothing to reconcile");
            self.state.record_pass();
            return;
        };

        let desired = match load_topology(repo).await {
            Ok(desired) => desired,
            Err(err) => {
                tracing::warn!("failed to load desired topology, skipping tick: {err}");
                return;
            }
        };

        let _guard = self.state.sync_lock.lock().await;
        let result = reconcile(provider.as_ref(), &desired, false).await;
        self.state.record_pass();
        tracing::info!(summary = ?result.summary(), "periodic reconciliation completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topctl_core::{BrokerProvider, MockBroker};

    #[test]
    fn backoff_doubles_from_two_seconds_and_caps_at_sixty_four() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(64);
        let delays: Vec<u64> = (1..=9)
            .map(|attempt| backoff_delay(base, cap, attempt).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 64, 64, 64]);
    }

    #[test]
    fn backoff_never_overflows_on_large_attempts() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(64);
        assert_eq!(backoff_delay(base, cap, u32::MAX), cap);
    }

    #[tokio::test]
    async fn bootstrap_retries_until_connected() {
        let broker = Arc::new(MockBroker::new());
        broker.disconnect();
        broker.fail_connects(3);

        let state = Arc::new(AppState::new(None, Some(broker.clone())));
        let supervisor = Supervisor::with_timing(
            Arc::clone(&state),
            Duration::from_secs(3600),
            Duration::from_millis(1),
            Duration::from_millis(4),
            10,
        );
        let handle = supervisor.start();

        // 3 refused attempts, then success, then the initial tick.
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await;

        assert_eq!(broker.connect_attempts(), 4);
        assert!(broker.health().ok);
        assert!(state.passes_completed() >= 1, "initial tick counted a pass");
    }

    #[tokio::test]
    async fn stop_interrupts_the_backoff_sleep() {
        let broker = Arc::new(MockBroker::new());
        broker.disconnect();
        broker.fail_connects(usize::MAX);

        let state = Arc::new(AppState::new(None, Some(broker)));
        let supervisor = Supervisor::with_timing(
            state,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            10,
        );
        let handle = supervisor.start();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Must return promptly despite the hour-long backoff sleep.
        tokio::time::timeout(Duration::from_secs(1), handle.stop())
            .await
            .expect("stop must interrupt the sleep");
    }

    #[tokio::test]
    async fn periodic_ticks_keep_counting_passes() {
        let state = Arc::new(AppState::new(None, Some(Arc::new(MockBroker::new()))));
        let supervisor = Supervisor::with_timing(
            Arc::clone(&state),
            Duration::from_millis(5),
            Duration::from_millis(1),
            Duration::from_millis(1),
            1,
        );
        let handle = supervisor.start();
        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.stop().await;

        assert!(
            state.passes_completed() >= 3,
            "expected several periodic passes, saw {}",
            state.passes_completed()
        );
    }
}
