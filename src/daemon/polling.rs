use crate::core::format::format_duration;
use crate::core::monitor::Monitor;
use crate::core::notifications::Notifier;
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Shared handle for waking the loop early and reading when it next runs.
#[derive(Clone, Default)]
pub struct PollControl {
    wake: Arc<Notify>,
    /// Unix seconds of the next scheduled check; 0 until the first tick ends.
    next_check_at: Arc<AtomicI64>,
}

impl PollControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a check. A request made while a tick is running is kept and
    /// starts the next tick as soon as this one ends.
    pub fn check_now(&self) {
        self.wake.notify_one();
    }

    pub fn next_check_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.next_check_at.load(Ordering::Relaxed) {
            0 => 0,
            at => (at - now.timestamp()).max(0) as u64,
        }
    }

    fn schedule(&self, at: DateTime<Utc>) {
        self.next_check_at.store(at.timestamp(), Ordering::Relaxed);
    }
}

/// Ticks, delivers notices, then sleeps until the next interval, a wake-up
/// or shutdown. A running tick is never interrupted.
pub async fn run_poll_loop(
    monitor: Arc<Monitor>,
    notifier: Notifier,
    control: PollControl,
    cancel: CancellationToken,
    clock: fn() -> DateTime<FixedOffset>,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        // A tick is never interrupted; shutdown waits for it to finish.
        let now = clock();
        let report = monitor.tick(now).await;
        notifier.deliver(&report, now.with_timezone(&Utc));

        let now = clock();
        let interval = monitor.next_interval(now).await;
        let delay = chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
        control.schedule(now.with_timezone(&Utc) + delay);
        tracing::info!(next_check_in = %format_duration(delay), "Check complete");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = control.wake.notified() => {
                tracing::info!("Check requested");
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::TieredCache;
    use crate::core::monitor::MonitorConfig;
    use crate::core::schedule::Scheduler;
    use crate::core::store::StateStore;
    use crate::octopus::fake::FakeApi;
    use chrono::TimeZone;
    use std::time::Duration;

    // Monday evening, off-peak.
    fn fixed_now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 20, 0, 0)
            .unwrap()
    }

    fn monitor(api: Arc<FakeApi>) -> Arc<Monitor> {
        let store = StateStore::in_memory();
        let cache = TieredCache::new(store.clone(), std::iter::empty());
        Arc::new(Monitor::with_config(
            api,
            store,
            cache,
            MonitorConfig {
                min_points: 0,
                auto_spin: false,
                spin_delay: Duration::ZERO,
            },
            Scheduler::new(false, Duration::from_secs(3600)),
        ))
    }

    async fn wait_for_ticks(monitor: &Monitor, ticks: u32) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor
                .store()
                .read(|state| state.schedule.consecutive_empty)
                .await
                < ticks
            {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_loop_ticks_then_waits_for_wake() {
        let api = Arc::new(FakeApi::default());
        let monitor = monitor(api.clone());
        let control = PollControl::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run_poll_loop(
            monitor.clone(),
            Notifier::new(false),
            control.clone(),
            cancel.clone(),
            fixed_now,
        ));

        wait_for_ticks(&monitor, 1).await;
        assert_eq!(api.session_fetches(), 1);

        control.check_now();
        wait_for_ticks(&monitor, 2).await;

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_next_check_reported_after_tick() {
        let monitor = monitor(Arc::new(FakeApi::default()));
        let control = PollControl::new();
        let cancel = CancellationToken::new();
        let now = fixed_now().with_timezone(&Utc);

        assert_eq!(control.next_check_secs(now), 0);

        let handle = tokio::spawn(run_poll_loop(
            monitor.clone(),
            Notifier::new(false),
            control.clone(),
            cancel.clone(),
            fixed_now,
        ));
        wait_for_ticks(&monitor, 1).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while control.next_check_secs(now) == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(control.next_check_secs(now), 3600);
        assert_eq!(
            control.next_check_secs(now + chrono::Duration::hours(2)),
            0
        );

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_loop_does_not_tick() {
        let api = Arc::new(FakeApi::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        run_poll_loop(
            monitor(api.clone()),
            Notifier::new(false),
            PollControl::new(),
            cancel,
            fixed_now,
        )
        .await;

        assert_eq!(api.session_fetches(), 0);
    }
}
