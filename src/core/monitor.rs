use crate::core::alerts::Alert;
use crate::core::cache::TieredCache;
use crate::core::credentials::CredentialManager;
use crate::core::error::{Error, Result};
use crate::core::format::{format_duration, format_time_until, mask_account_id};
use crate::core::models::{
    AccountInfo, CampaignStatus, FreeElectricityWindow, ResourceKind, SavingSession,
    SavingSessionsSnapshot, SpinResult, UsageMeasurement, WheelSpins,
};
use crate::core::schedule::Scheduler;
use crate::core::settings::Settings;
use crate::core::store::StateStore;
use crate::octopus::{OctopusApi, OctopusClient};
use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use std::time::Duration;

pub const WHEEL_SPIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub min_points: i64,
    pub auto_spin: bool,
    pub spin_delay: Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            min_points: settings.monitor.min_points,
            auto_spin: settings.monitor.auto_spin,
            spin_delay: WHEEL_SPIN_DELAY,
        }
    }
}

#[derive(Debug, Default)]
pub struct TickReport {
    /// A saving session or free electricity window not seen before.
    pub found_new: bool,
    pub new_sessions: Vec<SavingSession>,
    pub joined: Vec<SavingSession>,
    pub alerts: Vec<Alert>,
    pub spins: Vec<SpinResult>,
    pub points: Option<i64>,
    pub failures: Vec<Error>,
}

impl TickReport {
    pub fn spin_prizes(&self) -> i64 {
        self.spins.iter().map(|s| s.prize).sum()
    }
}

pub struct Monitor {
    api: Arc<dyn OctopusApi>,
    store: StateStore,
    cache: TieredCache,
    config: MonitorConfig,
    scheduler: Scheduler,
}

impl Monitor {
    pub fn new(api: Arc<dyn OctopusApi>, store: StateStore, settings: &Settings) -> Self {
        let cache = TieredCache::new(store.clone(), settings.cache.serve_stale.iter().copied());
        Self {
            api,
            store,
            cache,
            config: MonitorConfig::from_settings(settings),
            scheduler: settings.scheduler(),
        }
    }

    /// Wires the persisted store, credentials and HTTP client for the
    /// configured account.
    pub fn open(settings: &Settings, now: DateTime<Utc>) -> Result<Self> {
        let account_id = settings.account.id.as_str();
        let store = match StateStore::state_path(account_id) {
            Some(path) => StateStore::load(path, account_id, now),
            None => {
                tracing::warn!("Could not determine config directory, state will not persist");
                StateStore::in_memory()
            }
        };
        tracing::info!(
            account = %mask_account_id(account_id),
            min_points = settings.monitor.min_points,
            smart_intervals = settings.monitor.smart_intervals,
            auto_spin = settings.monitor.auto_spin,
            "Monitoring account"
        );

        let credentials = CredentialManager::new(settings.account.api_key.as_str(), store.clone());
        let client = OctopusClient::new(account_id, settings.api.clone(), credentials)?;
        Ok(Self::new(Arc::new(client), store, settings))
    }

    pub fn with_config(
        api: Arc<dyn OctopusApi>,
        store: StateStore,
        cache: TieredCache,
        config: MonitorConfig,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            api,
            store,
            cache,
            config,
            scheduler,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    pub fn api(&self) -> &dyn OctopusApi {
        self.api.as_ref()
    }

    pub async fn next_interval(&self, now: DateTime<FixedOffset>) -> Duration {
        let schedule = self.store.read(|state| state.schedule.clone()).await;
        self.scheduler.next_interval(now, &schedule)
    }

    pub async fn campaign_status(&self, now: DateTime<FixedOffset>) -> Result<CampaignStatus> {
        let api = self.api.clone();
        self.cache.get_or_fetch(now, || async move { api.campaigns().await }).await
    }

    pub async fn account_info(&self, now: DateTime<FixedOffset>) -> Result<AccountInfo> {
        let api = self.api.clone();
        self.cache.get_or_fetch(now, || async move { api.account_info().await }).await
    }

    /// Smart meter readings for the last `days` days from the first device on
    /// the account. Empty when the account has no smart meter.
    pub async fn recent_usage(
        &self,
        days: u32,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<UsageMeasurement>> {
        let api = self.api.clone();
        let devices: Vec<String> = self
            .cache
            .get_or_fetch(now, || async move { api.meter_devices().await })
            .await?;
        let Some(device_id) = devices.into_iter().next() else {
            tracing::debug!("No smart meter device on account");
            return Ok(Vec::new());
        };

        let api = self.api.clone();
        let now_utc = now.with_timezone(&Utc);
        let readings: Vec<UsageMeasurement> = self
            .cache
            .get_or_fetch_covering(now, days, || async move {
                api.usage(&device_id, days, now_utc).await
            })
            .await?;

        // A deeper cached range also satisfies shorter requests.
        let since = now_utc - chrono::Duration::days(i64::from(days));
        Ok(readings
            .into_iter()
            .filter(|reading| reading.read_at >= since)
            .collect())
    }

    pub async fn tick(&self, now: DateTime<FixedOffset>) -> TickReport {
        let mut report = TickReport::default();

        self.check_saving_sessions(now, &mut report).await;
        if self.config.auto_spin {
            self.check_wheel_of_fortune(now, &mut report).await;
        }
        self.check_free_electricity(now, &mut report).await;

        let now_utc = now.with_timezone(&Utc);
        let schedule = self
            .store
            .update(|state| {
                let pruned = state.prune_benefit_windows(now_utc);
                if pruned > 0 {
                    tracing::debug!(pruned, "Dropped alert records for ended windows");
                }
                state.schedule.record_tick(report.found_new, now_utc);
                state.schedule.clone()
            })
            .await;

        if report.found_new {
            tracing::info!("New sessions found, polling more often for follow-up announcements");
        } else if self.scheduler.is_smart() && schedule.consecutive_empty > 1 {
            tracing::info!(
                consecutive_empty = schedule.consecutive_empty,
                "Nothing new, extending next interval"
            );
        }

        if let Err(e) = self.store.save(now_utc).await {
            tracing::warn!(error = %e, "Failed to save state");
            report.failures.push(e);
        }

        report
    }

    async fn check_saving_sessions(&self, now: DateTime<FixedOffset>, report: &mut TickReport) {
        let api = self.api.clone();
        let snapshot: SavingSessionsSnapshot = match self
            .cache
            .get_or_fetch(now, || async move { api.saving_sessions().await })
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch saving sessions");
                report.failures.push(e);
                return;
            }
        };

        let api = self.api.clone();
        match self
            .cache
            .get_or_fetch::<i64, _, _>(now, || async move { api.octo_points().await })
            .await
        {
            Ok(points) => {
                tracing::info!(points, "Current OctoPoints balance");
                report.points = Some(points);
            }
            Err(e) => tracing::warn!(error = %e, "Could not fetch OctoPoints balance"),
        }

        if snapshot.sessions.is_empty() {
            tracing::info!("No saving sessions found");
        }

        let now_utc = now.with_timezone(&Utc);
        let mut joined_any = false;
        for session in &snapshot.sessions {
            let first_seen = self
                .store
                .update(|state| state.known_sessions.insert(session.event_id))
                .await;
            if !first_seen {
                continue;
            }
            report.found_new = true;
            report.new_sessions.push(session.clone());

            if !session.is_upcoming(now_utc) {
                tracing::info!(event_id = session.event_id, "Saving session already started, not joining");
                continue;
            }

            tracing::info!(
                event_id = session.event_id,
                start = %session.start_at,
                duration = %format_duration(session.duration()),
                starts_in = %format_time_until(session.start_at - now_utc),
                reward = session.octopoints,
                "Saving session found"
            );

            if session.octopoints < self.config.min_points {
                tracing::info!(
                    event_id = session.event_id,
                    reward = session.octopoints,
                    min_points = self.config.min_points,
                    "Skipping saving session below points threshold"
                );
                continue;
            }

            match self.api.join_saving_session(session.event_id).await {
                Ok(()) => {
                    tracing::info!(event_id = session.event_id, "Joined saving session");
                    report.joined.push(session.clone());
                    joined_any = true;
                }
                Err(e) => {
                    tracing::warn!(event_id = session.event_id, error = %e, "Failed to join saving session");
                    report.failures.push(e);
                }
            }
        }

        if joined_any {
            self.cache.invalidate(ResourceKind::SavingSessions).await;
        }
    }

    async fn check_wheel_of_fortune(&self, now: DateTime<FixedOffset>, report: &mut TickReport) {
        let api = self.api.clone();
        let spins: WheelSpins = match self
            .cache
            .get_or_fetch(now, || async move { api.wheel_spins().await })
            .await
        {
            Ok(spins) => spins,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch Wheel of Fortune spins");
                report.failures.push(e);
                return;
            }
        };

        if spins.total() == 0 {
            tracing::debug!("No Wheel of Fortune spins available");
            return;
        }

        tracing::info!(
            electricity = spins.electricity,
            gas = spins.gas,
            "Wheel of Fortune spins available, spinning"
        );

        for (i, fuel) in spins.queue().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.config.spin_delay).await;
            }
            match self.api.spin_wheel(fuel).await {
                Ok(result) => {
                    tracing::debug!(?fuel, prize = result.prize, "Spun wheel");
                    report.spins.push(result);
                }
                Err(e) => {
                    tracing::warn!(?fuel, error = %e, "Wheel spin failed");
                    report.failures.push(e);
                    break;
                }
            }
        }

        if !report.spins.is_empty() {
            tracing::info!(
                spins = report.spins.len(),
                points = report.spin_prizes(),
                "Auto-spin complete"
            );
        }
        self.cache.invalidate(ResourceKind::WheelSpins).await;
        self.cache.invalidate(ResourceKind::OctoPoints).await;
    }

    async fn check_free_electricity(&self, now: DateTime<FixedOffset>, report: &mut TickReport) {
        let api = self.api.clone();
        let windows: Vec<FreeElectricityWindow> = match self
            .cache
            .get_or_fetch(now, || async move { api.free_electricity().await })
            .await
        {
            Ok(windows) => windows,
            Err(e) => {
                tracing::warn!(error = %e, "Could not fetch free electricity sessions");
                report.failures.push(e);
                return;
            }
        };

        let now_utc = now.with_timezone(&Utc);
        let (alerts, found_new) = self
            .store
            .update(|state| {
                let mut alerts = Vec::new();
                let mut found_new = false;
                for window in &windows {
                    if window.has_ended(now_utc) {
                        state.known_benefit_windows.remove(&window.code);
                    } else if state.known_benefit_windows.insert(window.code.clone()) {
                        found_new = true;
                    }
                    alerts.extend(state.alerts.evaluate(window, now_utc));
                }
                (alerts, found_new)
            })
            .await;

        if !windows.iter().any(|w| !w.has_ended(now_utc)) {
            tracing::info!("No current or upcoming free electricity sessions");
        }

        report.found_new |= found_new;
        report.alerts.extend(alerts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheEntry;
    use crate::core::alerts::{AlertKind, AlertStage};
    use crate::core::models::FuelType;
    use crate::core::schedule::DEFAULT_FIXED_INTERVAL;
    use crate::octopus::fake::FakeApi;
    use chrono::{Duration as ChronoDuration, TimeZone};

    // Monday evening, off-peak.
    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 19, 20, 0, 0)
            .unwrap()
    }

    fn session(event_id: i64, hours_from_now: i64, octopoints: i64) -> SavingSession {
        let start = now().with_timezone(&Utc) + ChronoDuration::hours(hours_from_now);
        SavingSession {
            event_id,
            start_at: start,
            end_at: start + ChronoDuration::hours(1),
            octopoints,
        }
    }

    fn monitor(api: Arc<FakeApi>, min_points: i64) -> Monitor {
        let store = StateStore::in_memory();
        let cache = TieredCache::new(store.clone(), []);
        let config = MonitorConfig {
            min_points,
            auto_spin: true,
            spin_delay: Duration::ZERO,
        };
        Monitor::with_config(
            api,
            store,
            cache,
            config,
            Scheduler::new(true, DEFAULT_FIXED_INTERVAL),
        )
    }

    #[tokio::test]
    async fn test_joins_eligible_session_once() {
        let api = Arc::new(FakeApi::default());
        api.sessions.lock().unwrap().push(session(1, 3, 150));
        let monitor = monitor(api.clone(), 100);

        let report = monitor.tick(now()).await;
        assert!(report.found_new);
        assert_eq!(report.joined.len(), 1);
        assert!(report.failures.is_empty());
        assert!(monitor.store().snapshot().await.known_sessions.contains(&1));

        let report = monitor.tick(now() + ChronoDuration::minutes(1)).await;
        assert!(!report.found_new);
        assert!(report.joined.is_empty());
        assert_eq!(*api.joins.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_below_threshold_is_marked_but_not_joined() {
        let api = Arc::new(FakeApi::default());
        api.sessions.lock().unwrap().push(session(2, 3, 50));
        let monitor = monitor(api.clone(), 100);

        let report = monitor.tick(now()).await;
        assert!(report.found_new);
        assert_eq!(report.new_sessions.len(), 1);
        assert!(report.joined.is_empty());
        assert!(api.joins.lock().unwrap().is_empty());
        assert!(monitor.store().snapshot().await.known_sessions.contains(&2));
    }

    #[tokio::test]
    async fn test_join_failure_is_reported_and_not_retried() {
        let api = Arc::new(FakeApi {
            fail_joins: true,
            ..FakeApi::default()
        });
        api.sessions.lock().unwrap().push(session(3, 3, 150));
        let monitor = monitor(api.clone(), 0);

        let report = monitor.tick(now()).await;
        assert!(report.joined.is_empty());
        assert!(matches!(report.failures[0], Error::Join { event_id: 3, .. }));

        monitor
            .cache()
            .invalidate(ResourceKind::SavingSessions)
            .await;
        monitor.tick(now() + ChronoDuration::minutes(5)).await;
        assert_eq!(*api.joins.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_started_session_is_not_joined() {
        let api = Arc::new(FakeApi::default());
        api.sessions.lock().unwrap().push(session(4, -1, 500));
        let monitor = monitor(api.clone(), 0);

        let report = monitor.tick(now()).await;
        assert!(report.found_new);
        assert!(api.joins.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_join_invalidates_sessions_cache() {
        let api = Arc::new(FakeApi::default());
        api.sessions.lock().unwrap().push(session(5, 3, 150));
        let monitor = monitor(api.clone(), 0);

        monitor.tick(now()).await;
        assert!(monitor
            .cache()
            .peek::<SavingSessionsSnapshot>()
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_processing() {
        let api = Arc::new(FakeApi {
            fail_free_electricity: true,
            ..FakeApi::default()
        });
        api.sessions.lock().unwrap().push(session(6, 3, 150));
        let monitor = monitor(api.clone(), 0);

        let report = monitor.tick(now()).await;
        assert_eq!(report.joined.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            Error::Cache {
                kind: ResourceKind::FreeElectricity,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_auto_spin_uses_every_spin() {
        let api = Arc::new(FakeApi::default());
        *api.spins.lock().unwrap() = WheelSpins {
            electricity: 2,
            gas: 1,
        };
        let monitor = monitor(api.clone(), 0);

        let report = monitor.tick(now()).await;
        assert_eq!(report.spin_prizes(), 30);
        assert_eq!(
            *api.spun.lock().unwrap(),
            vec![FuelType::Electricity, FuelType::Electricity, FuelType::Gas]
        );
        assert!(monitor.cache().peek::<WheelSpins>().await.is_none());
        assert!(monitor.cache().peek::<i64>().await.is_none());
    }

    #[tokio::test]
    async fn test_free_electricity_alerts_once_per_stage() {
        let api = Arc::new(FakeApi::default());
        let start = now().with_timezone(&Utc) + ChronoDuration::hours(30);
        api.windows.lock().unwrap().push(FreeElectricityWindow {
            code: "FE-1".to_string(),
            start_at: start,
            end_at: start + ChronoDuration::hours(1),
        });
        let monitor = monitor(api.clone(), 0);

        let report = monitor.tick(now()).await;
        assert!(report.found_new);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind, AlertKind::Upcoming(AlertStage::Initial));

        let report = monitor.tick(now() + ChronoDuration::minutes(10)).await;
        assert!(!report.found_new);
        assert!(report.alerts.is_empty());

        let report = monitor.tick(now() + ChronoDuration::hours(10)).await;
        assert_eq!(report.alerts[0].kind, AlertKind::Upcoming(AlertStage::DayOf));
    }

    #[tokio::test]
    async fn test_schedule_tracks_empty_ticks() {
        let api = Arc::new(FakeApi::default());
        api.sessions.lock().unwrap().push(session(7, 3, 150));
        let monitor = monitor(api.clone(), 0);

        monitor.tick(now()).await;
        let schedule = monitor.store().snapshot().await.schedule;
        assert_eq!(schedule.last_new_entity_at, Some(now().with_timezone(&Utc)));
        assert_eq!(schedule.consecutive_empty, 0);
        assert_eq!(monitor.next_interval(now()).await, Duration::from_secs(5 * 60));

        let later = now() + ChronoDuration::hours(1);
        monitor.tick(later).await;
        monitor.tick(later + ChronoDuration::minutes(1)).await;
        let schedule = monitor.store().snapshot().await.schedule;
        assert_eq!(schedule.consecutive_empty, 2);
        assert_eq!(monitor.next_interval(later).await, Duration::from_secs(25 * 60));
    }

    #[tokio::test]
    async fn test_usage_reads_through_device_cache() {
        let monitor = monitor(Arc::new(FakeApi::default()), 0);

        let readings = monitor.recent_usage(7, now()).await.unwrap();
        assert!(readings.is_empty());

        let devices = monitor.cache().peek::<Vec<String>>().await.unwrap();
        assert_eq!(devices.value, vec!["00-11-22".to_string()]);
        let usage = monitor.cache().peek::<Vec<UsageMeasurement>>().await.unwrap();
        assert_eq!(usage.depth, Some(7));

        assert_eq!(monitor.account_info(now()).await.unwrap(), AccountInfo::default());
    }

    #[tokio::test]
    async fn test_shorter_usage_request_is_trimmed_from_deeper_entry() {
        let monitor = monitor(Arc::new(FakeApi::default()), 0);
        let now_utc = now().with_timezone(&Utc);
        let reading = |age: ChronoDuration| UsageMeasurement {
            read_at: now_utc - age,
            consumption_kwh: 1.5,
            demand_watts: None,
        };
        monitor
            .store()
            .update(|state| {
                state.cache.meter_devices = Some(CacheEntry::new(
                    vec!["00-11-22".to_string()],
                    now_utc,
                    None,
                ));
                state.cache.usage_measurements = Some(CacheEntry::new(
                    vec![reading(ChronoDuration::days(6)), reading(ChronoDuration::hours(1))],
                    now_utc,
                    Some(7),
                ));
            })
            .await;

        let last_day = monitor.recent_usage(1, now()).await.unwrap();
        assert_eq!(last_day.len(), 1);
        assert_eq!(last_day[0].read_at, now_utc - ChronoDuration::hours(1));

        let week = monitor.recent_usage(7, now()).await.unwrap();
        assert_eq!(week.len(), 2);
    }

    #[tokio::test]
    async fn test_window_leaving_feed_is_forgotten() {
        let api = Arc::new(FakeApi::default());
        let start = now().with_timezone(&Utc) + ChronoDuration::hours(30);
        api.windows.lock().unwrap().push(FreeElectricityWindow {
            code: "FE-GONE".to_string(),
            start_at: start,
            end_at: start + ChronoDuration::hours(1),
        });
        let monitor = monitor(api.clone(), 0);

        monitor.tick(now()).await;
        api.windows.lock().unwrap().clear();
        for day in 1..=3 {
            monitor.tick(now() + ChronoDuration::days(day)).await;
        }

        let state = monitor.store().snapshot().await;
        assert!(state.alerts.is_empty());
        assert!(state.known_benefit_windows.is_empty());
    }
}
