use crate::core::error::{Error, Result};
use crate::core::models::{
    AccountInfo, CampaignStatus, FreeElectricityWindow, ResourceKind, SavingSessionsSnapshot,
    UsageMeasurement, WheelSpins,
};
use crate::core::schedule::TimeTier;
use crate::core::store::StateStore;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
    /// History depth in days, for resources fetched over a range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: DateTime<Utc>, depth: Option<u32>) -> Self {
        Self {
            value,
            fetched_at,
            depth,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }

    /// A cached range satisfies any request no deeper than itself.
    pub fn covers(&self, requested: Option<u32>) -> bool {
        match (requested, self.depth) {
            (None, _) => true,
            (Some(wanted), Some(cached)) => wanted <= cached,
            (Some(_), None) => false,
        }
    }
}

/// Freshness window for a resource kind at the caller's local time.
pub fn ttl(kind: ResourceKind, now: &DateTime<FixedOffset>) -> Duration {
    match kind {
        ResourceKind::SavingSessions => match TimeTier::at(now) {
            TimeTier::Announcement => Duration::minutes(10),
            TimeTier::Business => Duration::minutes(30),
            TimeTier::OffPeak => Duration::hours(2),
        },
        ResourceKind::OctoPoints => Duration::hours(1),
        ResourceKind::Campaigns => Duration::hours(24),
        ResourceKind::FreeElectricity => Duration::minutes(5),
        ResourceKind::WheelSpins => Duration::hours(12),
        ResourceKind::AccountInfo => Duration::hours(1),
        ResourceKind::MeterDevices => Duration::days(7),
        ResourceKind::UsageMeasurements => Duration::minutes(30),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceCache {
    pub saving_sessions: Option<CacheEntry<SavingSessionsSnapshot>>,
    pub octo_points: Option<CacheEntry<i64>>,
    pub campaigns: Option<CacheEntry<CampaignStatus>>,
    pub free_electricity: Option<CacheEntry<Vec<FreeElectricityWindow>>>,
    pub wheel_spins: Option<CacheEntry<WheelSpins>>,
    pub account_info: Option<CacheEntry<AccountInfo>>,
    pub meter_devices: Option<CacheEntry<Vec<String>>>,
    pub usage_measurements: Option<CacheEntry<Vec<UsageMeasurement>>>,
}

impl ResourceCache {
    pub fn invalidate(&mut self, kind: ResourceKind) {
        match kind {
            ResourceKind::SavingSessions => self.saving_sessions = None,
            ResourceKind::OctoPoints => self.octo_points = None,
            ResourceKind::Campaigns => self.campaigns = None,
            ResourceKind::FreeElectricity => self.free_electricity = None,
            ResourceKind::WheelSpins => self.wheel_spins = None,
            ResourceKind::AccountInfo => self.account_info = None,
            ResourceKind::MeterDevices => self.meter_devices = None,
            ResourceKind::UsageMeasurements => self.usage_measurements = None,
        }
    }

    pub fn fetched_at(&self, kind: ResourceKind) -> Option<DateTime<Utc>> {
        match kind {
            ResourceKind::SavingSessions => self.saving_sessions.as_ref().map(|e| e.fetched_at),
            ResourceKind::OctoPoints => self.octo_points.as_ref().map(|e| e.fetched_at),
            ResourceKind::Campaigns => self.campaigns.as_ref().map(|e| e.fetched_at),
            ResourceKind::FreeElectricity => self.free_electricity.as_ref().map(|e| e.fetched_at),
            ResourceKind::WheelSpins => self.wheel_spins.as_ref().map(|e| e.fetched_at),
            ResourceKind::AccountInfo => self.account_info.as_ref().map(|e| e.fetched_at),
            ResourceKind::MeterDevices => self.meter_devices.as_ref().map(|e| e.fetched_at),
            ResourceKind::UsageMeasurements => {
                self.usage_measurements.as_ref().map(|e| e.fetched_at)
            }
        }
    }
}

/// Ties a value type to its slot in [`ResourceCache`].
pub trait Cacheable: Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn slot(cache: &ResourceCache) -> &Option<CacheEntry<Self>>;
    fn slot_mut(cache: &mut ResourceCache) -> &mut Option<CacheEntry<Self>>;
}

macro_rules! cacheable {
    ($ty:ty, $kind:ident, $field:ident) => {
        impl Cacheable for $ty {
            const KIND: ResourceKind = ResourceKind::$kind;

            fn slot(cache: &ResourceCache) -> &Option<CacheEntry<Self>> {
                &cache.$field
            }

            fn slot_mut(cache: &mut ResourceCache) -> &mut Option<CacheEntry<Self>> {
                &mut cache.$field
            }
        }
    };
}

cacheable!(SavingSessionsSnapshot, SavingSessions, saving_sessions);
cacheable!(i64, OctoPoints, octo_points);
cacheable!(CampaignStatus, Campaigns, campaigns);
cacheable!(Vec<FreeElectricityWindow>, FreeElectricity, free_electricity);
cacheable!(WheelSpins, WheelSpins, wheel_spins);
cacheable!(AccountInfo, AccountInfo, account_info);
cacheable!(Vec<String>, MeterDevices, meter_devices);
cacheable!(Vec<UsageMeasurement>, UsageMeasurements, usage_measurements);

/// Read-through cache over the entries held in process state. The store lock
/// is never held while a fetch is in flight.
#[derive(Clone)]
pub struct TieredCache {
    store: StateStore,
    serve_stale: HashSet<ResourceKind>,
}

impl TieredCache {
    pub fn new(store: StateStore, serve_stale: impl IntoIterator<Item = ResourceKind>) -> Self {
        Self {
            store,
            serve_stale: serve_stale.into_iter().collect(),
        }
    }

    pub async fn get_or_fetch<T, F, Fut>(&self, now: DateTime<FixedOffset>, fetch: F) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.lookup(now, None, fetch).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch) for ranged resources: an
    /// entry covering fewer than `depth` days is treated as a miss.
    pub async fn get_or_fetch_covering<T, F, Fut>(
        &self,
        now: DateTime<FixedOffset>,
        depth: u32,
        fetch: F,
    ) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.lookup(now, Some(depth), fetch).await
    }

    async fn lookup<T, F, Fut>(
        &self,
        now: DateTime<FixedOffset>,
        depth: Option<u32>,
        fetch: F,
    ) -> Result<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let kind = T::KIND;
        let now_utc = now.with_timezone(&Utc);
        let cached = self.store.read(|state| T::slot(&state.cache).clone()).await;

        if let Some(entry) = &cached {
            if entry.is_valid(now_utc, ttl(kind, &now)) && entry.covers(depth) {
                tracing::debug!(%kind, age_secs = entry.age(now_utc).num_seconds(), "Cache hit");
                return Ok(entry.value.clone());
            }
        }

        tracing::debug!(%kind, "Cache miss, fetching");
        match fetch().await {
            Ok(value) => {
                let entry = CacheEntry::new(value.clone(), now_utc, depth);
                self.store
                    .update(|state| *T::slot_mut(&mut state.cache) = Some(entry))
                    .await;
                Ok(value)
            }
            Err(err) => match cached {
                Some(entry) if self.serve_stale.contains(&kind) => {
                    tracing::warn!(
                        %kind,
                        error = %err,
                        age_secs = entry.age(now_utc).num_seconds(),
                        "Refresh failed, serving stale entry"
                    );
                    Ok(entry.value)
                }
                _ => Err(Error::Cache {
                    kind,
                    source: Box::new(err),
                }),
            },
        }
    }

    pub async fn invalidate(&self, kind: ResourceKind) {
        tracing::debug!(%kind, "Invalidating cache entry");
        self.store.update(|state| state.cache.invalidate(kind)).await;
    }

    pub async fn peek<T: Cacheable>(&self) -> Option<CacheEntry<T>> {
        self.store.read(|state| T::slot(&state.cache).clone()).await
    }
}
