pub mod client;
#[cfg(test)]
pub mod fake;
pub mod queries;
pub mod transport;

use crate::core::error::Result;
use crate::core::models::{
    AccountInfo, CampaignStatus, FreeElectricityWindow, FuelType, SavingSessionsSnapshot,
    SpinResult, UsageMeasurement, WheelSpins,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use client::OctopusClient;
pub use transport::TransportStats;

/// Remote calls the monitor depends on.
#[async_trait]
pub trait OctopusApi: Send + Sync {
    async fn saving_sessions(&self) -> Result<SavingSessionsSnapshot>;
    async fn join_saving_session(&self, event_id: i64) -> Result<()>;
    async fn octo_points(&self) -> Result<i64>;
    async fn campaigns(&self) -> Result<CampaignStatus>;
    async fn free_electricity(&self) -> Result<Vec<FreeElectricityWindow>>;
    async fn wheel_spins(&self) -> Result<WheelSpins>;
    async fn spin_wheel(&self, fuel: FuelType) -> Result<SpinResult>;
    async fn account_info(&self) -> Result<AccountInfo>;
    async fn meter_devices(&self) -> Result<Vec<String>>;
    async fn usage(
        &self,
        device_id: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UsageMeasurement>>;

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}
