use super::OctopusApi;
use crate::core::error::{Error, Result};
use crate::core::models::{
    AccountInfo, CampaignStatus, FreeElectricityWindow, FuelType, SavingSession,
    SavingSessionsSnapshot, SpinResult, UsageMeasurement, WheelSpins,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeApi {
    pub sessions: Mutex<Vec<SavingSession>>,
    pub windows: Mutex<Vec<FreeElectricityWindow>>,
    pub spins: Mutex<WheelSpins>,
    pub joins: Mutex<Vec<i64>>,
    pub spun: Mutex<Vec<FuelType>>,
    pub fail_joins: bool,
    pub fail_free_electricity: bool,
    pub session_fetches: AtomicUsize,
}

impl FakeApi {
    pub fn session_fetches(&self) -> usize {
        self.session_fetches.load(Ordering::SeqCst)
    }
}

pub fn upstream_error() -> Error {
    Error::Status {
        endpoint: "/fake".to_string(),
        status: 400,
    }
}

#[async_trait]
impl OctopusApi for FakeApi {
    async fn saving_sessions(&self) -> Result<SavingSessionsSnapshot> {
        self.session_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(SavingSessionsSnapshot {
            has_joined_campaign: true,
            sessions: self.sessions.lock().unwrap().clone(),
        })
    }

    async fn join_saving_session(&self, event_id: i64) -> Result<()> {
        self.joins.lock().unwrap().push(event_id);
        if self.fail_joins {
            return Err(Error::Join {
                event_id,
                source: Box::new(upstream_error()),
            });
        }
        Ok(())
    }

    async fn octo_points(&self) -> Result<i64> {
        Ok(500)
    }

    async fn campaigns(&self) -> Result<CampaignStatus> {
        Ok(CampaignStatus::from_slugs([
            "octoplus",
            "octoplus-saving-sessions",
        ]))
    }

    async fn free_electricity(&self) -> Result<Vec<FreeElectricityWindow>> {
        if self.fail_free_electricity {
            return Err(upstream_error());
        }
        Ok(self.windows.lock().unwrap().clone())
    }

    async fn wheel_spins(&self) -> Result<WheelSpins> {
        Ok(*self.spins.lock().unwrap())
    }

    async fn spin_wheel(&self, fuel: FuelType) -> Result<SpinResult> {
        self.spun.lock().unwrap().push(fuel);
        Ok(SpinResult { fuel, prize: 10 })
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        Ok(AccountInfo::default())
    }

    async fn meter_devices(&self) -> Result<Vec<String>> {
        Ok(vec!["00-11-22".to_string()])
    }

    async fn usage(
        &self,
        _device_id: &str,
        _days: u32,
        _now: DateTime<Utc>,
    ) -> Result<Vec<UsageMeasurement>> {
        Ok(Vec::new())
    }
}
