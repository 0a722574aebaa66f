use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    SavingSessions,
    OctoPoints,
    Campaigns,
    FreeElectricity,
    WheelSpins,
    AccountInfo,
    MeterDevices,
    UsageMeasurements,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::SavingSessions,
        ResourceKind::OctoPoints,
        ResourceKind::Campaigns,
        ResourceKind::FreeElectricity,
        ResourceKind::WheelSpins,
        ResourceKind::AccountInfo,
        ResourceKind::MeterDevices,
        ResourceKind::UsageMeasurements,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::SavingSessions => "saving_sessions",
            ResourceKind::OctoPoints => "octo_points",
            ResourceKind::Campaigns => "campaigns",
            ResourceKind::FreeElectricity => "free_electricity",
            ResourceKind::WheelSpins => "wheel_spins",
            ResourceKind::AccountInfo => "account_info",
            ResourceKind::MeterDevices => "meter_devices",
            ResourceKind::UsageMeasurements => "usage_measurements",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A joinable saving session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavingSession {
    #[serde(rename = "eventId")]
    pub event_id: i64,
    #[serde(rename = "startAt")]
    pub start_at: DateTime<Utc>,
    #[serde(rename = "endAt")]
    pub end_at: DateTime<Utc>,
    #[serde(rename = "octopoints")]
    pub octopoints: i64,
}

impl SavingSession {
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start_at > now
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingSessionsSnapshot {
    pub has_joined_campaign: bool,
    pub sessions: Vec<SavingSession>,
}

/// A free electricity window. Nothing to join, only alert on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeElectricityWindow {
    pub code: String,
    #[serde(rename = "start")]
    pub start_at: DateTime<Utc>,
    #[serde(rename = "end")]
    pub end_at: DateTime<Utc>,
}

impl FreeElectricityWindow {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_at <= now
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    /// Zero while the window is active.
    pub fn time_until_start(&self, now: DateTime<Utc>) -> Duration {
        if self.start_at > now {
            self.start_at - now
        } else {
            Duration::zero()
        }
    }

    pub fn duration(&self) -> Duration {
        self.end_at - self.start_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelType {
    Electricity,
    Gas,
}

impl FuelType {
    pub fn as_graphql(&self) -> &'static str {
        match self {
            FuelType::Electricity => "ELECTRICITY",
            FuelType::Gas => "GAS",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelSpins {
    pub electricity: u32,
    pub gas: u32,
}

impl WheelSpins {
    pub fn total(&self) -> u32 {
        self.electricity.saturating_add(self.gas)
    }

    pub fn queue(&self) -> Vec<FuelType> {
        std::iter::repeat(FuelType::Electricity)
            .take(self.electricity as usize)
            .chain(std::iter::repeat(FuelType::Gas).take(self.gas as usize))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpinResult {
    pub fuel: FuelType,
    pub prize: i64,
}

pub const CAMPAIGN_OCTOPLUS: &str = "octoplus";
pub const CAMPAIGN_SAVING_SESSIONS: &str = "octoplus-saving-sessions";
pub const CAMPAIGN_FREE_ELECTRICITY: &str = "free_electricity";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStatus {
    pub octoplus: bool,
    pub saving_sessions: bool,
    pub free_electricity: bool,
}

impl CampaignStatus {
    pub fn from_slugs<'a>(slugs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut status = Self::default();
        for slug in slugs {
            match slug {
                CAMPAIGN_OCTOPLUS => status.octoplus = true,
                CAMPAIGN_SAVING_SESSIONS => status.saving_sessions = true,
                CAMPAIGN_FREE_ELECTRICITY => status.free_electricity = true,
                _ => {}
            }
        }
        status
    }

    pub fn saving_sessions_enabled(&self) -> bool {
        self.octoplus && self.saving_sessions
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance_pounds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMeasurement {
    pub read_at: DateTime<Utc>,
    pub consumption_kwh: f64,
    pub demand_watts: Option<f64>,
}

/// Short-lived bearer credential obtained by exchanging the account API key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at: Some(expires_at),
        }
    }

    /// True when the token stays valid for longer than `buffer` past `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) if !self.token.is_empty() => expires_at - now > buffer,
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}
