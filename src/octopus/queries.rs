use crate::core::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const OBTAIN_TOKEN: &str = r#"mutation obtainKrakenToken($input: ObtainJSONWebTokenInput!) {
  obtainKrakenToken(input: $input) {
    token
    refreshToken
    refreshExpiresIn
  }
}"#;

pub const OCTO_POINTS: &str = r#"query octoPoints {
  loyaltyPointLedgers {
    balanceCarriedForward
  }
}"#;

pub const CAMPAIGNS: &str = r#"query checkCampaigns($accountNumber: String!) {
  account(accountNumber: $accountNumber) {
    campaigns {
      slug
    }
  }
}"#;

pub const WHEEL_SPINS: &str = r#"query getWheelOfFortuneSpinsAllowed($accountNumber: String!) {
  gasSpins: wheelOfFortuneSpinsAllowed(accountNumber: $accountNumber, fuelType: GAS) {
    spinsAllowed
  }
  electricitySpins: wheelOfFortuneSpinsAllowed(accountNumber: $accountNumber, fuelType: ELECTRICITY) {
    spinsAllowed
  }
}"#;

pub const SPIN_WHEEL: &str = r#"mutation spinWheelOfFortune($input: SpinWheelOfFortuneInput!) {
  spinWheelOfFortune(input: $input) {
    spinResult {
      prize
    }
  }
}"#;

pub const ACCOUNT_BALANCE: &str = r#"query accountBalance($accountNumber: String!) {
  account(accountNumber: $accountNumber) {
    balance
  }
}"#;

pub const METER_DEVICES: &str = r#"query meterDevices($accountNumber: String!) {
  account(accountNumber: $accountNumber) {
    electricityAgreements(active: true) {
      meterPoint {
        meters(includeInactive: false) {
          smartDevices {
            deviceId
          }
        }
      }
    }
  }
}"#;

pub const TELEMETRY: &str = r#"query smartMeterTelemetry($deviceId: String!, $start: DateTime!, $end: DateTime!) {
  smartMeterTelemetry(deviceId: $deviceId, start: $start, end: $end, grouping: HALF_HOURLY) {
    readAt
    consumptionDelta
    demand
  }
}"#;

#[derive(Debug, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct GraphQlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl<T: DeserializeOwned> GraphQlResponse<T> {
    /// Any entry in `errors` fails the whole response.
    pub fn into_data(self, endpoint: &str) -> Result<T> {
        if !self.errors.is_empty() {
            let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(Error::GraphQl(messages.join(", ")));
        }
        self.data.ok_or_else(|| Error::Decode {
            endpoint: endpoint.to_string(),
            message: "response has neither data nor errors".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObtainTokenData {
    pub obtain_kraken_token: KrakenToken,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KrakenToken {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub refresh_expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OctoPointsData {
    #[serde(default)]
    pub loyalty_point_ledgers: Vec<PointLedger>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointLedger {
    pub balance_carried_forward: String,
}

#[derive(Debug, Deserialize)]
pub struct CampaignsData {
    pub account: CampaignAccount,
}

#[derive(Debug, Deserialize)]
pub struct CampaignAccount {
    #[serde(default)]
    pub campaigns: Vec<Campaign>,
}

#[derive(Debug, Deserialize)]
pub struct Campaign {
    pub slug: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WheelSpinsData {
    pub electricity_spins: SpinsAllowed,
    pub gas_spins: SpinsAllowed,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinsAllowed {
    pub spins_allowed: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinWheelData {
    pub spin_wheel_of_fortune: SpinWheelPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinWheelPayload {
    pub spin_result: SpinPrize,
}

#[derive(Debug, Deserialize)]
pub struct SpinPrize {
    pub prize: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountBalanceData {
    pub account: AccountBalance,
}

/// Balance in pence.
#[derive(Debug, Deserialize)]
pub struct AccountBalance {
    pub balance: i64,
}

#[derive(Debug, Deserialize)]
pub struct MeterDevicesData {
    pub account: MeterAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterAccount {
    #[serde(default)]
    pub electricity_agreements: Vec<ElectricityAgreement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectricityAgreement {
    pub meter_point: MeterPoint,
}

#[derive(Debug, Deserialize)]
pub struct MeterPoint {
    #[serde(default)]
    pub meters: Vec<Meter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    #[serde(default)]
    pub smart_devices: Vec<SmartDevice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartDevice {
    pub device_id: String,
}

impl MeterDevicesData {
    pub fn device_ids(self) -> Vec<String> {
        self.account
            .electricity_agreements
            .into_iter()
            .flat_map(|a| a.meter_point.meters)
            .flat_map(|m| m.smart_devices)
            .map(|d| d.device_id)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryData {
    #[serde(default)]
    pub smart_meter_telemetry: Vec<TelemetryReading>,
}

/// `consumptionDelta` is in watt-hours, sent as a string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub read_at: chrono::DateTime<chrono::Utc>,
    pub consumption_delta: Option<String>,
    pub demand: Option<String>,
}

/// REST `GET /accounts/{id}/`.
#[derive(Debug, Deserialize)]
pub struct SavingSessionsEnvelope {
    pub data: SavingSessionsBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingSessionsBody {
    pub saving_sessions: SavingSessionsAccountWrapper,
}

#[derive(Debug, Deserialize)]
pub struct SavingSessionsAccountWrapper {
    pub account: SavingSessionsAccount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingSessionsAccount {
    #[serde(default)]
    pub has_joined_campaign: bool,
    #[serde(default)]
    pub joined_events: Vec<crate::core::models::SavingSession>,
}

#[derive(Debug, Deserialize)]
pub struct FreeElectricityFeed {
    #[serde(default)]
    pub data: Vec<crate::core::models::FreeElectricityWindow>,
}
