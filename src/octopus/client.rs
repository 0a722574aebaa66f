use crate::core::credentials::CredentialManager;
use crate::core::error::{Error, Result};
use crate::core::models::{
    AccountInfo, CampaignStatus, FreeElectricityWindow, FuelType, SavingSessionsSnapshot,
    SpinResult, UsageMeasurement, WheelSpins,
};
use crate::core::settings::ApiSettings;
use crate::octopus::queries::{
    self, AccountBalanceData, CampaignsData, FreeElectricityFeed, MeterDevicesData,
    OctoPointsData, SavingSessionsEnvelope, SpinWheelData, TelemetryData, WheelSpinsData,
};
use crate::octopus::transport::{Auth, Transport, TransportStats};
use crate::octopus::OctopusApi;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

pub struct OctopusClient {
    account_id: String,
    api: ApiSettings,
    transport: Transport,
}

impl OctopusClient {
    pub fn new(
        account_id: impl Into<String>,
        api: ApiSettings,
        credentials: CredentialManager,
    ) -> Result<Self> {
        let transport = Transport::new(&api, credentials)?;
        Ok(Self {
            account_id: account_id.into(),
            api,
            transport,
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    fn account_url(&self) -> String {
        format!(
            "{}/accounts/{}/",
            self.api.base_url.trim_end_matches('/'),
            self.account_id
        )
    }

    fn join_url(&self, event_id: i64) -> String {
        format!(
            "{}/accounts/{}/saving-sessions/{}/join",
            self.api.base_url.trim_end_matches('/'),
            self.account_id,
            event_id
        )
    }

    fn account_variables(&self) -> serde_json::Value {
        json!({ "accountNumber": self.account_id })
    }
}

fn parse_number(endpoint: &str, field: &str, raw: &str) -> Result<f64> {
    raw.trim().parse::<f64>().map_err(|e| Error::Decode {
        endpoint: endpoint.to_string(),
        message: format!("{field} is not a number ({raw:?}): {e}"),
    })
}

#[async_trait]
impl OctopusApi for OctopusClient {
    async fn saving_sessions(&self) -> Result<SavingSessionsSnapshot> {
        let url = self.account_url();
        let response = self.transport.get(&url, Auth::ApiKey).await?;
        response.ensure_status(&url, &[200])?;

        let envelope: SavingSessionsEnvelope = response.json(&url)?;
        let account = envelope.data.saving_sessions.account;
        tracing::debug!(
            sessions = account.joined_events.len(),
            has_joined_campaign = account.has_joined_campaign,
            "Fetched saving sessions"
        );
        Ok(SavingSessionsSnapshot {
            has_joined_campaign: account.has_joined_campaign,
            sessions: account.joined_events,
        })
    }

    async fn join_saving_session(&self, event_id: i64) -> Result<()> {
        let url = self.join_url(event_id);
        let joined = match self.transport.post(&url, None, Auth::ApiKey).await {
            Ok(response) => response.ensure_status(&url, &[200, 201]),
            Err(e) => Err(e),
        };
        joined.map_err(|source| Error::Join {
            event_id,
            source: Box::new(source),
        })
    }

    async fn octo_points(&self) -> Result<i64> {
        let url = &self.api.graphql_url;
        let data: OctoPointsData = self
            .transport
            .graphql(url, queries::OCTO_POINTS, json!({}))
            .await?
            .graphql(url)?;

        let Some(ledger) = data.loyalty_point_ledgers.first() else {
            tracing::debug!("No OctoPoints ledger entries");
            return Ok(0);
        };
        ledger
            .balance_carried_forward
            .trim()
            .parse::<i64>()
            .map_err(|e| Error::Decode {
                endpoint: url.clone(),
                message: format!(
                    "balanceCarriedForward is not an integer ({:?}): {}",
                    ledger.balance_carried_forward, e
                ),
            })
    }

    async fn campaigns(&self) -> Result<CampaignStatus> {
        let url = &self.api.graphql_url;
        let data: CampaignsData = self
            .transport
            .graphql(url, queries::CAMPAIGNS, self.account_variables())
            .await?
            .graphql(url)?;

        let slugs = data.account.campaigns.iter().map(|c| c.slug.as_str());
        Ok(CampaignStatus::from_slugs(slugs))
    }

    async fn free_electricity(&self) -> Result<Vec<FreeElectricityWindow>> {
        let url = &self.api.free_electricity_url;
        let response = self.transport.get(url, Auth::None).await?;
        response.ensure_status(url, &[200])?;
        let feed: FreeElectricityFeed = response.json(url)?;
        Ok(feed.data)
    }

    async fn wheel_spins(&self) -> Result<WheelSpins> {
        let url = &self.api.backend_graphql_url;
        let data: WheelSpinsData = self
            .transport
            .graphql(url, queries::WHEEL_SPINS, self.account_variables())
            .await?
            .graphql(url)?;

        Ok(WheelSpins {
            electricity: data.electricity_spins.spins_allowed,
            gas: data.gas_spins.spins_allowed,
        })
    }

    async fn spin_wheel(&self, fuel: FuelType) -> Result<SpinResult> {
        let url = &self.api.backend_graphql_url;
        let variables = json!({
            "input": { "accountNumber": self.account_id, "fuelType": fuel.as_graphql() }
        });
        let data: SpinWheelData = self
            .transport
            .graphql(url, queries::SPIN_WHEEL, variables)
            .await?
            .graphql(url)?;

        Ok(SpinResult {
            fuel,
            prize: data.spin_wheel_of_fortune.spin_result.prize,
        })
    }

    async fn account_info(&self) -> Result<AccountInfo> {
        let url = &self.api.graphql_url;
        let data: AccountBalanceData = self
            .transport
            .graphql(url, queries::ACCOUNT_BALANCE, self.account_variables())
            .await?
            .graphql(url)?;

        Ok(AccountInfo {
            balance_pounds: data.account.balance as f64 / 100.0,
        })
    }

    async fn meter_devices(&self) -> Result<Vec<String>> {
        let url = &self.api.graphql_url;
        let data: MeterDevicesData = self
            .transport
            .graphql(url, queries::METER_DEVICES, self.account_variables())
            .await?
            .graphql(url)?;
        Ok(data.device_ids())
    }

    async fn usage(
        &self,
        device_id: &str,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<UsageMeasurement>> {
        let url = &self.api.graphql_url;
        let start = now - Duration::days(i64::from(days));
        let variables = json!({
            "deviceId": device_id,
            "start": start.to_rfc3339(),
            "end": now.to_rfc3339(),
        });
        let data: TelemetryData = self
            .transport
            .graphql(url, queries::TELEMETRY, variables)
            .await?
            .graphql(url)?;

        data.smart_meter_telemetry
            .into_iter()
            .map(|reading| -> Result<UsageMeasurement> {
                let consumption_wh = match reading.consumption_delta.as_deref() {
                    Some(raw) => parse_number(url, "consumptionDelta", raw)?,
                    None => 0.0,
                };
                let demand_watts = reading
                    .demand
                    .as_deref()
                    .map(|raw| parse_number(url, "demand", raw))
                    .transpose()?;
                Ok(UsageMeasurement {
                    read_at: reading.read_at,
                    consumption_kwh: consumption_wh / 1000.0,
                    demand_watts,
                })
            })
            .collect()
    }

    fn stats(&self) -> TransportStats {
        self.transport.stats()
    }
}
