use crate::core::credentials::CredentialManager;
use crate::core::error::Error;
use crate::core::format::mask_account_id;
use crate::core::models::ResourceKind;
use crate::core::settings::Settings;
use crate::core::store::StateStore;
use crate::octopus::{OctopusApi, OctopusClient};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Days of usage requested by the telemetry check.
const USAGE_CHECK_DAYS: u32 = 1;

#[derive(Debug, Serialize)]
struct CheckResult {
    resource: String,
    ok: bool,
    detail: String,
}

impl CheckResult {
    fn new(resource: impl Into<String>, outcome: std::result::Result<String, Error>) -> Self {
        match outcome {
            Ok(detail) => Self {
                resource: resource.into(),
                ok: true,
                detail,
            },
            Err(e) => Self {
                resource: resource.into(),
                ok: false,
                detail: e.to_string(),
            },
        }
    }
}

/// Reads every remote resource once, bypassing the cache.
pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    let now = Utc::now();
    let store = StateStore::in_memory();
    let credentials = CredentialManager::new(settings.account.api_key.as_str(), store);
    let client = OctopusClient::new(&settings.account.id, settings.api.clone(), credentials)
        .context("Failed to build API client")?;

    let token = client
        .transport()
        .credentials()
        .ensure_valid(client.transport(), now)
        .await
        .map(|_| "obtained".to_string());
    let mut results = vec![CheckResult::new("token", token)];
    results.extend(check_resources(&client, now).await);

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("Account {}", mask_account_id(&settings.account.id));
        for result in &results {
            let mark = if result.ok { "ok  " } else { "FAIL" };
            println!("  [{}] {:<20} {}", mark, result.resource, result.detail);
        }
    }

    let failed = results.iter().filter(|r| !r.ok).count();
    if failed > 0 {
        anyhow::bail!("{} of {} checks failed", failed, results.len());
    }
    Ok(())
}

async fn check_resources(api: &dyn OctopusApi, now: DateTime<Utc>) -> Vec<CheckResult> {
    let mut results = vec![
        CheckResult::new(
            ResourceKind::SavingSessions.name(),
            api.saving_sessions().await.map(|s| {
                format!(
                    "{} session(s), campaign joined: {}",
                    s.sessions.len(),
                    s.has_joined_campaign
                )
            }),
        ),
        CheckResult::new(
            ResourceKind::OctoPoints.name(),
            api.octo_points().await.map(|p| format!("{} points", p)),
        ),
        CheckResult::new(
            ResourceKind::Campaigns.name(),
            api.campaigns().await.map(|c| {
                format!(
                    "octoplus: {}, saving sessions: {}, free electricity: {}",
                    c.octoplus, c.saving_sessions, c.free_electricity
                )
            }),
        ),
        CheckResult::new(
            ResourceKind::FreeElectricity.name(),
            api.free_electricity()
                .await
                .map(|w| format!("{} window(s)", w.len())),
        ),
        CheckResult::new(
            ResourceKind::WheelSpins.name(),
            api.wheel_spins()
                .await
                .map(|s| format!("{} electricity, {} gas", s.electricity, s.gas)),
        ),
        CheckResult::new(
            ResourceKind::AccountInfo.name(),
            api.account_info()
                .await
                .map(|a| format!("balance £{:.2}", a.balance_pounds)),
        ),
    ];

    let devices = api.meter_devices().await;
    let first_device = devices
        .as_ref()
        .ok()
        .and_then(|d| d.first().cloned());
    results.push(CheckResult::new(
        ResourceKind::MeterDevices.name(),
        devices.map(|d| format!("{} device(s)", d.len())),
    ));

    let usage = match first_device {
        Some(device_id) => CheckResult::new(
            ResourceKind::UsageMeasurements.name(),
            api.usage(&device_id, USAGE_CHECK_DAYS, now)
                .await
                .map(|m| format!("{} reading(s) in the last day", m.len())),
        ),
        None => CheckResult {
            resource: ResourceKind::UsageMeasurements.name().to_string(),
            ok: true,
            detail: "skipped, no smart meter device".to_string(),
        },
    };
    results.push(usage);

    results
}
