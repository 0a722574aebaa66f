use crate::core::format::{format_duration, format_time_until};
use crate::core::settings::Settings;
use crate::core::status::StateSummary;
use crate::core::store::StateStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

pub async fn run(settings: &Settings, json: bool) -> Result<()> {
    if settings.account.id.trim().is_empty() {
        anyhow::bail!("No account configured (set it in the config file, OCTOPUS_ACCOUNT_ID or --account)");
    }

    let now = Utc::now();
    let path = StateStore::state_path(&settings.account.id)
        .context("Could not determine config directory")?;

    if !path.exists() {
        anyhow::bail!(
            "No saved state at {}. Run `octojoin check` or start the daemon first.",
            path.display()
        );
    }

    let store = StateStore::load(path, &settings.account.id, now);
    let summary = store
        .read(|state| StateSummary::from_state(state, now))
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_text_output(&summary, now);
    }

    Ok(())
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%a %-d %b %H:%M").to_string()
}

fn ago(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match at {
        Some(at) => format!("{} ago", format_duration(now - at)),
        None => "never".to_string(),
    }
}

fn print_text_output(summary: &StateSummary, now: DateTime<Utc>) {
    println!("Account {}", summary.account);
    println!("  {:<14} {}", "Last check:", ago(summary.last_updated, now));
    if let Some(points) = summary.octo_points {
        println!("  {:<14} {}", "OctoPoints:", points);
    }
    if let Some(expires_at) = summary.token_expires_at {
        let state = if expires_at > now { "valid" } else { "expired" };
        println!("  {:<14} {} until {}", "Token:", state, local_time(expires_at));
    }

    println!();
    if summary.upcoming_sessions.is_empty() {
        println!("No upcoming saving sessions");
    } else {
        println!("Saving sessions");
        for session in &summary.upcoming_sessions {
            let when = if session.start_at > now {
                format!("in {}", format_time_until(session.start_at - now))
            } else {
                "in progress".to_string()
            };
            println!(
                "  #{:<8} {} ({}), {}, {} points",
                session.event_id,
                local_time(session.start_at),
                when,
                format_duration(session.duration()),
                session.octopoints
            );
        }
    }

    println!();
    if summary.free_electricity.is_empty() {
        println!("No free electricity sessions");
    } else {
        println!("Free electricity");
        for window in &summary.free_electricity {
            let alert = window
                .alert_stage
                .map(|stage| format!(", last alert: {}", stage.label()))
                .unwrap_or_default();
            println!(
                "  {:<10} {} to {}{}",
                window.code,
                local_time(window.start),
                local_time(window.end),
                alert
            );
        }
    }

    println!();
    println!(
        "Polling: {} quiet check(s) in a row, last new entity {}",
        summary.consecutive_empty,
        ago(summary.last_new_entity_at, now)
    );
    println!("Cache");
    for entry in &summary.cache {
        println!("  {:<20} {}", entry.kind.name(), ago(entry.fetched_at, now));
    }
}
