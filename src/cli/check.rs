use crate::core::format::{format_duration, format_time_until};
use crate::core::monitor::{Monitor, TickReport};
use crate::core::notifications::Notifier;
use crate::core::schedule::local_now;
use crate::core::settings::Settings;
use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};

/// Days of smart meter history shown after a check.
const USAGE_DAYS: u32 = 1;

pub async fn run(settings: &Settings) -> Result<()> {
    let now = local_now();
    let now_utc = now.with_timezone(&Utc);
    let monitor = Monitor::open(settings, now_utc).context("Failed to set up monitor")?;

    match monitor.campaign_status(now).await {
        Ok(status) => {
            println!("Campaigns");
            println!("  {:<17} {}", "Octoplus:", enabled(status.octoplus));
            println!("  {:<17} {}", "Saving sessions:", enabled(status.saving_sessions));
            println!("  {:<17} {}", "Free electricity:", enabled(status.free_electricity));
            println!();
        }
        Err(e) => println!("Could not check campaign status: {}\n", e),
    }

    let report = monitor.tick(now).await;
    Notifier::new(settings.notifications.enabled).deliver(&report, now_utc);
    print_report(&report, now_utc);

    match monitor.account_info(now).await {
        Ok(info) => println!("Account balance: £{:.2}", info.balance_pounds),
        Err(e) => println!("Could not read account balance: {}", e),
    }
    match monitor.recent_usage(USAGE_DAYS, now).await {
        Ok(readings) if !readings.is_empty() => {
            let total: f64 = readings.iter().map(|r| r.consumption_kwh).sum();
            println!("Electricity used in the last day: {:.2} kWh", total);
        }
        Ok(_) => {}
        Err(e) => println!("Could not read smart meter usage: {}", e),
    }
    if let Err(e) = monitor.store().save(now_utc).await {
        tracing::warn!(error = %e, "Failed to save state");
    }

    let next = monitor.next_interval(local_now()).await;
    println!(
        "\nNext check in {} when running as a daemon",
        format_duration(chrono::Duration::seconds(next.as_secs() as i64))
    );

    if !report.failures.is_empty() {
        anyhow::bail!("Check finished with {} error(s)", report.failures.len());
    }
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "not enrolled"
    }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%a %-d %b %H:%M").to_string()
}

fn print_report(report: &TickReport, now: DateTime<Utc>) {
    if let Some(points) = report.points {
        println!("OctoPoints: {}", points);
    }

    if report.new_sessions.is_empty() {
        println!("No new saving sessions");
    } else {
        println!("New saving sessions");
        for session in &report.new_sessions {
            let joined = report.joined.iter().any(|j| j.event_id == session.event_id);
            println!(
                "  #{:<8} {} ({}), {}, {} points{}",
                session.event_id,
                local_time(session.start_at),
                if session.is_upcoming(now) {
                    format!("in {}", format_time_until(session.start_at - now))
                } else {
                    "started".to_string()
                },
                format_duration(session.duration()),
                session.octopoints,
                if joined { ", joined" } else { "" }
            );
        }
    }

    if !report.spins.is_empty() {
        println!(
            "Wheel of Fortune: {} spin(s), {} points",
            report.spins.len(),
            report.spin_prizes()
        );
    }

    for alert in &report.alerts {
        println!(
            "Free electricity {}: {} to {}",
            alert.kind.label(),
            local_time(alert.window.start_at),
            local_time(alert.window.end_at)
        );
    }

    for failure in &report.failures {
        println!("Error: {}", failure);
    }
}
