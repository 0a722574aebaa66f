use crate::core::alerts::{Alert, AlertKind};
use crate::core::format::{format_days_until, format_duration, format_time_until};
use crate::core::models::SavingSession;
use crate::core::monitor::TickReport;
use anyhow::Result;
use chrono::{DateTime, Duration, Local, Utc};
use notify_rust::Notification;

/// Text shown when a window gets closer than a day is given as a countdown.
const COUNTDOWN_THRESHOLD_HOURS: i64 = 24;

fn starts_in(time_until: Duration) -> String {
    if time_until < Duration::hours(COUNTDOWN_THRESHOLD_HOURS) {
        format!("Starts in {}", format_time_until(time_until))
    } else {
        format!("Starts {}", format_days_until(time_until))
    }
}

fn local_start(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%A, %b %-d at %H:%M").to_string()
}

pub fn alert_summary(alert: &Alert) -> String {
    match alert.kind {
        AlertKind::ActiveNow => "Free electricity ACTIVE NOW".to_string(),
        AlertKind::Upcoming(stage) => format!("Free electricity - {}", stage.label()),
    }
}

pub fn alert_body(alert: &Alert, now: DateTime<Utc>) -> String {
    let window = &alert.window;
    match alert.kind {
        AlertKind::ActiveNow => format!(
            "Your electricity is currently free.\nTime remaining: {}\nEnds at {}",
            format_time_until(window.end_at - now),
            window.end_at.with_timezone(&Local).format("%H:%M"),
        ),
        AlertKind::Upcoming(_) => format!(
            "{}\nDuration: {}\n{}",
            local_start(window.start_at),
            format_duration(window.duration()),
            starts_in(window.time_until_start(now)),
        ),
    }
}

pub fn join_body(session: &SavingSession, now: DateTime<Utc>) -> String {
    format!(
        "{}\nDuration: {}\nReward: {} OctoPoints\n{}",
        local_start(session.start_at),
        format_duration(session.duration()),
        session.octopoints,
        starts_in(session.start_at - now),
    )
}

pub fn send_alert_notification(alert: &Alert, now: DateTime<Utc>) -> Result<()> {
    Notification::new()
        .summary(&alert_summary(alert))
        .body(&alert_body(alert, now))
        .appname("octojoin")
        .timeout(notify_rust::Timeout::Milliseconds(10000))
        .show()?;

    tracing::info!(code = %alert.window.code, kind = alert.kind.label(), "Sent free electricity notification");
    Ok(())
}

pub fn send_join_notification(session: &SavingSession, now: DateTime<Utc>) -> Result<()> {
    Notification::new()
        .summary("Joined saving session")
        .body(&join_body(session, now))
        .appname("octojoin")
        .timeout(notify_rust::Timeout::Milliseconds(10000))
        .show()?;

    tracing::info!(event_id = session.event_id, "Sent join notification");
    Ok(())
}

/// Logs every alert and join, and mirrors them to the desktop when enabled.
#[derive(Debug, Clone, Copy)]
pub struct Notifier {
    desktop: bool,
}

impl Notifier {
    pub fn new(desktop: bool) -> Self {
        Self { desktop }
    }

    pub fn alert(&self, alert: &Alert, now: DateTime<Utc>) {
        tracing::info!(
            code = %alert.window.code,
            kind = alert.kind.label(),
            "{}: {}",
            alert_summary(alert),
            alert_body(alert, now).replace('\n', ", ")
        );
        if self.desktop {
            if let Err(e) = send_alert_notification(alert, now) {
                tracing::warn!(error = %e, "Failed to show desktop notification");
            }
        }
    }

    pub fn joined(&self, session: &SavingSession, now: DateTime<Utc>) {
        if self.desktop {
            if let Err(e) = send_join_notification(session, now) {
                tracing::warn!(error = %e, "Failed to show desktop notification");
            }
        }
    }

    /// Surfaces everything a tick produced. Returns how many notices went out.
    pub fn deliver(&self, report: &TickReport, now: DateTime<Utc>) -> usize {
        for session in &report.joined {
            self.joined(session, now);
        }
        for alert in &report.alerts {
            self.alert(alert, now);
        }
        if report.failures.iter().any(|e| e.is_auth()) {
            tracing::error!("Authentication failed, check the API key");
        }
        if !report.failures.is_empty() {
            tracing::warn!(
                failures = report.failures.len(),
                "Check finished with errors"
            );
        }
        report.joined.len() + report.alerts.len()
    }
}
