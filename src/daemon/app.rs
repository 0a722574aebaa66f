use crate::core::monitor::Monitor;
use crate::core::notifications::Notifier;
use crate::core::schedule::local_now;
use crate::core::settings::Settings;
use crate::daemon::dbus::{start_dbus_server, DbusCommand, OctojoinService};
use crate::daemon::polling::{run_poll_loop, PollControl};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub async fn run(settings: Settings) -> Result<()> {
    let monitor = Arc::new(Monitor::open(&settings, Utc::now()).context("Failed to set up monitor")?);
    let notifier = Notifier::new(settings.notifications.enabled);
    let control = PollControl::new();
    let cancel = CancellationToken::new();

    log_campaign_status(&monitor).await;

    let (dbus_cmd_tx, dbus_cmd_rx) = mpsc::unbounded_channel::<DbusCommand>();
    let service = OctojoinService::new(dbus_cmd_tx, Arc::clone(&monitor), control.clone());
    let _dbus_connection = match start_dbus_server(service).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            tracing::warn!(error = %e, "D-Bus interface unavailable, `octojoin refresh` will not work");
            None
        }
    };

    tokio::spawn(handle_dbus_commands(dbus_cmd_rx, control.clone()));

    let poll = tokio::spawn(run_poll_loop(
        Arc::clone(&monitor),
        notifier,
        control,
        cancel.clone(),
        local_now,
    ));

    wait_for_shutdown().await?;
    tracing::info!("Shutdown requested, waiting for the current check to finish");
    cancel.cancel();
    poll.await.context("Poll loop task failed")?;

    Ok(())
}

async fn handle_dbus_commands(mut cmd_rx: mpsc::UnboundedReceiver<DbusCommand>, control: PollControl) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            DbusCommand::CheckNow => {
                tracing::debug!("D-Bus check command received");
                control.check_now();
            }
        }
    }
}

async fn log_campaign_status(monitor: &Monitor) {
    match monitor.campaign_status(local_now()).await {
        Ok(status) => {
            tracing::info!(
                octoplus = status.octoplus,
                saving_sessions = status.saving_sessions,
                free_electricity = status.free_electricity,
                "Campaign status"
            );
            if !status.saving_sessions_enabled() {
                tracing::warn!("Account is not enrolled in saving sessions, joins will likely fail");
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not check campaign status"),
    }
}

async fn wait_for_shutdown() -> Result<()> {
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for Ctrl-C")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}
