use crate::core::monitor::Monitor;
use crate::core::status::StateSummary;
use crate::daemon::polling::PollControl;
use crate::daemon::{DBUS_NAME, DBUS_PATH};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use zbus::interface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbusCommand {
    CheckNow,
}

pub struct OctojoinService {
    commands: mpsc::UnboundedSender<DbusCommand>,
    monitor: Arc<Monitor>,
    control: PollControl,
}

impl OctojoinService {
    pub fn new(
        commands: mpsc::UnboundedSender<DbusCommand>,
        monitor: Arc<Monitor>,
        control: PollControl,
    ) -> Self {
        Self {
            commands,
            monitor,
            control,
        }
    }

    fn request_check(&self) -> std::result::Result<(), String> {
        self.commands
            .send(DbusCommand::CheckNow)
            .map_err(|_| "poll loop is not running".to_string())
    }

    async fn status_json(&self) -> serde_json::Result<String> {
        let now = Utc::now();
        let summary = self
            .monitor
            .store()
            .read(|state| StateSummary::from_state(state, now))
            .await
            .with_requests(self.monitor.api().stats());
        serde_json::to_string(&summary)
    }
}

#[interface(name = "dev.octojoin.Monitor")]
impl OctojoinService {
    async fn check_now(&self) -> zbus::fdo::Result<()> {
        tracing::info!("D-Bus CheckNow called");
        self.request_check().map_err(zbus::fdo::Error::Failed)
    }

    async fn status(&self) -> zbus::fdo::Result<String> {
        self.status_json()
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    #[zbus(property)]
    fn next_check_secs(&self) -> u64 {
        self.control.next_check_secs(Utc::now())
    }
}

pub async fn start_dbus_server(service: OctojoinService) -> Result<zbus::Connection> {
    let connection = zbus::connection::Builder::session()
        .context("Failed to connect to session D-Bus")?
        .name(DBUS_NAME)
        .context("Failed to request D-Bus name")?
        .serve_at(DBUS_PATH, service)
        .context("Failed to register D-Bus object")?
        .build()
        .await
        .with_context(|| format!("Failed to start D-Bus service {DBUS_NAME}"))?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "D-Bus interface ready");
    Ok(connection)
}
