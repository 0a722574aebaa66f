mod app;
mod dbus;
mod polling;

use crate::core::settings::Settings;
use anyhow::Result;

pub const DBUS_NAME: &str = "dev.octojoin.Monitor";
pub const DBUS_PATH: &str = "/dev/octojoin/Monitor";

pub async fn run(settings: Settings) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting octojoin daemon");
    app::run(settings).await
}
