pub mod alerts;
pub mod cache;
pub mod credentials;
pub mod error;
pub mod format;
pub mod models;
pub mod monitor;
pub mod notifications;
pub mod retry;
pub mod schedule;
pub mod settings;
pub mod status;
pub mod store;
