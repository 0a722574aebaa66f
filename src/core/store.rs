use crate::core::alerts::{AlertBook, ALERT_SWEEP_AGE_DAYS};
use crate::core::cache::ResourceCache;
use crate::core::error::{Error, Result};
use crate::core::models::Credential;
use crate::core::schedule::PollSchedule;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Everything the monitor persists between runs, keyed by account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessState {
    pub account_id: String,
    pub credential: Credential,
    pub cache: ResourceCache,
    pub known_sessions: BTreeSet<i64>,
    pub known_benefit_windows: BTreeSet<String>,
    pub alerts: AlertBook,
    pub schedule: PollSchedule,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ProcessState {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Self::default()
        }
    }

    /// Forgets free electricity windows that have ended, including ones that
    /// dropped out of the feed before a check saw them end.
    pub fn prune_benefit_windows(&mut self, now: DateTime<Utc>) -> usize {
        let removed = self.alerts.prune(now);
        let alerts = &self.alerts;
        self.known_benefit_windows
            .retain(|code| alerts.get(code).is_some());
        removed
    }

    fn sweep_stale_alerts(&mut self, now: DateTime<Utc>) {
        let Some(last_updated) = self.last_updated else {
            return;
        };
        if now - last_updated > Duration::days(ALERT_SWEEP_AGE_DAYS) && !self.alerts.is_empty() {
            tracing::info!(
                records = self.alerts.len(),
                "State not updated for a week, sweeping alert records"
            );
            self.alerts.clear();
        }
    }
}

/// The single lock around process state. Cloning shares the same state.
#[derive(Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<ProcessState>>,
    path: Option<Arc<PathBuf>>,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn state_path(account_id: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|p| {
            p.join("octojoin")
                .join(format!("state_{}.json", account_id))
        })
    }

    /// Loads state from `path`, falling back to a fresh state when the file is
    /// missing, unreadable or belongs to another account.
    pub fn load(path: PathBuf, account_id: &str, now: DateTime<Utc>) -> Self {
        let mut state = match read_state(&path) {
            Ok(Some(state)) if state.account_id.is_empty() || state.account_id == account_id => {
                tracing::debug!(?path, "Loaded state");
                state
            }
            Ok(Some(state)) => {
                tracing::warn!(?path, found = %state.account_id, "State belongs to another account, starting fresh");
                ProcessState::default()
            }
            Ok(None) => {
                tracing::info!(?path, "No saved state, starting fresh");
                ProcessState::default()
            }
            Err(e) => {
                tracing::warn!(?path, error = %e, "Could not read saved state, starting fresh");
                ProcessState::default()
            }
        };

        state.account_id = account_id.to_string();
        state.sweep_stale_alerts(now);

        Self {
            inner: Arc::new(RwLock::new(state)),
            path: Some(Arc::new(path)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub async fn read<R>(&self, f: impl FnOnce(&ProcessState) -> R) -> R {
        f(&*self.inner.read().await)
    }

    pub async fn update<R>(&self, f: impl FnOnce(&mut ProcessState) -> R) -> R {
        f(&mut *self.inner.write().await)
    }

    pub async fn snapshot(&self) -> ProcessState {
        self.inner.read().await.clone()
    }

    pub async fn credential(&self) -> Credential {
        self.inner.read().await.credential.clone()
    }

    pub async fn set_credential(&self, credential: Credential) {
        self.inner.write().await.credential = credential;
    }

    /// Stamps `last_updated` and writes the state atomically. A no-op for
    /// in-memory stores.
    pub async fn save(&self, now: DateTime<Utc>) -> Result<()> {
        let json = {
            let mut inner = self.inner.write().await;
            inner.last_updated = Some(now);
            serde_json::to_string_pretty(&*inner)?
        };

        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        write_atomic(path, json.as_bytes()).await
    }
}

fn read_state(path: &Path) -> Result<Option<ProcessState>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(Error::Persistence {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    Ok(Some(serde_json::from_str(&content)?))
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let persistence = |source| Error::Persistence {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(persistence)?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents).await.map_err(persistence)?;
    tokio::fs::rename(&tmp, path).await.map_err(persistence)?;
    Ok(())
}
