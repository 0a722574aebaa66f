use crate::core::alerts::AlertStage;
use crate::core::format::mask_account_id;
use crate::core::models::{ResourceKind, SavingSession};
use crate::core::store::ProcessState;
use crate::octopus::TransportStats;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StateSummary {
    pub account: String,
    pub last_updated: Option<DateTime<Utc>>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub octo_points: Option<i64>,
    pub known_sessions: usize,
    pub upcoming_sessions: Vec<SavingSession>,
    pub free_electricity: Vec<WindowSummary>,
    pub consecutive_empty: u32,
    pub last_new_entity_at: Option<DateTime<Utc>>,
    pub cache: Vec<CacheSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<TransportStats>,
}

#[derive(Debug, Serialize)]
pub struct WindowSummary {
    pub code: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub alert_stage: Option<AlertStage>,
}

#[derive(Debug, Serialize)]
pub struct CacheSummary {
    pub kind: ResourceKind,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl StateSummary {
    pub fn from_state(state: &ProcessState, now: DateTime<Utc>) -> Self {
        let upcoming_sessions = state
            .cache
            .saving_sessions
            .as_ref()
            .map(|entry| {
                entry
                    .value
                    .sessions
                    .iter()
                    .filter(|s| s.end_at > now)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let free_electricity = state
            .cache
            .free_electricity
            .as_ref()
            .map(|entry| {
                entry
                    .value
                    .iter()
                    .filter(|w| !w.has_ended(now))
                    .map(|w| WindowSummary {
                        code: w.code.clone(),
                        start: w.start_at,
                        end: w.end_at,
                        alert_stage: state.alerts.get(&w.code).and_then(|r| r.stage),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            account: mask_account_id(&state.account_id),
            last_updated: state.last_updated,
            token_expires_at: state.credential.expires_at,
            octo_points: state.cache.octo_points.as_ref().map(|e| e.value),
            known_sessions: state.known_sessions.len(),
            upcoming_sessions,
            free_electricity,
            consecutive_empty: state.schedule.consecutive_empty,
            last_new_entity_at: state.schedule.last_new_entity_at,
            cache: ResourceKind::ALL
                .iter()
                .map(|&kind| CacheSummary {
                    kind,
                    fetched_at: state.cache.fetched_at(kind),
                })
                .collect(),
            requests: None,
        }
    }

    pub fn with_requests(mut self, stats: TransportStats) -> Self {
        self.requests = Some(stats);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::CacheEntry;
    use crate::core::models::{FreeElectricityWindow, SavingSessionsSnapshot};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_summary_masks_account_and_hides_past_entries() {
        let now = now();
        let mut state = ProcessState::new("A-1234ABCD");
        state.cache.saving_sessions = Some(CacheEntry::new(
            SavingSessionsSnapshot {
                has_joined_campaign: true,
                sessions: vec![
                    SavingSession {
                        event_id: 1,
                        start_at: now - Duration::hours(3),
                        end_at: now - Duration::hours(2),
                        octopoints: 100,
                    },
                    SavingSession {
                        event_id: 2,
                        start_at: now + Duration::hours(3),
                        end_at: now + Duration::hours(4),
                        octopoints: 200,
                    },
                ],
            },
            now,
            None,
        ));
        state.cache.free_electricity = Some(CacheEntry::new(
            vec![FreeElectricityWindow {
                code: "FE-1".to_string(),
                start_at: now + Duration::hours(5),
                end_at: now + Duration::hours(6),
            }],
            now,
            None,
        ));
        state.alerts.evaluate(
            &state.cache.free_electricity.as_ref().unwrap().value[0].clone(),
            now,
        );

        let summary = StateSummary::from_state(&state, now);
        assert_eq!(summary.account, "A-123***");
        assert_eq!(summary.upcoming_sessions.len(), 1);
        assert_eq!(summary.upcoming_sessions[0].event_id, 2);
        assert_eq!(summary.free_electricity.len(), 1);
        assert_eq!(summary.free_electricity[0].alert_stage, Some(AlertStage::SixHour));
        assert_eq!(summary.cache.len(), ResourceKind::ALL.len());
        assert!(summary.requests.is_none());
    }

    #[test]
    fn test_summary_json_omits_request_stats_unless_present() {
        let state = ProcessState::new("A-1");
        let json = serde_json::to_value(StateSummary::from_state(&state, now())).unwrap();
        assert!(json.get("requests").is_none());

        let json = serde_json::to_value(
            StateSummary::from_state(&state, now()).with_requests(TransportStats::default()),
        )
        .unwrap();
        assert!(json.get("requests").is_some());
    }
}
