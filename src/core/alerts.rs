use crate::core::models::FreeElectricityWindow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Records whose window end is unknown are dropped after this long.
pub const ALERT_SWEEP_AGE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStage {
    Initial,
    DayOf,
    TwelveHour,
    SixHour,
    Final,
}

impl AlertStage {
    /// Tightest threshold first.
    fn thresholds() -> [(AlertStage, Duration); 4] {
        [
            (AlertStage::Final, Duration::minutes(15)),
            (AlertStage::SixHour, Duration::hours(6)),
            (AlertStage::TwelveHour, Duration::hours(12)),
            (AlertStage::DayOf, Duration::hours(24)),
        ]
    }

    pub fn for_time_until(time_until: Duration) -> AlertStage {
        Self::thresholds()
            .into_iter()
            .find(|(_, threshold)| time_until <= *threshold)
            .map_or(AlertStage::Initial, |(stage, _)| stage)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertStage::Initial => "INITIAL ALERT",
            AlertStage::DayOf => "DAY-OF REMINDER",
            AlertStage::TwelveHour => "12-HOUR REMINDER",
            AlertStage::SixHour => "6-HOUR REMINDER",
            AlertStage::Final => "STARTING SOON",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub code: String,
    /// Highest stage reached so far.
    #[serde(default)]
    pub stage: Option<AlertStage>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub seen_at: Option<DateTime<Utc>>,
}

impl AlertRecord {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            stage: None,
            end_at: None,
            seen_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match (self.end_at, self.seen_at) {
            (Some(end_at), _) => end_at <= now,
            (None, Some(seen_at)) => now - seen_at > Duration::days(ALERT_SWEEP_AGE_DAYS),
            (None, None) => false,
        }
    }

    pub fn has_passed(&self, stage: AlertStage) -> bool {
        self.stage.is_some_and(|reached| reached >= stage)
    }

    fn advance_to(&mut self, target: AlertStage) -> bool {
        if self.has_passed(target) {
            return false;
        }
        self.stage = Some(target);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Upcoming(AlertStage),
    ActiveNow,
}

impl AlertKind {
    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::Upcoming(stage) => stage.label(),
            AlertKind::ActiveNow => "ACTIVE NOW",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    pub window: FreeElectricityWindow,
}

/// Per-window alert progress. A window moves through the stages in order and
/// never moves backwards; each evaluation fires at most one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertBook {
    records: HashMap<String, AlertRecord>,
}

impl AlertBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(&mut self, window: &FreeElectricityWindow, now: DateTime<Utc>) -> Option<Alert> {
        if window.has_ended(now) {
            if self.records.remove(&window.code).is_some() {
                tracing::debug!(code = %window.code, "Window ended, dropping alert record");
            }
            return None;
        }

        let record = self
            .records
            .entry(window.code.clone())
            .or_insert_with(|| AlertRecord::new(window.code.clone()));
        record.end_at = Some(window.end_at);
        record.seen_at.get_or_insert(now);

        let kind = if window.is_active(now) {
            AlertKind::ActiveNow
        } else {
            AlertKind::Upcoming(AlertStage::for_time_until(window.time_until_start(now)))
        };
        let target = match kind {
            AlertKind::ActiveNow => AlertStage::Final,
            AlertKind::Upcoming(stage) => stage,
        };

        record.advance_to(target).then(|| Alert {
            kind,
            window: window.clone(),
        })
    }

    /// Drops records for windows that have ended, whether or not the feed
    /// still lists them. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        for record in self.records.values_mut() {
            record.seen_at.get_or_insert(now);
        }
        self.records.retain(|_, record| !record.is_expired(now));
        before - self.records.len()
    }

    pub fn get(&self, code: &str) -> Option<&AlertRecord> {
        self.records.get(code)
    }

    pub fn records(&self) -> impl Iterator<Item = &AlertRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 20, 12, 0, 0).unwrap()
    }

    fn window(code: &str) -> FreeElectricityWindow {
        FreeElectricityWindow {
            code: code.to_string(),
            start_at: start(),
            end_at: start() + Duration::hours(2),
        }
    }

    fn before_start(offset: Duration) -> DateTime<Utc> {
        start() - offset
    }

    #[test]
    fn test_stage_thresholds() {
        assert_eq!(AlertStage::for_time_until(Duration::hours(30)), AlertStage::Initial);
        assert_eq!(AlertStage::for_time_until(Duration::hours(24)), AlertStage::DayOf);
        assert_eq!(AlertStage::for_time_until(Duration::hours(12)), AlertStage::TwelveHour);
        assert_eq!(AlertStage::for_time_until(Duration::hours(6)), AlertStage::SixHour);
        assert_eq!(AlertStage::for_time_until(Duration::minutes(15)), AlertStage::Final);
        assert_eq!(AlertStage::for_time_until(Duration::minutes(16)), AlertStage::SixHour);
    }

    #[test]
    fn test_full_alert_cycle() {
        let mut book = AlertBook::new();
        let w = window("FE-1");

        let first = book.evaluate(&w, before_start(Duration::hours(30))).unwrap();
        assert_eq!(first.kind, AlertKind::Upcoming(AlertStage::Initial));
        assert!(book.evaluate(&w, before_start(Duration::hours(29))).is_none());

        let day_of = book.evaluate(&w, before_start(Duration::hours(20))).unwrap();
        assert_eq!(day_of.kind, AlertKind::Upcoming(AlertStage::DayOf));
        assert!(book.evaluate(&w, before_start(Duration::hours(19))).is_none());

        let six = book.evaluate(&w, before_start(Duration::hours(5))).unwrap();
        assert_eq!(six.kind, AlertKind::Upcoming(AlertStage::SixHour));

        let last = book.evaluate(&w, before_start(Duration::minutes(10))).unwrap();
        assert_eq!(last.kind, AlertKind::Upcoming(AlertStage::Final));
        assert_eq!(last.kind.label(), "STARTING SOON");

        assert!(book.evaluate(&w, start() + Duration::minutes(5)).is_none());

        assert!(book.evaluate(&w, start() + Duration::hours(3)).is_none());
        assert!(book.get("FE-1").is_none());
        assert!(book.is_empty());
    }

    #[test]
    fn test_late_discovery_does_not_cascade() {
        let mut book = AlertBook::new();
        let w = window("FE-2");

        let alert = book.evaluate(&w, before_start(Duration::hours(5))).unwrap();
        assert_eq!(alert.kind, AlertKind::Upcoming(AlertStage::SixHour));

        for minutes_before in [290, 240, 120, 60, 16] {
            assert!(book
                .evaluate(&w, before_start(Duration::minutes(minutes_before)))
                .is_none());
        }

        let record = book.get("FE-2").unwrap();
        assert!(record.has_passed(AlertStage::Initial));
        assert!(record.has_passed(AlertStage::SixHour));
        assert!(!record.has_passed(AlertStage::Final));
    }

    #[test]
    fn test_active_window_alerts_once() {
        let mut book = AlertBook::new();
        let w = window("FE-3");

        let alert = book.evaluate(&w, start() + Duration::minutes(1)).unwrap();
        assert_eq!(alert.kind, AlertKind::ActiveNow);
        assert_eq!(alert.kind.label(), "ACTIVE NOW");

        for minutes_in in [2, 30, 90, 119] {
            assert!(book.evaluate(&w, start() + Duration::minutes(minutes_in)).is_none());
        }
    }

    #[test]
    fn test_stages_are_monotonic() {
        let mut book = AlertBook::new();
        let w = window("FE-4");
        let mut reached = Vec::new();

        for hours_before in [40, 26, 23, 13, 11, 7, 5, 1, 0] {
            book.evaluate(&w, before_start(Duration::hours(hours_before)));
            reached.push(book.get("FE-4").and_then(|r| r.stage));
        }

        for pair in reached.windows(2) {
            assert!(pair[0] <= pair[1], "stage regressed: {:?}", pair);
        }
    }

    #[test]
    fn test_one_alert_per_evaluation() {
        let mut book = AlertBook::new();
        let w = window("FE-5");
        let mut fired = Vec::new();

        for hours_before in [30, 20, 10, 5] {
            if let Some(alert) = book.evaluate(&w, before_start(Duration::hours(hours_before))) {
                fired.push(alert.kind);
            }
        }

        assert_eq!(
            fired,
            vec![
                AlertKind::Upcoming(AlertStage::Initial),
                AlertKind::Upcoming(AlertStage::DayOf),
                AlertKind::Upcoming(AlertStage::TwelveHour),
                AlertKind::Upcoming(AlertStage::SixHour),
            ]
        );
    }

    #[test]
    fn test_reappearing_code_starts_fresh_cycle() {
        let mut book = AlertBook::new();
        let w = window("FE-6");

        book.evaluate(&w, before_start(Duration::minutes(5)));
        assert!(book.evaluate(&w, start() + Duration::hours(2)).is_none());
        assert!(book.get("FE-6").is_none());

        let next_week = FreeElectricityWindow {
            code: "FE-6".to_string(),
            start_at: start() + Duration::days(7),
            end_at: start() + Duration::days(7) + Duration::hours(1),
        };
        let alert = book.evaluate(&next_week, start() + Duration::hours(3)).unwrap();
        assert_eq!(alert.kind, AlertKind::Upcoming(AlertStage::Initial));
    }

    #[test]
    fn test_alert_book_serializes_as_map() {
        let mut book = AlertBook::new();
        book.evaluate(&window("FE-7"), before_start(Duration::hours(3)));

        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["FE-7"]["stage"], "six_hour");

        let restored: AlertBook = serde_json::from_value(json).unwrap();
        assert_eq!(restored, book);
    }

    #[test]
    fn test_prune_drops_windows_that_left_the_feed() {
        let mut book = AlertBook::new();
        book.evaluate(&window("FE-GONE"), before_start(Duration::hours(30)));
        book.evaluate(&window("FE-LATER"), before_start(Duration::hours(30)));
        assert_eq!(book.get("FE-GONE").unwrap().end_at, Some(window("FE-GONE").end_at));

        assert_eq!(book.prune(start() + Duration::hours(1)), 0);
        assert_eq!(book.prune(start() + Duration::hours(2)), 2);
        assert!(book.is_empty());
    }

    #[test]
    fn test_prune_ages_out_records_without_end() {
        let legacy = r#"{"FE-OLD":{"code":"FE-OLD","stage":"initial"}}"#;
        let mut book: AlertBook = serde_json::from_str(legacy).unwrap();

        assert_eq!(book.prune(start()), 0);
        assert_eq!(book.get("FE-OLD").unwrap().seen_at, Some(start()));
        assert_eq!(book.prune(start() + Duration::days(ALERT_SWEEP_AGE_DAYS)), 0);
        assert_eq!(book.prune(start() + Duration::days(ALERT_SWEEP_AGE_DAYS + 1)), 1);
    }
}
