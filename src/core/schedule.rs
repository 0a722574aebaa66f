use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ANNOUNCEMENT_START_HOUR: u32 = 14;
pub const ANNOUNCEMENT_END_HOUR: u32 = 16;
pub const BUSINESS_START_HOUR: u32 = 9;
pub const BUSINESS_END_HOUR: u32 = 18;

pub const INTERVAL_ANNOUNCEMENT: Duration = Duration::from_secs(5 * 60);
pub const INTERVAL_BUSINESS: Duration = Duration::from_secs(10 * 60);
pub const INTERVAL_OFF_PEAK: Duration = Duration::from_secs(30 * 60);
pub const INTERVAL_EMPTY_BASE: Duration = Duration::from_secs(15 * 60);
pub const INTERVAL_EMPTY_INCREMENT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FIXED_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// How long after a new entity the loop keeps polling at the fastest rate.
pub const RECENT_ENTITY_WINDOW_MINUTES: i64 = 30;

/// Wall clock in the machine's local offset.
pub fn local_now() -> DateTime<FixedOffset> {
    Local::now().fixed_offset()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeTier {
    Announcement,
    Business,
    OffPeak,
}

impl TimeTier {
    pub fn classify(hour: u32, weekday: Weekday) -> Self {
        if !is_weekday(weekday) {
            return TimeTier::OffPeak;
        }
        if (ANNOUNCEMENT_START_HOUR..ANNOUNCEMENT_END_HOUR).contains(&hour) {
            TimeTier::Announcement
        } else if (BUSINESS_START_HOUR..BUSINESS_END_HOUR).contains(&hour) {
            TimeTier::Business
        } else {
            TimeTier::OffPeak
        }
    }

    pub fn at(now: &DateTime<FixedOffset>) -> Self {
        Self::classify(now.hour(), now.weekday())
    }
}

fn is_weekday(weekday: Weekday) -> bool {
    !matches!(weekday, Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSchedule {
    pub last_new_entity_at: Option<DateTime<Utc>>,
    pub consecutive_empty: u32,
}

impl PollSchedule {
    pub fn record_tick(&mut self, found_new: bool, now: DateTime<Utc>) {
        if found_new {
            self.last_new_entity_at = Some(now);
            self.consecutive_empty = 0;
        } else {
            self.consecutive_empty = self.consecutive_empty.saturating_add(1);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    smart: bool,
    fixed_interval: Duration,
}

impl Scheduler {
    pub fn new(smart: bool, fixed_interval: Duration) -> Self {
        Self {
            smart,
            fixed_interval,
        }
    }

    pub fn is_smart(&self) -> bool {
        self.smart
    }

    pub fn next_interval(&self, now: DateTime<FixedOffset>, schedule: &PollSchedule) -> Duration {
        next_interval(
            now,
            schedule.last_new_entity_at,
            schedule.consecutive_empty,
            self.smart,
            self.fixed_interval,
        )
    }
}

pub fn next_interval(
    now: DateTime<FixedOffset>,
    last_new_entity_at: Option<DateTime<Utc>>,
    consecutive_empty: u32,
    smart: bool,
    fixed_interval: Duration,
) -> Duration {
    if !smart {
        return fixed_interval;
    }

    let recently_found = last_new_entity_at.is_some_and(|last| {
        now.with_timezone(&Utc) - last < chrono::Duration::minutes(RECENT_ENTITY_WINDOW_MINUTES)
    });
    if recently_found {
        return INTERVAL_ANNOUNCEMENT;
    }

    match TimeTier::at(&now) {
        TimeTier::Announcement => INTERVAL_ANNOUNCEMENT,
        TimeTier::Business => INTERVAL_BUSINESS,
        TimeTier::OffPeak if consecutive_empty > 0 => INTERVAL_EMPTY_BASE
            .saturating_add(INTERVAL_EMPTY_INCREMENT.saturating_mul(consecutive_empty))
            .min(INTERVAL_OFF_PEAK),
        TimeTier::OffPeak => INTERVAL_OFF_PEAK,
    }
}
