use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Repeat cadence for a task.
///
/// `Other` absorbs pattern strings written by older builds; rules carrying it
/// never produce occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Daily,
    Workweek,
    Weekly,
    Monthly,
    Yearly,
    #[serde(rename = "custom", other)]
    Other,
}

/// Short weekday labels indexed by day number (0 = Sunday .. 6 = Saturday).
pub const DAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// A recurrence rule. Plain data; it serializes as-is into local state and
/// the remote payload.
///
/// All occurrence math is done on `NaiveDate` at day granularity; there is no
/// time-of-day or timezone involved. `interval` gates whole elapsed periods
/// for every pattern: days (Daily), weeks since the anchor's week (Weekly,
/// with or without a day set), months (Monthly), years (Yearly). Workweek is
/// a fixed Mon–Fri set and ignores `interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    pub enabled: bool,
    pub pattern: Pattern,
    /// Weekday numbers (0 = Sunday .. 6 = Saturday). Weekly only.
    #[serde(default)]
    pub days: Vec<u8>,
    #[serde(default = "default_interval")]
    pub interval: u32,
}

fn default_interval() -> u32 {
    1
}

impl Recurrence {
    pub fn new(pattern: Pattern) -> Self {
        Self {
            enabled: true,
            pattern,
            days: Vec::new(),
            interval: 1,
        }
    }

    pub fn with_days(mut self, days: Vec<u8>) -> Self {
        self.days = days;
        self
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// The effective interval. Stored values below 1 are treated as 1.
    fn step(&self) -> i64 {
        i64::from(self.interval.max(1))
    }

    /// Sorted, deduplicated, in-range weekday set.
    fn day_set(&self) -> Vec<u8> {
        let mut days: Vec<u8> = self.days.iter().copied().filter(|d| *d < 7).collect();
        days.sort_unstable();
        days.dedup();
        days
    }

    /// Whether the rule produces an occurrence on `target`, given the task's
    /// anchor date. Always false before the anchor and for disabled rules.
    pub fn occurs_on(&self, anchor: NaiveDate, target: NaiveDate) -> bool {
        if !self.enabled || target < anchor {
            return false;
        }
        let step = self.step();
        match self.pattern {
            Pattern::Daily => (target - anchor).num_days() % step == 0,
            Pattern::Workweek => is_workday(target),
            Pattern::Weekly => {
                if weeks_between(anchor, target) % step != 0 {
                    return false;
                }
                let days = self.day_set();
                if days.is_empty() {
                    weekday_index(target) == weekday_index(anchor)
                } else {
                    days.contains(&weekday_index(target))
                }
            }
            Pattern::Monthly => {
                months_between(anchor, target) % step == 0 && target.day() == anchor.day()
            }
            Pattern::Yearly => {
                i64::from(target.year() - anchor.year()) % step == 0
                    && target.month() == anchor.month()
                    && target.day() == anchor.day()
            }
            Pattern::Other => false,
        }
    }

    /// The next date the rule fires strictly after `current`.
    ///
    /// `current` is expected to be an occurrence itself (the caller hands in
    /// the date of the instance being acted on). Month and year steps clamp
    /// to the last day of the target month, and the clamp is sticky:
    /// Jan 31 → Feb 29 → Mar 29. Returns `None` for disabled or unknown
    /// rules.
    pub fn next_occurrence(&self, current: NaiveDate) -> Option<NaiveDate> {
        if !self.enabled {
            return None;
        }
        let step = self.step();
        match self.pattern {
            Pattern::Daily => Some(current + Duration::days(step)),
            Pattern::Workweek => {
                let mut date = current + Duration::days(1);
                while !is_workday(date) {
                    date = date + Duration::days(1);
                }
                Some(date)
            }
            Pattern::Weekly => {
                let days = self.day_set();
                if days.is_empty() {
                    return Some(current + Duration::days(7 * step));
                }
                let today = weekday_index(current);
                // Later weekday in the same week, else wrap to the smallest
                // weekday in the next eligible week.
                if let Some(&d) = days.iter().find(|&&d| d > today) {
                    Some(current + Duration::days(i64::from(d - today)))
                } else {
                    let first = days[0];
                    let wrap = i64::from(7 - today + first) + 7 * (step - 1);
                    Some(current + Duration::days(wrap))
                }
            }
            Pattern::Monthly => Some(add_months(current, self.interval.max(1))),
            Pattern::Yearly => Some(add_months(current, self.interval.max(1) * 12)),
            Pattern::Other => None,
        }
    }

    /// Human-readable description, e.g. "Every 2 days", "Every Mon, Wed".
    pub fn label(&self) -> String {
        if !self.enabled {
            return "Does not repeat".to_string();
        }
        let every = |unit: &str, units: &str| {
            if self.interval <= 1 {
                format!("Every {}", unit)
            } else {
                format!("Every {} {}", self.interval, units)
            }
        };
        match self.pattern {
            Pattern::Daily => every("day", "days"),
            Pattern::Workweek => "Weekdays".to_string(),
            Pattern::Weekly => {
                let days = self.day_set();
                if days.is_empty() {
                    every("week", "weeks")
                } else {
                    let names: Vec<&str> =
                        days.iter().map(|&d| DAY_LABELS[d as usize]).collect();
                    format!("Every {}", names.join(", "))
                }
            }
            Pattern::Monthly => every("month", "months"),
            Pattern::Yearly => every("year", "years"),
            Pattern::Other => "Custom".to_string(),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Day number with 0 = Sunday, matching the stored `days` sets.
fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

fn is_workday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// The Sunday starting the week `date` falls in.
fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(weekday_index(date)))
}

fn weeks_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (week_start(b) - week_start(a)).num_days() / 7
}

fn months_between(a: NaiveDate, b: NaiveDate) -> i64 {
    i64::from(b.year() - a.year()) * 12 + i64::from(b.month0()) - i64::from(a.month0())
}

fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    let total_months = date.month0() + months;
    let new_year = date.year() + (total_months / 12) as i32;
    let new_month = (total_months % 12) + 1;
    // Clamp day to valid range for the new month
    let max_day = days_in_month(new_year, new_month);
    let new_day = date.day().min(max_day);
    NaiveDate::from_ymd_opt(new_year, new_month, new_day).unwrap_or(date)
}

fn days_in_month(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(
        if month == 12 { year + 1 } else { year },
        if month == 12 { 1 } else { month + 1 },
        1,
    )
    .unwrap()
    .pred_opt()
    .unwrap()
    .day()
}
