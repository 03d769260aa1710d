use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The calendar month every run operates on, anchored to a reference day.
///
/// The reference day is "today" for a live run; tests pin it to a fixed date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthWindow {
    reference: NaiveDate,
}

impl MonthWindow {
    pub fn for_date(reference: NaiveDate) -> Self {
        MonthWindow { reference }
    }

    pub fn current() -> Self {
        MonthWindow {
            reference: chrono::Local::now().date_naive(),
        }
    }

    pub fn reference(self) -> NaiveDate {
        self.reference
    }

    pub fn year(self) -> i32 {
        self.reference.year()
    }

    pub fn month(self) -> u32 {
        self.reference.month()
    }

    /// Day of month of the reference date (1-based).
    pub fn day(self) -> u32 {
        self.reference.day()
    }

    pub fn start(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year(), self.month(), 1)
            .unwrap_or(self.reference)
    }

    /// Number of days in the month (28–31).
    pub fn last_day(self) -> u32 {
        let (y, m) = if self.month() == 12 {
            (self.year() + 1, 1)
        } else {
            (self.year(), self.month() + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .map(|d| d.day())
            .unwrap_or(31)
    }

    pub fn end(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year(), self.month(), self.last_day())
            .unwrap_or(self.reference)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start() && date <= self.end()
    }

    pub fn remaining_days(self) -> u32 {
        self.last_day().saturating_sub(self.day())
    }

    /// How far through the month the reference day is, in percent.
    pub fn progress_percent(self) -> f64 {
        f64::from(self.day()) / f64::from(self.last_day()) * 100.0
    }
}

impl fmt::Display for MonthWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}
