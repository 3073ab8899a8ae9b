//! Weekday labels for weekday-scoped verification directories.
//!
//! The remote side keeps one directory per weekday. The directory names are
//! part of the remote contract, so the label table is data: the legacy table
//! spells Thursday as "Thurday" because existing remote directories use that
//! spelling.

use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Number of labels in a table.
pub const DAYS_PER_WEEK: usize = 7;

/// Seven weekday labels, index 0 = Monday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayTable([String; DAYS_PER_WEEK]);

impl WeekdayTable {
    /// Build a table from explicit labels (Monday first).
    pub fn new(labels: [&str; DAYS_PER_WEEK]) -> Self {
        Self(labels.map(str::to_string))
    }

    /// Correctly spelled English weekday names.
    pub fn standard() -> Self {
        Self::new([
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thursday",
            "Friday",
            "Saturday",
            "Sunday",
        ])
    }

    /// Table matching the directories created by older verification jobs.
    pub fn legacy() -> Self {
        Self::new([
            "Monday",
            "Tuesday",
            "Wednesday",
            "Thurday",
            "Friday",
            "Saturday",
            "Sunday",
        ])
    }

    /// Label for `index`, or `None` when the index is outside 0..7.
    pub fn label(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Label for a calendar date.
    pub fn label_for_date(&self, date: NaiveDate) -> &str {
        // num_days_from_monday is always < 7
        &self.0[date.weekday().num_days_from_monday() as usize]
    }

    /// All labels in Monday-first order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for WeekdayTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Weekday index of the local date, Monday = 0.
pub fn today_index() -> usize {
    Local::now().weekday().num_days_from_monday() as usize
}
