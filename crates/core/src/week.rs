//! Week bucketing.
//!
//! A week starts on the configured anchor day. The bucket for a date is the
//! most recent anchor day on or before it, computed from the calendar date
//! alone so the result never depends on locale.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The day a week starts on. Defaults to Monday (ISO 8601).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeekAnchor(Weekday);

impl WeekAnchor {
    /// Creates an anchor on the given weekday.
    #[must_use]
    pub const fn new(day: Weekday) -> Self {
        Self(day)
    }

    /// Returns the anchor weekday.
    #[must_use]
    pub const fn weekday(&self) -> Weekday {
        self.0
    }

    /// Returns the start of the week containing `date`.
    #[must_use]
    pub fn week_start(&self, date: NaiveDate) -> NaiveDate {
        let day = date.weekday().num_days_from_monday();
        let anchor = self.0.num_days_from_monday();
        let offset = (7 + day - anchor) % 7;
        date - Duration::days(i64::from(offset))
    }
}

impl Default for WeekAnchor {
    fn default() -> Self {
        Self(Weekday::Mon)
    }
}

impl FromStr for WeekAnchor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let day = match s.trim().to_lowercase().as_str() {
            "mon" | "monday" => Weekday::Mon,
            "tue" | "tuesday" => Weekday::Tue,
            "wed" | "wednesday" => Weekday::Wed,
            "thu" | "thursday" => Weekday::Thu,
            "fri" | "friday" => Weekday::Fri,
            "sat" | "saturday" => Weekday::Sat,
            "sun" | "sunday" => Weekday::Sun,
            _ => {
                return Err(PipelineError::configuration(format!(
                    "invalid week_anchor: '{s}'. Valid values: monday..sunday"
                )))
            }
        };
        Ok(Self(day))
    }
}

impl fmt::Display for WeekAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            Weekday::Mon => "monday",
            Weekday::Tue => "tuesday",
            Weekday::Wed => "wednesday",
            Weekday::Thu => "thursday",
            Weekday::Fri => "friday",
            Weekday::Sat => "saturday",
            Weekday::Sun => "sunday",
        };
        f.write_str(name)
    }
}
