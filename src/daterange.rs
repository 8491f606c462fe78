//! Date-range filter bar: input validation and the bounds sent to the store.
use chrono::{DateTime, FixedOffset, Months, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GridError;

static DATE_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<FixedOffset>,
    /// Open-ended when `None`.
    pub to: Option<DateTime<FixedOffset>>,
}

impl DateRange {
    /// `years` back from `now` up to `now`.
    pub fn lookback(now: DateTime<FixedOffset>, years: u32) -> Self {
        let from = now
            .checked_sub_months(Months::new(years.saturating_mul(12)))
            .unwrap_or(now);
        Self { from, to: Some(now) }
    }

    /// Build a range from the two filter inputs.
    ///
    /// Both empty yields `fallback`. An empty `from` keeps the fallback start,
    /// an empty `to` leaves the range open. Dates are read as local midnight in
    /// `offset`.
    pub fn parse_inputs(
        from: &str,
        to: &str,
        fallback: &DateRange,
        offset: FixedOffset,
    ) -> Result<DateRange, GridError> {
        let from = from.trim();
        let to = to.trim();
        if from.is_empty() && to.is_empty() {
            return Ok(fallback.clone());
        }

        let from_dt = match from {
            "" => fallback.from,
            s => parse_day(s, offset).ok_or_else(|| GridError::validation("Incorrect From Date Format"))?,
        };
        let to_dt = match to {
            "" => None,
            s => Some(parse_day(s, offset).ok_or_else(|| GridError::validation("Incorrect To Date Format"))?),
        };

        if let Some(to_dt) = to_dt {
            if from_dt > to_dt {
                return Err(GridError::validation("From Date must not be after To Date"));
            }
        }
        Ok(DateRange {
            from: from_dt,
            to: to_dt,
        })
    }

    pub fn from_param(&self) -> String {
        format_bound(&self.from)
    }

    pub fn to_param(&self) -> Option<String> {
        self.to.as_ref().map(format_bound)
    }
}

/// `YYYY-MM-DDTHH:MM:SS±hhmm`, the form the store's `created_at` filters take.
pub fn format_bound(dt: &DateTime<FixedOffset>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%z").to_string()
}

fn parse_day(input: &str, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    if !DATE_INPUT.is_match(input) {
        return None;
    }
    let day = NaiveDate::parse_from_str(input, "%Y-%m-%d").ok()?;
    offset
        .from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
        .single()
}
