//! Usage Month
//!
//! Calendar month key (`YYYY-MM`) for anonymous quota records.

use chrono::{Datelike, Utc};
use std::fmt;

/// Calendar month in `YYYY-MM` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageMonth(String);

impl UsageMonth {
    /// The current UTC calendar month
    pub fn current() -> Self {
        let now = Utc::now();
        Self(format!("{:04}-{:02}", now.year(), now.month()))
    }

    /// Parse a `YYYY-MM` string
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        year.parse::<u16>().ok()?;
        let m: u8 = month.parse().ok()?;
        if !(1..=12).contains(&m) {
            return None;
        }
        Some(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UsageMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
