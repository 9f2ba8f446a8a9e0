//! Common types used throughout datasus-etl
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use crate::error::{Error, Result};
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// Opaque input-unit locator (a path or object key)
pub type Locator = String;

/// Administrative region code (two-letter state code)
pub type RegionCode = String;

/// Generic key-value map with string keys and values
pub type StringMap = HashMap<String, String>;

// ============================================================================
// Period
// ============================================================================

/// A competence period (year + month) used to select input units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    /// Four-digit year
    pub year: u16,
    /// Month, 1-12
    pub month: u8,
}

impl Period {
    /// Earliest period a two-digit file year can denote
    pub const EARLIEST: Period = Period { year: 1990, month: 1 };

    /// Period of the current UTC date
    pub fn current() -> Self {
        let today = Utc::now().date_naive();
        Self {
            year: today.year() as u16,
            month: today.month() as u8,
        }
    }

    /// Create a period, validating the month
    pub fn new(year: u16, month: u8) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::invalid_value(
                "period",
                format!("month must be between 1 and 12, got {month}"),
            ));
        }
        Ok(Self { year, month })
    }

    /// The next period (December rolls over to January)
    #[must_use]
    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Two-digit year + two-digit month, as used in source file names
    pub fn yymm(&self) -> String {
        format!("{:02}{:02}", self.year % 100, self.month)
    }

    /// Inclusive iterator from `start` to `end`
    pub fn range(start: Period, end: Period) -> Vec<Period> {
        let mut periods = Vec::new();
        let mut current = start;
        while current <= end {
            periods.push(current);
            current = current.next();
        }
        periods
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = Error;

    /// Parses `YYYY-MM` or `YYYYMM`
    fn from_str(s: &str) -> Result<Self> {
        let digits: String = s.chars().filter(char::is_ascii_digit).collect();
        if digits.len() != 6 || (s.len() != 6 && s.len() != 7) {
            return Err(Error::invalid_value(
                "period",
                format!("expected YYYY-MM or YYYYMM, got '{s}'"),
            ));
        }
        let year = digits[..4]
            .parse::<u16>()
            .map_err(|e| Error::invalid_value("period", e.to_string()))?;
        let month = digits[4..]
            .parse::<u8>()
            .map_err(|e| Error::invalid_value("period", e.to_string()))?;
        Period::new(year, month)
    }
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}

// ============================================================================
// Utilities
// ============================================================================

/// Extension trait for Option<String> to handle empty strings
pub trait OptionStringExt {
    /// Returns None if the string is empty
    fn none_if_empty(self) -> Option<String>;
}

impl OptionStringExt for Option<String> {
    fn none_if_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}

impl OptionStringExt for String {
    fn none_if_empty(self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}
