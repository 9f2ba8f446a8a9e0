//! Value-level parsers shared by type inference and conversion
//!
//! Inference decides a column type from a handful of samples; conversion
//! applies that type to millions of rows. Both go through these functions so
//! a value that validated during inference converts the same way at load time.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Literal used by the source systems for "no date"
pub const NO_DATE: &str = "00000000";

/// Boolean tokens accepted (case-insensitive)
pub const BOOLEAN_TOKENS: &[&str] = &["0", "1", "true", "false", "yes", "no"];

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("valid regex"));
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid regex"));

// ============================================================================
// Dates
// ============================================================================

/// Outcome of parsing a `YYYYMMDD` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateParse {
    /// A clean 8-digit calendar date
    Valid(NaiveDate),
    /// The `00000000` marker
    NoDate,
    /// Only a right-truncated prefix parsed (`YYYYMM` or `YYYY`)
    Repaired(NaiveDate),
    /// Nothing usable
    Invalid,
}

impl DateParse {
    /// The date carried by this outcome, if any
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            DateParse::Valid(d) | DateParse::Repaired(d) => Some(*d),
            DateParse::NoDate | DateParse::Invalid => None,
        }
    }

    /// Whether the value parsed without the repair heuristic
    pub fn is_clean(&self) -> bool {
        matches!(self, DateParse::Valid(_) | DateParse::NoDate)
    }
}

/// Parse a `YYYYMMDD` value, repairing by right-truncation when needed
///
/// Truncation tries every prefix from 8 characters down to 4; only 6
/// (`YYYYMM`, first day of month) and 4 (`YYYY`, January 1st) prefixes can
/// yield a date.
pub fn parse_yyyymmdd(raw: &str) -> DateParse {
    let value = raw.trim();
    if value == NO_DATE {
        return DateParse::NoDate;
    }

    if value.len() == 8 {
        if let Some(date) = parse_date_prefix(value) {
            return DateParse::Valid(date);
        }
    }

    let longest = value.len().min(8);
    for len in (4..=longest).rev() {
        if len == value.len() && len == 8 {
            continue;
        }
        let Some(prefix) = value.get(..len) else {
            continue;
        };
        if let Some(date) = parse_date_prefix(prefix) {
            return DateParse::Repaired(date);
        }
    }

    DateParse::Invalid
}

/// Parse an all-digit prefix of length 8, 6 or 4
fn parse_date_prefix(prefix: &str) -> Option<NaiveDate> {
    if !is_all_digits(prefix) {
        return None;
    }
    let year: i32 = prefix.get(..4)?.parse().ok()?;
    match prefix.len() {
        8 => {
            let month: u32 = prefix[4..6].parse().ok()?;
            let day: u32 = prefix[6..8].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        6 => {
            let month: u32 = prefix[4..6].parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, 1)
        }
        4 => NaiveDate::from_ymd_opt(year, 1, 1),
        _ => None,
    }
}

/// Days since the Unix epoch, as stored in Arrow `Date32`
pub fn days_since_epoch(date: NaiveDate) -> i32 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    date.signed_duration_since(epoch).num_days() as i32
}

// ============================================================================
// Numbers
// ============================================================================

/// Numeric shape of a raw value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberKind {
    /// Whole number that fits in 64 bits
    Whole(i64),
    /// Whole number beyond the 64-bit range
    WholeOverflow,
    /// Number with a fractional part
    Decimal,
}

/// Classify a raw value as a number, or `None` if it is not numeric
pub fn classify_number(raw: &str) -> Option<NumberKind> {
    let value = raw.trim();
    if is_integer_literal(value) {
        return Some(match value.parse::<i64>() {
            Ok(n) => NumberKind::Whole(n),
            Err(_) => NumberKind::WholeOverflow,
        });
    }
    if parse_decimal(value, 0).is_some() {
        return Some(NumberKind::Decimal);
    }
    None
}

/// Optional sign followed by digits only
pub fn is_integer_literal(value: &str) -> bool {
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    !digits.is_empty() && is_all_digits(digits)
}

/// Parse a decimal literal into an integer scaled by `10^scale`
///
/// Accepts an optional sign and one `.` or `,` separator. Fraction digits
/// beyond `scale` are rounded half away from zero. Returns `None` on syntax
/// errors or when the result needs more than 38 digits.
pub fn parse_decimal(raw: &str, scale: u32) -> Option<i128> {
    let value = raw.trim();
    let (negative, body) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    let separators = body.chars().filter(|c| *c == '.' || *c == ',').count();
    if separators > 1 {
        return None;
    }
    let (int_part, frac_part) = match body.find(&['.', ','][..]) {
        Some(idx) => (&body[..idx], &body[idx + 1..]),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !is_all_digits_or_empty(int_part) || !is_all_digits_or_empty(frac_part) {
        return None;
    }

    let mut scaled: i128 = 0;
    for digit in int_part.bytes() {
        scaled = scaled
            .checked_mul(10)?
            .checked_add(i128::from(digit - b'0'))?;
    }

    let frac_bytes = frac_part.as_bytes();
    for i in 0..scale as usize {
        let digit = frac_bytes.get(i).map_or(0, |d| i128::from(d - b'0'));
        scaled = scaled.checked_mul(10)?.checked_add(digit)?;
    }
    if let Some(next) = frac_bytes.get(scale as usize) {
        if *next >= b'5' {
            scaled = scaled.checked_add(1)?;
        }
    }

    if scaled >= 10_i128.pow(38) {
        return None;
    }
    Some(if negative { -scaled } else { scaled })
}

// ============================================================================
// Booleans
// ============================================================================

/// Map a boolean token to its value
pub fn parse_bool_token(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Representations
// ============================================================================

/// Representation category used for mixed-representation detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Representation {
    Integer,
    Float,
    Year,
    Text,
}

/// Classify by pattern priority: integer, then float, then 4-digit year
///
/// A 4-digit year matches the integer pattern first, so `Year` is only
/// reported for values the integer pattern rejects.
pub fn classify_representation(value: &str) -> Representation {
    if INTEGER_RE.is_match(value) {
        Representation::Integer
    } else if FLOAT_RE.is_match(value) {
        Representation::Float
    } else if YEAR_RE.is_match(value) {
        Representation::Year
    } else {
        Representation::Text
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Non-empty and ASCII digits only
pub fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn is_all_digits_or_empty(value: &str) -> bool {
    value.bytes().all(|b| b.is_ascii_digit())
}
