//! App-range selector parsing
//!
//! Syntax: comma-separated list of `N` or inclusive `start-end` ranges,
//! e.g. `1-3,5,7-9`. An empty (or all-whitespace) string selects every app
//! of the model and parses to `None`. Every number is checked against `max`
//! before a range is filled in.

use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppRangeError {
    #[error("empty segment at position {0}")]
    EmptySegment(usize),

    #[error("'{0}' is not a positive integer")]
    NotANumber(String),

    #[error("app numbers start at 1, got 0")]
    Zero,

    #[error("range {start}-{end} has start greater than end")]
    Reversed { start: u32, end: u32 },

    #[error("app number {value} exceeds the maximum of {max}")]
    TooLarge { value: u32, max: u32 },
}

/// Parse an app-range string into the selected app numbers, none above `max`
pub fn parse_app_range(input: &str, max: u32) -> Result<Option<BTreeSet<u32>>, AppRangeError> {
    if input.trim().is_empty() {
        return Ok(None);
    }

    let mut apps = BTreeSet::new();
    for (position, segment) in input.split(',').enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(AppRangeError::EmptySegment(position));
        }

        match segment.split_once('-') {
            Some((start, end)) => {
                let start = parse_positive(start)?;
                let end = parse_positive(end)?;
                if start > end {
                    return Err(AppRangeError::Reversed { start, end });
                }
                check_max(end, max)?;
                apps.extend(start..=end);
            }
            None => {
                let value = parse_positive(segment)?;
                check_max(value, max)?;
                apps.insert(value);
            }
        }
    }

    Ok(Some(apps))
}

fn parse_positive(raw: &str) -> Result<u32, AppRangeError> {
    let raw = raw.trim();
    let value: u32 = raw
        .parse()
        .map_err(|_| AppRangeError::NotANumber(raw.to_string()))?;
    if value == 0 {
        return Err(AppRangeError::Zero);
    }
    Ok(value)
}

fn check_max(value: u32, max: u32) -> Result<(), AppRangeError> {
    if value > max {
        return Err(AppRangeError::TooLarge { value, max });
    }
    Ok(())
}
