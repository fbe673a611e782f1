//! Time handling utilities for acquisition timestamps and query intervals.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A time interval with optional bounds, used for catalog queries.
///
/// Either bound may be open; an interval with both bounds open matches
/// everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeInterval {
    /// Create a closed interval.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Create an interval open on both ends.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create an interval open towards the past.
    pub fn until(end: DateTime<Utc>) -> Self {
        Self {
            start: None,
            end: Some(end),
        }
    }

    /// Create an interval open towards the future.
    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Parse an interval string: "start/end", where either side may be
    /// ".." (or empty) for an open bound.
    ///
    /// Examples:
    /// - "2024-01-15T00:00:00Z/2024-01-16T00:00:00Z"
    /// - "2024-01-15/.."
    /// - "../2024-06-01T00:00:00Z"
    pub fn from_interval_string(s: &str) -> Result<Self, TimeParseError> {
        let (start, end) = s
            .split_once('/')
            .ok_or_else(|| TimeParseError::InvalidFormat(s.to_string()))?;

        let parse_bound = |part: &str| -> Result<Option<DateTime<Utc>>, TimeParseError> {
            if part.is_empty() || part == ".." {
                Ok(None)
            } else {
                parse_iso8601(part).map(Some)
            }
        };

        Ok(Self {
            start: parse_bound(start)?,
            end: parse_bound(end)?,
        })
    }

    /// Check whether both bounds are present and ordered.
    ///
    /// Open bounds are always considered ordered.
    pub fn is_ordered(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }

    /// Check whether an instant falls inside the interval (inclusive).
    pub fn contains(&self, dt: &DateTime<Utc>) -> bool {
        if let Some(start) = self.start {
            if dt < &start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if dt > &end {
                return false;
            }
        }
        true
    }
}

/// Parse an ISO 8601 timestamp, accepting a few common shortened forms.
pub fn parse_iso8601(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    // Full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Date only
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = nd.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(TimeParseError::InvalidFormat(s.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {0}")]
    InvalidFormat(String),
}
