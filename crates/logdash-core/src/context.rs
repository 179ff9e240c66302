//! Immutable request context.
//!
//! Every operation captures the selected source and filters once, when it
//! starts, and carries that value through to the response. A filter change
//! made while a request is in flight never changes how that request's
//! response is interpreted.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifier of a log source (the path the backend reads).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Inclusive date bounds applied by the analysis backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Build a range, rejecting a start that falls after the end.
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, String> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(format!("date range start {s} is after end {e}"));
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Source and filters captured at the moment an operation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub source: SourceId,
    pub filter_bots: bool,
    pub date_range: DateRange,
}

impl RequestContext {
    pub fn new(source: impl Into<SourceId>) -> Self {
        Self {
            source: source.into(),
            filter_bots: false,
            date_range: DateRange::unbounded(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<SourceId>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_filter_bots(mut self, filter_bots: bool) -> Self {
        self.filter_bots = filter_bots;
        self
    }

    #[must_use]
    pub fn with_date_range(mut self, date_range: DateRange) -> Self {
        self.date_range = date_range;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        match NaiveDate::from_ymd_opt(y, m, d) {
            Some(value) => value,
            None => panic!("invalid test date"),
        }
    }

    #[test]
    fn builder_sets_fields() {
        let range = DateRange::new(Some(date(2026, 1, 1)), Some(date(2026, 1, 31)));
        let range = match range {
            Ok(value) => value,
            Err(err) => panic!("range: {err}"),
        };
        let ctx = RequestContext::new("/var/log/nginx/access.log")
            .with_filter_bots(true)
            .with_date_range(range);
        assert_eq!(ctx.source.as_str(), "/var/log/nginx/access.log");
        assert!(ctx.filter_bots);
        assert_eq!(ctx.date_range.start, Some(date(2026, 1, 1)));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = DateRange::new(Some(date(2026, 2, 1)), Some(date(2026, 1, 1)));
        assert!(err.is_err());
    }

    #[test]
    fn open_ended_ranges_are_allowed() {
        assert!(DateRange::new(Some(date(2026, 2, 1)), None).is_ok());
        assert!(DateRange::new(None, Some(date(2026, 2, 1))).is_ok());
        assert!(DateRange::unbounded().is_unbounded());
    }

    #[test]
    fn with_source_keeps_filters() {
        let ctx = RequestContext::new("a.log")
            .with_filter_bots(true)
            .with_source("b.log");
        assert_eq!(ctx.source, SourceId::from("b.log"));
        assert!(ctx.filter_bots);
    }

    #[test]
    fn blank_source_is_empty() {
        assert!(SourceId::new("   ").is_empty());
        assert!(!SourceId::new("x.log").is_empty());
    }
}
