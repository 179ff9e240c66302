//! Transport-agnostic payload types.
//!
//! These are the values that cross the service traits, decoupled from the
//! JSON shapes the HTTP transport speaks.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Read position in a growing log source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TailCursor {
    /// Whatever the end of the source is when the backend handles the request.
    End,
    /// Byte offset already consumed.
    Offset(u64),
}

impl TailCursor {
    /// Wire form: `None` asks the backend to start at its current end.
    pub fn to_wire(self) -> Option<u64> {
        match self {
            Self::End => None,
            Self::Offset(offset) => Some(offset),
        }
    }

    pub fn offset(self) -> Option<u64> {
        self.to_wire()
    }
}

impl fmt::Display for TailCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::End => f.write_str("end"),
            Self::Offset(offset) => write!(f, "{offset}"),
        }
    }
}

/// Result of one tail request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailBatch {
    /// Cursor to send on the next poll.
    pub next_cursor: u64,
    /// New raw lines, oldest first.
    pub lines: Vec<String>,
}

impl TailBatch {
    pub fn new(next_cursor: u64, lines: Vec<String>) -> Self {
        Self { next_cursor, lines }
    }

    pub fn empty(next_cursor: u64) -> Self {
        Self::new(next_cursor, Vec::new())
    }
}

/// One request made by a client, from the per-client history lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: String,
    pub request: String,
    pub status: u16,
    #[serde(default)]
    pub referer: String,
}

/// Country a public client address geolocates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoLocation {
    pub country_name: String,
    /// ISO 3166-1 alpha-2, lower-cased.
    pub country_code: String,
}

impl GeoLocation {
    pub fn new(country_name: impl Into<String>, country_code: impl Into<String>) -> Self {
        Self {
            country_name: country_name.into(),
            country_code: country_code.into().to_ascii_lowercase(),
        }
    }
}

/// Directory entry returned by source selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    pub name: String,
    pub is_dir: bool,
    pub path: String,
}

/// Directory listing returned by source selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseListing {
    pub current_path: String,
    #[serde(default)]
    pub parent_path: String,
    #[serde(default)]
    pub items: Vec<BrowseItem>,
}

impl BrowseListing {
    /// Directories first, then files, each case-insensitively by name.
    pub fn sort_items(&mut self) {
        self.items.sort_by_key(|item| (!item.is_dir, item.name.to_lowercase()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wire_form() {
        assert_eq!(TailCursor::End.to_wire(), None);
        assert_eq!(TailCursor::Offset(1500).to_wire(), Some(1500));
        assert_eq!(TailCursor::Offset(7).to_string(), "7");
        assert_eq!(TailCursor::End.to_string(), "end");
    }

    #[test]
    fn geolocation_lowercases_code() {
        assert_eq!(GeoLocation::new("Japan", "JP").country_code, "jp");
    }

    #[test]
    fn browse_sorts_directories_first() {
        let item = |name: &str, is_dir: bool| BrowseItem {
            name: name.into(),
            is_dir,
            path: format!("/logs/{name}"),
        };
        let mut listing = BrowseListing {
            current_path: "/logs".into(),
            parent_path: "/".into(),
            items: vec![item("b.log", false), item("Zeta", true), item("A.log", false), item("archive", true)],
        };
        listing.sort_items();
        let names: Vec<_> = listing.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["archive", "Zeta", "A.log", "b.log"]);
    }
}
