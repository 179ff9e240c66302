//! Aggregate summary contract.
//!
//! This is the document the analysis backend returns for one source. The
//! client never computes it; it only replaces its copy wholesale and reads
//! a few derived figures from it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(value, count)` pair from one of the ranked top lists.
///
/// Serialized as a two-element array, matching the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry(pub String, pub u64);

impl RankedEntry {
    pub fn new(value: impl Into<String>, count: u64) -> Self {
        Self(value.into(), count)
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn count(&self) -> u64 {
        self.1
    }
}

/// Severity attached to a detected threat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    #[serde(other)]
    Unknown,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One suspicious request flagged by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatRecord {
    #[serde(default)]
    pub time: String,
    #[serde(rename = "ip")]
    pub client: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub risk: RiskLevel,
    #[serde(default)]
    pub evidence: String,
}

/// Security section of the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuritySummary {
    pub total_threats: u64,
    #[serde(default)]
    pub stats: BTreeMap<String, u64>,
    #[serde(default)]
    pub top_threats: Vec<ThreatRecord>,
}

/// Aggregate statistics for one log source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_requests: u64,
    #[serde(rename = "unique_users")]
    pub unique_clients: u64,
    pub total_bytes: u64,
    #[serde(default)]
    pub status_codes: BTreeMap<String, u64>,
    #[serde(default)]
    pub hourly_stats: BTreeMap<String, u64>,
    #[serde(default, rename = "top_ips")]
    pub top_clients: Vec<RankedEntry>,
    #[serde(default)]
    pub top_paths: Vec<RankedEntry>,
    #[serde(default)]
    pub top_user_agents: Vec<RankedEntry>,
    #[serde(default)]
    pub top_referers: Vec<RankedEntry>,
    #[serde(default)]
    pub security: Option<SecuritySummary>,
}

impl AnalysisSummary {
    /// Requests answered with a 4xx or 5xx status.
    pub fn error_count(&self) -> u64 {
        self.status_codes
            .iter()
            .filter(|(code, _)| code.trim().parse::<u16>().is_ok_and(|c| c >= 400))
            .map(|(_, count)| *count)
            .sum()
    }

    /// Error share in percent, `0.0` for an empty summary.
    pub fn error_rate_percent(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.error_count() as f64 / self.total_requests as f64 * 100.0
    }

    pub fn transfer(&self) -> TransferSize {
        TransferSize(self.total_bytes)
    }

    /// Ranked client identifiers in display order.
    pub fn client_identifiers(&self) -> impl Iterator<Item = &str> {
        self.top_clients.iter().map(RankedEntry::value)
    }

    pub fn threat_total(&self) -> u64 {
        self.security.as_ref().map_or(0, |s| s.total_threats)
    }
}

/// Byte count rendered as MB, or GB once it exceeds one gigabyte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSize(pub u64);

impl fmt::Display for TransferSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const MB: f64 = 1024.0 * 1024.0;
        const GB: f64 = MB * 1024.0;
        let bytes = self.0 as f64;
        if bytes > GB {
            write!(f, "{:.2} GB", bytes / GB)
        } else {
            write!(f, "{:.2} MB", bytes / MB)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "total_requests": 200,
        "unique_users": 3,
        "total_bytes": 1048576,
        "status_codes": {"200": 150, "404": 30, "500": 20},
        "hourly_stats": {"13": 120, "14": 80},
        "top_ips": [["203.0.113.9", 120], ["192.168.1.4", 60], ["198.51.100.2", 20]],
        "top_paths": [["/", 100]],
        "top_user_agents": [["curl/8.0", 10]],
        "top_referers": [["-", 200]],
        "security": {
            "total_threats": 1,
            "stats": {"SQL Injection": 1},
            "top_threats": [{
                "time": "21/Jan/2026:13:14:04 +0900",
                "ip": "203.0.113.9",
                "type": "SQL Injection",
                "evidence": "GET /?q=union select",
                "risk": "High"
            }]
        }
    }"#;

    fn sample() -> AnalysisSummary {
        match serde_json::from_str(SAMPLE) {
            Ok(summary) => summary,
            Err(err) => panic!("parse sample: {err}"),
        }
    }

    #[test]
    fn parses_backend_document() {
        let summary = sample();
        assert_eq!(summary.total_requests, 200);
        assert_eq!(summary.unique_clients, 3);
        assert_eq!(summary.top_clients[0], RankedEntry::new("203.0.113.9", 120));
        assert_eq!(
            summary.client_identifiers().collect::<Vec<_>>(),
            vec!["203.0.113.9", "192.168.1.4", "198.51.100.2"]
        );
        let security = summary.security.as_ref();
        assert_eq!(security.map(|s| s.top_threats[0].risk), Some(RiskLevel::High));
        assert_eq!(summary.threat_total(), 1);
    }

    #[test]
    fn error_rate_counts_4xx_and_5xx() {
        let summary = sample();
        assert_eq!(summary.error_count(), 50);
        assert!((summary.error_rate_percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_summary_has_zero_error_rate() {
        assert_eq!(AnalysisSummary::default().error_rate_percent(), 0.0);
    }

    #[test]
    fn missing_optional_sections_default() {
        let summary: AnalysisSummary = match serde_json::from_str(
            r#"{"total_requests": 0, "unique_users": 0, "total_bytes": 0}"#,
        ) {
            Ok(value) => value,
            Err(err) => panic!("parse: {err}"),
        };
        assert!(summary.top_clients.is_empty());
        assert!(summary.security.is_none());
    }

    #[test]
    fn unknown_risk_level_is_tolerated() {
        let record: ThreatRecord = match serde_json::from_str(
            r#"{"ip": "1.2.3.4", "type": "Odd", "risk": "Critical"}"#,
        ) {
            Ok(value) => value,
            Err(err) => panic!("parse: {err}"),
        };
        assert_eq!(record.risk, RiskLevel::Unknown);
    }

    #[test]
    fn transfer_size_switches_units() {
        assert_eq!(TransferSize(1024 * 1024).to_string(), "1.00 MB");
        assert_eq!(TransferSize(3 * 1024 * 1024 * 1024).to_string(), "3.00 GB");
    }
}
