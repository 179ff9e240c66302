//! HTTP transports for the dashboard backend and ipapi-style geolocation.
//!
//! Requests are JSON over `reqwest`. Non-2xx answers carry `{"error": ...}`
//! bodies, which are folded into [`BackendError::Backend`].

use async_trait::async_trait;
use chrono::NaiveDate;
use logdash_core::config::{BackendConfig, GeolocationConfig};
use logdash_core::context::{RequestContext, SourceId};
use logdash_core::summary::AnalysisSummary;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{BackendError, GeoError};
use crate::service::{DashboardBackend, GeoLocator};
use crate::types::{BrowseListing, GeoLocation, HistoryEntry, TailBatch, TailCursor};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    filepath: &'a str,
    filter_bots: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct TailRequest<'a> {
    filepath: &'a str,
    last_pos: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TailResponse {
    #[serde(default)]
    new_lines: Vec<String>,
    last_pos: u64,
}

#[derive(Debug, Serialize)]
struct HistoryRequest<'a> {
    filepath: &'a str,
    ip: &'a str,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    entries: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize)]
struct LookupRequest<'a> {
    ip: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Serialize)]
struct BrowseRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

fn transport(err: reqwest::Error) -> BackendError {
    BackendError::Transport {
        message: err.to_string(),
    }
}

/// Error for a non-2xx answer, using the `error` field when present.
fn error_from_body(status: u16, body: &[u8]) -> BackendError {
    let message = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                StatusCode::from_u16(status)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        }
    };
    BackendError::Backend { status, message }
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(|err| BackendError::InvalidResponse {
        message: err.to_string(),
    })
}

/// The backend reports lookup failures as placeholder hostnames.
fn normalize_hostname(ip: &str, hostname: Option<String>) -> Option<String> {
    let hostname = hostname?.trim().to_string();
    if hostname.is_empty()
        || hostname == ip
        || hostname.starts_with("Unknown")
        || hostname.starts_with("Error:")
    {
        return None;
    }
    Some(hostname)
}

fn parse_geo(client: &str, body: &[u8]) -> Result<GeoLocation, GeoError> {
    let parsed: GeoResponse = serde_json::from_slice(body).map_err(|err| GeoError::Lookup {
        reason: err.to_string(),
    })?;
    if parsed.error {
        return Err(GeoError::Lookup {
            reason: parsed.reason.unwrap_or_else(|| "unspecified".to_string()),
        });
    }
    match (parsed.country_name, parsed.country) {
        (Some(name), Some(code)) if !name.is_empty() && !code.is_empty() => {
            Ok(GeoLocation::new(name, code))
        }
        _ => Err(GeoError::NotFound {
            identifier: client.to_string(),
        }),
    }
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

// ---------------------------------------------------------------------------
// Dashboard backend
// ---------------------------------------------------------------------------

/// `DashboardBackend` over the dashboard's JSON API.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            client,
            base_url: trim_base(&config.base_url),
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        trace!(%url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(transport)?;
        if !status.is_success() {
            debug!(%url, status = status.as_u16(), "backend returned an error");
            return Err(error_from_body(status.as_u16(), &bytes));
        }
        decode(&bytes)
    }
}

fn require_source(source: &SourceId) -> Result<&str, BackendError> {
    if source.is_empty() {
        return Err(BackendError::InvalidArgument {
            message: "filepath is required".to_string(),
        });
    }
    Ok(source.as_str())
}

#[async_trait]
impl DashboardBackend for HttpBackend {
    async fn analyze(&self, context: &RequestContext) -> Result<AnalysisSummary, BackendError> {
        let request = AnalyzeRequest {
            filepath: require_source(&context.source)?,
            filter_bots: context.filter_bots,
            start_date: context.date_range.start,
            end_date: context.date_range.end,
        };
        self.post("/api/analyze", &request).await
    }

    async fn tail(
        &self,
        source: &SourceId,
        cursor: TailCursor,
    ) -> Result<TailBatch, BackendError> {
        let request = TailRequest {
            filepath: require_source(source)?,
            last_pos: cursor.to_wire(),
        };
        match self.post::<_, TailResponse>("/api/tail", &request).await {
            Ok(response) => Ok(TailBatch::new(response.last_pos, response.new_lines)),
            Err(BackendError::Backend { status: 416, .. }) => Err(BackendError::CursorOutOfRange {
                source_id: source.to_string(),
                cursor: cursor.offset().unwrap_or_default(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn client_history(
        &self,
        source: &SourceId,
        client: &str,
    ) -> Result<Vec<HistoryEntry>, BackendError> {
        let request = HistoryRequest {
            filepath: require_source(source)?,
            ip: client,
        };
        let response: HistoryResponse = self.post("/api/history", &request).await?;
        Ok(response.entries)
    }

    async fn reverse_lookup(&self, client: &str) -> Result<Option<String>, BackendError> {
        if client.is_empty() {
            return Err(BackendError::InvalidArgument {
                message: "ip is required".to_string(),
            });
        }
        let response: LookupResponse = self
            .post("/api/dns_lookup", &LookupRequest { ip: client })
            .await?;
        Ok(normalize_hostname(client, response.hostname))
    }

    async fn browse(&self, path: Option<&str>) -> Result<BrowseListing, BackendError> {
        self.post("/api/browse", &BrowseRequest { path }).await
    }
}

// ---------------------------------------------------------------------------
// Geolocation
// ---------------------------------------------------------------------------

/// `GeoLocator` for ipapi-style `GET {base}/{ip}/json/` services.
pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiLocator {
    pub fn new(config: &GeolocationConfig) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| GeoError::Transport {
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: trim_base(&config.base_url),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, client: &str) -> Result<GeoLocation, GeoError> {
        let url = format!("{}/{client}/json/", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| GeoError::Transport {
                message: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(GeoError::Http {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|err| GeoError::Transport {
            message: err.to_string(),
        })?;
        parse_geo(client, &bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn error_body_message_is_used() {
        let err = error_from_body(404, br#"{"error": "File not found"}"#);
        assert_eq!(
            err,
            BackendError::Backend {
                status: 404,
                message: "File not found".into()
            }
        );
    }

    #[test]
    fn error_without_json_falls_back_to_text_or_reason() {
        assert_eq!(
            error_from_body(502, b"bad gateway\n"),
            BackendError::Backend {
                status: 502,
                message: "bad gateway".into()
            }
        );
        assert_eq!(
            error_from_body(503, b""),
            BackendError::Backend {
                status: 503,
                message: "Service Unavailable".into()
            }
        );
    }

    #[test]
    fn decode_reports_invalid_shape() {
        let err = decode::<TailResponse>(br#"{"new_lines": []}"#).unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse { .. }));
    }

    #[test]
    fn tail_request_sends_null_for_end() {
        let request = TailRequest {
            filepath: "/var/log/nginx/access.log",
            last_pos: TailCursor::End.to_wire(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["last_pos"].is_null());

        let request = TailRequest {
            filepath: "/var/log/nginx/access.log",
            last_pos: TailCursor::Offset(1500).to_wire(),
        };
        assert_eq!(serde_json::to_value(&request).unwrap()["last_pos"], 1500);
    }

    #[test]
    fn analyze_request_omits_open_date_bounds() {
        let request = AnalyzeRequest {
            filepath: "a.log",
            filter_bots: true,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 2),
            end_date: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["start_date"], "2026-01-02");
        assert!(json.get("end_date").is_none());
        assert_eq!(json["filter_bots"], true);
    }

    #[test]
    fn placeholder_hostnames_mean_no_name() {
        assert_eq!(normalize_hostname("8.8.8.8", Some("dns.google".into())), Some("dns.google".into()));
        assert_eq!(normalize_hostname("8.8.8.8", Some("Unknown (Lookup Failed)".into())), None);
        assert_eq!(normalize_hostname("8.8.8.8", Some("Error: timed out".into())), None);
        assert_eq!(normalize_hostname("8.8.8.8", Some("8.8.8.8".into())), None);
        assert_eq!(normalize_hostname("8.8.8.8", None), None);
    }

    #[test]
    fn geo_payloads() {
        let ok = parse_geo("8.8.8.8", br#"{"country_name": "United States", "country": "US"}"#).unwrap();
        assert_eq!(ok, GeoLocation::new("United States", "us"));

        let err = parse_geo("8.8.8.8", br#"{"error": true, "reason": "RateLimited"}"#).unwrap_err();
        assert_eq!(
            err,
            GeoError::Lookup {
                reason: "RateLimited".into()
            }
        );

        let err = parse_geo("8.8.8.8", br#"{"ip": "8.8.8.8"}"#).unwrap_err();
        assert!(matches!(err, GeoError::NotFound { .. }));
    }

    #[test]
    fn base_urls_lose_trailing_slash() {
        assert_eq!(trim_base("https://ipapi.co/"), "https://ipapi.co");
    }
}
