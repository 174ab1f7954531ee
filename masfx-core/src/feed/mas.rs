//! MAS datastore client.
//!
//! Fetches the daily exchange-rate resource from the MAS `search.json`
//! endpoint in a single request. No retry: a failed fetch fails the run.

use super::RateFeed;
use crate::config::FeedConfig;
use crate::domain::pair::{is_rate_column, DATE_COLUMN, TIMESTAMP_COLUMN};
use crate::domain::RawRateRecord;
use crate::error::EtlError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Datastore search response envelope.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default = "default_success")]
    success: bool,
    result: Option<SearchResult>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    records: Vec<Map<String, Value>>,
}

fn default_success() -> bool {
    true
}

/// Blocking HTTP client for the MAS exchange-rate resource.
pub struct MasFeedClient {
    client: reqwest::blocking::Client,
    config: FeedConfig,
}

impl MasFeedClient {
    pub fn new(config: FeedConfig) -> Result<Self, EtlError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("masfx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::FeedUnavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Query parameters for the search request.
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("resource_id", self.config.resource_id.clone())];
        if let Some(limit) = self.config.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

impl RateFeed for MasFeedClient {
    fn name(&self) -> &str {
        "mas_datastore"
    }

    fn fetch(&self) -> Result<Vec<RawRateRecord>, EtlError> {
        debug!(url = %self.config.base_url, resource_id = %self.config.resource_id, "fetching rate feed");

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&self.query())
            .send()
            .map_err(|e| EtlError::FeedUnavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(EtlError::FeedUnavailable(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .map_err(|e| EtlError::FeedUnavailable(format!("failed to read body: {e}")))?;
        let records = parse_response(&body)?;

        info!(records = records.len(), "fetched rate feed");
        Ok(records)
    }
}

/// Parse a datastore search response body into typed records.
pub fn parse_response(body: &str) -> Result<Vec<RawRateRecord>, EtlError> {
    let resp: SearchResponse = serde_json::from_str(body)
        .map_err(|e| EtlError::FeedUnavailable(format!("malformed response: {e}")))?;

    if !resp.success {
        let detail = resp
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error detail".into());
        return Err(EtlError::FeedUnavailable(format!(
            "datastore reported failure: {detail}"
        )));
    }

    let result = resp
        .result
        .ok_or_else(|| EtlError::FeedUnavailable("response has no result".into()))?;

    result
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            parse_record(record)
                .map_err(|e| EtlError::FeedUnavailable(format!("malformed record {i}: {e}")))
        })
        .collect()
}

fn parse_record(record: &Map<String, Value>) -> Result<RawRateRecord, String> {
    let end_of_day = record
        .get(DATE_COLUMN)
        .ok_or_else(|| format!("missing '{DATE_COLUMN}'"))
        .and_then(parse_date)?;
    let timestamp = record
        .get(TIMESTAMP_COLUMN)
        .ok_or_else(|| format!("missing '{TIMESTAMP_COLUMN}'"))
        .and_then(parse_timestamp)?;

    let mut parsed = RawRateRecord::new(end_of_day, timestamp);
    for (column, value) in record {
        if !is_rate_column(column) {
            continue;
        }
        let rate = parse_rate(value).map_err(|e| format!("column '{column}': {e}"))?;
        parsed.set_rate(column, rate);
    }
    Ok(parsed)
}

fn parse_date(value: &Value) -> Result<NaiveDate, String> {
    let raw = value
        .as_str()
        .ok_or_else(|| format!("'{DATE_COLUMN}' is not a string: {value}"))?
        .trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.date()))
        .map_err(|e| format!("invalid date '{raw}': {e}"))
}

fn parse_timestamp(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("'{TIMESTAMP_COLUMN}' is not an integer: {n}")),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("invalid timestamp '{s}': {e}")),
        other => Err(format!("'{TIMESTAMP_COLUMN}' has unexpected type: {other}")),
    }
}

/// Rates arrive as numbers or numeric strings; `null` and `""` are missing.
fn parse_rate(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("not representable as f64: {n}")),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|e| format!("invalid number '{s}': {e}")),
        other => Err(format!("unexpected type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "help": "search",
        "success": true,
        "result": {
            "resource_id": ["95932927-c8bc-4e7a-b484-68a66a24edfe"],
            "records": [
                {
                    "_id": 1,
                    "end_of_day": "2024-01-03",
                    "preliminary": "0",
                    "timestamp": "1704268800",
                    "usd_sgd": "1.3312",
                    "eur_sgd": "1.4561",
                    "jpy_sgd_100": "0.9310",
                    "krw_sgd_100": null
                },
                {
                    "end_of_day": "2024-01-02",
                    "timestamp": 1704182400,
                    "usd_sgd": 1.3290,
                    "eur_sgd": "",
                    "jpy_sgd_100": "0.9355"
                }
            ]
        }
    }"#;

    #[test]
    fn parses_records_and_skips_metadata() {
        let records = parse_response(SAMPLE).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.end_of_day, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(first.timestamp, 1_704_268_800);
        let columns: Vec<&str> = first.rates.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(columns, vec!["usd_sgd", "eur_sgd", "jpy_sgd_100", "krw_sgd_100"]);
        assert_eq!(first.rate("usd_sgd"), Some(1.3312));
        assert_eq!(first.rate("krw_sgd_100"), None);

        let second = &records[1];
        assert_eq!(second.timestamp, 1_704_182_400);
        assert_eq!(second.rate("usd_sgd"), Some(1.3290));
        assert_eq!(second.rate("eur_sgd"), None);
    }

    #[test]
    fn datastore_failure_is_feed_unavailable() {
        let body = r#"{"success": false, "error": {"message": "Not found"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, EtlError::FeedUnavailable(ref msg) if msg.contains("Not found")));
    }

    #[test]
    fn malformed_body_is_feed_unavailable() {
        assert!(matches!(
            parse_response("<html>502</html>"),
            Err(EtlError::FeedUnavailable(_))
        ));
        assert!(matches!(
            parse_response(r#"{"success": true}"#),
            Err(EtlError::FeedUnavailable(_))
        ));
    }

    #[test]
    fn non_numeric_rate_is_rejected() {
        let body = r#"{"result": {"records": [
            {"end_of_day": "2024-01-02", "timestamp": 1, "usd_sgd": "n/a"}
        ]}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(matches!(err, EtlError::FeedUnavailable(ref msg) if msg.contains("usd_sgd")));
    }

    #[test]
    fn missing_date_is_rejected() {
        let body = r#"{"result": {"records": [{"timestamp": 1, "usd_sgd": "1.3"}]}}"#;
        assert!(matches!(
            parse_response(body),
            Err(EtlError::FeedUnavailable(_))
        ));
    }

    #[test]
    fn query_sends_limit_only_when_configured() {
        let client = MasFeedClient::new(FeedConfig::default()).unwrap();
        assert_eq!(
            client.query(),
            vec![("resource_id", "95932927-c8bc-4e7a-b484-68a66a24edfe".to_string())]
        );

        let client = MasFeedClient::new(FeedConfig {
            limit: Some(1000),
            ..FeedConfig::default()
        })
        .unwrap();
        let query = client.query();
        assert_eq!(query.len(), 2);
        assert!(query.contains(&("limit", "1000".to_string())));
    }

    #[test]
    fn empty_record_list_parses() {
        let body = r#"{"success": true, "result": {"records": []}}"#;
        assert!(parse_response(body).unwrap().is_empty());
    }
}
