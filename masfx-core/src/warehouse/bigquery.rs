//! BigQuery REST client.
//!
//! Two round-trips per run: a `jobs.query` for the watermark and a
//! resumable-upload load job for the new rows. Load jobs are always
//! `WRITE_APPEND`.

use super::auth::{ServiceAccountKey, TokenProvider};
use super::parquet::encode_rows;
use super::{Sink, WatermarkStore};
use crate::config::WarehouseConfig;
use crate::domain::FxRateRow;
use crate::error::EtlError;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
const UPLOAD_BASE: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    f: Vec<TableCell>,
}

#[derive(Debug, Deserialize)]
struct TableCell {
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    status: Option<JobStatus>,
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
}

/// Client for the destination table.
pub struct BigQueryClient {
    http: reqwest::blocking::Client,
    tokens: TokenProvider,
    config: WarehouseConfig,
}

impl BigQueryClient {
    /// Build a client for the configured table. No network call is made
    /// until the first query or load.
    pub fn connect(config: WarehouseConfig, key: ServiceAccountKey) -> Result<Self, EtlError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("masfx/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::Warehouse(format!("failed to build HTTP client: {e}")))?;
        let tokens = TokenProvider::new(key, http.clone())?;
        info!(
            table = %config.table_ref(),
            location = %config.location,
            client = %tokens.key().client_email,
            "connected to BigQuery"
        );
        Ok(Self {
            http,
            tokens,
            config,
        })
    }

    fn project_url(&self, base: &str, path: &str) -> String {
        format!("{base}/projects/{}/{path}", self.config.project_id)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.config.poll_interval_ms)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, EtlError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(self.tokens.access_token()?)
            .query(&[("location", self.config.location.as_str())])
            .send()
            .map_err(|e| EtlError::Warehouse(format!("GET {url}: {e}")))?;
        read_json(resp, url)
    }

    fn post_json<T: serde::de::DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, EtlError> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.tokens.access_token()?)
            .json(body)
            .send()
            .map_err(|e| EtlError::Warehouse(format!("POST {url}: {e}")))?;
        read_json(resp, url)
    }

    /// Block until a job reaches `DONE`, failing if it finished with an error.
    fn wait_for_job(&self, job_id: &str) -> Result<Job, EtlError> {
        let url = self.project_url(API_BASE, &format!("jobs/{job_id}"));
        loop {
            let job: Job = self.get_json(&url)?;
            if job_finished(&job)? {
                return Ok(job);
            }
            debug!(job_id, "job still running");
            std::thread::sleep(self.poll_interval());
        }
    }

    /// Start a resumable upload session for a load job and return its URL.
    fn start_upload(&self, job_id: &str, size: usize) -> Result<String, EtlError> {
        let url = self.project_url(UPLOAD_BASE, "jobs");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(self.tokens.access_token()?)
            .query(&[("uploadType", "resumable")])
            .header("X-Upload-Content-Type", "application/octet-stream")
            .header("X-Upload-Content-Length", size.to_string())
            .json(&load_job_body(&self.config, job_id))
            .send()
            .map_err(|e| EtlError::Warehouse(format!("POST {url}: {e}")))?;

        let resp = check_status(resp, &url)?;
        resp.headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| EtlError::Warehouse("upload session has no Location header".into()))
    }
}

impl WatermarkStore for BigQueryClient {
    fn latest_end_of_day(&self) -> Result<Option<NaiveDate>, EtlError> {
        let url = self.project_url(API_BASE, "queries");
        let body = json!({
            "query": watermark_sql(&self.config),
            "useLegacySql": false,
            "location": self.config.location,
        });

        let mut resp: QueryResponse = self.post_json(&url, &body)?;
        while !resp.job_complete {
            let job_id = resp
                .job_reference
                .as_ref()
                .map(|r| r.job_id.clone())
                .ok_or_else(|| EtlError::Warehouse("incomplete query has no job reference".into()))?;
            std::thread::sleep(self.poll_interval());
            resp = self.get_json(&self.project_url(API_BASE, &format!("queries/{job_id}")))?;
        }

        max_date_from_rows(&resp.rows)
    }
}

impl Sink for BigQueryClient {
    fn append(&self, rows: &[FxRateRow]) -> Result<usize, EtlError> {
        let payload = encode_rows(rows)?;
        let job_id = load_job_id(&payload, chrono::Utc::now());
        info!(
            job_id = %job_id,
            rows = rows.len(),
            bytes = payload.len(),
            table = %self.config.table_ref(),
            "starting load job"
        );

        let session = self.start_upload(&job_id, payload.len())?;
        let resp = self
            .http
            .put(&session)
            .bearer_auth(self.tokens.access_token()?)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(payload)
            .send()
            .map_err(|e| EtlError::Warehouse(format!("upload load payload: {e}")))?;
        check_status(resp, "upload session")?;

        let job = self.wait_for_job(&job_id)?;
        let written = loaded_row_count(&job).unwrap_or(rows.len());
        info!(job_id = %job_id, rows = written, "load job done");
        Ok(written)
    }
}

fn check_status(
    resp: reqwest::blocking::Response,
    what: &str,
) -> Result<reqwest::blocking::Response, EtlError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(EtlError::Warehouse(format!("{what}: HTTP {status}: {body}")))
}

fn read_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::blocking::Response,
    what: &str,
) -> Result<T, EtlError> {
    check_status(resp, what)?
        .json()
        .map_err(|e| EtlError::Warehouse(format!("{what}: malformed response: {e}")))
}

fn watermark_sql(config: &WarehouseConfig) -> String {
    format!("SELECT MAX(end_of_day) FROM `{}`", config.table_ref())
}

/// `{"f": [{"v": "2024-01-03"}]}` → that date; `null` or no rows → `None`.
fn max_date_from_rows(rows: &[TableRow]) -> Result<Option<NaiveDate>, EtlError> {
    let Some(cell) = rows.first().and_then(|r| r.f.first()) else {
        return Ok(None);
    };
    match &cell.v {
        Value::Null => Ok(None),
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| EtlError::Warehouse(format!("unexpected MAX(end_of_day) '{s}': {e}"))),
        other => Err(EtlError::Warehouse(format!(
            "unexpected MAX(end_of_day) value: {other}"
        ))),
    }
}

/// `masfx_{utc}_{blake3 prefix}`: unique per run, traceable to its payload.
fn load_job_id(payload: &[u8], now: chrono::DateTime<chrono::Utc>) -> String {
    let digest = blake3::hash(payload).to_hex();
    format!("masfx_{}_{}", now.format("%Y%m%dT%H%M%S"), &digest.as_str()[..12])
}

fn load_job_body(config: &WarehouseConfig, job_id: &str) -> Value {
    json!({
        "jobReference": {
            "projectId": config.project_id,
            "jobId": job_id,
            "location": config.location,
        },
        "configuration": {
            "load": {
                "destinationTable": {
                    "projectId": config.project_id,
                    "datasetId": config.dataset_id,
                    "tableId": config.table_id,
                },
                "sourceFormat": "PARQUET",
                "writeDisposition": "WRITE_APPEND",
                "createDisposition": "CREATE_IF_NEEDED",
                "schema": {
                    "fields": [
                        {"name": "end_of_day", "type": "DATE"},
                        {"name": "timestamp", "type": "INTEGER"},
                        {"name": "currency", "type": "STRING"},
                        {"name": "fx_rate", "type": "FLOAT"},
                    ]
                },
            }
        }
    })
}

/// `Ok(true)` once the job is `DONE` without an error result.
fn job_finished(job: &Job) -> Result<bool, EtlError> {
    let Some(status) = &job.status else {
        return Ok(false);
    };
    if status.state != "DONE" {
        return Ok(false);
    }
    match &status.error_result {
        Some(err) => Err(EtlError::Warehouse(format!(
            "load job failed ({}): {}",
            err.reason, err.message
        ))),
        None => Ok(true),
    }
}

fn loaded_row_count(job: &Job) -> Option<usize> {
    job.statistics
        .as_ref()?
        .load
        .as_ref()?
        .output_rows
        .as_ref()?
        .parse()
        .ok()
}
