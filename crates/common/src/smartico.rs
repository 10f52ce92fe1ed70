use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::SmarticoConfig;
use crate::types::AggregationPeriod;

pub const PROFILES_PATH: &str = "/api/af2_aff_op";
pub const REPORT_PATH: &str = "/api/af2_media_report_op";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Low-cardinality label for the `kind` dimension of error metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(e) if e.is_timeout() => "timeout",
            Self::Transport(_) => "transport",
            Self::Status { status, .. } if *status == 429 => "rate_limited",
            Self::Status { status, .. } if *status >= 500 => "http_5xx",
            Self::Status { .. } => "http_4xx",
            Self::Decode(_) => "decode",
        }
    }
}

/// `date_from` / `date_to` as received from the dashboard, forwarded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DateRange {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

impl DateRange {
    pub fn new(date_from: &str, date_to: &str) -> Self {
        Self {
            date_from: Some(date_from.to_string()),
            date_to: Some(date_to.to_string()),
        }
    }
}

/// Fixed parameters of a media/financial report request. Paging parameters
/// are added per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub aggregation_period: AggregationPeriod,
    pub group_by: String,
    pub filter_affiliate_id: Option<String>,
    pub range: DateRange,
    pub limit: Option<u32>,
}

impl ReportQuery {
    pub fn new(aggregation_period: AggregationPeriod, group_by: &str, range: &DateRange) -> Self {
        Self {
            aggregation_period,
            group_by: group_by.to_string(),
            filter_affiliate_id: None,
            range: range.clone(),
            limit: None,
        }
    }

    #[must_use]
    pub fn for_affiliate(mut self, affiliate_id: &str) -> Self {
        self.filter_affiliate_id = Some(affiliate_id.to_string());
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("aggregation_period", self.aggregation_period.as_str().to_string()),
            ("group_by", self.group_by.clone()),
        ];
        if let Some(id) = &self.filter_affiliate_id {
            params.push(("filter_affiliate_id", id.clone()));
        }
        if let Some(from) = &self.range.date_from {
            params.push(("date_from", from.clone()));
        }
        if let Some(to) = &self.range.date_to {
            params.push(("date_to", to.clone()));
        }
        if let Some(limit) = self.limit {
            params.push(("limit", limit.to_string()));
        }
        params
    }
}

pub trait ProfilesPager {
    /// Profiles in the index range `[start, start + limit]`.
    fn fetch_profiles_page(
        &self,
        start: u32,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Value>, UpstreamError>> + Send;
}

pub trait ReportPager {
    fn fetch_report_page(
        &self,
        query: &ReportQuery,
        limit: u32,
        offset: u32,
    ) -> impl Future<Output = Result<Vec<Value>, UpstreamError>> + Send;

    /// A single unpaged request; whatever the upstream returns for `query`.
    fn fetch_report_once(
        &self,
        query: &ReportQuery,
    ) -> impl Future<Output = Result<Vec<Value>, UpstreamError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    pub profiles_page_size: u32,
    pub report_page_size: u32,
    pub page_delay: Duration,
}

impl PageSettings {
    pub fn from_config(config: &SmarticoConfig) -> Self {
        Self {
            profiles_page_size: config.profiles_page_size,
            report_page_size: config.report_page_size,
            page_delay: config.page_delay(),
        }
    }
}

/// Every affiliate profile, range page by range page.
///
/// Stops on an empty or short page. A failed request ends the loop and the
/// profiles gathered so far are returned as if the listing had ended there.
pub async fn fetch_all_profiles<P: ProfilesPager + Sync>(
    pager: &P,
    settings: &PageSettings,
) -> Vec<Value> {
    let limit = settings.profiles_page_size;
    let mut profiles = Vec::new();
    let mut start = 0_u32;

    loop {
        let page = match pager.fetch_profiles_page(start, limit).await {
            Ok(page) => page,
            Err(e) => {
                warn!(start, error = %e, "profile listing aborted, keeping partial result");
                break;
            }
        };
        if page.is_empty() {
            break;
        }

        let page_len = page.len();
        profiles.extend(page);
        if page_len < limit as usize {
            break;
        }

        let Some(next) = next_cursor(start, limit) else {
            warn!(start, limit, "profile range cursor exhausted, stopping");
            break;
        };
        start = next;
        tokio::time::sleep(settings.page_delay).await;
    }

    debug!(count = profiles.len(), "fetched affiliate profiles");
    profiles
}

/// Every report row for `query`, offset page by offset page.
///
/// Besides empty and short pages, the loop also stops when a page leads with
/// the same row as the previous one: upstream has been seen serving the same
/// page for every offset past the end. That check is a heuristic and would
/// cut a listing short if two adjacent pages legitimately started with the
/// same affiliate and commission.
pub async fn fetch_all_report_rows<P: ReportPager + Sync>(
    pager: &P,
    query: &ReportQuery,
    settings: &PageSettings,
) -> Vec<Value> {
    let limit = settings.report_page_size;
    let mut rows = Vec::new();
    let mut offset = 0_u32;
    let mut last_signature: Option<PageSignature> = None;

    loop {
        let page = match pager.fetch_report_page(query, limit, offset).await {
            Ok(page) => page,
            Err(e) => {
                warn!(offset, error = %e, "report paging aborted, keeping partial result");
                break;
            }
        };
        let Some(first) = page.first() else {
            break;
        };

        let signature = PageSignature::of(first);
        if last_signature.as_ref() == Some(&signature) {
            debug!(offset, "report page repeats previous page, stopping");
            break;
        }
        last_signature = Some(signature);

        let page_len = page.len();
        rows.extend(page);
        if page_len < limit as usize {
            break;
        }

        let Some(next) = next_cursor(offset, limit) else {
            warn!(offset, limit, "report offset exhausted, stopping");
            break;
        };
        offset = next;
        tokio::time::sleep(settings.page_delay).await;
    }

    debug!(count = rows.len(), group_by = %query.group_by, "fetched report rows");
    rows
}

/// Position of the next page, or `None` once the cursor would leave `u32`.
fn next_cursor(cursor: u32, limit: u32) -> Option<u32> {
    cursor.checked_add(limit)
}

/// `range` parameter of the profile listing; the upper bound saturates.
fn profile_range(start: u32, limit: u32) -> String {
    format!("[{start},{}]", start.saturating_add(limit))
}

/// Leading-row fingerprint used to detect a re-served page.
///
/// An explicit `null` and a missing key read the same.
#[derive(Debug, Clone, PartialEq)]
struct PageSignature {
    affiliate_id: Option<Value>,
    commissions_total: Option<Value>,
}

impl PageSignature {
    fn of(row: &Value) -> Self {
        Self {
            affiliate_id: non_null(row, "affiliate_id"),
            commissions_total: non_null(row, "commissions_total"),
        }
    }
}

fn non_null(row: &Value, key: &str) -> Option<Value> {
    row.get(key).filter(|v| !v.is_null()).cloned()
}

/// HTTP client for the Smartico affiliate API.
pub struct SmarticoClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SmarticoClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn from_config(config: &SmarticoConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json(
        &self,
        endpoint: &'static str,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let start = Instant::now();
        let res = self.get_json_raw(path, params).await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("dashboard_upstream_latency_ms", "endpoint" => endpoint).record(ms);
        match &res {
            Ok(_) => {
                metrics::counter!("dashboard_upstream_requests_total", "endpoint" => endpoint, "status" => "ok").increment(1);
            }
            Err(e) => {
                metrics::counter!("dashboard_upstream_requests_total", "endpoint" => endpoint, "status" => "error").increment(1);
                metrics::counter!(
                    "dashboard_upstream_errors_total",
                    "endpoint" => endpoint,
                    "kind" => e.kind()
                )
                .increment(1);
            }
        }
        res
    }

    async fn get_json_raw(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, ?params, "upstream request");

        let mut req = self.client.get(&url).query(params);
        if let Some(key) = &self.api_key {
            req = req.header(reqwest::header::AUTHORIZATION, key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// The profile endpoint answers with a bare array; anything else is an empty page.
fn profile_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Array(rows) => rows,
        _ => Vec::new(),
    }
}

/// The report endpoint wraps its rows in `{ "data": [...] }`.
fn report_rows(body: Value) -> Vec<Value> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(rows)) => rows,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

impl ProfilesPager for SmarticoClient {
    async fn fetch_profiles_page(&self, start: u32, limit: u32) -> Result<Vec<Value>, UpstreamError> {
        let range = profile_range(start, limit);
        let body = self
            .get_json("profiles", PROFILES_PATH, &[("range", range)])
            .await?;
        Ok(profile_rows(body))
    }
}

impl ReportPager for SmarticoClient {
    async fn fetch_report_page(
        &self,
        query: &ReportQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Value>, UpstreamError> {
        let mut params = query.params();
        params.retain(|(k, _)| *k != "limit");
        params.push(("limit", limit.to_string()));
        params.push(("offset", offset.to_string()));
        let body = self.get_json("report", REPORT_PATH, &params).await?;
        Ok(report_rows(body))
    }

    async fn fetch_report_once(&self, query: &ReportQuery) -> Result<Vec<Value>, UpstreamError> {
        let body = self.get_json("report", REPORT_PATH, &query.params()).await?;
        Ok(report_rows(body))
    }
}
