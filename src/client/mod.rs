//! Admin API data sources.
//!
//! The upstream exposes one logical API in two incompatible wire shapes. Both are
//! implemented behind [`UsageDataSource`], which only ever hands out the
//! normalized records from [`crate::models`]:
//!
//! - [`TeamsApiClient`]: paginated POST endpoints under `/teams/*`, millisecond
//!   epoch dates, raw daily rows that need day-bucket aggregation.
//! - [`LegacyApiClient`]: flat GET endpoints under `/admin/*` with limit/offset
//!   pagination.
//!
//! Every operation is a single logical call. However many pages it takes, it
//! either returns all records or an error, never a partial result.

mod aggregate;
mod legacy;
mod teams;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveDateTime};
use reqwest::{Client, RequestBuilder, header::CONTENT_TYPE};
use serde::{Serialize, de::DeserializeOwned};

pub use aggregate::{DailyUsageRow, acceptance_rate, aggregate_daily_usage, utc_day};
pub use legacy::LegacyApiClient;
pub use teams::TeamsApiClient;

use crate::{
    config::{ApiConfig, ApiVariant},
    models::{DailyUsage, SpendingRecord, TeamMember, UsageEvent},
};

/// Error type for admin API calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned status {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("{endpoint} did not reach its last page within {max_pages} pages")]
    PageLimitExceeded { endpoint: String, max_pages: u32 },
}

/// Result type for admin API calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> ClientResult<Self> {
        if start > end {
            return Err(ClientError::InvalidDate(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// The `days` days leading up to and including `end`.
    pub fn lookback(end: NaiveDate, days: u64) -> Self {
        let start = end.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// First millisecond of the start day, UTC.
    pub fn start_millis(&self) -> i64 {
        midnight_millis(self.start)
    }

    /// Last millisecond of the end day, UTC.
    pub fn end_millis(&self) -> i64 {
        midnight_millis(self.end) + MILLIS_PER_DAY - 1
    }
}

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

fn midnight_millis(date: NaiveDate) -> i64 {
    NaiveDateTime::from(date).and_utc().timestamp_millis()
}

/// Filters for a usage events fetch.
#[derive(Debug, Clone, Default)]
pub struct UsageEventsQuery {
    /// Only events for this user, when set.
    pub user_email: Option<String>,
    pub page_size: u32,
    pub range: Option<DateRange>,
}

/// A source of normalized usage records.
///
/// Implementations hold no mutable state between calls, so one instance can be
/// shared by concurrent scrapes.
#[async_trait]
pub trait UsageDataSource: Send + Sync {
    /// Full team roster.
    async fn list_team_members(&self) -> ClientResult<Vec<TeamMember>>;

    /// One record per calendar day in `range`, ascending by date.
    async fn daily_usage(&self, range: DateRange) -> ClientResult<Vec<DailyUsage>>;

    /// Per-member spend for the current billing cycle, all pages.
    async fn spending(&self, page_size: u32) -> ClientResult<Vec<SpendingRecord>>;

    /// Usage events matching `query`, all pages.
    async fn usage_events(&self, query: &UsageEventsQuery) -> ClientResult<Vec<UsageEvent>>;
}

/// Build the data source matching the configured wire variant.
pub fn build_data_source(config: &ApiConfig) -> ClientResult<Arc<dyn UsageDataSource>> {
    let http = ApiHttp::new(config)?;
    Ok(match config.variant {
        ApiVariant::Teams => Arc::new(TeamsApiClient::new(http)),
        ApiVariant::Legacy => Arc::new(LegacyApiClient::new(http)),
    })
}

/// HTTP plumbing shared by both wire variants.
#[derive(Clone)]
pub struct ApiHttp {
    client: Client,
    base_url: String,
    token: String,
    max_pages: u32,
}

impl ApiHttp {
    pub fn new(config: &ApiConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ClientError::Build)?;

        let base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            max_pages: config.max_pages,
        })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let url = format!("{}{endpoint}", self.base_url);
        self.execute(endpoint, self.client.get(url).query(query))
            .await
    }

    pub(crate) async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{endpoint}", self.base_url);
        self.execute(endpoint, self.client.post(url).json(body))
            .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> ClientResult<T> {
        let request_error = |source| ClientError::Request {
            endpoint: endpoint.to_string(),
            source,
        };

        let response = request
            .bearer_auth(&self.token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let body = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            tracing::debug!(endpoint, status = status.as_u16(), "Admin API call failed");
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ClientError::Decode {
            context: format!("{endpoint} response"),
            source,
        })
    }

    /// Fail once a paginated call has used up its page budget.
    pub(crate) fn ensure_page_budget(&self, endpoint: &str, pages_fetched: u32) -> ClientResult<()> {
        if pages_fetched >= self.max_pages {
            tracing::warn!(
                endpoint,
                max_pages = self.max_pages,
                "Upstream kept paginating past the page limit"
            );
            return Err(ClientError::PageLimitExceeded {
                endpoint: endpoint.to_string(),
                max_pages: self.max_pages,
            });
        }
        Ok(())
    }
}
