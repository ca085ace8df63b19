//! Paginated `/teams/*` API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ApiHttp, ClientError, ClientResult, DateRange, UsageDataSource, UsageEventsQuery,
    aggregate::{DailyUsageRow, aggregate_daily_usage, utc_day},
};
use crate::models::{DailyUsage, SpendingRecord, TeamMember, UsageEvent};

pub(crate) const MEMBERS_ENDPOINT: &str = "/teams/members";
pub(crate) const DAILY_USAGE_ENDPOINT: &str = "/teams/daily-usage-data";
pub(crate) const SPEND_ENDPOINT: &str = "/teams/spend";
pub(crate) const USAGE_EVENTS_ENDPOINT: &str = "/teams/filtered-usage-events";

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersResponse {
    #[serde(default)]
    team_members: Vec<WireMember>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    name: String,
    email: String,
    #[serde(default)]
    role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DailyUsageRequest {
    start_date: i64,
    end_date: i64,
}

#[derive(Debug, Deserialize)]
struct DailyUsageResponse {
    #[serde(default)]
    data: Vec<DailyUsageRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageRequest {
    page: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpendResponse {
    #[serde(default)]
    team_member_spend: Vec<WireSpend>,
    #[serde(default)]
    subscription_cycle_start: i64,
    #[serde(default)]
    total_pages: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSpend {
    email: String,
    #[serde(default)]
    spend_cents: u64,
    #[serde(default)]
    fast_premium_requests: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageEventsRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_date: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_date: Option<i64>,
    page: u32,
    page_size: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageEventsResponse {
    #[serde(default)]
    usage_events: Vec<WireUsageEvent>,
    #[serde(default)]
    pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsageEvent {
    timestamp: EpochMillis,
    #[serde(default)]
    model: String,
    #[serde(default)]
    kind_label: String,
    #[serde(default)]
    token_usage: Option<TokenUsage>,
    #[serde(default)]
    user_email: String,
}

/// Event timestamps arrive as a millisecond epoch, usually quoted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EpochMillis {
    Number(i64),
    Text(String),
}

impl EpochMillis {
    fn to_datetime(&self) -> Option<DateTime<Utc>> {
        let millis = match self {
            EpochMillis::Number(n) => *n,
            EpochMillis::Text(s) => s.trim().parse().ok()?,
        };
        DateTime::from_timestamp_millis(millis)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TokenUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_write_tokens: u64,
    cache_read_tokens: u64,
}

impl TokenUsage {
    fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_write_tokens)
            .saturating_add(self.cache_read_tokens)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the paginated `/teams/*` admin API.
pub struct TeamsApiClient {
    http: ApiHttp,
}

impl TeamsApiClient {
    pub fn new(http: ApiHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl UsageDataSource for TeamsApiClient {
    async fn list_team_members(&self) -> ClientResult<Vec<TeamMember>> {
        let response: MembersResponse = self.http.get_json(MEMBERS_ENDPOINT, &[]).await?;

        Ok(response
            .team_members
            .into_iter()
            .map(|m| TeamMember {
                name: m.name,
                email: m.email,
                role: m.role,
            })
            .collect())
    }

    async fn daily_usage(&self, range: DateRange) -> ClientResult<Vec<DailyUsage>> {
        let request = DailyUsageRequest {
            start_date: range.start_millis(),
            end_date: range.end_millis(),
        };
        let response: DailyUsageResponse =
            self.http.post_json(DAILY_USAGE_ENDPOINT, &request).await?;

        tracing::debug!(rows = response.data.len(), "Fetched raw daily usage rows");
        aggregate_daily_usage(&response.data)
    }

    async fn spending(&self, page_size: u32) -> ClientResult<Vec<SpendingRecord>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            let response: SpendResponse = self
                .http
                .post_json(SPEND_ENDPOINT, &PageRequest { page, page_size })
                .await?;

            let cycle_start = utc_day(response.subscription_cycle_start).ok_or_else(|| {
                ClientError::InvalidDate(format!(
                    "subscription cycle start {} is out of range",
                    response.subscription_cycle_start
                ))
            })?;

            records.extend(response.team_member_spend.into_iter().map(|s| SpendingRecord {
                member_email: s.email,
                spend_cents: s.spend_cents,
                premium_requests: s.fast_premium_requests,
                cycle_start,
            }));

            if page >= response.total_pages {
                break;
            }
            self.http.ensure_page_budget(SPEND_ENDPOINT, page)?;
            page += 1;
        }

        tracing::debug!(records = records.len(), pages = page, "Fetched spending");
        Ok(records)
    }

    async fn usage_events(&self, query: &UsageEventsQuery) -> ClientResult<Vec<UsageEvent>> {
        let mut events = Vec::new();
        let mut skipped = 0usize;
        let mut page = 1;

        loop {
            let request = UsageEventsRequest {
                email: query.user_email.as_deref(),
                start_date: query.range.map(|r| r.start_millis()),
                end_date: query.range.map(|r| r.end_millis()),
                page,
                page_size: query.page_size,
            };
            let response: UsageEventsResponse =
                self.http.post_json(USAGE_EVENTS_ENDPOINT, &request).await?;

            for event in response.usage_events {
                let Some(timestamp) = event.timestamp.to_datetime() else {
                    tracing::warn!(timestamp = ?event.timestamp, "Skipping usage event with unparsable timestamp");
                    skipped += 1;
                    continue;
                };
                events.push(UsageEvent {
                    kind: event.kind_label,
                    user_email: event.user_email,
                    tokens_consumed: event.token_usage.map_or(0, |t| t.total()),
                    model: event.model,
                    timestamp,
                });
            }

            if !response.pagination.has_next_page {
                break;
            }
            self.http.ensure_page_budget(USAGE_EVENTS_ENDPOINT, page)?;
            page += 1;
        }

        tracing::debug!(events = events.len(), skipped, pages = page, "Fetched usage events");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{body_partial_json, method, path},
    };

    use super::*;
    use crate::{
        client::test_support::{api_config, date},
        config::ApiVariant,
    };

    fn client(server: &MockServer) -> TeamsApiClient {
        TeamsApiClient::new(ApiHttp::new(&api_config(&server.uri(), ApiVariant::Teams)).unwrap())
    }

    fn client_with_max_pages(server: &MockServer, max_pages: u32) -> TeamsApiClient {
        let config = crate::config::ApiConfig {
            max_pages,
            ..api_config(&server.uri(), ApiVariant::Teams)
        };
        TeamsApiClient::new(ApiHttp::new(&config).unwrap())
    }

    async fn mount_spend_page(server: &MockServer, page: u32, total_pages: u32, emails: &[&str]) {
        let spend: Vec<_> = emails
            .iter()
            .map(|e| json!({"email": e, "spendCents": 100, "fastPremiumRequests": 2}))
            .collect();
        Mock::given(method("POST"))
            .and(path(SPEND_ENDPOINT))
            .and(body_partial_json(json!({"page": page})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teamMemberSpend": spend,
                "subscriptionCycleStart": 1_704_067_200_000_i64,
                "totalPages": total_pages,
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_list_team_members() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MEMBERS_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teamMembers": [
                    {"name": "Ada", "email": "ada@example.com", "role": "owner"},
                    {"name": "Linus", "email": "linus@example.com", "role": "free-owner"},
                ]
            })))
            .mount(&server)
            .await;

        let members = client(&server).list_team_members().await.unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[1].role, "free-owner");
    }

    #[tokio::test]
    async fn test_daily_usage_sends_inclusive_epoch_range() {
        let server = MockServer::start().await;
        let range = DateRange::new(date("2023-01-01"), date("2023-01-02")).unwrap();
        let day1 = 1_672_531_200_000_i64;

        Mock::given(method("POST"))
            .and(path(DAILY_USAGE_ENDPOINT))
            .and(body_partial_json(json!({
                "startDate": day1,
                "endDate": day1 + 2 * 86_400_000 - 1,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"date": day1, "totalAccepts": 5, "totalRejects": 1, "mostUsedModel": "gpt-4o"},
                    {"date": day1 + 3_600_000, "totalAccepts": 3, "totalRejects": 1},
                    {"date": day1 + 7_200_000, "totalAccepts": 0, "totalRejects": 2},
                    {"date": day1 + 86_400_000, "totalAccepts": 4, "totalRejects": 0},
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let usage = client(&server).daily_usage(range).await.unwrap();

        assert_eq!(usage.len(), 2);
        assert!((usage[0].suggestion_acceptance_rate - 8.0 / 12.0).abs() < 1e-9);
        assert_eq!(usage[0].most_used_model.as_deref(), Some("gpt-4o"));
        assert_eq!(usage[1].suggestion_acceptance_rate, 1.0);
    }

    #[tokio::test]
    async fn test_spending_follows_total_pages() {
        let server = MockServer::start().await;
        mount_spend_page(&server, 1, 3, &["a@example.com", "b@example.com"]).await;
        mount_spend_page(&server, 2, 3, &["c@example.com"]).await;
        mount_spend_page(&server, 3, 3, &["d@example.com"]).await;

        let records = client(&server).spending(2).await.unwrap();

        let emails: Vec<_> = records.iter().map(|r| r.member_email.as_str()).collect();
        assert_eq!(
            emails,
            ["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        );
        assert!(records.iter().all(|r| r.cycle_start == date("2024-01-01")));
        assert_eq!(records[0].premium_requests, 2);
    }

    #[tokio::test]
    async fn test_spending_single_page_when_total_pages_missing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SPEND_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teamMemberSpend": [{"email": "a@example.com", "spendCents": 12}],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = client(&server).spending(1000).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].spend_cents, 12);
    }

    #[tokio::test]
    async fn test_spending_page_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SPEND_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teamMemberSpend": [{"email": "a@example.com"}],
                "totalPages": 100,
            })))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_with_max_pages(&server, 2).spending(1).await.unwrap_err();
        assert!(matches!(err, ClientError::PageLimitExceeded { max_pages: 2, .. }));
    }

    #[tokio::test]
    async fn test_spending_failure_on_later_page_returns_no_records() {
        let server = MockServer::start().await;
        mount_spend_page(&server, 1, 2, &["a@example.com"]).await;
        Mock::given(method("POST"))
            .and(path(SPEND_ENDPOINT))
            .and(body_partial_json(json!({"page": 2})))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client(&server).spending(1).await.unwrap_err();
        assert!(matches!(err, ClientError::Status { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_usage_events_follow_has_next_page() {
        let server = MockServer::start().await;
        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();

        Mock::given(method("POST"))
            .and(path(USAGE_EVENTS_ENDPOINT))
            .and(body_partial_json(json!({
                "page": 1,
                "pageSize": 2,
                "email": "ada@example.com",
                "startDate": range.start_millis(),
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usageEvents": [
                    {
                        "timestamp": "1704103200000",
                        "model": "claude-3.5-sonnet",
                        "kindLabel": "Included in Business",
                        "userEmail": "ada@example.com",
                        "tokenUsage": {
                            "inputTokens": 100,
                            "outputTokens": 20,
                            "cacheWriteTokens": 3,
                            "cacheReadTokens": 4
                        }
                    },
                    {
                        "timestamp": "not-a-number",
                        "model": "gpt-4o",
                        "kindLabel": "Usage-based",
                        "userEmail": "ada@example.com"
                    }
                ],
                "pagination": {"hasNextPage": true}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(USAGE_EVENTS_ENDPOINT))
            .and(body_partial_json(json!({"page": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usageEvents": [
                    {
                        "timestamp": 1704189600000_i64,
                        "model": "gpt-4o",
                        "kindLabel": "Usage-based",
                        "userEmail": "ada@example.com"
                    }
                ],
                "pagination": {"hasNextPage": false}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = UsageEventsQuery {
            user_email: Some("ada@example.com".into()),
            page_size: 2,
            range: Some(range),
        };
        let events = client(&server).usage_events(&query).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tokens_consumed, 127);
        assert_eq!(events[0].kind, "Included in Business");
        assert_eq!(events[0].timestamp.to_rfc3339(), "2024-01-01T10:00:00+00:00");
        assert_eq!(events[1].tokens_consumed, 0);
        assert_eq!(events[1].model, "gpt-4o");
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage {
            input_tokens: u64::MAX,
            output_tokens: 1,
            cache_write_tokens: 0,
            cache_read_tokens: 7,
        };
        assert_eq!(usage.total(), u64::MAX);
    }

    #[tokio::test]
    async fn test_usage_events_page_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(USAGE_EVENTS_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usageEvents": [],
                "pagination": {"hasNextPage": true}
            })))
            .expect(3)
            .mount(&server)
            .await;

        let query = UsageEventsQuery {
            page_size: 10,
            ..Default::default()
        };
        let err = client_with_max_pages(&server, 3)
            .usage_events(&query)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::PageLimitExceeded { .. }));
    }
}
