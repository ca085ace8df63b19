//! Flat `/admin/*` API.
//!
//! Records come back already in their final shape, so this client only has to
//! walk limit/offset pages and tidy up the daily rows.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, de::DeserializeOwned};

use super::{ApiHttp, ClientResult, DateRange, UsageDataSource, UsageEventsQuery};
use crate::models::{DailyUsage, SpendingRecord, TeamMember, UsageEvent};

const MEMBERS_ENDPOINT: &str = "/admin/team/members";
const DAILY_USAGE_ENDPOINT: &str = "/admin/usage/daily";
const SPENDING_ENDPOINT: &str = "/admin/spending";
const USAGE_EVENTS_ENDPOINT: &str = "/admin/usage/events";

#[derive(Debug, Deserialize)]
struct MembersResponse {
    #[serde(default)]
    members: Vec<WireMember>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    name: String,
    email: String,
    #[serde(default)]
    role: String,
}

impl From<WireMember> for TeamMember {
    fn from(member: WireMember) -> Self {
        TeamMember {
            name: member.name,
            email: member.email,
            role: member.role,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DailyUsageResponse {
    #[serde(default)]
    usage: Vec<WireDailyUsage>,
}

#[derive(Debug, Deserialize)]
struct WireDailyUsage {
    date: NaiveDate,
    #[serde(default)]
    lines_added: u64,
    #[serde(default)]
    lines_deleted: u64,
    #[serde(default)]
    suggestion_acceptance_rate: f64,
    #[serde(default)]
    tabs_used: u64,
    #[serde(default)]
    composer_used: u64,
    #[serde(default)]
    chat_requests: u64,
    #[serde(default)]
    most_used_model: Option<String>,
    #[serde(default)]
    most_used_extension: Option<String>,
}

impl From<WireDailyUsage> for DailyUsage {
    fn from(row: WireDailyUsage) -> Self {
        DailyUsage {
            date: row.date,
            lines_added: row.lines_added,
            lines_deleted: row.lines_deleted,
            suggestion_acceptance_rate: row.suggestion_acceptance_rate,
            tabs_used: row.tabs_used,
            composer_used: row.composer_used,
            chat_requests: row.chat_requests,
            most_used_model: row.most_used_model.filter(|m| !m.is_empty()),
            most_used_extension: row.most_used_extension.filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpendingResponse {
    #[serde(default)]
    spending: Vec<WireSpending>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct WireSpending {
    member_email: String,
    #[serde(default)]
    spend_cents: u64,
    #[serde(default)]
    premium_requests: u64,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<WireEvent>,
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    user_email: String,
    #[serde(default)]
    tokens_consumed: u64,
    #[serde(default)]
    model: String,
    timestamp: DateTime<Utc>,
}

/// One limit/offset page: its records and the server's total record count.
trait OffsetPage: DeserializeOwned {
    type Item;

    fn into_parts(self) -> (Vec<Self::Item>, u64);
}

impl OffsetPage for SpendingResponse {
    type Item = WireSpending;

    fn into_parts(self) -> (Vec<WireSpending>, u64) {
        (self.spending, self.total)
    }
}

impl OffsetPage for EventsResponse {
    type Item = WireEvent;

    fn into_parts(self) -> (Vec<WireEvent>, u64) {
        (self.events, self.total)
    }
}

/// Client for the flat `/admin/*` admin API.
pub struct LegacyApiClient {
    http: ApiHttp,
}

impl LegacyApiClient {
    pub fn new(http: ApiHttp) -> Self {
        Self { http }
    }

    /// Request pages until the accumulated count reaches `total` or a page is empty.
    async fn fetch_all<P: OffsetPage>(
        &self,
        endpoint: &str,
        filters: &[(&str, String)],
        page_size: u32,
    ) -> ClientResult<Vec<P::Item>> {
        let mut items = Vec::new();
        let mut pages = 0u32;

        loop {
            let mut query = filters.to_vec();
            query.push(("limit", page_size.to_string()));
            query.push(("offset", items.len().to_string()));

            let page: P = self.http.get_json(endpoint, &query).await?;
            pages += 1;

            let (batch, total) = page.into_parts();
            let empty = batch.is_empty();
            items.extend(batch);

            if empty || items.len() as u64 >= total {
                break;
            }
            self.http.ensure_page_budget(endpoint, pages)?;
        }

        tracing::debug!(endpoint, items = items.len(), pages, "Fetched paginated records");
        Ok(items)
    }
}

#[async_trait]
impl UsageDataSource for LegacyApiClient {
    async fn list_team_members(&self) -> ClientResult<Vec<TeamMember>> {
        let response: MembersResponse = self.http.get_json(MEMBERS_ENDPOINT, &[]).await?;
        Ok(response.members.into_iter().map(TeamMember::from).collect())
    }

    async fn daily_usage(&self, range: DateRange) -> ClientResult<Vec<DailyUsage>> {
        let query = [
            ("start_date", range.start.to_string()),
            ("end_date", range.end.to_string()),
        ];
        let response: DailyUsageResponse = self.http.get_json(DAILY_USAGE_ENDPOINT, &query).await?;

        let mut usage: Vec<DailyUsage> = response.usage.into_iter().map(Into::into).collect();
        usage.sort_by_key(|u| u.date);

        let before = usage.len();
        usage.dedup_by_key(|u| u.date);
        if usage.len() != before {
            tracing::warn!(
                dropped = before - usage.len(),
                "Daily usage contained duplicate dates; kept the first row for each"
            );
        }

        Ok(usage)
    }

    async fn spending(&self, page_size: u32) -> ClientResult<Vec<SpendingRecord>> {
        let rows = self
            .fetch_all::<SpendingResponse>(SPENDING_ENDPOINT, &[], page_size)
            .await?;

        Ok(rows
            .into_iter()
            .map(|s| SpendingRecord {
                member_email: s.member_email,
                spend_cents: s.spend_cents,
                premium_requests: s.premium_requests,
                cycle_start: s.date,
            })
            .collect())
    }

    async fn usage_events(&self, query: &UsageEventsQuery) -> ClientResult<Vec<UsageEvent>> {
        let mut filters = Vec::new();
        if let Some(email) = &query.user_email {
            filters.push(("user_email", email.clone()));
        }
        if let Some(range) = query.range {
            filters.push(("start_date", range.start.to_string()));
            filters.push(("end_date", range.end.to_string()));
        }

        let rows = self
            .fetch_all::<EventsResponse>(USAGE_EVENTS_ENDPOINT, &filters, query.page_size)
            .await?;

        Ok(rows
            .into_iter()
            .map(|e| UsageEvent {
                kind: e.event_type,
                user_email: e.user_email,
                tokens_consumed: e.tokens_consumed,
                model: e.model,
                timestamp: e.timestamp,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use super::*;
    use crate::{
        client::{
            ClientError,
            test_support::{api_config, date},
        },
        config::{ApiConfig, ApiVariant},
    };

    fn client(server: &MockServer) -> LegacyApiClient {
        LegacyApiClient::new(ApiHttp::new(&api_config(&server.uri(), ApiVariant::Legacy)).unwrap())
    }

    #[tokio::test]
    async fn test_list_team_members() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MEMBERS_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "members": [{"name": "Ada", "email": "ada@example.com", "role": "admin"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let members = client(&server).list_team_members().await.unwrap();
        assert_eq!(members[0].email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_team_member_without_name_or_role() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(MEMBERS_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "members": [
                    {"email": "ada@example.com"},
                    {"name": "Linus", "email": "linus@example.com", "role": "member"}
                ]
            })))
            .mount(&server)
            .await;

        let members = client(&server).list_team_members().await.unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name, "");
        assert_eq!(members[0].role, "");
        assert_eq!(members[1].role, "member");
    }

    #[tokio::test]
    async fn test_daily_usage_sorted_and_deduplicated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DAILY_USAGE_ENDPOINT))
            .and(query_param("start_date", "2024-01-01"))
            .and(query_param("end_date", "2024-01-31"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "usage": [
                    {"date": "2024-01-02", "lines_added": 5, "suggestion_acceptance_rate": 0.5},
                    {"date": "2024-01-01", "lines_added": 1, "most_used_model": ""},
                    {"date": "2024-01-02", "lines_added": 99},
                ]
            })))
            .mount(&server)
            .await;

        let range = DateRange::new(date("2024-01-01"), date("2024-01-31")).unwrap();
        let usage = client(&server).daily_usage(range).await.unwrap();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].date, date("2024-01-01"));
        assert_eq!(usage[0].most_used_model, None);
        assert_eq!(usage[1].lines_added, 5);
        assert_eq!(usage[1].suggestion_acceptance_rate, 0.5);
    }

    #[tokio::test]
    async fn test_spending_walks_offsets_until_total() {
        let server = MockServer::start().await;
        for (offset, email) in [("0", "a@example.com"), ("1", "b@example.com")] {
            Mock::given(method("GET"))
                .and(path(SPENDING_ENDPOINT))
                .and(query_param("limit", "1"))
                .and(query_param("offset", offset))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "spending": [{
                        "member_email": email,
                        "spend_cents": 250,
                        "premium_requests": 3,
                        "date": "2024-02-01"
                    }],
                    "total": 2
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let records = client(&server).spending(1).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].member_email, "b@example.com");
        assert_eq!(records[1].cycle_start, date("2024-02-01"));
    }

    #[tokio::test]
    async fn test_usage_events_stop_on_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(USAGE_EVENTS_ENDPOINT))
            .and(query_param("offset", "0"))
            .and(query_param("user_email", "ada@example.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [{
                    "event_type": "chat",
                    "user_email": "ada@example.com",
                    "tokens_consumed": 42,
                    "model": "gpt-4o",
                    "timestamp": "2024-01-01T10:00:00Z"
                }],
                "total": 10
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(USAGE_EVENTS_ENDPOINT))
            .and(query_param("offset", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [],
                "total": 10
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = UsageEventsQuery {
            user_email: Some("ada@example.com".into()),
            page_size: 1,
            range: None,
        };
        let events = client(&server).usage_events(&query).await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "chat");
        assert_eq!(events[0].tokens_consumed, 42);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(SPENDING_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "spending": [{"member_email": "a@example.com", "date": "2024-02-01"}],
                "total": 1_000_000
            })))
            .expect(2)
            .mount(&server)
            .await;

        let config = ApiConfig {
            max_pages: 2,
            ..api_config(&server.uri(), ApiVariant::Legacy)
        };
        let err = LegacyApiClient::new(ApiHttp::new(&config).unwrap())
            .spending(1)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::PageLimitExceeded { .. }));
    }
}
