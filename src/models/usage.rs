use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Coding activity aggregated to one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub lines_added: u64,
    pub lines_deleted: u64,
    /// accepts / (accepts + rejects), 0 when there were no suggestions.
    pub suggestion_acceptance_rate: f64,
    pub tabs_used: u64,
    pub composer_used: u64,
    pub chat_requests: u64,
    pub most_used_model: Option<String>,
    pub most_used_extension: Option<String>,
}

/// A single granular usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Event kind label (e.g. "Included in Business", "Usage-based").
    pub kind: String,
    pub user_email: String,
    /// Input + output + cache-read + cache-write tokens.
    pub tokens_consumed: u64,
    pub model: String,
    pub timestamp: DateTime<Utc>,
}
