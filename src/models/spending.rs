use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Spend for a single member within one billing cycle.
///
/// Amounts are integer cents as returned by the API; no currency conversion is done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendingRecord {
    pub member_email: String,
    pub spend_cents: u64,
    pub premium_requests: u64,
    /// First day of the billing cycle the amounts belong to.
    pub cycle_start: NaiveDate,
}
