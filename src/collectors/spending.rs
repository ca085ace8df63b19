use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    CollectorError, DomainCollector, MetricDesc, SPENDING_PAGE_SIZE, Sample, log_source_error,
};
use crate::client::UsageDataSource;

/// Per-member spend and premium requests for the current billing cycle.
pub struct SpendingCollector {
    source: Arc<dyn UsageDataSource>,
    total_spend: MetricDesc,
    spend_by_member: MetricDesc,
    total_premium: MetricDesc,
    premium_by_member: MetricDesc,
}

impl SpendingCollector {
    pub fn new(source: Arc<dyn UsageDataSource>, namespace: &str) -> Self {
        Self {
            source,
            total_spend: MetricDesc::new(
                namespace,
                "spending_total_cents",
                "Total spending in cents",
                &[],
            ),
            spend_by_member: MetricDesc::new(
                namespace,
                "spending_by_member_cents",
                "Spending by team member in cents",
                &["member_email", "date"],
            ),
            total_premium: MetricDesc::new(
                namespace,
                "premium_requests_total",
                "Total premium requests",
                &[],
            ),
            premium_by_member: MetricDesc::new(
                namespace,
                "premium_requests_by_member_total",
                "Premium requests by team member",
                &["member_email", "date"],
            ),
        }
    }
}

#[async_trait]
impl DomainCollector for SpendingCollector {
    fn name(&self) -> &'static str {
        "spending"
    }

    fn describe(&self) -> Vec<&MetricDesc> {
        vec![
            &self.total_spend,
            &self.spend_by_member,
            &self.total_premium,
            &self.premium_by_member,
        ]
    }

    async fn collect(&self) -> Result<Vec<Sample>, CollectorError> {
        let records = match self.source.spending(SPENDING_PAGE_SIZE).await {
            Ok(records) => records,
            Err(e) => {
                log_source_error(self.name(), &e);
                return Ok(Vec::new());
            }
        };

        // A member can show up on more than one page; their amounts add up.
        let mut by_member: BTreeMap<(&str, NaiveDate), (u64, u64)> = BTreeMap::new();
        let (mut total_spend, mut total_premium) = (0u64, 0u64);
        for record in &records {
            let entry = by_member
                .entry((record.member_email.as_str(), record.cycle_start))
                .or_default();
            entry.0 = entry.0.saturating_add(record.spend_cents);
            entry.1 = entry.1.saturating_add(record.premium_requests);
            total_spend = total_spend.saturating_add(record.spend_cents);
            total_premium = total_premium.saturating_add(record.premium_requests);
        }

        let mut samples = Vec::with_capacity(by_member.len() * 2 + 2);
        for ((email, date), (spend, premium)) in by_member {
            let date = date.to_string();
            samples.push(self.spend_by_member.sample(spend as f64, &[email, date.as_str()])?);
            samples.push(self.premium_by_member.sample(premium as f64, &[email, date.as_str()])?);
        }
        samples.push(self.total_spend.sample(total_spend as f64, &[])?);
        samples.push(self.total_premium.sample(total_premium as f64, &[])?);
        Ok(samples)
    }
}
