use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    CollectorError, DomainCollector, LOOKBACK_DAYS, MetricDesc, Sample, USAGE_EVENTS_PAGE_SIZE,
    log_source_error,
};
use crate::{
    client::{DateRange, UsageDataSource, UsageEventsQuery},
    models::UsageEvent,
};

/// Event and token counts over the lookback window.
pub struct UsageEventsCollector {
    source: Arc<dyn UsageDataSource>,
    total_events: MetricDesc,
    events_by_type: MetricDesc,
    events_by_user: MetricDesc,
    events_by_model: MetricDesc,
    tokens_consumed: MetricDesc,
    tokens_by_model: MetricDesc,
    tokens_by_user: MetricDesc,
}

#[derive(Default)]
struct EventTotals<'a> {
    by_type: BTreeMap<&'a str, u64>,
    by_user: BTreeMap<&'a str, u64>,
    by_model: BTreeMap<&'a str, u64>,
    tokens_by_model: BTreeMap<&'a str, u64>,
    tokens_by_user: BTreeMap<&'a str, u64>,
    tokens: u64,
}

impl<'a> EventTotals<'a> {
    fn tally(events: &'a [UsageEvent]) -> Self {
        let mut totals = Self::default();
        for event in events {
            let (kind, user, model) = (
                event.kind.as_str(),
                event.user_email.as_str(),
                event.model.as_str(),
            );
            *totals.by_type.entry(kind).or_default() += 1;
            *totals.by_user.entry(user).or_default() += 1;
            *totals.by_model.entry(model).or_default() += 1;
            add_tokens(totals.tokens_by_model.entry(model).or_default(), event.tokens_consumed);
            add_tokens(totals.tokens_by_user.entry(user).or_default(), event.tokens_consumed);
            add_tokens(&mut totals.tokens, event.tokens_consumed);
        }
        totals
    }
}

/// Token sums pin at `u64::MAX` instead of wrapping.
fn add_tokens(sum: &mut u64, tokens: u64) {
    *sum = sum.saturating_add(tokens);
}

impl UsageEventsCollector {
    pub fn new(source: Arc<dyn UsageDataSource>, namespace: &str) -> Self {
        let desc = |suffix: &str, help: &'static str, labels: &'static [&'static str]| {
            MetricDesc::new(namespace, suffix, help, labels)
        };
        Self {
            source,
            total_events: desc("usage_events_total", "Total number of usage events", &[]),
            events_by_type: desc(
                "usage_events_by_type_total",
                "Number of usage events by type",
                &["event_type"],
            ),
            events_by_user: desc(
                "usage_events_by_user_total",
                "Number of usage events by user",
                &["user_email"],
            ),
            events_by_model: desc(
                "usage_events_by_model_total",
                "Number of usage events by model",
                &["model"],
            ),
            tokens_consumed: desc("tokens_consumed_total", "Total tokens consumed", &[]),
            tokens_by_model: desc(
                "tokens_consumed_by_model_total",
                "Tokens consumed by model",
                &["model"],
            ),
            tokens_by_user: desc(
                "tokens_consumed_by_user_total",
                "Tokens consumed by user",
                &["user_email"],
            ),
        }
    }

    fn labeled(
        desc: &MetricDesc,
        values: &BTreeMap<&str, u64>,
        samples: &mut Vec<Sample>,
    ) -> Result<(), CollectorError> {
        for (&label, &value) in values {
            samples.push(desc.sample(value as f64, &[label])?);
        }
        Ok(())
    }
}

#[async_trait]
impl DomainCollector for UsageEventsCollector {
    fn name(&self) -> &'static str {
        "usage_events"
    }

    fn describe(&self) -> Vec<&MetricDesc> {
        vec![
            &self.total_events,
            &self.events_by_type,
            &self.events_by_user,
            &self.events_by_model,
            &self.tokens_consumed,
            &self.tokens_by_model,
            &self.tokens_by_user,
        ]
    }

    async fn collect(&self) -> Result<Vec<Sample>, CollectorError> {
        let query = UsageEventsQuery {
            user_email: None,
            page_size: USAGE_EVENTS_PAGE_SIZE,
            range: Some(DateRange::lookback(Utc::now().date_naive(), LOOKBACK_DAYS)),
        };
        let events = match self.source.usage_events(&query).await {
            Ok(events) => events,
            Err(e) => {
                log_source_error(self.name(), &e);
                return Ok(Vec::new());
            }
        };

        let totals = EventTotals::tally(&events);

        let mut samples = Vec::new();
        samples.push(self.total_events.sample(events.len() as f64, &[])?);
        Self::labeled(&self.events_by_type, &totals.by_type, &mut samples)?;
        Self::labeled(&self.events_by_user, &totals.by_user, &mut samples)?;
        Self::labeled(&self.events_by_model, &totals.by_model, &mut samples)?;
        samples.push(self.tokens_consumed.sample(totals.tokens as f64, &[])?);
        Self::labeled(&self.tokens_by_model, &totals.tokens_by_model, &mut samples)?;
        Self::labeled(&self.tokens_by_user, &totals.tokens_by_user, &mut samples)?;
        Ok(samples)
    }
}
