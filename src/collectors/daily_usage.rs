use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{CollectorError, DomainCollector, LOOKBACK_DAYS, MetricDesc, Sample, log_source_error};
use crate::client::{DateRange, UsageDataSource};

/// Per-day coding activity over the lookback window.
pub struct DailyUsageCollector {
    source: Arc<dyn UsageDataSource>,
    lines_added: MetricDesc,
    lines_deleted: MetricDesc,
    acceptance_rate: MetricDesc,
    tabs_used: MetricDesc,
    composer_used: MetricDesc,
    chat_requests: MetricDesc,
    model_usage: MetricDesc,
    extension_usage: MetricDesc,
}

impl DailyUsageCollector {
    pub fn new(source: Arc<dyn UsageDataSource>, namespace: &str) -> Self {
        let desc = |suffix: &str, help: &'static str, labels: &'static [&'static str]| {
            MetricDesc::new(namespace, suffix, help, labels)
        };
        Self {
            source,
            lines_added: desc(
                "daily_lines_added_total",
                "Total lines of code added per day",
                &["date"],
            ),
            lines_deleted: desc(
                "daily_lines_deleted_total",
                "Total lines of code deleted per day",
                &["date"],
            ),
            acceptance_rate: desc(
                "daily_suggestion_acceptance_rate",
                "AI suggestion acceptance rate per day",
                &["date"],
            ),
            tabs_used: desc("daily_tabs_used_total", "Total tabs used per day", &["date"]),
            composer_used: desc(
                "daily_composer_used_total",
                "Total composer usage per day",
                &["date"],
            ),
            chat_requests: desc(
                "daily_chat_requests_total",
                "Total chat requests per day",
                &["date"],
            ),
            model_usage: desc(
                "daily_model_usage",
                "Most used model per day",
                &["date", "model"],
            ),
            extension_usage: desc(
                "daily_extension_usage",
                "Most used extension per day",
                &["date", "extension"],
            ),
        }
    }
}

#[async_trait]
impl DomainCollector for DailyUsageCollector {
    fn name(&self) -> &'static str {
        "daily_usage"
    }

    fn describe(&self) -> Vec<&MetricDesc> {
        vec![
            &self.lines_added,
            &self.lines_deleted,
            &self.acceptance_rate,
            &self.tabs_used,
            &self.composer_used,
            &self.chat_requests,
            &self.model_usage,
            &self.extension_usage,
        ]
    }

    async fn collect(&self) -> Result<Vec<Sample>, CollectorError> {
        let range = DateRange::lookback(Utc::now().date_naive(), LOOKBACK_DAYS);
        let usage = match self.source.daily_usage(range).await {
            Ok(usage) => usage,
            Err(e) => {
                log_source_error(self.name(), &e);
                return Ok(Vec::new());
            }
        };

        let mut samples = Vec::with_capacity(usage.len() * 8);
        for day in &usage {
            let date = day.date.to_string();
            let date = date.as_str();

            samples.push(self.lines_added.sample(day.lines_added as f64, &[date])?);
            samples.push(self.lines_deleted.sample(day.lines_deleted as f64, &[date])?);
            samples.push(
                self.acceptance_rate
                    .sample(day.suggestion_acceptance_rate, &[date])?,
            );
            samples.push(self.tabs_used.sample(day.tabs_used as f64, &[date])?);
            samples.push(self.composer_used.sample(day.composer_used as f64, &[date])?);
            samples.push(self.chat_requests.sample(day.chat_requests as f64, &[date])?);

            if let Some(model) = day.most_used_model.as_deref().filter(|m| !m.is_empty()) {
                samples.push(self.model_usage.sample(1.0, &[date, model])?);
            }
            if let Some(ext) = day.most_used_extension.as_deref().filter(|e| !e.is_empty()) {
                samples.push(self.extension_usage.sample(1.0, &[date, ext])?);
            }
        }
        Ok(samples)
    }
}
