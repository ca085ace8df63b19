//! Domain collectors.
//!
//! Each collector owns the descriptors for one data source, calls exactly one
//! [`UsageDataSource`] operation per scrape and maps the returned records to
//! samples. A failing data source is logged and contributes no samples; only a
//! fault while building samples is reported back as a [`CollectorError`].

mod daily_usage;
mod spending;
mod team_members;
mod usage_events;

use std::sync::Arc;

use async_trait::async_trait;
pub use daily_usage::DailyUsageCollector;
pub use spending::SpendingCollector;
pub use team_members::TeamMembersCollector;
pub use usage_events::UsageEventsCollector;

use crate::client::{ClientError, UsageDataSource};

/// Days of history requested by the time-windowed collectors.
pub const LOOKBACK_DAYS: u64 = 30;

/// Page size for spending requests.
pub const SPENDING_PAGE_SIZE: u32 = 1000;

/// Page size for usage event requests.
pub const USAGE_EVENTS_PAGE_SIZE: u32 = 5000;

/// Static metadata for one metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    /// Fully qualified name, namespace included.
    pub name: String,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

impl MetricDesc {
    pub fn new(
        namespace: &str,
        suffix: &str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name: format!("{namespace}_{suffix}"),
            help,
            labels,
        }
    }

    /// Build a sample for this descriptor. `label_values` must line up with
    /// [`MetricDesc::labels`].
    pub fn sample(&self, value: f64, label_values: &[&str]) -> Result<Sample, CollectorError> {
        if label_values.len() != self.labels.len() {
            return Err(CollectorError::LabelMismatch {
                metric: self.name.clone(),
                expected: self.labels.len(),
                actual: label_values.len(),
            });
        }

        Ok(Sample {
            name: self.name.clone(),
            labels: self
                .labels
                .iter()
                .zip(label_values)
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        })
    }
}

/// One observation emitted during a scrape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

/// Faults raised while turning records into metrics.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("metric {metric} expects {expected} label values, got {actual}")]
    LabelMismatch {
        metric: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to build metric family: {0}")]
    Metric(#[from] prometheus::Error),
}

/// A source of metric samples for one upstream domain.
#[async_trait]
pub trait DomainCollector: Send + Sync {
    /// Stable identifier used in logs.
    fn name(&self) -> &'static str;

    /// Descriptors for every family this collector can emit. Never fails.
    fn describe(&self) -> Vec<&MetricDesc>;

    /// Fetch and convert one round of samples.
    async fn collect(&self) -> Result<Vec<Sample>, CollectorError>;
}

/// The four domain collectors in scrape order.
pub fn default_collectors(
    source: Arc<dyn UsageDataSource>,
    namespace: &str,
) -> Vec<Box<dyn DomainCollector>> {
    vec![
        Box::new(TeamMembersCollector::new(source.clone(), namespace)),
        Box::new(DailyUsageCollector::new(source.clone(), namespace)),
        Box::new(SpendingCollector::new(source.clone(), namespace)),
        Box::new(UsageEventsCollector::new(source, namespace)),
    ]
}

fn log_source_error(collector: &'static str, error: &ClientError) {
    tracing::error!(collector, error = %error, "Failed to fetch data for collector");
}
