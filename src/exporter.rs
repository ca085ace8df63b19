//! Collection orchestration.
//!
//! One [`Exporter::scrape`] runs every domain collector in a fixed order, turns
//! each collector's samples into metric families, and appends the exporter's own
//! scrape duration and error count. A collector that faults is counted and
//! logged; its siblings still contribute to the same snapshot.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use futures::FutureExt;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
    proto::{self, LabelPair, MetricFamily, MetricType},
};

use crate::{
    client::{ClientError, UsageDataSource},
    collectors::{CollectorError, DomainCollector, MetricDesc, Sample, default_collectors},
    config::MetricsConfig,
};

/// Errors raised while wiring up the exporter.
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    #[error("failed to register exporter metrics: {0}")]
    Registry(#[from] prometheus::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// What one collector contributed to a scrape.
#[derive(Debug)]
pub enum CollectOutcome {
    Collected(Vec<MetricFamily>),
    Failed(String),
}

/// Owns the domain collectors and the self-observability metrics.
pub struct Exporter {
    collectors: Vec<Box<dyn DomainCollector>>,
    registry: Registry,
    scrape_duration: Histogram,
    scrape_errors: IntCounter,
}

impl Exporter {
    /// Build an exporter around `collectors`, registering the self metrics in
    /// `registry`.
    pub fn new(
        collectors: Vec<Box<dyn DomainCollector>>,
        metrics: &MetricsConfig,
        registry: &Registry,
    ) -> Result<Self, ExporterError> {
        let namespace = &metrics.namespace;

        let scrape_duration = Histogram::with_opts(
            HistogramOpts::new(
                format!("{namespace}_exporter_scrape_duration_seconds"),
                "Time spent scraping the admin API",
            )
            .buckets(metrics.scrape_duration_buckets.clone()),
        )?;
        let scrape_errors = IntCounter::new(
            format!("{namespace}_exporter_scrape_errors_total"),
            "Total number of collector failures during scrapes",
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(scrape_errors.clone()))?;

        Ok(Self {
            collectors,
            registry: registry.clone(),
            scrape_duration,
            scrape_errors,
        })
    }

    /// Exporter with the four domain collectors reading from `source`.
    pub fn with_source(
        source: Arc<dyn UsageDataSource>,
        metrics: &MetricsConfig,
        registry: &Registry,
    ) -> Result<Self, ExporterError> {
        let collectors = default_collectors(source, &metrics.namespace);
        Self::new(collectors, metrics, registry)
    }

    /// Every descriptor the domain collectors can emit, in scrape order.
    pub fn describe(&self) -> Vec<&MetricDesc> {
        self.collectors.iter().flat_map(|c| c.describe()).collect()
    }

    /// Run one full collection cycle.
    pub async fn scrape(&self) -> Snapshot {
        let start = Instant::now();
        tracing::debug!("Starting collection");

        let mut families = Vec::new();
        let mut failed = Vec::new();

        for collector in &self.collectors {
            match Self::collect_one(collector.as_ref()).await {
                CollectOutcome::Collected(mut collected) => families.append(&mut collected),
                CollectOutcome::Failed(reason) => {
                    tracing::error!(collector = collector.name(), reason = %reason, "Collector failed");
                    self.scrape_errors.inc();
                    failed.push(collector.name());
                }
            }
        }

        let elapsed = start.elapsed();
        self.scrape_duration.observe(elapsed.as_secs_f64());
        families.extend(self.registry.gather());

        tracing::debug!(
            duration_ms = elapsed.as_millis() as u64,
            failed = failed.len(),
            "Completed collection"
        );

        Snapshot { families, failed }
    }

    async fn collect_one(collector: &dyn DomainCollector) -> CollectOutcome {
        let started = Instant::now();
        // A panicking collector is a fault like any other; the scrape goes on.
        let collected = AssertUnwindSafe(collector.collect()).catch_unwind().await;
        let result = match collected {
            Ok(Ok(samples)) => render_families(&collector.describe(), &samples),
            Ok(Err(e)) => Err(e),
            Err(payload) => return CollectOutcome::Failed(panic_message(payload.as_ref())),
        };
        tracing::debug!(
            collector = collector.name(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Collector finished"
        );

        match result {
            Ok(families) => CollectOutcome::Collected(families),
            Err(e) => CollectOutcome::Failed(e.to_string()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown cause");
    format!("collector panicked: {detail}")
}

/// Group samples into gauge families, one per descriptor that has samples.
///
/// Families follow descriptor order and samples keep the order they were emitted in.
fn render_families(
    descs: &[&MetricDesc],
    samples: &[Sample],
) -> Result<Vec<MetricFamily>, CollectorError> {
    if let Some(stray) = samples.iter().find(|s| !descs.iter().any(|d| d.name == s.name)) {
        return Err(CollectorError::Metric(prometheus::Error::Msg(format!(
            "sample {} has no descriptor",
            stray.name
        ))));
    }

    let mut families = Vec::new();
    for desc in descs {
        let metrics: Vec<proto::Metric> = samples
            .iter()
            .filter(|s| s.name == desc.name)
            .map(gauge_metric)
            .collect();
        if metrics.is_empty() {
            continue;
        }

        let mut family = MetricFamily::default();
        family.set_name(desc.name.clone());
        family.set_help(desc.help.to_string());
        family.set_field_type(MetricType::GAUGE);
        family.set_metric(metrics.into());
        families.push(family);
    }
    Ok(families)
}

fn gauge_metric(sample: &Sample) -> proto::Metric {
    let labels: Vec<LabelPair> = sample
        .labels
        .iter()
        .map(|(name, value)| {
            let mut pair = LabelPair::default();
            pair.set_name(name.clone());
            pair.set_value(value.clone());
            pair
        })
        .collect();

    let mut gauge = proto::Gauge::default();
    gauge.set_value(sample.value);

    let mut metric = proto::Metric::default();
    metric.set_label(labels.into());
    metric.set_gauge(gauge);
    metric
}

/// The complete output of one scrape.
#[derive(Debug)]
pub struct Snapshot {
    families: Vec<MetricFamily>,
    failed: Vec<&'static str>,
}

impl Snapshot {
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// Names of the collectors that faulted during this scrape.
    pub fn failed(&self) -> &[&'static str] {
        &self.failed
    }

    /// Render in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn find(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.get_name() == name)
    }

    /// Value of the gauge or counter `name` with exactly these labels.
    pub fn value_of(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = self.find(name)?;
        family
            .get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == labels.len()
                    && pairs
                        .iter()
                        .zip(labels)
                        .all(|(p, (k, v))| p.get_name() == *k && p.get_value() == *v)
            })
            .map(|m| match family.get_field_type() {
                MetricType::COUNTER => m.get_counter().get_value(),
                _ => m.get_gauge().get_value(),
            })
    }
}
