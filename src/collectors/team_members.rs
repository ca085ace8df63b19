use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;

use super::{CollectorError, DomainCollector, MetricDesc, Sample, log_source_error};
use crate::client::UsageDataSource;

/// Team roster size, in total and per role.
pub struct TeamMembersCollector {
    source: Arc<dyn UsageDataSource>,
    total: MetricDesc,
    by_role: MetricDesc,
}

impl TeamMembersCollector {
    pub fn new(source: Arc<dyn UsageDataSource>, namespace: &str) -> Self {
        Self {
            source,
            total: MetricDesc::new(
                namespace,
                "team_members_total",
                "Total number of team members",
                &[],
            ),
            by_role: MetricDesc::new(
                namespace,
                "team_members_by_role",
                "Number of team members by role",
                &["role"],
            ),
        }
    }
}

#[async_trait]
impl DomainCollector for TeamMembersCollector {
    fn name(&self) -> &'static str {
        "team_members"
    }

    fn describe(&self) -> Vec<&MetricDesc> {
        vec![&self.total, &self.by_role]
    }

    async fn collect(&self) -> Result<Vec<Sample>, CollectorError> {
        let members = match self.source.list_team_members().await {
            Ok(members) => members,
            Err(e) => {
                log_source_error(self.name(), &e);
                return Ok(Vec::new());
            }
        };

        let mut seen = HashSet::new();
        let mut by_role: BTreeMap<&str, u64> = BTreeMap::new();
        for member in &members {
            if !seen.insert(member.email.as_str()) {
                tracing::debug!(email = %member.email, "Ignoring duplicate team member");
                continue;
            }
            *by_role.entry(member.role.as_str()).or_default() += 1;
        }

        let mut samples = Vec::with_capacity(by_role.len() + 1);
        samples.push(self.total.sample(seen.len() as f64, &[])?);
        for (role, count) in by_role {
            samples.push(self.by_role.sample(count as f64, &[role])?);
        }
        Ok(samples)
    }
}
