//! Day-bucket aggregation for the paginated API's daily usage rows.
//!
//! The upstream returns one row per workspace per day, keyed by a millisecond
//! epoch. Rows are bucketed by their UTC calendar day, additive counters are
//! summed, and the most used model/extension is picked by tally.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;

use super::{ClientError, ClientResult};
use crate::models::DailyUsage;

/// A raw daily usage row as returned by `POST /teams/daily-usage-data`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DailyUsageRow {
    /// Millisecond Unix epoch.
    pub date: i64,
    pub total_lines_added: u64,
    pub total_lines_deleted: u64,
    pub total_accepts: u64,
    pub total_rejects: u64,
    pub total_tabs_accepted: u64,
    pub composer_requests: u64,
    pub chat_requests: u64,
    pub most_used_model: Option<String>,
    pub tab_most_used_extension: Option<String>,
}

#[derive(Default)]
struct DayBucket<'a> {
    lines_added: u64,
    lines_deleted: u64,
    accepts: u64,
    rejects: u64,
    tabs_used: u64,
    composer_used: u64,
    chat_requests: u64,
    models: Tally<'a>,
    extensions: Tally<'a>,
}

impl<'a> DayBucket<'a> {
    fn add(&mut self, row: &'a DailyUsageRow) {
        // Counters saturate rather than wrap on absurd upstream values.
        self.lines_added = self.lines_added.saturating_add(row.total_lines_added);
        self.lines_deleted = self.lines_deleted.saturating_add(row.total_lines_deleted);
        self.accepts = self.accepts.saturating_add(row.total_accepts);
        self.rejects = self.rejects.saturating_add(row.total_rejects);
        self.tabs_used = self.tabs_used.saturating_add(row.total_tabs_accepted);
        self.composer_used = self.composer_used.saturating_add(row.composer_requests);
        self.chat_requests = self.chat_requests.saturating_add(row.chat_requests);
        self.models.add(row.most_used_model.as_deref());
        self.extensions.add(row.tab_most_used_extension.as_deref());
    }

    fn finish(self, date: NaiveDate) -> DailyUsage {
        DailyUsage {
            date,
            lines_added: self.lines_added,
            lines_deleted: self.lines_deleted,
            suggestion_acceptance_rate: acceptance_rate(self.accepts, self.rejects),
            tabs_used: self.tabs_used,
            composer_used: self.composer_used,
            chat_requests: self.chat_requests,
            most_used_model: self.models.most_common(),
            most_used_extension: self.extensions.most_common(),
        }
    }
}

/// Occurrence counts per distinct non-empty value.
#[derive(Default)]
struct Tally<'a>(BTreeMap<&'a str, u32>);

impl<'a> Tally<'a> {
    fn add(&mut self, value: Option<&'a str>) {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            let count = self.0.entry(value).or_default();
            *count = count.saturating_add(1);
        }
    }

    /// Highest count wins; ties go to the lexicographically smallest value.
    fn most_common(&self) -> Option<String> {
        let mut best: Option<(&str, u32)> = None;
        for (&value, &count) in &self.0 {
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value.to_string())
    }
}

/// accepts / (accepts + rejects), or 0 when nothing was suggested.
pub fn acceptance_rate(accepts: u64, rejects: u64) -> f64 {
    if accepts == 0 && rejects == 0 {
        0.0
    } else {
        accepts as f64 / (accepts as f64 + rejects as f64)
    }
}

/// UTC calendar day of a millisecond epoch.
pub fn utc_day(millis: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.date_naive())
}

/// Collapse raw rows into one record per UTC day, sorted ascending by date.
pub fn aggregate_daily_usage(rows: &[DailyUsageRow]) -> ClientResult<Vec<DailyUsage>> {
    let mut days: BTreeMap<NaiveDate, DayBucket<'_>> = BTreeMap::new();

    for row in rows {
        let day = utc_day(row.date).ok_or_else(|| {
            ClientError::InvalidDate(format!("daily usage row date {} is out of range", row.date))
        })?;
        days.entry(day).or_default().add(row);
    }

    Ok(days
        .into_iter()
        .map(|(date, bucket)| bucket.finish(date))
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::*;

    fn millis(date: &str, hour: u32) -> i64 {
        let date: NaiveDate = date.parse().unwrap();
        date.and_time(NaiveTime::from_hms_opt(hour, 0, 0).unwrap())
            .and_utc()
            .timestamp_millis()
    }

    fn row(date: &str, hour: u32, accepts: u64, rejects: u64) -> DailyUsageRow {
        DailyUsageRow {
            date: millis(date, hour),
            total_accepts: accepts,
            total_rejects: rejects,
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_rows_by_utc_day() {
        let rows = vec![
            row("2023-01-01", 0, 5, 1),
            row("2023-01-01", 9, 3, 1),
            row("2023-01-01", 23, 0, 2),
            row("2023-01-02", 12, 4, 0),
        ];

        let usage = aggregate_daily_usage(&rows).unwrap();

        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].date, "2023-01-01".parse::<NaiveDate>().unwrap());
        assert!((usage[0].suggestion_acceptance_rate - 8.0 / 12.0).abs() < 1e-9);
        assert_eq!(usage[1].date, "2023-01-02".parse::<NaiveDate>().unwrap());
        assert_eq!(usage[1].suggestion_acceptance_rate, 1.0);
    }

    #[test]
    fn test_sums_additive_counters() {
        let rows = vec![
            DailyUsageRow {
                date: millis("2024-03-10", 1),
                total_lines_added: 10,
                total_lines_deleted: 2,
                total_tabs_accepted: 7,
                composer_requests: 1,
                chat_requests: 4,
                ..Default::default()
            },
            DailyUsageRow {
                date: millis("2024-03-10", 15),
                total_lines_added: 5,
                total_lines_deleted: 3,
                total_tabs_accepted: 1,
                composer_requests: 2,
                chat_requests: 6,
                ..Default::default()
            },
        ];

        let usage = aggregate_daily_usage(&rows).unwrap();

        assert_eq!(usage.len(), 1);
        let day = &usage[0];
        assert_eq!(day.lines_added, 15);
        assert_eq!(day.lines_deleted, 5);
        assert_eq!(day.tabs_used, 8);
        assert_eq!(day.composer_used, 3);
        assert_eq!(day.chat_requests, 10);
        assert_eq!(day.suggestion_acceptance_rate, 0.0);
    }

    #[test]
    fn test_output_sorted_regardless_of_input_order() {
        let rows = vec![
            row("2024-05-03", 4, 1, 0),
            row("2024-05-01", 4, 1, 0),
            row("2024-05-02", 4, 1, 0),
            row("2024-05-01", 20, 1, 0),
        ];

        let dates: Vec<String> = aggregate_daily_usage(&rows)
            .unwrap()
            .into_iter()
            .map(|d| d.date.to_string())
            .collect();

        assert_eq!(dates, ["2024-05-01", "2024-05-02", "2024-05-03"]);
    }

    #[test]
    fn test_most_used_picks_highest_tally() {
        let mut rows: Vec<DailyUsageRow> = ["gpt-4o", "claude-3.5-sonnet", "claude-3.5-sonnet"]
            .iter()
            .map(|model| DailyUsageRow {
                date: millis("2024-01-01", 8),
                most_used_model: Some(model.to_string()),
                ..Default::default()
            })
            .collect();
        rows[0].tab_most_used_extension = Some("ts".into());
        rows[1].tab_most_used_extension = Some(String::new());

        let usage = aggregate_daily_usage(&rows).unwrap();

        assert_eq!(usage[0].most_used_model.as_deref(), Some("claude-3.5-sonnet"));
        assert_eq!(usage[0].most_used_extension.as_deref(), Some("ts"));
    }

    #[test]
    fn test_most_used_tie_is_lexicographic() {
        let rows: Vec<DailyUsageRow> = ["py", "rs", "go", "rs", "go"]
            .iter()
            .map(|ext| DailyUsageRow {
                date: millis("2024-01-01", 8),
                tab_most_used_extension: Some(ext.to_string()),
                ..Default::default()
            })
            .collect();

        let usage = aggregate_daily_usage(&rows).unwrap();

        assert_eq!(usage[0].most_used_extension.as_deref(), Some("go"));
        assert_eq!(usage[0].most_used_model, None);
    }

    #[test]
    fn test_empty_input() {
        assert!(aggregate_daily_usage(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_timestamp_is_an_error() {
        let rows = vec![DailyUsageRow {
            date: i64::MAX,
            ..Default::default()
        }];
        assert!(matches!(
            aggregate_daily_usage(&rows),
            Err(ClientError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_acceptance_rate() {
        assert_eq!(acceptance_rate(0, 0), 0.0);
        assert_eq!(acceptance_rate(3, 1), 0.75);
        assert_eq!(acceptance_rate(0, 9), 0.0);
        assert_eq!(acceptance_rate(u64::MAX, u64::MAX), 0.5);
    }

    #[test]
    fn test_counters_saturate() {
        let row = DailyUsageRow {
            date: millis("2024-03-10", 1),
            total_lines_added: u64::MAX,
            total_accepts: u64::MAX,
            chat_requests: 3,
            ..Default::default()
        };
        let rows = vec![row.clone(), row];

        let usage = aggregate_daily_usage(&rows).unwrap();

        assert_eq!(usage[0].lines_added, u64::MAX);
        assert_eq!(usage[0].chat_requests, 6);
        assert_eq!(usage[0].suggestion_acceptance_rate, 1.0);
    }
}
