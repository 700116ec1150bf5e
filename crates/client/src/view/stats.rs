//! Summary numbers over the filtered (pre-search, pre-pagination) set.

use std::collections::HashMap;

use labgate_shared::Record;

use super::filter::CheckStatus;

/// Which fields the aggregation reads.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsFields {
    pub start: String,
    pub end: String,
    /// Categorical field whose most frequent value is reported.
    pub group: String,
}

impl StatsFields {
    pub fn new(start: &str, end: &str, group: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            group: group.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessStats {
    pub total: usize,
    /// Sessions still checked in.
    pub active: usize,
    pub average_minutes: Option<i64>,
    /// `average_minutes` formatted for display, `"-"` when nothing completed.
    pub average_duration: String,
    pub top_group: Option<String>,
}

/// `45 min`, `1h30m`.
pub fn format_duration(minutes: i64) -> String {
    if minutes < 60 {
        format!("{minutes} min")
    } else {
        format!("{}h{}m", minutes / 60, minutes % 60)
    }
}

pub fn aggregate<R: Record>(records: &[R], fields: &StatsFields) -> AccessStats {
    let mut active = 0;
    let mut completed = 0i64;
    let mut total_seconds = 0i64;

    for record in records {
        let start = record.timestamp(&fields.start);
        let end = record.timestamp(&fields.end);
        match (CheckStatus::of(start, end), start, end) {
            (CheckStatus::CheckedOut, Some(start), Some(end)) => {
                completed += 1;
                total_seconds += (end - start).num_seconds().max(0);
            }
            (CheckStatus::CheckedOut, _, _) => {}
            (CheckStatus::CheckedIn, _, _) => active += 1,
        }
    }

    let average_minutes = (completed > 0)
        .then(|| (total_seconds as f64 / 60.0 / completed as f64).round() as i64);

    AccessStats {
        total: records.len(),
        active,
        average_minutes,
        average_duration: average_minutes
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string()),
        top_group: most_frequent(records.iter().filter_map(|r| r.field(&fields.group))),
    }
}

/// Mode of the values; ties go to the value seen first.
pub fn most_frequent(values: impl IntoIterator<Item = String>) -> Option<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for value in values {
        let count = counts.entry(value.clone()).or_insert(0);
        if *count == 0 {
            order.push(value);
        }
        *count += 1;
    }

    let mut best: Option<(&String, usize)> = None;
    for value in &order {
        let count = counts[value];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.clone())
}
