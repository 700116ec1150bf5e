//! Filter predicates over a record collection.
//!
//! A view declares its filter dimensions once ([`FilterSpec`]); the
//! operator's selections live in an immutable [`FilterState`] snapshot that is
//! replaced wholesale on every change. A record passes when it satisfies every
//! active dimension.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDateTime, NaiveTime};
use labgate_shared::time::{is_sentinel, parse_timestamp};
use labgate_shared::Record;

/// Derived check state of an access session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    CheckedIn,
    CheckedOut,
}

impl CheckStatus {
    /// A session is checked out when it has a real end timestamp that
    /// differs from its start. A sentinel end, or an end equal to the start,
    /// still counts as checked in.
    pub fn of(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        match end {
            Some(end) if !is_sentinel(&end) && Some(end) != start => CheckStatus::CheckedOut,
            _ => CheckStatus::CheckedIn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::CheckedIn => "checked_in",
            CheckStatus::CheckedOut => "checked_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "checked_in" | "checkedin" | "in" => Some(CheckStatus::CheckedIn),
            "checked_out" | "checkedout" | "out" => Some(CheckStatus::CheckedOut),
            _ => None,
        }
    }
}

/// How one dimension matches a record against the selected value.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchRule {
    /// Exact match, typically on a foreign key.
    Exact { field: String },
    /// Case-insensitive substring on free text.
    Contains { field: String },
    /// Inclusive lower date bound; the selected day starts at midnight.
    DateFrom { field: String },
    /// Inclusive upper date bound; the selected day ends at 23:59:59.999.
    DateTo { field: String },
    /// Derived checked-in / checked-out state from two timestamp fields.
    Status { start: String, end: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDimension {
    pub name: String,
    pub rule: MatchRule,
}

/// The filter dimensions a view supports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    dimensions: Vec<FilterDimension>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, name: impl Into<String>, rule: MatchRule) -> Self {
        self.dimensions.push(FilterDimension {
            name: name.into(),
            rule,
        });
        self
    }

    pub fn exact(self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.dimension(name, MatchRule::Exact { field: field.into() })
    }

    pub fn contains(self, name: impl Into<String>, field: impl Into<String>) -> Self {
        self.dimension(name, MatchRule::Contains { field: field.into() })
    }

    /// Adds `{prefix}From` and `{prefix}To` dimensions over one timestamp field.
    pub fn date_range(self, prefix: &str, field: impl Into<String>) -> Self {
        let field = field.into();
        self.dimension(
            format!("{prefix}From"),
            MatchRule::DateFrom {
                field: field.clone(),
            },
        )
        .dimension(format!("{prefix}To"), MatchRule::DateTo { field })
    }

    pub fn status(
        self,
        name: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        self.dimension(
            name,
            MatchRule::Status {
                start: start.into(),
                end: end.into(),
            },
        )
    }

    pub fn dimensions(&self) -> &[FilterDimension] {
        &self.dimensions
    }

    pub fn get(&self, name: &str) -> Option<&FilterDimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    /// `true` when the record satisfies every active dimension.
    /// Selections for undeclared dimensions are ignored.
    pub fn matches<R: Record>(&self, record: &R, state: &FilterState) -> bool {
        state.active().all(|(name, value)| match self.get(name) {
            Some(dim) => rule_matches(&dim.rule, record, value),
            None => true,
        })
    }

    /// The subsequence of `records` passing every active dimension.
    pub fn apply<R: Record>(&self, records: &[R], state: &FilterState) -> Vec<R> {
        if !state.is_active() {
            return records.to_vec();
        }
        records
            .iter()
            .filter(|r| self.matches(*r, state))
            .cloned()
            .collect()
    }

    /// Dropdown options for every exact-match dimension.
    pub fn options<R: Record>(&self, records: &[R]) -> BTreeMap<String, Vec<String>> {
        self.dimensions
            .iter()
            .filter_map(|d| match &d.rule {
                MatchRule::Exact { field } => Some((d.name.clone(), filter_options(records, field))),
                _ => None,
            })
            .collect()
    }
}

/// A non-empty value that does not parse for its rule matches nothing.
fn rule_matches<R: Record>(rule: &MatchRule, record: &R, value: &str) -> bool {
    match rule {
        MatchRule::Exact { field } => record.field(field).as_deref() == Some(value),
        MatchRule::Contains { field } => record
            .field(field)
            .map(|v| v.to_lowercase().contains(&value.to_lowercase()))
            .unwrap_or(false),
        MatchRule::DateFrom { field } => match day_start(value) {
            Some(bound) => record.timestamp(field).is_some_and(|ts| ts >= bound),
            None => false,
        },
        MatchRule::DateTo { field } => match day_end(value) {
            Some(bound) => record.timestamp(field).is_some_and(|ts| ts <= bound),
            None => false,
        },
        MatchRule::Status { start, end } => match CheckStatus::parse(value) {
            Some(wanted) => CheckStatus::of(record.timestamp(start), record.timestamp(end)) == wanted,
            None => false,
        },
    }
}

/// Midnight at the start of the selected day.
pub fn day_start(value: &str) -> Option<NaiveDateTime> {
    parse_timestamp(value).and_then(|ts| ts.date().and_hms_opt(0, 0, 0))
}

/// 23:59:59.999 on the selected day.
pub fn day_end(value: &str) -> Option<NaiveDateTime> {
    let end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
    parse_timestamp(value).map(|ts| ts.date().and_time(end))
}

/// Sorted distinct non-empty values of a field.
pub fn filter_options<R: Record>(records: &[R], field: &str) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.field(field))
        .filter(|v| !v.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Selected value per filter dimension. An empty value means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterState {
    values: BTreeMap<String, String>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new snapshot with `dimension` set to `value`; an empty value clears it.
    pub fn with(&self, dimension: &str, value: &str) -> Self {
        let mut values = self.values.clone();
        let value = value.trim();
        if value.is_empty() {
            values.remove(dimension);
        } else {
            values.insert(dimension.to_string(), value.to_string());
        }
        Self { values }
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.values.get(dimension).map(String::as_str)
    }

    pub fn is_active(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn active(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgate_shared::AccessLog;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn log(id: i64, lab_id: i64, user: &str, check_in: &str, check_out: Option<&str>) -> AccessLog {
        AccessLog {
            id,
            card_uid: format!("UID{id:04}"),
            user_id: Some(id * 10),
            user_name: Some(user.to_string()),
            lab_id,
            lab_name: Some(format!("Lab {lab_id}")),
            class_id: None,
            class_name: None,
            check_in_at: ts(check_in),
            check_out_at: check_out.map(ts),
        }
    }

    fn spec() -> FilterSpec {
        FilterSpec::new()
            .exact("lab", "labId")
            .contains("user", "userName")
            .date_range("date", "checkInAt")
            .status("status", "checkInAt", "checkOutAt")
    }

    fn sample() -> Vec<AccessLog> {
        vec![
            log(1, 1, "Nguyen Van An", "2024-05-10T08:00:00", Some("2024-05-10T09:30:00")),
            log(2, 2, "Tran Thi Binh", "2024-05-10T23:59:00", None),
            log(3, 1, "Le Van Cuong", "2024-05-11T00:00:01", Some("2024-05-11T00:00:01")),
            log(4, 2, "Pham Anh", "2024-05-09T12:00:00", Some("2024-05-09T12:45:00")),
        ]
    }

    fn ids(records: &[AccessLog]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn empty_state_returns_everything() {
        assert_eq!(ids(&spec().apply(&sample(), &FilterState::new())), vec![1, 2, 3, 4]);
    }

    #[test]
    fn active_dimensions_combine_with_and() {
        let state = FilterState::new().with("lab", "1").with("user", "VAN");
        assert_eq!(ids(&spec().apply(&sample(), &state)), vec![1, 3]);

        let state = state.with("status", "checked_out");
        assert_eq!(ids(&spec().apply(&sample(), &state)), vec![1]);
    }

    #[test]
    fn single_day_range_is_inclusive_on_both_ends() {
        let state = FilterState::new()
            .with("dateFrom", "2024-05-10")
            .with("dateTo", "2024-05-10");
        assert_eq!(ids(&spec().apply(&sample(), &state)), vec![1, 2]);
    }

    #[test]
    fn start_equal_to_end_counts_as_checked_in() {
        let state = FilterState::new().with("status", "checked_in");
        assert_eq!(ids(&spec().apply(&sample(), &state)), vec![2, 3]);
    }

    #[test]
    fn sentinel_end_counts_as_checked_in() {
        let start = ts("2024-05-10T08:00:00");
        let sentinel = ts("0001-01-01T00:00:00");
        assert_eq!(CheckStatus::of(Some(start), Some(sentinel)), CheckStatus::CheckedIn);
        assert_eq!(CheckStatus::of(Some(start), None), CheckStatus::CheckedIn);
    }

    #[test]
    fn unparseable_selection_matches_nothing() {
        let selections = [("status", "foo"), ("dateFrom", "not-a-date"), ("dateTo", "soon")];
        for (dimension, value) in selections {
            let state = FilterState::new().with(dimension, value);
            assert!(state.is_active());
            assert!(spec().apply(&sample(), &state).is_empty(), "{dimension}={value}");
        }
    }

    #[test]
    fn clearing_a_dimension_removes_the_constraint() {
        let state = FilterState::new().with("lab", "2").with("lab", "  ");
        assert!(!state.is_active());
    }

    #[test]
    fn filtered_is_subset_satisfying_every_dimension() {
        let records = sample();
        let spec = spec();
        let states = [
            FilterState::new().with("lab", "2"),
            FilterState::new().with("user", "an"),
            FilterState::new().with("dateFrom", "2024-05-10"),
            FilterState::new().with("dateTo", "2024-05-10").with("status", "checked_out"),
            FilterState::new().with("lab", "9"),
        ];
        for state in states {
            let filtered = spec.apply(&records, &state);
            for r in &filtered {
                assert!(records.contains(r));
                assert!(spec.matches(r, &state));
            }
            let excluded = records.iter().filter(|r| !filtered.contains(r));
            for r in excluded {
                assert!(!spec.matches(r, &state));
            }
        }
    }

    #[test]
    fn options_list_distinct_sorted_values() {
        let options = spec().options(&sample());
        assert_eq!(options.get("lab"), Some(&vec!["1".to_string(), "2".to_string()]));
        assert!(!options.contains_key("user"));
    }
}
