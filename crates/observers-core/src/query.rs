//! Filter, sort, and limit for observation listings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::{Observation, ObservationError, Result, Severity, Status};

/// Default number of observations returned by a listing.
pub const DEFAULT_LIMIT: usize = 50;

/// Sort order for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Most urgent first; equal severities keep store order.
    #[default]
    Severity,
    /// Newest first; equal timestamps keep store order.
    CreatedAt,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Severity => "severity",
            Self::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortBy {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "severity" => Ok(Self::Severity),
            "created_at" => Ok(Self::CreatedAt),
            other => Err(ObservationError::invalid_enum(
                "sort_by",
                other,
                &["severity", "created_at"],
            )),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field constraints, AND-composed. `None` means unconstrained; an empty set
/// matches nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListFilters {
    pub status: Option<Vec<Status>>,
    pub severity: Option<Vec<Severity>>,
    pub observer: Option<String>,
}

impl ListFilters {
    pub fn with_status(self, status: Status) -> Self {
        self.with_statuses([status])
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.status = Some(statuses.into_iter().collect());
        self
    }

    pub fn with_severity(self, severity: Severity) -> Self {
        self.with_severities([severity])
    }

    pub fn with_severities(mut self, severities: impl IntoIterator<Item = Severity>) -> Self {
        self.severity = Some(severities.into_iter().collect());
        self
    }

    pub fn with_observer(mut self, observer: &str) -> Self {
        self.observer = Some(observer.to_string());
        self
    }

    pub fn matches(&self, obs: &Observation) -> bool {
        if let Some(ref statuses) = self.status {
            if !statuses.contains(&obs.status()) {
                return false;
            }
        }
        if let Some(ref severities) = self.severity {
            if !severities.contains(&obs.severity()) {
                return false;
            }
        }
        if let Some(ref observer) = self.observer {
            if obs.observer() != observer {
                return false;
            }
        }
        true
    }
}

/// Query parameters for listing observations.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: ListFilters,
    pub sort_by: SortBy,
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: ListFilters::default(),
            sort_by: SortBy::default(),
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListQuery {
    /// Query that matches all entries, severity order, default limit.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, filters: ListFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn sorted_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Filter, sort, and truncate `observations` (given in store order).
    pub fn run<'a>(
        &self,
        observations: impl IntoIterator<Item = &'a Observation>,
        total: usize,
    ) -> Result<ListResult> {
        if self.limit == 0 {
            return Err(ObservationError::validation(
                "limit",
                "limit must be a positive integer",
            ));
        }

        let mut matches: Vec<Observation> = observations
            .into_iter()
            .filter(|o| self.filters.matches(o))
            .cloned()
            .collect();

        sort_observations(&mut matches, self.sort_by);
        matches.truncate(self.limit);

        Ok(ListResult {
            count: matches.len(),
            total,
            by_severity: count_by_severity(&matches),
            by_observer: count_by_observer(&matches),
            observations: matches,
        })
    }
}

/// Result of a listing. Aggregates cover the returned rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub observations: Vec<Observation>,
    pub count: usize,
    pub total: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_observer: BTreeMap<String, usize>,
}

/// Stable sort, so ties keep their incoming order.
pub fn sort_observations(observations: &mut [Observation], sort_by: SortBy) {
    match sort_by {
        SortBy::Severity => observations.sort_by_key(|o| o.severity().rank()),
        SortBy::CreatedAt => observations.sort_by(|a, b| b.created_at().cmp(&a.created_at())),
    }
}

pub fn count_by_severity(observations: &[Observation]) -> BTreeMap<String, usize> {
    tally(observations.iter().map(|o| o.severity().as_str()))
}

pub fn count_by_status(observations: &[Observation]) -> BTreeMap<String, usize> {
    tally(observations.iter().map(|o| o.status().as_str()))
}

pub fn count_by_observer(observations: &[Observation]) -> BTreeMap<String, usize> {
    tally(observations.iter().map(|o| o.observer()))
}

fn tally<'a>(keys: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for key in keys {
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewObservation;

    fn make(content: &str, observer: &str, severity: &str) -> Observation {
        Observation::create(
            NewObservation::new(content)
                .observer(observer)
                .severity(severity),
        )
        .unwrap()
    }

    fn contents(result: &ListResult) -> Vec<&str> {
        result.observations.iter().map(|o| o.content()).collect()
    }

    #[test]
    fn test_sort_by_from_str() {
        assert_eq!("severity".parse::<SortBy>().unwrap(), SortBy::Severity);
        assert_eq!("created_at".parse::<SortBy>().unwrap(), SortBy::CreatedAt);
        assert!("priority".parse::<SortBy>().is_err());
    }

    #[test]
    fn test_severity_sort_is_stable() {
        let obs = vec![
            make("info-1", "a", "info"),
            make("high-1", "a", "high"),
            make("info-2", "a", "info"),
            make("critical-1", "a", "critical"),
            make("high-2", "a", "high"),
        ];
        let r = ListQuery::all().run(&obs, obs.len()).unwrap();
        assert_eq!(
            contents(&r),
            vec!["critical-1", "high-1", "high-2", "info-1", "info-2"]
        );
    }

    #[test]
    fn test_filters_compose_with_and() {
        let obs = vec![
            make("a-high", "alpha", "high"),
            make("b-high", "beta", "high"),
            make("a-low", "alpha", "low"),
        ];
        let q = ListQuery::all().with_filters(
            ListFilters::default()
                .with_severity(Severity::High)
                .with_observer("alpha"),
        );
        let r = q.run(&obs, obs.len()).unwrap();
        assert_eq!(contents(&r), vec!["a-high"]);
        assert_eq!(r.total, 3);
        assert_eq!(r.count, 1);
    }

    #[test]
    fn test_empty_filter_set_matches_nothing() {
        let obs = vec![make("x", "a", "high")];
        let q = ListQuery::all()
            .with_filters(ListFilters::default().with_statuses(Vec::<Status>::new()));
        let r = q.run(&obs, obs.len()).unwrap();
        assert!(r.observations.is_empty());
    }

    #[test]
    fn test_limit_truncates_after_sort() {
        let obs = vec![
            make("low", "a", "low"),
            make("critical", "a", "critical"),
            make("medium", "a", "medium"),
        ];
        let r = ListQuery::all().with_limit(2).run(&obs, obs.len()).unwrap();
        assert_eq!(contents(&r), vec!["critical", "medium"]);
        assert_eq!(r.count, 2);
        assert_eq!(r.total, 3);
    }

    #[test]
    fn test_zero_limit_rejected() {
        let obs = vec![make("x", "a", "low")];
        let err = ListQuery::all().with_limit(0).run(&obs, 1).unwrap_err();
        assert_eq!(err.field(), Some("limit"));
    }

    #[test]
    fn test_aggregates_cover_returned_rows_only() {
        let obs = vec![
            make("1", "alpha", "critical"),
            make("2", "beta", "critical"),
            make("3", "alpha", "info"),
        ];
        let r = ListQuery::all().with_limit(2).run(&obs, obs.len()).unwrap();
        assert_eq!(r.by_severity.get("critical"), Some(&2));
        assert_eq!(r.by_severity.get("info"), None);
        assert_eq!(r.by_observer.get("alpha"), Some(&1));
        assert_eq!(r.by_observer.get("beta"), Some(&1));
    }

    #[test]
    fn test_count_by_status() {
        let mut obs = vec![make("1", "a", "low"), make("2", "a", "low")];
        obs[0].resolve(None);
        let counts = count_by_status(&obs);
        assert_eq!(counts.get("resolved"), Some(&1));
        assert_eq!(counts.get("open"), Some(&1));
    }
}
