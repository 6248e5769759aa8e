use crate::github::GitHubIssue;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

const OPEN_STATE: &str = "open";
const CLOSED_STATE: &str = "closed";

/// An issue after pull requests have been filtered out and unused fields dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub id: u64,
    /// Spreadsheet formula linking to the issue on GitHub.
    pub issue_url: String,
    pub title: String,
    pub state: String,
    pub comments: u64,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Issue {
    pub fn is_open(&self) -> bool {
        self.state == OPEN_STATE
    }
}

/// A calendar month, the bucket used for the time series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(timestamp: &DateTime<Utc>) -> Self {
        Self {
            year: timestamp.year(),
            month: timestamp.month(),
        }
    }

    pub fn succ(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The last day of the month, which labels the bucket.
    pub fn end_date(self) -> Option<NaiveDate> {
        let next = self.succ();
        NaiveDate::from_ymd_opt(next.year, next.month, 1)?.pred_opt()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// One month of the `Total Issues` / `Closed Issues` table.
///
/// A column is `None` for months outside the span of its own events, e.g. `closed`
/// before the first issue was ever closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyPoint {
    pub month: YearMonth,
    pub total: Option<u64>,
    pub closed: Option<u64>,
}

/// Issue counts by state. Only the two states the dashboard shows are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateTally {
    pub open: Option<u64>,
    pub closed: Option<u64>,
}

/// Everything the dashboard displays for one repository.
#[derive(Debug, Clone)]
pub struct IssueReport {
    pub issues: Vec<Issue>,
    pub cumulative: Vec<MonthlyPoint>,
    pub tally: StateTally,
}

/// Builds the `=HYPERLINK(...)` formula shown in the issue table.
pub fn hyperlink_formula(html_url: &str, number: u64) -> String {
    format!("=HYPERLINK(\"{html_url}\", \"{number}\")")
}

/// Concatenates the pages in order, drops pull requests and projects the remaining entries.
pub fn build_dataset<I>(pages: I) -> Vec<Issue>
where
    I: IntoIterator<Item = Vec<GitHubIssue>>,
{
    pages
        .into_iter()
        .flatten()
        .filter(|issue| !issue.is_pull_request())
        .map(|issue| Issue {
            id: issue.id,
            issue_url: hyperlink_formula(&issue.html_url, issue.number),
            title: issue.title,
            state: issue.state,
            comments: issue.comments,
            created_at: issue.created_at,
            closed_at: issue.closed_at,
        })
        .collect()
}

/// Counts created and closed issues per calendar month.
///
/// The result covers every month from the earliest to the latest event. Within the span of
/// its own events a column counts zero for quiet months; outside that span it is `None`.
pub fn monthly_counts(issues: &[Issue]) -> Vec<MonthlyPoint> {
    let created = bucket(issues.iter().map(|issue| issue.created_at));
    let closed = bucket(issues.iter().filter_map(|issue| issue.closed_at));

    let bounds = |counts: &BTreeMap<YearMonth, u64>| {
        Some((*counts.keys().next()?, *counts.keys().next_back()?))
    };
    let created_span = bounds(&created);
    let closed_span = bounds(&closed);

    let (first, last) = match (created_span, closed_span) {
        (Some((a, b)), Some((c, d))) => (a.min(c), b.max(d)),
        (Some(span), None) | (None, Some(span)) => span,
        (None, None) => return Vec::new(),
    };

    let value = |counts: &BTreeMap<YearMonth, u64>,
                 span: Option<(YearMonth, YearMonth)>,
                 month: YearMonth| {
        span.filter(|(start, end)| *start <= month && month <= *end)
            .map(|_| counts.get(&month).copied().unwrap_or(0))
    };

    let mut points = Vec::new();
    let mut month = first;
    while month <= last {
        points.push(MonthlyPoint {
            month,
            total: value(&created, created_span, month),
            closed: value(&closed, closed_span, month),
        });
        month = month.succ();
    }
    points
}

fn bucket(timestamps: impl Iterator<Item = DateTime<Utc>>) -> BTreeMap<YearMonth, u64> {
    let mut counts = BTreeMap::new();
    for timestamp in timestamps {
        *counts.entry(YearMonth::of(&timestamp)).or_insert(0) += 1;
    }
    counts
}

/// Running totals of the monthly counts, forward-filled over months a column has no value for.
///
/// Months before a column's first value stay `None`.
pub fn cumulative(counts: &[MonthlyPoint]) -> Vec<MonthlyPoint> {
    let mut total = RunningSum::default();
    let mut closed = RunningSum::default();

    counts
        .iter()
        .map(|point| MonthlyPoint {
            month: point.month,
            total: total.push(point.total),
            closed: closed.push(point.closed),
        })
        .collect()
}

#[derive(Default)]
struct RunningSum {
    sum: Option<u64>,
}

impl RunningSum {
    fn push(&mut self, value: Option<u64>) -> Option<u64> {
        if let Some(value) = value {
            self.sum = Some(self.sum.unwrap_or(0) + value);
        }
        self.sum
    }
}

/// Counts issues in the `open` and `closed` states.
///
/// Any other state is left out of the tally.
pub fn tally_states(issues: &[Issue]) -> StateTally {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for issue in issues {
        *counts.entry(issue.state.as_str()).or_insert(0) += 1;
    }

    for (state, count) in &counts {
        if *state != OPEN_STATE && *state != CLOSED_STATE {
            tracing::warn!(state, count, "Ignoring issues with unrecognized state");
        }
    }

    StateTally {
        open: counts.get(OPEN_STATE).copied(),
        closed: counts.get(CLOSED_STATE).copied(),
    }
}

/// Derives the time series and state tally for a dataset.
pub fn summarize(issues: Vec<Issue>) -> IssueReport {
    let cumulative = cumulative(&monthly_counts(&issues));
    let tally = tally_states(&issues);

    IssueReport {
        issues,
        cumulative,
        tally,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth { year, month }
    }

    fn issue(id: u64, created_at: DateTime<Utc>, closed_at: Option<DateTime<Utc>>) -> Issue {
        Issue {
            id,
            issue_url: hyperlink_formula("https://github.com/octo/repo/issues/1", id),
            title: format!("Issue {id}"),
            state: if closed_at.is_some() { "closed" } else { "open" }.to_string(),
            comments: 0,
            created_at,
            closed_at,
        }
    }

    fn raw(number: u64, pull_request: bool) -> GitHubIssue {
        GitHubIssue {
            id: number * 10,
            html_url: format!("https://github.com/octo/repo/issues/{number}"),
            number,
            title: format!("Entry {number}"),
            state: "open".to_string(),
            comments: 2,
            pull_request: pull_request.then(|| serde_json::json!({ "url": "x" })),
            created_at: ts(2024, 1, 1),
            closed_at: None,
        }
    }

    #[test]
    fn test_hyperlink_formula() {
        assert_eq!(
            hyperlink_formula("https://github.com/octo/repo/issues/42", 42),
            "=HYPERLINK(\"https://github.com/octo/repo/issues/42\", \"42\")"
        );
    }

    #[test]
    fn test_build_dataset_keeps_page_order_and_drops_pull_requests() {
        let pages = vec![
            vec![raw(1, false), raw(2, true)],
            vec![raw(3, true), raw(4, false)],
            vec![raw(5, false)],
        ];
        let issues = build_dataset(pages);

        let ids: Vec<u64> = issues.iter().map(|issue| issue.id).collect();
        assert_eq!(ids, vec![10, 40, 50]);
        assert_eq!(
            issues[1].issue_url,
            "=HYPERLINK(\"https://github.com/octo/repo/issues/4\", \"4\")"
        );
        assert_eq!(issues[1].comments, 2);
    }

    #[test]
    fn test_month_end_dates() {
        assert_eq!(ym(2024, 2).end_date(), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(ym(2023, 12).end_date(), NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(ym(2023, 12).succ(), ym(2024, 1));
        assert_eq!(ym(2023, 4).to_string(), "2023-04");
    }

    #[test]
    fn test_monthly_counts_empty() {
        assert!(monthly_counts(&[]).is_empty());
        assert!(cumulative(&[]).is_empty());
    }

    #[test]
    fn test_gap_month_carries_previous_total() {
        let issues = vec![
            issue(1, ts(2024, 1, 3), None),
            issue(2, ts(2024, 1, 20), None),
            issue(3, ts(2024, 3, 2), None),
        ];

        let counts = monthly_counts(&issues);
        assert_eq!(counts.len(), 3);
        assert_eq!(counts[1].month, ym(2024, 2));
        assert_eq!(counts[1].total, Some(0));

        let series = cumulative(&counts);
        assert_eq!(series[0].total, Some(2));
        assert_eq!(series[1].total, Some(2));
        assert_eq!(series[2].total, Some(3));
        assert!(series.iter().all(|point| point.closed.is_none()));
    }

    #[test]
    fn test_closed_after_last_creation_is_forward_filled() {
        let issues = vec![
            issue(1, ts(2024, 1, 3), Some(ts(2024, 4, 1))),
            issue(2, ts(2024, 1, 9), Some(ts(2024, 2, 1))),
        ];

        let counts = monthly_counts(&issues);
        let months: Vec<YearMonth> = counts.iter().map(|point| point.month).collect();
        assert_eq!(months, vec![ym(2024, 1), ym(2024, 2), ym(2024, 3), ym(2024, 4)]);
        assert_eq!(counts[0].closed, None);
        assert_eq!(counts[3].total, None);

        let series = cumulative(&counts);
        let totals: Vec<Option<u64>> = series.iter().map(|point| point.total).collect();
        let closed: Vec<Option<u64>> = series.iter().map(|point| point.closed).collect();
        assert_eq!(totals, vec![Some(2), Some(2), Some(2), Some(2)]);
        assert_eq!(closed, vec![None, Some(1), Some(1), Some(2)]);
    }

    #[test]
    fn test_cumulative_is_non_decreasing_for_any_input_order() {
        let mut issues = vec![
            issue(1, ts(2023, 11, 3), Some(ts(2024, 2, 1))),
            issue(2, ts(2024, 2, 9), None),
            issue(3, ts(2023, 10, 1), Some(ts(2023, 10, 2))),
            issue(4, ts(2024, 5, 30), Some(ts(2024, 6, 1))),
            issue(5, ts(2023, 12, 31), None),
        ];
        let forward = cumulative(&monthly_counts(&issues));
        issues.reverse();
        let backward = cumulative(&monthly_counts(&issues));
        assert_eq!(forward, backward);

        for pair in forward.windows(2) {
            assert!(pair[0].total <= pair[1].total);
            assert!(pair[0].closed <= pair[1].closed);
        }
        let last = forward.last().unwrap();
        assert_eq!(last.total, Some(5));
        assert_eq!(last.closed, Some(3));
    }

    #[test]
    fn test_tally_states_ignores_unknown_states() {
        let mut issues = vec![
            issue(1, ts(2024, 1, 1), None),
            issue(2, ts(2024, 1, 1), None),
            issue(3, ts(2024, 1, 1), Some(ts(2024, 1, 2))),
        ];
        issues.push(Issue {
            state: "locked".to_string(),
            ..issue(4, ts(2024, 1, 1), None)
        });

        let tally = tally_states(&issues);
        assert_eq!(tally.open, Some(2));
        assert_eq!(tally.closed, Some(1));

        let only_open = tally_states(&issues[..2]);
        assert_eq!(only_open.closed, None);
    }

    #[test]
    fn test_summarize() {
        let report = summarize(vec![
            issue(1, ts(2024, 1, 1), None),
            issue(2, ts(2024, 2, 1), Some(ts(2024, 2, 3))),
        ]);
        assert_eq!(report.issues.len(), 2);
        assert_eq!(report.cumulative.len(), 2);
        assert_eq!(report.tally, StateTally { open: Some(1), closed: Some(1) });
    }
}
