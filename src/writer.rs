//! Writes an issue report into the dashboard workbook.
//!
//! The workbook layout is fixed: the repository is read from the dashboard, the state counts
//! and the chart go back onto it, the cumulative series lands on the chart sheet and the open
//! issues on their own sheet.

use crate::config::RepoId;
use crate::error::ApiError;
use crate::metrics::{Issue, IssueReport, MonthlyPoint, StateTally};
use crate::workbook::{CellRef, CellValue, Picture, Workbook, WorkbookError};

pub const DASHBOARD_SHEET: &str = "Dashboard";
pub const ISSUES_SHEET: &str = "Open Issues";
pub const CHARTS_SHEET: &str = "Charts";

/// Name of the embedded chart picture, replaced on every run.
pub const CHART_NAME: &str = "time_series";

const REPO_CELL: &str = "B12";
const OPEN_COUNT_CELL: &str = "G3";
const CLOSED_COUNT_CELL: &str = "G7";
const CHART_DATA_ANCHOR: &str = "A1";
const ISSUES_ANCHOR: &str = "A1";
const CHART_ANCHOR: &str = "I2";

const MONTH_HEADER: &str = "Month";
const TOTAL_HEADER: &str = "Total Issues";
const CLOSED_HEADER: &str = "Closed Issues";

/// Columns of the issue dataset, in order.
const ISSUE_COLUMNS: [&str; 7] = [
    "id",
    "issue_url",
    "title",
    "state",
    "comments",
    "created_at",
    "closed_at",
];

/// Columns left out of the open issues table.
const HIDDEN_COLUMNS: [&str; 3] = ["id", "state", "closed_at"];

/// Checks the three dashboard sheets exist and reads the repository identifier.
pub fn read_repository(book: &impl Workbook) -> Result<RepoId, ApiError> {
    for sheet in [DASHBOARD_SHEET, ISSUES_SHEET, CHARTS_SHEET] {
        book.get_cell_value(sheet, CellRef::new(0, 0))?;
    }

    let value = book.get_cell_value(DASHBOARD_SHEET, REPO_CELL.parse()?)?;
    value
        .as_str()
        .and_then(|repo| repo.parse().ok())
        .ok_or(ApiError::InvalidRepository)
}

/// Applies the dashboard update: state counts, chart data, open issues table, then the chart.
pub fn write_report(
    book: &mut impl Workbook,
    report: &IssueReport,
    chart: &Picture,
) -> Result<(), WorkbookError> {
    write_tally(book, &report.tally)?;

    let anchor = CHART_DATA_ANCHOR.parse()?;
    book.clear_range(CHARTS_SHEET, anchor)?;
    book.write_range(CHARTS_SHEET, anchor, &series_table(&report.cumulative))?;

    let anchor = ISSUES_ANCHOR.parse()?;
    book.clear_range(ISSUES_SHEET, anchor)?;
    book.write_range(ISSUES_SHEET, anchor, &open_issues_table(&report.issues))?;

    book.embed_image(DASHBOARD_SHEET, CHART_ANCHOR.parse()?, chart)
}

fn write_tally(book: &mut impl Workbook, tally: &StateTally) -> Result<(), WorkbookError> {
    for (cell, count) in [(OPEN_COUNT_CELL, tally.open), (CLOSED_COUNT_CELL, tally.closed)] {
        book.write_range(DASHBOARD_SHEET, cell.parse()?, &[vec![CellValue::from(count)]])?;
    }
    Ok(())
}

/// The cumulative series with a header row, one row per month labelled by its last day.
pub fn series_table(series: &[MonthlyPoint]) -> Vec<Vec<CellValue>> {
    let header = vec![
        CellValue::from(MONTH_HEADER),
        CellValue::from(TOTAL_HEADER),
        CellValue::from(CLOSED_HEADER),
    ];

    std::iter::once(header)
        .chain(series.iter().map(|point| {
            vec![
                CellValue::from(point.month.end_date()),
                CellValue::from(point.total),
                CellValue::from(point.closed),
            ]
        }))
        .collect()
}

/// The open issues with a human-readable header row and the hidden columns removed.
pub fn open_issues_table(issues: &[Issue]) -> Vec<Vec<CellValue>> {
    let columns: Vec<&str> = ISSUE_COLUMNS
        .into_iter()
        .filter(|column| !HIDDEN_COLUMNS.contains(column))
        .collect();

    let header: Vec<CellValue> = columns
        .iter()
        .map(|column| CellValue::from(column_title(column)))
        .collect();

    std::iter::once(header)
        .chain(issues.iter().filter(|issue| issue.is_open()).map(|issue| {
            columns
                .iter()
                .map(|column| column_value(issue, column))
                .collect()
        }))
        .collect()
}

/// `created_at` becomes `Created at`.
fn column_title(column: &str) -> String {
    let spaced = column.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn column_value(issue: &Issue, column: &str) -> CellValue {
    match column {
        "id" => CellValue::from(issue.id),
        "issue_url" => CellValue::from(issue.issue_url.as_str()),
        "title" => CellValue::from(issue.title.as_str()),
        "state" => CellValue::from(issue.state.as_str()),
        "comments" => CellValue::from(issue.comments),
        "created_at" => CellValue::from(issue.created_at),
        "closed_at" => CellValue::from(issue.closed_at),
        _ => CellValue::Empty,
    }
}
