use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::error::{ScoringError, ScoringResult};
use crate::table::Table;

pub const WEEK_STARTING_COLUMN: &str = "WeekStarting";
pub const WEEK_NUMBER_COLUMN: &str = "week_number";

/// Columns removed before scoring. Missing ones are ignored.
pub const DROPPED_COLUMNS: [&str; 3] = [WEEK_STARTING_COLUMN, "Revenue", "Quantity"];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// Turns a raw record into the feature shape the forecasting model expects.
///
/// `WeekStarting` becomes a zero-padded `week_number` (`%U`: Sunday starts a
/// week, days before the year's first Sunday are week `00`), appended as the
/// last column. `WeekStarting`, `Revenue` and `Quantity` are then dropped.
pub fn preprocess(mut table: Table) -> ScoringResult<Table> {
    if let Some(dates) = table.column(WEEK_STARTING_COLUMN) {
        let week_numbers = dates
            .iter()
            .enumerate()
            .map(|(row, cell)| {
                parse_date_cell(cell)
                    .map(|date| Value::String(week_number(date)))
                    .ok_or_else(|| {
                        ScoringError::schema(format!(
                            "column '{WEEK_STARTING_COLUMN}' row {row}: cannot parse {cell} as a date"
                        ))
                    })
            })
            .collect::<ScoringResult<Vec<Value>>>()?;
        table.remove_column(WEEK_NUMBER_COLUMN);
        table.insert_column(WEEK_NUMBER_COLUMN, week_numbers)?;
    }

    for column in DROPPED_COLUMNS {
        table.remove_column(column);
    }
    Ok(table)
}

/// Week of the year with Sunday as the first day of the week, `"00"`..`"53"`.
pub fn week_number(date: NaiveDate) -> String {
    date.format("%U").to_string()
}

fn parse_date_cell(cell: &Value) -> Option<NaiveDate> {
    let text = cell.as_str()?.trim();
    if text.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|value| value.date())
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|value| value.date_naive())
        })
}
