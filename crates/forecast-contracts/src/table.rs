use std::io::{Read, Write};

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Number, Value};

use crate::error::{ScoringError, ScoringResult};

/// Column-oriented scoring record: ordered named columns over ordered rows.
///
/// Every column holds exactly `row_count()` cells. Cells are JSON values so a
/// table built from a CSV file and one built from a request payload look the
/// same to the preprocessor and the model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: IndexMap<String, Vec<Value>>,
    rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: IndexMap<String, Vec<Value>>) -> ScoringResult<Self> {
        let rows = columns.values().next().map(Vec::len).unwrap_or(0);
        if let Some((name, values)) = columns.iter().find(|(_, values)| values.len() != rows) {
            return Err(ScoringError::schema(format!(
                "column '{name}' has {} values, expected {rows}",
                values.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Sets a column, replacing an existing one in place or appending a new one.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> ScoringResult<()> {
        let name = name.into();
        if self.columns.is_empty() {
            self.rows = values.len();
        } else if values.len() != self.rows {
            return Err(ScoringError::schema(format!(
                "column '{name}' has {} values, expected {}",
                values.len(),
                self.rows
            )));
        }
        self.columns.insert(name, values);
        Ok(())
    }

    /// Removes a column if present, keeping the order of the others.
    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Value>> {
        self.columns.shift_remove(name)
    }

    /// Appends the rows of `other`, which must carry the same columns in the same order.
    pub fn append(&mut self, other: Table) -> ScoringResult<()> {
        if self.columns.is_empty() {
            *self = other;
            return Ok(());
        }
        let ours = self.column_names().collect::<Vec<&str>>();
        let theirs = other.column_names().collect::<Vec<&str>>();
        if ours != theirs {
            return Err(ScoringError::schema(format!(
                "cannot append table with columns {theirs:?} to table with columns {ours:?}"
            )));
        }
        for (name, values) in other.columns {
            if let Some(column) = self.columns.get_mut(&name) {
                column.extend(values);
            }
        }
        self.rows += other.rows;
        Ok(())
    }

    /// Builds a table from the `data` value of a scoring request.
    ///
    /// Accepts either a column mapping (`{"col": [v0, v1]}` or
    /// `{"col": {"0": v0, "1": v1}}`) or a list of row objects.
    pub fn from_payload(data: &Value) -> ScoringResult<Self> {
        match data {
            Value::Object(columns) => table_from_column_mapping(columns),
            Value::Array(rows) => table_from_row_objects(rows),
            _ => Err(ScoringError::invalid_payload(
                "'data' must be an object of columns or a list of row objects",
            )),
        }
    }

    pub fn read_csv<R: Read>(reader: R) -> ScoringResult<Self> {
        let mut reader = csv::Reader::from_reader(reader);
        let headers = reader.headers()?.clone();
        let mut columns = headers
            .iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect::<IndexMap<String, Vec<Value>>>();
        if columns.len() != headers.len() {
            return Err(ScoringError::schema("csv header contains duplicate column names"));
        }

        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            for (values, field) in columns.values_mut().zip(record.iter()) {
                values.push(parse_csv_cell(field));
            }
            rows += 1;
        }
        Ok(Self { columns, rows })
    }

    /// Writes a header row and one line per row, without an index column.
    pub fn write_csv<W: Write>(&self, writer: W) -> ScoringResult<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(self.columns.keys())?;
        for row in 0..self.rows {
            writer.write_record(self.columns.values().map(|values| format_csv_cell(&values[row])))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Numeric view of a cell: numbers as-is, numeric strings parsed.
pub fn cell_as_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Text view of a scalar cell, `None` for nulls and nested values.
pub fn cell_as_text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn table_from_column_mapping(columns: &Map<String, Value>) -> ScoringResult<Table> {
    let mut positional = true;
    for (name, values) in columns {
        match values {
            Value::Array(_) => {}
            Value::Object(_) => positional = false,
            _ => {
                return Err(ScoringError::schema(format!(
                    "column '{name}' must be a list of values or an index mapping"
                )))
            }
        }
    }

    if positional {
        let parsed = columns
            .iter()
            .map(|(name, values)| {
                let values = values.as_array().cloned().unwrap_or_default();
                (name.clone(), values)
            })
            .collect::<IndexMap<String, Vec<Value>>>();
        return Table::from_columns(parsed);
    }

    // Index mappings align on their labels; list columns use positional labels.
    let labelled = columns
        .iter()
        .map(|(name, values)| {
            let cells = match values {
                Value::Object(map) => map
                    .iter()
                    .map(|(label, value)| (label.clone(), value.clone()))
                    .collect::<Vec<(String, Value)>>(),
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(idx, value)| (idx.to_string(), value.clone()))
                    .collect(),
                _ => Vec::new(),
            };
            (name.clone(), cells)
        })
        .collect::<Vec<(String, Vec<(String, Value)>)>>();

    let mut index = IndexSet::<String>::new();
    for (_, cells) in &labelled {
        for (label, _) in cells {
            index.insert(label.clone());
        }
    }

    let mut parsed = IndexMap::new();
    for (name, cells) in labelled {
        let lookup = cells.into_iter().collect::<IndexMap<String, Value>>();
        let values = index
            .iter()
            .map(|label| lookup.get(label).cloned().unwrap_or(Value::Null))
            .collect::<Vec<Value>>();
        parsed.insert(name, values);
    }
    Table::from_columns(parsed)
}

fn table_from_row_objects(rows: &[Value]) -> ScoringResult<Table> {
    let mut names = IndexSet::<String>::new();
    for (idx, row) in rows.iter().enumerate() {
        let Some(row) = row.as_object() else {
            return Err(ScoringError::schema(format!("row {idx} is not an object")));
        };
        for name in row.keys() {
            names.insert(name.clone());
        }
    }

    let mut columns = IndexMap::new();
    for name in &names {
        let values = rows
            .iter()
            .map(|row| row.get(name).cloned().unwrap_or(Value::Null))
            .collect::<Vec<Value>>();
        columns.insert(name.clone(), values);
    }
    Ok(Table {
        columns,
        rows: rows.len(),
    })
}

fn parse_csv_cell(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(value) = field.parse::<i64>() {
        return Value::Number(value.into());
    }
    if let Some(number) = field
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .and_then(Number::from_f64)
    {
        return Value::Number(number);
    }
    Value::String(field.to_string())
}

fn format_csv_cell(cell: &Value) -> String {
    match cell {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Array(_) | Value::Object(_) => cell.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    use super::{cell_as_f64, Table};
    use crate::error::ScoringError;

    fn names(table: &Table) -> Vec<&str> {
        table.column_names().collect()
    }

    #[test]
    fn payload_column_mapping_keeps_column_order() -> anyhow::Result<()> {
        let table = Table::from_payload(&json!({
            "WeekStarting": ["2021-01-03", "2021-01-10"],
            "feature1": [5, 6],
            "Store": ["a", "b"],
        }))?;
        assert_eq!(names(&table), vec!["WeekStarting", "feature1", "Store"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("feature1"), Some(&[json!(5), json!(6)][..]));
        Ok(())
    }

    #[test]
    fn payload_row_objects_fill_missing_cells_with_null() -> anyhow::Result<()> {
        let table = Table::from_payload(&json!([
            {"feature1": 1, "Store": "a"},
            {"feature1": 2},
        ]))?;
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("Store"), Some(&[json!("a"), Value::Null][..]));
        Ok(())
    }

    #[test]
    fn payload_index_mappings_align_on_labels() -> anyhow::Result<()> {
        let table = Table::from_payload(&json!({
            "feature1": {"0": 1, "1": 2},
            "feature2": {"1": 20, "0": 10},
        }))?;
        assert_eq!(table.column("feature2"), Some(&[json!(10), json!(20)][..]));
        Ok(())
    }

    #[test]
    fn payload_rejects_ragged_columns_and_scalars() {
        let ragged = Table::from_payload(&json!({"a": [1, 2], "b": [1]}));
        assert!(matches!(ragged, Err(ScoringError::Schema(_))));

        let scalar = Table::from_payload(&json!({"a": 1}));
        assert!(matches!(scalar, Err(ScoringError::Schema(_))));

        let text = Table::from_payload(&json!("rows"));
        assert!(matches!(text, Err(ScoringError::InvalidPayload(_))));
    }

    #[test]
    fn csv_round_trip_infers_numbers_and_nulls() -> anyhow::Result<()> {
        let raw = "Store,Quantity,Price,Note\n2,100,1.5,\n5,200,2.25,promo\n";
        let table = Table::read_csv(raw.as_bytes())?;
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column("Quantity"), Some(&[json!(100), json!(200)][..]));
        assert_eq!(table.column("Note"), Some(&[Value::Null, json!("promo")][..]));

        let mut out = Vec::new();
        table.write_csv(&mut out)?;
        assert_eq!(String::from_utf8(out)?, raw);
        Ok(())
    }

    #[test]
    fn insert_column_rejects_misaligned_values() -> anyhow::Result<()> {
        let mut columns = IndexMap::new();
        columns.insert("a".to_string(), vec![json!(1), json!(2)]);
        let mut table = Table::from_columns(columns)?;

        let err = table.insert_column("forecast", vec![json!(1.0)]);
        assert!(matches!(err, Err(ScoringError::Schema(_))));

        table.insert_column("forecast", vec![json!(1.0), json!(2.0)])?;
        assert_eq!(names(&table), vec!["a", "forecast"]);
        Ok(())
    }

    #[test]
    fn append_requires_matching_headers() -> anyhow::Result<()> {
        let mut first = Table::read_csv("a,b\n1,2\n".as_bytes())?;
        first.append(Table::read_csv("a,b\n3,4\n".as_bytes())?)?;
        assert_eq!(first.row_count(), 2);
        assert_eq!(first.column("a"), Some(&[json!(1), json!(3)][..]));

        let err = first.append(Table::read_csv("b,a\n5,6\n".as_bytes())?);
        assert!(matches!(err, Err(ScoringError::Schema(_))));
        Ok(())
    }

    #[test]
    fn numeric_cells_accept_numeric_strings() {
        assert_eq!(cell_as_f64(&json!(2)), Some(2.0));
        assert_eq!(cell_as_f64(&json!(" 2.5 ")), Some(2.5));
        assert_eq!(cell_as_f64(&json!("n/a")), None);
        assert_eq!(cell_as_f64(&Value::Null), None);
    }
}
