//! A small ordered table of JSON values.
//!
//! Used both as input to the artifact store (logged tables are persisted as
//! `table.csv` under their content hash) and as the output shape of grouped
//! latest queries.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered columns plus rows of JSON values.
///
/// # Examples
///
/// ```
/// use runlog::Table;
/// use serde_json::json;
///
/// let mut table = Table::new(["input", "output"]);
/// table.add_row([json!("hello"), json!("world")]);
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.cell(0, "output"), Some(&json!("world")));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Table {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Shorter rows are padded with nulls, longer rows truncated
    /// to the column count.
    pub fn add_row<I: IntoIterator<Item = Value>>(&mut self, values: I) {
        let mut row: Vec<Value> = values.into_iter().take(self.columns.len()).collect();
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell lookup by row index and column name.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col)
    }

    /// Canonical byte serialization used for content hashing: compact JSON of
    /// columns and rows. Two tables with equal columns and values hash equally
    /// regardless of how they were built.
    pub(crate) fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Render as CSV with a header row.
    ///
    /// Scalars are rendered bare (strings unquoted unless they need escaping),
    /// nested values as their JSON text.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        write_csv_record(&mut out, self.columns.iter().map(String::as_str));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            write_csv_record(&mut out, cells.iter().map(String::as_str));
        }
        out
    }

    /// Parse a CSV document produced by [`Table::to_csv`].
    ///
    /// Cells that parse as JSON scalars (numbers, booleans, null, quoted
    /// structures) come back typed; everything else comes back as a string.
    pub fn from_csv(text: &str) -> Table {
        let mut records = parse_csv(text).into_iter();
        let Some(header) = records.next() else {
            return Table::default();
        };
        let mut table = Table::new(header);
        for record in records {
            table.add_row(record.iter().map(|cell| parse_cell(cell)));
        }
        table
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(cell) {
        Ok(v) => v,
        Err(_) => Value::String(cell.to_string()),
    }
}

fn write_csv_record<'a, I: Iterator<Item = &'a str>>(out: &mut String, fields: I) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            for ch in field.chars() {
                if ch == '"' {
                    out.push('"');
                }
                out.push(ch);
            }
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push('\n');
}

fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(ch),
            }
        } else {
            match ch {
                '"' => in_quotes = true,
                ',' => record.push(std::mem::take(&mut field)),
                '\r' => {}
                '\n' => {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                _ => field.push(ch),
            }
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_roundtrip() {
        let mut table = Table::new(["name", "score", "note"]);
        table.add_row([json!("plain"), json!(1), json!("ok")]);
        table.add_row([json!("comma, inside"), json!(2.5), json!("say \"hi\"")]);
        table.add_row([json!("multi\nline"), json!(null), json!(true)]);

        let parsed = Table::from_csv(&table.to_csv());
        assert_eq!(parsed, table);
    }

    #[test]
    fn short_rows_are_padded() {
        let mut table = Table::new(["a", "b"]);
        table.add_row([json!(1)]);
        assert_eq!(table.cell(0, "b"), Some(&Value::Null));
    }

    #[test]
    fn canonical_bytes_ignore_construction_history() {
        let mut a = Table::new(["x"]);
        a.add_row([json!(1)]);
        let mut b = Table::new(["x"]);
        b.add_row([json!(1)]);
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn empty_csv_parses_to_empty_table() {
        assert!(Table::from_csv("").is_empty());
    }
}
