/// osquery result rows.
///
/// `osqueryi --json` prints a JSON array of flat objects. Column values are
/// almost always strings, even for numeric columns, so the accessors here
/// accept both representations.
use serde_json::{Map, Value};

/// One result row: column name to value.
pub type Row = Map<String, Value>;

/// Parse the stdout of `osqueryi --json`.
///
/// Empty output (some osquery builds print nothing for zero rows) is an empty
/// result set, not an error.
pub fn parse_rows(stdout: &str) -> Result<Vec<Row>, serde_json::Error> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed)
}

/// Read a column as an integer, accepting `"1"` as well as `1`.
pub fn field_i64(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}
