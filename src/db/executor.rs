use duckdb::types::{TimeUnit, ValueRef};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// A fully materialized query result: columns in statement order, rows in
/// store-return order. Small enough to hold in session state; this system
/// never streams.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Executes one read statement and materializes every row. Raises on
/// malformed SQL or unknown columns; the caller reports without retry.
pub fn run_select(conn: &Connection, sql: &str) -> Result<ResultSet, duckdb::Error> {
    debug!("Executing SQL: {}", sql);

    let mut stmt = conn.prepare(sql)?;

    let column_count = stmt.column_count();
    let mut columns = Vec::with_capacity(column_count);
    for i in 0..column_count {
        if let Ok(name) = stmt.column_name(i) {
            columns.push(name.to_string());
        }
    }

    let mut result_rows = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(cell_to_json(row, i));
        }
        result_rows.push(values);
    }

    Ok(ResultSet {
        columns,
        rows: result_rows,
    })
}

// Converts one cell to JSON, falling back to DuckDB's string rendering for
// types with no native JSON shape (timestamps, decimals, huge ints).
fn cell_to_json(row: &duckdb::Row<'_>, idx: usize) -> Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Boolean(b)) => Value::Bool(b),
        Ok(ValueRef::TinyInt(v)) => json!(v),
        Ok(ValueRef::SmallInt(v)) => json!(v),
        Ok(ValueRef::Int(v)) => json!(v),
        Ok(ValueRef::BigInt(v)) => json!(v),
        Ok(ValueRef::UTinyInt(v)) => json!(v),
        Ok(ValueRef::USmallInt(v)) => json!(v),
        Ok(ValueRef::UInt(v)) => json!(v),
        Ok(ValueRef::UBigInt(v)) => json!(v),
        Ok(ValueRef::Float(v)) => json!(v),
        Ok(ValueRef::Double(v)) => json!(v),
        Ok(ValueRef::Text(t)) => Value::String(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Timestamp(unit, v)) => {
            let micros = match unit {
                TimeUnit::Second => v * 1_000_000,
                TimeUnit::Millisecond => v * 1_000,
                TimeUnit::Microsecond => v,
                TimeUnit::Nanosecond => v / 1_000,
            };
            match chrono::DateTime::from_timestamp_micros(micros) {
                Some(ts) => Value::String(ts.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string()),
                None => Value::Null,
            }
        }
        Ok(ValueRef::Date32(d)) => match chrono::DateTime::from_timestamp(d as i64 * 86_400, 0) {
            Some(ts) => Value::String(ts.date_naive().to_string()),
            None => Value::Null,
        },
        Ok(_) => match row.get::<_, String>(idx) {
            Ok(v) => Value::String(v),
            Err(_) => Value::Null,
        },
        Err(_) => Value::Null,
    }
}
