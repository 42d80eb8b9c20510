use duckdb::Connection;
use std::path::Path;
use tracing::info;

use crate::llm::schema::ORDERS_TABLE;

/// One-shot load of a delimited export into the orders table, replacing
/// whatever was there. This is the only code path that writes to the store;
/// the query surface never does.
pub fn seed_orders(conn: &Connection, csv_path: &Path) -> Result<usize, duckdb::Error> {
    let path = csv_path.to_string_lossy().replace('\'', "''");

    info!("Loading {} into table \"{}\"", csv_path.display(), ORDERS_TABLE);
    conn.execute_batch(&format!(
        "CREATE OR REPLACE TABLE \"{}\" AS SELECT * FROM read_csv_auto('{}', HEADER=TRUE)",
        ORDERS_TABLE, path
    ))?;

    let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM \"{}\"", ORDERS_TABLE))?;
    let count: i64 = stmt.query_row([], |row| row.get(0))?;

    Ok(count as usize)
}

/// Builds a small orders table for tests: `total` rows, the first `german`
/// of them from Germany, the rest from the United Kingdom.
#[cfg(test)]
pub fn create_orders_fixture(
    conn: &Connection,
    total: usize,
    german: usize,
) -> Result<(), duckdb::Error> {
    use crate::llm::schema::ORDERS_DDL;

    conn.execute_batch(ORDERS_DDL)?;

    for i in 0..total {
        let country = if i < german { "Germany" } else { "United Kingdom" };
        conn.execute(
            "INSERT INTO \"orders\" VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            duckdb::params![
                format!("5{:05}", i),
                format!("8512{}", i),
                format!("ITEM {}", i),
                (i as i64 + 1) * 4,
                "2010-12-01 08:26:00",
                2.55 + i as f64,
                17850.0 + i as f64,
                country,
            ],
        )?;
    }

    Ok(())
}
