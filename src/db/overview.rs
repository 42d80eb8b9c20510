use duckdb::Connection;
use serde::Serialize;
use tracing::debug;

const HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Serialize)]
pub struct ColumnStats {
    pub name: String,
    pub data_type: String,
    pub nulls: usize,
    pub distinct: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Fixed-width histogram of one numeric column. `counts[i]` covers
/// `[min + i * bin_width, min + (i + 1) * bin_width)`, last bin inclusive.
#[derive(Debug, Serialize)]
pub struct Histogram {
    pub column: String,
    pub min: f64,
    pub max: f64,
    pub bin_width: f64,
    pub counts: Vec<u64>,
}

#[derive(Debug, Serialize)]
pub struct TableOverview {
    pub table: String,
    pub row_count: usize,
    pub columns: Vec<ColumnSchema>,
    pub stats: Vec<ColumnStats>,
    pub histograms: Vec<Histogram>,
}

/// Descriptive statistics for the overview tab, computed entirely with
/// read statements against the store.
pub fn table_overview(conn: &Connection, table: &str) -> Result<TableOverview, duckdb::Error> {
    let columns = table_columns(conn, table)?;

    let mut stmt = conn.prepare(&format!("SELECT COUNT(*) FROM {}", quote_ident(table)))?;
    let row_count: i64 = stmt.query_row([], |row| row.get(0))?;
    let row_count = row_count as usize;

    let mut stats = Vec::with_capacity(columns.len());
    let mut histograms = Vec::new();

    for column in &columns {
        let numeric = is_numeric_type(&column.data_type);
        let col = quote_ident(&column.name);
        let tbl = quote_ident(table);

        let mut stmt = conn.prepare(&format!(
            "SELECT COUNT({col}), COUNT(DISTINCT {col}) FROM {tbl}"
        ))?;
        let (non_null, distinct): (i64, i64) =
            stmt.query_row([], |row| Ok((row.get(0)?, row.get(1)?)))?;

        let (min, max, mean) = if numeric {
            let mut stmt = conn.prepare(&format!(
                "SELECT CAST(MIN({col}) AS DOUBLE), CAST(MAX({col}) AS DOUBLE), CAST(AVG({col}) AS DOUBLE) FROM {tbl}"
            ))?;
            stmt.query_row([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        } else {
            (None, None, None)
        };

        stats.push(ColumnStats {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
            nulls: row_count - non_null as usize,
            distinct: distinct as usize,
            min,
            max,
            mean,
        });

        if let (Some(lo), Some(hi)) = (min, max) {
            if non_null > 0 {
                histograms.push(column_histogram(conn, table, &column.name, lo, hi, non_null as u64)?);
            }
        }
    }

    debug!("Computed overview for {}: {} rows, {} columns", table, row_count, columns.len());

    Ok(TableOverview {
        table: table.to_string(),
        row_count,
        columns,
        stats,
        histograms,
    })
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnSchema>, duckdb::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let column_iter = stmt.query_map([], |row| {
        Ok(ColumnSchema {
            name: row.get(1)?,
            data_type: row.get(2)?,
            nullable: row.get::<_, bool>(3).map(|notnull| !notnull).unwrap_or(true),
        })
    })?;

    column_iter.collect()
}

fn column_histogram(
    conn: &Connection,
    table: &str,
    column: &str,
    min: f64,
    max: f64,
    non_null: u64,
) -> Result<Histogram, duckdb::Error> {
    // A constant column collapses into a single bin
    if max <= min {
        return Ok(Histogram {
            column: column.to_string(),
            min,
            max,
            bin_width: 0.0,
            counts: vec![non_null],
        });
    }

    let bin_width = (max - min) / HISTOGRAM_BINS as f64;
    let col = quote_ident(column);
    let sql = format!(
        "SELECT CAST(LEAST(FLOOR((CAST({col} AS DOUBLE) - {min:?}) / {bin_width:?}), {top}) AS INTEGER) AS bin, COUNT(*) \
         FROM {tbl} WHERE {col} IS NOT NULL GROUP BY bin ORDER BY bin",
        tbl = quote_ident(table),
        top = HISTOGRAM_BINS - 1,
    );

    let mut counts = vec![0u64; HISTOGRAM_BINS];
    let mut stmt = conn.prepare(&sql)?;
    let bin_iter = stmt.query_map([], |row| {
        Ok((row.get::<_, i32>(0)?, row.get::<_, i64>(1)?))
    })?;
    for entry in bin_iter {
        let (bin, count) = entry?;
        if (0..HISTOGRAM_BINS as i32).contains(&bin) {
            counts[bin as usize] = count as u64;
        }
    }

    Ok(Histogram {
        column: column.to_string(),
        min,
        max,
        bin_width,
        counts,
    })
}

fn is_numeric_type(data_type: &str) -> bool {
    let upper = data_type.to_uppercase();
    ["INT", "FLOAT", "DOUBLE", "REAL", "DECIMAL", "NUMERIC"]
        .iter()
        .any(|t| upper.contains(t))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
