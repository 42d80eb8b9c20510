use duckdb::Connection;
use r2d2::ManageConnection;
use std::path::Path;

/// r2d2 adapter for DuckDB. Every handler takes a connection from the pool
/// and drops it when done, so the acquire/use/release cycle holds even when
/// a query errors mid-flight.
pub struct DuckDbConnectionManager {
    db_path: String,
}

impl DuckDbConnectionManager {
    pub fn new(db_path: String) -> Self {
        // The store lives in a subdirectory by default; create it so the
        // first open does not fail on a missing parent.
        if let Some(parent) = Path::new(&db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Self { db_path }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.db_path)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
