//! PostgreSQL key-value backend for profile and alert-state records.
//!
//! Schema (see sql/001_kv_records.sql):
//!
//!   rainwatch.kv_records(pk TEXT PRIMARY KEY, body TEXT NOT NULL, updated_at TIMESTAMPTZ)
//!
//! Compare-and-set is a single conditional statement, so two overlapping
//! runs cannot both apply a write computed from the same read.

use crate::store::{KvBackend, PutOutcome, StoreError};
use postgres::{Client, Config, NoTls};
use std::time::Duration;
use tracing::{debug, warn};

pub const SCHEMA: &str = "rainwatch";
pub const TABLE: &str = "kv_records";

pub const CREATE_TABLE_SQL: &str = "
    CREATE SCHEMA IF NOT EXISTS rainwatch;
    CREATE TABLE IF NOT EXISTS rainwatch.kv_records (
        pk         TEXT PRIMARY KEY,
        body       TEXT NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    );
";

const SELECT_SQL: &str = "SELECT body FROM rainwatch.kv_records WHERE pk = $1";

const INSERT_IF_ABSENT_SQL: &str = "
    INSERT INTO rainwatch.kv_records (pk, body, updated_at)
    VALUES ($1, $2, now())
    ON CONFLICT (pk) DO NOTHING
";

const UPDATE_IF_MATCHES_SQL: &str = "
    UPDATE rainwatch.kv_records
       SET body = $2, updated_at = now()
     WHERE pk = $1 AND body = $3
";

impl From<postgres::Error> for StoreError {
    fn from(e: postgres::Error) -> Self {
        StoreError::Database(Box::new(e))
    }
}

/// Opens a connection with bounded connect and statement timeouts.
pub fn connect(database_url: &str, timeout: Duration) -> Result<Client, StoreError> {
    let mut config: Config = database_url.parse()?;
    config
        .connect_timeout(timeout)
        .options(&format!("-c statement_timeout={}", timeout.as_millis()));
    Ok(config.connect(NoTls)?)
}

/// Connects and confirms the records table exists, so a missing migration
/// fails loudly at startup instead of on the first write.
pub fn connect_and_verify(database_url: &str, timeout: Duration) -> Result<Client, StoreError> {
    let mut client = connect(database_url, timeout)?;
    let row = client.query_one(
        "SELECT EXISTS (
             SELECT 1 FROM information_schema.tables
              WHERE table_schema = $1 AND table_name = $2
         )",
        &[&SCHEMA, &TABLE],
    )?;
    let exists: bool = row.get(0);
    if !exists {
        return Err(StoreError::Other(format!(
            "table {}.{} not found; apply sql/001_kv_records.sql",
            SCHEMA, TABLE
        )));
    }
    debug!("database schema verified");
    Ok(client)
}

pub struct PgBackend {
    client: Client,
}

impl PgBackend {
    pub fn new(client: Client) -> Self {
        PgBackend { client }
    }

    /// Creates the schema and table if absent. Used by the `init-db` command.
    pub fn ensure_schema(&mut self) -> Result<(), StoreError> {
        self.client.batch_execute(CREATE_TABLE_SQL)?;
        Ok(())
    }
}

impl KvBackend for PgBackend {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let row = self.client.query_opt(SELECT_SQL, &[&key])?;
        Ok(row.map(|r| r.get(0)))
    }

    fn conditional_put(
        &mut self,
        key: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        let affected = match expected {
            None => self.client.execute(INSERT_IF_ABSENT_SQL, &[&key, &value])?,
            Some(previous) => self
                .client
                .execute(UPDATE_IF_MATCHES_SQL, &[&key, &value, &previous])?,
        };
        if affected == 1 {
            Ok(PutOutcome::Applied)
        } else {
            warn!(key, "conditional write lost to a concurrent update");
            Ok(PutOutcome::Conflict)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_malformed_url_is_a_database_error_before_connecting() {
        let err = match connect("postgresql://localhost:notaport/rainwatch", Duration::from_secs(1)) {
            Ok(_) => panic!("a malformed URL must not connect"),
            Err(e) => e,
        };
        assert!(matches!(err, StoreError::Database(_)), "got {:?}", err);
        assert!(err.to_string().starts_with("database error:"));
        let source = err.source().expect("driver error kept as source");
        assert!(source.downcast_ref::<postgres::Error>().is_some());
    }
}
