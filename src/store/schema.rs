//! Schema setup for the shopping list database
//!
//! There is no migration path between schema versions. When the version
//! recorded in `metadata` differs from [`SCHEMA_VERSION`] the items table is
//! dropped and recreated, discarding whatever it held.

use rusqlite::{params, Connection};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Apply connection settings and make sure the schema is current
pub fn init_schema(conn: &Connection, busy_timeout_ms: u64) -> anyhow::Result<()> {
    // WAL lets the reader pool run alongside the writer thread
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        "#,
    )?;
    conn.busy_timeout(std::time::Duration::from_millis(busy_timeout_ms))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT
        );
        "#,
    )?;

    let current_version = stored_version(conn)?;
    if current_version == SCHEMA_VERSION {
        return Ok(());
    }

    if current_version != 0 {
        tracing::warn!(
            "Schema version {} does not match {}, discarding stored items",
            current_version,
            SCHEMA_VERSION
        );
    }
    apply_schema(conn)?;
    Ok(())
}

/// Schema version recorded in `metadata`, 0 when none
pub fn stored_version(conn: &Connection) -> anyhow::Result<i32> {
    let version = conn.query_row(
        "SELECT COALESCE(
            (SELECT CAST(value AS INTEGER) FROM metadata WHERE key = 'schema_version'),
            0
        )",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        BEGIN;
        DROP TABLE IF EXISTS shopping_items;

        CREATE TABLE shopping_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            is_checked INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX idx_items_checked_id ON shopping_items(is_checked, id);
        COMMIT;
        "#,
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_gets_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 1000).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shopping_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 1000).unwrap();
        conn.execute(
            "INSERT INTO shopping_items (name, quantity, is_checked) VALUES ('Milk', 2, 0)",
            [],
        )
        .unwrap();

        init_schema(&conn, 1000).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shopping_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_version_mismatch_discards_items() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn, 1000).unwrap();
        conn.execute(
            "INSERT INTO shopping_items (name, quantity, is_checked) VALUES ('Milk', 2, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "UPDATE metadata SET value = '99' WHERE key = 'schema_version'",
            [],
        )
        .unwrap();

        init_schema(&conn, 1000).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM shopping_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(stored_version(&conn).unwrap(), SCHEMA_VERSION);
    }
}
