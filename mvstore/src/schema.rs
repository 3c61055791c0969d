//! Création et mise à niveau du schéma SQLite

use crate::error::Result;
use rusqlite::Connection;
use tracing::info;

/// Colonnes ajoutées après la première version du schéma
const ADDED_COLUMNS: [(&str, &str); 3] = [
    ("version", "INTEGER NOT NULL DEFAULT 0"),
    ("sync_state", "TEXT NOT NULL DEFAULT 'synced'"),
    ("updated_at", "TEXT"),
];

/// Crée les tables si nécessaire et complète un schéma ancien
pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;

         CREATE TABLE IF NOT EXISTS asset_metadata (
             id TEXT PRIMARY KEY,
             record TEXT NOT NULL,
             version INTEGER NOT NULL DEFAULT 0,
             sync_state TEXT NOT NULL DEFAULT 'synced',
             updated_at TEXT
         );

         CREATE TABLE IF NOT EXISTS asset_payloads (
             asset_id TEXT NOT NULL,
             slot TEXT NOT NULL,
             file_name TEXT NOT NULL,
             content_type TEXT,
             data BLOB NOT NULL,
             PRIMARY KEY (asset_id, slot)
         );

         CREATE TABLE IF NOT EXISTS asset_tombstones (
             id TEXT PRIMARY KEY,
             deleted_at TEXT NOT NULL
         );",
    )?;

    let existing = column_names(conn, "asset_metadata")?;
    for (column, definition) in ADDED_COLUMNS {
        if !existing.iter().any(|c| c == column) {
            conn.execute(
                &format!("ALTER TABLE asset_metadata ADD COLUMN {column} {definition}"),
                [],
            )?;
            info!(column, "Added missing column to asset_metadata");
        }
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_asset_metadata_state ON asset_metadata (sync_state)",
        [],
    )?;

    Ok(())
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("SELECT name FROM pragma_table_info('{table}')"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let columns = column_names(&conn, "asset_metadata").unwrap();
        assert!(columns.contains(&"sync_state".to_string()));
    }

    #[test]
    fn test_old_schema_is_completed() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute(
            "CREATE TABLE asset_metadata (id TEXT PRIMARY KEY, record TEXT NOT NULL)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO asset_metadata (id, record) VALUES ('a1', '{}')",
            [],
        )
        .unwrap();

        init(&conn).unwrap();

        let (version, state): (i64, String) = conn
            .query_row(
                "SELECT version, sync_state FROM asset_metadata WHERE id = 'a1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(version, 0);
        assert_eq!(state, "synced");
    }
}
