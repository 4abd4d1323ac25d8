//! SQLite schema for the actor / location / post relations.
//!
//! [`ensure_schema`] is idempotent and never drops or alters existing data,
//! so it is safe to call before every benchmark run.

use crate::{Error, Result};
use rusqlite::Connection;

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 1;

/// Create the three relations if they do not exist yet.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(Error::SchemaVersion {
            found: current_version,
            supported: SCHEMA_VERSION,
        });
    }

    create_tables(conn)?;
    if current_version < SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    match conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    }) {
        Ok(version) => Ok(version),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS actor (
            id VARCHAR(70) NOT NULL PRIMARY KEY,
            display_name VARCHAR(100),
            handle VARCHAR(70),
            description VARCHAR(5000),
            connection_count INTEGER
        );

        CREATE TABLE IF NOT EXISTS location (
            location_id VARCHAR(255) NOT NULL PRIMARY KEY,
            kind VARCHAR(50),
            longitude REAL,
            latitude REAL
        );

        CREATE TABLE IF NOT EXISTS post (
            created_at VARCHAR(70),
            id VARCHAR(70) NOT NULL PRIMARY KEY,
            text VARCHAR(300),
            source_label VARCHAR(500),
            reply_to_actor_id VARCHAR(70),
            reply_to_handle VARCHAR(70),
            reply_to_post_id VARCHAR(70),
            repost_count INTEGER,
            contributors TEXT,
            actor_id VARCHAR(70) NOT NULL,
            location_id VARCHAR(255),

            FOREIGN KEY(actor_id) REFERENCES actor(id),
            FOREIGN KEY(location_id) REFERENCES location(location_id)
        );

        -- The aggregation join reads post by actor and location
        CREATE INDEX IF NOT EXISTS idx_post_actor ON post(actor_id);
        CREATE INDEX IF NOT EXISTS idx_post_location ON post(location_id);
        "#,
    )?;

    Ok(())
}
