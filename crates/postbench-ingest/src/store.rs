//! Relational store access.
//!
//! Wraps the SQLite connection setup and the write statements for the three
//! entity kinds. Insert-if-absent is spelled as an explicit presence check
//! (`INSERT … SELECT … WHERE NOT EXISTS`) rather than engine-specific
//! conflict clauses, so the same statements carry the idempotence contract on
//! any SQL engine.

use crate::Result;
use postbench_core::{Actor, Location, NormalizedRecord, Post};
use rusqlite::{Connection, ToSql};
use std::collections::HashSet;
use std::path::PathBuf;

/// SQLite's default upper bound on bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = 32_766;

/// Configuration for the relational store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/postbench.db"),
        }
    }
}

/// Open a connection with the pragmas every strategy runs under.
pub fn open_connection(config: &StoreConfig) -> Result<Connection> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(&config.db_path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
    )?;
    Ok(conn)
}

/// The three record kinds stored per post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Actor,
    Location,
    Post,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Actor => "actor",
            Self::Location => "location",
            Self::Post => "post",
        }
    }

    /// Column list in bind order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Actor => &[
                "id",
                "display_name",
                "handle",
                "description",
                "connection_count",
            ],
            Self::Location => &["location_id", "kind", "longitude", "latitude"],
            Self::Post => &[
                "created_at",
                "id",
                "text",
                "source_label",
                "reply_to_actor_id",
                "reply_to_handle",
                "reply_to_post_id",
                "repost_count",
                "contributors",
                "actor_id",
                "location_id",
            ],
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            Self::Actor | Self::Post => "id",
            Self::Location => "location_id",
        }
    }

    /// 1-based bind index of the key column.
    fn key_index(&self) -> usize {
        let key = self.key_column();
        self.columns()
            .iter()
            .position(|c| *c == key)
            .map_or(1, |idx| idx + 1)
    }
}

/// Single-row insert-if-absent statement for one entity kind.
pub fn insert_if_absent_sql(kind: EntityKind) -> String {
    let table = kind.table();
    let columns = kind.columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {table} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {} = ?{})",
        columns.join(", "),
        placeholders.join(", "),
        kind.key_column(),
        kind.key_index()
    )
}

/// Multi-row insert-if-absent statement for `rows` rows of one entity kind.
///
/// Keys must be unique within the rows bound to one statement.
pub fn insert_many_if_absent_sql(kind: EntityKind, rows: usize) -> String {
    let table = kind.table();
    let columns = kind.columns().join(", ");
    let row = format!("({})", vec!["?"; kind.columns().len()].join(", "));
    let values = vec![row.as_str(); rows].join(", ");
    let key = kind.key_column();
    format!(
        "WITH incoming ({columns}) AS (VALUES {values}) \
         INSERT INTO {table} ({columns}) SELECT {columns} FROM incoming \
         WHERE NOT EXISTS (SELECT 1 FROM {table} AS existing WHERE existing.{key} = incoming.{key})"
    )
}

/// Single-row write statements for the three entity kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatements {
    pub actor: String,
    pub location: String,
    pub post: String,
}

impl InsertStatements {
    /// Insert-if-absent statements for the fixed schema.
    pub fn standard() -> Self {
        Self {
            actor: insert_if_absent_sql(EntityKind::Actor),
            location: insert_if_absent_sql(EntityKind::Location),
            post: insert_if_absent_sql(EntityKind::Post),
        }
    }
}

impl Default for InsertStatements {
    fn default() -> Self {
        Self::standard()
    }
}

/// An entity that can be bound to its kind's insert statement.
pub trait EntityRow {
    const KIND: EntityKind;

    /// Primary key value.
    fn key(&self) -> &str;

    /// Values in [`EntityKind::columns`] order.
    fn bind_values(&self) -> Vec<&dyn ToSql>;
}

impl EntityRow for Actor {
    const KIND: EntityKind = EntityKind::Actor;

    fn key(&self) -> &str {
        &self.id
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.id as &dyn ToSql,
            &self.display_name,
            &self.handle,
            &self.description,
            &self.connection_count,
        ]
    }
}

impl EntityRow for Location {
    const KIND: EntityKind = EntityKind::Location;

    fn key(&self) -> &str {
        &self.location_id
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![&self.location_id as &dyn ToSql, &self.kind, &self.longitude, &self.latitude]
    }
}

impl EntityRow for Post {
    const KIND: EntityKind = EntityKind::Post;

    fn key(&self) -> &str {
        &self.id
    }

    fn bind_values(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.created_at as &dyn ToSql,
            &self.id,
            &self.text,
            &self.source_label,
            &self.reply_to_actor_id,
            &self.reply_to_handle,
            &self.reply_to_post_id,
            &self.repost_count,
            &self.contributors,
            &self.actor_id,
            &self.location_id,
        ]
    }
}

/// Execute one single-row statement. Returns the number of rows inserted (0 or 1).
pub fn write_row<T: EntityRow>(conn: &Connection, sql: &str, row: &T) -> Result<usize> {
    let mut stmt = conn.prepare_cached(sql)?;
    Ok(stmt.execute(row.bind_values().as_slice())?)
}

/// Write one record's entities, actor and location before the post that
/// references them.
pub fn write_record(
    conn: &Connection,
    statements: &InsertStatements,
    record: &NormalizedRecord,
) -> Result<()> {
    write_row(conn, &statements.actor, &record.actor)?;
    if let Some(location) = &record.location {
        write_row(conn, &statements.location, location)?;
    }
    write_row(conn, &statements.post, &record.post)?;
    Ok(())
}

/// Multi-row write of same-kind entities. Returns the number of rows inserted.
///
/// Rows repeating a key already seen in `rows` are dropped first, so the
/// first occurrence wins exactly as it does with per-record writes. The
/// write is split only when it would exceed [`MAX_BIND_PARAMS`].
pub fn write_many<T: EntityRow>(conn: &Connection, rows: &[T]) -> Result<usize> {
    let mut seen = HashSet::with_capacity(rows.len());
    let unique: Vec<&T> = rows.iter().filter(|row| seen.insert(row.key())).collect();
    if unique.is_empty() {
        return Ok(0);
    }

    let rows_per_statement = (MAX_BIND_PARAMS / T::KIND.columns().len()).max(1);
    let mut inserted = 0;

    for chunk in unique.chunks(rows_per_statement) {
        let sql = insert_many_if_absent_sql(T::KIND, chunk.len());
        let mut stmt = conn.prepare_cached(&sql)?;
        let params: Vec<&dyn ToSql> = chunk.iter().flat_map(|row| row.bind_values()).collect();
        inserted += stmt.execute(params.as_slice())?;
    }

    Ok(inserted)
}

/// Row counts of the three relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub actors: u64,
    pub locations: u64,
    pub posts: u64,
}

/// Count rows in each relation.
pub fn row_counts(conn: &Connection) -> Result<RowCounts> {
    let count = |table: &str| -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        let n: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    Ok(RowCounts {
        actors: count(EntityKind::Actor.table())?,
        locations: count(EntityKind::Location.table())?,
        posts: count(EntityKind::Post.table())?,
    })
}
