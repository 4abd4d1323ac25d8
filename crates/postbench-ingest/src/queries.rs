//! Ad hoc query reporting.
//!
//! Runs a list of named statements against the store and reports how long
//! each one took. Statements that change the schema or the data are committed;
//! queries fetch the first value of their first row.

use crate::Result;
use rusqlite::Connection;
use rusqlite::types::Value;
use serde::Serialize;
use std::time::{Duration, Instant};

/// What a statement does, judged by its first keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// CREATE, DROP, ALTER.
    Definition,
    /// INSERT, UPDATE, DELETE, REPLACE.
    Modification,
    /// Anything that returns rows.
    Query,
}

impl StatementKind {
    /// Classify on the first keyword after leading whitespace and comments.
    pub fn classify(sql: &str) -> Self {
        let keyword = first_keyword(sql).to_ascii_uppercase();
        match keyword.as_str() {
            "CREATE" | "DROP" | "ALTER" => StatementKind::Definition,
            "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Modification,
            _ => StatementKind::Query,
        }
    }

    pub fn commits(&self) -> bool {
        !matches!(self, StatementKind::Query)
    }
}

fn first_keyword(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    &rest[..end]
}

/// A statement with a human-readable description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedQuery {
    pub description: String,
    pub sql: String,
}

impl NamedQuery {
    pub fn new(description: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            sql: sql.into(),
        }
    }
}

/// Timing and outcome of one statement.
#[derive(Debug, Clone, Serialize)]
pub struct QueryTiming {
    pub description: String,
    pub kind: StatementKind,
    pub elapsed: Duration,
    /// First column of the first row, rendered as text (queries only).
    pub first_value: Option<String>,
    /// Rows changed (modifications only).
    pub rows_changed: Option<usize>,
}

/// Timings for a whole list of statements.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryReport {
    pub timings: Vec<QueryTiming>,
    pub total: Duration,
}

/// Row count of each relation.
pub fn row_count_queries() -> Vec<NamedQuery> {
    vec![
        NamedQuery::new("Actor row count", "SELECT COUNT(DISTINCT id) FROM actor"),
        NamedQuery::new(
            "Location row count",
            "SELECT COUNT(DISTINCT location_id) FROM location",
        ),
        NamedQuery::new("Post row count", "SELECT COUNT(DISTINCT id) FROM post"),
    ]
}

/// Materialize every post joined with its actor and location, then count it.
pub fn joined_table_queries() -> Vec<NamedQuery> {
    vec![
        NamedQuery::new(
            "Create joined table",
            "CREATE TABLE IF NOT EXISTS post_joined AS
             SELECT post.*,
                    actor.display_name AS actor_display_name,
                    actor.handle AS actor_handle,
                    actor.description AS actor_description,
                    actor.connection_count AS actor_connection_count,
                    location.kind AS location_kind,
                    location.longitude,
                    location.latitude
             FROM post
             LEFT JOIN actor ON post.actor_id = actor.id
             LEFT JOIN location ON post.location_id = location.location_id",
        ),
        NamedQuery::new("Count joined rows", "SELECT COUNT(*) FROM post_joined"),
    ]
}

/// Run `queries` in order, committing definitions and modifications.
pub fn execute_and_report(conn: &Connection, queries: &[NamedQuery]) -> Result<QueryReport> {
    let total_start = Instant::now();
    let mut timings = Vec::with_capacity(queries.len());

    for query in queries {
        let kind = StatementKind::classify(&query.sql);
        let start = Instant::now();

        let (first_value, rows_changed) = if kind.commits() {
            let tx = conn.unchecked_transaction()?;
            let changed = tx.execute(&query.sql, [])?;
            tx.commit()?;
            tracing::info!("{} - completed", query.description);
            (None, (kind == StatementKind::Modification).then_some(changed))
        } else {
            let mut stmt = conn.prepare(&query.sql)?;
            let mut rows = stmt.query([])?;
            let value = match rows.next()? {
                Some(row) => Some(render(row.get::<_, Value>(0)?)),
                None => None,
            };
            tracing::info!(
                "{} - result: {}",
                query.description,
                value.as_deref().unwrap_or("(no rows)")
            );
            (value, None)
        };

        let elapsed = start.elapsed();
        tracing::debug!("{} took {:.4}s", query.description, elapsed.as_secs_f64());
        timings.push(QueryTiming {
            description: query.description.clone(),
            kind,
            elapsed,
            first_value,
            rows_changed,
        });
    }

    let total = total_start.elapsed();
    tracing::info!(
        "Ran {} statements in {:.4}s",
        timings.len(),
        total.as_secs_f64()
    );
    Ok(QueryReport { timings, total })
}

fn render(value: Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => format!("<{} bytes>", b.len()),
    }
}
