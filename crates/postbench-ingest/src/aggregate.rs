//! Derived-aggregation benchmark: mean coordinates per actor, three ways.
//!
//! - `declarative`: a join plus `GROUP BY` in the store, so the cost is
//!   query planning and execution.
//! - `structured-pass`: decode every line as JSON and accumulate in memory,
//!   so the cost is decoding.
//! - `pattern-pass`: locate the top-level `user` and `geo` members by
//!   scanning the raw text, then match their fields with regular
//!   expressions, so the cost is text scanning rather than decoding.
//!
//! The two passes build per-actor coordinate lists and stop there; the
//! declarative method steps through every result row. All three must be run
//! against the same data file and the same iteration counts to compare.

use crate::results::BenchmarkResults;
use crate::store::{StoreConfig, open_connection};
use crate::{Error, Result};
use postbench_core::{NULL_SENTINEL, canonical_text, coordinates};
use regex::Regex;
use rusqlite::Connection;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

/// Mean longitude and latitude per actor, over posts that have a location.
pub const ACTOR_MEAN_LOCATION_SQL: &str = "\
SELECT post.actor_id, AVG(location.longitude), AVG(location.latitude)
FROM post
INNER JOIN location ON post.location_id = location.location_id
GROUP BY post.actor_id";

const STORED_COORDINATES_SQL: &str = "\
SELECT post.actor_id, location.longitude, location.latitude
FROM post
INNER JOIN location ON post.location_id = location.location_id
ORDER BY post.rowid";

/// Ways of computing the per-actor mean location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationMethod {
    Declarative,
    StructuredPass,
    PatternPass,
}

impl AggregationMethod {
    pub const ALL: [AggregationMethod; 3] = [
        AggregationMethod::Declarative,
        AggregationMethod::StructuredPass,
        AggregationMethod::PatternPass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Declarative => "declarative",
            AggregationMethod::StructuredPass => "structured-pass",
            AggregationMethod::PatternPass => "pattern-pass",
        }
    }
}

impl FromStr for AggregationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AggregationMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| Error::UnknownMethod(s.to_string()))
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates seen for one actor, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateLists {
    pub longitudes: Vec<f64>,
    pub latitudes: Vec<f64>,
}

impl CoordinateLists {
    pub fn push(&mut self, longitude: f64, latitude: f64) {
        self.longitudes.push(longitude);
        self.latitudes.push(latitude);
    }

    /// Mean `(longitude, latitude)`, or `None` when empty.
    pub fn mean(&self) -> Option<(f64, f64)> {
        if self.longitudes.is_empty() {
            return None;
        }
        let n = self.longitudes.len() as f64;
        Some((
            self.longitudes.iter().sum::<f64>() / n,
            self.latitudes.iter().sum::<f64>() / n,
        ))
    }
}

/// Per-actor coordinate lists keyed by actor id.
pub type ActorCoordinates = HashMap<String, CoordinateLists>;

/// Means of every actor's lists, ordered by actor id.
pub fn means(coordinates: &ActorCoordinates) -> BTreeMap<String, (f64, f64)> {
    coordinates
        .iter()
        .filter_map(|(actor, lists)| Some((actor.clone(), lists.mean()?)))
        .collect()
}

/// Call `f` with every line of `path`, skipping lines that are not UTF-8.
fn for_each_line(path: &Path, mut f: impl FnMut(&str)) -> Result<()> {
    let reader = BufReader::new(File::open(path)?);
    for line in reader.lines() {
        match line {
            Ok(line) => f(&line),
            Err(e) if e.kind() == ErrorKind::InvalidData => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// One decoding pass over the file.
pub fn structured_pass(path: &Path) -> Result<ActorCoordinates> {
    let mut acc = ActorCoordinates::new();
    for_each_line(path, |line| {
        let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
            return;
        };
        let Some((longitude, latitude)) = coordinates(&record) else {
            return;
        };
        let Some(actor_id) = record.get("user").and_then(|user| canonical_text(user.get("id_str")))
        else {
            return;
        };
        acc.entry(actor_id).or_default().push(longitude, latitude);
    })?;
    Ok(acc)
}

/// Raw text of the member `key` of the JSON object `object`.
///
/// Only top-level members are considered: brace and bracket depth is tracked
/// and string contents (escaped quotes included) are skipped, so a `"geo"`
/// inside `retweeted_status` or inside a tweet's text never matches.
fn top_level_value<'a>(object: &'a str, key: &str) -> Option<&'a str> {
    if !object.trim_start().starts_with('{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start = 0;
    let mut member_key: Option<&str> = None;
    let mut value_start: Option<usize> = None;

    for (i, byte) in object.bytes().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
                if depth == 1 && value_start.is_none() {
                    member_key = Some(&object[string_start..i]);
                }
            }
            continue;
        }

        match byte {
            b'"' => {
                in_string = true;
                string_start = i + 1;
            }
            b'{' | b'[' => depth += 1,
            b':' if depth == 1 => value_start = Some(i + 1),
            b',' | b'}' | b']' => {
                if depth == 1
                    && let Some(start) = value_start.take()
                {
                    if member_key == Some(key) {
                        return Some(object[start..i].trim());
                    }
                    member_key = None;
                }
                if byte != b',' {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return None;
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// An actor id value: a string without escapes, or an integer.
static ACTOR_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:"([^"\\]*)"|(-?[0-9]+))$"#).expect("actor id regex should compile")
});

/// A coordinates value: an array of exactly two JSON numbers.
static COORDINATES_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    const NUMBER: &str = r"-?[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?";
    Regex::new(&format!(r"^\[\s*({NUMBER})\s*,\s*({NUMBER})\s*\]$"))
        .expect("coordinates regex should compile")
});

/// Actor id and coordinates pulled out of a raw line without decoding it.
fn match_line(line: &str) -> Option<(&str, f64, f64)> {
    let geo = top_level_value(line, "geo")?;
    let pair = COORDINATES_REGEX.captures(top_level_value(geo, "coordinates")?)?;
    let longitude = pair.get(1)?.as_str().parse().ok()?;
    let latitude = pair.get(2)?.as_str().parse().ok()?;

    let user = top_level_value(line, "user")?;
    let id = ACTOR_ID_REGEX.captures(top_level_value(user, "id_str")?)?;
    let actor_id = id.get(1).or_else(|| id.get(2))?.as_str();
    if actor_id.is_empty() || actor_id == NULL_SENTINEL {
        return None;
    }
    Some((actor_id, longitude, latitude))
}

/// One pattern-matching pass over the file.
pub fn pattern_pass(path: &Path) -> Result<ActorCoordinates> {
    let mut acc = ActorCoordinates::new();
    for_each_line(path, |line| {
        if let Some((actor_id, longitude, latitude)) = match_line(line) {
            acc.entry(actor_id.to_string())
                .or_default()
                .push(longitude, latitude);
        }
    })?;
    Ok(acc)
}

/// Coordinates of every stored post that has a location, in insertion order.
pub fn stored_coordinates(conn: &Connection) -> Result<ActorCoordinates> {
    let mut acc = ActorCoordinates::new();
    let mut stmt = conn.prepare(STORED_COORDINATES_SQL)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let actor_id: String = row.get(0)?;
        acc.entry(actor_id).or_default().push(row.get(1)?, row.get(2)?);
    }
    Ok(acc)
}

/// Result of the declarative aggregation, ordered by actor id.
pub fn declarative_means(conn: &Connection) -> Result<BTreeMap<String, (f64, f64)>> {
    let mut stmt = conn.prepare(ACTOR_MEAN_LOCATION_SQL)?;
    let rows = stmt.query_map([], |row| -> rusqlite::Result<(String, (f64, f64))> {
        Ok((row.get(0)?, (row.get(1)?, row.get(2)?)))
    })?;
    Ok(rows.collect::<std::result::Result<_, _>>()?)
}

/// Execute the aggregation query and step through every row, discarding it.
fn run_declarative_once(conn: &Connection) -> Result<usize> {
    let mut stmt = conn.prepare(ACTOR_MEAN_LOCATION_SQL)?;
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        std::hint::black_box(row.get::<_, Option<f64>>(1)?);
        count += 1;
    }
    Ok(count)
}

/// Times the three aggregation methods against one data file and one store.
pub struct AggregationBenchmark {
    data_file: PathBuf,
    store: StoreConfig,
}

impl AggregationBenchmark {
    pub fn new(data_file: impl Into<PathBuf>, store: StoreConfig) -> Self {
        Self {
            data_file: data_file.into(),
            store,
        }
    }

    /// Run `method` `iterations` times and return the total elapsed time.
    ///
    /// The declarative timing includes opening the store connection.
    pub fn run(&self, method: AggregationMethod, iterations: usize) -> Result<Duration> {
        let start = Instant::now();
        match method {
            AggregationMethod::Declarative => {
                let conn = open_connection(&self.store)?;
                for _ in 0..iterations {
                    run_declarative_once(&conn)?;
                }
            }
            AggregationMethod::StructuredPass => {
                for _ in 0..iterations {
                    std::hint::black_box(structured_pass(&self.data_file)?);
                }
            }
            AggregationMethod::PatternPass => {
                for _ in 0..iterations {
                    std::hint::black_box(pattern_pass(&self.data_file)?);
                }
            }
        }
        let elapsed = start.elapsed();

        metrics::counter!("aggregate_iterations_total", "method" => method.as_str())
            .increment(iterations as u64);
        metrics::histogram!("benchmark_run_seconds", "method" => method.as_str())
            .record(elapsed.as_secs_f64());
        tracing::info!(
            "{} x{} took {:.3}s",
            method,
            iterations,
            elapsed.as_secs_f64()
        );
        Ok(elapsed)
    }

    /// Run every method at every iteration count.
    pub fn sweep(&self, iteration_counts: &[usize]) -> BenchmarkResults {
        self.sweep_methods(&AggregationMethod::ALL, iteration_counts)
    }

    pub fn sweep_methods(
        &self,
        methods: &[AggregationMethod],
        iteration_counts: &[usize],
    ) -> BenchmarkResults {
        let mut results = BenchmarkResults::new();
        metrics::gauge!("benchmark_running").set(1.0);

        for &iterations in iteration_counts {
            for &method in methods {
                match self.run(method, iterations) {
                    Ok(elapsed) => results.record(method.as_str(), iterations, elapsed),
                    Err(e) => {
                        tracing::warn!("{} x{} failed: {}", method, iterations, e);
                        metrics::counter!("benchmark_failures_total").increment(1);
                        results.record_failure(method.as_str(), iterations, &e);
                    }
                }
            }
        }

        metrics::gauge!("benchmark_running").set(0.0);
        results
    }
}
