//! Ingestion strategies.
//!
//! Four strategies load the same records at different costs:
//!
//! | Strategy | Source | Write cadence |
//! |---|---|---|
//! | `stream-to-file` | HTTP | none, copies the first N lines verbatim |
//! | `network-direct` | HTTP | one statement per entity per record |
//! | `file-single-row` | local file | one statement per entity per record |
//! | `file-batched` | local file | multi-row write per entity kind per flush |
//!
//! Every insert strategy stops after `target` well-formed records or at the
//! end of the source. Malformed lines are counted and skipped. The reported
//! elapsed time covers connection acquisition through the final commit;
//! schema setup is the caller's job and is not timed.

mod batch;
mod reader;

pub use batch::{EntityBatch, FlushStats};
pub use reader::{ReadStats, RecordReader};

use crate::source::LineSource;
use crate::store::{InsertStatements, StoreConfig, open_connection, write_record};
use crate::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// The competing ingestion strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Copy the first N lines of the remote stream to a local file.
    StreamToFile,
    /// Insert straight from the remote stream, one statement per entity.
    NetworkDirect,
    /// Insert from a local file, one statement per entity.
    FileSingleRow,
    /// Insert from a local file in same-kind multi-row batches.
    FileBatched,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::StreamToFile,
        Strategy::NetworkDirect,
        Strategy::FileSingleRow,
        Strategy::FileBatched,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::StreamToFile => "stream-to-file",
            Strategy::NetworkDirect => "network-direct",
            Strategy::FileSingleRow => "file-single-row",
            Strategy::FileBatched => "file-batched",
        }
    }

    /// Whether the strategy writes to the store (and so needs the schema).
    pub fn writes_store(&self) -> bool {
        !matches!(self, Strategy::StreamToFile)
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| Error::UnknownStrategy(s.to_string()))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one strategy invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Wall-clock time of the whole invocation.
    pub elapsed: Duration,
    /// Records written: normalized records for insert strategies, raw lines
    /// for stream-to-file.
    pub records_ingested: usize,
    /// Lines skipped as malformed.
    pub malformed_records: usize,
    /// Lines consumed from the source.
    pub lines_read: usize,
    /// Multi-row flushes committed (batched strategy only).
    pub batches_flushed: usize,
}

impl IngestReport {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    fn from_stats(records_ingested: usize, stats: ReadStats) -> Self {
        Self {
            records_ingested,
            malformed_records: stats.malformed,
            lines_read: stats.lines_read,
            ..Default::default()
        }
    }
}

/// Store state for one strategy invocation.
///
/// Owns the connection exclusively; dropping the context releases it, on
/// success and on error alike.
pub struct IngestContext {
    conn: Connection,
    statements: InsertStatements,
}

impl IngestContext {
    pub fn open(store: &StoreConfig, statements: &InsertStatements) -> Result<Self> {
        Ok(Self::with_connection(
            open_connection(store)?,
            statements.clone(),
        ))
    }

    pub fn with_connection(conn: Connection, statements: InsertStatements) -> Self {
        Self { conn, statements }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Write each record's actor, location and post as it is read, all in one
    /// transaction committed at the end.
    pub fn ingest_per_record(
        &mut self,
        source: &dyn LineSource,
        target: usize,
    ) -> Result<IngestReport> {
        let mut reader = RecordReader::new(source.open()?);
        let tx = self.conn.transaction()?;

        let mut ingested = 0;
        while ingested < target {
            let Some(record) = reader.next_record()? else {
                break;
            };
            write_record(&tx, &self.statements, &record)?;
            ingested += 1;
        }
        tx.commit()?;

        Ok(IngestReport::from_stats(ingested, reader.stats()))
    }

    /// Accumulate records and write them kind by kind, flushing whenever an
    /// accumulator reaches `batch_size` and once more for the remainder.
    pub fn ingest_batched(
        &mut self,
        source: &dyn LineSource,
        target: usize,
        batch_size: NonZeroUsize,
    ) -> Result<IngestReport> {
        let mut reader = RecordReader::new(source.open()?);
        let mut batch = EntityBatch::new(batch_size);

        let mut ingested = 0;
        let mut flushed = 0;
        while ingested < target {
            let Some(record) = reader.next_record()? else {
                break;
            };
            batch.push(record);
            ingested += 1;

            if batch.is_full() {
                batch.flush(&mut self.conn)?;
                flushed += 1;
            }
        }

        if !batch.is_empty() {
            batch.flush(&mut self.conn)?;
            flushed += 1;
        }

        let mut report = IngestReport::from_stats(ingested, reader.stats());
        report.batches_flushed = flushed;
        Ok(report)
    }
}

/// Copy the first `lines` lines of `source` to `dest` byte for byte.
///
/// Timing includes opening the source, so for HTTP the request itself is
/// measured. The file is synced before returning.
pub fn stream_to_file(source: &dyn LineSource, dest: &Path, lines: usize) -> Result<IngestReport> {
    let start = Instant::now();
    let mut reader = source.open()?;

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(dest)?);

    let mut copied = 0;
    let mut line = Vec::new();
    while copied < lines {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if !line.ends_with(b"\n") {
            line.push(b'\n');
        }
        writer.write_all(&line)?;
        copied += 1;
    }

    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;

    metrics::counter!("ingest_lines_copied_total").increment(copied as u64);
    tracing::info!(
        "Copied {} lines from {} to {}",
        copied,
        source.location(),
        dest.display()
    );

    Ok(IngestReport {
        elapsed: start.elapsed(),
        records_ingested: copied,
        lines_read: copied,
        ..Default::default()
    })
}

/// Insert up to `target` records with one write per entity per record.
pub fn insert_per_record(
    store: &StoreConfig,
    statements: &InsertStatements,
    source: &dyn LineSource,
    target: usize,
) -> Result<IngestReport> {
    let start = Instant::now();
    let mut report = {
        let mut ctx = IngestContext::open(store, statements)?;
        ctx.ingest_per_record(source, target)?
    };
    report.elapsed = start.elapsed();

    record_metrics(source, &report);
    tracing::info!(
        "Inserted {} records from {} one at a time ({} malformed) in {:.3}s",
        report.records_ingested,
        source.location(),
        report.malformed_records,
        report.elapsed_secs()
    );
    Ok(report)
}

/// Insert up to `target` records through same-kind multi-row batches.
pub fn insert_batched(
    store: &StoreConfig,
    statements: &InsertStatements,
    source: &dyn LineSource,
    target: usize,
    batch_size: NonZeroUsize,
) -> Result<IngestReport> {
    let start = Instant::now();
    let mut report = {
        let mut ctx = IngestContext::open(store, statements)?;
        ctx.ingest_batched(source, target, batch_size)?
    };
    report.elapsed = start.elapsed();

    record_metrics(source, &report);
    metrics::counter!("ingest_batches_flushed_total").increment(report.batches_flushed as u64);
    tracing::info!(
        "Inserted {} records from {} in {} batches of up to {} ({} malformed) in {:.3}s",
        report.records_ingested,
        source.location(),
        report.batches_flushed,
        batch_size,
        report.malformed_records,
        report.elapsed_secs()
    );
    Ok(report)
}

fn record_metrics(source: &dyn LineSource, report: &IngestReport) {
    metrics::counter!("ingest_records_total", "source" => source.name())
        .increment(report.records_ingested as u64);
    metrics::counter!("ingest_records_malformed_total", "source" => source.name())
        .increment(report.malformed_records as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;
    use crate::source::{FileSource, HttpConfig, HttpSource, test_server};
    use crate::store::{RowCounts, row_counts};
    use std::path::PathBuf;
    use tempfile::TempDir;

    // =========================================================================
    // Fixtures
    // =========================================================================

    const SCENARIO: &str = concat!(
        r#"{"id_str":"1","text":"hi","user":{"id_str":"10","name":"A","screen_name":"a","description":"NULL","friends_count":5},"geo":{"type":"Point","coordinates":[10.0,20.0]},"retweet_count":0,"contributors":null}"#,
        "\n",
        "{not json\n",
        r#"{"id_str":"2","text":"","user":{"id_str":"10","name":"A","screen_name":"a","description":"","friends_count":5},"geo":{"type":"Point","coordinates":[10.0,20.0]},"retweet_count":3,"contributors":null}"#,
        "\n",
    );

    fn post_line(id: usize, actor: usize, geo: Option<(f64, f64)>) -> String {
        let geo = geo.map_or("null".to_string(), |(lon, lat)| {
            format!(r#"{{"type":"Point","coordinates":[{lon},{lat}]}}"#)
        });
        format!(
            r#"{{"id_str":"{id}","text":"post {id}","user":{{"id_str":"{actor}","name":"user {actor}","friends_count":{actor}}},"geo":{geo},"retweet_count":{id},"contributors":[{actor}]}}"#
        )
    }

    /// A mixed dataset: repeated actors, repeated and missing locations, and a
    /// malformed line every seventh line.
    fn mixed_dataset(posts: usize) -> String {
        let mut out = String::new();
        for i in 0..posts {
            if i % 7 == 3 {
                out.push_str("{\"id_str\":\n");
            }
            let geo = (!i.is_multiple_of(3)).then(|| ((i % 4) as f64, 1.5));
            out.push_str(&post_line(i, i % 5, geo));
            out.push('\n');
        }
        out
    }

    struct Fixture {
        _tmp: TempDir,
        dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = TempDir::new().unwrap();
            let dir = tmp.path().to_path_buf();
            Self { _tmp: tmp, dir }
        }

        fn data(&self, name: &str, content: &str) -> FileSource {
            let path = self.dir.join(name);
            std::fs::write(&path, content).unwrap();
            FileSource::new(path)
        }

        fn store(&self, name: &str) -> StoreConfig {
            let config = StoreConfig {
                db_path: self.dir.join(name),
            };
            let conn = open_connection(&config).unwrap();
            ensure_schema(&conn).unwrap();
            config
        }
    }

    fn counts(store: &StoreConfig) -> RowCounts {
        row_counts(&open_connection(store).unwrap()).unwrap()
    }

    /// Every row of every relation, in key order, as text.
    fn snapshot(store: &StoreConfig) -> Vec<Vec<String>> {
        let conn = open_connection(store).unwrap();
        let queries = [
            "SELECT id, display_name, handle, description, connection_count FROM actor ORDER BY id",
            "SELECT location_id, kind, longitude, latitude FROM location ORDER BY location_id",
            "SELECT created_at, id, text, source_label, reply_to_actor_id, reply_to_handle, \
             reply_to_post_id, repost_count, contributors, actor_id, location_id FROM post ORDER BY id",
        ];
        queries
            .iter()
            .map(|sql| {
                let mut stmt = conn.prepare(sql).unwrap();
                let width = stmt.column_count();
                stmt.query_map([], |row| {
                    let mut cells = Vec::with_capacity(width);
                    for i in 0..width {
                        let value: rusqlite::types::Value = row.get(i)?;
                        cells.push(format!("{value:?}"));
                    }
                    Ok(cells.join("|"))
                })
                .unwrap()
                .collect::<std::result::Result<Vec<_>, _>>()
                .unwrap()
            })
            .collect()
    }

    // =========================================================================
    // Strategy names
    // =========================================================================

    #[test]
    fn test_strategy_names_round_trip() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
            assert_eq!(strategy.to_string(), strategy.as_str());
        }
        assert!(matches!(
            "bulk-copy".parse::<Strategy>(),
            Err(Error::UnknownStrategy(_))
        ));
        assert!(!Strategy::StreamToFile.writes_store());
        assert!(Strategy::FileBatched.writes_store());
    }

    // =========================================================================
    // Three-line scenario
    // =========================================================================

    #[test]
    fn test_three_line_scenario_batched() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", SCENARIO);
        let store = fx.store("bench.db");

        let report = insert_batched(
            &store,
            &InsertStatements::standard(),
            &source,
            3,
            NonZeroUsize::new(1).unwrap(),
        )
        .unwrap();
        assert_eq!(report.records_ingested, 2);
        assert_eq!(report.malformed_records, 1);
        assert_eq!(report.lines_read, 3);
        assert_eq!(report.batches_flushed, 2);

        assert_eq!(
            counts(&store),
            RowCounts {
                actors: 1,
                locations: 1,
                posts: 2
            }
        );

        let conn = open_connection(&store).unwrap();
        let location_id: String = conn
            .query_row("SELECT location_id FROM location", [], |row| row.get(0))
            .unwrap();
        assert_eq!(location_id, "10_20");
        let linked: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM post WHERE location_id = '10_20'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(linked, 2);
        let description: Option<String> = conn
            .query_row("SELECT description FROM actor", [], |row| row.get(0))
            .unwrap();
        assert_eq!(description, None);
        let text: Option<String> = conn
            .query_row("SELECT text FROM post WHERE id = '2'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(text, None);
    }

    #[test]
    fn test_three_line_scenario_per_record() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", SCENARIO);
        let store = fx.store("bench.db");

        let report = insert_per_record(&store, &InsertStatements::standard(), &source, 3).unwrap();
        assert_eq!(report.records_ingested, 2);
        assert_eq!(report.malformed_records, 1);
        assert_eq!(
            counts(&store),
            RowCounts {
                actors: 1,
                locations: 1,
                posts: 2
            }
        );
    }

    // =========================================================================
    // Per-record strategy
    // =========================================================================

    #[test]
    fn test_malformed_lines_do_not_count_toward_target() {
        let fx = Fixture::new();
        let mut content = String::new();
        for i in 0..4 {
            content.push_str("garbage\n");
            content.push_str(&post_line(i, 1, None));
            content.push('\n');
        }
        let source = fx.data("tweets.json", &content);
        let store = fx.store("bench.db");

        let report = insert_per_record(&store, &InsertStatements::standard(), &source, 3).unwrap();
        assert_eq!(report.records_ingested, 3);
        assert_eq!(report.malformed_records, 3);
        assert_eq!(counts(&store).posts, 3);
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", &mixed_dataset(40));
        let store = fx.store("bench.db");
        let statements = InsertStatements::standard();

        insert_per_record(&store, &statements, &source, 1000).unwrap();
        let first = snapshot(&store);
        let report = insert_per_record(&store, &statements, &source, 1000).unwrap();

        assert_eq!(report.records_ingested, 40);
        assert_eq!(snapshot(&store), first);
    }

    #[test]
    fn test_location_omitted_without_coordinates() {
        let fx = Fixture::new();
        let content = format!(
            "{}\n{}\n",
            post_line(1, 1, None),
            r#"{"id_str":"2","user":{"id_str":"1"},"geo":{"coordinates":[1.0]}}"#
        );
        let source = fx.data("tweets.json", &content);
        let store = fx.store("bench.db");

        insert_per_record(&store, &InsertStatements::standard(), &source, 10).unwrap();

        let conn = open_connection(&store).unwrap();
        let linked: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM post WHERE location_id IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(linked, 0);
        assert_eq!(counts(&store).locations, 0);
        assert_eq!(counts(&store).posts, 2);
    }

    #[test]
    fn test_missing_source_is_fatal() {
        let fx = Fixture::new();
        let store = fx.store("bench.db");
        let source = FileSource::new(fx.dir.join("missing.json"));

        let err = insert_per_record(&store, &InsertStatements::standard(), &source, 10).unwrap_err();
        assert!(err.is_transport());
    }

    // =========================================================================
    // Batched strategy
    // =========================================================================

    #[test]
    fn test_batch_size_does_not_change_stored_content() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", &mixed_dataset(50));
        let statements = InsertStatements::standard();

        let reference = fx.store("single.db");
        insert_per_record(&reference, &statements, &source, 1000).unwrap();
        let expected = snapshot(&reference);

        for size in [1, 2, 3, 1000] {
            let store = fx.store(&format!("batched-{size}.db"));
            let report = insert_batched(
                &store,
                &statements,
                &source,
                1000,
                NonZeroUsize::new(size).unwrap(),
            )
            .unwrap();
            assert_eq!(report.records_ingested, 50, "batch size {size}");
            assert_eq!(snapshot(&store), expected, "batch size {size}");
        }
    }

    #[test]
    fn test_final_partial_batch_is_flushed() {
        let fx = Fixture::new();
        let content: String = (0..7).map(|i| post_line(i, i, None) + "\n").collect();
        let source = fx.data("tweets.json", &content);
        let store = fx.store("bench.db");

        let report = insert_batched(
            &store,
            &InsertStatements::standard(),
            &source,
            100,
            NonZeroUsize::new(3).unwrap(),
        )
        .unwrap();

        assert_eq!(report.batches_flushed, 3);
        assert_eq!(counts(&store).posts, 7);
    }

    #[test]
    fn test_batched_stops_at_target() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", &mixed_dataset(30));
        let store = fx.store("bench.db");

        let report = insert_batched(
            &store,
            &InsertStatements::standard(),
            &source,
            10,
            NonZeroUsize::new(4).unwrap(),
        )
        .unwrap();

        assert_eq!(report.records_ingested, 10);
        assert_eq!(counts(&store).posts, 10);
    }

    #[test]
    fn test_context_can_run_strategies_back_to_back() {
        let fx = Fixture::new();
        let source = fx.data("tweets.json", SCENARIO);
        let store = fx.store("bench.db");

        let mut ctx = IngestContext::open(&store, &InsertStatements::standard()).unwrap();
        ctx.ingest_per_record(&source, 10).unwrap();
        let report = ctx
            .ingest_batched(&source, 10, NonZeroUsize::new(2).unwrap())
            .unwrap();

        assert_eq!(report.records_ingested, 2);
        let posts: i64 = ctx
            .connection()
            .query_row("SELECT COUNT(*) FROM post", [], |row| row.get(0))
            .unwrap();
        assert_eq!(posts, 2);
    }

    // =========================================================================
    // Network sources
    // =========================================================================

    fn http_source(url: String) -> HttpSource {
        HttpSource::new(HttpConfig {
            url,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_network_direct_over_http() {
        let fx = Fixture::new();
        let store = fx.store("bench.db");
        let source = http_source(test_server::serve("200 OK", SCENARIO));

        let report = insert_per_record(&store, &InsertStatements::standard(), &source, 3).unwrap();
        assert_eq!(report.records_ingested, 2);
        assert_eq!(report.malformed_records, 1);
        assert_eq!(
            counts(&store),
            RowCounts {
                actors: 1,
                locations: 1,
                posts: 2
            }
        );
    }

    #[test]
    fn test_network_direct_matches_file_content() {
        let fx = Fixture::new();
        let dataset = mixed_dataset(30);
        let statements = InsertStatements::standard();

        let from_file = fx.store("file.db");
        insert_per_record(&from_file, &statements, &fx.data("tweets.json", &dataset), 1000).unwrap();

        let from_http = fx.store("http.db");
        let source = http_source(test_server::serve("200 OK", dataset));
        insert_per_record(&from_http, &statements, &source, 1000).unwrap();

        assert_eq!(snapshot(&from_http), snapshot(&from_file));
    }

    #[test]
    fn test_http_error_status_aborts_ingest() {
        let fx = Fixture::new();
        let store = fx.store("bench.db");
        let source = http_source(test_server::serve("503 Service Unavailable", "busy"));

        let err = insert_per_record(&store, &InsertStatements::standard(), &source, 3).unwrap_err();
        assert!(err.is_transport());
        assert_eq!(counts(&store), RowCounts::default());
    }

    #[test]
    fn test_stream_to_file_over_http() {
        let fx = Fixture::new();
        let source = http_source(test_server::serve("200 OK", SCENARIO));
        let dest = fx.dir.join("download.json");

        let report = stream_to_file(&source, &dest, 2).unwrap();
        assert_eq!(report.records_ingested, 2);

        let copied = std::fs::read_to_string(&dest).unwrap();
        let expected: String = SCENARIO.lines().take(2).map(|l| format!("{l}\n")).collect();
        assert_eq!(copied, expected);
    }

    // =========================================================================
    // Stream to file
    // =========================================================================

    #[test]
    fn test_stream_to_file_copies_first_lines_verbatim() {
        let fx = Fixture::new();
        let source = fx.data("remote.json", "one\n{broken\nthree\nfour");
        let dest = fx.dir.join("nested").join("copy.json");

        let report = stream_to_file(&source, &dest, 3).unwrap();
        assert_eq!(report.records_ingested, 3);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "one\n{broken\nthree\n");

        let report = stream_to_file(&source, &dest, 10).unwrap();
        assert_eq!(report.records_ingested, 4);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "one\n{broken\nthree\nfour\n"
        );
    }
}
