//! Line-to-record reader shared by every insert strategy.

use crate::Result;
use postbench_core::{NormalizedRecord, normalize_line};
use std::io::{BufRead, ErrorKind, Lines};

/// Counters kept while reading a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Lines consumed from the source, blank and malformed ones included.
    pub lines_read: usize,
    /// Whitespace-only lines, skipped without counting as malformed.
    pub blank_lines: usize,
    /// Lines that could not be normalized into a record.
    pub malformed: usize,
}

/// Yields normalized records from a line source, skipping malformed lines.
///
/// Malformed lines (undecodable text, invalid JSON, missing key fields) are
/// counted and skipped. Any other read error is a transport failure and is
/// returned to the caller.
pub struct RecordReader<R> {
    lines: Lines<R>,
    stats: ReadStats,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            stats: ReadStats::default(),
        }
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Read until the next well-formed record or the end of the source.
    pub fn next_record(&mut self) -> Result<Option<NormalizedRecord>> {
        loop {
            let position = self.stats.lines_read;
            let line = match self.lines.next() {
                None => return Ok(None),
                Some(Ok(line)) => line,
                Some(Err(e)) if e.kind() == ErrorKind::InvalidData => {
                    self.stats.lines_read += 1;
                    self.stats.malformed += 1;
                    tracing::debug!("Line {}: skipped undecodable line: {}", position + 1, e);
                    continue;
                }
                Some(Err(e)) => return Err(e.into()),
            };
            self.stats.lines_read += 1;

            if line.trim().is_empty() {
                self.stats.blank_lines += 1;
                continue;
            }

            match normalize_line(&line, position) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => {
                    self.stats.malformed += 1;
                    tracing::debug!("Line {}: skipped malformed record: {}", position + 1, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn post(id: &str) -> String {
        format!(r#"{{"id_str":"{id}","user":{{"id_str":"9"}}}}"#)
    }

    #[test]
    fn test_skips_malformed_and_blank_lines() {
        let input = format!("{}\n\n{{broken\n{}\n[1]\n", post("1"), post("2"));
        let mut reader = RecordReader::new(Cursor::new(input));

        assert_eq!(reader.next_record().unwrap().unwrap().post.id, "1");
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.post.id, "2");
        assert_eq!(second.position, 3);
        assert!(reader.next_record().unwrap().is_none());

        let stats = reader.stats();
        assert_eq!(stats.lines_read, 5);
        assert_eq!(stats.blank_lines, 1);
        assert_eq!(stats.malformed, 2);
    }

    #[test]
    fn test_invalid_utf8_is_malformed_not_fatal() {
        let mut input = post("1").into_bytes();
        input.extend_from_slice(b"\n\xff\xfe\n");
        input.extend_from_slice(post("2").as_bytes());
        let mut reader = RecordReader::new(Cursor::new(input));

        assert_eq!(reader.next_record().unwrap().unwrap().post.id, "1");
        assert_eq!(reader.next_record().unwrap().unwrap().post.id, "2");
        assert_eq!(reader.stats().malformed, 1);
    }

    #[test]
    fn test_empty_source() {
        let mut reader = RecordReader::new(Cursor::new(""));
        assert!(reader.next_record().unwrap().is_none());
        assert_eq!(reader.stats(), ReadStats::default());
    }
}
