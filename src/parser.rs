//! Streaming JSONL record reader
//!
//! Log files are append-only and can grow to many megabytes, so nothing in
//! here reads a whole file into a string. [`RecordReader::stream`] yields one
//! [`Record`] per valid line through a buffered reader; the fold helpers
//! ([`RecordReader::count`], [`RecordReader::last_n`]) run on top of the same
//! stream via the [`RecordProcessor`] trait and keep bounded state.
//!
//! A line is a record when it is valid JSON carrying a `message` object with
//! a `role`. Anything else is skipped and counted, never surfaced as an error.

use crate::analyzer::ScanCancel;
use crate::error::AnalyticsError;
use crate::models::{RawLine, Record, Role, SessionStarter};
use crate::timestamp_parser::TimestampParser;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Split};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Filesystem metadata for a log file, read without touching its content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// Trait for single-pass folds over a record stream
pub trait RecordProcessor {
    type Output;

    fn process_record(&mut self, record: Record, line_number: usize) -> Result<()>;
    fn finalize(self) -> Result<Self::Output>;
}

#[derive(Debug, Clone)]
pub struct RecordReader {
    buffer_size: usize,
}

impl Default for RecordReader {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl RecordReader {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1024),
        }
    }

    /// Open a fresh stream, surfacing the open error
    pub fn open(&self, path: &Path) -> io::Result<RecordStream> {
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(self.buffer_size, file);
        Ok(RecordStream {
            path: path.to_path_buf(),
            lines: Some(reader.split(b'\n')),
            line_number: 0,
            skipped: 0,
        })
    }

    /// Open a fresh stream; a file that cannot be opened yields no records
    pub fn stream(&self, path: &Path) -> RecordStream {
        self.open(path).unwrap_or_else(|e| {
            warn!(file = %path.display(), error = %e, "Log file not available");
            RecordStream::empty(path)
        })
    }

    /// Feed every record of the file through a processor
    pub fn process<P: RecordProcessor>(&self, path: &Path, processor: P) -> Result<P::Output> {
        drive(self.stream(path), processor)
    }

    /// The `n` most recent records in file order
    pub fn last_n(&self, path: &Path, n: usize) -> Vec<Record> {
        let mut buffer = LastNProcessor::new(n);
        for record in self.stream(path) {
            buffer.push(record);
        }
        buffer.into_vec()
    }

    /// Number of valid records in the file
    pub fn count(&self, path: &Path) -> usize {
        self.stream(path).count()
    }

    /// Every record in the file, aborting early when the scan is cancelled
    ///
    /// Unlike [`RecordReader::stream`], a file that cannot be opened is an error.
    pub fn read_all(&self, path: &Path, cancel: &ScanCancel) -> Result<Vec<Record>> {
        let stream = self
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        drive(stream, CollectorProcessor::with_cancel(cancel.clone()))
    }

    pub fn stat(&self, path: &Path) -> io::Result<FileStat> {
        stat_file(path)
    }
}

fn drive<P: RecordProcessor>(mut stream: RecordStream, mut processor: P) -> Result<P::Output> {
    while let Some(record) = stream.next() {
        let line_number = stream.line_number();
        processor.process_record(record, line_number)?;
    }

    if stream.skipped() > 0 {
        debug!(
            file = %stream.path.display(),
            skipped = stream.skipped(),
            "Finished stream with skipped lines"
        );
    }

    processor.finalize()
}

/// Parse a log timestamp; unparseable input has no timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    TimestampParser::parse(value).ok()
}

pub fn stat_file(path: &Path) -> io::Result<FileStat> {
    let metadata = fs::metadata(path)?;
    let modified_at: DateTime<Utc> = metadata.modified()?.into();
    let created_at = metadata
        .created()
        .map(DateTime::<Utc>::from)
        .unwrap_or(modified_at);

    Ok(FileStat {
        size_bytes: metadata.len(),
        modified_at,
        created_at,
    })
}

/// Lazy, forward-only sequence of records from one file
pub struct RecordStream {
    path: PathBuf,
    lines: Option<Split<BufReader<File>>>,
    line_number: usize,
    skipped: usize,
}

impl RecordStream {
    fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lines: None,
            line_number: 0,
            skipped: 0,
        }
    }

    /// Line number of the most recently read line (1-based)
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Non-blank lines that were not valid records
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for RecordStream {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let next_line = self.lines.as_mut()?.next()?;
            let line = match next_line {
                Ok(line) => line,
                Err(e) => {
                    // File vanished or became unreadable mid-read: end early.
                    warn!(
                        file = %self.path.display(),
                        line = self.line_number + 1,
                        error = %e,
                        "Stopped reading log file"
                    );
                    self.lines = None;
                    return None;
                }
            };
            self.line_number += 1;

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<RawLine>(&line) {
                Ok(raw) => match Record::from_raw(raw) {
                    Some(record) => return Some(record),
                    None => {
                        self.skipped += 1;
                        warn!(
                            file = %self.path.display(),
                            line = self.line_number,
                            "Skipping line without message role"
                        );
                    }
                },
                Err(e) => {
                    self.skipped += 1;
                    warn!(
                        file = %self.path.display(),
                        line = self.line_number,
                        error = %e,
                        "Skipping invalid JSON line"
                    );
                }
            }
        }
    }
}

// Default processor that collects all records into a Vec
pub struct CollectorProcessor {
    records: Vec<Record>,
    cancel: Option<ScanCancel>,
}

impl CollectorProcessor {
    const CANCEL_CHECK_INTERVAL: usize = 256;

    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            cancel: None,
        }
    }

    pub fn with_cancel(cancel: ScanCancel) -> Self {
        Self {
            records: Vec::new(),
            cancel: Some(cancel),
        }
    }
}

impl Default for CollectorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordProcessor for CollectorProcessor {
    type Output = Vec<Record>;

    fn process_record(&mut self, record: Record, _line_number: usize) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if self.records.len() % Self::CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(AnalyticsError::Cancelled.into());
            }
        }
        self.records.push(record);
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                return Err(AnalyticsError::Cancelled.into());
            }
        }
        Ok(self.records)
    }
}

// Processor that counts records
#[derive(Default)]
pub struct CountProcessor {
    count: usize,
}

impl CountProcessor {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl RecordProcessor for CountProcessor {
    type Output = usize;

    fn process_record(&mut self, _record: Record, _line_number: usize) -> Result<()> {
        self.count += 1;
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok(self.count)
    }
}

// Fixed-capacity ring buffer keeping the newest records
pub struct LastNProcessor {
    capacity: usize,
    buffer: VecDeque<Record>,
}

impl LastNProcessor {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }

    fn push(&mut self, record: Record) {
        if self.capacity == 0 {
            return;
        }
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(record);
    }

    fn into_vec(self) -> Vec<Record> {
        self.buffer.into()
    }
}

impl RecordProcessor for LastNProcessor {
    type Output = Vec<Record>;

    fn process_record(&mut self, record: Record, _line_number: usize) -> Result<()> {
        self.push(record);
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok(self.into_vec())
    }
}

/// Collects the timestamps of user-authored records of one conversation
pub struct SessionStarterProcessor {
    conversation_id: String,
    starters: Vec<SessionStarter>,
}

impl SessionStarterProcessor {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            starters: Vec::new(),
        }
    }

    pub fn push(&mut self, record: &Record) {
        if record.role != Role::User {
            return;
        }
        if let Some(timestamp) = record.timestamp {
            self.starters.push(SessionStarter {
                timestamp,
                conversation_id: self.conversation_id.clone(),
            });
        }
    }

    pub fn into_starters(self) -> Vec<SessionStarter> {
        self.starters
    }
}

impl RecordProcessor for SessionStarterProcessor {
    type Output = Vec<SessionStarter>;

    fn process_record(&mut self, record: Record, _line_number: usize) -> Result<()> {
        self.push(&record);
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok(self.into_starters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn user_line(i: usize) -> String {
        format!(
            r#"{{"timestamp":"2024-01-15T10:{:02}:00Z","message":{{"role":"user","content":"message {}"}}}}"#,
            i % 60,
            i
        )
    }

    fn write_lines(lines: &[String]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_stream_skips_malformed_and_blank_lines() {
        let file = write_lines(&[
            user_line(0),
            String::new(),
            "{broken json".to_string(),
            r#"{"type":"summary","summary":"no message"}"#.to_string(),
            r#"{"message":{"role":"assistant","content":"ok"}}"#.to_string(),
        ]);

        let reader = RecordReader::default();
        let mut stream = reader.stream(file.path());
        let records: Vec<Record> = stream.by_ref().collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].role, Role::User);
        assert_eq!(records[1].role, Role::Assistant);
        assert_eq!(stream.skipped(), 2);
    }

    #[test]
    fn test_stream_is_restartable() {
        let file = write_lines(&[user_line(0), user_line(1)]);
        let reader = RecordReader::default();
        assert_eq!(reader.stream(file.path()).count(), 2);
        assert_eq!(reader.stream(file.path()).count(), 2);
    }

    #[test]
    fn test_crlf_and_invalid_utf8_lines() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}\r\n", user_line(0)).unwrap();
        file.write_all(b"\xff\xfe not utf8\n").unwrap();
        write!(file, "{}\n", user_line(1)).unwrap();
        file.flush().unwrap();

        let reader = RecordReader::default();
        let mut stream = reader.stream(file.path());
        assert_eq!(stream.by_ref().count(), 2);
        assert_eq!(stream.skipped(), 1);
    }

    #[test]
    fn test_missing_file_yields_empty_stream() {
        let reader = RecordReader::default();
        let path = Path::new("/definitely/not/here.jsonl");
        assert_eq!(reader.stream(path).count(), 0);
        assert!(reader.open(path).is_err());
        assert!(reader.stat(path).is_err());
    }

    #[test]
    fn test_last_n_keeps_most_recent_in_order() {
        let lines: Vec<String> = (0..25).map(user_line).collect();
        let file = write_lines(&lines);
        let reader = RecordReader::default();

        let last = reader.last_n(file.path(), 3);
        let texts: Vec<_> = last
            .iter()
            .map(|r| match &r.content {
                crate::models::MessageContent::Text(t) => t.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(texts, vec!["message 22", "message 23", "message 24"]);

        assert!(reader.last_n(file.path(), 0).is_empty());
        assert_eq!(reader.last_n(file.path(), 100).len(), 25);
    }

    #[test]
    fn test_count_and_processors_agree() {
        let lines: Vec<String> = (0..10).map(user_line).collect();
        let file = write_lines(&lines);
        let reader = RecordReader::default();

        assert_eq!(reader.count(file.path()), 10);
        assert_eq!(reader.process(file.path(), CountProcessor::new()).unwrap(), 10);
        assert_eq!(
            reader.process(file.path(), LastNProcessor::new(4)).unwrap().len(),
            4
        );
    }

    #[test]
    fn test_read_all_respects_cancellation() {
        let lines: Vec<String> = (0..10).map(user_line).collect();
        let file = write_lines(&lines);
        let reader = RecordReader::default();

        let cancel = ScanCancel::new();
        assert_eq!(reader.read_all(file.path(), &cancel).unwrap().len(), 10);

        cancel.cancel();
        let err = reader.read_all(file.path(), &cancel).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalyticsError>(),
            Some(AnalyticsError::Cancelled)
        ));
    }

    #[test]
    fn test_read_all_fails_on_missing_file() {
        let reader = RecordReader::default();
        let err = reader
            .read_all(Path::new("/no/such/log.jsonl"), &ScanCancel::new())
            .unwrap_err();
        assert!(format!("{err:#}").contains("cannot open log file"));

        // The lenient stream still degrades to nothing.
        assert_eq!(reader.count(Path::new("/no/such/log.jsonl")), 0);
    }

    #[test]
    fn test_stat_reports_size() {
        let file = write_lines(&[user_line(0)]);
        let stat = RecordReader::default().stat(file.path()).unwrap();
        let metadata = file.as_file().metadata().unwrap();
        assert_eq!(stat.size_bytes, metadata.len());
        assert_eq!(stat.modified_at, DateTime::<Utc>::from(metadata.modified().unwrap()));
    }

    #[test]
    fn test_session_starter_processor_keeps_dated_user_records() {
        let file = write_lines(&[
            user_line(0),
            r#"{"message":{"role":"user","content":"undated"}}"#.to_string(),
            r#"{"timestamp":"2024-01-15T10:05:00Z","message":{"role":"assistant","content":"ok"}}"#.to_string(),
            user_line(7),
        ]);

        let starters = RecordReader::default()
            .process(file.path(), SessionStarterProcessor::new("conv-1"))
            .unwrap();

        assert_eq!(starters.len(), 2);
        assert!(starters.iter().all(|s| s.conversation_id == "conv-1"));
        assert_eq!(starters[1].timestamp, parse_timestamp("2024-01-15T10:07:00Z").unwrap());
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-01-15T10:00:00+01:00").is_some());
        assert!(parse_timestamp("2024-01-15T10:00:00.123").is_some());
        assert!(parse_timestamp("soon").is_none());
    }
}
