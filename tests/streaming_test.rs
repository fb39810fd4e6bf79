//! Streaming reader behaviour on large and awkward files

mod common;

use claude_analytics::parser::{RecordReader, SessionStarterProcessor};
use common::*;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_large_file_streams_with_bounded_tail() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let start = minutes_ago(10_000);
    for i in 0..50_000 {
        let at = start + chrono::Duration::seconds(i);
        writeln!(temp_file, "{}", assistant_line(at, &format!("reply {i}"), 10, 20)).unwrap();
        if i % 1000 == 500 {
            writeln!(temp_file, "{{broken json line that should be skipped}}").unwrap();
        }
    }
    temp_file.flush().unwrap();

    let reader = RecordReader::default();
    assert_eq!(reader.count(temp_file.path()), 50_000);

    let tail = reader.last_n(temp_file.path(), 5);
    assert_eq!(tail.len(), 5);
    let last_ts = tail.last().and_then(|r| r.timestamp).unwrap();
    assert_eq!(last_ts, start + chrono::Duration::seconds(49_999));

    let mut stream = reader.stream(temp_file.path());
    assert_eq!(stream.by_ref().count(), 50_000);
    assert_eq!(stream.skipped(), 50);
}

#[test]
fn test_stream_stops_early_when_consumer_stops() {
    let root = LogRoot::new();
    let lines: Vec<String> = (0..100)
        .map(|i| user_line(minutes_ago(100 - i), "hi"))
        .collect();
    let path = root.write_conversation("proj", "conv", &lines);

    let reader = RecordReader::default();
    let mut stream = reader.stream(&path);
    let first_three: Vec<_> = stream.by_ref().take(3).collect();
    assert_eq!(first_three.len(), 3);
    assert_eq!(stream.line_number(), 3);
}

#[test]
fn test_session_starters_from_stream() {
    let root = LogRoot::new();
    let path = root.write_conversation("proj", "conv-7", &exchange(minutes_ago(30)));

    let starters = RecordReader::default()
        .process(&path, SessionStarterProcessor::new("conv-7"))
        .unwrap();
    assert_eq!(starters.len(), 2);
    assert!(starters[0].timestamp < starters[1].timestamp);
}

#[test]
fn test_small_buffer_reads_long_lines() {
    let root = LogRoot::new();
    let long_text = "x".repeat(10_000);
    let path = root.write_conversation(
        "proj",
        "long",
        &[user_line(minutes_ago(5), &long_text), user_line(minutes_ago(4), "short")],
    );

    let reader = RecordReader::new(1024);
    assert_eq!(reader.count(&path), 2);
}
