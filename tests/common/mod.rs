#![allow(dead_code)]

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary log root with one directory per project
pub struct LogRoot {
    pub dir: TempDir,
}

impl LogRoot {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a conversation file `<project>/<id>.jsonl` from whole lines
    pub fn write_conversation(&self, project: &str, id: &str, lines: &[String]) -> PathBuf {
        let project_dir = self.path().join(project);
        fs::create_dir_all(&project_dir).unwrap();
        let path = project_dir.join(format!("{id}.jsonl"));
        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&path, content).unwrap();
        path
    }
}

pub fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncated to the millisecond precision that `ts` writes
pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    (Utc::now() - Duration::minutes(minutes)).trunc_subsecs(3)
}

pub fn user_line(at: DateTime<Utc>, text: &str) -> String {
    serde_json::json!({
        "timestamp": ts(at),
        "type": "user",
        "message": {"role": "user", "content": text}
    })
    .to_string()
}

pub fn assistant_line(at: DateTime<Utc>, text: &str, input_tokens: u64, output_tokens: u64) -> String {
    serde_json::json!({
        "timestamp": ts(at),
        "type": "assistant",
        "message": {
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": text,
            "usage": {
                "input_tokens": input_tokens,
                "output_tokens": output_tokens,
                "cache_creation_input_tokens": 0,
                "cache_read_input_tokens": 0,
                "service_tier": "standard"
            }
        }
    })
    .to_string()
}

pub fn tool_use_line(at: DateTime<Utc>, tool: &str) -> String {
    serde_json::json!({
        "timestamp": ts(at),
        "message": {
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "name": tool, "input": {"path": "src/lib.rs"}}
            ]
        }
    })
    .to_string()
}

/// A short user/assistant exchange starting at `start`
pub fn exchange(start: DateTime<Utc>) -> Vec<String> {
    vec![
        user_line(start, "How do I read a file?"),
        assistant_line(start + Duration::seconds(5), "Use std::fs::read_to_string.", 120, 40),
        user_line(start + Duration::minutes(1), "Thanks"),
        tool_use_line(start + Duration::minutes(2), "Read"),
    ]
}
