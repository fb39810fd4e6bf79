//! Message and conversation status classification
//!
//! Pure functions over records and a caller-supplied `now`; nothing here
//! reads the clock or the filesystem.
//!
//! Record classification checks for an error before a tool invocation.
//! Error indicators are only looked for in prose: plain-text content with
//! the `[Tool: ...]` markers removed, or the text of `text` blocks. A tool
//! named `ErrorReporter` therefore classifies as a tool call, while an
//! assistant reply that says "the build failed" classifies as an error even
//! if it also invoked a tool.

use crate::extractor::TOOL_MARKER;
use crate::models::{
    ConversationState, ConversationStatus, MessageContent, Participant, ProjectStatus, Record,
    Role, SquareStatus, StatusSquare,
};
use chrono::{DateTime, Duration, Utc};
use std::borrow::Cow;

const ERROR_INDICATORS: [&str; 3] = ["error", "Error", "failed"];

/// Age cut-offs for the active and recent buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityThresholds {
    pub active: Duration,
    pub recent: Duration,
}

impl ActivityThresholds {
    pub fn new(active: Duration, recent: Duration) -> Self {
        Self { active, recent }
    }

    /// 5 minutes active, 1 hour recent
    pub fn conversations_default() -> Self {
        Self::new(Duration::minutes(5), Duration::minutes(60))
    }

    /// 1 hour active, 24 hours recent
    pub fn projects_default() -> Self {
        Self::new(Duration::hours(1), Duration::hours(24))
    }
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self::conversations_default()
    }
}

pub fn classify(record: &Record) -> SquareStatus {
    match record.role {
        Role::User | Role::Other => SquareStatus::Pending,
        Role::Assistant => {
            if has_error_indicator(&record.content) {
                SquareStatus::Error
            } else if has_tool_invocation(&record.content) {
                SquareStatus::Tool
            } else {
                SquareStatus::Success
            }
        }
    }
}

fn prose(content: &MessageContent) -> Cow<'_, str> {
    match content {
        MessageContent::Text(text) => TOOL_MARKER.replace_all(text, ""),
        MessageContent::Blocks(blocks) => Cow::Owned(
            blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        MessageContent::Empty => Cow::Borrowed(""),
    }
}

fn has_error_indicator(content: &MessageContent) -> bool {
    let text = prose(content);
    ERROR_INDICATORS.iter().any(|needle| text.contains(needle))
}

fn has_tool_invocation(content: &MessageContent) -> bool {
    match content {
        MessageContent::Text(text) => text.contains("[Tool:") || text.contains("tool_use"),
        MessageContent::Blocks(blocks) => blocks.iter().any(|b| b.is_tool_use()),
        MessageContent::Empty => false,
    }
}

fn tooltip_label(record: &Record, status: SquareStatus) -> &'static str {
    match (record.role, status) {
        (Role::User, _) => "User input",
        (Role::Other, _) => "Unknown status",
        (Role::Assistant, SquareStatus::Error) => "Error in response",
        (Role::Assistant, SquareStatus::Tool) => "Tool execution",
        (Role::Assistant, _) => "Successful response",
    }
}

/// Status indicators for the `n` most recent messages.
///
/// Records are stably sorted by timestamp with undated records first, so
/// message numbers refer to positions in that order.
pub fn status_squares(records: &[Record], n: usize) -> Vec<StatusSquare> {
    let mut sorted: Vec<&Record> = records.iter().collect();
    // Option orders None before Some.
    sorted.sort_by_key(|r| r.timestamp);

    let start = sorted.len().saturating_sub(n);
    sorted[start..]
        .iter()
        .enumerate()
        .map(|(offset, record)| {
            let status = classify(record);
            StatusSquare {
                status,
                tooltip: format!(
                    "Message #{}: {}",
                    start + offset + 1,
                    tooltip_label(record, status)
                ),
            }
        })
        .collect()
}

/// State of a conversation judged from its last record.
///
/// A record without a timestamp is treated as infinitely old.
pub fn conversation_state(
    last_record: Option<&Record>,
    now: DateTime<Utc>,
    thresholds: &ActivityThresholds,
) -> ConversationState {
    let Some(record) = last_record else {
        return ConversationState::Empty;
    };

    if let Some(timestamp) = record.timestamp {
        let age = now - timestamp;
        if age < thresholds.active {
            return ConversationState::Active;
        }
        if age < thresholds.recent {
            return ConversationState::Recent;
        }
    }

    match record.role {
        Role::User => ConversationState::AwaitingResponse,
        Role::Assistant => ConversationState::Idle,
        Role::Other => ConversationState::Inactive,
    }
}

pub fn conversation_status(state: ConversationState) -> ConversationStatus {
    match state {
        ConversationState::Active => ConversationStatus::Active,
        ConversationState::Recent => ConversationStatus::Recent,
        _ => ConversationStatus::Inactive,
    }
}

pub fn participant(records: &[Record]) -> Participant {
    let has_user = records.iter().any(|r| r.role == Role::User);
    let has_assistant = records.iter().any(|r| r.role == Role::Assistant);

    match (has_user, has_assistant) {
        (true, true) => Participant::Conversation,
        (true, false) => Participant::Human,
        (false, true) => Participant::Assistant,
        (false, false) => Participant::Unknown,
    }
}

pub fn project_status(
    last_activity: DateTime<Utc>,
    now: DateTime<Utc>,
    thresholds: &ActivityThresholds,
) -> ProjectStatus {
    let age = now - last_activity;
    if age < thresholds.active {
        ProjectStatus::Active
    } else if age < thresholds.recent {
        ProjectStatus::Recent
    } else {
        ProjectStatus::Inactive
    }
}
