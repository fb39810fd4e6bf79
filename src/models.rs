//! Core Data Models
//!
//! This module defines the data structures that flow through the analytics
//! pipeline, from raw JSONL lines to the aggregate report handed to the
//! presentation layer.
//!
//! ## Data Flow
//!
//! 1. **Raw Data**: [`RawLine`] - one JSON line exactly as written by the assistant
//! 2. **Records**: [`Record`] - a validated message turn (role, timestamp, content, usage)
//! 3. **Derived State**: [`TokenUsage`], [`ModelInfo`], [`ToolUsage`], [`StatusSquare`]
//! 4. **Aggregates**: [`Conversation`], [`Project`], [`UsageSession`], [`Summary`]
//! 5. **Output**: [`AnalyticsReport`] - the single object returned by a scan
//!
//! ## Serialization
//!
//! Output types serialize with camelCase field names so the JSON matches what
//! the dashboard and CLI consumers already expect. Records and raw lines are
//! never serialized back to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::timestamp_parser::TimestampParser;

/// One line of a log file as it appears on disk.
///
/// Only the fields the engine reads are declared; everything else in the
/// line is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLine {
    #[serde(default)]
    pub timestamp: Option<Value>,
    pub message: Option<RawMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    pub role: Option<String>,
    #[serde(default)]
    pub content: Value,
    pub model: Option<String>,
    pub usage: Option<RawUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub service_tier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Other,
}

impl Role {
    pub fn from_raw(role: &str) -> Self {
        match role {
            "user" | "human" => Role::User,
            "assistant" => Role::Assistant,
            _ => Role::Other,
        }
    }
}

/// A typed content block inside a structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
}

impl ContentBlock {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            kind: field("type").unwrap_or_default(),
            text: field("text"),
            name: field("name"),
            input: obj.get("input").cloned(),
        })
    }

    pub fn is_tool_use(&self) -> bool {
        self.kind == "tool_use"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Empty,
}

impl MessageContent {
    /// Strings stay text, arrays become blocks, any other shape is treated as empty.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(text) => MessageContent::Text(text.clone()),
            Value::Array(items) => {
                MessageContent::Blocks(items.iter().filter_map(ContentBlock::from_value).collect())
            }
            _ => MessageContent::Empty,
        }
    }
}

/// Token counters carried by a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenCounts {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub service_tier: Option<String>,
}

impl From<RawUsage> for TokenCounts {
    fn from(raw: RawUsage) -> Self {
        Self {
            input_tokens: raw.input_tokens.unwrap_or(0),
            output_tokens: raw.output_tokens.unwrap_or(0),
            cache_creation_tokens: raw.cache_creation_input_tokens.unwrap_or(0),
            cache_read_tokens: raw.cache_read_input_tokens.unwrap_or(0),
            service_tier: raw.service_tier.filter(|tier| !tier.is_empty()),
        }
    }
}

/// One validated message turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub role: Role,
    pub timestamp: Option<DateTime<Utc>>,
    pub content: MessageContent,
    pub model: Option<String>,
    pub usage: Option<TokenCounts>,
}

impl Record {
    /// Convert a raw line into a record. Lines without a `message.role` are not records.
    pub fn from_raw(raw: RawLine) -> Option<Self> {
        let message = raw.message?;
        let role = message.role?;
        Some(Self {
            role: Role::from_raw(&role),
            timestamp: raw.timestamp.as_ref().and_then(TimestampParser::from_value),
            content: MessageContent::from_value(&message.content),
            model: message.model.filter(|model| !model.is_empty()),
            usage: message.usage.map(TokenCounts::from),
        })
    }
}

/// Identity of a log file for cache validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileIdentity {
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Snapshot of a discovered log file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub project_id: String,
}

impl LogFile {
    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            path: self.path.clone(),
            modified_at: self.modified_at,
            size_bytes: self.size_bytes,
        }
    }

    pub fn conversation_id(&self) -> String {
        conversation_id_for(&self.path)
    }
}

pub fn conversation_id_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub total: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,
    pub messages_with_usage: usize,
    pub total_messages: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub models: Vec<String>,
    pub primary_model: String,
    pub service_tiers: Vec<String>,
    pub current_service_tier: String,
    pub has_multiple_models: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub tool: String,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolUsage {
    pub tool_stats: BTreeMap<String, usize>,
    pub tool_timeline: Vec<ToolInvocation>,
    pub total_tool_calls: usize,
    pub unique_tools: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SquareStatus {
    Pending,
    Success,
    Tool,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSquare {
    #[serde(rename = "type")]
    pub status: SquareStatus,
    pub tooltip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    Empty,
    Active,
    Recent,
    AwaitingResponse,
    Idle,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Recent,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Participant {
    Conversation,
    Human,
    Assistant,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Recent,
    Inactive,
}

/// Derived view of one log file. Holds no raw records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub file_path: PathBuf,
    pub message_count: usize,
    pub file_size_bytes: u64,
    pub last_modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub token_total: u64,
    pub token_usage: TokenUsage,
    pub model_info: ModelInfo,
    pub tool_usage: ToolUsage,
    pub project_name: String,
    pub status: ConversationStatus,
    pub conversation_state: ConversationState,
    pub participant: Participant,
    pub last_activity: Option<DateTime<Utc>>,
    pub has_recent_activity: bool,
    pub status_squares: Vec<StatusSquare>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub last_activity: DateTime<Utc>,
    pub todo_file_count: usize,
    pub status: ProjectStatus,
}

/// A user-authored message timestamp that can open or extend a usage session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SessionStarter {
    pub timestamp: DateTime<Utc>,
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSession {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub message_count: usize,
    pub conversation_ids: BTreeSet<String>,
    pub conversation_count: usize,
    pub duration_hours: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total: usize,
    pub current_month: usize,
    pub this_week: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<UsageSession>>,
}

/// Time-independent totals over every conversation file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorpusTotals {
    pub total_tokens: u64,
    pub total_file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_conversations: usize,
    pub total_tokens: u64,
    pub active_conversations: usize,
    pub active_projects: usize,
    pub avg_tokens_per_conversation: u64,
    pub total_file_size: u64,
    pub total_file_size_formatted: String,
    pub last_activity: Option<DateTime<Utc>>,
    pub claude_sessions: SessionSummary,
}

/// A file that was excluded from the report and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWarning {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: Summary,
    pub conversations: Vec<Conversation>,
    pub active_projects: Vec<Project>,
    pub warnings: Vec<FileWarning>,
}
