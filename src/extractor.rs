//! Token, model and tool statistics over a conversation's records
//!
//! All functions here are pure folds over a record slice; the analyzer
//! wraps them in the derived-state cache.

use crate::models::{
    ContentBlock, MessageContent, ModelInfo, Record, Role, TokenUsage, ToolInvocation, ToolUsage,
};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub(crate) const UNKNOWN: &str = "Unknown";
const UNKNOWN_TOOL: &str = "Unknown Tool";

/// `[Tool: Name]` markers embedded in plain-text assistant messages
pub(crate) static TOOL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[Tool:\s*([^\]]+)\]").expect("valid tool marker pattern"));

pub fn token_usage(records: &[Record]) -> TokenUsage {
    let mut usage = TokenUsage {
        total_messages: records.len(),
        ..TokenUsage::default()
    };

    for counts in records.iter().filter_map(|r| r.usage.as_ref()) {
        usage.input_tokens += counts.input_tokens;
        usage.output_tokens += counts.output_tokens;
        usage.cache_creation_tokens += counts.cache_creation_tokens;
        usage.cache_read_tokens += counts.cache_read_tokens;
        usage.messages_with_usage += 1;
    }

    usage.total = usage.input_tokens + usage.output_tokens;
    usage
}

/// Models and service tiers seen in the conversation.
///
/// The current value is the last one seen in record order, not the most
/// frequent.
pub fn model_info(records: &[Record]) -> ModelInfo {
    let mut models: Vec<String> = Vec::new();
    let mut tiers: Vec<String> = Vec::new();
    let mut last_model: Option<&str> = None;
    let mut last_tier: Option<&str> = None;

    for record in records {
        if let Some(model) = record.model.as_deref().filter(|m| !m.is_empty()) {
            push_distinct(&mut models, model);
            last_model = Some(model);
        }
        if let Some(tier) = record
            .usage
            .as_ref()
            .and_then(|u| u.service_tier.as_deref())
            .filter(|t| !t.is_empty())
        {
            push_distinct(&mut tiers, tier);
            last_tier = Some(tier);
        }
    }

    let primary_model = pick_current(last_model, &models);
    let current_service_tier = pick_current(last_tier, &tiers);

    ModelInfo {
        has_multiple_models: models.len() > 1,
        models,
        primary_model,
        service_tiers: tiers,
        current_service_tier,
    }
}

fn push_distinct(values: &mut Vec<String>, value: &str) {
    if !values.iter().any(|v| v == value) {
        values.push(value.to_string());
    }
}

fn pick_current(last: Option<&str>, seen: &[String]) -> String {
    last.map(str::to_string)
        .or_else(|| seen.first().cloned())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Tool invocations made by the assistant, from text markers and
/// structured `tool_use` blocks.
pub fn tool_usage(records: &[Record]) -> ToolUsage {
    let mut timeline: Vec<ToolInvocation> = Vec::new();

    for record in records.iter().filter(|r| r.role == Role::Assistant) {
        match &record.content {
            MessageContent::Text(text) => {
                for captures in TOOL_MARKER.captures_iter(text) {
                    let name = captures.get(1).map_or("", |m| m.as_str().trim());
                    if name.is_empty() {
                        continue;
                    }
                    timeline.push(ToolInvocation {
                        tool: name.to_string(),
                        timestamp: record.timestamp,
                        parameters: None,
                    });
                }
            }
            MessageContent::Blocks(blocks) => {
                timeline.extend(blocks.iter().filter(|b| b.is_tool_use()).map(|block| {
                    invocation_from_block(block, record)
                }));
            }
            MessageContent::Empty => {}
        }
    }

    // Stable: equal timestamps keep file order, undated invocations go last.
    timeline.sort_by(|a, b| match (a.timestamp, b.timestamp) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let mut tool_stats: BTreeMap<String, usize> = BTreeMap::new();
    for invocation in &timeline {
        *tool_stats.entry(invocation.tool.clone()).or_insert(0) += 1;
    }

    ToolUsage {
        total_tool_calls: timeline.len(),
        unique_tools: tool_stats.len(),
        tool_stats,
        tool_timeline: timeline,
    }
}

fn invocation_from_block(block: &ContentBlock, record: &Record) -> ToolInvocation {
    let tool = block
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN_TOOL)
        .to_string();

    ToolInvocation {
        tool,
        timestamp: record.timestamp,
        parameters: Some(
            block
                .input
                .clone()
                .filter(|v| !v.is_null())
                .unwrap_or_else(|| Value::Object(Map::new())),
        ),
    }
}
