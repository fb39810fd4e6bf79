//! Output Formatting and Display Management
//!
//! Renders an [`AnalyticsReport`] for the terminal, either as colored
//! human-readable text or as pretty-printed JSON with the report's camelCase
//! field names.
//!
//! ## Views
//!
//! - **Summary**: totals, averages, usage sessions and the last activity
//! - **Conversations**: most recently modified first, with token counts,
//!   state and the status squares of the latest messages
//! - **Sessions**: rolling 5-hour usage sessions, newest first
//! - **Projects**: project directories with their activity bucket
//!
//! Files that were left out of the scan are listed after every text view.

use crate::models::*;
use colored::{ColoredString, Colorize};
use serde::Serialize;

const DEFAULT_CONVERSATION_LIMIT: usize = 20;

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_summary(&self, report: &AnalyticsReport, json_output: bool) {
        if json_output {
            print_json(&report.summary);
            return;
        }

        let summary = &report.summary;
        print_header("Claude Code Conversation Analytics - Summary");

        println!(
            "\n{} {} conversations • {} tokens • {} on disk\n",
            "📊".bright_yellow(),
            summary.total_conversations.to_string().bright_white().bold(),
            format_count(summary.total_tokens).bright_green().bold(),
            summary.total_file_size_formatted.bright_white()
        );
        println!(
            "   Active conversations: {}",
            summary.active_conversations.to_string().bright_white().bold()
        );
        println!(
            "   Active projects: {}",
            summary.active_projects.to_string().bright_white().bold()
        );
        println!(
            "   Avg tokens per conversation: {}",
            format_count(summary.avg_tokens_per_conversation).bright_white()
        );
        println!(
            "   Usage sessions: {} total, {} this month, {} this week",
            summary.claude_sessions.total.to_string().bright_white().bold(),
            summary.claude_sessions.current_month.to_string().bright_white(),
            summary.claude_sessions.this_week.to_string().bright_white()
        );
        if let Some(last) = summary.last_activity {
            println!(
                "   Last activity: {}",
                last.format("%Y-%m-%d %H:%M UTC").to_string().bright_cyan()
            );
        }

        print_warnings(&report.warnings);
    }

    pub fn display_conversations(&self, report: &AnalyticsReport, limit: Option<usize>, json_output: bool) {
        let limit = limit.unwrap_or(DEFAULT_CONVERSATION_LIMIT);
        let shown: Vec<&Conversation> = report.conversations.iter().take(limit).collect();

        if json_output {
            print_json(&shown);
            return;
        }

        print_header("Claude Code Conversation Analytics - Conversations");
        println!(
            "\n{} Showing {} of {} conversations\n",
            "💬".bright_blue(),
            shown.len().to_string().bright_white().bold(),
            report.conversations.len().to_string().bright_white()
        );

        for conversation in shown {
            println!(
                "{} {} | {} tokens, {} messages",
                state_label(conversation.conversation_state),
                conversation.id.bright_white().bold(),
                format_count(conversation.token_total).bright_green(),
                conversation.message_count.to_string().bright_white()
            );
            println!(
                "   {} • {} • {}",
                conversation.project_name.bright_cyan(),
                conversation.model_info.primary_model.bright_white(),
                conversation.last_modified.format("%Y-%m-%d %H:%M").to_string().dimmed()
            );
            if !conversation.status_squares.is_empty() {
                let squares: String = conversation
                    .status_squares
                    .iter()
                    .map(|s| square_glyph(s.status).to_string())
                    .collect();
                println!("   {}", squares);
            }
            println!();
        }

        print_warnings(&report.warnings);
    }

    pub fn display_sessions(&self, report: &AnalyticsReport, json_output: bool) {
        let summary = &report.summary.claude_sessions;
        if json_output {
            print_json(summary);
            return;
        }

        print_header("Claude Code Conversation Analytics - Usage Sessions");
        println!(
            "\n{} {} sessions • {} this month • {} this week\n",
            "⏱".bright_yellow(),
            summary.total.to_string().bright_white().bold(),
            summary.current_month.to_string().bright_white(),
            summary.this_week.to_string().bright_white()
        );

        for session in summary.sessions.iter().flatten().rev() {
            println!(
                "   {} → {} ({}h, {} messages, {} conversations)",
                session.start.format("%Y-%m-%d %H:%M").to_string().bright_white().bold(),
                session.end.format("%H:%M").to_string().bright_white(),
                format!("{:.1}", session.duration_hours).bright_yellow(),
                session.message_count.to_string().bright_white(),
                session.conversation_count.to_string().bright_cyan()
            );
        }

        print_warnings(&report.warnings);
    }

    pub fn display_projects(&self, report: &AnalyticsReport, json_output: bool) {
        if json_output {
            print_json(&report.active_projects);
            return;
        }

        print_header("Claude Code Conversation Analytics - Projects");
        println!();
        for project in &report.active_projects {
            println!(
                "{} {} | last activity {} ({} todo files)",
                project_label(project.status),
                project.name.bright_cyan().bold(),
                project.last_activity.format("%Y-%m-%d %H:%M").to_string().bright_white(),
                project.todo_file_count.to_string().bright_white()
            );
        }

        print_warnings(&report.warnings);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json_str) => println!("{}", json_str),
        Err(e) => eprintln!("Error serializing report to JSON: {}", e),
    }
}

fn print_header(title: &str) {
    println!("\n{}", "=".repeat(80).bright_cyan());
    println!("{}", title.bright_white().bold());
    println!("{}", "=".repeat(80).bright_cyan());
}

fn print_warnings(warnings: &[FileWarning]) {
    if warnings.is_empty() {
        return;
    }
    println!("\n{} {} files skipped:", "⚠".bright_yellow(), warnings.len());
    for warning in warnings {
        println!("   {}: {}", warning.path.display(), warning.reason.bright_red());
    }
}

fn state_label(state: ConversationState) -> ColoredString {
    match state {
        ConversationState::Active => "● active".bright_green(),
        ConversationState::Recent => "● recent".bright_yellow(),
        ConversationState::AwaitingResponse => "○ awaiting".bright_blue(),
        ConversationState::Idle => "○ idle".white(),
        ConversationState::Inactive => "○ inactive".dimmed(),
        ConversationState::Empty => "○ empty".dimmed(),
    }
}

fn project_label(status: ProjectStatus) -> ColoredString {
    match status {
        ProjectStatus::Active => "●".bright_green(),
        ProjectStatus::Recent => "●".bright_yellow(),
        ProjectStatus::Inactive => "○".dimmed(),
    }
}

fn square_glyph(status: SquareStatus) -> ColoredString {
    match status {
        SquareStatus::Pending => "■".bright_blue(),
        SquareStatus::Success => "■".bright_green(),
        SquareStatus::Tool => "■".bright_yellow(),
        SquareStatus::Error => "■".bright_red(),
    }
}

/// Thousands-separated integer, e.g. `1,234,567`
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }
}
