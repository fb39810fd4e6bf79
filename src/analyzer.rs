//! Conversation Analysis Engine
//!
//! This module orchestrates a full scan of a log root and folds the result
//! into a single [`AnalyticsReport`].
//!
//! ## Pipeline
//!
//! 1. **Root check**: the root must be listable, otherwise the scan fails
//!    with [`AnalyticsError::RootUnreadable`]
//! 2. **Discovery**: log files and first-level project directories
//! 3. **Per-file work**: on a bounded pool of blocking workers, each file is
//!    re-stat'ed, its records and derived values are pulled through the
//!    [`DerivedStateCache`], and a [`Conversation`] is built
//! 4. **Aggregation**: session starters from every file go through the
//!    rolling-window sessionizer; corpus totals and the session list are
//!    memoized as whole-corpus computations
//! 5. **Summary**: counts, averages and formatted sizes
//!
//! ## Failure Isolation
//!
//! A file that fails (vanished before stat, producer error, timeout, worker
//! panic) is left out of the report and listed in
//! [`AnalyticsReport::warnings`]. Only an unreadable root or a cancelled
//! scan fail the whole call.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use claude_analytics::{AnalyzerOptions, ConversationAnalyzer, DerivedStateCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), claude_analytics::AnalyticsError> {
//! let cache = Arc::new(DerivedStateCache::in_memory());
//! let analyzer = ConversationAnalyzer::new("/home/me/.claude/projects", AnalyzerOptions::default(), cache);
//!
//! let report = analyzer.scan().await?;
//! println!("{} conversations", report.summary.total_conversations);
//! # Ok(())
//! # }
//! ```

use crate::cache::DerivedStateCache;
use crate::classifier::{self, ActivityThresholds};
use crate::config::Config;
use crate::error::AnalyticsError;
use crate::extractor;
use crate::file_discovery::{project_name_from_id, Discovery, FileDiscovery};
use crate::logging::scan_span;
use crate::models::{
    AnalyticsReport, Conversation, ConversationStatus, CorpusTotals, FileWarning, LogFile,
    ProjectStatus, SessionStarter, Summary, UsageSession,
};
use crate::parser::RecordReader;
use crate::sessions;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

const RECENT_ACTIVITY_DAYS: i64 = 7;

/// Cloneable cancellation flag shared between a scan and its caller
#[derive(Debug, Clone, Default)]
pub struct ScanCancel(Arc<AtomicBool>);

impl ScanCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tunables for one analyzer, usually projected from [`Config`]
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub max_concurrency: usize,
    pub file_timeout: std::time::Duration,
    pub buffer_size: usize,
    pub session_window: Duration,
    pub status_square_count: usize,
    pub recent_message_count: usize,
    pub conversation_thresholds: ActivityThresholds,
    pub project_thresholds: ActivityThresholds,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl AnalyzerOptions {
    pub fn from_config(config: &Config) -> Self {
        let analytics = &config.analytics;
        Self {
            max_concurrency: config.processing.max_concurrency.max(1),
            file_timeout: std::time::Duration::from_secs(config.processing.file_timeout_secs),
            buffer_size: config.processing.buffer_size_kb * 1024,
            session_window: Duration::hours(analytics.session_window_hours),
            status_square_count: analytics.status_square_count,
            recent_message_count: analytics.recent_message_count,
            conversation_thresholds: ActivityThresholds::new(
                Duration::minutes(analytics.active_threshold_mins),
                Duration::minutes(analytics.recent_threshold_mins),
            ),
            project_thresholds: ActivityThresholds::new(
                Duration::hours(analytics.project_active_hours),
                Duration::hours(analytics.project_recent_hours),
            ),
        }
    }
}

struct AnalyzerInner {
    root: PathBuf,
    options: AnalyzerOptions,
    reader: RecordReader,
    discovery: FileDiscovery,
    cache: Arc<DerivedStateCache>,
}

/// Per-file result handed back from a worker
struct FileOutcome {
    file: LogFile,
    conversation: Conversation,
    starters: Vec<SessionStarter>,
}

#[derive(Clone)]
pub struct ConversationAnalyzer {
    inner: Arc<AnalyzerInner>,
}

impl ConversationAnalyzer {
    pub fn new(root: impl Into<PathBuf>, options: AnalyzerOptions, cache: Arc<DerivedStateCache>) -> Self {
        let inner = AnalyzerInner {
            root: root.into(),
            reader: RecordReader::new(options.buffer_size),
            discovery: FileDiscovery::new(options.project_thresholds),
            options,
            cache,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn cache(&self) -> &Arc<DerivedStateCache> {
        &self.inner.cache
    }

    pub async fn scan(&self) -> Result<AnalyticsReport, AnalyticsError> {
        self.scan_with_cancel(ScanCancel::new()).await
    }

    pub async fn scan_with_cancel(&self, cancel: ScanCancel) -> Result<AnalyticsReport, AnalyticsError> {
        let span = scan_span(&self.inner.root);
        self.run_scan(cancel).instrument(span).await
    }

    async fn run_scan(&self, cancel: ScanCancel) -> Result<AnalyticsReport, AnalyticsError> {
        let inner = &self.inner;
        let now = Utc::now();

        if let Err(source) = tokio::fs::read_dir(&inner.root).await {
            return Err(AnalyticsError::RootUnreadable {
                path: inner.root.clone(),
                source,
            });
        }

        let discovery = {
            let inner = Arc::clone(inner);
            tokio::task::spawn_blocking(move || inner.discovery.discover(&inner.root, now))
                .await
                .map_err(|e| AnalyticsError::Task(e.to_string()))?
        };
        let Discovery {
            log_files,
            projects,
        } = discovery;

        info!(
            files = log_files.len(),
            projects = projects.len(),
            max_concurrency = inner.options.max_concurrency,
            "Starting scan"
        );

        let results: Vec<(PathBuf, Result<FileOutcome, String>)> = stream::iter(log_files)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|file| self.process_file(file, now, cancel.clone()))
            .buffer_unordered(inner.options.max_concurrency)
            .collect()
            .await;

        if cancel.is_cancelled() {
            warn!("Scan cancelled before completion");
            return Err(AnalyticsError::Cancelled);
        }

        let mut outcomes = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for (path, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(reason) => {
                    warn!(file = %path.display(), reason = %reason, "Omitting conversation");
                    warnings.push(FileWarning { path, reason });
                }
            }
        }
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let mut conversation_files = Vec::with_capacity(outcomes.len());
        let mut starters = Vec::new();
        let mut conversations = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            conversation_files.push(outcome.file);
            starters.extend(outcome.starters);
            conversations.push(outcome.conversation);
        }

        conversations.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });

        let totals: CorpusTotals = inner
            .cache
            .cached_computation(
                "totals",
                || {
                    Ok(CorpusTotals {
                        total_tokens: conversations.iter().map(|c| c.token_total).sum(),
                        total_file_size: conversations.iter().map(|c| c.file_size_bytes).sum(),
                    })
                },
                &conversation_files,
            )
            .map_err(|e| AnalyticsError::Task(e.to_string()))?;

        // Sessions depend on the window as well as on the files.
        let window = inner.options.session_window;
        let usage_sessions: Vec<UsageSession> = inner
            .cache
            .cached_computation(
                &format!("sessions:{}", window.num_seconds()),
                move || Ok(sessions::build_sessions(starters, window)),
                &conversation_files,
            )
            .map_err(|e| AnalyticsError::Task(e.to_string()))?;

        let summary = build_summary(&conversations, &projects, totals, usage_sessions, now);

        let stats = inner.cache.stats();
        info!(
            conversations = summary.total_conversations,
            warnings = warnings.len(),
            sessions = summary.claude_sessions.total,
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            "Scan finished"
        );

        Ok(AnalyticsReport {
            summary,
            conversations,
            active_projects: projects,
            warnings,
        })
    }

    async fn process_file(
        &self,
        file: LogFile,
        now: DateTime<Utc>,
        cancel: ScanCancel,
    ) -> (PathBuf, Result<FileOutcome, String>) {
        let path = file.path.clone();
        let inner = Arc::clone(&self.inner);
        let timeout = inner.options.file_timeout;

        let task = tokio::task::spawn_blocking(move || analyze_file(&inner, file, now, &cancel));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(outcome))) => Ok(outcome),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(join_error)) => Err(format!("worker failed: {join_error}")),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        };

        (path, result)
    }
}

fn analyze_file(
    inner: &AnalyzerInner,
    discovered: LogFile,
    now: DateTime<Utc>,
    cancel: &ScanCancel,
) -> anyhow::Result<FileOutcome> {
    use anyhow::Context;

    // Refresh identity so the cache sees the file as it is now.
    let stat = inner
        .reader
        .stat(&discovered.path)
        .context("cannot stat log file")?;
    let file = LogFile {
        size_bytes: stat.size_bytes,
        modified_at: stat.modified_at,
        created_at: stat.created_at,
        ..discovered
    };

    let cache = &inner.cache;
    let options = &inner.options;

    let records = cache.records(&file, || inner.reader.read_all(&file.path, cancel))?;
    let token_usage = cache.token_usage(&file, || Ok(extractor::token_usage(&records)))?;
    let model_info = cache.model_info(&file, || Ok(extractor::model_info(&records)))?;
    let tool_usage = cache.tool_usage(&file, || Ok(extractor::tool_usage(&records)))?;
    let status_squares = cache.status_squares(&file, || {
        Ok(classifier::status_squares(&records, options.status_square_count))
    })?;

    let token_total = if token_usage.messages_with_usage > 0 {
        token_usage.input_tokens + token_usage.output_tokens
    } else {
        file.size_bytes.div_ceil(4)
    };

    let recent = &records[records.len().saturating_sub(options.recent_message_count)..];
    let last_record = records.last();
    let conversation_state =
        classifier::conversation_state(last_record, now, &options.conversation_thresholds);

    let id = file.conversation_id();
    let starters = sessions::starters_from_records(&records, &id);

    debug!(
        file = %file.path.display(),
        records = records.len(),
        tokens = token_total,
        "Analyzed conversation"
    );

    let conversation = Conversation {
        id,
        file_path: file.path.clone(),
        message_count: records.len(),
        file_size_bytes: file.size_bytes,
        last_modified: file.modified_at,
        created: file.created_at,
        token_total,
        token_usage,
        model_info,
        tool_usage,
        project_name: project_name_from_id(&file.project_id),
        status: classifier::conversation_status(conversation_state),
        conversation_state,
        participant: classifier::participant(recent),
        last_activity: last_record.and_then(|r| r.timestamp),
        has_recent_activity: now - file.modified_at < Duration::days(RECENT_ACTIVITY_DAYS),
        status_squares,
    };

    Ok(FileOutcome {
        file,
        conversation,
        starters,
    })
}

fn build_summary(
    conversations: &[Conversation],
    projects: &[crate::models::Project],
    totals: CorpusTotals,
    usage_sessions: Vec<UsageSession>,
    now: DateTime<Utc>,
) -> Summary {
    let total_conversations = conversations.len();
    let avg_tokens_per_conversation = if total_conversations > 0 {
        (totals.total_tokens as f64 / total_conversations as f64).round() as u64
    } else {
        0
    };

    Summary {
        total_conversations,
        total_tokens: totals.total_tokens,
        active_conversations: conversations
            .iter()
            .filter(|c| c.status == ConversationStatus::Active)
            .count(),
        active_projects: projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Active)
            .count(),
        avg_tokens_per_conversation,
        total_file_size: totals.total_file_size,
        total_file_size_formatted: format_bytes(totals.total_file_size),
        last_activity: conversations.first().map(|c| c.last_modified),
        claude_sessions: sessions::summarize(usage_sessions, now),
    }
}

/// Human-readable size with up to two decimals, e.g. `1.5 KB`
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(1_073_741_824 * 3), "3 GB");
        assert_eq!(format_bytes(1_099_511_627_776), "1024 GB");
        assert_eq!(format_bytes(1234), "1.21 KB");
    }

    #[test]
    fn test_scan_cancel_is_shared() {
        let cancel = ScanCancel::new();
        let clone = cancel.clone();
        assert!(!clone.is_cancelled());
        cancel.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.processing.buffer_size_kb = 8;
        config.analytics.session_window_hours = 3;
        let options = AnalyzerOptions::from_config(&config);

        assert_eq!(options.buffer_size, 8192);
        assert_eq!(options.session_window, Duration::hours(3));
        assert_eq!(options.conversation_thresholds, ActivityThresholds::conversations_default());
        assert_eq!(options.project_thresholds, ActivityThresholds::projects_default());
        assert_eq!(options.file_timeout, std::time::Duration::from_secs(30));
    }

    #[test]
    fn test_build_summary_empty() {
        let summary = build_summary(&[], &[], CorpusTotals::default(), Vec::new(), Utc::now());
        assert_eq!(summary.total_conversations, 0);
        assert_eq!(summary.avg_tokens_per_conversation, 0);
        assert_eq!(summary.total_file_size_formatted, "0 Bytes");
        assert!(summary.last_activity.is_none());
        assert_eq!(summary.claude_sessions.total, 0);
    }
}
