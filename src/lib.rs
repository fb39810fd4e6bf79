//! Claude Analytics Library
//!
//! Streaming analytics over the local history of Claude Code conversation
//! logs: append-only JSONL files, one per conversation, grouped into project
//! directories. The library reads them without materializing whole files,
//! memoizes derived state against file fingerprints, classifies message and
//! conversation status, and reconstructs rolling 5-hour usage sessions.
//!
//! ## Architecture Overview
//!
//! Modules, leaves first:
//!
//! - [`file_discovery`] - Walks a log root for log files and project directories
//! - [`parser`] - Lazy, restartable record streams and single-pass processors
//! - [`cache`] - Fingerprint-keyed memoization with injectable storage
//! - [`extractor`] - Token, model and tool statistics
//! - [`classifier`] - Status squares, conversation state and activity buckets
//! - [`sessions`] - Rolling-window usage sessions and their summary
//! - [`analyzer`] - Orchestrates a full scan into an [`AnalyticsReport`]
//!
//! Supporting modules:
//!
//! - [`models`] - Data structures from raw lines to the final report
//! - [`config`] - TOML configuration with environment overrides
//! - [`logging`] - Structured logging with JSON and pretty formats
//! - [`error`] - Errors that abort a scan
//! - [`display`] - Terminal and JSON rendering for the CLI
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use claude_analytics::{AnalyzerOptions, ConversationAnalyzer, DerivedStateCache};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let analyzer = ConversationAnalyzer::new(
//!     "/home/me/.claude/projects",
//!     AnalyzerOptions::default(),
//!     Arc::new(DerivedStateCache::in_memory()),
//! );
//! let report = analyzer.scan().await?;
//! for conversation in report.conversations.iter().take(5) {
//!     println!("{} {} tokens", conversation.id, conversation.token_total);
//! }
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod display;
pub mod error;
pub mod extractor;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod parser;
pub mod sessions;
pub mod timestamp_parser;

pub use analyzer::{AnalyzerOptions, ConversationAnalyzer, ScanCancel};
pub use cache::{CacheStore, DerivedStateCache, MemoryStore, NoopStore};
pub use error::AnalyticsError;
pub use models::*;
