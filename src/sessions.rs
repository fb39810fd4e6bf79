//! Rolling-window usage sessions
//!
//! A usage session opens at a user message and stays open until `window`
//! after the latest user message that joined it. Messages at or before the
//! current end extend the session; anything later starts a new one. Only
//! user-authored, dated records ever contribute.

use crate::models::{Record, SessionStarter, SessionSummary, UsageSession};
use crate::parser::SessionStarterProcessor;
use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use std::collections::BTreeSet;

pub const DEFAULT_WINDOW_HOURS: i64 = 5;

/// Timestamps of the dated user records of one conversation
pub fn starters_from_records(records: &[Record], conversation_id: &str) -> Vec<SessionStarter> {
    let mut collector = SessionStarterProcessor::new(conversation_id);
    for record in records {
        collector.push(record);
    }
    collector.into_starters()
}

struct OpenSession {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    message_count: usize,
    conversation_ids: BTreeSet<String>,
}

impl OpenSession {
    fn open(starter: SessionStarter, window: Duration) -> Self {
        Self {
            start: starter.timestamp,
            end: starter.timestamp + window,
            message_count: 1,
            conversation_ids: BTreeSet::from([starter.conversation_id]),
        }
    }

    fn close(self) -> UsageSession {
        let hours = (self.end - self.start).num_milliseconds() as f64 / 3_600_000.0;
        UsageSession {
            start: self.start,
            end: self.end,
            message_count: self.message_count,
            conversation_count: self.conversation_ids.len(),
            conversation_ids: self.conversation_ids,
            duration_hours: (hours * 10.0).round() / 10.0,
        }
    }
}

/// Fold session starters into non-overlapping sessions ordered by start.
///
/// Input order does not matter; starters are sorted by timestamp, ties by
/// conversation id.
pub fn build_sessions(mut starters: Vec<SessionStarter>, window: Duration) -> Vec<UsageSession> {
    starters.sort();

    let mut sessions = Vec::new();
    let mut current: Option<OpenSession> = None;

    for starter in starters {
        current = Some(match current.take() {
            None => OpenSession::open(starter, window),
            Some(mut session) if starter.timestamp <= session.end => {
                session.message_count += 1;
                session.end = session.end.max(starter.timestamp + window);
                session.conversation_ids.insert(starter.conversation_id);
                session
            }
            Some(session) => {
                sessions.push(session.close());
                OpenSession::open(starter, window)
            }
        });
    }

    if let Some(session) = current {
        sessions.push(session.close());
    }

    sessions
}

pub fn summarize(sessions: Vec<UsageSession>, now: DateTime<Utc>) -> SessionSummary {
    if sessions.is_empty() {
        return SessionSummary::default();
    }

    let month_start = start_of_local_month(now);
    let week_start = now - Duration::days(7);

    SessionSummary {
        total: sessions.len(),
        current_month: sessions.iter().filter(|s| s.start >= month_start).count(),
        this_week: sessions.iter().filter(|s| s.start >= week_start).count(),
        sessions: Some(sessions),
    }
}

/// First instant of the local calendar month containing `now`
fn start_of_local_month(now: DateTime<Utc>) -> DateTime<Utc> {
    let local = now.with_timezone(&Local);
    let Some(midnight) = local
        .date_naive()
        .with_day(1)
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    else {
        return now;
    };

    // Midnight can fall in a DST gap; use the naive time as UTC then.
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
