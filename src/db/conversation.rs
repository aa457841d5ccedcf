//! Conversation log repository
//!
//! Every finished turn (including failed ones) is appended as one row; the
//! `logs` subcommand reads them back newest first.

use std::fmt::Write as _;
use std::path::Path;

use chrono::NaiveDate;
use rusqlite::types::Value;

use super::{DbPool, SCHEMA_VERSION};
use crate::conversation::{TurnLog, TurnRecord, TurnStatus};
use crate::{Error, Result};

const RULE_WIDTH: usize = 80;

/// A logged exchange as read back from the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub id: i64,
    /// `YYYY-MM-DD HH:MM:SS` in UTC, as stored by `SQLite`
    pub created_at: String,
    pub user_input: Option<String>,
    pub assistant_response: Option<String>,
    pub status: TurnStatus,
    pub error_message: Option<String>,
    pub schema_version: i32,
}

/// Filters for [`ConversationLog::recent`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Maximum number of entries returned
    pub limit: usize,
    /// Keyword matched against user input or assistant response
    pub search: Option<String>,
    /// Only entries created on or after this `YYYY-MM-DD` date
    pub since: Option<String>,
}

impl Default for LogQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            search: None,
            since: None,
        }
    }
}

/// `SQLite`-backed turn log
#[derive(Clone)]
pub struct ConversationLog {
    pool: DbPool,
}

impl ConversationLog {
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Open (or create) the log database at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or migrated
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(super::init(path)?))
    }

    /// Append one turn
    ///
    /// # Errors
    ///
    /// Returns error if the insert fails
    pub fn save(&self, record: &TurnRecord) -> Result<i64> {
        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO conversations
                (user_input, assistant_response, status, error_message, schema_version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.user_input,
                record.assistant_response,
                record.status.as_str(),
                record.error_message,
                SCHEMA_VERSION,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Query logged turns, newest first
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `since` is not a `YYYY-MM-DD` date,
    /// or a database error if the query fails
    pub fn recent(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let mut sql = String::from(
            "SELECT id, created_at, user_input, assistant_response, status, error_message,
                    schema_version
             FROM conversations WHERE 1 = 1",
        );
        let mut params: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
            sql.push_str(" AND (user_input LIKE ? OR assistant_response LIKE ?)");
            let pattern = format!("%{search}%");
            params.push(Value::Text(pattern.clone()));
            params.push(Value::Text(pattern));
        }

        if let Some(since) = query.since.as_deref() {
            let date = parse_since(since)?;
            sql.push_str(" AND DATE(created_at) >= ?");
            params.push(Value::Text(date.format("%Y-%m-%d").to_string()));
        }

        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");
        params.push(Value::Integer(i64::try_from(query.limit).unwrap_or(i64::MAX)));

        let conn = self
            .pool
            .get()
            .map_err(|e| Error::Database(e.to_string()))?;
        let mut stmt = conn.prepare(&sql)?;

        let entries = stmt
            .query_map(rusqlite::params_from_iter(params), |row| {
                Ok(LogEntry {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    user_input: row.get(2)?,
                    assistant_response: row.get(3)?,
                    status: TurnStatus::parse(&row.get::<_, String>(4)?)
                        .unwrap_or(TurnStatus::Failed),
                    error_message: row.get(5)?,
                    schema_version: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::debug!(count = entries.len(), "queried conversation log");
        Ok(entries)
    }
}

impl TurnLog for ConversationLog {
    fn log_turn(&self, record: &TurnRecord) -> Result<()> {
        let id = self.save(record)?;
        tracing::debug!(id, status = %record.status, "turn logged");
        Ok(())
    }
}

/// Validate a `YYYY-MM-DD` date filter
///
/// # Errors
///
/// Returns a configuration error if the date does not parse
pub fn parse_since(since: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(since.trim(), "%Y-%m-%d").map_err(|_| {
        Error::Config(format!("invalid date '{since}', expected YYYY-MM-DD"))
    })
}

/// Render an entry for terminal display
#[must_use]
pub fn format_entry(entry: &LogEntry) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "=".repeat(RULE_WIDTH));
    let _ = writeln!(
        out,
        "ID: {} | {} | Status: {}",
        entry.id, entry.created_at, entry.status
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    match entry.user_input.as_deref().filter(|s| !s.is_empty()) {
        Some(input) => {
            let _ = writeln!(out, "User: {input}");
        }
        None => out.push_str("User: [No input captured]\n"),
    }
    out.push('\n');

    match (entry.status, entry.assistant_response.as_deref()) {
        (TurnStatus::Completed, Some(response)) if !response.is_empty() => {
            let _ = writeln!(out, "Assistant: {response}");
        }
        (TurnStatus::Failed, _) => {
            out.push_str("Assistant: [Failed to generate response]\n");
            if let Some(error) = &entry.error_message {
                let _ = writeln!(out, "Error: {error}");
            }
        }
        _ => out.push_str("Assistant: [No response]\n"),
    }

    out
}
