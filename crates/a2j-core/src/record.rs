//! Assembla ticket comments as loaded from `ticket-comments.csv`.

use crate::error::Result;
use crate::table::{Row, Table, field, read_table};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::path::Path;

pub const COMMENTS_TABLE: &str = "ticket-comments.csv";

const COMMENT_COLUMNS: &[&str] = &["id", "comment", "user_id", "created_on", "ticket_id"];

/// One Assembla comment. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceComment {
    pub id: String,
    pub ticket_id: String,
    pub user_id: String,
    /// `created_on` exactly as exported.
    pub created_on: String,
    /// Parsed `created_on`, when it is a recognizable timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// `None` when the exported cell is empty.
    pub body: Option<String>,
    /// Every exported column, kept for the skipped-record ledgers.
    pub raw: Row,
}

impl SourceComment {
    #[must_use]
    pub fn from_row(row: &Row) -> Self {
        let created_on = field(row, "created_on").to_string();
        let body = Some(field(row, "comment"))
            .filter(|body| !body.is_empty())
            .map(ToOwned::to_owned);

        Self {
            id: field(row, "id").to_string(),
            ticket_id: field(row, "ticket_id").to_string(),
            user_id: field(row, "user_id").to_string(),
            created_at: parse_timestamp(&created_on),
            created_on,
            body,
            raw: row.clone(),
        }
    }

    /// Instant used to order the replay.
    ///
    /// The parsed `created_on` when there is one, otherwise its leading date.
    /// `None` only for text with no recognizable date at all.
    #[must_use]
    pub fn replay_time(&self) -> Option<DateTime<Utc>> {
        self.created_at.or_else(|| leading_date(&self.created_on))
    }

    /// Body text, with a missing body read as the empty string.
    #[must_use]
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// The comments table plus its header order.
#[derive(Debug, Clone)]
pub struct CommentSet {
    pub headers: Vec<String>,
    pub comments: Vec<SourceComment>,
}

/// Load Assembla comments from the Assembla output directory.
///
/// # Errors
///
/// Fails if the table is missing, unparseable or lacks a required column.
pub fn load_comments(assembla_dir: &Path) -> Result<CommentSet> {
    let table = read_table(&assembla_dir.join(COMMENTS_TABLE))?;
    comments_from_table(&table)
}

/// Convert a loaded table into comments.
///
/// # Errors
///
/// Fails if the table lacks a required column.
pub fn comments_from_table(table: &Table) -> Result<CommentSet> {
    table.require_columns(COMMENT_COLUMNS)?;
    Ok(CommentSet {
        headers: table.headers.clone(),
        comments: table.rows.iter().map(SourceComment::from_row).collect(),
    })
}

/// Parse the timestamp formats found in Assembla exports.
///
/// Accepted, most specific first:
/// - RFC 3339 (`2017-05-18T13:47:13.000Z`, `2017-05-18T13:47:13+02:00`)
/// - with a numeric offset (`2017-05-18 13:47:13 +0000`)
/// - with a trailing `UTC` (`2017-05-18 13:47:13 UTC`)
/// - offset-less (`2017-05-18 13:47:13`, `2017-05-18T13:47:13`), read as UTC
/// - date only (`2017-05-18`), read as midnight UTC
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    let with_offset = ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f %z"]
        .iter()
        .find_map(|format| DateTime::parse_from_str(raw, format).ok());
    if let Some(parsed) = with_offset {
        return Some(parsed.with_timezone(&Utc));
    }

    let naive = [
        "%Y-%m-%d %H:%M:%S UTC",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ]
    .iter()
    .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok());
    if let Some(naive) = naive {
        return Some(naive.and_utc());
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Best-effort instant for a `created_on` that [`parse_timestamp`] rejects:
/// a leading `YYYY-MM-DD` is read as midnight UTC of that day.
#[must_use]
pub fn leading_date(raw: &str) -> Option<DateTime<Utc>> {
    let prefix = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// Render a creation timestamp for the comment preamble.
#[must_use]
pub fn display_timestamp(comment: &SourceComment) -> String {
    comment.created_at.map_or_else(
        || comment.created_on.clone(),
        |ts| ts.format("%Y-%m-%d %H:%M").to_string(),
    )
}
