//! Sequential comment replay.
//!
//! Comments are posted strictly one at a time in the order given (the filter
//! stage sorts them oldest first). A failed comment is recorded in the
//! failure ledger and the run moves on; prior successes are never rolled
//! back. Every success is written to the import ledger before the next
//! comment is attempted, which is what makes an interrupted run resumable.

use crate::error::Result;
use crate::filter::FilterOutcome;
use crate::identity::{IdentityMap, unknown};
use crate::record::{SourceComment, display_timestamp};
use crate::remote::{AuthorStrategy, Credentials, IssueApi, prepare_comment};
use crate::rewrite::{ContentType, RewriteContext, rewrite};
use crate::table::{Ledger, read_column_values, write_table};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const IMPORTED_LEDGER: &str = "jira-comments.csv";
pub const DIFF_LEDGER: &str = "jira-comments-diffs.csv";
pub const FAILED_LEDGER: &str = "jira-comments-failed.csv";
pub const SKIPPED_EMPTY_LEDGER: &str = "jira-comments-skipped-empty.csv";
pub const SKIPPED_COMMIT_LEDGER: &str = "jira-comments-skipped-commit.csv";

/// Column of the import ledger used to recognize already migrated comments.
pub const IMPORTED_KEY_COLUMN: &str = "assembla_comment_id";

/// Output locations of one comment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerPaths {
    pub imported: PathBuf,
    pub diffs: PathBuf,
    pub failed: PathBuf,
    pub skipped_empty: PathBuf,
    pub skipped_commit: PathBuf,
}

impl LedgerPaths {
    #[must_use]
    pub fn in_dir(jira_dir: &Path) -> Self {
        Self {
            imported: jira_dir.join(IMPORTED_LEDGER),
            diffs: jira_dir.join(DIFF_LEDGER),
            failed: jira_dir.join(FAILED_LEDGER),
            skipped_empty: jira_dir.join(SKIPPED_EMPTY_LEDGER),
            skipped_commit: jira_dir.join(SKIPPED_COMMIT_LEDGER),
        }
    }

    /// Remove the import, diff and failure ledgers left by an earlier run.
    ///
    /// # Errors
    ///
    /// Fails if an existing ledger cannot be removed.
    pub fn clear_run_ledgers(&self) -> Result<()> {
        for path in [&self.imported, &self.diffs, &self.failed] {
            if path.is_file() {
                std::fs::remove_file(path)?;
                tracing::debug!(path = %path.display(), "removed ledger from earlier run");
            }
        }
        Ok(())
    }
}

/// One row per migrated comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportLedgerRow {
    pub jira_comment_id: String,
    pub jira_ticket_id: String,
    pub jira_ticket_key: String,
    pub assembla_comment_id: String,
    pub assembla_ticket_id: String,
    pub user_login: String,
    pub body: String,
}

/// One row per migrated comment whose body had to be rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffRecord {
    pub jira_comment_id: String,
    pub jira_ticket_id: String,
    pub jira_ticket_key: String,
    pub assembla_comment_id: String,
    pub assembla_ticket_id: String,
    pub before: String,
    pub after: String,
}

/// One row per comment that could not be migrated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRow {
    pub assembla_comment_id: String,
    pub assembla_ticket_id: String,
    pub error: String,
    pub failed_at: String,
}

/// The three ledgers the driver appends to.
pub struct Ledgers {
    pub imported: Ledger<ImportLedgerRow>,
    pub diffs: Ledger<DiffRecord>,
    pub failed: Ledger<FailureRow>,
}

impl Ledgers {
    /// With `resume`, new rows go below rows from earlier runs; otherwise the
    /// ledgers are truncated on their first write.
    #[must_use]
    pub fn open(paths: &LedgerPaths, resume: bool) -> Self {
        if resume {
            Self {
                imported: Ledger::resume(&paths.imported),
                diffs: Ledger::resume(&paths.diffs),
                failed: Ledger::resume(&paths.failed),
            }
        } else {
            Self {
                imported: Ledger::fresh(&paths.imported),
                diffs: Ledger::fresh(&paths.diffs),
                failed: Ledger::fresh(&paths.failed),
            }
        }
    }
}

/// Source ids already present in an import ledger from an earlier run.
///
/// # Errors
///
/// Fails if the ledger exists but cannot be parsed.
pub fn previously_imported(paths: &LedgerPaths) -> Result<HashSet<String>> {
    read_column_values(&paths.imported, IMPORTED_KEY_COLUMN)
}

/// Write the comments the filter stage dropped, with every source column,
/// to the two skipped-record tables.
///
/// A table is only written when it has rows; a stale table from an earlier
/// run is removed otherwise.
///
/// # Errors
///
/// Fails if either table cannot be written or removed.
pub fn write_skipped(paths: &LedgerPaths, headers: &[String], outcome: &FilterOutcome) -> Result<()> {
    write_skipped_table(&paths.skipped_empty, headers, &outcome.skipped_empty)?;
    write_skipped_table(&paths.skipped_commit, headers, &outcome.skipped_commit)
}

fn write_skipped_table(path: &Path, headers: &[String], comments: &[SourceComment]) -> Result<()> {
    if comments.is_empty() {
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
        return Ok(());
    }
    write_table(path, headers, comments.iter().map(|comment| &comment.raw))
}

/// Running counters for a run, owned by the caller of [`CommentMigration::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationState {
    /// Comments a create was attempted for (including unresolved parents).
    pub attempted: usize,
    pub imported: usize,
    pub diffs: usize,
    pub failed: usize,
    /// Comments skipped because an earlier run already migrated them.
    pub skipped_existing: usize,
}

/// What happened to one comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created { comment_id: String, rewritten: bool },
    Failed { error: String },
    AlreadyImported,
}

/// Emitted once per comment, after its ledgers are written.
#[derive(Debug, Clone)]
pub struct ProgressEvent<'a> {
    pub counter: usize,
    pub total: usize,
    pub url: &'a str,
    pub comment_id: &'a str,
    pub outcome: &'a Outcome,
}

impl ProgressEvent<'_> {
    /// Whole-number share of the run completed, 0..=100.
    #[must_use]
    pub const fn percentage(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.counter * 100 / self.total
        }
    }
}

/// Replays Assembla comments into Jira through an [`IssueApi`].
pub struct CommentMigration<'a, A: IssueApi> {
    api: &'a A,
    identity: &'a IdentityMap,
    strategy: AuthorStrategy,
    admin: Credentials,
    already_imported: HashSet<String>,
}

impl<'a, A: IssueApi> CommentMigration<'a, A> {
    #[must_use]
    pub fn new(
        api: &'a A,
        identity: &'a IdentityMap,
        strategy: AuthorStrategy,
        admin: Credentials,
    ) -> Self {
        Self {
            api,
            identity,
            strategy,
            admin,
            already_imported: HashSet::new(),
        }
    }

    /// Skip comments whose Assembla id is in `ids`.
    #[must_use]
    pub fn skipping(mut self, ids: HashSet<String>) -> Self {
        self.already_imported = ids;
        self
    }

    /// Migrate `comments` in order, updating `state` and the ledgers as it goes.
    ///
    /// Per-comment failures are recorded, not returned.
    ///
    /// # Errors
    ///
    /// Only a ledger write failure aborts the run.
    pub fn run(
        &self,
        comments: &[SourceComment],
        ledgers: &mut Ledgers,
        state: &mut MigrationState,
        mut on_progress: impl FnMut(&ProgressEvent<'_>),
    ) -> Result<()> {
        let total = comments.len();
        let rewrite_ctx =
            RewriteContext::new(self.identity, ContentType::Comment).with_strikethrough(true);

        for (index, comment) in comments.iter().enumerate() {
            let counter = index + 1;
            let issue = self.identity.issue(&comment.ticket_id);
            let url = self.api.comment_url(
                &issue.map_or_else(|| unknown(&comment.ticket_id), |issue| issue.id.clone()),
            );

            let outcome = if self.already_imported.contains(&comment.id) {
                state.skipped_existing += 1;
                Outcome::AlreadyImported
            } else {
                state.attempted += 1;
                self.migrate_one(comment, &rewrite_ctx, ledgers, state)?
            };

            on_progress(&ProgressEvent {
                counter,
                total,
                url: &url,
                comment_id: &comment.id,
                outcome: &outcome,
            });
        }

        tracing::info!(
            attempted = state.attempted,
            imported = state.imported,
            diffs = state.diffs,
            failed = state.failed,
            skipped_existing = state.skipped_existing,
            "comment migration finished"
        );

        Ok(())
    }

    fn migrate_one(
        &self,
        comment: &SourceComment,
        rewrite_ctx: &RewriteContext<'_>,
        ledgers: &mut Ledgers,
        state: &mut MigrationState,
    ) -> Result<Outcome> {
        let Some(issue) = self.identity.issue(&comment.ticket_id) else {
            let error = format!("no Jira issue for Assembla ticket {}", comment.ticket_id);
            return record_failure(self.identity, comment, error, ledgers, state);
        };

        let original = comment.body_text();
        let rewritten = rewrite(original, rewrite_ctx);
        let author = self.identity.user(&comment.user_id);
        let prepared = prepare_comment(
            self.strategy,
            &self.admin,
            &comment.user_id,
            author,
            &display_timestamp(comment),
            &rewritten,
        );

        let created =
            match self
                .api
                .create_comment(&issue.id, &prepared.credentials, &prepared.payload)
            {
                Ok(created) => created,
                Err(err) => {
                    return record_failure(self.identity, comment, err.to_string(), ledgers, state);
                }
            };

        ledgers.imported.append(&ImportLedgerRow {
            jira_comment_id: created.id.clone(),
            jira_ticket_id: issue.id.clone(),
            jira_ticket_key: issue.key.clone(),
            assembla_comment_id: comment.id.clone(),
            assembla_ticket_id: comment.ticket_id.clone(),
            user_login: author.map(|user| user.login.clone()).unwrap_or_default(),
            body: rewritten.clone(),
        })?;
        state.imported += 1;
        tracing::debug!(
            comment_id = %comment.id,
            issue = %issue.key,
            author = %self.identity.author_label(&comment.user_id),
            jira_comment_id = %created.id,
            "comment created"
        );

        let changed = rewritten != original;
        if changed {
            ledgers.diffs.append(&DiffRecord {
                jira_comment_id: created.id.clone(),
                jira_ticket_id: issue.id.clone(),
                jira_ticket_key: issue.key.clone(),
                assembla_comment_id: comment.id.clone(),
                assembla_ticket_id: comment.ticket_id.clone(),
                before: original.to_string(),
                after: rewritten,
            })?;
            state.diffs += 1;
        }

        Ok(Outcome::Created {
            comment_id: created.id,
            rewritten: changed,
        })
    }
}

fn record_failure(
    identity: &IdentityMap,
    comment: &SourceComment,
    error: String,
    ledgers: &mut Ledgers,
    state: &mut MigrationState,
) -> Result<Outcome> {
    tracing::warn!(
        comment_id = %comment.id,
        issue = %identity.issue_label(&comment.ticket_id),
        author = %identity.author_label(&comment.user_id),
        "{error}"
    );
    ledgers.failed.append(&FailureRow {
        assembla_comment_id: comment.id.clone(),
        assembla_ticket_id: comment.ticket_id.clone(),
        error: error.clone(),
        failed_at: chrono::Utc::now().to_rfc3339(),
    })?;
    state.failed += 1;
    Ok(Outcome::Failed { error })
}
