//! Candidate selection and replay order.
//!
//! Jira stamps every comment with the time it was created through the API,
//! so the visible history is the order in which comments are posted. The
//! surviving comments are therefore sorted oldest first before any remote
//! call is made.

use crate::identity::IdentityMap;
use crate::record::SourceComment;

/// Marker Assembla puts in the comments it generates for commits.
pub const COMMIT_MARKER: &str = "Commit: [[r:";

/// Which filters run. Filters always run in a fixed order: empty, commit,
/// then ticket boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPolicy {
    pub skip_empty: bool,
    pub skip_commits: bool,
    /// Keep only comments whose ticket survived an upstream date filter.
    pub restrict_to_known_tickets: bool,
}

/// Result of the filter stage.
#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    /// Comments to migrate, oldest first.
    pub kept: Vec<SourceComment>,
    pub skipped_empty: Vec<SourceComment>,
    pub skipped_commit: Vec<SourceComment>,
    /// Comments dropped because their ticket is not in the identity map.
    pub out_of_range: usize,
}

#[must_use]
pub fn is_empty_body(comment: &SourceComment) -> bool {
    comment
        .body
        .as_deref()
        .is_none_or(|body| body.trim().is_empty())
}

#[must_use]
pub fn is_commit_comment(comment: &SourceComment) -> bool {
    comment
        .body
        .as_deref()
        .is_some_and(|body| body.contains(COMMIT_MARKER))
}

/// Apply `policy` to `comments` and sort the survivors chronologically.
#[must_use]
pub fn select_comments(
    comments: Vec<SourceComment>,
    policy: FilterPolicy,
    identity: &IdentityMap,
) -> FilterOutcome {
    let total = comments.len();
    let mut outcome = FilterOutcome::default();
    let mut remaining = comments;

    if policy.skip_empty {
        let (empty, rest): (Vec<_>, Vec<_>) = remaining.into_iter().partition(is_empty_body);
        outcome.skipped_empty = empty;
        remaining = rest;
    }

    if policy.skip_commits {
        let (commits, rest): (Vec<_>, Vec<_>) =
            remaining.into_iter().partition(is_commit_comment);
        outcome.skipped_commit = commits;
        remaining = rest;
    }

    if policy.restrict_to_known_tickets {
        let before = remaining.len();
        remaining.retain(|comment| identity.contains_ticket(&comment.ticket_id));
        outcome.out_of_range = before - remaining.len();
    }

    sort_chronologically(&mut remaining);
    outcome.kept = remaining;

    tracing::info!(
        total,
        empty = outcome.skipped_empty.len(),
        commit = outcome.skipped_commit.len(),
        out_of_range = outcome.out_of_range,
        remaining = outcome.kept.len(),
        "filtered comments"
    );

    outcome
}

/// Stable sort, oldest first.
///
/// Comments are ordered by [`SourceComment::replay_time`], so mixed export
/// formats still interleave by instant. Comments with no recognizable date
/// sort first; ties break on the raw `created_on` text.
pub fn sort_chronologically(comments: &mut [SourceComment]) {
    for comment in comments.iter().filter(|c| c.created_at.is_none()) {
        tracing::warn!(
            comment_id = %comment.id,
            created_on = %comment.created_on,
            "unparseable created_on, ordering by its leading date"
        );
    }
    comments.sort_by_cached_key(|comment| (comment.replay_time(), comment.created_on.clone()));
}
