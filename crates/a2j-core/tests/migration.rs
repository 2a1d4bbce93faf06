use a2j_core::driver::{
    CommentMigration, LedgerPaths, Ledgers, MigrationState, Outcome, previously_imported,
    write_skipped,
};
use a2j_core::filter::{FilterPolicy, select_comments};
use a2j_core::identity::IdentityMap;
use a2j_core::record::SourceComment;
use a2j_core::remote::{
    AuthorStrategy, CommentPayload, CreatedComment, Credentials, IssueApi, RemoteError,
};
use a2j_core::table::{Row, Table, field, read_table};
use std::cell::RefCell;
use std::path::PathBuf;
use tempfile::TempDir;

/// Records every create call and fails for the listed issue ids.
#[derive(Default)]
struct FakeJira {
    calls: RefCell<Vec<(String, String, String)>>,
    failing_issues: Vec<String>,
}

impl FakeJira {
    fn failing(issue_ids: &[&str]) -> Self {
        Self {
            failing_issues: issue_ids.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }

    fn bodies(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|(_, _, body)| body.clone()).collect()
    }
}

impl IssueApi for FakeJira {
    fn comment_url(&self, issue_id: &str) -> String {
        format!("https://jira.test/rest/api/2/issue/{issue_id}/comment")
    }

    fn create_comment(
        &self,
        issue_id: &str,
        credentials: &Credentials,
        payload: &CommentPayload,
    ) -> Result<CreatedComment, RemoteError> {
        let mut calls = self.calls.borrow_mut();
        calls.push((
            issue_id.to_string(),
            credentials.user().to_string(),
            payload.body.clone(),
        ));
        if self.failing_issues.iter().any(|id| id == issue_id) {
            return Err(RemoteError::Status {
                status: 400,
                url: self.comment_url(issue_id),
                message: "Issue does not exist".to_string(),
            });
        }
        Ok(CreatedComment {
            id: format!("9{}", calls.len()),
        })
    }
}

fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
    Table {
        path: PathBuf::from("memory.csv"),
        headers: headers.iter().map(ToString::to_string).collect(),
        rows: rows
            .iter()
            .map(|values| {
                headers
                    .iter()
                    .zip(values.iter())
                    .map(|(h, v)| ((*h).to_string(), (*v).to_string()))
                    .collect()
            })
            .collect(),
    }
}

fn identity() -> IdentityMap {
    let users = table(
        &["assemblaid", "assemblalogin", "name", "emailaddress"],
        &[&["u1", "alice", "alice.smith", "alice@example.org"]],
    );
    let tickets = table(
        &["assembla_ticket_id", "jira_ticket_id", "jira_ticket_key", "assembla_ticket_number"],
        &[
            &["t1", "101", "PRJ-1", "1"],
            &["t2", "102", "PRJ-2", "2"],
            &["t3", "103", "PRJ-3", "3"],
        ],
    );
    let attachments = table(&["assembla_attachment_id", "filename"], &[]);
    IdentityMap::from_tables(&users, &tickets, &attachments, "example.org").expect("identity")
}

fn comment(id: &str, ticket: &str, created_on: &str, body: &str) -> SourceComment {
    let row: Row = [
        ("id", id),
        ("ticket_id", ticket),
        ("user_id", "u1"),
        ("created_on", created_on),
        ("comment", body),
    ]
    .iter()
    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
    .collect();
    SourceComment::from_row(&row)
}

fn admin() -> Credentials {
    Credentials::new("admin@example.org", "secret")
}

fn run(
    api: &FakeJira,
    identity: &IdentityMap,
    comments: &[SourceComment],
    paths: &LedgerPaths,
) -> (MigrationState, Vec<Outcome>) {
    let migration = CommentMigration::new(api, identity, AuthorStrategy::Attribute, admin());
    let mut ledgers = Ledgers::open(paths, false);
    let mut state = MigrationState::default();
    let mut outcomes = Vec::new();
    migration
        .run(comments, &mut ledgers, &mut state, |event| {
            outcomes.push(event.outcome.clone());
        })
        .expect("run");
    (state, outcomes)
}

#[test]
fn one_failure_does_not_stop_the_run() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::failing(&["102"]);
    let comments = vec![
        comment("c1", "t1", "2020-01-01T00:00:00Z", "first"),
        comment("c2", "t2", "2020-01-02T00:00:00Z", "second"),
        comment("c3", "t3", "2020-01-03T00:00:00Z", "third"),
    ];

    let (state, outcomes) = run(&api, &identity, &comments, &paths);

    assert_eq!(api.calls.borrow().len(), 3);
    assert_eq!(state.attempted, 3);
    assert_eq!(state.imported, 2);
    assert_eq!(state.failed, 1);
    assert!(matches!(outcomes[1], Outcome::Failed { .. }));

    let imported = read_table(&paths.imported).expect("imported ledger");
    let ids: Vec<_> = imported
        .rows
        .iter()
        .map(|row| field(row, "assembla_comment_id"))
        .collect();
    assert_eq!(ids, ["c1", "c3"]);
    assert_eq!(field(&imported.rows[0], "jira_ticket_key"), "PRJ-1");

    let failed = read_table(&paths.failed).expect("failure ledger");
    assert_eq!(failed.len(), 1);
    assert_eq!(field(&failed.rows[0], "assembla_comment_id"), "c2");
    assert!(field(&failed.rows[0], "error").contains("Issue does not exist"));
}

#[test]
fn comments_are_posted_oldest_first() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::default();

    let loaded = vec![
        comment("third", "t1", "2020-03-01T00:00:00Z", "T3"),
        comment("first", "t1", "2020-01-01T00:00:00Z", "T1"),
        comment("second", "t1", "2020-02-01T00:00:00Z", "T2"),
    ];
    let outcome = select_comments(loaded, FilterPolicy::default(), &identity);
    run(&api, &identity, &outcome.kept, &paths);

    let bodies = api.bodies();
    assert_eq!(bodies.len(), 3);
    assert!(bodies[0].ends_with("\n\nT1"));
    assert!(bodies[1].ends_with("\n\nT2"));
    assert!(bodies[2].ends_with("\n\nT3"));
}

#[test]
fn diff_row_only_when_body_changes() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::default();
    let comments = vec![
        comment("plain", "t1", "2020-01-01T00:00:00Z", "nothing to rewrite"),
        comment("mention", "t1", "2020-01-02T00:00:00Z", "ping @alice"),
    ];

    let (state, _) = run(&api, &identity, &comments, &paths);

    assert_eq!(state.imported, 2);
    assert_eq!(state.diffs, 1);
    let diffs = read_table(&paths.diffs).expect("diff ledger");
    assert_eq!(diffs.len(), 1);
    assert_eq!(field(&diffs.rows[0], "assembla_comment_id"), "mention");
    assert_eq!(field(&diffs.rows[0], "before"), "ping @alice");
    assert_eq!(field(&diffs.rows[0], "after"), "ping [~alice.smith]");
}

#[test]
fn unchanged_bodies_leave_no_diff_ledger() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::default();
    let comments = vec![comment("c1", "t1", "2020-01-01T00:00:00Z", "as is")];

    let (state, _) = run(&api, &identity, &comments, &paths);

    assert_eq!(state.diffs, 0);
    assert!(!paths.diffs.exists());
}

#[test]
fn unresolved_parent_is_recorded_without_remote_call() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::default();
    let comments = vec![comment("orphan", "t99", "2020-01-01T00:00:00Z", "hello")];

    let (state, outcomes) = run(&api, &identity, &comments, &paths);

    assert!(api.calls.borrow().is_empty());
    assert_eq!(state.failed, 1);
    assert!(matches!(&outcomes[0], Outcome::Failed { error } if error.contains("t99")));
    let failed = read_table(&paths.failed).expect("failure ledger");
    assert_eq!(field(&failed.rows[0], "assembla_ticket_id"), "t99");
}

#[test]
fn body_carries_provenance_and_author() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let api = FakeJira::default();
    let comments = vec![comment("c1", "t1", "2020-01-01T10:30:00Z", "hello")];

    run(&api, &identity, &comments, &paths);

    let calls = api.calls.borrow();
    assert_eq!(calls[0].0, "101");
    assert_eq!(calls[0].1, "admin@example.org");
    assert_eq!(
        calls[0].2,
        "Assembla | Author [~alice.smith] | Created on 2020-01-01 10:30\n\nhello"
    );
}

#[test]
fn resumed_run_skips_comments_already_in_the_ledger() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let comments = vec![
        comment("c1", "t1", "2020-01-01T00:00:00Z", "one"),
        comment("c2", "t2", "2020-01-02T00:00:00Z", "two"),
    ];

    let first = FakeJira::failing(&["102"]);
    run(&first, &identity, &comments[..1], &paths);

    let second = FakeJira::default();
    let done = previously_imported(&paths).expect("read ledger");
    let migration = CommentMigration::new(&second, &identity, AuthorStrategy::Attribute, admin())
        .skipping(done);
    let mut ledgers = Ledgers::open(&paths, true);
    let mut state = MigrationState::default();
    migration
        .run(&comments, &mut ledgers, &mut state, |_| {})
        .expect("resume");

    assert_eq!(state.skipped_existing, 1);
    assert_eq!(state.imported, 1);
    assert_eq!(second.calls.borrow().len(), 1);

    let imported = read_table(&paths.imported).expect("imported ledger");
    let ids: Vec<_> = imported
        .rows
        .iter()
        .map(|row| field(row, "assembla_comment_id"))
        .collect();
    assert_eq!(ids, ["c1", "c2"]);
}

#[test]
fn progress_reports_counter_total_and_url() {
    let identity = identity();
    let api = FakeJira::default();
    let migration = CommentMigration::new(&api, &identity, AuthorStrategy::Attribute, admin());
    let dir = TempDir::new().expect("tempdir");
    let mut ledgers = Ledgers::open(&LedgerPaths::in_dir(dir.path()), false);
    let mut state = MigrationState::default();
    let comments = vec![
        comment("c1", "t1", "2020-01-01T00:00:00Z", "one"),
        comment("c2", "t3", "2020-01-02T00:00:00Z", "two"),
    ];

    let mut seen = Vec::new();
    migration
        .run(&comments, &mut ledgers, &mut state, |event| {
            seen.push((event.counter, event.total, event.percentage(), event.url.to_string()));
        })
        .expect("run");

    assert_eq!(seen[0].0, 1);
    assert_eq!(seen[0].1, 2);
    assert_eq!(seen[0].2, 50);
    assert!(seen[1].3.ends_with("/issue/103/comment"));
}

#[test]
fn skipped_tables_keep_source_columns() {
    let dir = TempDir::new().expect("tempdir");
    let paths = LedgerPaths::in_dir(dir.path());
    let identity = identity();
    let headers: Vec<String> = ["id", "comment", "user_id", "created_on", "ticket_id"]
        .iter()
        .map(ToString::to_string)
        .collect();
    let policy = FilterPolicy {
        skip_empty: true,
        skip_commits: true,
        restrict_to_known_tickets: false,
    };
    let outcome = select_comments(
        vec![
            comment("e1", "t1", "2020-01-01T00:00:00Z", ""),
            comment("k1", "t1", "2020-01-02T00:00:00Z", "Commit: [[r:42]] fix"),
            comment("ok", "t1", "2020-01-03T00:00:00Z", "fine"),
        ],
        policy,
        &identity,
    );

    write_skipped(&paths, &headers, &outcome).expect("write skipped");

    let empty = read_table(&paths.skipped_empty).expect("empty table");
    assert_eq!(empty.headers, headers);
    assert_eq!(field(&empty.rows[0], "id"), "e1");
    let commits = read_table(&paths.skipped_commit).expect("commit table");
    assert_eq!(field(&commits.rows[0], "comment"), "Commit: [[r:42]] fix");
}
