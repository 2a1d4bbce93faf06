use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use a2j_core::config::{ServerType, Settings};
use a2j_core::driver::{
    CommentMigration, LedgerPaths, Ledgers, MigrationState, Outcome, ProgressEvent,
    previously_imported, write_skipped,
};
use a2j_core::filter::{FilterPolicy, select_comments};
use a2j_core::identity::IdentityMap;
use a2j_core::record::{SourceComment, load_comments};
use a2j_core::remote::{AuthorStrategy, Credentials, DryRunApi, IssueApi, JiraClient};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Ledgers of a dry run go here, below the Jira output directory, so they
/// never mark comments as migrated for a live run.
const DRY_RUN_DIR: &str = "dry-run";

#[derive(Args, Debug)]
pub struct CommentsArgs {
    /// Accept every comment locally instead of calling Jira.
    #[arg(long)]
    pub dry_run: bool,

    /// Ignore ledgers from earlier runs and start over.
    #[arg(long)]
    pub fresh: bool,

    /// Route empty comments to the skipped-empty table.
    #[arg(long)]
    pub skip_empty: bool,

    /// Route Assembla commit comments to the skipped-commit table.
    #[arg(long)]
    pub skip_commits: bool,

    /// Directory holding `ticket-comments.csv` (default from config).
    #[arg(long, value_name = "DIR")]
    pub assembla_dir: Option<PathBuf>,

    /// Directory holding the Jira identity tables and ledgers (default from config).
    #[arg(long, value_name = "DIR")]
    pub jira_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct CommentsReport {
    dry_run: bool,
    server_type: Option<ServerType>,
    total_comments: usize,
    skipped_empty: usize,
    skipped_commit: usize,
    out_of_range: usize,
    #[serde(flatten)]
    state: MigrationState,
    api_requests: usize,
    ledgers: Option<LedgerPaths>,
}

pub fn run_comments(args: &CommentsArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let assembla_dir = args.assembla_dir.as_deref().unwrap_or(&settings.assembla_dir);
    let jira_dir = args.jira_dir.as_deref().unwrap_or(&settings.jira_dir);
    let api_settings = if args.dry_run {
        None
    } else {
        Some(settings.api()?)
    };

    let identity = IdentityMap::load(jira_dir, settings.default_email_domain()?)
        .context("failed to load identity tables")?;
    let comment_set = load_comments(assembla_dir).context("failed to load Assembla comments")?;

    let policy = FilterPolicy {
        skip_empty: args.skip_empty || settings.skip_empty_comments,
        skip_commits: args.skip_commits || settings.skip_commit_comments,
        restrict_to_known_tickets: settings.tickets_created_on.is_some(),
    };
    if let Some(date) = settings.tickets_created_on {
        tracing::info!(%date, "keeping only comments on tickets created on or after the cutoff");
    }

    let mut report = CommentsReport {
        dry_run: args.dry_run,
        server_type: Some(settings.server_type),
        total_comments: comment_set.comments.len(),
        ..CommentsReport::default()
    };

    let outcome = select_comments(comment_set.comments, policy, &identity);
    report.skipped_empty = outcome.skipped_empty.len();
    report.skipped_commit = outcome.skipped_commit.len();
    report.out_of_range = outcome.out_of_range;

    let ledger_dir = if args.dry_run {
        jira_dir.join(DRY_RUN_DIR)
    } else {
        jira_dir.to_path_buf()
    };
    let paths = LedgerPaths::in_dir(&ledger_dir);
    write_skipped(&paths, &comment_set.headers, &outcome)
        .context("failed to write skipped-comment tables")?;

    let resume = !args.fresh && !args.dry_run;
    let done = if resume {
        previously_imported(&paths).context("failed to read previous import ledger")?
    } else {
        paths
            .clear_run_ledgers()
            .context("failed to clear ledgers from an earlier run")?;
        HashSet::new()
    };
    if !done.is_empty() {
        tracing::info!(count = done.len(), "resuming after previously imported comments");
    }

    let strategy = AuthorStrategy::for_server(settings.server_type);
    let mut ledgers = Ledgers::open(&paths, resume);

    if let Some(api_settings) = api_settings {
        let client = JiraClient::new(&api_settings);
        let admin = client.admin_credentials().clone();
        let migration =
            CommentMigration::new(&client, &identity, strategy, admin).skipping(done);
        replay(&migration, &outcome.kept, &mut ledgers, &mut report.state, output)?;
        report.api_requests = client.request_count();
    } else {
        let admin = Credentials::new(settings.admin_email.clone().unwrap_or_default(), "");
        let api = DryRunApi::new();
        let migration =
            CommentMigration::new(&api, &identity, strategy, admin).skipping(done);
        replay(&migration, &outcome.kept, &mut ledgers, &mut report.state, output)?;
    }

    report.ledgers = Some(paths);
    render_mode(output, &report, print_summary, print_report)
}

fn replay<A: IssueApi>(
    migration: &CommentMigration<'_, A>,
    comments: &[SourceComment],
    ledgers: &mut Ledgers,
    state: &mut MigrationState,
    output: OutputMode,
) -> Result<()> {
    let stdout = io::stdout();
    migration
        .run(comments, ledgers, state, |event| {
            if output.shows_progress() {
                // Progress output is best effort.
                let _ = print_progress(&mut stdout.lock(), event);
            }
        })
        .context("comment migration aborted")
}

fn print_progress(w: &mut dyn Write, event: &ProgressEvent<'_>) -> io::Result<()> {
    let status = match event.outcome {
        Outcome::Created { comment_id, .. } => format!("OK {comment_id}"),
        Outcome::Failed { error } => format!("FAILED {error}"),
        Outcome::AlreadyImported => "SKIP already imported".to_string(),
    };
    writeln!(
        w,
        "{} of {} [{}%] POST {} => {status}",
        event.counter,
        event.total,
        event.percentage(),
        event.url
    )
}

fn print_summary(report: &CommentsReport, w: &mut dyn Write) -> io::Result<()> {
    writeln!(
        w,
        "attempted={} imported={} diffs={} failed={} skipped_existing={}",
        report.state.attempted,
        report.state.imported,
        report.state.diffs,
        report.state.failed,
        report.state.skipped_existing
    )
}

fn print_report(report: &CommentsReport, w: &mut dyn Write) -> io::Result<()> {
    let heading = if report.dry_run {
        "a2j comments (dry run)"
    } else {
        "a2j comments"
    };
    pretty_section(w, heading)?;
    pretty_kv(w, "total comments", report.total_comments.to_string())?;
    pretty_kv(w, "skipped empty", report.skipped_empty.to_string())?;
    pretty_kv(w, "skipped commit", report.skipped_commit.to_string())?;
    pretty_kv(w, "out of range", report.out_of_range.to_string())?;
    pretty_kv(w, "skipped existing", report.state.skipped_existing.to_string())?;
    pretty_kv(w, "attempted", report.state.attempted.to_string())?;
    pretty_kv(w, "imported", report.state.imported.to_string())?;
    pretty_kv(w, "diffs", report.state.diffs.to_string())?;
    pretty_kv(w, "failed", report.state.failed.to_string())?;
    pretty_kv(w, "API requests", report.api_requests.to_string())?;

    if let Some(paths) = &report.ledgers {
        writeln!(w)?;
        pretty_section(w, "ledgers")?;
        for (label, path) in [
            ("imported", &paths.imported),
            ("diffs", &paths.diffs),
            ("failed", &paths.failed),
            ("skipped empty", &paths.skipped_empty),
            ("skipped commit", &paths.skipped_commit),
        ] {
            pretty_kv(w, label, describe_ledger(path))?;
        }
    }
    Ok(())
}

fn describe_ledger(path: &Path) -> String {
    if path.is_file() {
        path.display().to_string()
    } else {
        format!("{} (not written)", path.display())
    }
}
