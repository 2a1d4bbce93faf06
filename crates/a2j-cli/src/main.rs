#![forbid(unsafe_code)]

mod cmd;
mod output;

use a2j_core::config::load_settings;
use anyhow::Context as _;
use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "a2j",
    author,
    version,
    about = "a2j: replay Assembla exports into Jira",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress lines; print a one-line summary.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file to use instead of ./a2j.toml or the user config dir.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    const fn output_mode(&self) -> OutputMode {
        OutputMode::from_flags(self.json, self.quiet)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Migrate",
        about = "Migrate ticket comments",
        long_about = "Rewrite Assembla ticket comments and post them to their Jira issues, oldest first.",
        after_help = "EXAMPLES:\n    # Migrate comments, resuming after any earlier run\n    a2j comments\n\n    # Rehearse without calling Jira\n    a2j comments --dry-run\n\n    # Start over, skipping empty and commit comments\n    a2j comments --fresh --skip-empty --skip-commits"
    )]
    Comments(cmd::comments::CommentsArgs),

    #[command(
        next_help_heading = "Inspect",
        about = "List Jira group members",
        long_about = "List the members of Jira user groups, without add-on accounts.",
        after_help = "EXAMPLES:\n    # List the configured groups\n    a2j users\n\n    # List one group into a CSV file\n    a2j users --group jira-software-users --output users.csv"
    )]
    Users(cmd::users::UsersArgs),

    #[command(
        next_help_heading = "Inspect",
        about = "Preview a body rewrite",
        long_about = "Rewrite one Assembla body for a Jira or Confluence destination and print the result.",
        after_help = "EXAMPLES:\n    # Rewrite a comment from stdin\n    echo 'ping @jdoe' | a2j rewrite\n\n    # Rewrite a wiki page for Confluence\n    a2j rewrite --content-type page --input page.html"
    )]
    Rewrite(cmd::rewrite::RewriteArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    a2j completions bash > ~/.local/share/bash-completion/completions/a2j"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("A2J_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "a2j=debug,info"
        } else {
            "a2j=info,warn"
        })
    });

    let format = env::var("A2J_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let output = cli.output_mode();

    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args, &mut command);
    }

    let settings = load_settings(cli.config.as_deref()).context("failed to load configuration")?;
    info!(
        server_type = ?settings.server_type,
        assembla_dir = %settings.assembla_dir.display(),
        jira_dir = %settings.jira_dir.display(),
        "settings resolved"
    );

    match &cli.command {
        Commands::Comments(args) => cmd::comments::run_comments(args, &settings, output),
        Commands::Users(args) => cmd::users::run_users(args, &settings, output),
        Commands::Rewrite(args) => cmd::rewrite::run_rewrite(args, &settings, output),
        Commands::Completions(_) => Ok(()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Err(render_err) = render_error(cli.output_mode(), &CliError::from(&err)) {
                eprintln!("error: {err:#} ({render_err})");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_sets_output_mode() {
        let cli = Cli::parse_from(["a2j", "--json", "comments"]);
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn json_flag_after_subcommand() {
        let cli = Cli::parse_from(["a2j", "comments", "--json"]);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn default_output_is_pretty() {
        let cli = Cli::parse_from(["a2j", "comments"]);
        assert_eq!(cli.output_mode(), OutputMode::Pretty);
    }

    #[test]
    fn quiet_flag_parsed() {
        let cli = Cli::parse_from(["a2j", "-q", "comments"]);
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn comments_flags_parse() {
        let cli = Cli::parse_from([
            "a2j",
            "comments",
            "--dry-run",
            "--fresh",
            "--skip-empty",
            "--jira-dir",
            "out/jira",
        ]);
        let Commands::Comments(args) = cli.command else {
            panic!("expected comments subcommand");
        };
        assert!(args.dry_run);
        assert!(args.fresh);
        assert!(args.skip_empty);
        assert!(!args.skip_commits);
        assert_eq!(args.jira_dir, Some(PathBuf::from("out/jira")));
    }

    #[test]
    fn users_group_is_repeatable() {
        let cli = Cli::parse_from(["a2j", "users", "--group", "a", "--group", "b"]);
        let Commands::Users(args) = cli.command else {
            panic!("expected users subcommand");
        };
        assert_eq!(args.groups, ["a", "b"]);
    }

    #[test]
    fn rewrite_content_type_accepts_aliases() {
        let cli = Cli::parse_from(["a2j", "rewrite", "--content-type", "wiki"]);
        let Commands::Rewrite(args) = cli.command else {
            panic!("expected rewrite subcommand");
        };
        assert_eq!(args.content_type, a2j_core::rewrite::ContentType::Page);
    }

    #[test]
    fn rewrite_rejects_unknown_content_type() {
        let result = Cli::try_parse_from(["a2j", "rewrite", "--content-type", "email"]);
        assert!(result.is_err());
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["a2j", "users", "--config", "custom.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn command_is_named_after_the_binary() {
        assert_eq!(Cli::command().get_name(), "a2j");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
