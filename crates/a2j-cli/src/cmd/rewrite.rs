use crate::output::{OutputMode, pretty_section, render_mode};
use a2j_core::config::Settings;
use a2j_core::identity::IdentityMap;
use a2j_core::rewrite::{ContentType, RewriteContext, rewrite, rule_names};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::{self, Read as _, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RewriteArgs {
    /// Destination of the body: comment, description or page.
    #[arg(long, default_value = "comment", value_name = "TYPE")]
    pub content_type: ContentType,

    /// Also convert strikethrough markup (Jira destinations only).
    #[arg(long)]
    pub strikethrough: bool,

    /// Read the body from this file instead of stdin.
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Directory holding the Jira identity tables (default from config).
    #[arg(long, value_name = "DIR")]
    pub jira_dir: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RewritePreview {
    content_type: ContentType,
    rules: Vec<&'static str>,
    changed: bool,
    before: String,
    after: String,
}

pub fn run_rewrite(args: &RewriteArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let body = match &args.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut body = String::new();
            io::stdin()
                .read_to_string(&mut body)
                .context("failed to read body from stdin")?;
            body
        }
    };

    let jira_dir = args.jira_dir.as_deref().unwrap_or(&settings.jira_dir);
    // The e-mail domain only fills in missing addresses, which rewriting never reads.
    let domain = settings.default_email_domain.as_deref().unwrap_or_default();
    let identity =
        IdentityMap::load(jira_dir, domain).context("failed to load identity tables")?;

    let ctx = RewriteContext::new(&identity, args.content_type)
        .with_strikethrough(args.strikethrough);
    let after = rewrite(&body, &ctx);

    let preview = RewritePreview {
        content_type: args.content_type,
        rules: rule_names(),
        changed: after != body,
        before: body,
        after,
    };

    render_mode(output, &preview, print_body, print_preview)
}

fn print_body(preview: &RewritePreview, w: &mut dyn Write) -> io::Result<()> {
    write!(w, "{}", preview.after)?;
    if !preview.after.ends_with('\n') {
        writeln!(w)?;
    }
    Ok(())
}

fn print_preview(preview: &RewritePreview, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("a2j rewrite ({})", preview.content_type))?;
    print_body(preview, w)?;
    if !preview.changed {
        writeln!(w)?;
        writeln!(w, "(unchanged)")?;
    }
    Ok(())
}
