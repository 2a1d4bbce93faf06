use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use a2j_core::config::Settings;
use a2j_core::remote::JiraClient;
use a2j_core::users::{GroupMember, list_group_members, write_members};
use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct UsersArgs {
    /// Jira group to list (repeatable). Defaults to `JIRA_API_USER_GROUPS`.
    #[arg(long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Also write the members to this CSV file.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct UsersReport {
    groups: Vec<String>,
    members: Vec<GroupMember>,
    failed_groups: Vec<FailedGroup>,
    api_requests: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct FailedGroup {
    group: String,
    error: String,
}

pub fn run_users(args: &UsersArgs, settings: &Settings, output: OutputMode) -> Result<()> {
    let groups = if args.groups.is_empty() {
        settings.user_groups.clone()
    } else {
        args.groups.clone()
    };
    if groups.is_empty() {
        anyhow::bail!("no groups to list: pass --group or set JIRA_API_USER_GROUPS");
    }

    let client = JiraClient::new(&settings.api()?);
    let listing = list_group_members(&client, &groups);

    if let Some(path) = &args.output {
        write_members(path, &listing.members)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    let report = UsersReport {
        groups,
        members: listing.members,
        failed_groups: listing
            .failed_groups
            .into_iter()
            .map(|(group, error)| FailedGroup { group, error })
            .collect(),
        api_requests: client.request_count(),
        written_to: args.output.clone(),
    };

    render_mode(output, &report, print_members, print_report)
}

fn print_members(report: &UsersReport, w: &mut dyn Write) -> io::Result<()> {
    for member in &report.members {
        writeln!(w, "{}\t{}\t{}", member.name, member.email_address, member.display_name)?;
    }
    Ok(())
}

fn print_report(report: &UsersReport, w: &mut dyn Write) -> io::Result<()> {
    pretty_section(w, &format!("a2j users: {}", report.groups.join(", ")))?;
    for member in &report.members {
        let status = if member.active { "" } else { " (inactive)" };
        writeln!(
            w,
            "{:<24} {:<32} {}{status}",
            member.name, member.email_address, member.display_name
        )?;
    }
    writeln!(w)?;
    pretty_kv(w, "members", report.members.len().to_string())?;
    pretty_kv(w, "API requests", report.api_requests.to_string())?;
    for failed in &report.failed_groups {
        pretty_kv(w, "failed group", format!("{} ({})", failed.group, failed.error))?;
    }
    if let Some(path) = &report.written_to {
        pretty_kv(w, "written to", path.display().to_string())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> UsersReport {
        UsersReport {
            groups: vec!["jira-users".to_string()],
            members: vec![GroupMember {
                name: "alice".to_string(),
                email_address: "alice@example.org".to_string(),
                display_name: "Alice".to_string(),
                active: false,
                ..GroupMember::default()
            }],
            failed_groups: vec![FailedGroup {
                group: "broken".to_string(),
                error: "HTTP 404".to_string(),
            }],
            api_requests: 2,
            written_to: None,
        }
    }

    #[test]
    fn text_output_is_tab_separated() {
        let mut buf = Vec::new();
        print_members(&report(), &mut buf).expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "alice\talice@example.org\tAlice\n"
        );
    }

    #[test]
    fn pretty_output_flags_inactive_users_and_failed_groups() {
        let mut buf = Vec::new();
        print_report(&report(), &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("a2j users: jira-users\n"));
        assert!(text.contains("Alice (inactive)"));
        assert!(text.contains("broken (HTTP 404)"));
    }
}
