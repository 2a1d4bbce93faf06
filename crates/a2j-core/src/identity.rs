//! Cross-system identity reconciliation.
//!
//! The earlier migration stages created users, issues and attachments in
//! Jira and wrote tables that carry both the Assembla id and the Jira id of
//! each entity. This module turns those tables into lookup maps keyed by
//! Assembla id. Building the maps performs no network access; a missing
//! table or column is fatal so a run never proceeds on partial identities.

use crate::error::Result;
use crate::table::{Table, field, read_table};
use std::collections::HashMap;
use std::path::Path;

pub const USERS_TABLE: &str = "jira-users.csv";
pub const TICKETS_TABLE: &str = "jira-tickets.csv";
pub const ATTACHMENTS_TABLE: &str = "jira-attachments-download.csv";

const USER_COLUMNS: &[&str] = &["assemblaid", "assemblalogin", "name", "emailaddress"];
const TICKET_COLUMNS: &[&str] = &["assembla_ticket_id", "jira_ticket_id", "jira_ticket_key"];
const ATTACHMENT_COLUMNS: &[&str] = &["assembla_attachment_id", "filename"];

/// A Jira user resolved from an Assembla user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    /// Jira user name with any `@domain` suffix removed.
    pub login: String,
    /// Jira user name as exported, used for `[~name]` mentions.
    pub name: String,
    pub display_name: String,
    pub email: String,
    pub account_id: Option<String>,
}

/// A Jira issue resolved from an Assembla ticket id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueRef {
    pub id: String,
    pub key: String,
}

/// Lookup tables from Assembla ids to Jira references, read-only once built.
#[derive(Debug, Clone, Default)]
pub struct IdentityMap {
    users: HashMap<String, UserRef>,
    name_by_login: HashMap<String, String>,
    issues: HashMap<String, IssueRef>,
    key_by_ticket_number: HashMap<String, String>,
    attachments: HashMap<String, String>,
}

impl IdentityMap {
    /// Load the three identity tables from the Jira output directory.
    ///
    /// # Errors
    ///
    /// Fails if any table is missing, unparseable or lacks a required column.
    pub fn load(jira_dir: &Path, default_email_domain: &str) -> Result<Self> {
        let users = read_table(&jira_dir.join(USERS_TABLE))?;
        let tickets = read_table(&jira_dir.join(TICKETS_TABLE))?;
        let attachments = read_table(&jira_dir.join(ATTACHMENTS_TABLE))?;
        Self::from_tables(&users, &tickets, &attachments, default_email_domain)
    }

    /// Build the maps from already loaded tables.
    ///
    /// # Errors
    ///
    /// Fails if a table lacks one of its required columns.
    pub fn from_tables(
        users: &Table,
        tickets: &Table,
        attachments: &Table,
        default_email_domain: &str,
    ) -> Result<Self> {
        users.require_columns(USER_COLUMNS)?;
        tickets.require_columns(TICKET_COLUMNS)?;
        attachments.require_columns(ATTACHMENT_COLUMNS)?;

        let mut map = Self::default();

        for row in &users.rows {
            let id = field(row, "assemblaid");
            let name = field(row, "name");
            let login = strip_domain(name).to_string();
            let email = match field(row, "emailaddress").trim() {
                "" => format!("{login}@{default_email_domain}"),
                email => email.to_string(),
            };
            let display_name = match field(row, "displayname") {
                "" => name.to_string(),
                display => display.to_string(),
            };
            let account_id = Some(field(row, "accountid"))
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned);

            let assembla_login = field(row, "assemblalogin");
            if !assembla_login.is_empty() {
                map.name_by_login
                    .insert(assembla_login.to_string(), name.to_string());
            }
            map.users.insert(
                id.to_string(),
                UserRef {
                    login,
                    name: name.to_string(),
                    display_name,
                    email,
                    account_id,
                },
            );
        }

        for row in &tickets.rows {
            let ticket_id = field(row, "assembla_ticket_id");
            let issue = IssueRef {
                id: field(row, "jira_ticket_id").to_string(),
                key: field(row, "jira_ticket_key").to_string(),
            };
            let number = field(row, "assembla_ticket_number");
            if !number.is_empty() {
                map.key_by_ticket_number
                    .insert(number.to_string(), issue.key.clone());
            }
            map.issues.insert(ticket_id.to_string(), issue);
        }

        for row in &attachments.rows {
            map.attachments.insert(
                field(row, "assembla_attachment_id").to_string(),
                field(row, "filename").to_string(),
            );
        }

        tracing::info!(
            users = map.users.len(),
            issues = map.issues.len(),
            attachments = map.attachments.len(),
            "identity maps built"
        );

        Ok(map)
    }

    #[must_use]
    pub fn user(&self, user_id: &str) -> Option<&UserRef> {
        self.users.get(user_id)
    }

    #[must_use]
    pub fn issue(&self, ticket_id: &str) -> Option<&IssueRef> {
        self.issues.get(ticket_id)
    }

    #[must_use]
    pub fn contains_ticket(&self, ticket_id: &str) -> bool {
        self.issues.contains_key(ticket_id)
    }

    /// Issue key for `ticket_id`, or the `unknown (<id>)` marker.
    #[must_use]
    pub fn issue_label(&self, ticket_id: &str) -> String {
        self.issue(ticket_id)
            .map_or_else(|| unknown(ticket_id), |issue| issue.key.clone())
    }

    /// Jira name of the author, or the `unknown (<id>)` marker.
    #[must_use]
    pub fn author_label(&self, user_id: &str) -> String {
        self.user(user_id)
            .map_or_else(|| unknown(user_id), |user| user.name.clone())
    }

    #[must_use]
    pub const fn name_by_login(&self) -> &HashMap<String, String> {
        &self.name_by_login
    }

    #[must_use]
    pub const fn attachments(&self) -> &HashMap<String, String> {
        &self.attachments
    }

    #[must_use]
    pub const fn key_by_ticket_number(&self) -> &HashMap<String, String> {
        &self.key_by_ticket_number
    }
}

/// Fallback label for an id that did not resolve.
#[must_use]
pub fn unknown(id: &str) -> String {
    format!("unknown ({id})")
}

fn strip_domain(name: &str) -> &str {
    name.split_once('@').map_or(name, |(login, _)| login)
}
