//! Jira group membership listing.
//!
//! Used to check which Jira accounts exist before identities are
//! reconciled. Groups are paged through with `startAt`/`maxResults` until
//! Jira reports the last page; add-on service accounts are dropped and users
//! that belong to several groups are listed once.

use crate::remote::{JiraClient, RemoteError};
use crate::table::Ledger;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const PAGE_SIZE: usize = 50;

const SYSTEM_USER_PREFIX: &str = "addon_";

/// One page of `GET /group/member`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupPage {
    #[serde(default)]
    pub values: Vec<GroupMember>,
    #[serde(default = "default_true", rename = "isLast")]
    pub is_last: bool,
}

const fn default_true() -> bool {
    true
}

/// A Jira user as listed in a group, serialized with Jira's field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub key: String,
    #[serde(default, rename = "accountId")]
    pub account_id: String,
    #[serde(default, rename = "emailAddress")]
    pub email_address: String,
    #[serde(default, rename = "displayName")]
    pub display_name: String,
    #[serde(default)]
    pub active: bool,
}

impl GroupMember {
    /// Key members are de-duplicated on: the account id when Jira reports one
    /// (Cloud omits `name`), otherwise the user name.
    #[must_use]
    pub fn identity_key(&self) -> &str {
        if self.account_id.is_empty() {
            &self.name
        } else {
            &self.account_id
        }
    }
}

/// Members of `groups`, de-duplicated by [`GroupMember::identity_key`]
/// (first occurrence wins).
///
/// `fetch_page(group, start_at)` returns one page. A group whose fetch
/// fails contributes no members at all and is reported in the returned
/// failure list; the other groups are still listed.
pub fn collect_group_members<F>(groups: &[String], mut fetch_page: F) -> GroupListing
where
    F: FnMut(&str, usize) -> Result<GroupPage, RemoteError>,
{
    let mut listing = GroupListing::default();
    let mut seen = HashSet::new();

    for group in groups {
        match fetch_group(group, &mut fetch_page) {
            Ok(members) => {
                tracing::info!(group = %group, members = members.len(), "fetched group");
                for member in members {
                    if seen.insert(member.identity_key().to_string()) {
                        listing.members.push(member);
                    }
                }
            }
            Err(err) => {
                tracing::warn!(group = %group, "group fetch failed: {err}");
                listing.failed_groups.push((group.clone(), err.to_string()));
            }
        }
    }

    listing
}

fn fetch_group<F>(group: &str, fetch_page: &mut F) -> Result<Vec<GroupMember>, RemoteError>
where
    F: FnMut(&str, usize) -> Result<GroupPage, RemoteError>,
{
    let mut members = Vec::new();
    let mut start_at = 0;

    loop {
        let page = fetch_page(group, start_at)?;
        let fetched = page.values.len();
        members.extend(
            page.values
                .into_iter()
                .filter(|member| !member.name.starts_with(SYSTEM_USER_PREFIX)),
        );

        if page.is_last || fetched == 0 {
            break;
        }
        start_at += PAGE_SIZE;
    }

    Ok(members)
}

/// Result of listing several groups.
#[derive(Debug, Clone, Default)]
pub struct GroupListing {
    pub members: Vec<GroupMember>,
    /// `(group, error message)` for groups that could not be fetched.
    pub failed_groups: Vec<(String, String)>,
}

/// List `groups` through a live client.
#[must_use]
pub fn list_group_members(client: &JiraClient, groups: &[String]) -> GroupListing {
    collect_group_members(groups, |group, start_at| {
        client.group_members_page(group, start_at, PAGE_SIZE)
    })
}

/// Write `members` as CSV with Jira's column names, replacing `path`.
///
/// # Errors
///
/// Fails if the file cannot be written.
pub fn write_members(path: &Path, members: &[GroupMember]) -> crate::error::Result<()> {
    let mut ledger = Ledger::fresh(path);
    for member in members {
        ledger.append(member)?;
    }
    Ok(())
}
