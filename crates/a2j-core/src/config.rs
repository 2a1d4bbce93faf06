//! Run configuration: `a2j.toml` overlaid with environment variables.
//!
//! Lookup order for the file is an explicit path, then `./a2j.toml`, then
//! `<config_dir>/a2j/config.toml`. A missing file is not an error; every
//! setting can come from the environment instead. Environment variables
//! always win over the file.

use crate::error::{MigrateError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "a2j.toml";

const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub jira: JiraSection,
    #[serde(default)]
    pub comments: CommentsSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub paths: PathsSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraSection {
    /// e.g. `https://example.atlassian.net/rest/api/2`
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub server_type: Option<String>,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_email_domain: Option<String>,
    #[serde(default)]
    pub user_groups: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentsSection {
    #[serde(default)]
    pub skip_empty: bool,
    #[serde(default)]
    pub skip_commits: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterSection {
    /// `YYYY-MM-DD`; set when tickets were date-filtered upstream.
    #[serde(default)]
    pub tickets_created_on: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsSection {
    #[serde(default)]
    pub assembla_dir: Option<PathBuf>,
    #[serde(default)]
    pub jira_dir: Option<PathBuf>,
}

/// Jira deployment flavour; decides how comment authorship is expressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerType {
    /// Jira Cloud: comments can only be posted by an administrator.
    #[default]
    Cloud,
    /// Self-hosted Jira: comments are posted as their author.
    Hosted,
}

impl ServerType {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud" => Some(Self::Cloud),
            "hosted" | "server" | "datacenter" => Some(Self::Hosted),
            _ => None,
        }
    }
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_base: Option<String>,
    pub server_type: ServerType,
    pub admin_email: Option<String>,
    pub api_key: Option<String>,
    pub default_email_domain: Option<String>,
    pub user_groups: Vec<String>,
    pub timeout: Duration,
    pub skip_empty_comments: bool,
    pub skip_commit_comments: bool,
    pub tickets_created_on: Option<NaiveDate>,
    pub assembla_dir: PathBuf,
    pub jira_dir: PathBuf,
}

/// Credentials and endpoint required for any live Jira call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    pub api_base: String,
    pub admin_email: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl Settings {
    /// Endpoint and admin credentials, required before any live call.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingSetting`] naming the first absent value.
    pub fn api(&self) -> Result<ApiSettings> {
        let api_base = self
            .api_base
            .clone()
            .ok_or(MigrateError::MissingSetting { key: "JIRA_API_BASE" })?;
        let admin_email = self.admin_email.clone().ok_or(MigrateError::MissingSetting {
            key: "JIRA_API_ADMIN_EMAIL",
        })?;
        let api_key = self
            .api_key
            .clone()
            .ok_or(MigrateError::MissingSetting { key: "JIRA_API_KEY" })?;

        Ok(ApiSettings {
            api_base: api_base.trim_end_matches('/').to_string(),
            admin_email,
            api_key,
            timeout: self.timeout,
        })
    }

    /// Domain used to synthesize e-mail addresses for users exported without one.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingSetting`] when it is not configured.
    pub fn default_email_domain(&self) -> Result<&str> {
        self.default_email_domain
            .as_deref()
            .ok_or(MigrateError::MissingSetting {
                key: "JIRA_API_DEFAULT_EMAIL",
            })
    }
}

/// Load the config file (if any) and apply process environment overrides.
///
/// # Errors
///
/// Fails when an explicit file is missing, when a file cannot be parsed, or
/// when a setting has an invalid value.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let file = load_file_config(explicit)?;
    resolve_settings(file, |key| std::env::var(key).ok())
}

/// Find and parse the config file.
///
/// # Errors
///
/// Fails when `explicit` does not exist or any found file does not parse.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(MigrateError::ConfigParse {
                    path: path.to_path_buf(),
                    message: "file not found".to_string(),
                });
            }
            path.to_path_buf()
        }
        None => match discover_config_file() {
            Some(path) => path,
            None => return Ok(FileConfig::default()),
        },
    };

    let content = std::fs::read_to_string(&path)?;
    let config = toml::from_str::<FileConfig>(&content).map_err(|err| {
        MigrateError::ConfigParse {
            path: path.clone(),
            message: err.to_string(),
        }
    })?;
    tracing::debug!(path = %path.display(), "loaded config file");
    Ok(config)
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("a2j/config.toml"))
        .filter(|path| path.is_file())
}

/// Merge `file` with values from `env` (environment wins).
///
/// # Errors
///
/// Returns [`MigrateError::InvalidSetting`] for values that do not parse.
pub fn resolve_settings(
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let server_type = match get("JIRA_SERVER_TYPE").or(file.jira.server_type) {
        Some(raw) => ServerType::parse(&raw).ok_or_else(|| MigrateError::InvalidSetting {
            key: "JIRA_SERVER_TYPE",
            value: raw.clone(),
            reason: "expected 'cloud' or 'hosted'".to_string(),
        })?,
        None => ServerType::default(),
    };

    let user_groups = match get("JIRA_API_USER_GROUPS") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|group| !group.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        None => file.jira.user_groups,
    };

    let timeout_secs = match get("JIRA_API_TIMEOUT_SECS") {
        Some(raw) => raw.parse::<u64>().map_err(|err| MigrateError::InvalidSetting {
            key: "JIRA_API_TIMEOUT_SECS",
            value: raw.clone(),
            reason: err.to_string(),
        })?,
        None => file.jira.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
    };

    let skip_empty_comments = match get("JIRA_API_SKIP_EMPTY_COMMENTS") {
        Some(raw) => parse_bool("JIRA_API_SKIP_EMPTY_COMMENTS", &raw)?,
        None => file.comments.skip_empty,
    };
    let skip_commit_comments = match get("JIRA_API_SKIP_COMMIT_COMMENTS") {
        Some(raw) => parse_bool("JIRA_API_SKIP_COMMIT_COMMENTS", &raw)?,
        None => file.comments.skip_commits,
    };

    let tickets_created_on = get("TICKETS_CREATED_ON")
        .or(file.filter.tickets_created_on)
        .map(|raw| {
            NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|err| {
                MigrateError::InvalidSetting {
                    key: "TICKETS_CREATED_ON",
                    value: raw.clone(),
                    reason: err.to_string(),
                }
            })
        })
        .transpose()?;

    Ok(Settings {
        api_base: get("JIRA_API_BASE").or(file.jira.api_base),
        server_type,
        admin_email: get("JIRA_API_ADMIN_EMAIL").or(file.jira.admin_email),
        api_key: get("JIRA_API_KEY").or(file.jira.api_key),
        default_email_domain: get("JIRA_API_DEFAULT_EMAIL").or(file.jira.default_email_domain),
        user_groups,
        timeout: Duration::from_secs(timeout_secs),
        skip_empty_comments,
        skip_commit_comments,
        tickets_created_on,
        assembla_dir: get("OUTPUT_DIR_ASSEMBLA")
            .map(PathBuf::from)
            .or(file.paths.assembla_dir)
            .unwrap_or_else(|| PathBuf::from("data/assembla")),
        jira_dir: get("OUTPUT_DIR_JIRA")
            .map(PathBuf::from)
            .or(file.paths.jira_dir)
            .unwrap_or_else(|| PathBuf::from("data/jira")),
    })
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MigrateError::InvalidSetting {
            key,
            value: raw.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let settings = resolve_settings(FileConfig::default(), env_of(&[])).expect("resolve");
        assert_eq!(settings.server_type, ServerType::Cloud);
        assert!(!settings.skip_empty_comments);
        assert!(!settings.skip_commit_comments);
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.jira_dir, PathBuf::from("data/jira"));
        assert!(settings.api().is_err());
        assert!(settings.default_email_domain().is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [jira]
            api_base = "https://file.example/rest/api/2/"
            server_type = "cloud"
            admin_email = "admin@file.example"
            api_key = "file-key"
            user_groups = ["jira-users"]

            [comments]
            skip_empty = true
            "#,
        )
        .expect("toml");

        let settings = resolve_settings(
            file,
            env_of(&[
                ("JIRA_SERVER_TYPE", "hosted"),
                ("JIRA_API_SKIP_EMPTY_COMMENTS", "false"),
                ("JIRA_API_SKIP_COMMIT_COMMENTS", "true"),
                ("JIRA_API_USER_GROUPS", "a, b,,c"),
                ("TICKETS_CREATED_ON", "2018-06-01"),
            ]),
        )
        .expect("resolve");

        assert_eq!(settings.server_type, ServerType::Hosted);
        assert!(!settings.skip_empty_comments);
        assert!(settings.skip_commit_comments);
        assert_eq!(settings.user_groups, ["a", "b", "c"]);
        assert_eq!(
            settings.tickets_created_on,
            NaiveDate::from_ymd_opt(2018, 6, 1)
        );

        let api = settings.api().expect("api settings");
        assert_eq!(api.api_base, "https://file.example/rest/api/2");
        assert_eq!(api.api_key, "file-key");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = resolve_settings(FileConfig::default(), env_of(&[("JIRA_SERVER_TYPE", "moon")]))
            .expect_err("bad server type");
        assert!(matches!(err, MigrateError::InvalidSetting { key: "JIRA_SERVER_TYPE", .. }));

        let err = resolve_settings(
            FileConfig::default(),
            env_of(&[("TICKETS_CREATED_ON", "June 1st")]),
        )
        .expect_err("bad date");
        assert!(matches!(err, MigrateError::InvalidSetting { key: "TICKETS_CREATED_ON", .. }));

        let err = resolve_settings(
            FileConfig::default(),
            env_of(&[("JIRA_API_SKIP_EMPTY_COMMENTS", "maybe")]),
        )
        .expect_err("bad bool");
        assert!(err.to_string().contains("JIRA_API_SKIP_EMPTY_COMMENTS"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_file_config(Some(Path::new("/definitely/not/here.toml")))
            .expect_err("missing");
        assert!(matches!(err, MigrateError::ConfigParse { .. }));
    }
}
