//! Jira REST calls.
//!
//! Every call is a single blocking attempt; there is no retry. Failures are
//! returned as [`RemoteError`] values for the caller to record, never as
//! panics, and a failure never affects any other record.

use crate::config::{ApiSettings, ServerType};
use crate::identity::{UserRef, unknown};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cell::Cell;

/// Tag prefixed to every migrated body to mark its provenance.
pub const PROVENANCE_TAG: &str = "Assembla";

const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("HTTP {status} from {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected response from {url}: {message}")]
    MalformedResponse { url: String, message: String },
}

/// Basic-auth credentials for one request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    #[must_use]
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// `Authorization` header value.
    #[must_use]
    pub fn header(&self) -> String {
        let token = BASE64.encode(format!("{}:{}", self.user, self.secret));
        format!("Basic {token}")
    }
}

/// How the original author of a comment is represented in Jira.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorStrategy {
    /// Post as the author. Migrated users were created with their login as
    /// password, so the author's own basic-auth credentials are used.
    Impersonate,
    /// Post as the administrator and name the author in the body.
    Attribute,
}

impl AuthorStrategy {
    #[must_use]
    pub const fn for_server(server_type: ServerType) -> Self {
        match server_type {
            ServerType::Hosted => Self::Impersonate,
            ServerType::Cloud => Self::Attribute,
        }
    }
}

/// The request a comment turns into, before it is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedComment {
    pub credentials: Credentials,
    pub payload: CommentPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentPayload {
    pub body: String,
}

/// Build credentials and body for one comment.
///
/// `author` is `None` when the Assembla user id did not resolve; the comment
/// is then posted by the administrator and attributed to `unknown (<id>)`.
#[must_use]
pub fn prepare_comment(
    strategy: AuthorStrategy,
    admin: &Credentials,
    author_id: &str,
    author: Option<&UserRef>,
    created_on: &str,
    rewritten: &str,
) -> PreparedComment {
    let preamble = format!("Created on {created_on}\n\n{rewritten}");

    let (credentials, body) = match (strategy, author) {
        (AuthorStrategy::Impersonate, Some(user)) => {
            (Credentials::new(&user.name, &user.name), preamble)
        }
        (AuthorStrategy::Impersonate | AuthorStrategy::Attribute, user) => {
            let author_link = user.map_or_else(|| unknown(author_id), |u| format!("[~{}]", u.name));
            (admin.clone(), format!("Author {author_link} | {preamble}"))
        }
    };

    PreparedComment {
        credentials,
        payload: CommentPayload {
            body: format!("{PROVENANCE_TAG} | {body}"),
        },
    }
}

/// A comment Jira accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedComment {
    pub id: String,
}

/// The destination operations the comment migration needs.
pub trait IssueApi {
    /// URL a comment on `issue_id` is posted to (also used for progress output).
    fn comment_url(&self, issue_id: &str) -> String;

    /// `POST /issue/{issue_id}/comment`, exactly one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on transport failure, non-2xx status, or a
    /// success body without an `id`.
    fn create_comment(
        &self,
        issue_id: &str,
        credentials: &Credentials,
        payload: &CommentPayload,
    ) -> Result<CreatedComment, RemoteError>;
}

/// Blocking Jira REST client.
pub struct JiraClient {
    agent: ureq::Agent,
    api_base: String,
    admin: Credentials,
    requests: Cell<usize>,
}

impl JiraClient {
    #[must_use]
    pub fn new(api: &ApiSettings) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(api.timeout)
            .user_agent(concat!("a2j/", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            agent,
            api_base: api.api_base.clone(),
            admin: Credentials::new(&api.admin_email, &api.api_key),
            requests: Cell::new(0),
        }
    }

    #[must_use]
    pub const fn admin_credentials(&self) -> &Credentials {
        &self.admin
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.get()
    }

    /// `GET /group/member` for one page of a group.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on any failed or undecodable response.
    pub fn group_members_page(
        &self,
        group: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<crate::users::GroupPage, RemoteError> {
        let url = format!("{}/group/member", self.api_base);
        self.requests.set(self.requests.get() + 1);

        let request = self
            .agent
            .get(&url)
            .query("groupname", group)
            .query("includeInactiveUsers", "true")
            .query("startAt", &start_at.to_string())
            .query("maxResults", &max_results.to_string())
            .set("Accept", "application/json")
            .set("Authorization", &self.admin.header());

        let body = read_response(&url, request.call())?;
        serde_json::from_str(&body).map_err(|err| RemoteError::MalformedResponse {
            url,
            message: err.to_string(),
        })
    }
}

impl IssueApi for JiraClient {
    fn comment_url(&self, issue_id: &str) -> String {
        format!("{}/issue/{issue_id}/comment", self.api_base)
    }

    fn create_comment(
        &self,
        issue_id: &str,
        credentials: &Credentials,
        payload: &CommentPayload,
    ) -> Result<CreatedComment, RemoteError> {
        let url = self.comment_url(issue_id);
        self.requests.set(self.requests.get() + 1);

        let response = self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .set("Content-Type", "application/json; charset=utf-8")
            .set("Authorization", &credentials.header())
            .send_json(payload);

        let body = read_response(&url, response)?;
        parse_created(&url, &body)
    }
}

fn read_response(
    url: &str,
    response: Result<ureq::Response, ureq::Error>,
) -> Result<String, RemoteError> {
    match response {
        Ok(response) => response
            .into_string()
            .map_err(|err| RemoteError::MalformedResponse {
                url: url.to_string(),
                message: err.to_string(),
            }),
        Err(ureq::Error::Status(status, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(RemoteError::Status {
                status,
                url: url.to_string(),
                message: jira_error_message(&body),
            })
        }
        Err(err) => Err(RemoteError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }),
    }
}

/// Extract the destination id from a create response.
///
/// # Errors
///
/// Returns [`RemoteError::MalformedResponse`] when the body is not JSON or
/// carries no usable `id`.
pub fn parse_created(url: &str, body: &str) -> Result<CreatedComment, RemoteError> {
    let malformed = |message: String| RemoteError::MalformedResponse {
        url: url.to_string(),
        message,
    };

    let value: JsonValue = serde_json::from_str(body).map_err(|err| malformed(err.to_string()))?;
    match value.get("id") {
        Some(JsonValue::String(id)) if !id.is_empty() => Ok(CreatedComment { id: id.clone() }),
        Some(JsonValue::Number(id)) => Ok(CreatedComment { id: id.to_string() }),
        _ => Err(malformed("response has no 'id'".to_string())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct JiraErrorBody {
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
    #[serde(default)]
    errors: std::collections::BTreeMap<String, String>,
}

/// Human-readable summary of a Jira error body.
///
/// Jira answers failures with `{"errorMessages": [...], "errors": {field: msg}}`;
/// anything else is returned as (truncated) raw text.
#[must_use]
pub fn jira_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<JiraErrorBody>(body) {
        let parts: Vec<String> = parsed
            .error_messages
            .into_iter()
            .chain(
                parsed
                    .errors
                    .into_iter()
                    .map(|(field, message)| format!("{field}: {message}")),
            )
            .collect();
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

/// Stand-in for Jira that accepts every comment and hands out sequential ids.
#[derive(Debug, Default)]
pub struct DryRunApi {
    next_id: Cell<u64>,
}

impl DryRunApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IssueApi for DryRunApi {
    fn comment_url(&self, issue_id: &str) -> String {
        format!("dry-run://issue/{issue_id}/comment")
    }

    fn create_comment(
        &self,
        _issue_id: &str,
        _credentials: &Credentials,
        _payload: &CommentPayload,
    ) -> Result<CreatedComment, RemoteError> {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        Ok(CreatedComment { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserRef {
        UserRef {
            login: name.to_string(),
            name: name.to_string(),
            display_name: name.to_string(),
            email: format!("{name}@example.org"),
            account_id: None,
        }
    }

    #[test]
    fn credentials_encode_basic_auth_and_hide_secret() {
        let creds = Credentials::new("admin@example.org", "token");
        assert_eq!(creds.header(), "Basic YWRtaW5AZXhhbXBsZS5vcmc6dG9rZW4=");
        assert!(!format!("{creds:?}").contains("token"));
    }

    #[test]
    fn attribute_strategy_names_author_and_uses_admin() {
        let admin = Credentials::new("admin", "key");
        let alice = user("alice");
        let prepared = prepare_comment(
            AuthorStrategy::Attribute,
            &admin,
            "u1",
            Some(&alice),
            "2020-01-01 10:00",
            "hello",
        );
        assert_eq!(prepared.credentials, admin);
        assert_eq!(
            prepared.payload.body,
            "Assembla | Author [~alice] | Created on 2020-01-01 10:00\n\nhello"
        );
    }

    #[test]
    fn impersonate_strategy_posts_as_author() {
        let admin = Credentials::new("admin", "key");
        let alice = user("alice");
        let prepared = prepare_comment(
            AuthorStrategy::Impersonate,
            &admin,
            "u1",
            Some(&alice),
            "2020-01-01 10:00",
            "hello",
        );
        assert_eq!(prepared.credentials.user(), "alice");
        assert_eq!(
            prepared.payload.body,
            "Assembla | Created on 2020-01-01 10:00\n\nhello"
        );
    }

    #[test]
    fn unknown_author_falls_back_to_admin_attribution() {
        let admin = Credentials::new("admin", "key");
        for strategy in [AuthorStrategy::Impersonate, AuthorStrategy::Attribute] {
            let prepared = prepare_comment(strategy, &admin, "u9", None, "t", "x");
            assert_eq!(prepared.credentials, admin);
            assert!(prepared.payload.body.starts_with("Assembla | Author unknown (u9) | "));
        }
    }

    #[test]
    fn strategy_follows_server_type() {
        assert_eq!(
            AuthorStrategy::for_server(ServerType::Cloud),
            AuthorStrategy::Attribute
        );
        assert_eq!(
            AuthorStrategy::for_server(ServerType::Hosted),
            AuthorStrategy::Impersonate
        );
    }

    #[test]
    fn parse_created_accepts_string_and_numeric_ids() {
        assert_eq!(
            parse_created("u", r#"{"id":"10001","body":"x"}"#).map(|c| c.id),
            Ok("10001".to_string())
        );
        assert_eq!(
            parse_created("u", r#"{"id":10002}"#).map(|c| c.id),
            Ok("10002".to_string())
        );
        assert!(matches!(
            parse_created("u", r#"{"self":"x"}"#),
            Err(RemoteError::MalformedResponse { .. })
        ));
        assert!(parse_created("u", "<html>").is_err());
    }

    #[test]
    fn jira_error_message_flattens_structured_errors() {
        let body = r#"{"errorMessages":["Issue does not exist"],"errors":{"body":"too long"}}"#;
        assert_eq!(
            jira_error_message(body),
            "Issue does not exist; body: too long"
        );
        assert_eq!(jira_error_message("  "), "empty response body");
        assert_eq!(jira_error_message("Bad Gateway"), "Bad Gateway");

        let long = "x".repeat(MAX_ERROR_BODY + 10);
        assert!(jira_error_message(&long).ends_with("..."));
    }

    #[test]
    fn dry_run_hands_out_sequential_ids() {
        let api = DryRunApi::new();
        let creds = Credentials::new("a", "b");
        let payload = CommentPayload {
            body: "x".to_string(),
        };
        assert_eq!(api.create_comment("1", &creds, &payload).map(|c| c.id), Ok("1".to_string()));
        assert_eq!(api.create_comment("1", &creds, &payload).map(|c| c.id), Ok("2".to_string()));
        assert!(api.comment_url("10042").contains("10042"));
    }
}
