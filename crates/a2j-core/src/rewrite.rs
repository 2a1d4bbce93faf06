//! Assembla markup → Jira wiki markup / Confluence storage format.
//!
//! A body is rewritten by an ordered list of pure text rules, each a plain
//! `fn(&str, &RewriteContext) -> String`. Rules never fail: references that do
//! not resolve are either left as literal text (mentions, ticket links) or
//! replaced by a readable placeholder (images). Text that contains none of the
//! recognized patterns comes back unchanged.
//!
//! Commit links (`[[r:...]]`) are not touched; whether commit comments are
//! migrated at all is decided by the filter stage.

use crate::html::fix_html;
use crate::identity::IdentityMap;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Where a rewritten body ends up; embed syntax differs per destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// Jira issue comment.
    Comment,
    /// Jira issue description.
    Description,
    /// Confluence page body.
    Page,
}

impl ContentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comment => "comment",
            Self::Description => "description",
            Self::Page => "page",
        }
    }

    const fn is_jira(self) -> bool {
        matches!(self, Self::Comment | Self::Description)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "comment" | "comments" => Ok(Self::Comment),
            "description" => Ok(Self::Description),
            "page" | "wiki" => Ok(Self::Page),
            other => Err(format!(
                "unknown content type '{other}': expected comment, description or page"
            )),
        }
    }
}

/// Read-only inputs shared by every rule.
#[derive(Debug, Clone, Copy)]
pub struct RewriteContext<'a> {
    identity: &'a IdentityMap,
    content_type: ContentType,
    strikethrough: bool,
}

impl<'a> RewriteContext<'a> {
    /// Strikethrough conversion starts disabled.
    #[must_use]
    pub const fn new(identity: &'a IdentityMap, content_type: ContentType) -> Self {
        Self {
            identity,
            content_type,
            strikethrough: false,
        }
    }

    #[must_use]
    pub const fn with_strikethrough(mut self, enabled: bool) -> Self {
        self.strikethrough = enabled;
        self
    }

    fn mention_name(&self, login: &str) -> Option<&'a str> {
        self.identity
            .name_by_login()
            .get(login)
            .map(String::as_str)
    }

    fn image_file(&self, attachment_id: &str) -> Option<&'a str> {
        self.identity
            .attachments()
            .get(attachment_id)
            .map(String::as_str)
    }

    fn issue_key(&self, ticket_number: &str) -> Option<&'a str> {
        self.identity
            .key_by_ticket_number()
            .get(ticket_number)
            .map(String::as_str)
    }
}

type Rule = fn(&str, &RewriteContext<'_>) -> String;

/// Rules in application order.
const RULES: &[(&str, Rule)] = &[
    ("xhtml", repair_xhtml),
    ("code", code_markup),
    ("links", url_links),
    ("tickets", ticket_links),
    ("mentions", user_mentions),
    ("images", image_embeds),
    ("strikethrough", strikethrough),
];

/// Rewrite one body for `ctx`'s destination.
#[must_use]
pub fn rewrite(body: &str, ctx: &RewriteContext<'_>) -> String {
    RULES
        .iter()
        .fold(body.to_string(), |text, (_, rule)| rule(&text, ctx))
}

/// Names of the rules in the order [`rewrite`] applies them.
#[must_use]
pub fn rule_names() -> Vec<&'static str> {
    RULES.iter().map(|(name, _)| *name).collect()
}

fn pre_open_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<pre>\s*<code[^>]*>").expect("valid pre regex"))
}

fn pre_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</code>\s*</pre>").expect("valid pre close regex"))
}

fn inline_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<code>(.*?)</code>").expect("valid code regex"))
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[url:([^\]|]+)(?:\|([^\]]*))?\]\]").expect("valid url regex")
    })
}

fn ticket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[ticket:#?(\d+)(?:\|([^\]]*))?\]\]").expect("valid ticket regex")
    })
}

fn user_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[user:([^\]|]+)(?:\|([^\]]*))?\]\]").expect("valid user regex")
    })
}

fn at_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(^|[\s(>,;])@([A-Za-z0-9][A-Za-z0-9._-]*)").expect("valid mention regex")
    })
}

fn markup_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^<>]*>").expect("valid tag regex"))
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[\[image:([^\]|]+)(?:\|([^\]]*))?\]\]").expect("valid image regex")
    })
}

fn tilde_strike_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"~~([^~\n]+?)~~").expect("valid strike regex"))
}

fn tag_strike_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<(?:s|del|strike)>(.*?)</(?:s|del|strike)>").expect("valid tag regex")
    })
}

fn repair_xhtml(text: &str, ctx: &RewriteContext<'_>) -> String {
    match ctx.content_type {
        ContentType::Page => fix_html(text),
        ContentType::Comment | ContentType::Description => text.to_string(),
    }
}

fn code_markup(text: &str, ctx: &RewriteContext<'_>) -> String {
    if !ctx.content_type.is_jira() {
        return text.to_string();
    }
    let text = pre_open_re().replace_all(text, "{code}");
    let text = pre_close_re().replace_all(&text, "{code}");
    inline_code_re().replace_all(&text, "{{$1}}").into_owned()
}

fn url_links(text: &str, ctx: &RewriteContext<'_>) -> String {
    if !ctx.content_type.is_jira() {
        return text.to_string();
    }
    url_re()
        .replace_all(text, |caps: &Captures<'_>| {
            let href = caps[1].trim();
            match caps.get(2).map(|label| label.as_str().trim()) {
                Some(label) if !label.is_empty() => format!("[{label}|{href}]"),
                _ => format!("[{href}]"),
            }
        })
        .into_owned()
}

fn ticket_links(text: &str, ctx: &RewriteContext<'_>) -> String {
    ticket_re()
        .replace_all(text, |caps: &Captures<'_>| {
            ctx.issue_key(&caps[1])
                .map_or_else(|| caps[0].to_string(), ToOwned::to_owned)
        })
        .into_owned()
}

fn mention(name: &str, content_type: ContentType) -> String {
    match content_type {
        ContentType::Page => format!(
            r#"<ac:link><ri:user ri:username="{}"/></ac:link>"#,
            xml_attr(name)
        ),
        ContentType::Comment | ContentType::Description => format!("[~{name}]"),
    }
}

fn user_mentions(text: &str, ctx: &RewriteContext<'_>) -> String {
    let text = user_tag_re().replace_all(text, |caps: &Captures<'_>| {
        ctx.mention_name(caps[1].trim())
            .map_or_else(|| caps[0].to_string(), |name| mention(name, ctx.content_type))
    });

    match ctx.content_type {
        ContentType::Page => outside_tags(&text, |segment| at_mentions(segment, ctx)),
        ContentType::Comment | ContentType::Description => at_mentions(&text, ctx),
    }
}

/// Apply `f` to the text between markup tags, leaving the tags untouched.
fn outside_tags(text: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for tag in markup_tag_re().find_iter(text) {
        out.push_str(&f(&text[last..tag.start()]));
        out.push_str(tag.as_str());
        last = tag.end();
    }
    out.push_str(&f(&text[last..]));
    out
}

fn at_mentions(text: &str, ctx: &RewriteContext<'_>) -> String {
    at_mention_re()
        .replace_all(text, |caps: &Captures<'_>| {
            let prefix = &caps[1];
            let candidate = &caps[2];
            let login = candidate.trim_end_matches(['.', '-']);
            let rest = &candidate[login.len()..];
            ctx.mention_name(login).map_or_else(
                || caps[0].to_string(),
                |name| format!("{prefix}{}{rest}", mention(name, ctx.content_type)),
            )
        })
        .into_owned()
}

fn image_embeds(text: &str, ctx: &RewriteContext<'_>) -> String {
    image_re()
        .replace_all(text, |caps: &Captures<'_>| {
            let attachment_id = caps[1].trim();
            let Some(file) = ctx.image_file(attachment_id) else {
                return format!("(image unavailable: {attachment_id})");
            };
            match ctx.content_type {
                ContentType::Comment => format!("!{file}|thumbnail!"),
                ContentType::Description => format!("!{file}!"),
                ContentType::Page => format!(
                    r#"<ac:image><ri:attachment ri:filename="{}"/></ac:image>"#,
                    xml_attr(file)
                ),
            }
        })
        .into_owned()
}

fn strikethrough(text: &str, ctx: &RewriteContext<'_>) -> String {
    if !ctx.strikethrough || !ctx.content_type.is_jira() {
        return text.to_string();
    }
    let text = tilde_strike_re().replace_all(text, "-$1-");
    tag_strike_re().replace_all(&text, "-$1-").into_owned()
}

fn xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
