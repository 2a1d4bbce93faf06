//! Repairs for Assembla wiki HTML before it is stored as a Confluence page.
//!
//! Confluence rejects bodies that are not well-formed XHTML ("error parsing
//! xhtml"). Assembla wiki exports contain void elements without a closing
//! slash, stray `<span>`/`<colgroup>` wrappers and a few tags Confluence does
//! not know, so those are normalized here.

use regex::Regex;
use std::sync::OnceLock;

fn span_re() -> &'static Regex {
    static SPAN_RE: OnceLock<Regex> = OnceLock::new();
    SPAN_RE.get_or_init(|| Regex::new(r"</?span[^>]*>").expect("valid span regex"))
}

fn colgroup_re() -> &'static Regex {
    static COLGROUP_RE: OnceLock<Regex> = OnceLock::new();
    COLGROUP_RE.get_or_init(|| Regex::new(r"</?colgroup>").expect("valid colgroup regex"))
}

fn self_closed_heading_re() -> &'static Regex {
    static HEADING_RE: OnceLock<Regex> = OnceLock::new();
    HEADING_RE.get_or_init(|| Regex::new(r"(<h[1-6][^>]*?)\s*/>").expect("valid heading regex"))
}

fn void_element_re() -> &'static Regex {
    static VOID_RE: OnceLock<Regex> = OnceLock::new();
    VOID_RE.get_or_init(|| Regex::new(r"<(?:col|img)(?:\s[^>]*)?>").expect("valid void regex"))
}

/// Make Assembla wiki HTML acceptable to the Confluence storage format.
#[must_use]
pub fn fix_html(html: &str) -> String {
    let text = html
        .replace("<br>", "<br/>")
        .replace("<wbr>", "&lt;wbr&gt;")
        .replace("<package>", "&lt;package&gt;")
        .replace("<strike>", "<del>")
        .replace("</strike>", "</del>");

    let text = span_re().replace_all(&text, "");
    let text = colgroup_re().replace_all(&text, "");
    let text = self_closed_heading_re().replace_all(&text, "$1>");

    void_element_re()
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let tag = &caps[0];
            if tag.ends_with("/>") {
                tag.to_string()
            } else {
                format!("{}/>", &tag[..tag.len() - 1])
            }
        })
        .into_owned()
}
