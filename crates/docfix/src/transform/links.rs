//! Link target rewriting
//!
//! Exported pages link to the wiki host with repository-rooted paths
//! (`/owner/repo/...`), pin GitHub links to commit blobs, and leave
//! placeholder "Section" links that point nowhere. Three rules fix these:
//!
//! 1. `/owner/repo/rest` becomes `https://github.com/owner/repo/rest`.
//! 2. `https://github.com/owner/repo/blob/<sha>/rest` loses `blob/<sha>/`.
//! 3. Placeholder section links resolve to `README.md#<slug>` through the
//!    [`AnchorTable`], only when the table has exactly one matching heading.
//!
//! Links inside fenced code blocks are never touched.

use crate::anchors::AnchorTable;
use crate::transform::{heading_text, split_line_ending, Fence, FenceTracker};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const GITHUB: &str = "https://github.com";

/// Continuation lines a wrapped list link may span.
const MAX_WRAPPED_LINES: usize = 4;

/// Read-only inputs of the link rewriter for one document.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    anchors: &'a AnchorTable,
    in_readme: bool,
}

impl<'a> LinkContext<'a> {
    pub fn new(anchors: &'a AnchorTable) -> Self {
        Self {
            anchors,
            in_readme: false,
        }
    }

    /// Mark the document as the README that owns the anchors, so resolved
    /// section links become same-document `#slug` targets.
    pub fn in_readme(mut self, in_readme: bool) -> Self {
        self.in_readme = in_readme;
        self
    }

    pub fn is_readme(&self) -> bool {
        self.in_readme
    }

    fn anchor_target(&self, slug: &str) -> String {
        if self.in_readme {
            format!("#{}", slug)
        } else {
            format!("README.md#{}", slug)
        }
    }
}

/// Syntactic form of a link occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// `[text](target)`
    Inline,
    /// `![alt](target)`
    Image,
    /// `[id]: target`
    Reference,
}

/// One link occurrence handed to a rewrite callback.
#[derive(Debug, Clone, Copy)]
pub struct LinkSite<'a> {
    pub kind: LinkKind,
    /// Visible text (alt text for images, label for reference definitions).
    pub text: &'a str,
    /// Raw target, including any title suffix.
    pub target: &'a str,
    /// Text of the nearest preceding heading.
    pub heading: Option<&'a str>,
}

static INLINE_LINK: OnceLock<Regex> = OnceLock::new();
static REFERENCE_DEF: OnceLock<Regex> = OnceLock::new();

fn inline_link_regex() -> &'static Regex {
    INLINE_LINK.get_or_init(|| {
        Regex::new(r"(!?)\[([^\]\n]*)\]\(([^)\n]*)\)").expect("inline link regex should compile")
    })
}

fn reference_def_regex() -> &'static Regex {
    REFERENCE_DEF.get_or_init(|| {
        Regex::new(r"^( {0,3}\[([^\]^][^\]]*)\]:[ \t]*)(\S+)(.*)$")
            .expect("reference definition regex should compile")
    })
}

/// Call `rewrite` for every link outside fenced code and splice in the
/// returned targets. `None` keeps the original target.
pub fn map_link_targets<F>(text: &str, mut rewrite: F) -> String
where
    F: FnMut(&LinkSite<'_>) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut fences = FenceTracker::default();
    let mut heading: Option<String> = None;

    for line in text.split_inclusive('\n') {
        let (content, ending) = split_line_ending(line);
        if fences.observe(content) {
            out.push_str(line);
            continue;
        }
        if let Some(h) = heading_text(content) {
            heading = Some(h.to_string());
        }
        out.push_str(&rewrite_line(content, heading.as_deref(), &mut rewrite));
        out.push_str(ending);
    }

    out
}

fn rewrite_line<F>(line: &str, heading: Option<&str>, rewrite: &mut F) -> String
where
    F: FnMut(&LinkSite<'_>) -> Option<String>,
{
    if let Some(caps) = reference_def_regex().captures(line) {
        let site = LinkSite {
            kind: LinkKind::Reference,
            text: &caps[2],
            target: &caps[3],
            heading,
        };
        return match rewrite(&site) {
            Some(target) => format!("{}{}{}", &caps[1], target, &caps[4]),
            None => line.to_string(),
        };
    }

    inline_link_regex()
        .replace_all(line, |caps: &Captures| {
            let kind = if caps[1].is_empty() {
                LinkKind::Inline
            } else {
                LinkKind::Image
            };
            let site = LinkSite {
                kind,
                text: &caps[2],
                target: &caps[3],
                heading,
            };
            match rewrite(&site) {
                Some(target) => format!("{}[{}]({})", &caps[1], &caps[2], target),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

static OPEN_LIST_LINK: OnceLock<Regex> = OnceLock::new();
static LIST_LINK: OnceLock<Regex> = OnceLock::new();

fn open_list_link_regex() -> &'static Regex {
    OPEN_LIST_LINK.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[[^\]]+\]\([^()\[\]\s]*$")
            .expect("open list link regex should compile")
    })
}

fn list_link_regex() -> &'static Regex {
    LIST_LINK.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[[^\]]+\]\([^()\[\]\s]+\)\s*$")
            .expect("list link regex should compile")
    })
}

/// Rejoin list-item links whose target the exporter wrapped across lines.
///
/// Only a list item holding a single link is joined, and only when the
/// joined line is a complete link with no whitespace in its target. Fenced
/// code and everything else passes through unchanged.
///
/// ```
/// use docfix::transform::links::join_wrapped_links;
///
/// assert_eq!(join_wrapped_links("- [Long](long-\npage.md)\n"), "- [Long](long-page.md)\n");
/// assert_eq!(join_wrapped_links("call(\n  arg,\n)\n"), "call(\n  arg,\n)\n");
/// ```
pub fn join_wrapped_links(text: &str) -> String {
    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = String::with_capacity(text.len());
    let mut fences = FenceTracker::default();
    let mut i = 0;

    while i < lines.len() {
        let (content, _) = split_line_ending(lines[i]);
        if !fences.observe(content) && open_list_link_regex().is_match(content) {
            if let Some((joined, consumed)) = join_list_link(&lines[i..]) {
                out.push_str(&joined);
                i += consumed;
                continue;
            }
        }
        out.push_str(lines[i]);
        i += 1;
    }

    out
}

/// Joined item and the number of lines it used, if the link closes in time.
fn join_list_link(lines: &[&str]) -> Option<(String, usize)> {
    let (first, _) = split_line_ending(lines[0]);
    let mut joined = first.to_string();

    for (offset, line) in lines.iter().enumerate().skip(1).take(MAX_WRAPPED_LINES) {
        let (content, ending) = split_line_ending(line);
        if content.trim().is_empty() || Fence::parse(content).is_some() {
            return None;
        }
        joined.push_str(content);
        if content.contains(')') {
            return list_link_regex()
                .is_match(&joined)
                .then(|| (format!("{}{}", joined, ending), offset + 1));
        }
    }

    None
}

/// Apply the deepwiki, blob and section rules to every link in `text`.
///
/// # Example
///
/// ```
/// use docfix::anchors::AnchorTable;
/// use docfix::transform::{rewrite_links, LinkContext};
///
/// let anchors = AnchorTable::default();
/// let out = rewrite_links("[x](/acme/widget/blob/abc123def/path/file.py)", &LinkContext::new(&anchors));
/// assert_eq!(out, "[x](https://github.com/acme/widget/path/file.py)");
/// ```
pub fn rewrite_links(text: &str, ctx: &LinkContext<'_>) -> String {
    map_link_targets(text, |site| rewrite_site(site, ctx))
}

fn rewrite_site(site: &LinkSite<'_>, ctx: &LinkContext<'_>) -> Option<String> {
    if site.kind != LinkKind::Image {
        if let Some(slug) = resolve_section_placeholder(site, ctx.anchors) {
            return Some(ctx.anchor_target(slug));
        }
    }
    let (url, title) = split_title(site.target);
    rewrite_url(url).map(|url| format!("{}{}", url, title))
}

/// Split a trailing ` "title"` (or `'title'`) off a link target.
fn split_title(target: &str) -> (&str, &str) {
    let trimmed = target.trim_end();
    for quote in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.ends_with(quote) {
            let body = &trimmed[..trimmed.len() - 1];
            if let Some(open) = body.rfind(quote) {
                let url = &target[..open];
                if url.ends_with(|c: char| c.is_whitespace()) {
                    let url_end = url.trim_end().len();
                    return (&target[..url_end], &target[url_end..]);
                }
            }
        }
    }
    (target, "")
}

static DEEPWIKI_PATH: OnceLock<Regex> = OnceLock::new();
static GITHUB_BLOB: OnceLock<Regex> = OnceLock::new();

fn deepwiki_path_regex() -> &'static Regex {
    DEEPWIKI_PATH.get_or_init(|| {
        Regex::new(r"^/[^/\s]+/[^/\s]+(?:/\S*)?$").expect("deepwiki path regex should compile")
    })
}

fn github_blob_regex() -> &'static Regex {
    GITHUB_BLOB.get_or_init(|| {
        Regex::new(r"^https://github\.com/([^/\s]+)/([^/\s]+)/blob/[0-9a-f]{7,40}/")
            .expect("github blob regex should compile")
    })
}

/// Rewrite a bare URL with the deepwiki and blob rules.
///
/// Returns `None` when neither rule applies.
pub fn rewrite_url(url: &str) -> Option<String> {
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }

    let absolute = if deepwiki_path_regex().is_match(url) {
        Some(format!("{}{}", GITHUB, url))
    } else {
        None
    };
    let current = absolute.as_deref().unwrap_or(url);

    let stripped = github_blob_regex()
        .is_match(current)
        .then(|| {
            github_blob_regex()
                .replace(current, "https://github.com/$1/$2/")
                .into_owned()
        });

    stripped.or(absolute)
}

/// Resolve a placeholder section link to a README anchor slug.
///
/// Two shapes are placeholders: visible text exactly `Section` with an empty
/// or `#` target (the key is the enclosing heading), and a target whose last
/// path segment reads `<Name> Section` (the key is `<Name>`).
fn resolve_section_placeholder<'t>(
    site: &LinkSite<'_>,
    anchors: &'t AnchorTable,
) -> Option<&'t str> {
    if anchors.is_empty() {
        return None;
    }

    let target = site.target.trim();
    if site.text == "Section" && (target.is_empty() || target == "#") {
        return anchors.resolve(site.heading?);
    }

    let key = section_key(target)?;
    anchors.resolve(&key)
}

fn section_key(target: &str) -> Option<String> {
    if target.starts_with('#') {
        return None;
    }
    let path = target.split('#').next().unwrap_or(target);
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    let decoded = segment.replace("%20", " ");
    let key = decoded.strip_suffix(" Section")?.trim();
    (!key.is_empty()).then(|| key.to_string())
}
