//! README heading anchors
//!
//! Builds the table used to resolve placeholder "Section" links. Slugs follow
//! GitHub's heading-anchor rules so the generated `README.md#slug` targets
//! work when the cleaned docs are browsed on GitHub.

use crate::transform::{heading_text, split_line_ending, FenceTracker};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Mapping from normalized README heading text to its anchor slug.
///
/// Entries keep README order. The table is built once per directory and is
/// read-only afterwards.
///
/// # Example
///
/// ```
/// use docfix::anchors::AnchorTable;
///
/// let table = AnchorTable::from_readme("# Guide\n## Networking Configuration\n## WSL.exe Issues\n");
/// assert_eq!(table.get("Networking Configuration"), Some("networking-configuration"));
/// assert_eq!(table.resolve("WSL.exe"), Some("wslexe-issues"));
/// assert_eq!(table.resolve("Missing"), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorTable {
    entries: Vec<(String, String)>,
}

impl AnchorTable {
    /// Build the table from README text, skipping fenced code blocks.
    pub fn from_readme(readme: &str) -> Self {
        let mut slugger = Slugger::default();
        let mut fences = FenceTracker::default();
        let mut entries = Vec::new();

        for line in readme.split_inclusive('\n') {
            let (content, _) = split_line_ending(line);
            if fences.observe(content) {
                continue;
            }
            if let Some(text) = heading_text(content) {
                let key = normalize_heading(text);
                if key.is_empty() {
                    continue;
                }
                entries.push((key, slugger.next_slug(text)));
            }
        }

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Exact lookup by heading text (normalized before comparison).
    ///
    /// Headings that occur more than once do not resolve.
    pub fn get(&self, heading: &str) -> Option<&str> {
        let key = normalize_heading(heading);
        unique(self.entries.iter().filter(|(text, _)| *text == key))
    }

    /// Resolve a placeholder key to a slug.
    ///
    /// An exact heading match wins. Otherwise exactly one heading must start
    /// with the key on a word boundary (`Networking` finds
    /// `Networking Configuration`). Anything else is unresolved.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        let key = normalize_heading(key);
        if key.is_empty() {
            return None;
        }
        if self.entries.iter().any(|(text, _)| *text == key) {
            return self.get(&key);
        }
        let prefix = format!("{} ", key);
        unique(
            self.entries
                .iter()
                .filter(|(text, _)| text.starts_with(&prefix)),
        )
    }
}

fn unique<'a>(mut matches: impl Iterator<Item = &'a (String, String)>) -> Option<&'a str> {
    let first = matches.next()?;
    match matches.next() {
        Some(_) => None,
        None => Some(first.1.as_str()),
    }
}

static INLINE_LINK: OnceLock<Regex> = OnceLock::new();

fn inline_link_regex() -> &'static Regex {
    INLINE_LINK.get_or_init(|| {
        Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("inline link regex should compile")
    })
}

/// Normalize heading text for comparison.
///
/// Inline links collapse to their text, emphasis and code markers are dropped,
/// case is folded and whitespace is collapsed.
pub fn normalize_heading(text: &str) -> String {
    let text = inline_link_regex().replace_all(text, "$1");
    text.chars()
        .filter(|c| !matches!(c, '*' | '_' | '`'))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// GitHub-compatible slug generator with duplicate suffixes (`-1`, `-2`).
#[derive(Debug, Default)]
pub struct Slugger {
    counts: HashMap<String, usize>,
}

impl Slugger {
    /// Generates the next slug for the given heading text.
    pub fn next_slug(&mut self, text: &str) -> String {
        let base = slugify(text);
        let count = self.counts.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base
        } else {
            format!("{}-{}", base, count)
        };
        *count += 1;
        slug
    }
}

/// Slug for a single heading, without duplicate tracking.
///
/// Lowercases, keeps alphanumerics, `-` and `_`, and turns spaces into `-`.
pub fn slugify(text: &str) -> String {
    let text = inline_link_regex().replace_all(text.trim(), "$1");
    text.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            ' ' => Some('-'),
            '-' | '_' => Some(c),
            c if c.is_alphanumeric() => Some(c),
            _ => None,
        })
        .collect()
}
