//! README-ordered file numbering
//!
//! A wiki export lists its pages in the README in reading order, but the file
//! names sort alphabetically. The numberer prefixes each listed page with its
//! position (`intro.md` → `01-intro.md`) and rewrites every link that points
//! at a renamed page.
//!
//! Planning and applying are separate steps: all [`RenameMap`]s are built from
//! a read-only view of the tree before any document is rewritten.

use crate::transform::links::{join_wrapped_links, map_link_targets, LinkKind, LinkSite};
use crate::transform::{split_line_ending, FenceTracker};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Name of the per-directory index file.
pub const README: &str = "README.md";

/// Reasons a directory's numbering is skipped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrdinalConflict {
    /// The same page is listed twice, so its position is ambiguous
    #[error("'{target}' is listed more than once in {readme}")]
    DuplicateEntry { readme: PathBuf, target: String },
    /// The prefixed name already exists
    #[error("renaming {from} to {to} would overwrite an existing file")]
    NameCollision { from: PathBuf, to: PathBuf },
    /// Two READMEs assign different ordinals to one file
    #[error("{readme} renames {path} differently than another README")]
    ClaimedElsewhere { readme: PathBuf, path: PathBuf },
}

/// Planned renames, keyed by original path relative to the tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameMap {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: PathBuf, to: PathBuf) {
        self.entries.insert(from, to);
    }

    pub fn get(&self, from: &Path) -> Option<&Path> {
        self.entries.get(from).map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Merge another directory's plan.
    ///
    /// All-or-nothing: if any path is already planned with a different target
    /// nothing from `other` is added.
    pub fn merge(&mut self, other: RenameMap, readme: &Path) -> Result<(), OrdinalConflict> {
        for (from, to) in &other.entries {
            if let Some(existing) = self.entries.get(from) {
                if existing != to {
                    return Err(OrdinalConflict::ClaimedElsewhere {
                        readme: readme.to_path_buf(),
                        path: from.clone(),
                    });
                }
            }
        }
        self.entries.extend(other.entries);
        Ok(())
    }
}

static INDEX_ITEM: OnceLock<Regex> = OnceLock::new();
static NUMBERED: OnceLock<Regex> = OnceLock::new();

fn index_item_regex() -> &'static Regex {
    INDEX_ITEM.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+\[[^\]]+\]\(([^)\s]+)\)\s*$")
            .expect("index item regex should compile")
    })
}

fn numbered_regex() -> &'static Regex {
    NUMBERED.get_or_init(|| Regex::new(r"^\d{2,}-").expect("numbered regex should compile"))
}

/// Whether a file name already carries an ordinal prefix.
pub fn is_numbered(file_name: &str) -> bool {
    numbered_regex().is_match(file_name)
}

/// Ordered page list of a README.
///
/// Every list item whose whole content is one link to a relative `.md` page
/// counts, nested items included, in document order. Link targets that the
/// exporter wrapped across lines are joined first.
///
/// # Example
///
/// ```
/// use docfix::ordinal::parse_readme_index;
///
/// let readme = "# Wiki\n\n- [Intro](intro.md)\n  - [Setup](setup.md)\n- [Site](https://x.dev/a.md)\n";
/// assert_eq!(parse_readme_index(readme), vec!["intro.md", "setup.md"]);
/// ```
pub fn parse_readme_index(readme: &str) -> Vec<String> {
    let joined = join_wrapped_links(readme);

    let mut fences = FenceTracker::default();
    let mut items = Vec::new();
    for line in joined.split_inclusive('\n') {
        let (content, _) = split_line_ending(line);
        if fences.observe(content) {
            continue;
        }
        let Some(caps) = index_item_regex().captures(content) else {
            continue;
        };
        let target = &caps[1];
        if target.contains("://") || target.starts_with("mailto:") {
            continue;
        }
        if !target.to_ascii_lowercase().ends_with(".md") {
            continue;
        }
        items.push(target.to_string());
    }
    items
}

/// Build the rename plan for one directory.
///
/// `dir` is the README's directory relative to the tree root and `files` is
/// every Markdown path in the tree. The entry at 1-based position `i` gets a
/// `{i:0w}-` prefix where `w` is at least 2. Entries that are already
/// numbered, point at a README, or have no file keep their name but still
/// consume their position.
pub fn plan_directory(
    dir: &Path,
    readme: &str,
    files: &BTreeSet<PathBuf>,
) -> Result<RenameMap, OrdinalConflict> {
    let readme_path = dir.join(README);
    let entries = parse_readme_index(readme);
    let width = entries.len().to_string().len().max(2);

    let mut seen = HashSet::new();
    let mut plan = RenameMap::new();
    for (idx, target) in entries.iter().enumerate() {
        let Some(relative) = normalize_relative(Path::new(target)) else {
            continue;
        };
        if !seen.insert(relative.clone()) {
            return Err(OrdinalConflict::DuplicateEntry {
                readme: readme_path,
                target: target.clone(),
            });
        }
        let Some(name) = relative.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.eq_ignore_ascii_case(README) || is_numbered(name) {
            continue;
        }
        let from = dir.join(&relative);
        if !files.contains(&from) {
            continue;
        }
        let to = from.with_file_name(format!("{:0width$}-{}", idx + 1, name, width = width));
        if files.contains(&to) {
            return Err(OrdinalConflict::NameCollision { from, to });
        }
        plan.insert(from, to);
    }

    Ok(plan)
}

/// Rewrite links in the document at `doc_path` that point at renamed files.
///
/// Targets are resolved against the document's directory; the written path
/// keeps its shape and only its last segment changes. Fragments and titles
/// are preserved.
///
/// # Example
///
/// ```
/// use docfix::ordinal::{rewrite_links_for_renames, RenameMap};
/// use std::path::{Path, PathBuf};
///
/// let mut renames = RenameMap::new();
/// renames.insert(PathBuf::from("docs/setup.md"), PathBuf::from("docs/02-setup.md"));
///
/// let out = rewrite_links_for_renames(Path::new("docs/README.md"), "[Setup](./setup.md#install)", &renames);
/// assert_eq!(out, "[Setup](./02-setup.md#install)");
/// ```
pub fn rewrite_links_for_renames(doc_path: &Path, text: &str, renames: &RenameMap) -> String {
    if renames.is_empty() {
        return text.to_string();
    }
    let doc_dir = doc_path.parent().unwrap_or(Path::new(""));
    map_link_targets(text, |site| rewrite_site(site, doc_dir, renames))
}

fn rewrite_site(site: &LinkSite<'_>, doc_dir: &Path, renames: &RenameMap) -> Option<String> {
    if site.kind == LinkKind::Image {
        return None;
    }
    let target = site.target;
    if target.is_empty()
        || target.starts_with('#')
        || target.starts_with('/')
        || target.starts_with('<')
        || target.contains("://")
        || target.starts_with("mailto:")
    {
        return None;
    }

    let url_end = target.find(char::is_whitespace).unwrap_or(target.len());
    let (url, title) = target.split_at(url_end);
    let path_end = url.find('#').unwrap_or(url.len());
    let (path, fragment) = url.split_at(path_end);
    if path.is_empty() {
        return None;
    }

    let resolved = normalize_relative(&doc_dir.join(path))?;
    let new_name = renames.get(&resolved)?.file_name()?.to_str()?;
    let new_path = match path.rsplit_once('/') {
        Some((prefix, _)) => format!("{}/{}", prefix, new_name),
        None => new_name.to_string(),
    };
    Some(format!("{}{}{}", new_path, fragment, title))
}

/// Resolve `.` and `..` in a relative path. Returns `None` for absolute paths
/// and paths that climb above the root.
fn normalize_relative(path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> BTreeSet<PathBuf> {
        paths.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_readme_order_assigns_ordinals() {
        let readme = "# Wiki\n\n- [Intro](intro.md)\n- [Setup](setup.md)\n";
        let plan = plan_directory(
            Path::new(""),
            readme,
            &files(&["README.md", "intro.md", "setup.md", "notes.md"]),
        )
        .unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(Path::new("intro.md")), Some(Path::new("01-intro.md")));
        assert_eq!(plan.get(Path::new("setup.md")), Some(Path::new("02-setup.md")));
        assert_eq!(plan.get(Path::new("notes.md")), None);
    }

    #[test]
    fn test_missing_and_numbered_entries_keep_position() {
        let readme = "- [A](01-a.md)\n- [Gone](gone.md)\n- [C](c.md)\n";
        let plan = plan_directory(
            Path::new("wiki"),
            readme,
            &files(&["wiki/01-a.md", "wiki/c.md"]),
        )
        .unwrap();

        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.get(Path::new("wiki/c.md")),
            Some(Path::new("wiki/03-c.md"))
        );
    }

    #[test]
    fn test_wide_lists_pad_to_entry_count() {
        let readme: String = (1..=100).map(|i| format!("- [P{i}](p{i}.md)\n")).collect();
        let plan = plan_directory(Path::new(""), &readme, &files(&["p7.md", "p100.md"])).unwrap();
        assert_eq!(plan.get(Path::new("p7.md")), Some(Path::new("007-p7.md")));
        assert_eq!(plan.get(Path::new("p100.md")), Some(Path::new("100-p100.md")));
    }

    #[test]
    fn test_duplicate_entry_fails_fast() {
        let readme = "- [Intro](intro.md)\n- [Again](./intro.md)\n";
        let err = plan_directory(Path::new(""), readme, &files(&["intro.md"])).unwrap_err();
        assert!(matches!(err, OrdinalConflict::DuplicateEntry { .. }));
    }

    #[test]
    fn test_collision_with_existing_file_fails_fast() {
        let readme = "- [Intro](intro.md)\n";
        let err =
            plan_directory(Path::new(""), readme, &files(&["intro.md", "01-intro.md"])).unwrap_err();
        assert_eq!(
            err,
            OrdinalConflict::NameCollision {
                from: PathBuf::from("intro.md"),
                to: PathBuf::from("01-intro.md"),
            }
        );
    }

    #[test]
    fn test_index_skips_external_fragments_and_prose() {
        let readme = "Intro [x](a.md) prose\n1. [One](one.md)\n* [Two](two.md#part)\n- [Ext](https://e.com/x.md)\n```\n- [Code](code.md)\n```\n";
        assert_eq!(parse_readme_index(readme), vec!["one.md"]);
    }

    #[test]
    fn test_index_joins_wrapped_targets() {
        let readme = "- [Long](long-page\n.md)\n- [Next](next.md)\n";
        assert_eq!(parse_readme_index(readme), vec!["long-page.md", "next.md"]);
    }

    #[test]
    fn test_links_rewritten_with_anchor() {
        let mut renames = RenameMap::new();
        renames.insert(PathBuf::from("setup.md"), PathBuf::from("02-setup.md"));

        let text = "See [setup](setup.md#install) and [other](other.md).\n";
        assert_eq!(
            rewrite_links_for_renames(Path::new("intro.md"), text, &renames),
            "See [setup](02-setup.md#install) and [other](other.md).\n"
        );
    }

    #[test]
    fn test_links_resolved_relative_to_document() {
        let mut renames = RenameMap::new();
        renames.insert(PathBuf::from("guide/setup.md"), PathBuf::from("guide/02-setup.md"));

        assert_eq!(
            rewrite_links_for_renames(Path::new("guide/deep/page.md"), "[s](../setup.md)", &renames),
            "[s](../02-setup.md)"
        );
        assert_eq!(
            rewrite_links_for_renames(Path::new("README.md"), "[s](guide/setup.md)", &renames),
            "[s](guide/02-setup.md)"
        );
        // Same name in another directory is a different file.
        assert_eq!(
            rewrite_links_for_renames(Path::new("other/page.md"), "[s](setup.md)", &renames),
            "[s](setup.md)"
        );
    }

    #[test]
    fn test_reference_definitions_and_titles() {
        let mut renames = RenameMap::new();
        renames.insert(PathBuf::from("setup.md"), PathBuf::from("02-setup.md"));

        let text = "[ref]: setup.md \"Setup\"\n[inline](setup.md \"Setup\")\n";
        assert_eq!(
            rewrite_links_for_renames(Path::new("README.md"), text, &renames),
            "[ref]: 02-setup.md \"Setup\"\n[inline](02-setup.md \"Setup\")\n"
        );
    }

    #[test]
    fn test_external_links_untouched() {
        let mut renames = RenameMap::new();
        renames.insert(PathBuf::from("setup.md"), PathBuf::from("02-setup.md"));
        let text = "[a](https://github.com/o/r/setup.md) [b](#setup.md) [c](/setup.md)";
        assert_eq!(rewrite_links_for_renames(Path::new("x.md"), text, &renames), text);
    }

    #[test]
    fn test_merge_rejects_conflicting_plans() {
        let mut merged = RenameMap::new();
        merged.insert(PathBuf::from("sub/a.md"), PathBuf::from("sub/01-a.md"));

        let mut other = RenameMap::new();
        other.insert(PathBuf::from("sub/a.md"), PathBuf::from("sub/03-a.md"));
        other.insert(PathBuf::from("sub/b.md"), PathBuf::from("sub/04-b.md"));

        let err = merged.merge(other, Path::new("sub/README.md")).unwrap_err();
        assert!(matches!(err, OrdinalConflict::ClaimedElsewhere { .. }));
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_normalize_relative() {
        assert_eq!(
            normalize_relative(Path::new("a/./b/../c.md")),
            Some(PathBuf::from("a/c.md"))
        );
        assert_eq!(normalize_relative(Path::new("../c.md")), None);
        assert_eq!(normalize_relative(Path::new("/abs.md")), None);
    }

    #[test]
    fn test_is_numbered() {
        assert!(is_numbered("01-intro.md"));
        assert!(is_numbered("120-x.md"));
        assert!(!is_numbered("1-intro.md"));
        assert!(!is_numbered("intro.md"));
    }
}
