//! Tree-level orchestration.
//!
//! A run has three phases:
//!
//! 1. [`SourceTree::scan`] reads every Markdown file once and lists the rest
//!    as assets.
//! 2. [`transform_documents`] builds per-directory anchor tables, runs the
//!    per-file passes, plans README-ordered renames for every directory and
//!    rewrites cross-file links. Nothing is written.
//! 3. [`execute`] writes the plan (or only reports it for a dry run).

use crate::anchors::AnchorTable;
use crate::config::{OutputMode, RunConfig};
use crate::ordinal::{self, OrdinalConflict, RenameMap, README};
use crate::transform::{self, strip_artifacts, trim_preamble, LinkContext};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// One Markdown file threaded through the passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the tree root
    pub path: PathBuf,
    pub original: String,
    pub text: String,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, original: impl Into<String>) -> Self {
        let original = original.into();
        Self {
            path: path.into(),
            text: original.clone(),
            original,
        }
    }

    pub fn is_readme(&self) -> bool {
        self.path.file_name().is_some_and(|name| name == README)
    }

    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }
}

/// Files under the input root, sorted by path.
#[derive(Debug, Clone, Default)]
pub struct SourceTree {
    pub documents: Vec<Document>,
    /// Non-Markdown files (and Markdown that is not valid UTF-8), relative paths
    pub assets: Vec<PathBuf>,
}

impl SourceTree {
    /// Read the tree under `root`.
    ///
    /// Hidden entries are skipped. `exclude` (relative to `root`) is pruned,
    /// which keeps an output directory nested in the input out of the scan.
    pub fn scan(root: &Path, exclude: Option<&Path>) -> Result<Self> {
        let mut tree = SourceTree::default();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| keep_entry(entry, root, exclude));

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to scan {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .with_context(|| format!("{} is outside {}", entry.path().display(), root.display()))?
                .to_path_buf();

            if !is_markdown(&relative) {
                tree.assets.push(relative);
                continue;
            }

            let bytes = fs::read(entry.path())
                .with_context(|| format!("Failed to read file {}", entry.path().display()))?;
            match String::from_utf8(bytes) {
                Ok(text) => tree.documents.push(Document::new(relative, text)),
                Err(_) => {
                    tracing::warn!(path = %relative.display(), "not valid UTF-8, copying unchanged");
                    tree.assets.push(relative);
                }
            }
        }

        tracing::debug!(
            documents = tree.documents.len(),
            assets = tree.assets.len(),
            "scanned {}",
            root.display()
        );
        Ok(tree)
    }

    /// Every file path in the tree, Markdown and assets alike.
    pub fn all_paths(&self) -> BTreeSet<PathBuf> {
        self.documents
            .iter()
            .map(|doc| doc.path.clone())
            .chain(self.assets.iter().cloned())
            .collect()
    }
}

fn keep_entry(entry: &DirEntry, root: &Path, exclude: Option<&Path>) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if entry.file_name().to_str().is_some_and(|name| name.starts_with('.')) {
        return false;
    }
    match exclude {
        Some(excluded) => entry.path().strip_prefix(root).ok() != Some(excluded),
        None => true,
    }
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}

/// Result of the transform phase: final text and target path per document.
#[derive(Debug, Clone, Default)]
pub struct TransformPlan {
    pub documents: Vec<Document>,
    pub renames: RenameMap,
    pub conflicts: Vec<OrdinalConflict>,
}

impl TransformPlan {
    /// Target path of a document after numbering.
    pub fn output_path<'a>(&'a self, doc: &'a Document) -> &'a Path {
        self.renames.get(&doc.path).unwrap_or(doc.path.as_path())
    }
}

/// Run every pass over the documents without touching the filesystem.
///
/// `all_paths` must contain every file in the tree so renames can be checked
/// for collisions with assets as well as documents.
pub fn transform_documents(
    mut documents: Vec<Document>,
    all_paths: &BTreeSet<PathBuf>,
) -> TransformPlan {
    let anchors = build_anchor_tables(&documents);
    let empty = AnchorTable::default();

    for doc in &mut documents {
        let table = anchors.get(doc.dir()).unwrap_or(&empty);
        let ctx = LinkContext::new(table).in_readme(doc.is_readme());
        doc.text = transform::process_text(&doc.original, &ctx);
    }

    let (renames, conflicts) = plan_renames(&documents, all_paths);

    if !renames.is_empty() {
        for doc in &mut documents {
            doc.text = ordinal::rewrite_links_for_renames(&doc.path, &doc.text, &renames);
        }
    }

    TransformPlan {
        documents,
        renames,
        conflicts,
    }
}

/// Anchor table per directory, from that directory's cleaned README.
fn build_anchor_tables(documents: &[Document]) -> HashMap<PathBuf, AnchorTable> {
    documents
        .iter()
        .filter(|doc| doc.is_readme())
        .map(|doc| {
            let cleaned = strip_artifacts(&trim_preamble(&doc.original));
            let table = AnchorTable::from_readme(&cleaned);
            tracing::debug!(dir = %doc.dir().display(), headings = table.len(), "built anchor table");
            (doc.dir().to_path_buf(), table)
        })
        .collect()
}

fn plan_renames(
    documents: &[Document],
    all_paths: &BTreeSet<PathBuf>,
) -> (RenameMap, Vec<OrdinalConflict>) {
    let mut renames = RenameMap::new();
    let mut conflicts = Vec::new();

    for readme in documents.iter().filter(|doc| doc.is_readme()) {
        let planned = ordinal::plan_directory(readme.dir(), &readme.text, all_paths)
            .and_then(|plan| renames.merge(plan, &readme.path));
        if let Err(conflict) = planned {
            tracing::warn!("skipping numbering for {}: {}", readme.dir().display(), conflict);
            conflicts.push(conflict);
        }
    }

    (renames, conflicts)
}

/// Per-file entry of a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub source: PathBuf,
    pub output: PathBuf,
    pub changed: bool,
    pub renamed: bool,
}

impl FileChange {
    pub fn is_modified(&self) -> bool {
        self.changed || self.renamed
    }
}

/// What a run did, or would do in a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub in_place: bool,
    pub dry_run: bool,
    pub files: Vec<FileChange>,
    pub assets: usize,
    pub conflicts: Vec<String>,
}

impl RunReport {
    /// Files whose content or name changes.
    pub fn modified(&self) -> impl Iterator<Item = &FileChange> {
        self.files.iter().filter(|file| file.is_modified())
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Scan, transform and write according to `config`.
pub fn run(config: &RunConfig) -> Result<RunReport> {
    let exclude = match &config.mode {
        OutputMode::Directory(output) => nested_output(&config.input, output),
        OutputMode::InPlace => None,
    };
    let tree = SourceTree::scan(&config.input, exclude.as_deref())?;
    let all_paths = tree.all_paths();
    let assets = tree.assets;
    let plan = transform_documents(tree.documents, &all_paths);
    execute(config, &plan, &assets)
}

/// Relative location of `output` when it lies strictly inside `input`.
fn nested_output(input: &Path, output: &Path) -> Option<PathBuf> {
    let input = input.canonicalize().ok()?;
    let output = output.canonicalize().ok()?;
    output
        .strip_prefix(&input)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// Write the plan. A dry run only builds the report.
pub fn execute(config: &RunConfig, plan: &TransformPlan, assets: &[PathBuf]) -> Result<RunReport> {
    let files: Vec<FileChange> = plan
        .documents
        .iter()
        .map(|doc| {
            let output = plan.output_path(doc);
            FileChange {
                source: doc.path.clone(),
                output: output.to_path_buf(),
                changed: doc.text != doc.original,
                renamed: output != doc.path.as_path(),
            }
        })
        .collect();

    if !config.dry_run {
        match &config.mode {
            OutputMode::Directory(output_root) => {
                write_tree(&config.input, output_root, plan, assets)?
            }
            OutputMode::InPlace => write_in_place(&config.input, plan)?,
        }
    }

    Ok(RunReport {
        input: config.input.clone(),
        output: config.output_root().to_path_buf(),
        in_place: config.is_in_place(),
        dry_run: config.dry_run,
        files,
        assets: assets.len(),
        conflicts: plan.conflicts.iter().map(ToString::to_string).collect(),
    })
}

fn write_tree(
    input_root: &Path,
    output_root: &Path,
    plan: &TransformPlan,
    assets: &[PathBuf],
) -> Result<()> {
    for asset in assets {
        let from = input_root.join(asset);
        let to = output_root.join(asset);
        ensure_parent(&to)?;
        fs::copy(&from, &to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    }

    for doc in &plan.documents {
        write_document(&output_root.join(plan.output_path(doc)), &doc.text)?;
    }
    Ok(())
}

fn write_in_place(root: &Path, plan: &TransformPlan) -> Result<()> {
    for doc in &plan.documents {
        let target = plan.output_path(doc);
        let renamed = target != doc.path.as_path();
        if doc.text == doc.original && !renamed {
            continue;
        }
        write_document(&root.join(target), &doc.text)?;
        if renamed {
            let old = root.join(&doc.path);
            fs::remove_file(&old)
                .with_context(|| format!("Failed to remove {}", old.display()))?;
        }
    }
    Ok(())
}

fn write_document(path: &Path, text: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, text).with_context(|| format!("Failed to write file {}", path.display()))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "pipeline_proptests.rs"]
mod proptests;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn docs(entries: &[(&str, &str)]) -> (Vec<Document>, BTreeSet<PathBuf>) {
        let documents: Vec<Document> = entries
            .iter()
            .map(|(path, text)| Document::new(*path, *text))
            .collect();
        let paths = documents.iter().map(|doc| doc.path.clone()).collect();
        (documents, paths)
    }

    fn find<'a>(plan: &'a TransformPlan, path: &str) -> &'a Document {
        plan.documents
            .iter()
            .find(|doc| doc.path == Path::new(path))
            .unwrap()
    }

    const README_TEXT: &str = "Menu\nLink copied!\n# Guide\n\n## Networking Configuration\n\n- [Intro](intro.md)\n- [Setup](setup.md)\n";

    #[test]
    fn test_transform_numbers_pages_and_rewrites_links() {
        let (documents, paths) = docs(&[
            ("README.md", README_TEXT),
            ("intro.md", "# Intro\nNext: [setup](setup.md#install)\n"),
            ("setup.md", "# Setup\n## Install\n"),
        ]);
        let plan = transform_documents(documents, &paths);

        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.renames.len(), 2);

        let readme = find(&plan, "README.md");
        assert!(readme.text.starts_with("# Guide\n"));
        assert!(readme.text.contains("- [Intro](01-intro.md)\n- [Setup](02-setup.md)\n"));

        let intro = find(&plan, "intro.md");
        assert_eq!(plan.output_path(intro), Path::new("01-intro.md"));
        assert!(intro.text.contains("[setup](02-setup.md#install)"));
    }

    #[test]
    fn test_section_links_resolve_against_directory_readme() {
        let (documents, paths) = docs(&[
            ("README.md", README_TEXT),
            ("intro.md", "# Intro\nSee [Networking](Networking%20Section).\n"),
        ]);
        let plan = transform_documents(documents, &paths);

        let intro = find(&plan, "intro.md");
        assert!(
            intro.text.contains("[Networking](README.md#networking-configuration)"),
            "got: {}",
            intro.text
        );
    }

    #[test]
    fn test_conflict_skips_only_that_directory() {
        let (documents, paths) = docs(&[
            ("README.md", "# Root\n- [A](a.md)\n"),
            ("a.md", "# A\n"),
            ("sub/README.md", "# Sub\n- [B](b.md)\n- [B again](b.md)\n"),
            ("sub/b.md", "# B\n"),
        ]);
        let plan = transform_documents(documents, &paths);

        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.renames.get(Path::new("a.md")), Some(Path::new("01-a.md")));
        assert_eq!(plan.renames.get(Path::new("sub/b.md")), None);
    }

    #[test]
    fn test_readme_code_blocks_survive_numbering() {
        let readme = "# Root\n\n```python\nhandlers[\"x\"](\n    arg,\n)\n```\n\n- [A](a.md)\n";
        let (documents, paths) = docs(&[("README.md", readme), ("a.md", "# A\n")]);
        let plan = transform_documents(documents, &paths);

        let text = &find(&plan, "README.md").text;
        assert!(text.contains("```python\nhandlers[\"x\"](\n    arg,\n)\n```\n"));
        assert!(text.contains("- [A](01-a.md)\n"));
    }

    #[test]
    fn test_wrapped_readme_links_settle_in_one_run() {
        let readme = "# Root\n- [Src](/acme/widget/\nsrc/lib.rs)\n- [Long](long-\npage.md)\n";
        let (documents, paths) = docs(&[("README.md", readme), ("long-page.md", "# Long\n")]);
        let first = transform_documents(documents, &paths);

        let text = &find(&first, "README.md").text;
        assert_eq!(
            text,
            "# Root\n- [Src](https://github.com/acme/widget/src/lib.rs)\n- [Long](01-long-page.md)\n"
        );

        let renamed: Vec<Document> = first
            .documents
            .iter()
            .map(|doc| Document::new(first.output_path(doc), doc.text.clone()))
            .collect();
        let renamed_paths = renamed.iter().map(|doc| doc.path.clone()).collect();
        let second = transform_documents(renamed, &renamed_paths);

        assert!(second.renames.is_empty());
        assert!(second.documents.iter().all(|doc| doc.text == doc.original));
    }

    #[test]
    fn test_scan_skips_hidden_and_excluded() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("out")).unwrap();
        fs::write(root.join(".git/config.md"), "# hidden").unwrap();
        fs::write(root.join("out/old.md"), "# old").unwrap();
        fs::write(root.join("page.md"), "# Page").unwrap();
        fs::write(root.join("logo.png"), [0x89, 0x50]).unwrap();

        let tree = SourceTree::scan(root, Some(Path::new("out"))).unwrap();
        assert_eq!(tree.documents.len(), 1);
        assert_eq!(tree.documents[0].path, PathBuf::from("page.md"));
        assert_eq!(tree.assets, vec![PathBuf::from("logo.png")]);
    }

    #[test]
    fn test_scan_treats_invalid_utf8_markdown_as_asset() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();

        let tree = SourceTree::scan(temp.path(), None).unwrap();
        assert!(tree.documents.is_empty());
        assert_eq!(tree.assets, vec![PathBuf::from("bad.md")]);
    }

    #[test]
    fn test_run_writes_output_tree() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        let output = temp.path().join("output");
        fs::create_dir_all(input.join("img")).unwrap();
        fs::write(input.join("README.md"), "# Guide\n- [Intro](intro.md)\n").unwrap();
        fs::write(input.join("intro.md"), "# Intro Link copied!\n").unwrap();
        fs::write(input.join("img/a.bin"), [1, 2, 3]).unwrap();

        let config = RunConfig {
            input: input.clone(),
            mode: OutputMode::Directory(output.clone()),
            dry_run: false,
        };
        let report = run(&config).unwrap();

        assert_eq!(report.files.len(), 2);
        assert_eq!(report.assets, 1);
        assert_eq!(
            fs::read_to_string(output.join("01-intro.md")).unwrap(),
            "# Intro\n"
        );
        assert_eq!(fs::read(output.join("img/a.bin")).unwrap(), vec![1, 2, 3]);
        assert!(!output.join("intro.md").exists());
        // Input is untouched.
        assert!(input.join("intro.md").exists());
    }

    #[test]
    fn test_dry_run_reports_without_writing() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("README.md"), "# Guide\n- [Intro](intro.md)\n").unwrap();
        fs::write(input.join("intro.md"), "# Intro\n").unwrap();

        let config = RunConfig {
            input: input.clone(),
            mode: OutputMode::InPlace,
            dry_run: true,
        };
        let report = run(&config).unwrap();

        let modified: Vec<_> = report.modified().map(|f| f.output.clone()).collect();
        assert_eq!(
            modified,
            vec![PathBuf::from("README.md"), PathBuf::from("01-intro.md")]
        );
        assert!(input.join("intro.md").exists());
        assert!(!input.join("01-intro.md").exists());
    }

    #[test]
    fn test_in_place_renames_and_removes_old_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("README.md"), "# Guide\n- [Intro](intro.md)\n").unwrap();
        fs::write(root.join("intro.md"), "# Intro\n").unwrap();

        let config = RunConfig {
            input: root.to_path_buf(),
            mode: OutputMode::InPlace,
            dry_run: false,
        };
        run(&config).unwrap();

        assert!(!root.join("intro.md").exists());
        assert_eq!(fs::read_to_string(root.join("01-intro.md")).unwrap(), "# Intro\n");
        assert_eq!(
            fs::read_to_string(root.join("README.md")).unwrap(),
            "# Guide\n- [Intro](01-intro.md)\n"
        );

        // A second run finds nothing left to do.
        let second = run(&config).unwrap();
        assert_eq!(second.modified().count(), 0);
    }

    #[test]
    fn test_nested_output_is_excluded() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().to_path_buf();
        let output = input.join("cleaned");
        fs::write(input.join("page.md"), "# Page\n").unwrap();

        let config = RunConfig {
            input: input.clone(),
            mode: OutputMode::Directory(output.clone()),
            dry_run: false,
        };
        run(&config).unwrap();
        let second = run(&config).unwrap();

        assert_eq!(second.files.len(), 1);
        assert!(!output.join("cleaned").exists());
    }
}
