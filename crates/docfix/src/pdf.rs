//! PDF export of a cleaned tree.
//!
//! Every immediate subdirectory holding Markdown is treated as one project:
//! its pages are concatenated (README first), Mermaid diagrams are rendered to
//! images where possible, and pandoc produces `<pdf_dir>/<project>.pdf`.

use crate::errors::DocfixError;
use crate::ordinal::README;
use crate::transform::{split_line_ending, Fence};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Renders Mermaid source to an image file.
pub trait DiagramRenderer {
    fn render(&self, source: &str, output: &Path) -> Result<()>;
}

/// `mmdc` from mermaid-cli.
#[derive(Debug, Clone)]
pub struct MermaidCli {
    program: PathBuf,
}

impl MermaidCli {
    /// Locate `mmdc` on PATH.
    pub fn detect() -> Option<Self> {
        which::which("mmdc").ok().map(|program| Self { program })
    }
}

impl DiagramRenderer for MermaidCli {
    fn render(&self, source: &str, output: &Path) -> Result<()> {
        let work = tempfile::tempdir().context("Failed to create temp directory")?;
        let input = work.path().join("diagram.mmd");
        fs::write(&input, source).with_context(|| format!("Failed to write {}", input.display()))?;

        let result = Command::new(&self.program)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(output)
            .args(["-b", "white", "-t", "default"])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .context("Failed to run mmdc")?;

        if !result.status.success() {
            return Err(DocfixError::ToolFailed {
                tool: "mmdc",
                target: output.display().to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Outcome of converting a whole tree.
#[derive(Debug, Default, Serialize)]
pub struct PdfReport {
    pub generated: Vec<PathBuf>,
    pub failed: Vec<ProjectFailure>,
}

#[derive(Debug, Serialize)]
pub struct ProjectFailure {
    pub project: String,
    pub error: String,
}

/// Immediate subdirectories of `root` that directly contain `.md` files.
pub fn project_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut projects = Vec::new();
    for entry in sorted_entries(root)? {
        let hidden = entry
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with('.'));
        if hidden || !entry.is_dir() {
            continue;
        }
        if !markdown_files(&entry)?.is_empty() {
            projects.push(entry);
        }
    }
    Ok(projects)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}

fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        })
        .collect())
}

/// Concatenate a project's pages into one Markdown document.
///
/// The README comes first without its leading heading (the title page
/// carries the project name), followed by the other pages in name order.
/// Rendered diagram images are written to `image_dir`.
pub fn consolidate_project(
    dir: &Path,
    renderer: Option<&dyn DiagramRenderer>,
    image_dir: &Path,
) -> Result<String> {
    let mut consolidated = String::new();

    let readme_path = dir.join(README);
    if readme_path.is_file() {
        let readme = read(&readme_path)?;
        let body = drop_first_heading(&readme);
        consolidated.push_str(&render_diagrams(body, renderer, image_dir, "readme"));
        consolidated.push_str("\n\n---\n\n");
    }

    let pages = markdown_files(dir)?
        .into_iter()
        .filter(|path| path.file_name().is_some_and(|name| name != README));
    for (idx, page) in pages.enumerate() {
        let stem = page
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("section");
        let prefix = format!("sec{}-{}", idx + 1, stem);
        consolidated.push_str(&render_diagrams(&read(&page)?, renderer, image_dir, &prefix));
        consolidated.push_str("\n\n---\n\n");
    }

    Ok(consolidated)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file {}", path.display()))
}

fn drop_first_heading(text: &str) -> &str {
    if !text.trim_start().starts_with('#') {
        return text;
    }
    let text = text.trim_start();
    match text.find('\n') {
        Some(end) => &text[end + 1..],
        None => "",
    }
}

/// Replace each Mermaid block with an image reference.
///
/// Blocks that cannot be rendered stay as plain code blocks so pandoc does
/// not try to highlight them as an unknown language.
pub fn render_diagrams(
    text: &str,
    renderer: Option<&dyn DiagramRenderer>,
    image_dir: &Path,
    prefix: &str,
) -> String {
    let mut out = String::with_capacity(text.len());
    // Open diagram: its fence, the opening line and the body lines.
    let mut block: Option<(Fence, &str, Vec<&str>)> = None;
    let mut count = 0;

    for line in text.split_inclusive('\n') {
        let (content, _) = split_line_ending(line);
        let fence = Fence::parse(content);
        if let Some((open, _, body)) = &mut block {
            match fence {
                Some(close) if open.is_closed_by(&close) => {
                    count += 1;
                    let source = body.concat();
                    out.push_str(&diagram_replacement(&source, renderer, image_dir, prefix, count));
                    block = None;
                }
                _ => body.push(line),
            }
            continue;
        }
        match fence {
            Some(open) if content.contains("mermaid") => block = Some((open, line, Vec::new())),
            _ => out.push_str(line),
        }
    }

    // Unterminated block: emit it as it was.
    if let Some((_, opener, body)) = block {
        out.push_str(opener);
        out.extend(body);
    }
    out
}

fn diagram_replacement(
    source: &str,
    renderer: Option<&dyn DiagramRenderer>,
    image_dir: &Path,
    prefix: &str,
    number: usize,
) -> String {
    if let Some(renderer) = renderer {
        let image = image_dir.join(format!("{}-diagram-{}.png", prefix, number));
        match renderer.render(source, &image) {
            Ok(()) => return format!("\n![Diagram {}]({})\n\n", number, image.display()),
            Err(e) => tracing::warn!("failed to render diagram {} of {}: {:#}", number, prefix, e),
        }
    }
    let mut block = String::from("\n```\n");
    block.push_str(source);
    if !source.ends_with('\n') {
        block.push('\n');
    }
    block.push_str("```\n\n");
    block
}

/// LaTeX title page for a project.
pub fn title_page(project: &str) -> String {
    let escaped = project.replace('\\', r"\textbackslash{}").replace('_', r"\_").replace('&', r"\&");
    format!(
        "\\begin{{titlepage}}\n\\centering\n\\vspace*{{3cm}}\n{{\\fontsize{{32}}{{40}}\\selectfont\\bfseries {} \\par}}\n\\vfill\n\\end{{titlepage}}\n",
        escaped
    )
}

/// Convert one project directory to `<pdf_dir>/<project>.pdf`.
pub fn convert_project(
    dir: &Path,
    pdf_dir: &Path,
    renderer: Option<&dyn DiagramRenderer>,
) -> Result<PathBuf> {
    let project = dir
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid project directory name: {}", dir.display()))?;

    let work = tempfile::tempdir().context("Failed to create temp directory")?;
    let consolidated = consolidate_project(dir, renderer, work.path())?;
    let markdown = work.path().join("consolidated.md");
    fs::write(&markdown, consolidated)
        .with_context(|| format!("Failed to write {}", markdown.display()))?;
    let title = work.path().join("title.tex");
    fs::write(&title, title_page(project))
        .with_context(|| format!("Failed to write {}", title.display()))?;

    let pdf = pdf_dir.join(format!("{}.pdf", project));
    tracing::debug!(project, pdf = %pdf.display(), "running pandoc");
    let output = Command::new("pandoc")
        .arg(&markdown)
        .arg("-o")
        .arg(&pdf)
        .args([
            "--pdf-engine=xelatex",
            "-V",
            "geometry:margin=1in",
            "-V",
            "fontsize=11pt",
            "-f",
            "markdown+emoji",
            "--toc",
            "--toc-depth=2",
        ])
        .arg("-B")
        .arg(&title)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .context("Failed to run pandoc")?;

    if !output.status.success() {
        return Err(DocfixError::ToolFailed {
            tool: "pandoc",
            target: project.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }
    Ok(pdf)
}

/// Convert every project under `root`.
///
/// Fails up front when pandoc is missing. A missing `mmdc` only means
/// diagrams stay as code, so `renderer` may be `None`. A failing project is
/// recorded and the rest still run.
pub fn convert_all(
    root: &Path,
    pdf_dir: &Path,
    renderer: Option<&dyn DiagramRenderer>,
) -> Result<PdfReport> {
    if which::which("pandoc").is_err() {
        return Err(DocfixError::ToolMissing("pandoc").into());
    }
    fs::create_dir_all(pdf_dir)
        .with_context(|| format!("Failed to create directory {}", pdf_dir.display()))?;

    let mut report = PdfReport::default();
    for project in project_dirs(root)? {
        let name = project
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        tracing::info!(project = %name, "converting to PDF");
        match convert_project(&project, pdf_dir, renderer) {
            Ok(pdf) => report.generated.push(pdf),
            Err(e) => {
                tracing::warn!(project = %name, "PDF conversion failed: {:#}", e);
                report.failed.push(ProjectFailure {
                    project: name,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    Ok(report)
}
