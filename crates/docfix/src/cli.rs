//! Command-line interface definitions using clap.

use clap::Parser;
use std::path::PathBuf;

/// Normalize Markdown exported from wiki generators
///
/// Cleans every `.md` file under INPUT_DIR: drops preamble noise and
/// "Link copied!" artifacts, fixes deepwiki and GitHub blob links, resolves
/// placeholder "Section" links, sanitizes Mermaid diagrams and numbers pages
/// in README order. Other files are copied unchanged.
///
/// Exit Codes:
///   0  - Run succeeded
///   1  - Generic error occurred
///   2  - Invalid arguments or usage error
///   3  - Input directory not found
///   4  - Numbering skipped for a directory (duplicate or collision)
///   5  - Permission denied
///  10  - External tool failed (pandoc, mmdc)
#[derive(Parser, Debug)]
#[command(name = "docfix", version)]
#[command(about = "Normalize Markdown exported from wiki generators", long_about)]
pub struct Cli {
    /// Directory holding the exported pages [default: ./input]
    pub input_dir: Option<PathBuf>,

    /// Where cleaned files are written (required unless --in-place)
    pub output_dir: Option<PathBuf>,

    /// Rewrite files inside INPUT_DIR
    #[arg(long)]
    pub in_place: bool,

    /// Report the files that would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress non-essential output (for scripting)
    #[arg(short, long)]
    pub quiet: bool,

    /// Convert each project of an existing output tree to PDF (OUTPUT_DIR, default ./output)
    #[arg(long)]
    pub pdf: bool,

    /// Directory for generated PDFs
    #[arg(long, env = "DOCFIX_PDF_DIR", default_value = "./output-pdf")]
    pub pdf_dir: PathBuf,
}
