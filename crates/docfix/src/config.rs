//! Run configuration resolved from command-line arguments.
//!
//! There is no configuration file. [`RunConfig::from_cli`] applies defaults
//! and rejects contradictory flags; [`RunConfig::validate`] checks the
//! filesystem before anything is read.

use crate::cli::Cli;
use crate::errors::DocfixError;
use std::path::{Path, PathBuf};

pub const DEFAULT_INPUT_DIR: &str = "./input";
pub const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Where cleaned documents go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Mirror the tree into a separate directory
    Directory(PathBuf),
    /// Rewrite files inside the input directory
    InPlace,
}

/// What the binary should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Clean(RunConfig),
    Pdf(PdfConfig),
}

/// Settings for a cleaning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub input: PathBuf,
    pub mode: OutputMode,
    pub dry_run: bool,
}

/// Settings for PDF conversion of an already cleaned tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfConfig {
    pub source: PathBuf,
    pub pdf_dir: PathBuf,
}

impl Task {
    pub fn from_cli(cli: &Cli) -> Result<Self, DocfixError> {
        if cli.pdf {
            if cli.in_place || cli.dry_run {
                return Err(DocfixError::InvalidArguments(
                    "--pdf cannot be combined with --in-place or --dry-run".to_string(),
                ));
            }
            let source = cli
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
            return Ok(Task::Pdf(PdfConfig {
                source,
                pdf_dir: cli.pdf_dir.clone(),
            }));
        }
        RunConfig::from_cli(cli).map(Task::Clean)
    }
}

impl RunConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, DocfixError> {
        let input = cli
            .input_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR));

        let mode = match (&cli.output_dir, cli.in_place) {
            (Some(_), true) => {
                return Err(DocfixError::InvalidArguments(
                    "OUTPUT_DIR cannot be used with --in-place".to_string(),
                ))
            }
            (Some(dir), false) => OutputMode::Directory(dir.clone()),
            (None, true) => OutputMode::InPlace,
            // A dry run reports paths relative to the tree, so no target is needed.
            (None, false) if cli.dry_run => OutputMode::InPlace,
            (None, false) => {
                return Err(DocfixError::InvalidArguments(
                    "OUTPUT_DIR is required unless --in-place is set".to_string(),
                ))
            }
        };

        Ok(Self {
            input,
            mode,
            dry_run: cli.dry_run,
        })
    }

    /// Check the input directory and the output target.
    pub fn validate(&self) -> Result<(), DocfixError> {
        if !self.input.exists() {
            return Err(DocfixError::InputNotFound(self.input.clone()));
        }
        if !self.input.is_dir() {
            return Err(DocfixError::InputNotDirectory(self.input.clone()));
        }
        if let OutputMode::Directory(output) = &self.mode {
            if same_directory(&self.input, output) {
                return Err(DocfixError::InvalidArguments(format!(
                    "OUTPUT_DIR {} is the input directory; use --in-place instead",
                    output.display()
                )));
            }
            if output.exists() && !output.is_dir() {
                return Err(DocfixError::InvalidArguments(format!(
                    "OUTPUT_DIR {} exists and is not a directory",
                    output.display()
                )));
            }
        }
        Ok(())
    }

    /// Root that written paths are relative to.
    pub fn output_root(&self) -> &Path {
        match &self.mode {
            OutputMode::Directory(dir) => dir,
            OutputMode::InPlace => &self.input,
        }
    }

    pub fn is_in_place(&self) -> bool {
        self.mode == OutputMode::InPlace
    }
}

impl PdfConfig {
    pub fn validate(&self) -> Result<(), DocfixError> {
        if !self.source.is_dir() {
            return Err(DocfixError::InputNotFound(self.source.clone()));
        }
        Ok(())
    }
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["docfix"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_default_input_dir() {
        let config = RunConfig::from_cli(&parse(&["--in-place"])).unwrap();
        assert_eq!(config.input, PathBuf::from(DEFAULT_INPUT_DIR));
        assert!(config.is_in_place());
    }

    #[test]
    fn test_output_dir_required() {
        let err = RunConfig::from_cli(&parse(&["docs"])).unwrap_err();
        assert!(matches!(err, DocfixError::InvalidArguments(_)));
    }

    #[test]
    fn test_output_dir_conflicts_with_in_place() {
        let err = RunConfig::from_cli(&parse(&["docs", "out", "--in-place"])).unwrap_err();
        assert!(err.to_string().contains("--in-place"));
    }

    #[test]
    fn test_dry_run_without_output_dir() {
        let config = RunConfig::from_cli(&parse(&["docs", "--dry-run"])).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.output_root(), Path::new("docs"));
    }

    #[test]
    fn test_pdf_task_defaults_to_output_dir() {
        let task = Task::from_cli(&parse(&["--pdf", "--pdf-dir", "pdfs"])).unwrap();
        assert_eq!(
            task,
            Task::Pdf(PdfConfig {
                source: PathBuf::from(DEFAULT_OUTPUT_DIR),
                pdf_dir: PathBuf::from("pdfs"),
            })
        );
    }

    #[test]
    fn test_pdf_rejects_dry_run() {
        assert!(Task::from_cli(&parse(&["--pdf", "--dry-run"])).is_err());
    }

    #[test]
    fn test_validate_missing_input() {
        let temp = TempDir::new().unwrap();
        let config = RunConfig {
            input: temp.path().join("missing"),
            mode: OutputMode::InPlace,
            dry_run: false,
        };
        assert!(matches!(
            config.validate(),
            Err(DocfixError::InputNotFound(_))
        ));
    }

    #[test]
    fn test_validate_rejects_output_equal_to_input() {
        let temp = TempDir::new().unwrap();
        let config = RunConfig {
            input: temp.path().to_path_buf(),
            mode: OutputMode::Directory(temp.path().join(".")),
            dry_run: false,
        };
        assert!(matches!(
            config.validate(),
            Err(DocfixError::InvalidArguments(_))
        ));
    }
}
