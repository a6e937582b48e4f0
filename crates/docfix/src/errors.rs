//! Error types.
//!
//! [`DocfixError`] covers the failures the library reports as values.
//! [`ActionableError`] wraps a message with possible causes and remediation
//! steps for the CLI.

use crate::output::ExitCode;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that end a run.
#[derive(Debug, Error)]
pub enum DocfixError {
    #[error("input directory not found: {0}")]
    InputNotFound(PathBuf),

    #[error("input path is not a directory: {0}")]
    InputNotDirectory(PathBuf),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("required tool '{0}' is not installed")]
    ToolMissing(&'static str),

    #[error("{tool} failed for {target}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        target: String,
        stderr: String,
    },
}

impl DocfixError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            DocfixError::InputNotFound(_) => ExitCode::NotFound,
            DocfixError::InputNotDirectory(_) | DocfixError::InvalidArguments(_) => {
                ExitCode::InvalidArgument
            }
            DocfixError::ToolMissing(_) | DocfixError::ToolFailed { .. } => ExitCode::ExternalError,
        }
    }

    /// Causes and remedies shown to the user.
    pub fn to_actionable(&self) -> ActionableError {
        let base = ActionableError::new(self.to_string());
        match self {
            DocfixError::InputNotFound(path) => base
                .with_cause("The export has not been copied into place yet")
                .with_remedy(format!("Create the directory: mkdir -p {}", path.display()))
                .with_remedy("Pass the export location explicitly: docfix <INPUT_DIR> <OUTPUT_DIR>"),
            DocfixError::InputNotDirectory(_) => {
                base.with_remedy("Point INPUT_DIR at the directory that holds the exported pages")
            }
            DocfixError::InvalidArguments(_) => base.with_remedy("Run 'docfix --help' for usage"),
            DocfixError::ToolMissing(tool) => tool_missing(tool, base),
            DocfixError::ToolFailed { tool, .. } => base
                .with_cause("The generated Markdown may use syntax the tool rejects")
                .with_remedy(format!("Re-run with DOCFIX_LOG=debug to see the {} invocation", tool)),
        }
    }
}

fn tool_missing(tool: &str, base: ActionableError) -> ActionableError {
    match tool {
        "pandoc" => base
            .with_cause("pandoc and a LaTeX engine are needed for PDF output")
            .with_remedy("Ubuntu/Debian: apt install pandoc texlive-xetex")
            .with_remedy("macOS: brew install pandoc && brew install --cask mactex"),
        "mmdc" => base
            .with_cause("Mermaid diagrams are rendered with the mermaid-cli")
            .with_remedy("npm install -g @mermaid-js/mermaid-cli"),
        _ => base.with_remedy(format!("Install '{}' and make sure it is on PATH", tool)),
    }
}

/// An error with diagnostic context and remediation steps.
///
/// # Example
///
/// ```
/// use docfix::errors::ActionableError;
///
/// let error = ActionableError::new("pandoc failed")
///     .with_cause("xelatex is not installed")
///     .with_remedy("apt install texlive-xetex");
///
/// assert!(error.to_string().contains("To fix:"));
/// ```
#[derive(Debug, Clone)]
pub struct ActionableError {
    error: String,
    causes: Vec<String>,
    remediation: Vec<String>,
}

impl ActionableError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            causes: Vec::new(),
            remediation: Vec::new(),
        }
    }

    /// Add a possible cause (diagnostic hint).
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a remediation step (actionable fix).
    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remediation.push(remedy.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.error
    }

    pub fn remedies(&self) -> &[String] {
        &self.remediation
    }

    /// Convert to a formatted error message suitable for display.
    pub fn to_error_message(&self) -> String {
        let mut msg = format!("Error: {}\n", self.error);

        if !self.causes.is_empty() {
            msg.push_str("\nPossible causes:\n");
            for cause in &self.causes {
                msg.push_str(&format!("  • {}\n", cause));
            }
        }

        if !self.remediation.is_empty() {
            msg.push_str("\nTo fix:\n");
            for remedy in &self.remediation {
                msg.push_str(&format!("  • {}\n", remedy));
            }
        }

        msg
    }
}

impl fmt::Display for ActionableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error_message())
    }
}

impl std::error::Error for ActionableError {}
