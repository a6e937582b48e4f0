//! Cleanup for Markdown exported from wiki generators.
//!
//! The per-document passes live in [`transform`]; [`pipeline`] runs them over
//! a directory tree together with README-ordered page numbering from
//! [`ordinal`]. [`pdf`] turns a cleaned tree into one PDF per project.

pub mod anchors;
pub mod cli;
pub mod config;
pub mod errors;
pub mod ordinal;
pub mod output;
pub mod pdf;
pub mod pipeline;
pub mod transform;

pub use errors::{ActionableError, DocfixError};
pub use output::{ExitCode, JsonOutput, OutputContext};
pub use pipeline::{RunReport, TransformPlan};
