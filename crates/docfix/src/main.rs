//! docfix: normalize exported wiki Markdown.

use anyhow::Result;
use clap::Parser;
use docfix::cli::Cli;
use docfix::config::{PdfConfig, RunConfig, Task};
use docfix::output::{ExitCode, JsonError, JsonOutput, OutputContext};
use docfix::pdf::{self, DiagramRenderer, MermaidCli};
use docfix::pipeline::{self, RunReport};
use docfix::DocfixError;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the tracing filter
const LOG_ENV: &str = "DOCFIX_LOG";

/// Map an error to an exit code, looking through anyhow context.
fn error_to_exit_code(error: &anyhow::Error) -> ExitCode {
    if let Some(docfix_error) = error.downcast_ref::<DocfixError>() {
        return docfix_error.exit_code();
    }

    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::NotFound => ExitCode::NotFound,
                std::io::ErrorKind::PermissionDenied => ExitCode::PermissionDenied,
                _ => ExitCode::GenericError,
            };
        }
    }

    ExitCode::GenericError
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let output_ctx = OutputContext::new(cli.quiet, cli.json);

    let exit_code = match run(&cli, &output_ctx) {
        Ok(code) => code,
        Err(e) => {
            let code = error_to_exit_code(&e);
            report_error(&e, code, &output_ctx);
            code
        }
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn report_error(error: &anyhow::Error, code: ExitCode, output_ctx: &OutputContext) {
    let actionable = error.downcast_ref::<DocfixError>().map(DocfixError::to_actionable);

    if output_ctx.is_json() {
        let message = actionable
            .as_ref()
            .map(|a| a.message().to_string())
            .unwrap_or_else(|| format!("{:#}", error));
        let suggestions = actionable.map(|a| a.remedies().to_vec()).unwrap_or_default();
        let json = JsonError::new(code, message, "docfix").with_suggestions(suggestions);
        if let Ok(text) = json.to_json_string() {
            println!("{}", text);
        }
        return;
    }

    match actionable {
        Some(actionable) => eprint!("{}", actionable),
        None => eprintln!("Error: {:#}", error),
    }
}

fn run(cli: &Cli, output_ctx: &OutputContext) -> Result<ExitCode> {
    match Task::from_cli(cli)? {
        Task::Clean(config) => clean(&config, output_ctx),
        Task::Pdf(config) => convert_pdf(&config, output_ctx),
    }
}

fn clean(config: &RunConfig, output_ctx: &OutputContext) -> Result<ExitCode> {
    config.validate()?;
    let report = pipeline::run(config)?;

    if output_ctx.is_json() {
        let command = if config.dry_run { "dry-run" } else { "run" };
        println!("{}", JsonOutput::success(&report, command).to_json_string()?);
    } else {
        print_report(&report, output_ctx)?;
    }

    Ok(if report.has_conflicts() {
        ExitCode::NumberingConflict
    } else {
        ExitCode::Success
    })
}

fn print_report(report: &RunReport, output_ctx: &OutputContext) -> Result<()> {
    for conflict in &report.conflicts {
        output_ctx.print_warning(format!("numbering skipped: {}", conflict))?;
    }

    if report.dry_run {
        for file in report.modified() {
            output_ctx.print_data(report.output.join(&file.output).display())?;
        }
        return Ok(());
    }

    let modified = report.modified().count();
    output_ctx.print_info(format!(
        "Processed {} Markdown file(s), {} modified, {} other file(s) {}",
        report.files.len(),
        modified,
        report.assets,
        if report.in_place { "left in place" } else { "copied" },
    ))?;
    output_ctx.print_info(format!("Output: {}", report.output.display()))?;
    Ok(())
}

fn convert_pdf(config: &PdfConfig, output_ctx: &OutputContext) -> Result<ExitCode> {
    config.validate()?;

    let mmdc = MermaidCli::detect();
    if mmdc.is_none() {
        output_ctx.print_warning(
            "mermaid-cli (mmdc) not found; diagrams stay as code blocks. Install with: npm install -g @mermaid-js/mermaid-cli",
        )?;
    }
    let renderer = mmdc.as_ref().map(|m| m as &dyn DiagramRenderer);

    output_ctx.print_info(format!("Converting projects in {} to PDF...", config.source.display()))?;
    let report = pdf::convert_all(&config.source, &config.pdf_dir, renderer)?;

    if output_ctx.is_json() {
        println!("{}", JsonOutput::success(&report, "pdf").to_json_string()?);
    } else {
        for pdf in &report.generated {
            output_ctx.print_info(format!("  Created: {}", pdf.display()))?;
        }
        for failure in &report.failed {
            output_ctx.print_error(format!("{}: {}", failure.project, failure.error))?;
        }
        output_ctx.print_info(format!("Generated {} PDF file(s)", report.generated.len()))?;
    }

    Ok(if report.failed.is_empty() {
        ExitCode::Success
    } else {
        ExitCode::ExternalError
    })
}
