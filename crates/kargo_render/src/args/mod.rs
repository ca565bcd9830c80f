mod generate_completions;
mod render;

use anyhow::bail;
use clap::{
    ValueEnum,
    builder::{Styles, styling::AnsiColor},
};
use tracing::level_filters::LevelFilter;

pub use generate_completions::GenerateCompletions;
pub use render::Render;

const MAIN_COLOR: AnsiColor = AnsiColor::Blue;
const SECONDARY_COLOR: AnsiColor = AnsiColor::Cyan;
const HELP_STYLES: Styles = Styles::styled()
    .header(MAIN_COLOR.on_default().bold())
    .usage(MAIN_COLOR.on_default().bold())
    .placeholder(SECONDARY_COLOR.on_default())
    .literal(SECONDARY_COLOR.on_default());

/// Kargo Render renders environment-specific manifests from a source
/// revision of a GitOps repository into environment branches of the same
/// repository.
#[derive(clap::Parser, Debug)]
#[command(version, author, styles = HELP_STYLES)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
    /// Print source location and additional information in logs.
    ///
    /// If this option is unspecified, logs are printed at the INFO level
    /// without verbosity.
    /// `-v` adds verbosity to logs.
    /// `-vv` adds verbosity and sets the log level to DEBUG.
    /// `-vvv` adds verbosity and sets the log level to TRACE.
    /// To change the log level without setting verbosity, use the
    /// `KARGO_RENDER_LOG` environment variable. E.g. `KARGO_RENDER_LOG=DEBUG`.
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
    )]
    verbose: u8,
}

impl CliArgs {
    pub fn verbosity(&self) -> anyhow::Result<Option<LevelFilter>> {
        let level = match self.verbose {
            0 => None,
            1 => Some(LevelFilter::INFO),
            2 => Some(LevelFilter::DEBUG),
            3 => Some(LevelFilter::TRACE),
            _ => bail!("invalid verbosity level. Use -v, -vv, or -vvv."),
        };
        Ok(level)
    }
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Render manifests from a source revision into an environment branch.
    ///
    /// Runs the configured templating tool for every app of the target
    /// branch, applies image substitutions, and publishes the result: a
    /// direct push, a pull request, a local directory, or standard output.
    Render(Render),
    /// Generate command autocompletions for various shells.
    GenerateCompletions(GenerateCompletions),
    /// Write the JSON schema of the kargo-render.{json,yaml} configuration
    /// to .schema/kargo-render.json
    GenerateSchema,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputType {
    Json,
}
