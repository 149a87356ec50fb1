use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

/// bannertab: banner cross-tabulation for survey data
#[derive(Debug, Parser)]
#[command(
    name = "bannertab",
    about = "Cross-tabulate survey respondents against a banner plan",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a cross-tab report for every question over every banner column
    Report(ReportArgs),
    /// Show which respondents one banner equation selects
    Filter(FilterArgs),
    /// Lint a banner plan for malformed or unresolvable equations
    Check(CheckArgs),
}

#[derive(Debug, ClapArgs)]
pub struct ReportArgs {
    /// Respondent data (.csv or .json array of objects)
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Banner plan (.json, or a banner sheet exported as .csv)
    #[arg(long, value_name = "FILE")]
    pub banner: PathBuf,

    /// Question definitions (.json, or a tab sheet exported as .csv)
    #[arg(long, value_name = "FILE")]
    pub questions: PathBuf,

    /// Report configuration (.json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured significance level (e.g. 0.05)
    #[arg(long, value_name = "ALPHA")]
    pub significance: Option<f64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Write the report here instead of stdout
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Debug, ClapArgs)]
pub struct FilterArgs {
    /// Respondent data (.csv or .json array of objects)
    #[arg(long, value_name = "FILE")]
    pub data: PathBuf,

    /// Banner equation, e.g. "S1=1 & S7=2"
    #[arg(long)]
    pub equation: String,
}

#[derive(Debug, ClapArgs)]
pub struct CheckArgs {
    /// Banner plan (.json or banner sheet .csv)
    #[arg(long, value_name = "FILE")]
    pub banner: PathBuf,

    /// Respondent data to resolve variables against; without it only
    /// equation syntax is checked
    #[arg(long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    /// Exit non-zero when any warning is found
    #[arg(long)]
    pub deny_warnings: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}
