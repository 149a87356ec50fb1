use std::io::Write;

use anyhow::{Context, Result, bail};
use bt_expr::{ColumnLookup, filter_positions_with_ledger, validate_equation};
use bt_report::build_report_with_ledger;
use bt_runtime::{Diagnostic, DiagnosticLedger, Severity};
use tracing::{debug, info, warn};

use crate::args::{CheckArgs, FilterArgs, OutputFormat, ReportArgs};
use crate::load::{load_banner, load_config, load_questions, load_respondents};

fn log_diagnostic(diagnostic: &Diagnostic) {
    match diagnostic.severity() {
        Severity::Warning => warn!("{diagnostic}"),
        Severity::Info => info!("{diagnostic}"),
    }
}

pub fn run_report(args: &ReportArgs, out: &mut impl Write) -> Result<()> {
    let table = load_respondents(&args.data)?;
    let plan = load_banner(&args.banner)?;
    let questions = load_questions(&args.questions)?;
    let mut config = load_config(args.config.as_deref())?;
    if let Some(level) = args.significance {
        config.significance_level = Some(level);
    }
    debug!(
        respondents = table.len(),
        columns = plan.num_columns(),
        questions = questions.len(),
        "inputs loaded"
    );

    let mut ledger = DiagnosticLedger::new();
    let report = build_report_with_ledger(&table, &questions, &plan, &config, &mut ledger)
        .context("Cannot build report")?;
    for diagnostic in ledger.records() {
        log_diagnostic(diagnostic);
    }

    let rendered = match args.format {
        OutputFormat::Json => bt_io::write_report_json(&report),
        OutputFormat::Csv => bt_io::write_report_csv(&report),
    }
    .context("Cannot render report")?;

    match &args.out {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Cannot write report to {}", path.display()))?,
        None => out.write_all(rendered.as_bytes()).context("Cannot write report")?,
    }
    Ok(())
}

pub fn run_filter(args: &FilterArgs, out: &mut impl Write) -> Result<()> {
    let table = load_respondents(&args.data)?;
    let mut ledger = DiagnosticLedger::new();
    let positions = filter_positions_with_ledger(&table, &args.equation, &mut ledger);
    for diagnostic in ledger.records() {
        log_diagnostic(diagnostic);
    }

    let listed = positions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(out, "base: {} of {}", positions.len(), table.len())?;
    writeln!(out, "positions: {listed}")?;
    Ok(())
}

/// Every variable resolves, so only syntax problems surface.
struct AnyColumn;

impl ColumnLookup for AnyColumn {
    fn has_column(&self, _name: &str) -> bool {
        true
    }
}

pub fn run_check(args: &CheckArgs, out: &mut impl Write) -> Result<()> {
    let plan = load_banner(&args.banner)?;
    let table = args.data.as_deref().map(load_respondents).transpose()?;

    let mut warnings = 0_usize;
    for column in plan.columns() {
        let diagnostics = match &table {
            Some(table) => validate_equation(&column.equation, table),
            None => validate_equation(&column.equation, &AnyColumn),
        };
        for diagnostic in diagnostics {
            if diagnostic.severity() == Severity::Warning {
                warnings += 1;
            }
            writeln!(out, "{} ({}): {diagnostic}", column.id, column.name)?;
        }
    }
    writeln!(
        out,
        "checked {} banner column(s), {warnings} warning(s)",
        plan.num_columns()
    )?;

    if args.deny_warnings && warnings > 0 {
        bail!("banner check found {warnings} warning(s)");
    }
    Ok(())
}
