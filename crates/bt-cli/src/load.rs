use std::path::Path;

use anyhow::{Context, Result};
use bt_frame::RespondentTable;
use bt_report::{BannerPlan, Question, ReportConfig};

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read file: {}", path.display()))
}

/// `.json` is a record array; anything else is read as CSV.
pub fn load_respondents(path: &Path) -> Result<RespondentTable> {
    let input = read_text(path)?;
    let table = if has_extension(path, "json") {
        bt_io::read_json_records(&input)
    } else {
        bt_io::read_csv_str(&input)
    };
    table.with_context(|| format!("Invalid respondent data in {}", path.display()))
}

/// `.csv` is a banner sheet; anything else is a JSON plan.
pub fn load_banner(path: &Path) -> Result<BannerPlan> {
    let input = read_text(path)?;
    let plan = if has_extension(path, "csv") {
        bt_io::read_banner_csv(&input)
    } else {
        bt_io::read_banner_plan_json(&input)
    };
    plan.with_context(|| format!("Invalid banner plan in {}", path.display()))
}

/// `.csv` is a tab sheet; anything else is a JSON question list.
pub fn load_questions(path: &Path) -> Result<Vec<Question>> {
    let input = read_text(path)?;
    let questions = if has_extension(path, "csv") {
        bt_io::read_tab_sheet_csv(&input)
    } else {
        bt_io::read_questions_json(&input)
    };
    questions.with_context(|| format!("Invalid question definitions in {}", path.display()))
}

pub fn load_config(path: Option<&Path>) -> Result<ReportConfig> {
    let Some(path) = path else {
        return Ok(ReportConfig::default());
    };
    let input = read_text(path)?;
    bt_io::read_config_json(&input)
        .with_context(|| format!("Invalid report config in {}", path.display()))
}
