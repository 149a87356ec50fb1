#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use bt_frame::{FrameError, Record, RespondentTable};
use bt_report::{
    BannerColumn, BannerPlan, ColumnStats, Question, QuestionTable, QuestionType, Report,
    ReportConfig,
};
use bt_stats::{StatsRecord, compare_labels};
use bt_types::Cell;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("csv input has no headers")]
    MissingHeaders,
    #[error("json respondent data must be an array of objects")]
    NotRecordArray,
    #[error("record {row} field {column:?} is not a scalar")]
    NonScalarCell { row: usize, column: String },
    #[error("banner sheet contains no `(X) equation` rows")]
    NoBannerColumns,
    #[error("required column {0:?} not found")]
    MissingColumn(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

// ── Respondent data ─────────────────────────────────────────────────────

pub fn read_csv_str(input: &str) -> Result<RespondentTable, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input.as_bytes());

    let headers = reader.headers().cloned().map_err(IoError::from)?;

    if headers.is_empty() {
        return Err(IoError::MissingHeaders);
    }

    let rows = reader
        .records()
        .map(|row| row.map(|record| record.iter().map(parse_cell).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()?;

    let names = headers.iter().map(|name| name.trim().to_owned()).collect();
    Ok(RespondentTable::from_rows(names, rows)?)
}

pub fn read_csv_path(path: impl AsRef<Path>) -> Result<RespondentTable, IoError> {
    let input = std::fs::read_to_string(path)?;
    read_csv_str(&input)
}

/// Respondents as a JSON array of flat objects.
///
/// The schema is the union of every object's keys.
pub fn read_json_records(input: &str) -> Result<RespondentTable, IoError> {
    let Value::Array(items) = serde_json::from_str::<Value>(input)? else {
        return Err(IoError::NotRecordArray);
    };

    let records = items
        .into_iter()
        .enumerate()
        .map(|(row, item)| {
            let Value::Object(fields) = item else {
                return Err(IoError::NotRecordArray);
            };
            fields
                .into_iter()
                .map(|(column, value)| match json_cell(value) {
                    Some(cell) => Ok((column, cell)),
                    None => Err(IoError::NonScalarCell { row, column }),
                })
                .collect::<Result<Record, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RespondentTable::from_records(records))
}

fn parse_cell(field: &str) -> Cell {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return Cell::Null;
    }

    if let Ok(value) = trimmed.parse::<i64>() {
        return Cell::Int64(value);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return Cell::Float64(value);
    }

    Cell::Utf8(trimmed.to_owned())
}

fn json_cell(value: Value) -> Option<Cell> {
    match value {
        Value::Null => Some(Cell::Null),
        Value::Bool(v) => Some(Cell::Bool(v)),
        Value::Number(n) => n
            .as_i64()
            .map(Cell::Int64)
            .or_else(|| n.as_f64().map(Cell::Float64)),
        Value::String(v) => Some(Cell::Utf8(v)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

// ── Banner plans, questions, config ─────────────────────────────────────

pub fn read_banner_plan_json(input: &str) -> Result<BannerPlan, IoError> {
    Ok(serde_json::from_str(input)?)
}

pub fn read_questions_json(input: &str) -> Result<Vec<Question>, IoError> {
    Ok(serde_json::from_str(input)?)
}

pub fn read_config_json(input: &str) -> Result<ReportConfig, IoError> {
    Ok(serde_json::from_str(input)?)
}

static BANNER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(([A-Z]{1,2})\)$").expect("static banner id regex"));
static BANNER_EQUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(([A-Z]{1,2})\)\s*(\S.*)$").expect("static banner equation regex")
});
// A description follows the first comma not continuing a numeric list.
static DESCRIPTION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*[^\d\s.\-]").expect("static separator regex"));
// Open-ended codes such as `Q1 = 10+`.
static OPEN_ENDED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_]+)\s*=\s*(\d+(?:\.\d+)?)\+").expect("static open-ended regex")
});

pub const IMPORTED_GROUP_NAME: &str = "All Columns";

/// Import a banner plan from a banner spreadsheet exported as CSV.
///
/// Column names come from the cell directly above each `(X)` id cell.
/// Every first-column cell shaped `(X) equation[, description]` becomes a
/// column `col_X`. An open-ended code `VAR = N+` is read as `VAR>=N`.
/// All columns land in a single group.
pub fn read_banner_csv(input: &str) -> Result<BannerPlan, IoError> {
    let rows = read_grid(input)?;

    let mut names = HashMap::<String, String>::new();
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, cell) in row.iter().enumerate() {
            let Some(captures) = BANNER_ID.captures(cell) else {
                continue;
            };
            let above = row_idx
                .checked_sub(1)
                .and_then(|prev| rows[prev].get(col_idx))
                .filter(|name| !name.is_empty());
            if let Some(name) = above {
                names
                    .entry(captures[1].to_owned())
                    .or_insert_with(|| name.clone());
            }
        }
    }

    let columns = rows
        .iter()
        .filter_map(|row| row.first())
        .filter_map(|cell| BANNER_EQUATION.captures(cell))
        .map(|captures| {
            let letter = &captures[1];
            let text = &captures[2];
            let equation = DESCRIPTION_SEPARATOR
                .find(text)
                .map_or(text, |separator| &text[..separator.start()])
                .trim();
            let equation = OPEN_ENDED.replace_all(equation, "${1}>=${2}");
            let name = names
                .get(letter)
                .cloned()
                .unwrap_or_else(|| format!("Column {letter}"));
            BannerColumn::new(format!("col_{letter}"), name, equation)
        })
        .collect::<Vec<_>>();

    if columns.is_empty() {
        return Err(IoError::NoBannerColumns);
    }

    let mut plan = BannerPlan::single_group("Imported Banner Plan", IMPORTED_GROUP_NAME, columns);
    plan.description = Some("Parsed from CSV".to_owned());
    Ok(plan)
}

const TAB_ID_COLUMN: &str = "Q#";
const TAB_TEXT_COLUMN: &str = "Base Verbiage";
const TAB_NETS_COLUMN: &str = "Nets (English & code #s)";
const TAB_INSTRUCTIONS_COLUMN: &str = "Additional Table Instructions";
const SECTION_HEADERS: [&str; 2] = ["Screener", "Main Survey"];
const SUMMARY_MARKERS: [&str; 6] = ["summary", "_tb", "_t2b", "_b2b", "_bb", "_mean"];

/// Import question definitions from a tab sheet exported as CSV.
///
/// Rows above the `Q#` header row are preamble. Section headers and
/// summary-table rows are skipped.
pub fn read_tab_sheet_csv(input: &str) -> Result<Vec<Question>, IoError> {
    let rows = read_grid(input)?;
    let header_idx = rows
        .iter()
        .position(|row| row.iter().any(|cell| cell == TAB_ID_COLUMN))
        .ok_or_else(|| IoError::MissingColumn(TAB_ID_COLUMN.to_owned()))?;
    let header = &rows[header_idx];
    let position = |name: &str| header.iter().position(|cell| cell == name);
    let id_col = position(TAB_ID_COLUMN)
        .ok_or_else(|| IoError::MissingColumn(TAB_ID_COLUMN.to_owned()))?;
    let text_col = position(TAB_TEXT_COLUMN);
    let nets_col = position(TAB_NETS_COLUMN);
    let instructions_col = position(TAB_INSTRUCTIONS_COLUMN);

    let mut seen = BTreeSet::new();
    let mut questions = Vec::new();
    for row in &rows[header_idx + 1..] {
        let id = cell_at(row, Some(id_col));
        if id.is_empty() || is_section_header(&id) || is_summary_row(&id) {
            continue;
        }
        if !seen.insert(id.clone()) {
            continue;
        }

        let nets = cell_at(row, nets_col).to_lowercase();
        let instructions = cell_at(row, instructions_col).to_lowercase();
        let text = cell_at(row, text_col);
        let question = Question::new(id.as_str(), infer_question_type(&nets, &instructions));
        questions.push(if text.is_empty() {
            question.with_text(format!("Question {id}"))
        } else {
            question.with_text(text)
        });
    }
    Ok(questions)
}

fn cell_at(row: &[String], col: Option<usize>) -> String {
    col.and_then(|idx| row.get(idx)).cloned().unwrap_or_default()
}

fn is_section_header(id: &str) -> bool {
    SECTION_HEADERS
        .iter()
        .any(|header| id.eq_ignore_ascii_case(header))
}

fn is_summary_row(id: &str) -> bool {
    let lower = id.to_lowercase();
    SUMMARY_MARKERS.iter().any(|marker| lower.contains(marker))
}

fn infer_question_type(nets: &str, instructions: &str) -> QuestionType {
    let mentions = |needle: &str| nets.contains(needle) || instructions.contains(needle);
    if mentions("t2b") || mentions("b2b") {
        QuestionType::Likert
    } else if instructions.contains("mean") || instructions.contains("median") {
        QuestionType::Numeric
    } else {
        QuestionType::Categorical
    }
}

/// Headerless, ragged CSV as trimmed strings.
fn read_grid(input: &str) -> Result<Vec<Vec<String>>, IoError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input.as_bytes());
    reader
        .records()
        .map(|row| {
            row.map(|record: StringRecord| {
                record
                    .iter()
                    .map(|field| field.trim().to_owned())
                    .collect::<Vec<_>>()
            })
            .map_err(IoError::from)
        })
        .collect()
}

// ── Report export ───────────────────────────────────────────────────────

pub fn write_report_json(report: &Report) -> Result<String, IoError> {
    Ok(serde_json::to_string_pretty(report)?)
}

const NULL_MARKER: &str = "-";

/// Flatten a report into one CSV block per question.
///
/// Rows are ragged: banner header lines hold one field, table rows hold a
/// label followed by one field per banner column.
pub fn write_report_csv(report: &Report) -> Result<String, IoError> {
    let mut writer = WriterBuilder::new().flexible(true).from_writer(Vec::new());

    writer.write_record(["Cross-Tabulation Report"])?;
    writer.write_record([format!("Banner: {}", report.metadata.banner_name)])?;
    writer.write_record([format!("Total Base: {}", report.metadata.total_base)])?;

    for table in &report.tables {
        writer.write_record([format!("{}: {}", table.question_id, table.question_text)])?;
        writer.write_record([format!("Type: {}", table.question_type)])?;
        if !table.present {
            writer.write_record(["Note: question not found in respondent data"])?;
        }
        for (label, values) in table_rows(table) {
            writer.write_record(std::iter::once(label).chain(values))?;
        }
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn table_rows(table: &QuestionTable) -> Vec<(String, Vec<String>)> {
    let columns = table.data.values().collect::<Vec<_>>();
    let row = |label: &str, value: &dyn Fn(&ColumnStats) -> String| {
        (
            label.to_owned(),
            columns.iter().map(|column| value(*column)).collect::<Vec<_>>(),
        )
    };

    let mut rows = vec![
        row("Group", &|column| column.group.clone().unwrap_or_default()),
        row("Column", &|column| column.name.clone()),
        row("Equation", &|column| column.equation.clone()),
        row("Base", &|column| column.stats.base().to_string()),
    ];

    match table.question_type {
        QuestionType::Numeric => {
            let numeric = |pick: fn(&bt_stats::NumericStats) -> Option<f64>| {
                move |column: &ColumnStats| match &column.stats {
                    StatsRecord::Numeric(stats) => format_optional(pick(stats), 2),
                    _ => NULL_MARKER.to_owned(),
                }
            };
            rows.push(row("Mean", &numeric(|stats| stats.mean)));
            rows.push(row("Median", &numeric(|stats| stats.median)));
            rows.push(row("Std Dev", &numeric(|stats| stats.std)));
        }
        QuestionType::Likert => {
            let likert = |pick: fn(&bt_stats::LikertStats) -> Option<f64>| {
                move |column: &ColumnStats| match &column.stats {
                    StatsRecord::Likert(stats) => format_optional(pick(stats), 1),
                    _ => NULL_MARKER.to_owned(),
                }
            };
            rows.push(row("Top Box %", &likert(|stats| stats.top_box)));
            rows.push(row("Bottom Box %", &likert(|stats| stats.bottom_box)));

            let tested = columns.iter().any(|column| {
                matches!(&column.stats, StatsRecord::Likert(stats) if !stats.significant_over.is_empty())
            });
            if tested {
                rows.push(row("Letter", &|column| column.letter.clone().unwrap_or_default()));
                rows.push(row("Significant Over", &|column| match &column.stats {
                    StatsRecord::Likert(stats) => stats.significant_over.join(" "),
                    _ => String::new(),
                }));
            }
        }
        QuestionType::Categorical => {
            let mut codes = columns
                .iter()
                .filter_map(|column| match &column.stats {
                    StatsRecord::Categorical(stats) => Some(stats.percentages.keys()),
                    _ => None,
                })
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            codes.sort_by(|a, b| compare_labels(a, b));

            for code in codes {
                // A code absent from a column's base reads as 0%.
                rows.push(row(&format!("Code {code} %"), &|column| match &column.stats {
                    StatsRecord::Categorical(stats) => {
                        let share = stats.percentages.get(&code).copied().unwrap_or(0.0);
                        format_optional(Some(share), 1)
                    }
                    _ => NULL_MARKER.to_owned(),
                }));
            }
        }
    }
    rows
}

fn format_optional(value: Option<f64>, places: usize) -> String {
    value.map_or_else(|| NULL_MARKER.to_owned(), |v| format!("{v:.places$}"))
}

#[cfg(test)]
mod tests {
    use bt_types::Cell;

    use super::{IoError, parse_cell, read_banner_csv, read_csv_str, read_json_records};

    #[test]
    fn csv_cells_infer_int_float_and_string() {
        assert_eq!(parse_cell(" 7 "), Cell::Int64(7));
        assert_eq!(parse_cell("2.5"), Cell::Float64(2.5));
        assert_eq!(parse_cell("Male"), Cell::Utf8("Male".to_owned()));
        assert_eq!(parse_cell(""), Cell::Null);
        assert_eq!(parse_cell("true"), Cell::Utf8("true".to_owned()));
    }

    #[test]
    fn csv_reads_rows_in_order_with_nulls() {
        let table = read_csv_str("S1,S7,Q1\n1,2,5\n2,,x\n").expect("read");
        assert_eq!(table.len(), 2);
        assert!(table.has_column("S7"));
        let s7 = table.column_values("S7").cloned().collect::<Vec<_>>();
        assert_eq!(s7, vec![Cell::Int64(2), Cell::Null]);
        let q1 = table.record(1).and_then(|r| r.get("Q1")).cloned();
        assert_eq!(q1, Some(Cell::Utf8("x".to_owned())));
    }

    #[test]
    fn csv_rejects_ragged_rows() {
        let err = read_csv_str("a,b\n1\n").expect_err("must fail");
        assert!(matches!(err, IoError::Csv(_)));
    }

    #[test]
    fn csv_rejects_duplicate_headers() {
        let err = read_csv_str("a,a\n1,2\n").expect_err("must fail");
        assert!(matches!(err, IoError::Frame(_)));
    }

    #[test]
    fn json_records_take_union_schema() {
        let table =
            read_json_records(r#"[{"S1":1,"Q1":2.5},{"S1":"x","Q9":null,"B":true}]"#).expect("read");
        assert_eq!(table.len(), 2);
        assert_eq!(table.columns().len(), 4);
        assert_eq!(
            table.record(0).and_then(|r| r.get("Q1")),
            Some(&Cell::Float64(2.5))
        );
        assert_eq!(table.record(1).and_then(|r| r.get("B")), Some(&Cell::Bool(true)));
    }

    #[test]
    fn json_records_reject_nested_values() {
        let err = read_json_records(r#"[{"S1":1},{"S1":[1,2]}]"#).expect_err("must fail");
        assert!(matches!(
            err,
            IoError::NonScalarCell { row: 1, ref column } if column == "S1"
        ));
        assert!(matches!(
            read_json_records(r#"{"S1":1}"#),
            Err(IoError::NotRecordArray)
        ));
    }

    #[test]
    fn banner_description_split_keeps_numeric_lists() {
        let plan = read_banner_csv("\"(A) S7=1,2,3, Current users\"\n\"(B) S7=4, 5\"\n").expect("plan");
        let equations = plan.columns().map(|c| c.equation.as_str()).collect::<Vec<_>>();
        assert_eq!(equations, vec!["S7=1,2,3", "S7=4, 5"]);
        let names = plan.columns().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Column A", "Column B"]);
    }

    #[test]
    fn banner_without_equations_is_an_error() {
        let err = read_banner_csv("BANNERS\nTotal,Male\n").expect_err("must fail");
        assert!(matches!(err, IoError::NoBannerColumns));
    }
}
