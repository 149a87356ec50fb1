#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::fmt;

use bt_expr::filter_table_with_ledger;
use bt_frame::RespondentTable;
use bt_runtime::{DiagnosticLedger, IssueKind};
use bt_stats::{Aggregation, LikertCodes, StatsRecord, aggregate, two_proportion_z_test};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TOTAL_EQUATION: &str = "TOTAL";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReportError {
    #[error("banner column id {0:?} appears more than once")]
    DuplicateColumnId(String),
    #[error("significance level must lie strictly between 0 and 1, got {0}")]
    InvalidSignificanceLevel(f64),
}

// ── Banner plan ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerColumn {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub equation: String,
}

impl BannerColumn {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        equation: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            equation: equation.into(),
        }
    }
}

/// Presentation grouping only; groups never change a column's base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerGroup {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<BannerColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannerPlan {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub groups: Vec<BannerGroup>,
}

impl BannerPlan {
    /// A plan with every column in one group.
    pub fn single_group(
        name: impl Into<String>,
        group: impl Into<String>,
        columns: Vec<BannerColumn>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            description: None,
            groups: vec![BannerGroup {
                name: group.into(),
                columns,
            }],
        }
    }

    /// Columns in group order.
    pub fn columns(&self) -> impl Iterator<Item = &BannerColumn> {
        self.groups.iter().flat_map(|group| group.columns.iter())
    }

    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.groups.iter().map(|group| group.columns.len()).sum()
    }
}

// ── Questions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    #[default]
    Categorical,
    Numeric,
    Likert,
}

impl QuestionType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Categorical => "categorical",
            Self::Numeric => "numeric",
            Self::Likert => "likert",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub question_type: QuestionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_codes: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_codes: Option<Vec<i64>>,
}

impl Question {
    pub fn new(id: impl Into<String>, question_type: QuestionType) -> Self {
        Self {
            id: id.into(),
            text: None,
            question_type,
            top_codes: None,
            bottom_codes: None,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn with_codes(mut self, top: Vec<i64>, bottom: Vec<i64>) -> Self {
        self.top_codes = Some(top);
        self.bottom_codes = Some(bottom);
        self
    }

    /// Question wording, falling back to the id.
    #[must_use]
    pub fn display_text(&self) -> &str {
        self.text
            .as_deref()
            .filter(|text| !text.is_empty())
            .unwrap_or(self.id.as_str())
    }

    #[must_use]
    pub fn likert_codes(&self, defaults: &LikertCodes) -> LikertCodes {
        LikertCodes {
            top: self.top_codes.clone().unwrap_or_else(|| defaults.top.clone()),
            bottom: self
                .bottom_codes
                .clone()
                .unwrap_or_else(|| defaults.bottom.clone()),
        }
    }

    fn aggregation(&self, defaults: &LikertCodes) -> Aggregation {
        match self.question_type {
            QuestionType::Categorical => Aggregation::Categorical,
            QuestionType::Numeric => Aggregation::Numeric,
            QuestionType::Likert => Aggregation::Likert(self.likert_codes(defaults)),
        }
    }
}

// ── Configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub total_column_id: String,
    pub total_column_name: String,
    /// Used when the banner plan carries no name.
    pub default_banner_name: String,
    pub likert_codes: LikertCodes,
    /// Two-tailed alpha for pairwise top-box tests; `None` disables them.
    pub significance_level: Option<f64>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            total_column_id: "TOTAL".to_owned(),
            total_column_name: "Total".to_owned(),
            default_banner_name: "Unnamed Banner".to_owned(),
            likert_codes: LikertCodes::default(),
            significance_level: None,
        }
    }
}

// ── Report ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub name: String,
    pub equation: String,
    /// The banner group the column sits under; `None` for Total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Significance letter; `None` for Total.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub letter: Option<String>,
    #[serde(flatten)]
    pub stats: StatsRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionTable {
    pub question_id: String,
    pub question_text: String,
    pub question_type: QuestionType,
    /// False when the respondent table has no column for the question.
    pub present: bool,
    /// Banner column id to statistics, Total first.
    pub data: IndexMap<String, ColumnStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub banner_name: String,
    pub total_base: usize,
    pub num_questions: usize,
    pub num_columns: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance_level: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub tables: Vec<QuestionTable>,
}

impl Report {
    #[must_use]
    pub fn table(&self, question_id: &str) -> Option<&QuestionTable> {
        self.tables
            .iter()
            .find(|table| table.question_id == question_id)
    }

    /// Banner column ids in report order.
    pub fn column_ids(&self) -> impl Iterator<Item = &str> {
        self.tables
            .first()
            .into_iter()
            .flat_map(|table| table.data.keys().map(String::as_str))
    }
}

/// Spreadsheet-style letter for the `index`-th tested column: A..Z, AA, AB...
#[must_use]
pub fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

// ── Assembly ────────────────────────────────────────────────────────────

pub fn build_report(
    table: &RespondentTable,
    questions: &[Question],
    plan: &BannerPlan,
) -> Result<Report, ReportError> {
    build_report_with_config(table, questions, plan, &ReportConfig::default())
}

pub fn build_report_with_config(
    table: &RespondentTable,
    questions: &[Question],
    plan: &BannerPlan,
    config: &ReportConfig,
) -> Result<Report, ReportError> {
    build_report_with_ledger(table, questions, plan, config, &mut DiagnosticLedger::new())
}

/// Build the full cross-tab, recording every data-quality issue met along
/// the way in `ledger`.
///
/// Each banner column is filtered once and its base reused for every
/// question. Only an inconsistent plan or config is an error; malformed
/// equations, absent questions and empty bases degrade to zero-base
/// statistics.
pub fn build_report_with_ledger(
    table: &RespondentTable,
    questions: &[Question],
    plan: &BannerPlan,
    config: &ReportConfig,
    ledger: &mut DiagnosticLedger,
) -> Result<Report, ReportError> {
    if let Some(level) = config
        .significance_level
        .filter(|level| !(*level > 0.0 && *level < 1.0))
    {
        return Err(ReportError::InvalidSignificanceLevel(level));
    }
    let columns = report_columns(plan, config)?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        respondents = table.len(),
        columns = columns.len(),
        questions = questions.len(),
        "assembling cross-tab report"
    );

    let bases = columns
        .iter()
        .map(|column| {
            let base = filter_table_with_ledger(table, &column.banner.equation, ledger);
            if base.is_empty() {
                ledger.record(IssueKind::EmptyBase, &column.banner.id, &column.banner.equation);
            }
            base
        })
        .collect::<Vec<_>>();

    let tables = questions
        .iter()
        .map(|question| {
            let present = table.has_column(&question.id);
            if !present {
                #[cfg(feature = "tracing")]
                tracing::warn!(question = %question.id, "question has no column in the respondent table");
                ledger.record(
                    IssueKind::AbsentQuestion,
                    &question.id,
                    "no such column in the respondent table",
                );
            }

            let aggregation = question.aggregation(&config.likert_codes);
            let mut data = columns
                .iter()
                .zip(&bases)
                .map(|(column, base)| {
                    let stats = ColumnStats {
                        name: column.banner.name.clone(),
                        equation: column.banner.equation.clone(),
                        group: column.group.clone(),
                        letter: column.letter.clone(),
                        stats: aggregate(base, &question.id, &aggregation),
                    };
                    (column.banner.id.clone(), stats)
                })
                .collect::<IndexMap<_, _>>();

            if let (QuestionType::Likert, Some(alpha)) =
                (question.question_type, config.significance_level)
            {
                mark_significance(&mut data, alpha);
            }

            QuestionTable {
                question_id: question.id.clone(),
                question_text: question.display_text().to_owned(),
                question_type: question.question_type,
                present,
                data,
            }
        })
        .collect::<Vec<_>>();

    let banner_name = plan
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| config.default_banner_name.clone());

    Ok(Report {
        metadata: ReportMetadata {
            banner_name,
            total_base: table.len(),
            num_questions: tables.len(),
            num_columns: columns.len(),
            significance_level: config.significance_level,
        },
        tables,
    })
}

#[derive(Debug, Clone, PartialEq)]
struct ReportColumn {
    banner: BannerColumn,
    group: Option<String>,
    letter: Option<String>,
}

/// The implicit Total column followed by the plan's columns, each plan
/// column tagged with its group and letter.
fn report_columns(
    plan: &BannerPlan,
    config: &ReportConfig,
) -> Result<Vec<ReportColumn>, ReportError> {
    let mut seen = HashSet::new();
    let total = ReportColumn {
        banner: BannerColumn::new(
            config.total_column_id.clone(),
            config.total_column_name.clone(),
            TOTAL_EQUATION,
        ),
        group: None,
        letter: None,
    };
    let planned = plan
        .groups
        .iter()
        .flat_map(|group| group.columns.iter().map(move |column| (group, column)))
        .enumerate()
        .map(|(index, (group, column))| ReportColumn {
            banner: column.clone(),
            group: Some(group.name.clone()),
            letter: Some(column_letter(index)),
        });

    std::iter::once(total)
        .chain(planned)
        .map(|column| {
            if seen.insert(column.banner.id.clone()) {
                Ok(column)
            } else {
                Err(ReportError::DuplicateColumnId(column.banner.id))
            }
        })
        .collect()
}

/// Pairwise top-box tests between every lettered column. A column lists
/// the letters of the columns it beats at `alpha`.
fn mark_significance(data: &mut IndexMap<String, ColumnStats>, alpha: f64) {
    let tested = data
        .values_mut()
        .filter_map(|column| match (&column.letter, &mut column.stats) {
            (Some(letter), StatsRecord::Likert(stats)) => Some((letter.clone(), stats)),
            _ => None,
        })
        .collect::<Vec<_>>();
    let samples = tested
        .iter()
        .map(|(letter, stats)| (letter.clone(), stats.top_count, stats.base))
        .collect::<Vec<_>>();

    for (i, (_, stats)) in tested.into_iter().enumerate() {
        let (_, x1, n1) = &samples[i];
        stats.significant_over = samples
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .filter_map(|(_, (letter, x2, n2))| {
                let test = two_proportion_z_test(*x1, *n1, *x2, *n2)?;
                (test.z > 0.0 && test.p_value < alpha).then(|| letter.clone())
            })
            .collect();
    }
}
