#![forbid(unsafe_code)]

//! Banner-equation cross-tabulation for survey data.
//!
//! A banner plan names sub-populations with small filter equations
//! (`S1=1 & S7=2`, `Q1 BETWEEN 18 AND 34`, `S7=1,2,3`). Each column is
//! filtered once over the respondent table and every question is
//! aggregated over every column by its type.
//!
//! ```
//! use bannertab::{
//!     BannerColumn, BannerPlan, Question, QuestionType, Record, RespondentTable, StatsRecord,
//!     build_report,
//! };
//!
//! let table = RespondentTable::from_records(vec![
//!     Record::new().with("S1", 1_i64).with("Q2", 1_i64),
//!     Record::new().with("S1", 2_i64).with("Q2", 5_i64),
//! ]);
//! let plan = BannerPlan::single_group(
//!     "Gender",
//!     "All Columns",
//!     vec![BannerColumn::new("col_A", "Male", "S1=1")],
//! );
//! let report = build_report(&table, &[Question::new("Q2", QuestionType::Likert)], &plan)?;
//!
//! let StatsRecord::Likert(male) = &report.tables[0].data["col_A"].stats else {
//!     unreachable!()
//! };
//! assert_eq!(male.top_box, Some(100.0));
//! # Ok::<(), bannertab::ReportError>(())
//! ```

pub use bt_expr::{
    ColumnLookup, ColumnResolver, CompareOp, CompiledPredicate, ExprError, Leaf, Predicate,
    Resolution, ValueSpec, evaluate, evaluate_str, filter_positions, filter_positions_with_ledger,
    filter_table, filter_table_with_ledger, is_total_equation, normalize, parse, parse_strict,
    resolve, validate_equation,
};
pub use bt_frame::{FrameError, Record, RespondentTable};
pub use bt_io::{
    IoError, read_banner_csv, read_banner_plan_json, read_config_json, read_csv_path,
    read_csv_str, read_json_records, read_questions_json, read_tab_sheet_csv, write_report_csv,
    write_report_json,
};
pub use bt_report::{
    BannerColumn, BannerGroup, BannerPlan, ColumnStats, Question, QuestionTable, QuestionType,
    Report, ReportConfig, ReportError, ReportMetadata, build_report, build_report_with_config,
    build_report_with_ledger, column_letter,
};
pub use bt_runtime::{Diagnostic, DiagnosticLedger, IssueKind, Severity};
pub use bt_stats::{
    Aggregation, CategoricalStats, LikertCodes, LikertStats, NumericStats, StatsRecord, ZTest,
    aggregate, categorical_stats, likert_stats, numeric_stats, two_proportion_z_test,
};
pub use bt_types::{Cell, CellKind, TypeError, try_numeric};
