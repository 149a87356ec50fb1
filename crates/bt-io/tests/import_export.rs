use std::io::Write;

use bt_frame::{Record, RespondentTable};
use bt_io::{
    IMPORTED_GROUP_NAME, read_banner_csv, read_banner_plan_json, read_config_json, read_csv_path,
    read_questions_json, read_tab_sheet_csv, write_report_csv, write_report_json,
};
use bt_report::{
    BannerColumn, BannerPlan, Question, QuestionType, Report, ReportConfig, build_report,
    build_report_with_config,
};
use bt_types::Cell;

const BANNER_SHEET: &str = "\
BANNERS,,,,
,Gender,,Brand,Wear time
,Male,Female,Current ACUVUE,10+ hours
,(A),(B),(C),(D)
,,,,
\"(A) S1=1, Male respondents\",,,,
(B) S1=2,,,,
\"(C) S7=2 & Q1>=10, Heavy users\",,,,
\"(D) Q1 = 10+, Long wear\",,,,
";

const TAB_SHEET: &str = "\
Project Falcon,,,,
,,,,
Q#,Base Verbiage,Base Definition,Nets (English & code #s),Additional Table Instructions
Screener,,,,
S1,Gender,All respondents,,
Q1,How many pairs per year,All,,Show mean and median
Q2,Satisfaction,All,T2B (1-2); B2B (4-5),
Q2_T2B Summary,,,,
Q3,,All,,
";

fn small_report() -> Report {
    let table = RespondentTable::from_records(vec![
        Record::new().with("S1", 1_i64).with("Q1", 5_i64),
        Record::new().with("S1", 2_i64).with("Q1", 7_i64),
    ]);
    let plan = BannerPlan::single_group(
        "Demo",
        "All Columns",
        vec![BannerColumn::new("col_A", "Male", "S1=1")],
    );
    let questions = vec![
        Question::new("Q1", QuestionType::Numeric),
        Question::new("S1", QuestionType::Categorical).with_text("Gender"),
        Question::new("Q2", QuestionType::Likert).with_text("Satisfaction"),
    ];
    build_report(&table, &questions, &plan).expect("report")
}

#[test]
fn respondent_csv_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(file, "S1,S7,Q1\n1,2,5\n1,10,\n2,2,4.5\n").expect("write");

    let table = read_csv_path(file.path()).expect("read");
    assert_eq!(table.len(), 3);
    assert_eq!(
        table.column_values("Q1").cloned().collect::<Vec<_>>(),
        vec![Cell::Int64(5), Cell::Null, Cell::Float64(4.5)]
    );
}

#[test]
fn missing_respondent_file_is_an_io_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = read_csv_path(dir.path().join("absent.csv")).expect_err("must fail");
    assert!(matches!(err, bt_io::IoError::Io(_)));
}

#[test]
fn banner_sheet_import_names_and_equations() {
    let plan = read_banner_csv(BANNER_SHEET).expect("plan");
    assert_eq!(plan.name.as_deref(), Some("Imported Banner Plan"));
    assert_eq!(plan.groups.len(), 1);
    assert_eq!(plan.groups[0].name, IMPORTED_GROUP_NAME);

    let columns = plan.columns().cloned().collect::<Vec<_>>();
    assert_eq!(
        columns,
        vec![
            BannerColumn::new("col_A", "Male", "S1=1"),
            BannerColumn::new("col_B", "Female", "S1=2"),
            BannerColumn::new("col_C", "Current ACUVUE", "S7=2 & Q1>=10"),
            BannerColumn::new("col_D", "10+ hours", "Q1>=10"),
        ]
    );
}

#[test]
fn tab_sheet_import_infers_types_and_skips_non_questions() {
    let questions = read_tab_sheet_csv(TAB_SHEET).expect("questions");
    let summary = questions
        .iter()
        .map(|q| (q.id.as_str(), q.question_type, q.display_text()))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            ("S1", QuestionType::Categorical, "Gender"),
            ("Q1", QuestionType::Numeric, "How many pairs per year"),
            ("Q2", QuestionType::Likert, "Satisfaction"),
            ("Q3", QuestionType::Categorical, "Question Q3"),
        ]
    );
}

#[test]
fn tab_sheet_without_id_header_is_rejected() {
    let err = read_tab_sheet_csv("a,b\n1,2\n").expect_err("must fail");
    assert!(matches!(err, bt_io::IoError::MissingColumn(ref name) if name == "Q#"));
}

#[test]
fn json_plan_questions_and_config_parse_with_defaults() {
    let plan = read_banner_plan_json(
        r#"{"groups":[{"name":"Gender","columns":[{"id":"col_A","name":"Male","equation":"S1=1"}]}]}"#,
    )
    .expect("plan");
    assert_eq!(plan.name, None);
    assert_eq!(plan.num_columns(), 1);

    let questions =
        read_questions_json(r#"[{"id":"Q1","type":"numeric"},{"id":"S1","text":"Gender"}]"#)
            .expect("questions");
    assert_eq!(questions[0].question_type, QuestionType::Numeric);
    assert_eq!(questions[1].question_type, QuestionType::Categorical);

    let config = read_config_json(r#"{"significance_level":0.1}"#).expect("config");
    assert_eq!(config.significance_level, Some(0.1));
    assert_eq!(config.total_column_id, "TOTAL");
    assert_eq!(config.likert_codes.top, vec![1, 2]);
}

#[test]
fn csv_export_lays_out_one_block_per_question() {
    let out = write_report_csv(&small_report()).expect("csv");
    let lines = out.lines().collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "Cross-Tabulation Report",
            "Banner: Demo",
            "Total Base: 2",
            "Q1: Q1",
            "Type: numeric",
            "Group,,All Columns",
            "Column,Total,Male",
            "Equation,TOTAL,S1=1",
            "Base,2,1",
            "Mean,6.00,5.00",
            "Median,6.00,5.00",
            "Std Dev,1.41,-",
            "S1: Gender",
            "Type: categorical",
            "Group,,All Columns",
            "Column,Total,Male",
            "Equation,TOTAL,S1=1",
            "Base,2,1",
            "Code 1 %,50.0,100.0",
            "Code 2 %,50.0,0.0",
            "Q2: Satisfaction",
            "Type: likert",
            "Note: question not found in respondent data",
            "Group,,All Columns",
            "Column,Total,Male",
            "Equation,TOTAL,S1=1",
            "Base,0,0",
            "Top Box %,-,-",
            "Bottom Box %,-,-",
        ]
    );
}

#[test]
fn csv_export_lists_letters_with_significance() {
    let records = (0..40)
        .map(|i| {
            let (gender, answer) = match i {
                0..18 => (1_i64, 1_i64),
                18..20 => (1, 4),
                20..24 => (2, 2),
                _ => (2, 5),
            };
            Record::new().with("S1", gender).with("Q2", answer)
        })
        .collect::<Vec<_>>();
    let plan = BannerPlan::single_group(
        "Gender",
        "Gender",
        vec![
            BannerColumn::new("col_A", "Male", "S1=1"),
            BannerColumn::new("col_B", "Female", "S1=2"),
        ],
    );
    let config = ReportConfig {
        significance_level: Some(0.05),
        ..ReportConfig::default()
    };
    let report = build_report_with_config(
        &RespondentTable::from_records(records),
        &[Question::new("Q2", QuestionType::Likert)],
        &plan,
        &config,
    )
    .expect("report");

    let out = write_report_csv(&report).expect("csv");
    let lines = out.lines().skip(5).collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "Group,,Gender,Gender",
            "Column,Total,Male,Female",
            "Equation,TOTAL,S1=1,S1=2",
            "Base,40,20,20",
            "Top Box %,55.0,90.0,20.0",
            "Bottom Box %,45.0,10.0,80.0",
            "Letter,,A,B",
            "Significant Over,,B,",
        ]
    );
}

#[test]
fn json_export_is_the_serialized_report() {
    let report = small_report();
    let out = write_report_json(&report).expect("json");
    let back: Report = serde_json::from_str(&out).expect("parse");
    assert_eq!(back.metadata, report.metadata);
    assert!(out.contains("\"banner_name\": \"Demo\""));
}
