use bt_expr::{evaluate, filter_table, parse};
use bt_frame::{Record, RespondentTable};
use bt_types::Cell;
use proptest::prelude::*;

fn cell_strategy() -> impl Strategy<Value = Cell> {
    prop_oneof![
        Just(Cell::Null),
        Just(Cell::Float64(f64::NAN)),
        (-20_i64..20).prop_map(Cell::Int64),
        (-20.0_f64..20.0).prop_map(Cell::Float64),
        "[A-Za-z0-9 ]{0,6}".prop_map(Cell::Utf8),
    ]
}

fn record_strategy() -> impl Strategy<Value = Record> {
    (cell_strategy(), cell_strategy()).prop_map(|(q1, s7)| {
        Record::new().with("Q1", q1).with("S7", s7)
    })
}

fn equation_strategy() -> impl Strategy<Value = String> {
    let ops = prop_oneof![
        Just("="),
        Just("!="),
        Just(">"),
        Just("<"),
        Just(">="),
        Just("<=")
    ];
    let values = prop_oneof![
        (-20_i64..20).prop_map(|v| v.to_string()),
        (0_i64..10, 10_i64..20).prop_map(|(a, b)| format!("{a}-{b}")),
        (0_i64..5, 5_i64..10).prop_map(|(a, b)| format!("{a},{b}")),
        "[A-Za-z]{1,4}",
    ];
    let leaf = (prop_oneof![Just("Q1"), Just("S7"), Just("Z9")], ops, values)
        .prop_map(|(var, op, value)| format!("{var}{op}{value}"));
    proptest::collection::vec(leaf, 1..4).prop_flat_map(|leaves| {
        let joins = proptest::collection::vec(
            prop_oneof![Just(" & "), Just(" | "), Just(" AND "), Just(" OR ")],
            leaves.len().saturating_sub(1),
        );
        (Just(leaves), joins).prop_map(|(leaves, joins)| {
            let mut out = leaves[0].clone();
            for (join, leaf) in joins.iter().zip(&leaves[1..]) {
                out.push_str(join);
                out.push_str(leaf);
            }
            out
        })
    })
}

proptest! {
    #[test]
    fn total_filter_is_identity(records in proptest::collection::vec(record_strategy(), 1..16)) {
        let table = RespondentTable::from_records(records);
        let out = filter_table(&table, "TOTAL");
        prop_assert!(out.semantic_eq(&table));
    }

    #[test]
    fn absent_or_missing_variables_never_match(
        equation in equation_strategy(),
        missing in prop_oneof![Just(Cell::Null), Just(Cell::Float64(f64::NAN))],
    ) {
        let predicate = parse(&equation);
        let with_missing = Record::new().with("Q1", missing.clone()).with("S7", missing);
        // Every leaf reads a missing cell or an absent column, so no branch can hold.
        prop_assert!(!evaluate(&predicate, &with_missing));
        prop_assert!(!evaluate(&predicate, &Record::new()));
    }

    #[test]
    fn between_matches_its_expansion(
        record in record_strategy(),
        low in -10_i64..10,
        span in 0_i64..10,
    ) {
        let high = low + span;
        let between = parse(&format!("Q1 BETWEEN {low} AND {high}"));
        let expanded = parse(&format!("Q1>={low} & Q1<={high}"));
        prop_assert_eq!(evaluate(&between, &record), evaluate(&expanded, &record));
    }

    #[test]
    fn filter_result_is_an_ordered_subsequence(
        records in proptest::collection::vec(record_strategy(), 0..16),
        equation in equation_strategy(),
    ) {
        let table = RespondentTable::from_records(records);
        let out = filter_table(&table, &equation);
        let predicate = parse(&equation);
        let expected = table
            .records()
            .iter()
            .filter(|record| evaluate(&predicate, record))
            .count();
        prop_assert!(out.len() <= table.len());
        prop_assert_eq!(out.columns(), table.columns());
        prop_assert_eq!(out.len(), expected);
    }
}
