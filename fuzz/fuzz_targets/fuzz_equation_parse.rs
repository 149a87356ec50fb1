#![no_main]

use bt_expr::{evaluate, filter_positions, parse};
use bt_frame::{Record, RespondentTable};
use bt_types::Cell;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(equation) = std::str::from_utf8(data) else {
        return;
    };

    let predicate = parse(equation);
    // Display output must parse again without panicking.
    let _ = parse(&predicate.to_string());

    let table = RespondentTable::from_records(vec![
        Record::new().with("S1", 1_i64).with("S7", 2_i64),
        Record::new().with("S1", "x").with("S7r2", 1_i64),
        Record::new().with("S1", Cell::Float64(f64::NAN)),
    ]);
    let positions = filter_positions(&table, equation);
    assert!(positions.len() <= table.len());
    assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));

    // Missing everywhere: nothing but TOTAL may match.
    if !bt_expr::is_total_equation(equation) {
        assert!(!evaluate(&predicate, &Record::new()));
    }
});
