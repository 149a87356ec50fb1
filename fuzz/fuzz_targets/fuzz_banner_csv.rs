#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(plan) = bt_io::read_banner_csv(input) {
        assert!(plan.columns().all(|column| column.id.starts_with("col_")));
    }
    let _ = bt_io::read_tab_sheet_csv(input);
});
