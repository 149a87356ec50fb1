#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(table) = bt_io::read_csv_str(input) {
        for name in table.columns() {
            assert_eq!(table.column_values(name).count(), table.len());
        }
    }
    let _ = bt_io::read_json_records(input);
});
