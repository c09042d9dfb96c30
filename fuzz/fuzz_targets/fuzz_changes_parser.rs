#![no_main]

use covdelta_adapters_changes::{ChangeOptions, parse_changed_paths};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_changed_paths(text, &ChangeOptions::default());
    }
});
