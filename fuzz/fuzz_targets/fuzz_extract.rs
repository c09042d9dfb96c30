#![no_main]

use covdelta_adapters_coverage::{ExtractOptions, extract, parse_coverage_map};
use covdelta_types::{SnapshotRole, UnitKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Neither parsing nor extraction may panic, whatever the input
        if let Ok(map) = parse_coverage_map(text) {
            for unit in [
                UnitKind::Statements,
                UnitKind::Branches,
                UnitKind::Functions,
                UnitKind::Lines,
            ] {
                let mut options = ExtractOptions::new("fuzz", SnapshotRole::Current, unit);
                options.strip_prefixes = vec!["/home/runner/work/app".to_string()];
                if let Ok(snapshot) = extract(&map, &options) {
                    for entry in snapshot.entries() {
                        assert!((0.0..=100.0).contains(&entry.metric));
                    }
                }
            }
        }
    }
});
