#![no_main]

use std::collections::HashSet;

use cloudfixtures::types::{ResourceKind, STATELESS};
use cloudfixtures::LabeledResourceTable;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|labels: Vec<String>| {
    let table = LabeledResourceTable::new();
    let mut seen = HashSet::new();

    for label in labels.iter().take(64) {
        let reserved = table.reserve_label(ResourceKind::Image, label);

        // The requested label is always a prefix of what was reserved
        assert!(reserved.starts_with(label.as_str()));
        assert_ne!(reserved, STATELESS);

        // No label is ever handed out twice
        assert!(seen.insert(reserved));
    }

    // Reserved labels hold no record until filled
    assert!(table.is_empty());
});
