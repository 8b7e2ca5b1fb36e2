#![no_main]
use libfuzzer_sys::fuzz_target;
use std::collections::HashMap;
use vmck_serialize::SparseIntMap;

// Differential check of SparseIntMap against a plain HashMap model. The
// tiny initial capacity forces frequent wipe and growth passes.
fuzz_target!(|data: &[u8]| {
    let mut m = SparseIntMap::with_capacity_pow(3, 0);
    let mut model: HashMap<i32, i32> = HashMap::new();

    for chunk in data.chunks_exact(2) {
        let k = chunk[0] as i8 as i32;
        let v = chunk[1] as i8 as i32;
        if v == 77 {
            m.clear();
            model.clear();
        } else {
            m.set(k, v);
            model.insert(k, v);
        }
        assert_eq!(m.get(k), model.get(&k).copied().unwrap_or(0));
    }

    for k in -128..=127 {
        assert_eq!(m.get(k), model.get(&k).copied().unwrap_or(0));
    }
});
