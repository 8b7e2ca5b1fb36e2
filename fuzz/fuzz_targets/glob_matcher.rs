#![no_main]
use libfuzzer_sys::fuzz_target;
use vmck_serialize::{FieldSpec, NameSetMatcher};

// Arbitrary pattern text must never panic the glob compiler or matcher.
fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(m) = NameSetMatcher::new(&[s.to_string()]) {
            let _ = m.matches(s);
            let _ = m.matches("runtime.Thread");
        }
        if let Ok(fs) = FieldSpec::parse(s) {
            let _ = fs.matches("Point", "x");
        }
    }
});
