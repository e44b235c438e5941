#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static KEY: Lazy<custody_envelope::DerivedKey> = Lazy::new(|| {
    custody_envelope::derive_hex("deadbeef").expect("static secret")
});

fuzz_target!(|data: &[u8]| {
    let _ = custody_envelope::wire::decode(data);
    let _ = custody_envelope::inspect(data);
    let _ = custody_envelope::open(data, &KEY);
});
