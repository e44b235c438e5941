#![no_main]

use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static TRUSTED: Lazy<custody_envelope::Did> = Lazy::new(|| custody_envelope::Keypair::generate().did());

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(token) = custody_envelope::Token::decode(text) {
        let _ = token.encode();
        let _ = custody_envelope::verify(&token, std::slice::from_ref(&*TRUSTED), 0);
    }
});
