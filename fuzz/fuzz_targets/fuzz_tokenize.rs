#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let tokens = gmdex::utils::tokenize(text);
        assert!(!tokens.is_empty());
        // Tokens never carry separators or stripped characters
        for token in &tokens {
            assert!(!token.contains(' '));
            assert!(!token.contains(['(', ')', '[', ']', '\'', ',', '_', '-']));
        }
    }
});
