#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary frames must either decode or be rejected, never panic
    if let Ok(message) = gmdex::server::protocol::decode_frame(data) {
        assert!(!message.session_id.contains('*'));
        assert!(!message.command.argv().is_empty());
    }
});
