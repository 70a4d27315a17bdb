#![no_main]
use libfuzzer_sys::fuzz_target;
use oxisync::signature::decode_signature;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode or fail with an error, never panic.
    if let Ok(sig) = decode_signature(data) {
        let record = 4 + sig.strong_len();
        assert_eq!(12 + sig.len() * record, data.len());
        for b in sig.iter() {
            assert!(sig.lookup(b.weak).any(|c| c.index == b.index));
        }
    }
});
