#![no_main]
use libfuzzer_sys::fuzz_target;
use oxisync::signature::{SigDecoder, Step, decode_signature};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the chunk size; the rest is the signature stream.
    let chunk = usize::from(data[0]).max(1);
    let payload = &data[1..];

    let mut dec = SigDecoder::new();
    let mut chunked = Ok(Step::NeedMoreInput);
    for part in payload.chunks(chunk) {
        if dec.push(part).is_err() {
            break;
        }
        chunked = dec.run();
        if chunked.is_err() {
            break;
        }
    }
    if chunked.is_ok() {
        dec.finish_input();
        chunked = dec.run();
    }

    // Chunking never changes the outcome.
    let whole = decode_signature(payload);
    match (chunked, whole) {
        (Ok(Step::Done), Ok(sig)) => assert_eq!(dec.into_signature().unwrap(), sig),
        (Err(a), Err(b)) => assert_eq!(a.is_malformed(), b.is_malformed()),
        (a, b) => panic!("chunked {a:?} vs whole {:?}", b.map(|s| s.len())),
    }
});
