#![no_main]
use libfuzzer_sys::fuzz_target;
use oxisync::generate::{GenerateOptions, generate_signature};
use oxisync::signature::decode_signature;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // Control bytes pick the block and strong lengths.
    let block_len = u32::from(data[0]) + 1;
    let strong_len = usize::from(data[1] % 33);
    let basis = &data[2..];

    let opts = GenerateOptions {
        block_len,
        strong_len,
        ..Default::default()
    };
    let (sig, stats) = generate_signature(basis, Vec::new(), opts).unwrap();
    let index = decode_signature(&sig).unwrap();

    let expected = basis.len().div_ceil(block_len as usize);
    assert_eq!(index.len(), expected);
    assert_eq!(stats.blocks, expected as u64);
    assert_eq!(index.block_len(), block_len);
    assert_eq!(index.strong_len(), strong_len);
});
