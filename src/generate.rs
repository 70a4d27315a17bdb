// Signature generation.
//
// Walks a basis source block by block through a `WindowMapper`, so the
// basis may be a pipe or socket, and writes one weak/strong record per
// block. The final block may be short.

use std::io::{self, Write};

use thiserror::Error;

use crate::checksum::{StrongSum, WeakSum};
use crate::map::{ByteSource, MapError, MapStats, WindowMapper};
use crate::signature::encoder::SigWriter;
use crate::signature::index::{MAX_STRONG_SUM_LEN, ParamsError, SigMagic, SignatureParams};

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Map(#[from] MapError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid signature parameters: {0}")]
    Params(#[from] ParamsError),
    #[error("strong sum length {len} exceeds the {max}-byte digest")]
    DigestTooShort { len: usize, max: usize },
}

/// Signature layout to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerateOptions {
    pub magic: u32,
    pub block_len: u32,
    pub strong_len: usize,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            magic: SigMagic::Adler32Sha256.into(),
            block_len: 2048,
            strong_len: 32,
        }
    }
}

/// Statistics returned by signature generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateStats {
    pub blocks: u64,
    /// Basis bytes covered by the signature.
    pub basis_bytes: u64,
    pub sig_bytes: u64,
    pub map: MapStats,
}

/// Computes signatures with a given pair of checksum functions.
pub struct SigGenerator<H, G> {
    opts: GenerateOptions,
    weak: H,
    strong: G,
}

impl<H: WeakSum, G: StrongSum> SigGenerator<H, G> {
    pub fn new(opts: GenerateOptions, weak: H, strong: G) -> Result<Self, GenerateError> {
        SignatureParams::new(opts.magic, opts.block_len, opts.strong_len)?;
        let max = strong.max_len().min(MAX_STRONG_SUM_LEN);
        if opts.strong_len > max {
            return Err(GenerateError::DigestTooShort {
                len: opts.strong_len,
                max,
            });
        }
        Ok(Self { opts, weak, strong })
    }

    /// Read `basis` to the end and write its signature to `out`.
    pub fn generate<S: ByteSource, W: Write>(
        &self,
        basis: &mut WindowMapper<S>,
        out: W,
    ) -> Result<(W, GenerateStats), GenerateError> {
        let params = SignatureParams::new(self.opts.magic, self.opts.block_len, self.opts.strong_len)?;
        let block_len = params.block_len() as usize;
        let n = params.strong_len();
        let mut writer = SigWriter::new(out, params)?;
        let mut digest = [0u8; MAX_STRONG_SUM_LEN];
        let mut offset = 0u64;

        loop {
            let block = basis.map(offset, block_len)?;
            if block.is_empty() {
                break;
            }
            let weak = self.weak.weak_sum(&block);
            self.strong.strong_sum(&block, &mut digest[..n]);
            writer.write_block(weak, &digest[..n])?;
            offset += block.len() as u64;
            if block.eof {
                break;
            }
        }

        let stats = GenerateStats {
            blocks: writer.blocks(),
            basis_bytes: offset,
            sig_bytes: writer.bytes_out(),
            map: basis.stats(),
        };
        log::debug!(
            "generated signature: {} blocks over {} bytes",
            stats.blocks,
            stats.basis_bytes
        );
        Ok((writer.finish()?, stats))
    }
}

/// Generate an Adler-32/SHA-256 signature of a forward-only reader.
#[cfg(feature = "sha256")]
pub fn generate_signature<R: io::Read, W: Write>(
    basis: R,
    out: W,
    opts: GenerateOptions,
) -> Result<(W, GenerateStats), GenerateError> {
    let generator = SigGenerator::new(opts, crate::checksum::Adler32, crate::checksum::Sha256Sum)?;
    let mut mapper = WindowMapper::new(crate::map::Forward(basis));
    generator.generate(&mut mapper, out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::{Adler32, adler32};
    use crate::map::Forward;
    use crate::signature::decoder::decode_signature;

    /// Strong sum that repeats the block length, for predictable output.
    struct LenSum;

    impl StrongSum for LenSum {
        fn max_len(&self) -> usize {
            4
        }

        fn strong_sum(&self, block: &[u8], out: &mut [u8]) {
            let len = (block.len() as u32).to_be_bytes();
            out.copy_from_slice(&len[..out.len()]);
        }
    }

    fn opts(block_len: u32, strong_len: usize) -> GenerateOptions {
        GenerateOptions {
            magic: 0x1234_5678,
            block_len,
            strong_len,
        }
    }

    #[test]
    fn blocks_cover_basis_with_short_tail() {
        let basis: Vec<u8> = (0..2500u32).map(|i| (i * 7) as u8).collect();
        let generator = SigGenerator::new(opts(1000, 4), Adler32, LenSum).unwrap();
        let mut mapper = WindowMapper::new(Forward(&basis[..]));
        let (out, stats) = generator.generate(&mut mapper, Vec::new()).unwrap();

        assert_eq!(stats.blocks, 3);
        assert_eq!(stats.basis_bytes, 2500);
        assert_eq!(stats.sig_bytes, out.len() as u64);

        let sig = decode_signature(&out).unwrap();
        assert_eq!(sig.block_len(), 1000);
        let blocks: Vec<_> = sig.iter().map(|b| (b.weak, b.strong.to_vec())).collect();
        assert_eq!(
            blocks,
            vec![
                (adler32(&basis[..1000]), 1000u32.to_be_bytes().to_vec()),
                (adler32(&basis[1000..2000]), 1000u32.to_be_bytes().to_vec()),
                (adler32(&basis[2000..]), 500u32.to_be_bytes().to_vec()),
            ]
        );
    }

    #[test]
    fn exact_multiple_has_no_empty_tail() {
        let basis = vec![1u8; 3000];
        let generator = SigGenerator::new(opts(1000, 0), Adler32, LenSum).unwrap();
        let mut mapper = WindowMapper::new(Forward(&basis[..]));
        let (_, stats) = generator.generate(&mut mapper, Vec::new()).unwrap();
        assert_eq!(stats.blocks, 3);
    }

    #[test]
    fn empty_basis_is_header_only() {
        let generator = SigGenerator::new(opts(64, 2), Adler32, LenSum).unwrap();
        let mut mapper = WindowMapper::new(Forward(&b""[..]));
        let (out, stats) = generator.generate(&mut mapper, Vec::new()).unwrap();
        assert_eq!(stats.blocks, 0);
        assert_eq!(out.len(), 12);
    }

    #[test]
    fn strong_len_beyond_digest_is_rejected() {
        assert!(matches!(
            SigGenerator::new(opts(64, 8), Adler32, LenSum),
            Err(GenerateError::DigestTooShort { len: 8, max: 4 })
        ));
    }

    #[test]
    fn invalid_params_are_rejected() {
        assert!(matches!(
            SigGenerator::new(opts(0, 2), Adler32, LenSum),
            Err(GenerateError::Params(ParamsError::BlockLen))
        ));
    }

    #[cfg(feature = "sha256")]
    #[test]
    fn default_generator_roundtrips() {
        let basis = vec![0xAB; 10_000];
        let (out, stats) =
            generate_signature(&basis[..], Vec::new(), GenerateOptions::default()).unwrap();
        assert_eq!(stats.blocks, 5);
        let sig = decode_signature(&out).unwrap();
        assert_eq!(sig.magic(), u32::from(SigMagic::Adler32Sha256));
        // First four blocks are identical.
        assert_eq!(sig.lookup(adler32(&basis[..2048])).count(), 4);
    }
}
