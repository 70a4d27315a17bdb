// Block checksums used when generating signatures.
//
// The signature format does not care how its sums were computed; these
// traits are the seam where a caller plugs in the digest family that
// matches the format tag it writes. Two implementations ship with the
// crate:
//   - Adler-32 for the weak sum (SIMD via simd-adler32 when the `adler32`
//     feature is on, scalar otherwise)
//   - SHA-256 truncated to the requested length for the strong sum
//     (feature `sha256`)

/// Fast checksum over one block.
pub trait WeakSum {
    fn weak_sum(&self, block: &[u8]) -> u32;
}

/// Collision-resistant digest over one block.
pub trait StrongSum {
    /// Largest digest this implementation can produce.
    fn max_len(&self) -> usize;

    /// Write the first `out.len()` digest bytes of `block` into `out`.
    ///
    /// `out.len()` never exceeds `max_len()`.
    fn strong_sum(&self, block: &[u8], out: &mut [u8]);
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

/// Adler-32 weak checksum.
#[derive(Debug, Clone, Copy, Default)]
pub struct Adler32;

impl WeakSum for Adler32 {
    fn weak_sum(&self, block: &[u8]) -> u32 {
        adler32(block)
    }
}

pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// SHA-256
// ---------------------------------------------------------------------------

/// SHA-256 strong checksum, truncated to the signature's strong length.
#[cfg(feature = "sha256")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Sum;

#[cfg(feature = "sha256")]
impl StrongSum for Sha256Sum {
    fn max_len(&self) -> usize {
        32
    }

    fn strong_sum(&self, block: &[u8], out: &mut [u8]) {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(block);
        out.copy_from_slice(&digest[..out.len()]);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
