// Signature index: block checksums in block order plus a fast-checksum
// multimap for candidate lookup.
//
// Storage is columnar: weak sums in one Vec<u32>, strong sums flattened
// into one Vec<u8> with a fixed stride of `strong_len`. The multimap is
// maintained on every insertion so the index is usable for lookups as
// soon as decoding finishes, without a separate build pass.

use std::collections::{HashMap, TryReserveError};

use thiserror::Error;

/// Upper bound on the strong checksum length accepted in any signature.
pub const MAX_STRONG_SUM_LEN: usize = 32;

/// Size of the fixed signature header: magic, block length, strong length.
pub const SIG_HEADER_LEN: u64 = 12;

/// Largest record count a capacity hint may pre-allocate for.
const MAX_CAPACITY_HINT: usize = 1 << 22;

// ---------------------------------------------------------------------------
// Format tags
// ---------------------------------------------------------------------------

/// Signature format tags known to this crate.
///
/// The decoder treats the tag as opaque; a known tag only narrows the
/// strong checksum length it may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SigMagic {
    /// MD4 strong sums with the classic rolling weak sum.
    Md4 = 0x7273_0136,
    /// BLAKE2 strong sums with the classic rolling weak sum.
    Blake2 = 0x7273_0137,
    /// MD4 strong sums with a Rabin-Karp weak sum.
    RkMd4 = 0x7273_0146,
    /// BLAKE2 strong sums with a Rabin-Karp weak sum.
    RkBlake2 = 0x7273_0147,
    /// Adler-32 weak sums with truncated SHA-256 strong sums (this crate's generator).
    Adler32Sha256 = 0x6f78_7301,
}

impl SigMagic {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0x7273_0136 => Some(Self::Md4),
            0x7273_0137 => Some(Self::Blake2),
            0x7273_0146 => Some(Self::RkMd4),
            0x7273_0147 => Some(Self::RkBlake2),
            0x6f78_7301 => Some(Self::Adler32Sha256),
            _ => None,
        }
    }

    /// Digest size of the strong checksum family.
    pub fn max_strong_len(self) -> usize {
        match self {
            Self::Md4 | Self::RkMd4 => 16,
            Self::Blake2 | Self::RkBlake2 | Self::Adler32Sha256 => 32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Md4 => "md4",
            Self::Blake2 => "blake2",
            Self::RkMd4 => "rabinkarp-md4",
            Self::RkBlake2 => "rabinkarp-blake2",
            Self::Adler32Sha256 => "adler32-sha256",
        }
    }
}

impl From<SigMagic> for u32 {
    fn from(m: SigMagic) -> u32 {
        m as u32
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Error building a signature index from header fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamsError {
    #[error("block length must be between 1 and 2^31-1")]
    BlockLen,
    #[error("strong sum length {len} exceeds {max} for this format")]
    StrongLen { len: usize, max: usize },
    #[error("cannot reserve room for {hint} blocks")]
    Capacity { hint: usize },
}

/// Error appending a block to a [`SignatureIndex`].
#[derive(Debug, Error)]
pub enum PushError {
    #[error("strong sum is {got} bytes, index expects {expected}")]
    StrongLen { expected: usize, got: usize },
    #[error("out of memory growing signature index: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

/// Header fields fixed for the life of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParams {
    magic: u32,
    block_len: u32,
    strong_len: usize,
}

impl SignatureParams {
    /// Validate a header triple.
    pub fn new(magic: u32, block_len: u32, strong_len: usize) -> Result<Self, ParamsError> {
        // The wire field is a signed 32-bit integer.
        if block_len == 0 || block_len > i32::MAX as u32 {
            return Err(ParamsError::BlockLen);
        }
        let max = SigMagic::from_u32(magic).map_or(MAX_STRONG_SUM_LEN, SigMagic::max_strong_len);
        if strong_len > max {
            return Err(ParamsError::StrongLen {
                len: strong_len,
                max,
            });
        }
        Ok(Self {
            magic,
            block_len,
            strong_len,
        })
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn known_magic(&self) -> Option<SigMagic> {
        SigMagic::from_u32(self.magic)
    }

    pub fn block_len(&self) -> u32 {
        self.block_len
    }

    pub fn strong_len(&self) -> usize {
        self.strong_len
    }

    /// Bytes per record on the wire.
    pub fn record_len(&self) -> usize {
        4 + self.strong_len
    }

    /// Advisory record count for a signature of `total_bytes` on the wire.
    ///
    /// Returns 0 when the size is unknown or no larger than the header.
    /// Clamped so an overstated size cannot force a huge allocation.
    pub fn capacity_hint(&self, total_bytes: Option<u64>) -> usize {
        let Some(total) = total_bytes else {
            return 0;
        };
        let Some(body) = total.checked_sub(SIG_HEADER_LEN) else {
            return 0;
        };
        let blocks = body / self.record_len() as u64;
        usize::try_from(blocks)
            .unwrap_or(usize::MAX)
            .min(MAX_CAPACITY_HINT)
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Borrowed view of one block's checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSig<'a> {
    /// Block number in the original data.
    pub index: usize,
    pub weak: u32,
    pub strong: &'a [u8],
}

impl BlockSig<'_> {
    /// Byte offset of this block in the original data.
    pub fn offset(&self, block_len: u32) -> u64 {
        self.index as u64 * u64::from(block_len)
    }
}

// ---------------------------------------------------------------------------
// SignatureIndex
// ---------------------------------------------------------------------------

/// Ordered block checksums with lookup by fast checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureIndex {
    params: SignatureParams,
    weak: Vec<u32>,
    /// Strong sums, `params.strong_len` bytes per block.
    strong: Vec<u8>,
    /// Fast checksum to block numbers, each list in block order.
    by_weak: HashMap<u32, Vec<usize>>,
}

impl SignatureIndex {
    pub fn new(params: SignatureParams) -> Self {
        Self {
            params,
            weak: Vec::new(),
            strong: Vec::new(),
            by_weak: HashMap::new(),
        }
    }

    /// Create an index pre-sized for `hint` blocks.
    pub fn with_capacity(params: SignatureParams, hint: usize) -> Result<Self, ParamsError> {
        let mut index = Self::new(params);
        if hint > 0 {
            index
                .reserve(hint)
                .map_err(|_| ParamsError::Capacity { hint })?;
        }
        Ok(index)
    }

    fn reserve(&mut self, blocks: usize) -> Result<(), TryReserveError> {
        self.weak.try_reserve(blocks)?;
        self.strong
            .try_reserve(blocks.saturating_mul(self.params.strong_len))?;
        self.by_weak.try_reserve(blocks)?;
        Ok(())
    }

    /// Append the next block and return its block number.
    ///
    /// `strong` must be exactly `strong_len()` bytes. On error the index
    /// is left unchanged.
    pub fn push(&mut self, weak: u32, strong: &[u8]) -> Result<usize, PushError> {
        if strong.len() != self.params.strong_len {
            return Err(PushError::StrongLen {
                expected: self.params.strong_len,
                got: strong.len(),
            });
        }
        let index = self.weak.len();
        self.weak.try_reserve(1)?;
        self.strong.try_reserve(strong.len())?;
        self.by_weak.try_reserve(1)?;
        match self.by_weak.get_mut(&weak) {
            Some(list) => {
                list.try_reserve(1)?;
                list.push(index);
            }
            None => {
                let mut list = Vec::new();
                list.try_reserve(1)?;
                list.push(index);
                self.by_weak.insert(weak, list);
            }
        }
        // Both reserved above; neither can fail now.
        self.weak.push(weak);
        self.strong.extend_from_slice(strong);
        Ok(index)
    }

    pub fn params(&self) -> &SignatureParams {
        &self.params
    }

    pub fn magic(&self) -> u32 {
        self.params.magic
    }

    pub fn block_len(&self) -> u32 {
        self.params.block_len
    }

    pub fn strong_len(&self) -> usize {
        self.params.strong_len
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.weak.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weak.is_empty()
    }

    /// Number of distinct fast checksums.
    pub fn distinct_weak(&self) -> usize {
        self.by_weak.len()
    }

    pub fn get(&self, index: usize) -> Option<BlockSig<'_>> {
        (index < self.len()).then(|| self.block(index))
    }

    /// Blocks in original data order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = BlockSig<'_>> + '_ {
        (0..self.len()).map(move |i| self.block(i))
    }

    /// Candidate blocks sharing `weak`, in block order. Possibly empty.
    pub fn lookup(&self, weak: u32) -> impl Iterator<Item = BlockSig<'_>> + '_ {
        self.by_weak
            .get(&weak)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&i| self.block(i))
    }

    /// First block whose fast and strong checksums both match.
    ///
    /// `strong` may be longer than the stored length; only the stored
    /// prefix is compared, as strong sums are truncated digests.
    pub fn find_match(&self, weak: u32, strong: &[u8]) -> Option<BlockSig<'_>> {
        let n = self.params.strong_len;
        if strong.len() < n {
            return None;
        }
        self.lookup(weak).find(|b| b.strong == &strong[..n])
    }

    fn block(&self, i: usize) -> BlockSig<'_> {
        let n = self.params.strong_len;
        BlockSig {
            index: i,
            weak: self.weak[i],
            strong: &self.strong[i * n..i * n + n],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(strong_len: usize) -> SignatureParams {
        SignatureParams::new(SigMagic::Blake2.into(), 1024, strong_len).unwrap()
    }

    #[test]
    fn params_reject_bad_block_len() {
        assert_eq!(
            SignatureParams::new(SigMagic::Blake2.into(), 0, 8),
            Err(ParamsError::BlockLen)
        );
        assert_eq!(
            SignatureParams::new(SigMagic::Blake2.into(), 1 << 31, 8),
            Err(ParamsError::BlockLen)
        );
    }

    #[test]
    fn known_magic_caps_strong_len() {
        assert_eq!(
            SignatureParams::new(SigMagic::Md4.into(), 2048, 17),
            Err(ParamsError::StrongLen { len: 17, max: 16 })
        );
        assert!(SignatureParams::new(SigMagic::Md4.into(), 2048, 16).is_ok());
        assert!(SignatureParams::new(SigMagic::Blake2.into(), 2048, 32).is_ok());
    }

    #[test]
    fn unknown_magic_uses_global_cap() {
        assert!(SignatureParams::new(0xDEAD_BEEF, 1, MAX_STRONG_SUM_LEN).is_ok());
        assert!(SignatureParams::new(0xDEAD_BEEF, 1, MAX_STRONG_SUM_LEN + 1).is_err());
    }

    #[test]
    fn capacity_hint_from_declared_size() {
        let p = params(8);
        assert_eq!(p.capacity_hint(None), 0);
        assert_eq!(p.capacity_hint(Some(0)), 0);
        assert_eq!(p.capacity_hint(Some(12)), 0);
        assert_eq!(p.capacity_hint(Some(12 + 36)), 3);
        // Zero strong length still divides by 4.
        assert_eq!(params(0).capacity_hint(Some(12 + 40)), 10);
        // Clamped.
        assert_eq!(p.capacity_hint(Some(u64::MAX)), MAX_CAPACITY_HINT);
    }

    #[test]
    fn push_and_iterate_in_block_order() {
        let mut index = SignatureIndex::with_capacity(params(2), 4).unwrap();
        index.push(10, &[1, 1]).unwrap();
        index.push(20, &[2, 2]).unwrap();
        index.push(10, &[3, 3]).unwrap();

        let blocks: Vec<_> = index.iter().map(|b| (b.index, b.weak, b.strong.to_vec())).collect();
        assert_eq!(
            blocks,
            vec![(0, 10, vec![1, 1]), (1, 20, vec![2, 2]), (2, 10, vec![3, 3])]
        );
        assert_eq!(index.len(), 3);
        assert_eq!(index.distinct_weak(), 2);
    }

    #[test]
    fn push_rejects_wrong_strong_len() {
        let mut index = SignatureIndex::new(params(2));
        index.push(1, &[0xAA, 0xBB]).unwrap();

        for bad in [&[0xAA, 0xBB, 0xCC][..], &[0xAA][..], &[][..]] {
            match index.push(7, bad) {
                Err(PushError::StrongLen { expected, got }) => {
                    assert_eq!(expected, 2);
                    assert_eq!(got, bad.len());
                }
                other => panic!("expected strong length error, got {other:?}"),
            }
        }
        // Failed pushes leave no trace.
        assert_eq!(index.len(), 1);
        assert_eq!(index.distinct_weak(), 1);
        assert_eq!(index.lookup(7).count(), 0);

        assert_eq!(index.push(2, &[0x11, 0x22]).unwrap(), 1);
        assert_eq!(index.get(1).unwrap().strong, &[0x11, 0x22]);
        assert_eq!(index.get(0).unwrap().strong, &[0xAA, 0xBB]);
    }

    #[test]
    fn lookup_returns_all_candidates() {
        let mut index = SignatureIndex::new(params(2));
        index.push(10, &[1, 1]).unwrap();
        index.push(20, &[2, 2]).unwrap();
        index.push(10, &[3, 3]).unwrap();

        let hits: Vec<_> = index.lookup(10).map(|b| b.index).collect();
        assert_eq!(hits, vec![0, 2]);
        assert_eq!(index.lookup(99).count(), 0);
    }

    #[test]
    fn find_match_verifies_strong_prefix() {
        let mut index = SignatureIndex::new(params(2));
        index.push(10, &[1, 1]).unwrap();
        index.push(10, &[3, 3]).unwrap();

        assert_eq!(index.find_match(10, &[3, 3, 0xFF]).map(|b| b.index), Some(1));
        assert!(index.find_match(10, &[4, 4]).is_none());
        assert!(index.find_match(10, &[3]).is_none());
    }

    #[test]
    fn empty_strong_sums() {
        let mut index = SignatureIndex::new(params(0));
        index.push(5, &[]).unwrap();
        index.push(5, &[]).unwrap();
        assert_eq!(index.get(1).unwrap().strong, &[] as &[u8]);
        assert_eq!(index.find_match(5, &[]).map(|b| b.index), Some(0));
    }

    #[test]
    fn block_offset() {
        let mut index = SignatureIndex::new(params(0));
        index.push(1, &[]).unwrap();
        index.push(2, &[]).unwrap();
        assert_eq!(index.get(1).unwrap().offset(index.block_len()), 1024);
    }
}
