// Blocking drivers around the signature decoder and generator.
//
// `load_signature()` pumps any `Read` through `SigDecoder` with a fixed
// buffer, so a signature arriving over a pipe or socket is decoded as it
// arrives. The `*_file()` helpers add buffered file I/O and size hints.

use std::fs::File;
use std::io::{self, Read};
#[cfg(feature = "sha256")]
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::generate::GenerateError;
#[cfg(feature = "sha256")]
use crate::generate::{GenerateOptions, GenerateStats};
use crate::signature::decoder::{LoadError, SigDecoder, Step};
use crate::signature::index::SignatureIndex;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `load_signature()`.
#[derive(Debug, Clone)]
pub struct LoadStats {
    /// Signature bytes consumed.
    pub sig_bytes: u64,
    /// Number of block records decoded.
    pub blocks: u64,
    /// Format tag.
    pub magic: u32,
    /// Block length declared in the header.
    pub block_len: u32,
    /// Strong checksum length declared in the header.
    pub strong_len: usize,
    /// Number of `read()` calls on the input.
    pub reads: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file-level operations.
#[derive(Debug)]
pub enum IoError {
    /// I/O error (file open, read, write).
    Io(io::Error),
    /// Signature decoding error.
    Load(LoadError),
    /// Signature generation error.
    Generate(GenerateError),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Load(e) => write!(f, "load error: {e}"),
            Self::Generate(e) => write!(f, "generate error: {e}"),
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Load(e) => Some(e),
            Self::Generate(e) => Some(e),
        }
    }
}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<LoadError> for IoError {
    fn from(e: LoadError) -> Self {
        Self::Load(e)
    }
}

impl From<GenerateError> for IoError {
    fn from(e: GenerateError) -> Self {
        Self::Generate(e)
    }
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// load_signature
// ---------------------------------------------------------------------------

/// Decode a signature from `reader` as it arrives.
///
/// `size_hint` is the total stream size if known; it only pre-sizes the
/// index.
pub fn load_signature<R: Read>(
    reader: R,
    size_hint: Option<u64>,
) -> Result<(SignatureIndex, LoadStats), LoadError> {
    load_signature_with(reader, SigDecoder::new(), size_hint)
}

/// Like `load_signature()`, with a caller-configured decoder (event sink).
pub fn load_signature_with<R: Read>(
    mut reader: R,
    decoder: SigDecoder,
    size_hint: Option<u64>,
) -> Result<(SignatureIndex, LoadStats), LoadError> {
    let mut decoder = match size_hint {
        Some(n) => decoder.with_size_hint(n),
        None => decoder,
    };
    let mut buf = vec![0u8; BUF_SIZE];
    let mut reads = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        reads += 1;
        if n == 0 {
            decoder.finish_input();
        } else {
            decoder.push(&buf[..n])?;
        }
        match decoder.run()? {
            Step::Done => break,
            Step::NeedMoreInput | Step::InProgress => {}
        }
    }

    let sig_bytes = decoder.bytes_in();
    let blocks = decoder.blocks();
    let index = decoder.into_signature()?;
    let stats = LoadStats {
        sig_bytes,
        blocks,
        magic: index.magic(),
        block_len: index.block_len(),
        strong_len: index.strong_len(),
        reads,
    };
    Ok((index, stats))
}

/// Load a signature file.
pub fn load_signature_file(path: &Path) -> Result<(SignatureIndex, LoadStats), IoError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    Ok(load_signature(file, Some(size))?)
}

// ---------------------------------------------------------------------------
// generate_signature_file
// ---------------------------------------------------------------------------

/// Generate the signature of `basis_path` into `sig_path`.
#[cfg(feature = "sha256")]
pub fn generate_signature_file(
    basis_path: &Path,
    sig_path: &Path,
    opts: GenerateOptions,
) -> Result<GenerateStats, IoError> {
    let basis = File::open(basis_path)?;
    let out = BufWriter::with_capacity(BUF_SIZE, File::create(sig_path)?);
    let (mut out, stats) = crate::generate::generate_signature(basis, out, opts)?;
    out.flush()?;
    Ok(stats)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::encoder::encode_signature;
    use crate::signature::index::{SigMagic, SignatureParams};

    /// Reader that hands out at most one byte per call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    fn sample() -> Vec<u8> {
        let params = SignatureParams::new(SigMagic::Md4.into(), 4096, 8).unwrap();
        let strong: Vec<[u8; 8]> = (0..50u8).map(|i| [i; 8]).collect();
        encode_signature(params, strong.iter().enumerate().map(|(i, s)| (i as u32 * 3, &s[..])))
            .unwrap()
    }

    #[test]
    fn load_from_reader() {
        let data = sample();
        let (sig, stats) = load_signature(&data[..], Some(data.len() as u64)).unwrap();
        assert_eq!(sig.len(), 50);
        assert_eq!(stats.blocks, 50);
        assert_eq!(stats.sig_bytes, data.len() as u64);
        assert_eq!(stats.magic, u32::from(SigMagic::Md4));
        assert_eq!(stats.block_len, 4096);
        assert_eq!(stats.strong_len, 8);
    }

    #[test]
    fn trickled_input_matches() {
        let data = sample();
        let (whole, _) = load_signature(&data[..], None).unwrap();
        let (trickled, stats) = load_signature(Trickle(&data), None).unwrap();
        assert_eq!(whole, trickled);
        assert_eq!(stats.reads, data.len() as u64 + 1);
    }

    #[test]
    fn truncated_reader_is_malformed() {
        let data = sample();
        let err = load_signature(&data[..data.len() - 3], None).unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.sig");
        std::fs::write(&path, sample()).unwrap();

        let (sig, stats) = load_signature_file(&path).unwrap();
        assert_eq!(sig.len(), 50);
        assert_eq!(stats.sig_bytes, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_signature_file(Path::new("/nonexistent/oxisync.sig")).unwrap_err();
        assert!(matches!(err, IoError::Io(_)));
    }

    #[cfg(feature = "sha256")]
    #[test]
    fn generate_then_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let basis = dir.path().join("basis.bin");
        let sig = dir.path().join("basis.sig");
        let data: Vec<u8> = (0..100_000u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(&basis, &data).unwrap();

        let opts = GenerateOptions {
            block_len: 1024,
            strong_len: 16,
            ..Default::default()
        };
        let gen_stats = generate_signature_file(&basis, &sig, opts).unwrap();
        assert_eq!(gen_stats.blocks, 98);
        assert_eq!(gen_stats.basis_bytes, 100_000);

        let (index, stats) = load_signature_file(&sig).unwrap();
        assert_eq!(stats.blocks, 98);
        assert_eq!(stats.sig_bytes, gen_stats.sig_bytes);
        let first = crate::checksum::adler32(&data[..1024]);
        assert!(index.lookup(first).any(|b| b.index == 0));
    }
}
