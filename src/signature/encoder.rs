// Signature wire-format writer.
//
// Emits the header once, then one `[weak:4][strong:strong_len]` record
// per block. Used by the generator and by anything that needs to
// reproduce a signature stream from an in-memory index.

use std::io::{self, Write};

use super::index::{SignatureIndex, SignatureParams};

/// Streaming signature writer.
pub struct SigWriter<W: Write> {
    inner: W,
    params: SignatureParams,
    blocks: u64,
    bytes_out: u64,
}

impl<W: Write> SigWriter<W> {
    /// Write the header and return a writer ready for records.
    pub fn new(mut inner: W, params: SignatureParams) -> io::Result<Self> {
        inner.write_all(&params.magic().to_be_bytes())?;
        inner.write_all(&params.block_len().to_be_bytes())?;
        inner.write_all(&(params.strong_len() as u32).to_be_bytes())?;
        Ok(Self {
            inner,
            params,
            blocks: 0,
            bytes_out: 12,
        })
    }

    /// Append one block record.
    ///
    /// `strong` must be exactly the header's strong sum length.
    pub fn write_block(&mut self, weak: u32, strong: &[u8]) -> io::Result<()> {
        if strong.len() != self.params.strong_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "strong sum is {} bytes, signature declares {}",
                    strong.len(),
                    self.params.strong_len()
                ),
            ));
        }
        self.inner.write_all(&weak.to_be_bytes())?;
        self.inner.write_all(strong)?;
        self.blocks += 1;
        self.bytes_out += self.params.record_len() as u64;
        Ok(())
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Encode `(weak, strong)` pairs into a signature stream.
pub fn encode_signature<'a, I>(params: SignatureParams, records: I) -> io::Result<Vec<u8>>
where
    I: IntoIterator<Item = (u32, &'a [u8])>,
{
    let mut w = SigWriter::new(Vec::new(), params)?;
    for (weak, strong) in records {
        w.write_block(weak, strong)?;
    }
    w.finish()
}

/// Re-encode a loaded index to its wire form.
pub fn encode_index(index: &SignatureIndex) -> io::Result<Vec<u8>> {
    encode_signature(*index.params(), index.iter().map(|b| (b.weak, b.strong)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
