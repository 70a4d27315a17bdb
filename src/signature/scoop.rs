// Scoop buffer: decouples input delivery size from decoder read size.
//
// Input arrives in arbitrary pushes (one byte, one socket read, a whole
// file). The decoder asks for fixed-size or length-prefixed reads. The
// scoop keeps whatever has not been consumed yet and hands out exactly
// `n` contiguous bytes once they are all present.
//
// Bytes before `pos` have been handed out and are never returned again.
// They are dropped on the next `push`, so memory is bounded by the
// longest pending record plus one delivery.

use std::collections::TryReserveError;

/// Accumulates pushed input until a read of the requested size can be served.
#[derive(Debug, Default)]
pub struct Scoop {
    buf: Vec<u8>,
    /// Consumed prefix of `buf`.
    pos: usize,
    total_in: u64,
    eof: bool,
}

impl Scoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly arrived bytes.
    ///
    /// Already-consumed bytes are released first. Growth failure is
    /// reported instead of aborting.
    pub fn push(&mut self, data: &[u8]) -> Result<(), TryReserveError> {
        self.compact();
        if data.is_empty() {
            return Ok(());
        }
        self.buf.try_reserve(data.len())?;
        self.buf.extend_from_slice(data);
        self.total_in += data.len() as u64;
        Ok(())
    }

    /// Take exactly `n` bytes, or `None` without consuming anything.
    ///
    /// Repeated calls are idempotent until enough input has been pushed.
    pub fn take(&mut self, n: usize) -> Option<&[u8]> {
        if self.available() < n {
            return None;
        }
        let start = self.pos;
        self.pos += n;
        Some(&self.buf[start..start + n])
    }

    /// Take a 4-byte big-endian unsigned integer.
    pub fn take_be_u32(&mut self) -> Option<u32> {
        let bytes = self.take(4)?;
        Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Take a 4-byte big-endian signed integer.
    pub fn take_be_i32(&mut self) -> Option<i32> {
        self.take_be_u32().map(|v| v as i32)
    }

    /// Bytes pushed but not yet taken.
    #[inline]
    pub fn available(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Total bytes ever pushed.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Record that no more input will be pushed.
    pub fn mark_eof(&mut self) {
        self.eof = true;
    }

    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Drop consumed bytes, moving the pending tail to the front.
    pub fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        if self.pos == self.buf.len() {
            self.buf.clear();
        } else {
            self.buf.drain(..self.pos);
        }
        self.pos = 0;
    }

    /// Bytes currently held, consumed or not. Exposed for memory accounting.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
