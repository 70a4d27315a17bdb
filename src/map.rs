// Sliding-window access to a forward-only byte source.
//
// Gives slice access to `[offset, offset+len)` of a source that may not
// support seeking (pipes, sockets), as long as requests move forward.
// The buffered window is re-centred on demand: it starts up to two chunks
// behind the requested offset (chunk aligned) and spans at least
// `max_window` bytes. When the new window overlaps the tail of the old
// one, the overlap is shifted to the front of the buffer and only the
// missing bytes are read. The delta stage slides forward by less than a
// window at a time, so most refills read a small fraction of the window.
//
// Invariant: the valid region `[offset, offset+len)` lives at `buf[..len]`.

use std::collections::TryReserveError;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;

use thiserror::Error;

/// Window alignment and look-behind unit.
pub const CHUNK_SIZE: usize = 32 * 1024;
/// Minimum window size.
pub const MAX_MAP_SIZE: usize = 256 * 1024;

// ---------------------------------------------------------------------------
// Byte source
// ---------------------------------------------------------------------------

/// A sequential byte source with optional absolute seek.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Move the read cursor to absolute `offset`.
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let _ = offset;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "source does not support seeking",
        ))
    }
}

/// Adapter for readers that can only move forward (stdin, pipes, sockets).
#[derive(Debug)]
pub struct Forward<R>(pub R);

impl<R: Read> ByteSource for Forward<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R> Forward<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

/// Adapter for seekable readers (files, in-memory cursors).
#[derive(Debug)]
pub struct Seekable<R>(pub R);

impl<R: Read + Seek> ByteSource for Seekable<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl<R> Seekable<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek_to(offset)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MapError {
    /// Caller broke the access contract (zero length, moved backwards, bad limits).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The source failed a read. The cause is preserved; no retry was attempted.
    #[error("read error from source: {0}")]
    Read(#[source] io::Error),
    /// The window needed a seek the source could not perform.
    #[error("cannot seek source to {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },
    #[error("out of memory growing window: {0}")]
    OutOfMemory(#[from] TryReserveError),
}

// ---------------------------------------------------------------------------
// Configuration, stats, events
// ---------------------------------------------------------------------------

/// Window geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapLimits {
    chunk: usize,
    max_window: usize,
}

impl Default for MapLimits {
    fn default() -> Self {
        Self {
            chunk: CHUNK_SIZE,
            max_window: MAX_MAP_SIZE,
        }
    }
}

impl MapLimits {
    /// `chunk` must be a power of two; `max_window` must be non-zero.
    pub fn new(chunk: usize, max_window: usize) -> Result<Self, MapError> {
        if chunk == 0 || !chunk.is_power_of_two() {
            return Err(MapError::InvalidArgument("chunk size must be a power of two"));
        }
        if max_window == 0 {
            return Err(MapError::InvalidArgument("window size must be non-zero"));
        }
        Ok(Self { chunk, max_window })
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    pub fn max_window(&self) -> usize {
        self.max_window
    }

    /// Start of the window that serves a request at `offset`.
    fn window_start(&self, offset: u64) -> u64 {
        let chunk = self.chunk as u64;
        let back = chunk.saturating_mul(2);
        if offset > back {
            (offset - back) & !(chunk - 1)
        } else {
            0
        }
    }
}

/// I/O counters for one mapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapStats {
    /// Requests served from the buffer with no I/O.
    pub hits: u64,
    /// Requests that moved the window.
    pub refills: u64,
    /// Calls to `ByteSource::read`, including the one that saw end of stream.
    pub reads: u64,
    pub seeks: u64,
    pub bytes_read: u64,
    /// Bytes kept across a refill instead of being read again.
    pub bytes_reused: u64,
}

/// Window movement reported to an injected sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEvent {
    Hit {
        offset: u64,
        len: usize,
    },
    Refill {
        window_start: u64,
        read_start: u64,
        read_size: usize,
        reused: usize,
    },
    Seek {
        offset: u64,
    },
    Eof {
        at: u64,
    },
}

/// Caller-supplied window event callback.
pub type MapSink = Box<dyn FnMut(&MapEvent) + Send>;

/// A view returned by [`WindowMapper::map`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<'a> {
    /// Absolute offset of `data[0]`.
    pub offset: u64,
    /// At most the requested length; shorter only at end of stream.
    pub data: &'a [u8],
    /// The view ends at the end of the source.
    pub eof: bool,
}

impl Deref for Window<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data
    }
}

// ---------------------------------------------------------------------------
// WindowMapper
// ---------------------------------------------------------------------------

/// Bounded-memory, forward-biased random access over a [`ByteSource`].
///
/// The mapper owns the source for its lifetime and never closes it;
/// [`into_inner`](Self::into_inner) releases the buffer and hands the
/// source back.
pub struct WindowMapper<S> {
    source: S,
    limits: MapLimits,
    /// Allocated window; `buf.len()` is the allocated size.
    buf: Vec<u8>,
    /// Valid bytes at the front of `buf`.
    len: usize,
    /// Absolute offset of `buf[0]`.
    offset: u64,
    /// Where the source's read cursor is believed to be.
    source_pos: u64,
    eof: bool,
    stats: MapStats,
    sink: Option<MapSink>,
}

impl<S: ByteSource> WindowMapper<S> {
    /// Map `source`, whose read cursor must be at offset 0.
    pub fn new(source: S) -> Self {
        Self::with_limits(source, MapLimits::default())
    }

    pub fn with_limits(source: S, limits: MapLimits) -> Self {
        Self {
            source,
            limits,
            buf: Vec::new(),
            len: 0,
            offset: 0,
            source_pos: 0,
            eof: false,
            stats: MapStats::default(),
            sink: None,
        }
    }

    /// Report window events to `sink` in addition to the log.
    pub fn with_events<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&MapEvent) + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    /// View at least `len` bytes starting at `offset`.
    ///
    /// The view is shorter than `len` only at end of stream, in which
    /// case `Window::eof` is set. Requests must not move before the
    /// retained window.
    pub fn map(&mut self, offset: u64, len: usize) -> Result<Window<'_>, MapError> {
        if len == 0 {
            return Err(MapError::InvalidArgument("zero-length window request"));
        }
        let end = offset
            .checked_add(len as u64)
            .ok_or(MapError::InvalidArgument("window end overflows"))?;
        if offset < self.offset {
            return Err(MapError::InvalidArgument(
                "offset precedes the retained window",
            ));
        }

        let valid_end = self.valid_end();
        if end <= valid_end || self.eof {
            // Either covered, or the stream has ended and the buffer
            // already holds everything there is past `offset`.
            self.stats.hits += 1;
            self.emit(MapEvent::Hit { offset, len });
            return Ok(self.view(offset, len));
        }

        self.refill(offset, end)?;
        Ok(self.view(offset, len))
    }

    fn refill(&mut self, offset: u64, end: u64) -> Result<(), MapError> {
        // The new window never starts before the retained one.
        let window_start = self.limits.window_start(offset).max(self.offset);
        let window_size = usize::try_from(end - window_start)
            .map_err(|_| MapError::InvalidArgument("window does not fit in memory"))?
            .max(self.limits.max_window);

        if window_size > self.buf.len() {
            self.buf.try_reserve_exact(window_size - self.buf.len())?;
            self.buf.resize(window_size, 0);
        }

        // Keep the tail of the old window if the new one starts inside it.
        let valid_end = self.valid_end();
        let (read_start, reused) = if window_start >= self.offset
            && window_start < valid_end
            && window_start + window_size as u64 >= valid_end
        {
            (valid_end, (valid_end - window_start) as usize)
        } else {
            (window_start, 0)
        };

        // A failed seek must leave the retained window intact.
        if self.source_pos != read_start {
            self.source
                .seek_to(read_start)
                .map_err(|source| MapError::Seek {
                    offset: read_start,
                    source,
                })?;
            self.source_pos = read_start;
            self.stats.seeks += 1;
            self.emit(MapEvent::Seek { offset: read_start });
        }

        if reused > 0 {
            let from = (window_start - self.offset) as usize;
            self.buf.copy_within(from..from + reused, 0);
        }
        self.offset = window_start;
        self.len = reused;
        self.stats.refills += 1;
        self.stats.bytes_reused += reused as u64;

        let read_size = window_size - reused;
        log::debug!(
            "refill window at {window_start}: read {read_size} bytes from {read_start}, reuse {reused}"
        );
        self.emit(MapEvent::Refill {
            window_start,
            read_start,
            read_size,
            reused,
        });

        let mut total = 0usize;
        let mut failure = None;
        while total < read_size {
            let dst = &mut self.buf[reused + total..reused + read_size];
            self.stats.reads += 1;
            match self.source.read(dst) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("read error in window refill at {}: {e}", read_start + total as u64);
                    failure = Some(e);
                    break;
                }
            }
        }

        self.source_pos += total as u64;
        self.len = reused + total;
        self.stats.bytes_read += total as u64;

        if let Some(e) = failure {
            return Err(MapError::Read(e));
        }
        if self.eof {
            let at = self.valid_end();
            log::debug!("source reached end of stream at {at}");
            self.emit(MapEvent::Eof { at });
        }
        Ok(())
    }

    fn view(&self, offset: u64, len: usize) -> Window<'_> {
        let start = usize::try_from(offset - self.offset)
            .unwrap_or(usize::MAX)
            .min(self.len);
        let n = len.min(self.len - start);
        Window {
            offset,
            data: &self.buf[start..start + n],
            eof: self.eof && start + n == self.len,
        }
    }

    fn valid_end(&self) -> u64 {
        self.offset + self.len as u64
    }

    fn emit(&mut self, event: MapEvent) {
        if let MapEvent::Hit { offset, len } = event {
            log::trace!("window hit at {offset}+{len}");
        }
        if let Some(sink) = &mut self.sink {
            sink(&event);
        }
    }

    /// Whether the source has reported end of stream.
    pub fn reached_eof(&self) -> bool {
        self.eof
    }

    /// Absolute range currently held in the buffer.
    pub fn valid_range(&self) -> std::ops::Range<u64> {
        self.offset..self.valid_end()
    }

    pub fn stats(&self) -> MapStats {
        self.stats
    }

    pub fn limits(&self) -> MapLimits {
        self.limits
    }

    /// Release the buffer and return the source, unclosed.
    pub fn into_inner(self) -> S {
        self.source
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
