// Incremental signature decoder.
//
// Wire format (all integers big-endian):
//
//   [magic:4][block_len:4][strong_len:4] { [weak:4][strong:strong_len] }*
//
// The decoder is an explicit state machine driven by the caller: push
// whatever bytes arrived, call `step()` (or `run()`), repeat. Each step
// performs at most one transition, so every record is added to the index
// exactly once no matter how the input was chunked. Suspension is purely
// a return value; nothing blocks and nothing is held in the background.

use std::collections::TryReserveError;
use std::mem;

use thiserror::Error;

use super::event::{LoadEvent, LoadSink, log_event};
use super::index::{MAX_STRONG_SUM_LEN, ParamsError, PushError, SignatureIndex, SignatureParams};
use super::scoop::Scoop;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a signature stream was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Malformed {
    #[error("block length of {0} is bogus")]
    BlockLen(i32),
    #[error("strong sum length {0} is implausible")]
    StrongLen(i32),
    #[error("input ended inside {field}: have {have} of {need} bytes")]
    Truncated {
        field: &'static str,
        have: usize,
        need: usize,
    },
    #[error(transparent)]
    Params(#[from] ParamsError),
}

/// Error type for signature loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Corrupt or adversarial input. Never retried.
    #[error("malformed signature: {0}")]
    Malformed(#[from] Malformed),
    #[error("out of memory while buffering signature: {0}")]
    OutOfMemory(#[from] TryReserveError),
    #[error("signature decoder already finished or failed")]
    Terminated,
    #[error("signature decoding has not finished")]
    Incomplete,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot add block to index: {0}")]
    Index(PushError),
}

impl From<PushError> for LoadError {
    fn from(e: PushError) -> Self {
        match e {
            PushError::OutOfMemory(e) => Self::OutOfMemory(e),
            other => Self::Index(other),
        }
    }
}

impl LoadError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Outcome of one decoder step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A transition happened; call again.
    InProgress,
    /// The buffered input cannot satisfy the current read. Push more and retry.
    NeedMoreInput,
    /// Input ended cleanly between records.
    Done,
}

enum State {
    AwaitMagic,
    AwaitBlockLen { magic: u32 },
    AwaitStrongLen { magic: u32, block_len: u32 },
    AwaitWeakSum { index: SignatureIndex },
    AwaitStrongSum { index: SignatureIndex, weak: u32 },
    Done { index: SignatureIndex },
    Failed,
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::AwaitMagic => "magic",
            Self::AwaitBlockLen { .. } => "block length",
            Self::AwaitStrongLen { .. } => "strong sum length",
            Self::AwaitWeakSum { .. } => "weak sum",
            Self::AwaitStrongSum { .. } => "strong sum",
            Self::Done { .. } => "done",
            Self::Failed => "failed",
        }
    }
}

/// Streaming signature decoder.
///
/// ```
/// use oxisync::signature::{SigDecoder, Step};
///
/// let stream = [
///     0x72, 0x73, 0x01, 0x37, // magic
///     0, 0, 8, 0,             // block length 2048
///     0, 0, 0, 2,             // strong sum length 2
///     0, 0, 0, 42, 0xAB, 0xCD,
/// ];
/// let mut dec = SigDecoder::new();
/// for chunk in stream.chunks(5) {
///     dec.push(chunk).unwrap();
///     assert_eq!(dec.run().unwrap(), Step::NeedMoreInput);
/// }
/// dec.finish_input();
/// assert_eq!(dec.run().unwrap(), Step::Done);
/// let sig = dec.into_signature().unwrap();
/// assert_eq!(sig.lookup(42).count(), 1);
/// ```
pub struct SigDecoder {
    state: State,
    scoop: Scoop,
    blocks: u64,
    /// Declared size of the whole stream, only used to pre-size the index.
    size_hint: Option<u64>,
    sink: Option<LoadSink>,
}

impl Default for SigDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SigDecoder {
    pub fn new() -> Self {
        Self {
            state: State::AwaitMagic,
            scoop: Scoop::new(),
            blocks: 0,
            size_hint: None,
            sink: None,
        }
    }

    /// Declare the total stream size, if known, so the index can be pre-sized.
    pub fn with_size_hint(mut self, total_bytes: u64) -> Self {
        self.size_hint = Some(total_bytes);
        self
    }

    /// Report structured events to `sink` in addition to the log.
    pub fn with_events<F>(mut self, sink: F) -> Self
    where
        F: FnMut(&LoadEvent<'_>) + Send + 'static,
    {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Hand newly arrived bytes to the decoder.
    pub fn push(&mut self, data: &[u8]) -> Result<(), LoadError> {
        if self.scoop.is_eof() || matches!(self.state, State::Failed | State::Done { .. }) {
            return Err(LoadError::Terminated);
        }
        self.scoop.push(data)?;
        Ok(())
    }

    /// Declare that no more input will arrive.
    pub fn finish_input(&mut self) {
        self.scoop.mark_eof();
    }

    /// Perform at most one state transition.
    pub fn step(&mut self) -> Result<Step, LoadError> {
        let state = mem::replace(&mut self.state, State::Failed);
        let (next, step) = self.advance(state)?;
        self.state = next;
        Ok(step)
    }

    /// Step until more input is needed or decoding is complete.
    pub fn run(&mut self) -> Result<Step, LoadError> {
        loop {
            match self.step()? {
                Step::InProgress => continue,
                step => return Ok(step),
            }
        }
    }

    fn advance(&mut self, state: State) -> Result<(State, Step), LoadError> {
        match state {
            State::AwaitMagic => match self.scoop.take_be_u32() {
                Some(magic) => {
                    emit(&mut self.sink, LoadEvent::Magic(magic));
                    Ok((State::AwaitBlockLen { magic }, Step::InProgress))
                }
                None => self.starved(State::AwaitMagic, 4),
            },

            State::AwaitBlockLen { magic } => match self.scoop.take_be_i32() {
                Some(l) if l < 1 => {
                    log::error!("block length of {l} is bogus");
                    Err(Malformed::BlockLen(l).into())
                }
                Some(l) => {
                    let block_len = l as u32;
                    emit(&mut self.sink, LoadEvent::BlockLen(block_len));
                    Ok((State::AwaitStrongLen { magic, block_len }, Step::InProgress))
                }
                None => self.starved(State::AwaitBlockLen { magic }, 4),
            },

            State::AwaitStrongLen { magic, block_len } => match self.scoop.take_be_i32() {
                Some(l) if l < 0 || l as usize > MAX_STRONG_SUM_LEN => {
                    log::error!("strong sum length {l} is implausible");
                    Err(Malformed::StrongLen(l).into())
                }
                Some(l) => {
                    let strong_len = l as usize;
                    emit(&mut self.sink, LoadEvent::StrongLen(strong_len));
                    let params =
                        SignatureParams::new(magic, block_len, strong_len).map_err(Malformed::from)?;
                    let capacity_hint = params.capacity_hint(self.size_hint);
                    let index = SignatureIndex::with_capacity(params, capacity_hint)
                        .map_err(Malformed::from)?;
                    emit(&mut self.sink, LoadEvent::IndexReady { capacity_hint });
                    Ok((State::AwaitWeakSum { index }, Step::InProgress))
                }
                None => self.starved(State::AwaitStrongLen { magic, block_len }, 4),
            },

            State::AwaitWeakSum { index } => match self.scoop.take_be_u32() {
                Some(weak) => Ok((State::AwaitStrongSum { index, weak }, Step::InProgress)),
                // Ending exactly between records is the normal completion.
                None if self.scoop.is_eof() && self.scoop.available() == 0 => {
                    emit(&mut self.sink, LoadEvent::Done { blocks: index.len() });
                    Ok((State::Done { index }, Step::Done))
                }
                None => self.starved(State::AwaitWeakSum { index }, 4),
            },

            State::AwaitStrongSum { mut index, weak } => {
                let need = index.strong_len();
                match self.scoop.take(need) {
                    Some(strong) => {
                        let i = index.push(weak, strong)?;
                        self.blocks += 1;
                        emit(
                            &mut self.sink,
                            LoadEvent::Block {
                                index: i,
                                weak,
                                strong,
                            },
                        );
                        Ok((State::AwaitWeakSum { index }, Step::InProgress))
                    }
                    None => self.starved(State::AwaitStrongSum { index, weak }, need),
                }
            }

            State::Done { index } => Ok((State::Done { index }, Step::Done)),

            State::Failed => Err(LoadError::Terminated),
        }
    }

    /// The current read cannot be served: suspend, or fail if input has ended.
    fn starved(&self, state: State, need: usize) -> Result<(State, Step), LoadError> {
        if !self.scoop.is_eof() {
            return Ok((state, Step::NeedMoreInput));
        }
        let have = self.scoop.available();
        log::error!(
            "signature input ended inside {}: have {have} of {need} bytes",
            state.name()
        );
        Err(Malformed::Truncated {
            field: state.name(),
            have,
            need,
        }
        .into())
    }

    /// Records decoded so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Total input bytes pushed.
    pub fn bytes_in(&self) -> u64 {
        self.scoop.total_in()
    }

    /// Name of the field the decoder is waiting for.
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done { .. })
    }

    /// Block length, once the header has been read.
    pub fn block_len(&self) -> Option<u32> {
        match &self.state {
            State::AwaitStrongLen { block_len, .. } => Some(*block_len),
            State::AwaitWeakSum { index }
            | State::AwaitStrongSum { index, .. }
            | State::Done { index } => Some(index.block_len()),
            _ => None,
        }
    }

    /// Take the completed signature.
    pub fn into_signature(self) -> Result<SignatureIndex, LoadError> {
        match self.state {
            State::Done { index } => Ok(index),
            State::Failed => Err(LoadError::Terminated),
            _ => Err(LoadError::Incomplete),
        }
    }
}

fn emit(sink: &mut Option<LoadSink>, event: LoadEvent<'_>) {
    log_event(&event);
    if let Some(sink) = sink {
        sink(&event);
    }
}

// ---------------------------------------------------------------------------
// Convenience function
// ---------------------------------------------------------------------------

/// Decode a complete signature held in memory.
pub fn decode_signature(data: &[u8]) -> Result<SignatureIndex, LoadError> {
    let mut dec = SigDecoder::new().with_size_hint(data.len() as u64);
    dec.push(data)?;
    dec.finish_input();
    dec.run()?;
    dec.into_signature()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
