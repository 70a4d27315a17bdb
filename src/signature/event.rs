// Structured decoder events.
//
// Every event is logged through the `log` facade. A caller that wants the
// events as data (progress bars, tests, metrics) injects a sink closure
// into the decoder; there is no global trace state.

use std::fmt;

/// Progress reported by the signature decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadEvent<'a> {
    Magic(u32),
    BlockLen(u32),
    StrongLen(usize),
    /// Index initialised with this capacity hint.
    IndexReady { capacity_hint: usize },
    Block { index: usize, weak: u32, strong: &'a [u8] },
    Done { blocks: usize },
}

/// Caller-supplied event callback.
pub type LoadSink = Box<dyn FnMut(&LoadEvent<'_>) + Send>;

/// Hex rendering of a strong checksum for trace output.
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

pub(crate) fn log_event(event: &LoadEvent<'_>) {
    match *event {
        LoadEvent::Magic(magic) => log::debug!("got signature magic {magic:#010x}"),
        LoadEvent::BlockLen(len) => log::debug!("got block length {len}"),
        LoadEvent::StrongLen(len) => log::debug!("got strong sum length {len}"),
        LoadEvent::IndexReady { capacity_hint } => {
            log::debug!("signature index ready, capacity hint {capacity_hint} blocks")
        }
        LoadEvent::Block {
            index,
            weak,
            strong,
        } => {
            if log::log_enabled!(log::Level::Trace) {
                log::trace!("got block {index}: weak={weak:#x}, strong={}", Hex(strong));
            }
        }
        LoadEvent::Done { blocks } => log::debug!("signature complete, {blocks} blocks"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_renders_lowercase_pairs() {
        assert_eq!(Hex(&[0x00, 0xab, 0x7f]).to_string(), "00ab7f");
        assert_eq!(Hex(&[]).to_string(), "");
    }
}
