// Signature loading.
//
// - `scoop`: buffers arbitrary input deliveries for fixed-size reads
// - `index`: block checksums in block order with fast-checksum lookup
// - `decoder`: resumable state machine over the signature wire format
// - `encoder`: wire-format writer
// - `event`: structured decoder events and the injected sink type

pub mod decoder;
pub mod encoder;
pub mod event;
pub mod index;
pub mod scoop;

pub use decoder::{LoadError, Malformed, SigDecoder, Step, decode_signature};
pub use encoder::{SigWriter, encode_index, encode_signature};
pub use event::{LoadEvent, LoadSink};
pub use index::{
    BlockSig, MAX_STRONG_SUM_LEN, ParamsError, PushError, SigMagic, SignatureIndex, SignatureParams,
};
pub use scoop::Scoop;
