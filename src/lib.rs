//! Oxisync: streaming signature loading and forward-only source mapping
//! for rsync-style network deltas.
//!
//! The crate provides:
//! - A resumable signature decoder and index (`signature`)
//! - Sliding-window access to forward-only byte sources (`map`)
//! - Pluggable block checksums and signature generation (`checksum`, `generate`)
//! - Blocking reader/file drivers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use oxisync::signature::{SigDecoder, SignatureParams, Step, encode_signature};
//!
//! let params = SignatureParams::new(0x7273_0137, 2048, 2).unwrap();
//! let wire = encode_signature(params, [(7, &[1u8, 2][..]), (9, &[3, 4][..])]).unwrap();
//!
//! let mut dec = SigDecoder::new();
//! for chunk in wire.chunks(3) {
//!     dec.push(chunk).unwrap();
//!     dec.run().unwrap();
//! }
//! dec.finish_input();
//! assert_eq!(dec.run().unwrap(), Step::Done);
//!
//! let sig = dec.into_signature().unwrap();
//! assert_eq!(sig.find_match(9, &[3, 4]).map(|b| b.index), Some(1));
//! ```

pub mod checksum;
pub mod generate;
pub mod io;
pub mod map;
pub mod signature;

#[cfg(feature = "cli")]
pub mod cli;
