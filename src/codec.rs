//! The binary plumbing every on-disk artifact shares.
//!
//! All the engine's files are the same shape: a little fixed header with
//! a magic and a version, then a payload that's a tree of TLV records.
//! The journal is the one oddball (its own header, raw records), but it
//! still builds its payloads out of the same TLV writer.


/// TLV record read/write
pub(crate) mod tlv;

/// Rolling 32/64-bit content digests
pub(crate) mod digest;
pub use digest::{Digest32, Digest64};

/// Framed file wrapper (magic + version + checksum)
pub(crate) mod framed;


/// Little-endian endianness marker stored in every header.  Readers on
/// any host verify it rather than guessing.
pub(crate) const ENDIAN_MARKER_LE: u16 = 0xFFFE;
