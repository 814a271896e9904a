//! The framed file wrapper shared by manifest/plan/state files.
//!
//! Header layout (20 bytes, all little-endian):
//!   magic[4]  version:u16  endian:u16  header_size:u32  payload_len:u32
//!   header_checksum:u32
//! where the checksum is the wrapping byte-sum of the first 16 header
//! bytes.  The payload that follows is one root TLV.

use crate::codec::ENDIAN_MARKER_LE;
use crate::status::{SetupError, Status};


pub(crate) const HEADER_SIZE: u32 = 20;


/// What goes wrong opening one of our files.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub(crate) enum FramedErr
{
	#[error("File too short to be a {0} file ({1} bytes)")]
	Short(&'static str, usize),

	#[error("Bad magic for {0} file")]
	BadMagic(&'static str),

	#[error("Bad endian marker {0:#06x}")]
	BadEndian(u16),

	#[error("Bad header size {0}")]
	BadHeaderSize(u32),

	#[error("Header checksum mismatch: stored {stored:#010x} calc {calc:#010x}")]
	BadChecksum { stored: u32, calc: u32 },

	#[error("Payload length {len} doesn't match file ({have} bytes after header)")]
	BadPayloadLen { len: u32, have: usize },
}

impl From<FramedErr> for SetupError
{
	fn from(e: FramedErr) -> Self
	{
		SetupError::new(Status::IntegrityError, e.to_string())
	}
}


fn header_checksum(hdr: &[u8]) -> u32
{
	// Wrapping byte-sum of the first 16 bytes.
	hdr[..16].iter().fold(0u32, |a, b| a.wrapping_add(*b as u32))
}


/// Wrap a payload into a complete file image.
pub(crate) fn wrap(magic: [u8; 4], version: u16, payload: &[u8]) -> Vec<u8>
{
	let mut out = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
	out.extend_from_slice(&magic);
	out.extend_from_slice(&version.to_le_bytes());
	out.extend_from_slice(&ENDIAN_MARKER_LE.to_le_bytes());
	out.extend_from_slice(&HEADER_SIZE.to_le_bytes());
	out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
	let sum = header_checksum(&out);
	out.extend_from_slice(&sum.to_le_bytes());
	out.extend_from_slice(payload);
	out
}


/// Unwrap a file image: check magic, endian, header checksum and payload
/// length, and hand back (version, payload).  Version policy is the
/// caller's; everything else getting rejected here is an integrity
/// problem.
pub(crate) fn unwrap<'a>(magic: [u8; 4], kind: &'static str,
		bytes: &'a [u8])
		-> Result<(u16, &'a [u8]), FramedErr>
{
	use FramedErr as FE;

	let hs = HEADER_SIZE as usize;
	if bytes.len() < hs { return Err(FE::Short(kind, bytes.len())); }

	if bytes[0..4] != magic { return Err(FE::BadMagic(kind)); }

	let version = u16::from_le_bytes([bytes[4], bytes[5]]);
	let endian = u16::from_le_bytes([bytes[6], bytes[7]]);
	if endian != ENDIAN_MARKER_LE { return Err(FE::BadEndian(endian)); }

	let hdr_size = u32::from_le_bytes([bytes[8], bytes[9],
			bytes[10], bytes[11]]);
	if hdr_size != HEADER_SIZE { return Err(FE::BadHeaderSize(hdr_size)); }

	let payload_len = u32::from_le_bytes([bytes[12], bytes[13],
			bytes[14], bytes[15]]) as usize;

	let stored = u32::from_le_bytes([bytes[16], bytes[17],
			bytes[18], bytes[19]]);
	let calc = header_checksum(bytes);
	if stored != calc
	{ return Err(FE::BadChecksum { stored, calc }); }

	let have = bytes.len() - hs;
	if payload_len != have
	{
		return Err(FE::BadPayloadLen
				{ len: payload_len as u32, have });
	}

	Ok((version, &bytes[hs..]))
}
