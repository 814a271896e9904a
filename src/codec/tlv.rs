//! TLV records: type:u16 LE, len:u32 LE, value[len].
//!
//! Writers append onto a plain Vec; readers walk a borrowed slice with
//! an offset and refuse to read past the end.  Nothing here knows what
//! any tag *means*; that's the callers' business.

use crate::status::{SetupError, Status};


/// Reading TLVs off a buffer can fail in a few ways; they all boil down
/// to "this buffer is not what it claims to be".
#[derive(Debug)]
#[derive(thiserror::Error)]
pub(crate) enum TlvErr
{
	#[error("Truncated TLV header at offset {0}")]
	TruncatedHeader(usize),

	#[error("TLV value overruns buffer: offset {off} len {len} buf {buf}")]
	Overrun { off: usize, len: usize, buf: usize },

	#[error("TLV value has wrong size: tag {tag:#06x} len {len} wanted {want}")]
	WrongSize { tag: u16, len: usize, want: usize },

	#[error("TLV string is not valid UTF-8 (tag {0:#06x})")]
	BadUtf8(u16),
}

impl From<TlvErr> for SetupError
{
	fn from(e: TlvErr) -> Self
	{
		SetupError::new(Status::IntegrityError, e.to_string())
	}
}


/*
 * Writing
 */

/// Append one TLV record.
pub(crate) fn put(buf: &mut Vec<u8>, tag: u16, value: &[u8])
{
	buf.extend_from_slice(&tag.to_le_bytes());
	buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
	buf.extend_from_slice(value);
}

pub(crate) fn put_u8(buf: &mut Vec<u8>, tag: u16, v: u8)
{
	put(buf, tag, &[v]);
}

pub(crate) fn put_u32(buf: &mut Vec<u8>, tag: u16, v: u32)
{
	put(buf, tag, &v.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut Vec<u8>, tag: u16, v: u64)
{
	put(buf, tag, &v.to_le_bytes());
}

pub(crate) fn put_str(buf: &mut Vec<u8>, tag: u16, s: &str)
{
	put(buf, tag, s.as_bytes());
}


/*
 * Reading
 */

/// One record as the walker hands it out.  The value borrows the
/// underlying buffer; nobody copies until they know they care.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Tlv<'a>
{
	pub(crate) tag: u16,
	pub(crate) value: &'a [u8],

	/// Byte offset of this record's header within the walked buffer.
	/// Checksum verification needs to know where the terminal record
	/// started.
	pub(crate) start: usize,
}

impl<'a> Tlv<'a>
{
	pub(crate) fn as_u8(&self) -> Result<u8, TlvErr>
	{
		match self.value {
			[v] => Ok(*v),
			_ => Err(TlvErr::WrongSize {
					tag: self.tag, len: self.value.len(), want: 1 }),
		}
	}

	pub(crate) fn as_u32(&self) -> Result<u32, TlvErr>
	{
		let arr: [u8; 4] = self.value.try_into().map_err(|_|
				TlvErr::WrongSize {
					tag: self.tag, len: self.value.len(), want: 4 })?;
		Ok(u32::from_le_bytes(arr))
	}

	pub(crate) fn as_u64(&self) -> Result<u64, TlvErr>
	{
		let arr: [u8; 8] = self.value.try_into().map_err(|_|
				TlvErr::WrongSize {
					tag: self.tag, len: self.value.len(), want: 8 })?;
		Ok(u64::from_le_bytes(arr))
	}

	pub(crate) fn as_str(&self) -> Result<&'a str, TlvErr>
	{
		std::str::from_utf8(self.value)
				.map_err(|_| TlvErr::BadUtf8(self.tag))
	}

	pub(crate) fn as_string(&self) -> Result<String, TlvErr>
	{
		Ok(self.as_str()?.to_string())
	}
}


/// Walk a buffer of back-to-back TLV records.
#[derive(Debug)]
pub(crate) struct Walker<'a>
{
	buf: &'a [u8],
	off: usize,
}

impl<'a> Walker<'a>
{
	pub(crate) fn new(buf: &'a [u8]) -> Self
	{
		Self { buf, off: 0 }
	}

	/// Next record, None at a clean end, Err on a ragged one.
	pub(crate) fn next(&mut self) -> Result<Option<Tlv<'a>>, TlvErr>
	{
		use TlvErr as TE;

		if self.off == self.buf.len() { return Ok(None); }

		let start = self.off;
		if self.off + 6 > self.buf.len()
		{ return Err(TE::TruncatedHeader(self.off)); }

		let tag = u16::from_le_bytes([self.buf[self.off],
				self.buf[self.off + 1]]);
		let len = u32::from_le_bytes([
				self.buf[self.off + 2], self.buf[self.off + 3],
				self.buf[self.off + 4], self.buf[self.off + 5]]) as usize;
		self.off += 6;

		// The one load-bearing check in this whole file.
		if len > self.buf.len() - self.off
		{
			return Err(TE::Overrun
					{ off: self.off, len, buf: self.buf.len() });
		}

		let value = &self.buf[self.off..self.off + len];
		self.off += len;
		Ok(Some(Tlv { tag, value, start }))
	}

	/// Where the walk currently stands; after the final record this is
	/// the buffer length.
	pub(crate) fn offset(&self) -> usize { self.off }
}



#[cfg(test)]
mod tests
{
	use super::*;

	fn sample() -> Vec<u8>
	{
		let mut b = Vec::new();
		put_u32(&mut b, 0x0001, 7);
		put_str(&mut b, 0x0010, "hello");
		put_u64(&mut b, 0x0020, 0xDEAD_BEEF_CAFE_F00D);
		b
	}

	#[test]
	fn roundtrip()
	{
		let b = sample();
		let mut w = Walker::new(&b);

		let t = w.next().unwrap().unwrap();
		assert_eq!(t.tag, 0x0001);
		assert_eq!(t.as_u32().unwrap(), 7);

		let t = w.next().unwrap().unwrap();
		assert_eq!(t.tag, 0x0010);
		assert_eq!(t.as_str().unwrap(), "hello");

		let t = w.next().unwrap().unwrap();
		assert_eq!(t.tag, 0x0020);
		assert_eq!(t.as_u64().unwrap(), 0xDEAD_BEEF_CAFE_F00D);

		assert!(w.next().unwrap().is_none());
	}

	#[test]
	fn overrun_rejected()
	{
		// Claim 100 bytes of value on a 10-byte buffer
		let mut b = Vec::new();
		b.extend_from_slice(&0x0001u16.to_le_bytes());
		b.extend_from_slice(&100u32.to_le_bytes());
		b.extend_from_slice(&[0u8; 4]);

		let mut w = Walker::new(&b);
		let e = w.next().unwrap_err();
		assert!(matches!(e, TlvErr::Overrun { .. }), "got {e:?}");
	}

	#[test]
	fn truncated_header_rejected()
	{
		let b = sample();
		let mut w = Walker::new(&b[..b.len() - 9]);
		// First two records are intact
		w.next().unwrap().unwrap();
		w.next().unwrap().unwrap();
		// Third one isn't
		assert!(w.next().is_err());
	}

	#[test]
	fn wrong_scalar_size()
	{
		let mut b = Vec::new();
		put(&mut b, 0x0002, &[1, 2, 3]);
		let mut w = Walker::new(&b);
		let t = w.next().unwrap().unwrap();
		assert!(t.as_u32().is_err());
		assert!(t.as_u8().is_err());
	}
}
