//! Rolling 32/64-bit content digests.
//!
//! These are the FNV-1a folds baked into the file formats: seeded, then
//! folded a byte at a time.  They are identity hashes, not cryptographic
//! ones; SHA-256 covers the "did somebody tamper with the bytes" cases,
//! these cover the "are these two canonical serializations the same
//! thing" cases, cheaply and with a stable answer on every host.
//!
//! Multi-field digests put a single 0x00 separator after every logical
//! field so that ("ab","c") and ("a","bc") don't collide.


const SEED32: u32 = 0x811C_9DC5;
const PRIME32: u32 = 0x0100_0193;

const SEED64: u64 = 0xCBF2_9CE4_8422_2325;
const PRIME64: u64 = 0x0000_0100_0000_01B3;


/// 32-bit rolling digest.  Kept around for stable external display;
/// equality checks should prefer the 64-bit one.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Digest32(u32);

impl Default for Digest32
{
	fn default() -> Self { Self::new() }
}

impl Digest32
{
	pub fn new() -> Self { Self(SEED32) }

	pub fn update(&mut self, bytes: &[u8]) -> &mut Self
	{
		let mut h = self.0;
		for b in bytes
		{
			h ^= *b as u32;
			h = h.wrapping_mul(PRIME32);
		}
		self.0 = h;
		self
	}

	/// Field separator
	pub fn sep(&mut self) -> &mut Self { self.update(&[0u8]) }

	pub fn str(&mut self, s: &str) -> &mut Self
	{ self.update(s.as_bytes()) }

	pub fn u8(&mut self, v: u8) -> &mut Self { self.update(&[v]) }

	pub fn u64_le(&mut self, v: u64) -> &mut Self
	{ self.update(&v.to_le_bytes()) }

	pub fn finish(&self) -> u32 { self.0 }
}


/// 64-bit rolling digest; the collision-resistant-enough sibling used
/// for equality checks and checksums.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Digest64(u64);

impl Default for Digest64
{
	fn default() -> Self { Self::new() }
}

impl Digest64
{
	pub fn new() -> Self { Self(SEED64) }

	pub fn update(&mut self, bytes: &[u8]) -> &mut Self
	{
		let mut h = self.0;
		for b in bytes
		{
			h ^= *b as u64;
			h = h.wrapping_mul(PRIME64);
		}
		self.0 = h;
		self
	}

	pub fn sep(&mut self) -> &mut Self { self.update(&[0u8]) }

	pub fn str(&mut self, s: &str) -> &mut Self
	{ self.update(s.as_bytes()) }

	pub fn u8(&mut self, v: u8) -> &mut Self { self.update(&[v]) }

	pub fn u64_le(&mut self, v: u64) -> &mut Self
	{ self.update(&v.to_le_bytes()) }

	pub fn finish(&self) -> u64 { self.0 }
}


/// One-shot digest64 of a byte buffer.
pub fn digest64_buf(bytes: &[u8]) -> u64
{
	let mut d = Digest64::new();
	d.update(bytes);
	d.finish()
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn known_values()
	{
		// FNV-1a test vectors; if these shift, every file format
		// changes under us.
		assert_eq!(Digest32::new().finish(), 0x811C_9DC5);
		assert_eq!(Digest32::new().str("a").finish(), 0xE40C_292C);
		assert_eq!(Digest64::new().finish(), 0xCBF2_9CE4_8422_2325);
		assert_eq!(Digest64::new().str("a").finish(),
				0xAF63_DC4C_8601_EC8C);
	}

	#[test]
	fn streaming_equals_oneshot()
	{
		let mut d = Digest64::new();
		d.update(b"hello ").update(b"world");
		assert_eq!(d.finish(), digest64_buf(b"hello world"));
	}

	#[test]
	fn separators_matter()
	{
		let mut a = Digest64::new();
		a.str("ab").sep().str("c");
		let mut b = Digest64::new();
		b.str("a").sep().str("bc");
		assert_ne!(a.finish(), b.finish());
	}
}
