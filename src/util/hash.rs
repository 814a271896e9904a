//! Misc (SHA256) hashing utils
use std::ops::Deref;
use std::fmt;
use std::io::Read;
use std::path::Path;

use serde_with::{serde_as, hex::Hex};


/// Buffer size for streaming file hashes.  Payload files are mostly
/// small; 32k keeps the syscall count down without getting silly.
pub(crate) const HASH_BUFSZ: usize = 32 * 1024;


/// A raw SHA256 hash output.
///
/// SHA256 gives you a 256 bit number, which you need 256 bits to store.
/// Or more, depending on how you store it, but if you wanna be simple,
/// it's just 256 bits.  Or 32 octets.  The sha256 crate stores into a
/// [u8; 32], and the base16 crate can deal with that, so we just wrap
/// that and call it good.
#[derive(Default, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[serde_as]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Sha256Hash(
	#[serde_as(as = "Hex")]
	[u8; 32]
);

impl Deref for Sha256Hash
{
	type Target = [u8; 32];
	fn deref(&self) -> &Self::Target { &self.0 }
}

impl fmt::Debug for Sha256Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "Sha256Hash({})", self.to_buf().as_ref()) }
}


/// Parsing a hex string into a hash can fail a couple ways.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum HashParseErr
{
	#[error("Invalid hash length: {0} should be 64")]
	Len(usize),

	#[error("Invalid hex: {0}")]
	Hex(String),
}

impl std::str::FromStr for Sha256Hash
{
	type Err = HashParseErr;

	fn from_str(s: &str) -> Result<Self, Self::Err>
	{
		use HashParseErr as HPE;

		// First check the length; that's easy
		let slen = s.len();
		if slen != 64 { Err(HPE::Len(slen))? }

		// And dehexify
		let mut hout = Sha256Hash::default();
		let hret = base16ct::lower::decode(s, &mut hout.0)
				.map_err(|e| HPE::Hex(e.to_string()))?;

		// Double-checking the len here, in case I made a booboo.
		assert_eq!(hret.len(), hout.len(), "should have gotten the hex len right");

		Ok(hout)
	}
}

impl From<[u8; 32]> for Sha256Hash
{
	fn from(buf: [u8; 32]) -> Self
	{
		Self(buf)
	}
}

impl fmt::Display for Sha256Hash
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{
		let hb: Sha256HashBuf = self.to_buf();
		write!(f, "{}", hb)
	}
}

impl Sha256Hash
{
	pub fn to_buf(&self) -> Sha256HashBuf { (*self).into() }

	pub fn as_bytes(&self) -> &[u8; 32] { &self.0 }

	/// Build from a 32-byte slice (e.g., a TLV value).  Wrong length is
	/// the caller handing us garbage.
	pub fn from_slice(b: &[u8]) -> Option<Self>
	{
		let arr: [u8; 32] = b.try_into().ok()?;
		Some(Self(arr))
	}
}



/// A hex SHA256 output.
///
/// A base16 encoding of a number is inherently valid UTF-8, so trivially
/// String-able too.  But since we know the size, we go with a more
/// fixed-size allocation type for simplicity, when we don't need a
/// str-ified version.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sha256HashBuf([u8; 64]);

impl Deref for Sha256HashBuf
{
	type Target = [u8; 64];
	fn deref(&self) -> &Self::Target { &self.0 }
}

impl Default for Sha256HashBuf
{
	// Can't just derive for 64-size arrays, until the Glorious Future of
	// some combination of const generics and specialization and
	// whatnot...
	fn default() -> Self { Self ( [0; 64] ) }
}

impl From<Sha256Hash> for Sha256HashBuf
{
	fn from(hash: Sha256Hash) -> Self
	{
		let mut buf = Self::default();
		let bret = base16ct::lower::encode(&hash.0, &mut buf.0)
				.map_err(|e| format!("Hash encoding error: {}", e))
				.unwrap();

		// Double check that somebody doesn't screw up the length.
		let slen = bret.len();
		let blen = buf.len();
		if slen != blen
		{
			panic!("Programmer screwed up buffer size: should have \
					{blen} but got {slen} encoded");
		}

		// 'zit
		buf
	}
}

impl AsRef<str> for Sha256HashBuf
{
	/// Should be impossible to create these other than via our
	/// constructors, so should be guaranteed already UTF-8-y.
	fn as_ref(&self) -> &str
	{
		std::str::from_utf8(&self.0).expect("base16 encode screwed us")
	}
}

impl fmt::Display for Sha256HashBuf
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "{}", self.as_ref()) }
}

impl fmt::Debug for Sha256HashBuf
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "Sha256HashBuf({})", self.as_ref()) }
}



/*
 * Now some of the hashing utils, using those structs
 */


/// Calculate the SHA256 of a buffer.
pub fn sha256_buf(buf: &[u8]) -> Sha256Hash
{
	use sha2::{Sha256, Digest};
	let h = Sha256::digest(buf);
	Sha256Hash(h.into())
}


/// Calculate the SHA256 of something we can read from (like a
/// filehandle).  Returns the hash and how many bytes went past.
pub fn sha256_reader<T: Read>(rdr: &mut T)
		-> Result<(Sha256Hash, u64), std::io::Error>
{
	use sha2::{Sha256, Digest};

	let mut hasher = Sha256::new();
	let mut buf = [0u8; HASH_BUFSZ];
	let mut total: u64 = 0;
	loop
	{
		let n = rdr.read(&mut buf)?;
		if n == 0 { break; }
		hasher.update(&buf[..n]);
		total += n as u64;
	}
	let khash = hasher.finalize();
	Ok((Sha256Hash(khash.into()), total))
}


/// Calculate the SHA256 (and size) of a file
pub fn sha256_file(file: &Path)
		-> Result<(Sha256Hash, u64), std::io::Error>
{
	let mut fh = std::fs::File::open(file)?;
	sha256_reader(&mut fh)
}
