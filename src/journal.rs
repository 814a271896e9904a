//! The transaction journal.
//!
//! An append-only binary log that's written *before* every visible
//! filesystem change and read back (from disk, never from memory) to
//! undo them.  Each record carries its own checksum; a journal that
//! doesn't verify doesn't replay.
//!
//! Layout: a 24-byte header (magic `DSUJ`, version, endian marker,
//! journal id, plan digest), then raw records of `type:u16 len:u32
//! payload`.  The payload is inner TLVs ending in a CHECKSUM64 over
//! `entry_type ‖ payload-before-checksum`.  NOOP records carry either
//! the transaction metadata (roots, state path) or a commit-progress
//! checkpoint.

use std::fs::File;
use std::io::{Read as _, Write as _};
use std::path::Path;

use crate::codec::{tlv, Digest64, ENDIAN_MARKER_LE};
use crate::status::{Result, SetupError, Status};


const MAGIC: [u8; 4] = *b"DSUJ";
pub const JOURNAL_VERSION: u16 = 1;

// Inner entry payload tags.
const T_ENTRY_VERSION: u16 = 0x0001;
const T_TARGET_ROOT: u16 = 0x0010;
const T_TARGET_PATH: u16 = 0x0011;
const T_SOURCE_ROOT: u16 = 0x0012;
const T_SOURCE_PATH: u16 = 0x0013;
const T_ROLLBACK_ROOT: u16 = 0x0014;
const T_ROLLBACK_PATH: u16 = 0x0015;
const T_FLAGS: u16 = 0x0020;

// NOOP metadata/checkpoint tags.
const T_META_INSTALL_ROOT: u16 = 0x0100;
const T_META_TXN_ROOT: u16 = 0x0101;
const T_META_STATE_PATH: u16 = 0x0102;
const T_META_PROGRESS: u16 = 0x0103;

const T_CHECKSUM64: u16 = 0x00FF;

const ENTRY_VERSION: u32 = 1;


/// Record types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EntryType
{
	Noop,
	CreateDir,
	RemoveDir,
	CopyFile,
	MoveFile,
	DeleteFile,
	WriteState,
}

impl EntryType
{
	fn to_u16(self) -> u16
	{
		use EntryType as ET;
		match self {
			ET::Noop => 0, ET::CreateDir => 1, ET::RemoveDir => 2,
			ET::CopyFile => 3, ET::MoveFile => 4, ET::DeleteFile => 5,
			ET::WriteState => 6,
		}
	}

	fn from_u16(v: u16) -> Option<Self>
	{
		use EntryType as ET;
		match v {
			0 => Some(ET::Noop), 1 => Some(ET::CreateDir),
			2 => Some(ET::RemoveDir), 3 => Some(ET::CopyFile),
			4 => Some(ET::MoveFile), 5 => Some(ET::DeleteFile),
			6 => Some(ET::WriteState),
			_ => None,
		}
	}
}


/// Root indices entries refer to; the metadata NOOP maps them to real
/// paths.
pub mod roots
{
	pub const INSTALL: u8 = 0;
	pub const TXN: u8 = 1;
}

/// Entry flag bits.
pub mod entry_flags
{
	/// The target existed before this entry touched it (so rollback
	/// restores rather than removes).
	pub const TARGET_PREEXISTED: u32 = 1 << 0;
}


/// One forward mutation entry.
#[derive(Debug, Clone, Default)]
pub struct Entry
{
	pub entry_type_raw: u16,

	pub target_root: u8,
	pub target_path: String,
	pub source_root: u8,
	pub source_path: String,
	pub rollback_root: u8,
	pub rollback_path: String,

	pub flags: u32,
}

impl Entry
{
	pub fn entry_type(&self) -> Option<EntryType>
	{
		EntryType::from_u16(self.entry_type_raw)
	}
}


/// A journal read back off disk.
#[derive(Debug, Clone, Default)]
pub struct Journal
{
	pub journal_id: u64,
	pub plan_digest: u64,

	pub install_root: String,
	pub txn_root: String,
	pub state_rel: String,

	/// Highest commit-progress checkpoint seen.
	pub commit_progress: u32,

	/// Forward mutation entries, in forward order (no NOOPs).
	pub entries: Vec<Entry>,
}


/// Journal failure modes.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum JournalErr
{
	#[error("Journal I/O: {0}")]
	IO(#[from] std::io::Error),

	#[error("Not a journal (bad magic)")]
	BadMagic,

	#[error("Unsupported journal version {0}")]
	Version(u16),

	#[error("Bad endian marker {0:#06x}")]
	Endian(u16),

	#[error("Journal truncated")]
	Truncated,

	#[error("Journal entry checksum mismatch (entry {0})")]
	Checksum(usize),

	#[error("Journal entry missing checksum (entry {0})")]
	NoChecksum(usize),

	#[error("Unsupported journal entry version {0}")]
	EntryVersion(u32),
}

impl From<JournalErr> for SetupError
{
	fn from(e: JournalErr) -> Self
	{
		use JournalErr as JE;
		let status = match &e {
			JE::IO(_) => Status::IoError,
			JE::Version(_) | JE::Endian(_) | JE::EntryVersion(_)
					=> Status::UnsupportedVersion,
			_ => Status::IntegrityError,
		};
		SetupError::new(status, e.to_string())
	}
}


fn entry_checksum(entry_type: u16, payload: &[u8]) -> u64
{
	let mut d = Digest64::new();
	d.update(&entry_type.to_le_bytes());
	d.update(payload);
	d.finish()
}


/*
 * Writing
 */

/// The writer.  Appends are flushed record-at-a-time; the record for a
/// mutation must be on disk before the mutation happens.
#[derive(Debug)]
pub struct Writer
{
	f: File,
	journal_id: u64,
	plan_digest: u64,
}

impl Writer
{
	pub fn create(path: &Path, journal_id: u64, plan_digest: u64)
			-> Result<Self>
	{
		let mut f = File::create(path).map_err(JournalErr::IO)?;

		let mut hdr = Vec::with_capacity(24);
		hdr.extend_from_slice(&MAGIC);
		hdr.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
		hdr.extend_from_slice(&ENDIAN_MARKER_LE.to_le_bytes());
		hdr.extend_from_slice(&journal_id.to_le_bytes());
		hdr.extend_from_slice(&plan_digest.to_le_bytes());
		f.write_all(&hdr).map_err(JournalErr::IO)?;
		f.flush().map_err(JournalErr::IO)?;

		Ok(Self { f, journal_id, plan_digest })
	}

	pub fn journal_id(&self) -> u64 { self.journal_id }
	pub fn plan_digest(&self) -> u64 { self.plan_digest }

	fn write_record(&mut self, entry_type: u16, payload: &[u8])
			-> Result<()>
	{
		let mut rec = Vec::with_capacity(6 + payload.len());
		rec.extend_from_slice(&entry_type.to_le_bytes());
		rec.extend_from_slice(&(payload.len() as u32).to_le_bytes());
		rec.extend_from_slice(payload);
		self.f.write_all(&rec).map_err(JournalErr::IO)?;
		self.f.flush().map_err(JournalErr::IO)?;
		Ok(())
	}

	/// The one metadata NOOP, first thing after the header.
	pub fn write_meta(&mut self, install_root_abs: &str,
			txn_root_abs: &str, state_rel: &str)
			-> Result<()>
	{
		let mut b = Vec::new();
		tlv::put_u32(&mut b, T_ENTRY_VERSION, ENTRY_VERSION);
		tlv::put_str(&mut b, T_META_INSTALL_ROOT, install_root_abs);
		tlv::put_str(&mut b, T_META_TXN_ROOT, txn_root_abs);
		tlv::put_str(&mut b, T_META_STATE_PATH, state_rel);
		let sum = entry_checksum(EntryType::Noop.to_u16(), &b);
		tlv::put_u64(&mut b, T_CHECKSUM64, sum);
		self.write_record(EntryType::Noop.to_u16(), &b)
	}

	/// A commit-progress checkpoint NOOP.
	pub fn append_progress(&mut self, commit_progress: u32) -> Result<()>
	{
		let mut b = Vec::new();
		tlv::put_u32(&mut b, T_ENTRY_VERSION, ENTRY_VERSION);
		tlv::put_u32(&mut b, T_META_PROGRESS, commit_progress);
		let sum = entry_checksum(EntryType::Noop.to_u16(), &b);
		tlv::put_u64(&mut b, T_CHECKSUM64, sum);
		self.write_record(EntryType::Noop.to_u16(), &b)
	}

	/// A forward mutation entry.
	pub fn append_entry(&mut self, entry_type: EntryType,
			entry: &Entry)
			-> Result<()>
	{
		let et = entry_type.to_u16();
		let mut b = Vec::new();
		tlv::put_u32(&mut b, T_ENTRY_VERSION, ENTRY_VERSION);
		tlv::put_u8(&mut b, T_TARGET_ROOT, entry.target_root);
		tlv::put_str(&mut b, T_TARGET_PATH, &entry.target_path);
		tlv::put_u8(&mut b, T_SOURCE_ROOT, entry.source_root);
		tlv::put_str(&mut b, T_SOURCE_PATH, &entry.source_path);
		tlv::put_u8(&mut b, T_ROLLBACK_ROOT, entry.rollback_root);
		tlv::put_str(&mut b, T_ROLLBACK_PATH, &entry.rollback_path);
		tlv::put_u32(&mut b, T_FLAGS, entry.flags);
		let sum = entry_checksum(et, &b);
		tlv::put_u64(&mut b, T_CHECKSUM64, sum);
		self.write_record(et, &b)
	}

	/// Close, syncing to disk.
	pub fn close(mut self) -> Result<()>
	{
		self.f.flush().map_err(JournalErr::IO)?;
		self.f.sync_all().map_err(JournalErr::IO)?;
		Ok(())
	}
}


/*
 * Reading
 */

/// Parse one record payload into an entry (or metadata, folded into
/// the journal).  `index` is only for error messages.
fn parse_record(journal: &mut Journal, index: usize, entry_type: u16,
		payload: &[u8])
		-> Result<Option<Entry>>
{
	use JournalErr as JE;

	let mut entry = Entry {
			entry_type_raw: entry_type, ..Entry::default() };
	let mut entry_version = 0u32;
	let mut checksum_stored: Option<u64> = None;
	let mut checksum_off = 0usize;

	let mut w = tlv::Walker::new(payload);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_CHECKSUM64 => {
				// Must be the final record, covering everything
				// before it.
				if w.offset() != payload.len()
				{ Err(JE::Checksum(index))? }
				checksum_off = t.start;
				checksum_stored = Some(t.as_u64()?);
			},
			T_ENTRY_VERSION => entry_version = t.as_u32()?,
			T_TARGET_ROOT => entry.target_root = t.as_u8()?,
			T_TARGET_PATH => entry.target_path = t.as_string()?,
			T_SOURCE_ROOT => entry.source_root = t.as_u8()?,
			T_SOURCE_PATH => entry.source_path = t.as_string()?,
			T_ROLLBACK_ROOT => entry.rollback_root = t.as_u8()?,
			T_ROLLBACK_PATH => entry.rollback_path = t.as_string()?,
			T_FLAGS => entry.flags = t.as_u32()?,
			T_META_INSTALL_ROOT =>
					journal.install_root = t.as_string()?,
			T_META_TXN_ROOT => journal.txn_root = t.as_string()?,
			T_META_STATE_PATH => journal.state_rel = t.as_string()?,
			T_META_PROGRESS =>
					journal.commit_progress = t.as_u32()?,
			_ => (),
		}
	}

	let stored = checksum_stored.ok_or(JE::NoChecksum(index))?;
	if entry_version != ENTRY_VERSION
	{ Err(JE::EntryVersion(entry_version))? }

	let calc = entry_checksum(entry_type, &payload[..checksum_off]);
	if calc != stored { Err(JE::Checksum(index))? }

	match EntryType::from_u16(entry_type)
	{
		Some(EntryType::Noop) | None => Ok(None),
		Some(_) => Ok(Some(entry)),
	}
}


/// Read a journal file back.  Every record's checksum is verified; the
/// first bad one fails the whole read.
pub fn read_file(path: &Path) -> Result<Journal>
{
	use JournalErr as JE;

	let mut f = File::open(path).map_err(JE::IO)?;
	let mut bytes = Vec::new();
	f.read_to_end(&mut bytes).map_err(JE::IO)?;

	if bytes.len() < 24 { Err(JE::Truncated)? }
	if bytes[0..4] != MAGIC { Err(JE::BadMagic)? }

	let version = u16::from_le_bytes([bytes[4], bytes[5]]);
	if version != JOURNAL_VERSION { Err(JE::Version(version))? }
	let endian = u16::from_le_bytes([bytes[6], bytes[7]]);
	if endian != ENDIAN_MARKER_LE { Err(JE::Endian(endian))? }

	let mut journal = Journal {
		journal_id: u64::from_le_bytes(bytes[8..16].try_into()
				.expect("eight bytes is eight bytes")),
		plan_digest: u64::from_le_bytes(bytes[16..24].try_into()
				.expect("eight bytes is eight bytes")),
		..Journal::default()
	};

	// Walk the records.
	let mut off = 24usize;
	let mut index = 0usize;
	while off < bytes.len()
	{
		if off + 6 > bytes.len() { Err(JE::Truncated)? }
		let entry_type = u16::from_le_bytes([bytes[off], bytes[off + 1]]);
		let len = u32::from_le_bytes(bytes[off + 2..off + 6].try_into()
				.expect("four bytes")) as usize;
		off += 6;
		if len > bytes.len() - off { Err(JE::Truncated)? }

		let payload = &bytes[off..off + len];
		off += len;

		if let Some(entry) = parse_record(&mut journal, index,
				entry_type, payload)?
		{
			journal.entries.push(entry);
		}
		index += 1;
	}

	Ok(journal)
}



#[cfg(test)]
mod tests
{
	use super::*;
	use tempfile::TempDir;

	fn mk_entry(rel: &str) -> Entry
	{
		Entry {
			target_root: roots::INSTALL,
			target_path: rel.to_string(),
			source_root: roots::TXN,
			source_path: format!(".dsu_txn/staged/{rel}"),
			rollback_root: roots::TXN,
			rollback_path: format!(".dsu_txn/backup/{rel}"),
			flags: entry_flags::TARGET_PREEXISTED,
			..Entry::default()
		}
	}

	fn write_sample(path: &std::path::Path)
	{
		let mut w = Writer::create(path, 0xAA55, 0x1234).unwrap();
		w.write_meta("/inst", "/inst.txn/aa55", ".dsu/state").unwrap();
		w.append_entry(EntryType::CreateDir, &Entry {
			target_root: roots::INSTALL,
			target_path: "bin".into(),
			..Entry::default()
		}).unwrap();
		w.append_entry(EntryType::MoveFile, &mk_entry("bin/app"))
				.unwrap();
		w.append_progress(2).unwrap();
		w.close().unwrap();
	}

	#[test]
	fn roundtrip()
	{
		let td = TempDir::new().unwrap();
		let p = td.path().join("txn.dsujournal");
		write_sample(&p);

		let j = read_file(&p).unwrap();
		assert_eq!(j.journal_id, 0xAA55);
		assert_eq!(j.plan_digest, 0x1234);
		assert_eq!(j.install_root, "/inst");
		assert_eq!(j.txn_root, "/inst.txn/aa55");
		assert_eq!(j.state_rel, ".dsu/state");
		assert_eq!(j.commit_progress, 2);

		// NOOPs don't show as entries
		assert_eq!(j.entries.len(), 2);
		assert_eq!(j.entries[0].entry_type(),
				Some(EntryType::CreateDir));
		let e = &j.entries[1];
		assert_eq!(e.entry_type(), Some(EntryType::MoveFile));
		assert_eq!(e.target_path, "bin/app");
		assert_eq!(e.rollback_path, ".dsu_txn/backup/bin/app");
		assert_eq!(e.flags, entry_flags::TARGET_PREEXISTED);
	}

	#[test]
	fn every_flipped_byte_caught()
	{
		let td = TempDir::new().unwrap();
		let p = td.path().join("j");
		write_sample(&p);
		let img = std::fs::read(&p).unwrap();

		// Flip each byte of the record region in turn; the reader must
		// refuse every single variant.  (Header flips get caught as
		// magic/version/endian errors, so start past it.)
		for i in 24..img.len()
		{
			let mut bad = img.clone();
			bad[i] ^= 0x01;
			std::fs::write(&p, &bad).unwrap();
			assert!(read_file(&p).is_err(),
					"flipping byte {i} went unnoticed");
		}
	}

	#[test]
	fn truncation_caught()
	{
		let td = TempDir::new().unwrap();
		let p = td.path().join("j");
		write_sample(&p);
		let img = std::fs::read(&p).unwrap();

		std::fs::write(&p, &img[..img.len() - 3]).unwrap();
		let e = read_file(&p).unwrap_err();
		assert_eq!(e.status(), Status::IntegrityError);

		std::fs::write(&p, &img[..10]).unwrap();
		assert!(read_file(&p).is_err());
	}
}
