//! The audit log.
//!
//! Every interesting decision the engine makes lands here as a
//! structured event: resolver choices, transaction phase changes,
//! journaled mutations, verify results.  In deterministic mode the
//! timestamps are all zero and the whole log (binary or JSON export) is
//! byte-identical across runs, which makes it diffable evidence rather
//! than a vibes-based progress ticker.

use std::path::Path;

use crate::codec::{framed, tlv, digest::digest64_buf};
use crate::status::{Result, SetupError, Status};


const LOG_MAGIC: [u8; 4] = *b"DSUL";
const LOG_VERSION: u16 = 1;

// Payload tags
const T_ROOT: u16 = 0x0001;
const T_ROOT_VERSION: u16 = 0x0002;
const T_EVENT: u16 = 0x0010;
const T_SEQ: u16 = 0x0011;
const T_EVENT_ID: u16 = 0x0012;
const T_SEVERITY: u16 = 0x0013;
const T_CATEGORY: u16 = 0x0014;
const T_PHASE: u16 = 0x0015;
const T_TIMESTAMP: u16 = 0x0016;
const T_MESSAGE: u16 = 0x0017;
const T_PATH: u16 = 0x0018;
const T_COMPONENT: u16 = 0x0019;
const T_STATUS_CODE: u16 = 0x001A;
const T_DIGEST_A: u16 = 0x001B;
const T_DIGEST_B: u16 = 0x001C;
const T_DIGEST_C: u16 = 0x001D;


/// Which part of the engine an event came out of.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase
{
	#[default]
	Stage,
	Verify,
	Commit,
	Rollback,
	State,
	Cli,
	Resolve,
}

impl Phase
{
	fn to_u8(self) -> u8
	{
		use Phase as P;
		match self {
			P::Stage => 0, P::Verify => 1, P::Commit => 2,
			P::Rollback => 3, P::State => 4, P::Cli => 5,
			P::Resolve => 6,
		}
	}

	fn from_u8(v: u8) -> Self
	{
		use Phase as P;
		match v {
			0 => P::Stage, 1 => P::Verify, 2 => P::Commit,
			3 => P::Rollback, 4 => P::State, 5 => P::Cli,
			_ => P::Resolve,
		}
	}
}


/// Severity bytes.  Three levels is plenty.
pub mod severity
{
	pub const INFO: u8 = 0;
	pub const WARN: u8 = 1;
	pub const ERROR: u8 = 2;
}

/// Event id blocks, one per phase-ish area.  Sparse on purpose; these
/// are wire values, not indexes.
pub mod events
{
	// Resolver decisions
	pub const RESOLVE_PLATFORM: u32 = 0x0100;
	pub const RESOLVE_INSTALL_ROOT: u32 = 0x0101;
	pub const RESOLVE_SEED: u32 = 0x0102;
	pub const RESOLVE_DEP_ADD: u32 = 0x0103;
	pub const RESOLVE_ACTION: u32 = 0x0104;
	pub const RESOLVE_DIGESTS: u32 = 0x0105;

	// Plan
	pub const PLAN_BUILT: u32 = 0x0200;

	// Transaction
	pub const TXN_BEGIN: u32 = 0x0300;
	pub const TXN_STAGED: u32 = 0x0301;
	pub const TXN_VERIFIED: u32 = 0x0302;
	pub const TXN_COMMITTED: u32 = 0x0303;
	pub const TXN_ROLLED_BACK: u32 = 0x0304;
	pub const TXN_FAIL: u32 = 0x0305;

	// State
	pub const STATE_WRITTEN: u32 = 0x0400;
	pub const STATE_REMOVED: u32 = 0x0401;

	// Verify/report
	pub const VERIFY_FILE: u32 = 0x0500;
	pub const VERIFY_SUMMARY: u32 = 0x0501;
}


/// One structured event.
#[derive(Debug, Clone, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Event
{
	pub seq: u32,
	pub event_id: u32,
	pub severity: u8,
	pub category: u8,
	pub phase: Phase,

	/// Unix seconds; 0 in deterministic mode.
	pub timestamp: u32,

	pub message: String,
	pub path: String,
	pub component_id: String,

	pub status_code: u32,
	pub digest_a: u64,
	pub digest_b: u64,
	pub digest_c: u64,
}


/// Errors particular to log files; most things come back as the generic
/// codec complaints.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum AuditErr
{
	#[error("Audit log I/O: {0}")]
	IO(#[from] std::io::Error),

	#[error("Unsupported audit log version {0}")]
	Version(u16),
}

impl From<AuditErr> for SetupError
{
	fn from(e: AuditErr) -> Self
	{
		let status = match &e {
			AuditErr::IO(_) => Status::IoError,
			AuditErr::Version(_) => Status::UnsupportedVersion,
		};
		SetupError::new(status, e.to_string())
	}
}


/// The log itself.  Owned by the context; one transaction at a time
/// appends to it.
#[derive(Debug, Default)]
pub struct AuditLog
{
	events: Vec<Event>,
	deterministic: bool,
	last_written_digest64: Option<u64>,
}


impl AuditLog
{
	pub fn new(deterministic: bool) -> Self
	{
		Self { deterministic, ..Self::default() }
	}

	pub fn reset(&mut self)
	{
		self.events.clear();
		self.last_written_digest64 = None;
	}

	pub fn len(&self) -> usize { self.events.len() }
	pub fn is_empty(&self) -> bool { self.events.is_empty() }
	pub fn events(&self) -> &[Event] { &self.events }

	/// digest64 of the last write_file() payload, if any.  The
	/// installed state records this to tie itself to its log.
	pub fn last_written_digest64(&self) -> Option<u64>
	{ self.last_written_digest64 }


	/// Append an event.  seq and timestamp get filled in here; pass
	/// seq 0 and let the log own the ordering.
	pub fn push(&mut self, mut ev: Event)
	{
		ev.seq = (self.events.len() + 1) as u32;
		ev.timestamp = match self.deterministic {
			true => 0,
			false => now_secs(),
		};
		self.events.push(ev);
	}

	/// The short form for the common case.
	pub fn emit(&mut self, phase: Phase, event_id: u32, severity: u8,
			message: impl Into<String>)
	{
		self.push(Event {
			phase, event_id, severity,
			message: message.into(),
			..Event::default()
		});
	}


	/*
	 * Binary file form
	 */

	fn payload_bytes(&self) -> Vec<u8>
	{
		let mut root = Vec::new();
		tlv::put_u32(&mut root, T_ROOT_VERSION, 1);
		for ev in &self.events
		{
			let mut eb = Vec::new();
			tlv::put_u32(&mut eb, T_SEQ, ev.seq);
			tlv::put_u32(&mut eb, T_EVENT_ID, ev.event_id);
			tlv::put_u8(&mut eb, T_SEVERITY, ev.severity);
			tlv::put_u8(&mut eb, T_CATEGORY, ev.category);
			tlv::put_u8(&mut eb, T_PHASE, ev.phase.to_u8());
			tlv::put_u32(&mut eb, T_TIMESTAMP, ev.timestamp);
			tlv::put_str(&mut eb, T_MESSAGE, &ev.message);
			tlv::put_str(&mut eb, T_PATH, &ev.path);
			tlv::put_str(&mut eb, T_COMPONENT, &ev.component_id);
			tlv::put_u32(&mut eb, T_STATUS_CODE, ev.status_code);
			tlv::put_u64(&mut eb, T_DIGEST_A, ev.digest_a);
			tlv::put_u64(&mut eb, T_DIGEST_B, ev.digest_b);
			tlv::put_u64(&mut eb, T_DIGEST_C, ev.digest_c);
			tlv::put(&mut root, T_EVENT, &eb);
		}

		let mut payload = Vec::new();
		tlv::put(&mut payload, T_ROOT, &root);
		payload
	}

	/// Write the framed binary log.  Not atomic; the log is an output
	/// artifact, not a record we later depend on for correctness.
	pub fn write_file(&mut self, path: &Path) -> Result<()>
	{
		let payload = self.payload_bytes();
		let img = framed::wrap(LOG_MAGIC, LOG_VERSION, &payload);
		std::fs::write(path, &img).map_err(AuditErr::IO)?;
		self.last_written_digest64 = Some(digest64_buf(&payload));
		Ok(())
	}

	/// Read one back.
	pub fn read_file(path: &Path) -> Result<Self>
	{
		let bytes = std::fs::read(path).map_err(AuditErr::IO)?;
		let (version, payload) = framed::unwrap(LOG_MAGIC, "audit log",
				&bytes)?;
		if version > LOG_VERSION
		{ Err(AuditErr::Version(version))? }

		let mut log = Self::default();

		let mut w = tlv::Walker::new(payload);
		let root = match w.next()? {
			Some(t) if t.tag == T_ROOT => t,
			_ => Err(SetupError::integrity("audit log: missing root"))?,
		};

		let mut rw = tlv::Walker::new(root.value);
		while let Some(t) = rw.next()?
		{
			if t.tag != T_EVENT { continue; }
			let mut ev = Event::default();
			let mut ew = tlv::Walker::new(t.value);
			while let Some(f) = ew.next()?
			{
				match f.tag
				{
					T_SEQ => ev.seq = f.as_u32()?,
					T_EVENT_ID => ev.event_id = f.as_u32()?,
					T_SEVERITY => ev.severity = f.as_u8()?,
					T_CATEGORY => ev.category = f.as_u8()?,
					T_PHASE => ev.phase = Phase::from_u8(f.as_u8()?),
					T_TIMESTAMP => ev.timestamp = f.as_u32()?,
					T_MESSAGE => ev.message = f.as_string()?,
					T_PATH => ev.path = f.as_string()?,
					T_COMPONENT => ev.component_id = f.as_string()?,
					T_STATUS_CODE => ev.status_code = f.as_u32()?,
					T_DIGEST_A => ev.digest_a = f.as_u64()?,
					T_DIGEST_B => ev.digest_b = f.as_u64()?,
					T_DIGEST_C => ev.digest_c = f.as_u64()?,
					_ => (),
				}
			}
			log.events.push(ev);
		}

		Ok(log)
	}


	/// JSON export.  Field order is the struct order and events are in
	/// seq order, so the output is deterministic.
	pub fn export_json(&self) -> Result<String>
	{
		serde_json::to_string_pretty(&self.events)
				.map_err(|e| SetupError::internal(
						format!("audit json: {e}")))
	}
}


fn now_secs() -> u32
{
	use std::time::{SystemTime, UNIX_EPOCH};
	match SystemTime::now().duration_since(UNIX_EPOCH)
	{
		Ok(d) => d.as_secs() as u32,
		Err(_) => 0,
	}
}
