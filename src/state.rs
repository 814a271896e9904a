//! The installed-state record.
//!
//! This is the engine's memory: what product, which components, every
//! owned file with its hash, across one or more install roots.  It gets
//! rewritten atomically by every successful transaction and read back
//! for upgrade/repair/verify/uninstall.  The representation on disk is
//! canonical (sorted, fixed field order), so two states describing the
//! same install are the same bytes, which is what lets tests and
//! forensics diff them at all.

use std::path::Path;

use crate::codec::{framed, tlv};
use crate::manifest::{ComponentKind, Scope, Version};
use crate::resolve::Operation;
use crate::status::{Result, SetupError, Status};
use crate::util::hash::Sha256Hash;


/// Relative location of the state file under an install root.
pub const STATE_REL_DIR: &str = ".dsu";
pub const STATE_REL_PATH: &str = ".dsu/installed_state.dsustate";


const MAGIC: [u8; 4] = *b"DSUS";

/// Current format version; we still read version 1 (single-root, no
/// per-file root index).
pub const STATE_VERSION: u16 = 2;

// Root
const T_ROOT: u16 = 0x0001;
const T_ROOT_VERSION: u16 = 0x0002;

// Product
const T_PRODUCT_ID: u16 = 0x0010;
const T_PRODUCT_VERSION: u16 = 0x0011;
const T_BUILD_CHANNEL: u16 = 0x0012;
const T_INSTALL_INSTANCE_ID: u16 = 0x0013;

// Placement
const T_PLATFORM: u16 = 0x0020;
const T_SCOPE: u16 = 0x0021;
const T_INSTALL_ROOT_COMPAT: u16 = 0x0022;
const T_INSTALL_ROOT_ITEM: u16 = 0x0023;
const T_IR_VERSION: u16 = 0x0024;
const T_IR_ROLE: u16 = 0x0025;
const T_IR_PATH: u16 = 0x0026;

// Digest linkage
const T_MANIFEST_DIGEST64: u16 = 0x0030;
const T_RESOLVED_DIGEST64: u16 = 0x0031;
const T_PLAN_DIGEST64: u16 = 0x0032;

// Components
const T_COMPONENT: u16 = 0x0040;
const T_C_VERSION: u16 = 0x0041;
const T_C_ID: u16 = 0x0042;
const T_C_VERSTR: u16 = 0x0043;
const T_C_KIND: u16 = 0x0044;
const T_C_INSTALL_TIME_POLICY: u16 = 0x0045;
const T_C_REGISTRATION: u16 = 0x0046;
const T_C_MARKER: u16 = 0x0047;

// Files
const T_FILE: u16 = 0x0050;
const T_F_VERSION: u16 = 0x0051;
const T_F_PATH: u16 = 0x0052;
const T_F_SHA256: u16 = 0x0053;
const T_F_SIZE: u16 = 0x0054;
const T_F_DIGEST64: u16 = 0x0055;
const T_F_ROOT_INDEX: u16 = 0x0056;
const T_F_OWNERSHIP: u16 = 0x0057;
const T_F_FLAGS: u16 = 0x0058;

// History
const T_LAST_OPERATION: u16 = 0x0060;
const T_LAST_JOURNAL_ID: u16 = 0x0061;
const T_LAST_AUDIT_LOG_DIGEST64: u16 = 0x0062;


/// Who a recorded file belongs to, which is to say, what uninstall may
/// do with it.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Ownership
{
	/// Created by install, removed by uninstall.
	#[default]
	Owned,

	/// The user's; never removed.
	UserData,

	/// Removable, but only on explicit opt-in.
	Cache,
}

impl Ownership
{
	pub(crate) fn to_u8(self) -> u8
	{
		use Ownership as O;
		match self { O::Owned => 0, O::UserData => 1, O::Cache => 2 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		use Ownership as O;
		match v {
			0 => Some(O::Owned), 1 => Some(O::UserData),
			2 => Some(O::Cache),
			_ => None,
		}
	}
}


/// Install-root roles.  Exactly one primary per state.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum RootRole
{
	#[default]
	Primary,
	Secondary,
}

impl RootRole
{
	pub(crate) fn to_u8(self) -> u8
	{
		match self { RootRole::Primary => 0, RootRole::Secondary => 1 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		match v {
			0 => Some(RootRole::Primary),
			1 => Some(RootRole::Secondary),
			_ => None,
		}
	}
}


#[derive(Debug, Clone)]
pub struct StateInstallRoot
{
	pub role: RootRole,
	pub path_abs: String,
}


/// One recorded file.
#[derive(Debug, Clone, Default)]
pub struct StateFile
{
	pub root_index: u32,
	pub rel_path: String,
	pub sha256: Sha256Hash,
	pub size: u64,
	pub digest64: u64,
	pub ownership: Ownership,
	pub flags: u32,
}


/// One recorded component.
#[derive(Debug, Clone, Default)]
pub struct StateComponent
{
	pub id: String,
	pub version: Version,
	pub kind: ComponentKind,
	pub install_time_policy: u64,
	pub registrations: Vec<String>,
	pub markers: Vec<String>,
	pub files: Vec<StateFile>,
}


/// The record itself.
#[derive(Debug, Clone, Default)]
pub struct State
{
	pub product_id: String,
	pub product_version: Version,
	pub build_channel: String,
	pub platform: String,
	pub scope: Scope,
	pub install_instance_id: u64,
	pub install_roots: Vec<StateInstallRoot>,
	pub manifest_digest64: u64,
	pub resolved_digest64: u64,
	pub plan_digest64: u64,
	pub last_operation: Operation,
	pub last_journal_id: u64,
	pub last_audit_log_digest64: Option<u64>,
	pub components: Vec<StateComponent>,
}


/// State-specific failure modes; canonicalization problems are all
/// integrity errors, the file being the thing that's wrong.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum StateErr
{
	#[error("State I/O: {0}")]
	IO(#[from] std::io::Error),

	#[error("Unsupported state version {0}")]
	Version(u16),

	#[error("State has no primary install root (or several)")]
	PrimaryRoot,

	#[error("State file entry has bad root index {0}")]
	BadRootIndex(u32),

	#[error("Non-canonical path in state: '{0}'")]
	BadPath(String),

	#[error("Non-printable bytes in state string: '{0}'")]
	BadString(String),

	#[error("Duplicate file entry: root {0} path '{1}'")]
	DupFile(u32, String),

	#[error("Duplicate component: '{0}'")]
	DupComponent(String),
}

impl From<StateErr> for SetupError
{
	fn from(e: StateErr) -> Self
	{
		let status = match &e {
			StateErr::IO(_) => Status::IoError,
			StateErr::Version(_) => Status::UnsupportedVersion,
			_ => Status::IntegrityError,
		};
		SetupError::new(status, e.to_string())
	}
}


fn printable(s: &str) -> bool
{
	s.bytes().all(|b| (0x20..0x7F).contains(&b))
}


impl State
{
	pub fn component(&self, id: &str) -> Option<&StateComponent>
	{
		self.components.iter().find(|c| c.id == id)
	}

	/// The primary install root's absolute path.  Canonicalized states
	/// always have exactly one.
	pub fn primary_root(&self) -> Result<&str>
	{
		self.install_roots.iter()
				.find(|r| r.role == RootRole::Primary)
				.map(|r| r.path_abs.as_str())
				.ok_or_else(|| StateErr::PrimaryRoot.into())
	}

	/// All files across all components, in (component, file) canonical
	/// order.  The flattened iteration verify and uninstall walk.
	pub fn files(&self) -> impl Iterator<Item = (&StateComponent, &StateFile)>
	{
		self.components.iter()
				.flat_map(|c| c.files.iter().map(move |f| (c, f)))
	}


	/// Canonicalize in place and enforce every invariant.  Load and
	/// save both funnel through here, as does anything that edits a
	/// state by hand.
	pub fn canonicalize(&mut self) -> Result<()>
	{
		use StateErr as SE;
		use crate::paths;

		// Exactly one primary root.
		let nprim = self.install_roots.iter()
				.filter(|r| r.role == RootRole::Primary).count();
		if nprim != 1 { Err(SE::PrimaryRoot)? }

		// Stringly fields must be printable ASCII.
		for s in [self.product_id.as_str(),
				self.product_version.as_str(),
				self.build_channel.as_str(), self.platform.as_str()]
		{
			if !printable(s) { Err(SE::BadString(s.to_string()))? }
		}

		let nroots = self.install_roots.len() as u32;

		// Per-component ordering and path checks.
		for c in &mut self.components
		{
			if !printable(&c.id) { Err(SE::BadString(c.id.clone()))? }

			c.registrations.sort_unstable();
			c.markers.sort_unstable();

			for f in &mut c.files
			{
				if f.root_index >= nroots
				{ Err(SE::BadRootIndex(f.root_index))? }

				let canon = paths::canon_rel(&f.rel_path).map_err(|_|
						SE::BadPath(f.rel_path.clone()))?;
				if canon != f.rel_path || !printable(&f.rel_path)
				{ Err(SE::BadPath(f.rel_path.clone()))? }
			}
			c.files.sort_unstable_by(|a, b|
					(a.root_index, a.rel_path.as_str())
						.cmp(&(b.root_index, b.rel_path.as_str())));
		}
		self.components.sort_unstable_by(|a, b| a.id.cmp(&b.id));

		// Uniqueness: component ids, and (root, path) across all
		// components.
		let mut cseen = std::collections::HashSet::new();
		let mut fseen = std::collections::HashSet::new();
		for c in &self.components
		{
			if !cseen.insert(c.id.as_str())
			{ Err(SE::DupComponent(c.id.clone()))? }
			for f in &c.files
			{
				if !fseen.insert((f.root_index, f.rel_path.as_str()))
				{ Err(SE::DupFile(f.root_index, f.rel_path.clone()))? }
			}
		}

		Ok(())
	}


	/// Drop a set of components (uninstall reconciliation).  Everything
	/// else stays put.
	pub fn remove_components(&mut self, ids: &[String])
	{
		self.components.retain(|c| !ids.iter().any(|id| *id == c.id));
	}

	/// Replace-or-add components (install/upgrade/repair
	/// reconciliation).  Instance id and everything not named stays.
	pub fn upsert_components(&mut self, comps: Vec<StateComponent>)
	{
		for nc in comps
		{
			match self.components.iter_mut().find(|c| c.id == nc.id)
			{
				Some(c) => *c = nc,
				None => self.components.push(nc),
			}
		}
	}


	/*
	 * Serialization
	 */

	pub fn to_bytes(&mut self) -> Result<Vec<u8>>
	{
		self.canonicalize()?;

		let mut root = Vec::new();
		tlv::put_u32(&mut root, T_ROOT_VERSION, STATE_VERSION as u32);
		tlv::put_str(&mut root, T_PRODUCT_ID, &self.product_id);
		tlv::put_str(&mut root, T_PRODUCT_VERSION,
				self.product_version.as_str());
		tlv::put_str(&mut root, T_BUILD_CHANNEL, &self.build_channel);
		tlv::put_u64(&mut root, T_INSTALL_INSTANCE_ID,
				self.install_instance_id);
		tlv::put_str(&mut root, T_PLATFORM, &self.platform);
		tlv::put_u8(&mut root, T_SCOPE, self.scope.to_u8());

		// Compat single-root string, then the full items.
		if let Ok(p) = self.primary_root()
		{
			let p = p.to_string();
			tlv::put_str(&mut root, T_INSTALL_ROOT_COMPAT, &p);
		}
		for ir in &self.install_roots
		{
			let mut b = Vec::new();
			tlv::put_u32(&mut b, T_IR_VERSION, 1);
			tlv::put_u8(&mut b, T_IR_ROLE, ir.role.to_u8());
			tlv::put_str(&mut b, T_IR_PATH, &ir.path_abs);
			tlv::put(&mut root, T_INSTALL_ROOT_ITEM, &b);
		}

		tlv::put_u64(&mut root, T_MANIFEST_DIGEST64,
				self.manifest_digest64);
		tlv::put_u64(&mut root, T_RESOLVED_DIGEST64,
				self.resolved_digest64);
		tlv::put_u64(&mut root, T_PLAN_DIGEST64, self.plan_digest64);
		tlv::put_u8(&mut root, T_LAST_OPERATION,
				self.last_operation.to_u8());
		tlv::put_u64(&mut root, T_LAST_JOURNAL_ID, self.last_journal_id);
		if let Some(d) = self.last_audit_log_digest64
		{
			tlv::put_u64(&mut root, T_LAST_AUDIT_LOG_DIGEST64, d);
		}

		for c in &self.components
		{
			let mut cb = Vec::new();
			tlv::put_u32(&mut cb, T_C_VERSION, 1);
			tlv::put_str(&mut cb, T_C_ID, &c.id);
			tlv::put_str(&mut cb, T_C_VERSTR, c.version.as_str());
			tlv::put_u8(&mut cb, T_C_KIND, c.kind.to_u8());
			tlv::put_u64(&mut cb, T_C_INSTALL_TIME_POLICY,
					c.install_time_policy);
			for r in &c.registrations
			{
				tlv::put_str(&mut cb, T_C_REGISTRATION, r);
			}
			for m in &c.markers
			{
				tlv::put_str(&mut cb, T_C_MARKER, m);
			}
			for f in &c.files
			{
				let mut fb = Vec::new();
				tlv::put_u32(&mut fb, T_F_VERSION, 2);
				tlv::put_u32(&mut fb, T_F_ROOT_INDEX, f.root_index);
				tlv::put_str(&mut fb, T_F_PATH, &f.rel_path);
				tlv::put_u64(&mut fb, T_F_DIGEST64, f.digest64);
				tlv::put_u64(&mut fb, T_F_SIZE, f.size);
				tlv::put_u8(&mut fb, T_F_OWNERSHIP, f.ownership.to_u8());
				tlv::put_u32(&mut fb, T_F_FLAGS, f.flags);
				tlv::put(&mut fb, T_F_SHA256, f.sha256.as_bytes());
				tlv::put(&mut cb, T_FILE, &fb);
			}
			tlv::put(&mut root, T_COMPONENT, &cb);
		}

		let mut payload = Vec::new();
		tlv::put(&mut payload, T_ROOT, &root);
		Ok(framed::wrap(MAGIC, STATE_VERSION, &payload))
	}


	/// Atomic save: canonicalize, serialize, tmp + rename.
	pub fn save_file(&mut self, path: &Path) -> Result<()>
	{
		let bytes = self.to_bytes()?;

		let tmp = path.with_extension("dsustate.tmp");
		std::fs::write(&tmp, &bytes).map_err(StateErr::IO)?;
		match crate::platform::rename(&tmp, path, true)
		{
			Ok(_) => Ok(()),
			Err(e) => {
				// Don't leave the tmp corpse behind.
				let _ = std::fs::remove_file(&tmp);
				Err(StateErr::IO(e).into())
			},
		}
	}


	pub fn from_bytes(bytes: &[u8]) -> Result<Self>
	{
		let (version, payload) = framed::unwrap(MAGIC, "state", bytes)?;
		if version == 0 || version > STATE_VERSION
		{ Err(StateErr::Version(version))? }

		let mut st = State::default();

		let mut w = tlv::Walker::new(payload);
		let root = match w.next()? {
			Some(t) if t.tag == T_ROOT => t,
			_ => return Err(SetupError::integrity("state: missing root")),
		};

		let mut compat_root: Option<String> = None;

		let mut rw = tlv::Walker::new(root.value);
		while let Some(t) = rw.next()?
		{
			match t.tag
			{
				T_ROOT_VERSION => {
					let v = t.as_u32()?;
					if v == 0 || v > STATE_VERSION as u32
					{ Err(StateErr::Version(v as u16))? }
				},
				T_PRODUCT_ID => st.product_id = t.as_string()?,
				T_PRODUCT_VERSION =>
						st.product_version = Version(t.as_string()?),
				T_BUILD_CHANNEL => st.build_channel = t.as_string()?,
				T_INSTALL_INSTANCE_ID =>
						st.install_instance_id = t.as_u64()?,
				T_PLATFORM => st.platform = t.as_string()?,
				T_SCOPE => st.scope = Scope::from_u8(t.as_u8()?)
						.ok_or_else(|| SetupError::parse(
							"state: bad scope byte"))?,
				T_INSTALL_ROOT_COMPAT =>
						compat_root = Some(t.as_string()?),
				T_INSTALL_ROOT_ITEM =>
						st.install_roots.push(parse_root_item(t.value)?),
				T_MANIFEST_DIGEST64 =>
						st.manifest_digest64 = t.as_u64()?,
				T_RESOLVED_DIGEST64 =>
						st.resolved_digest64 = t.as_u64()?,
				T_PLAN_DIGEST64 => st.plan_digest64 = t.as_u64()?,
				T_LAST_OPERATION =>
						st.last_operation = Operation::from_u8(t.as_u8()?)
							.ok_or_else(|| SetupError::parse(
								"state: bad operation byte"))?,
				T_LAST_JOURNAL_ID => st.last_journal_id = t.as_u64()?,
				T_LAST_AUDIT_LOG_DIGEST64 =>
						st.last_audit_log_digest64 = Some(t.as_u64()?),
				T_COMPONENT =>
						st.components.push(parse_component(t.value)?),
				_ => (),
			}
		}

		// Version-1 files only carried the compat root.
		if st.install_roots.is_empty()
		{
			if let Some(p) = compat_root
			{
				st.install_roots.push(StateInstallRoot {
						role: RootRole::Primary, path_abs: p });
			}
		}

		st.canonicalize()?;
		Ok(st)
	}

	pub fn load_file(path: &Path) -> Result<Self>
	{
		let bytes = std::fs::read(path).map_err(StateErr::IO)?;
		Self::from_bytes(&bytes)
	}
}


fn parse_root_item(buf: &[u8]) -> Result<StateInstallRoot>
{
	let mut role = RootRole::Primary;
	let mut path = None;

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_IR_ROLE => role = RootRole::from_u8(t.as_u8()?)
					.ok_or_else(|| SetupError::parse(
						"state: bad root role"))?,
			T_IR_PATH => path = Some(t.as_string()?),
			_ => (),
		}
	}

	Ok(StateInstallRoot {
		role,
		path_abs: path.ok_or_else(||
				SetupError::parse("state: root item without path"))?,
	})
}

fn parse_file(buf: &[u8]) -> Result<StateFile>
{
	let mut f = StateFile::default();

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_F_ROOT_INDEX => f.root_index = t.as_u32()?,
			T_F_PATH => f.rel_path = t.as_string()?,
			T_F_DIGEST64 => f.digest64 = t.as_u64()?,
			T_F_SIZE => f.size = t.as_u64()?,
			T_F_OWNERSHIP =>
					f.ownership = Ownership::from_u8(t.as_u8()?)
						.ok_or_else(|| SetupError::parse(
							"state: bad ownership byte"))?,
			T_F_FLAGS => f.flags = t.as_u32()?,
			T_F_SHA256 => f.sha256 = Sha256Hash::from_slice(t.value)
					.ok_or_else(|| SetupError::parse(
						"state: bad sha256 length"))?,
			_ => (),
		}
	}

	if f.rel_path.is_empty()
	{ return Err(SetupError::parse("state: file without path")); }
	Ok(f)
}

fn parse_component(buf: &[u8]) -> Result<StateComponent>
{
	let mut c = StateComponent::default();

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_C_ID => c.id = t.as_string()?,
			T_C_VERSTR => c.version = Version(t.as_string()?),
			T_C_KIND => c.kind = ComponentKind::from_u8(t.as_u8()?)
					.ok_or_else(|| SetupError::parse(
						"state: bad component kind"))?,
			T_C_INSTALL_TIME_POLICY =>
					c.install_time_policy = t.as_u64()?,
			T_C_REGISTRATION => c.registrations.push(t.as_string()?),
			T_C_MARKER => c.markers.push(t.as_string()?),
			T_FILE => c.files.push(parse_file(t.value)?),
			_ => (),
		}
	}

	if c.id.is_empty()
	{ return Err(SetupError::parse("state: component without id")); }
	Ok(c)
}
