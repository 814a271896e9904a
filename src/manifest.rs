//! The declarative product manifest.
//!
//! A manifest says what a product *is*: its components, their payload
//! files, the dependency edges between them, and where each scope and
//! platform of it may be installed.  It's read-only after parsing;
//! everything downstream (resolver, planner, transaction) treats it as
//! gospel and never writes it back.

/// Framed-TLV load/save
mod file;
pub use file::{load_file, write_file, MANIFEST_VERSION};

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use crate::status::{SetupError, Status};
use crate::util::hash::Sha256Hash;


/// Install scopes.  Which one's requested selects which install_root
/// declaration applies.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Scope
{
	System,
	User,
	#[default]
	Portable,
}

impl Scope
{
	pub(crate) fn to_u8(self) -> u8
	{
		match self { Scope::System => 0, Scope::User => 1,
				Scope::Portable => 2 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		match v {
			0 => Some(Scope::System),
			1 => Some(Scope::User),
			2 => Some(Scope::Portable),
			_ => None,
		}
	}
}


/// Component kinds.  Mostly informational, but uninstall/repair care a
/// little.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ComponentKind
{
	#[default]
	Core,
	Optional,
	Shared,
}

impl ComponentKind
{
	pub(crate) fn to_u8(self) -> u8
	{
		use ComponentKind as CK;
		match self { CK::Core => 0, CK::Optional => 1, CK::Shared => 2 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		use ComponentKind as CK;
		match v {
			0 => Some(CK::Core), 1 => Some(CK::Optional),
			2 => Some(CK::Shared),
			_ => None,
		}
	}
}


/// Component flag bits.
pub mod flags
{
	/// Selected automatically on a plain install.
	pub const DEFAULT_SELECTED: u32 = 1 << 0;
}


/// A dotted-numeric version string, e.g. "1.0.0".
///
/// Kept as the literal string (that's what files carry), compared
/// segment-wise numerically.  "1.2" and "1.2.0" order equal but are not
/// the same string, so Eq stays string-y and ordering gets its own
/// method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl fmt::Display for Version
{
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
	{ write!(f, "{}", self.0) }
}

impl From<&str> for Version
{
	fn from(s: &str) -> Self { Self(s.to_string()) }
}

impl Version
{
	pub fn as_str(&self) -> &str { &self.0 }

	/// Dotted-numeric comparison.  Each '.'-segment compares by its
	/// numeric prefix first, then byte-wise on whatever trails the
	/// digits; missing segments count as 0.
	pub fn cmp_dotted(&self, other: &Self) -> Ordering
	{
		let mut a = self.0.split('.');
		let mut b = other.0.split('.');
		loop
		{
			let (sa, sb) = (a.next(), b.next());
			if sa.is_none() && sb.is_none() { return Ordering::Equal; }
			let sa = sa.unwrap_or("0");
			let sb = sb.unwrap_or("0");

			let c = seg_cmp(sa, sb);
			if c != Ordering::Equal { return c; }
		}
	}
}

fn seg_cmp(a: &str, b: &str) -> Ordering
{
	fn split_num(s: &str) -> (u64, &str)
	{
		let digits = s.len() - s.trim_start_matches(|c: char|
				c.is_ascii_digit()).len();
		let n = s[..digits].parse::<u64>().unwrap_or(0);
		(n, &s[digits..])
	}

	let (na, ra) = split_num(a);
	let (nb, rb) = split_num(b);
	na.cmp(&nb).then_with(|| ra.cmp(rb))
}


/// Payload kinds.  The core handles filesets; archives are declared but
/// expanded elsewhere.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum PayloadKind
{
	#[default]
	Fileset,
	Archive,
}

impl PayloadKind
{
	pub(crate) fn to_u8(self) -> u8
	{
		match self { PayloadKind::Fileset => 0, PayloadKind::Archive => 1 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		match v {
			0 => Some(PayloadKind::Fileset),
			1 => Some(PayloadKind::Archive),
			_ => None,
		}
	}
}


/// One payload file of a component: where its bytes live relative to
/// the manifest, and what they must hash to.
///
/// For filesets the member path doubles as the install-relative target
/// path.
#[derive(Debug, Clone)]
pub struct Payload
{
	pub kind: PayloadKind,
	pub container_path: String,
	pub member_path: String,
	pub sha256: Sha256Hash,
	pub size: u64,
}


/// Declarative post-placement actions; these become the registrations
/// and markers recorded in installed state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActionKind
{
	Register,
	Marker,
}

impl ActionKind
{
	pub(crate) fn to_u8(self) -> u8
	{
		match self { ActionKind::Register => 0, ActionKind::Marker => 1 }
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		match v {
			0 => Some(ActionKind::Register),
			1 => Some(ActionKind::Marker),
			_ => None,
		}
	}
}

#[derive(Debug, Clone)]
pub struct Action
{
	pub kind: ActionKind,
	pub arg: String,
}


/// A dependency edge.
#[derive(Debug, Clone)]
pub struct Dep
{
	pub id: String,

	/// Version constraint; empty means "any".  Kept verbatim.
	pub constraint: String,
}


/// One component.
#[derive(Debug, Clone, Default)]
pub struct Component
{
	pub id: String,

	/// Defaults to the product version when absent.
	pub version: Option<Version>,

	pub kind: ComponentKind,
	pub flags: u32,
	pub deps: Vec<Dep>,
	pub conflicts: Vec<String>,
	pub payloads: Vec<Payload>,
	pub actions: Vec<Action>,
}

impl Component
{
	pub fn default_selected(&self) -> bool
	{
		self.flags & flags::DEFAULT_SELECTED != 0
	}
}


/// An install-root declaration: this (scope, platform) pair installs
/// here.
#[derive(Debug, Clone)]
pub struct InstallRoot
{
	pub scope: Scope,
	pub platform: String,
	pub path: String,
}


/// The manifest proper.
#[derive(Debug, Clone, Default)]
pub struct Manifest
{
	pub product_id: String,
	pub product_version: Version,
	pub build_channel: String,
	pub platform_targets: Vec<String>,
	pub install_roots: Vec<InstallRoot>,
	pub components: Vec<Component>,

	/// digest64 of the canonical serialized payload; filled in by
	/// load/save, zero on a hand-built manifest until saved.
	pub digest64: u64,
}


impl Manifest
{
	/// The version a component actually is: its own, or the product's.
	pub fn component_version<'a>(&'a self, c: &'a Component)
			-> &'a Version
	{
		c.version.as_ref().unwrap_or(&self.product_version)
	}

	pub fn component(&self, id: &str) -> Option<&Component>
	{
		self.components.iter().find(|c| c.id == id)
	}


	/// Structural validation; called by the loader, and by anybody
	/// building one programmatically before they serialize it.
	pub fn validate(&self) -> Result<(), SetupError>
	{
		use crate::paths;

		let perr = |m: String| SetupError::new(Status::ParseError, m);

		if self.product_id.is_empty()
		{ return Err(perr("manifest: empty product_id".into())); }
		if self.product_version.as_str().is_empty()
		{ return Err(perr("manifest: empty product_version".into())); }
		if self.install_roots.is_empty()
		{ return Err(perr("manifest: no install roots".into())); }

		// Unique component ids
		let mut seen = HashSet::new();
		for c in &self.components
		{
			if c.id.is_empty()
			{ return Err(perr("manifest: empty component id".into())); }
			if !seen.insert(c.id.as_str())
			{
				return Err(perr(format!(
						"manifest: duplicate component '{}'", c.id)));
			}
		}

		// Dep/conflict targets must exist; a manifest pointing at
		// components it doesn't declare is malformed, not merely
		// unresolvable.
		for c in &self.components
		{
			for d in &c.deps
			{
				if !seen.contains(d.id.as_str())
				{
					return Err(perr(format!(
							"manifest: '{}' depends on unknown '{}'",
							c.id, d.id)));
				}
			}
			for cf in &c.conflicts
			{
				if !seen.contains(cf.as_str())
				{
					return Err(perr(format!(
							"manifest: '{}' conflicts with unknown '{}'",
							c.id, cf)));
				}
			}
		}

		// Payload paths must be canonical relatives
		for c in &self.components
		{
			for p in &c.payloads
			{
				for rel in [&p.container_path, &p.member_path]
				{
					if paths::canon_rel(rel).map(|cn| &cn != rel)
							.unwrap_or(true)
					{
						return Err(perr(format!(
								"manifest: non-canonical payload path \
								'{rel}' in '{}'", c.id)));
					}
				}
			}
		}

		Ok(())
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn version_compare()
	{
		use std::cmp::Ordering::*;
		let v = |s: &str| Version::from(s);

		assert_eq!(v("1.0.0").cmp_dotted(&v("1.0.0")), Equal);
		assert_eq!(v("1.0").cmp_dotted(&v("1.0.0")), Equal);
		assert_eq!(v("1.2.0").cmp_dotted(&v("1.10.0")), Less);
		assert_eq!(v("2.0.0").cmp_dotted(&v("1.9.9")), Greater);
		assert_eq!(v("1.0.0").cmp_dotted(&v("1.0.1")), Less);
		// Trailing junk orders byte-wise after the number
		assert_eq!(v("1.0a").cmp_dotted(&v("1.0b")), Less);
	}

	fn mini_manifest() -> Manifest
	{
		Manifest {
			product_id: "prod".into(),
			product_version: "1.0.0".into(),
			install_roots: vec![InstallRoot {
				scope: Scope::Portable,
				platform: "linux-x86_64".into(),
				path: "install".into(),
			}],
			platform_targets: vec!["linux-x86_64".into()],
			components: vec![Component {
				id: "core".into(),
				..Component::default()
			}],
			..Manifest::default()
		}
	}

	#[test]
	fn validate_catches()
	{
		let ok = mini_manifest();
		ok.validate().unwrap();

		let mut dup = ok.clone();
		dup.components.push(Component {
				id: "core".into(), ..Component::default() });
		assert!(dup.validate().is_err());

		let mut baddep = ok.clone();
		baddep.components[0].deps.push(Dep {
				id: "ghost".into(), constraint: String::new() });
		assert!(baddep.validate().is_err());

		let mut badpath = ok.clone();
		badpath.components[0].payloads.push(Payload {
				kind: PayloadKind::Fileset,
				container_path: "payload".into(),
				member_path: "../escape.txt".into(),
				sha256: Sha256Hash::default(),
				size: 0 });
		assert!(badpath.validate().is_err());
	}

	#[test]
	fn component_version_fallback()
	{
		let mut m = mini_manifest();
		assert_eq!(m.component_version(&m.components[0]).as_str(),
				"1.0.0");
		m.components[0].version = Some("3.1".into());
		assert_eq!(m.component_version(&m.components[0]).as_str(), "3.1");
	}
}
