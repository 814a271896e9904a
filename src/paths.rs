//! Path canonicalization and root scoping.
//!
//! Everything the engine reads or writes is named by either an allowed
//! root (absolute, canonical) or a relative path that resolves under
//! one.  This module is the gatekeeper: it folds separators, collapses
//! dots, and flatly refuses anything that could escape a root.  The
//! posture is "reject", not "fix up"; a manifest with `..` in it is not
//! a manifest we want to be clever about.
//!
//! Canonical form: '/' separators only, no '.' or '..' segments, no
//! trailing slash, no control bytes.  Absolute forms additionally allow
//! a lowercased drive prefix (`c:/`), a UNC prefix (`//host/share`), or
//! a POSIX root.

use std::path::PathBuf;

use crate::platform;
use crate::status::{SetupError, Status};


/// The ways a path can fail inspection.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum PathErr
{
	#[error("Empty path")]
	Empty,

	#[error("Absolute path not allowed here: '{0}'")]
	AbsoluteNotAllowed(String),

	#[error("Relative path not allowed here: '{0}'")]
	RelativeNotAllowed(String),

	#[error("Parent traversal ('..') in '{0}'")]
	ParentEscape(String),

	#[error("Forbidden byte in path '{0}'")]
	ForbiddenByte(String),

	#[error("No such root index {0}")]
	BadRootIndex(u32),

	#[error("Symlink in path prefix: '{}'", .0.display())]
	SymlinkPrefix(PathBuf),

	#[error("Path escapes its root: '{0}'")]
	RootEscape(String),
}

impl From<PathErr> for SetupError
{
	fn from(e: PathErr) -> Self
	{
		let status = match &e {
			PathErr::SymlinkPrefix(_) => Status::IntegrityError,
			_ => Status::InvalidArgs,
		};
		SetupError::new(status, e.to_string())
	}
}


fn is_alpha(c: u8) -> bool
{
	c.is_ascii_lowercase() || c.is_ascii_uppercase()
}

/// `c:/...` or `c:\...`
fn is_abs_drive(p: &[u8]) -> bool
{
	p.len() >= 3 && is_alpha(p[0]) && p[1] == b':'
			&& (p[2] == b'/' || p[2] == b'\\')
}

/// `\\host\share` / `//host/share`
fn is_abs_unc(p: &[u8]) -> bool
{
	p.len() >= 2
			&& (p[0] == b'/' || p[0] == b'\\')
			&& (p[1] == b'/' || p[1] == b'\\')
}

fn is_abs_posix(p: &[u8]) -> bool
{
	!p.is_empty() && (p[0] == b'/' || p[0] == b'\\') && !is_abs_unc(p)
}

pub(crate) fn is_absolute(p: &str) -> bool
{
	let b = p.as_bytes();
	is_abs_drive(b) || is_abs_unc(b) || is_abs_posix(b)
}


/// The workhorse.  `allow_absolute` decides whether root prefixes (and
/// the drive-letter colon) are acceptable.
fn canon(input: &str, allow_absolute: bool) -> Result<String, PathErr>
{
	use PathErr as PE;

	if input.is_empty() { return Err(PE::Empty); }
	let bytes = input.as_bytes();

	// Forbidden bytes first: control chars always; ':' only as the
	// drive-prefix colon of a genuinely absolute drive path.
	for (i, c) in bytes.iter().enumerate()
	{
		if *c < 0x20 { return Err(PE::ForbiddenByte(input.to_string())); }
		if *c == b':'
		{
			let drive_ok = allow_absolute && i == 1
					&& is_abs_drive(bytes);
			if !drive_ok
			{ return Err(PE::ForbiddenByte(input.to_string())); }
		}
	}

	if !allow_absolute && is_absolute(input)
	{ return Err(PE::AbsoluteNotAllowed(input.to_string())); }

	// Peel off the root prefix, if any.
	let mut out = String::with_capacity(input.len());
	let mut rest = input;
	let mut prefix_len = 0usize;
	if allow_absolute
	{
		if is_abs_drive(bytes)
		{
			out.push(bytes[0].to_ascii_lowercase() as char);
			out.push_str(":/");
			rest = &input[3..];
			prefix_len = 3;
		}
		else if is_abs_unc(bytes)
		{
			out.push_str("//");
			rest = &input[2..];
			prefix_len = 2;
		}
		else if is_abs_posix(bytes)
		{
			out.push('/');
			rest = &input[1..];
			prefix_len = 1;
		}
	}

	// Now fold the segments.
	for seg in rest.split(|c| c == '/' || c == '\\')
	{
		match seg
		{
			"" | "." => continue,
			".." => return Err(PE::ParentEscape(input.to_string())),
			s => {
				if out.len() > prefix_len { out.push('/'); }
				out.push_str(s);
			},
		}
	}

	if out.is_empty() { return Err(PE::Empty); }
	Ok(out)
}


/// Canonicalize a path that may be absolute (roots, join results).
pub fn canonicalize(path: &str) -> Result<String, PathErr>
{
	canon(path, true)
}

/// Canonicalize a root-relative path.  Absolute forms, drive colons and
/// `..` are all refused.
pub fn canon_rel(path: &str) -> Result<String, PathErr>
{
	canon(path, false)
}

/// Join then canonicalize.
pub fn path_join(a: &str, b: &str) -> Result<String, PathErr>
{
	canonicalize(&format!("{a}/{b}"))
}

/// Split a canonical path into (dir, base).  A bare name gets an empty
/// dir.
pub fn path_split(path: &str) -> (String, String)
{
	match path.rfind('/')
	{
		Some(ix) => (path[..ix].to_string(), path[ix + 1..].to_string()),
		None => (String::new(), path.to_string()),
	}
}


/// The set of allowed roots for one engine context.  Indexes into this
/// are what journal entries and installed-state files carry.
#[derive(Debug, Clone, Default)]
pub struct RootSet
{
	roots: Vec<String>,
}

impl RootSet
{
	pub fn new() -> Self { Self::default() }

	/// Add a root; it must canonicalize to an absolute path.  Returns
	/// the new root's index.
	pub fn add(&mut self, root: &str) -> Result<u32, PathErr>
	{
		let c = canonicalize(root)?;
		if !is_absolute(&c)
		{ return Err(PathErr::RelativeNotAllowed(root.to_string())); }
		self.roots.push(c);
		Ok((self.roots.len() - 1) as u32)
	}

	pub fn len(&self) -> usize { self.roots.len() }

	pub fn root(&self, ix: u32) -> Result<&str, PathErr>
	{
		self.roots.get(ix as usize)
				.map(|s| s.as_str())
				.ok_or(PathErr::BadRootIndex(ix))
	}

	/// Resolve `rel` under root `ix` into an absolute path, refusing
	/// absolute/traversal inputs and any existing symlink prefix.
	///
	/// The symlink walk only inspects prefixes that exist; a path three
	/// directories deeper than anything on disk is fine, we're about to
	/// create those directories ourselves.
	pub fn resolve(&self, ix: u32, rel: &str) -> Result<PathBuf, PathErr>
	{
		let root = self.root(ix)?;
		let rel = canon_rel(rel)?;

		// Walk down from the root, checking each existing step.
		let mut cur = PathBuf::from(root);
		for seg in rel.split('/')
		{
			cur.push(seg);
			let info = platform::path_info(&cur);
			if !info.exists { break; }
			if info.is_symlink
			{ return Err(PathErr::SymlinkPrefix(cur)); }
		}

		Ok(crate::util::path_join(root, &rel))
	}
}
