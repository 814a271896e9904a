//! Platform filesystem primitives.
//!
//! This is the only module that talks to the OS.  Everything above goes
//! through these wrappers, which are mostly thin, but carry the couple
//! behaviors we insist on everywhere: stat'ing never follows symlinks,
//! directory listings come back sorted, and renames only fall back to
//! copy+unlink for single files.

use std::fs;
use std::io::Error as IOErr;
use std::path::{Path, PathBuf};


/// What a path is, without following symlinks to find out.
#[derive(Debug, Default, Copy, Clone)]
pub struct PathInfo
{
	pub exists: bool,
	pub is_dir: bool,
	pub is_symlink: bool,
}


/// lstat-flavored existence check.
///
/// It seems like Path::exists() would do this.  However, if the path is
/// a symlink, it'll follow it, and if it points nowhere, it "doesn't
/// exist".  For our uses that's exactly wrong; a dangling symlink is
/// still a thing sitting where we might want to write.  So go to
/// symlink_metadata for all of it.
pub fn path_info(p: &Path) -> PathInfo
{
	match fs::symlink_metadata(p)
	{
		Err(_) => PathInfo::default(),
		Ok(md) => PathInfo {
			exists: true,
			is_dir: md.is_dir(),
			is_symlink: md.file_type().is_symlink(),
		},
	}
}


/// mkdir -p
pub fn mkdir_p(p: &Path) -> Result<(), IOErr>
{
	fs::create_dir_all(p)
}


/// Remove a directory, only if it's empty.  "Wasn't empty" comes back
/// as the error it is; callers that don't care can ignore it.
pub fn rmdir_empty(p: &Path) -> Result<(), IOErr>
{
	fs::remove_dir(p)
}


/// Remove a file (or symlink).
pub fn remove_file(p: &Path) -> Result<(), IOErr>
{
	fs::remove_file(p)
}


/// Remove a whole tree.  Only the transaction engine uses this, and
/// only on trees it created under the txn root.
pub fn remove_tree(p: &Path) -> Result<(), IOErr>
{
	fs::remove_dir_all(p)
}


/// Rename src onto dst.
///
/// With `replace`, an existing dst file gets replaced (that's the
/// native rename(2) behavior); without it, an existing dst is an error.
/// Same-volume moves are atomic.  If the OS refuses because dst lives
/// on a different volume, we fall back to copy+unlink, but only for
/// regular files; directories never fall back, cross-device trees are
/// the caller's planning failure.
pub fn rename(src: &Path, dst: &Path, replace: bool) -> Result<(), IOErr>
{
	use std::io::ErrorKind;

	if !replace && path_info(dst).exists
	{
		let dp = dst.display();
		return Err(IOErr::new(ErrorKind::AlreadyExists,
				format!("rename target exists: {dp}")));
	}

	match fs::rename(src, dst)
	{
		Ok(_) => return Ok(()),
		Err(e) =>
		{
			// CrossesDevices is still unstable as a Kind, so sniff the
			// raw errno.
			let exdev = e.raw_os_error() == Some(libc::EXDEV);
			if !exdev { return Err(e); }
		},
	}

	// Cross-volume.  Files only.
	if path_info(src).is_dir
	{
		let sp = src.display();
		return Err(IOErr::new(ErrorKind::Unsupported,
				format!("cross-volume dir rename: {sp}")));
	}
	fs::copy(src, dst)?;
	fs::remove_file(src)?;
	Ok(())
}


/// List a directory's entry names, sorted ascending by raw bytes, so
/// every host walks a tree in the same order.
pub fn list_dir(p: &Path) -> Result<Vec<std::ffi::OsString>, IOErr>
{
	let mut names: Vec<_> = fs::read_dir(p)?
			.map(|de| de.map(|d| d.file_name()))
			.collect::<Result<_, _>>()?;
	names.sort_unstable_by(|a, b|
			a.as_encoded_bytes().cmp(b.as_encoded_bytes()));
	Ok(names)
}


/// Free bytes on the volume holding `p`.
#[cfg(unix)]
pub fn disk_free_bytes(p: &Path) -> Result<u64, IOErr>
{
	use std::ffi::CString;
	use std::os::unix::ffi::OsStrExt as _;

	let cp = CString::new(p.as_os_str().as_bytes())?;
	let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
	let ret = unsafe { libc::statvfs(cp.as_ptr(), &mut st) };
	if ret != 0 { return Err(IOErr::last_os_error()); }

	// f_bavail is what unprivileged writers actually get.
	Ok((st.f_bavail as u64).saturating_mul(st.f_frsize as u64))
}

#[cfg(not(unix))]
pub fn disk_free_bytes(_p: &Path) -> Result<u64, IOErr>
{
	// Windows would go through GetDiskFreeSpaceExW here; unbuilt until
	// somebody targets it.
	Ok(u64::MAX)
}


/// Current working directory.
pub fn cwd() -> Result<PathBuf, IOErr>
{
	std::env::current_dir()
}
