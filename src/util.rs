//! Misc util funcs

/// SHA256 hashing utils
pub mod hash;



use std::path::{Path, PathBuf};

/// Append paths.
///
/// It's not trivial to just use Path::join() because it treats join'ing
/// an "absolute" path as _replacing_ the base, not appending to.
/// Presumably there are usecases where that's the sensible behavior.
/// For us, though, it pretty much never is; install roots act as a sort
/// of "chroot" for everything the engine touches.  So to avoid repeating
/// ourselves too often, just make a util func for it.
pub(crate) fn path_join(base: impl AsRef<Path>, sub: impl AsRef<Path>)
		-> PathBuf
{
	// So for our subpath, strip off the leading absoluteness if it has
	// it.
	let sub = match sub.as_ref().strip_prefix("/") {
		Ok(x) => x,
		Err(_) => sub.as_ref(),
	};
	// Then .join will do what we want.
	base.as_ref().join(sub)
}


/// Pluralize for a number
pub(crate) fn plural(n: usize) -> &'static str
{
	if n == 1 { "" } else { "s" }
}


/// Render a u64 as the fixed-width lowercase hex we use for txn-root
/// names and id display.
pub(crate) fn hex16(v: u64) -> String
{
	format!("{v:016x}")
}



#[cfg(test)]
mod tests
{
	#[test]
	fn path_join()
	{
		use super::path_join;
		use std::path::PathBuf;

		let j = path_join("/base", "/abs/sub");
		assert_eq!(j, PathBuf::from("/base/abs/sub"));
		let j = path_join("/base", "rel/sub");
		assert_eq!(j, PathBuf::from("/base/rel/sub"));
	}

	#[test]
	fn hex16()
	{
		assert_eq!(super::hex16(0xdead), "000000000000dead");
		assert_eq!(super::hex16(u64::MAX), "ffffffffffffffff");
	}
}
