//! Stage and verify phases.
//!
//! Staging lays the payload bytes out under the txn root in a tree
//! mirroring the final targets, hashing as it copies.  Verify then
//! re-reads everything off disk and checks the world is still the one
//! the plan describes before a single target byte moves.

use std::io::{Read as _, Write as _};
use std::path::Path;

use crate::audit::{events, severity, Phase};
use crate::codec::Digest64;
use crate::config::Failpoint;
use crate::journal::{roots, Entry, EntryType};
use crate::plan::Plan;
use crate::platform;
use crate::status::{Result, SetupError, Status};
use crate::util::hash::{Sha256Hash, HASH_BUFSZ};
use crate::util::path_join;

use super::{staged_rel, TxnResult, Work, FREE_SPACE_HEADROOM};


/// Copy a payload file into the staging tree, hashing on the way
/// through.  Returns (sha256, digest64, size).
fn copy_hashed(src: &Path, dst: &Path)
		-> Result<(Sha256Hash, u64, u64)>
{
	use sha2::{Digest as _, Sha256};

	let mut fin = std::fs::File::open(src).map_err(|e|
			SetupError::io(format!("payload {}: {e}", src.display())))?;
	let mut fout = std::fs::File::create(dst).map_err(|e|
			SetupError::io(format!("stage {}: {e}", dst.display())))?;

	let mut sha = Sha256::new();
	let mut d64 = Digest64::new();
	let mut buf = [0u8; HASH_BUFSZ];
	let mut total = 0u64;
	loop
	{
		let n = fin.read(&mut buf)?;
		if n == 0 { break; }
		sha.update(&buf[..n]);
		d64.update(&buf[..n]);
		fout.write_all(&buf[..n])?;
		total += n as u64;
	}
	fout.sync_data()?;

	let hash: [u8; 32] = sha.finalize().into();
	Ok((hash.into(), d64.finish(), total))
}


/// Phase 1: stage.
pub(super) fn stage(work: &mut Work, plan: &Plan,
		result: &mut TxnResult)
		-> Result<()>
{
	// Directory skeleton under staged/, journaled then made.
	for dir in &plan.dirs
	{
		let rel = staged_rel(dir);
		work.journal_entry(EntryType::CreateDir, &Entry {
			target_root: roots::TXN,
			target_path: rel.clone(),
			..Entry::default()
		})?;
		let abs = work.roots.resolve(roots::TXN as u32, &rel)?;
		platform::mkdir_p(&abs)?;
	}

	// The files.
	for f in &plan.files
	{
		let rel = staged_rel(&f.rel_target);

		// Journal first.  The rollback of a copy is deleting the
		// copy; source fields are informational.
		work.journal_entry(EntryType::CopyFile, &Entry {
			target_root: roots::TXN,
			target_path: rel.clone(),
			source_root: roots::TXN,
			source_path: format!("{}/{}", f.container_path,
					f.member_path),
			rollback_root: roots::TXN,
			rollback_path: rel.clone(),
			..Entry::default()
		})?;

		let src = path_join(&plan.payload_base,
				format!("{}/{}", f.container_path, f.member_path));
		let dst = work.roots.resolve(roots::TXN as u32, &rel)?;
		let (sha, d64, size) = copy_hashed(&src, &dst)?;

		if size != f.size
		{
			return Err(SetupError::new(Status::IntegrityError,
					format!("payload '{}' is {size} bytes, manifest \
							says {}", f.rel_target, f.size)));
		}
		if sha != f.sha256
		{
			return Err(SetupError::new(Status::IntegrityError,
					format!("payload '{}' hash mismatch: expected {} \
							got {sha}", f.rel_target, f.sha256)));
		}

		work.content64.insert(f.rel_target.clone(), d64);
		result.staged_file_count += 1;
	}

	work.hit(Failpoint::AfterStageWrite)?;

	work.ctx.audit_mut().emit(Phase::Stage, events::TXN_STAGED,
			severity::INFO,
			format!("{} files staged", result.staged_file_count));
	Ok(())
}


/// Phase 2: verify.  Nothing in here mutates anything.
pub(super) fn verify(work: &mut Work, plan: &Plan,
		_result: &mut TxnResult)
		-> Result<()>
{
	use crate::util::hash::sha256_file;

	// Staged bytes, re-read from disk.
	for f in &plan.files
	{
		let rel = staged_rel(&f.rel_target);
		let abs = work.roots.resolve(roots::TXN as u32, &rel)?;
		let (sha, size) = sha256_file(&abs).map_err(|e|
				SetupError::io(format!("verify {}: {e}", f.rel_target)))?;
		if size != f.size || sha != f.sha256
		{
			return Err(SetupError::new(Status::IntegrityError,
					format!("staged '{}' fails verification",
						f.rel_target)));
		}
	}

	// Enough room left?  The commit itself is renames, but backups
	// and the state file still want real space, so demand the payload
	// plus headroom.
	let free = platform::disk_free_bytes(
			Path::new(&work.install_root_abs))?;
	let need = plan.total_payload_size() + FREE_SPACE_HEADROOM;
	if free < need
	{
		return Err(SetupError::io(format!(
				"not enough free space: {free} < {need}")));
	}

	// No symlink may sit anywhere on the paths we're about to write
	// through.  resolve() refuses those for us.
	for dir in &plan.dirs
	{
		work.roots.resolve(roots::INSTALL as u32, dir)?;
	}
	for f in &plan.files
	{
		work.roots.resolve(roots::INSTALL as u32, &f.rel_target)?;
	}

	work.hit(Failpoint::AfterVerify)?;

	work.ctx.audit_mut().emit(Phase::Verify, events::TXN_VERIFIED,
			severity::INFO, "stage verified");
	Ok(())
}
