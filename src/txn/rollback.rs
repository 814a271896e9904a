//! Rollback: replay the journal backwards.
//!
//! The journal on disk is the truth; whatever the in-memory engine
//! thought it was doing when it died is irrelevant.  Each entry type
//! has one reverse, and entries whose forward mutation never actually
//! happened are detected by the world's shape (target missing, backup
//! missing) and skipped, which is what makes the reverse walk
//! idempotent.

use std::path::Path;

use crate::audit::{events, severity, Event, Phase};
use crate::ctx::Ctx;
use crate::journal::{self, entry_flags, EntryType, Journal};
use crate::paths::RootSet;
use crate::platform;
use crate::status::{Result, SetupError};

use super::{TxnOptions, TxnResult};


fn roots_of(journal: &Journal) -> Result<RootSet>
{
	if journal.install_root.is_empty() || journal.txn_root.is_empty()
	{
		return Err(SetupError::integrity(
				"journal has no metadata record"));
	}
	let mut roots = RootSet::new();
	roots.add(&journal.install_root)?;
	roots.add(&journal.txn_root)?;
	Ok(roots)
}


/// Walk the journal's forward entries in reverse, undoing each.
fn reverse_walk(journal: &Journal) -> Result<()>
{
	let roots = roots_of(journal)?;

	for entry in journal.entries.iter().rev()
	{
		let et = match entry.entry_type() {
			Some(et) => et,
			// Unknown entry types can't be reversed; refusing is the
			// only safe answer.
			None => return Err(SetupError::integrity(format!(
					"journal entry type {:#06x} unknown",
					entry.entry_type_raw))),
		};

		match et
		{
			EntryType::Noop => (),

			EntryType::CreateDir =>
			{
				// Only if empty; a dir that gained other content was
				// not ours alone to remove.
				let abs = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				let _ = platform::rmdir_empty(&abs);
			},

			EntryType::RemoveDir =>
			{
				let abs = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				platform::mkdir_p(&abs)?;
			},

			EntryType::CopyFile =>
			{
				// Re-delete the copy, if it got made.
				let abs = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				if platform::path_info(&abs).exists
				{
					platform::remove_file(&abs)?;
				}
			},

			EntryType::MoveFile =>
			{
				// Move the target back where the entry says it came
				// from.  Target missing means the forward rename never
				// ran; nothing to undo.
				let target = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				if !platform::path_info(&target).exists { continue; }
				let back = roots.resolve(entry.rollback_root as u32,
						&entry.rollback_path)?;
				if let Some(parent) = back.parent()
				{
					platform::mkdir_p(parent)?;
				}
				platform::rename(&target, &back, true)?;
			},

			EntryType::DeleteFile =>
			{
				// Deletes are renames into backup; restore from there.
				let back = roots.resolve(entry.rollback_root as u32,
						&entry.rollback_path)?;
				if !platform::path_info(&back).exists { continue; }
				let target = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				if let Some(parent) = target.parent()
				{
					platform::mkdir_p(parent)?;
				}
				platform::rename(&back, &target, true)?;
			},

			EntryType::WriteState =>
			{
				let target = roots.resolve(entry.target_root as u32,
						&entry.target_path)?;
				let preexisted =
						entry.flags & entry_flags::TARGET_PREEXISTED != 0;
				match preexisted
				{
					true =>
					{
						// Backup present: restore it over whatever's
						// at the target.  Backup absent: the forward
						// never got as far as shadowing the old file,
						// so the target still *is* the old file and
						// must be left alone.
						let back = roots.resolve(
								entry.rollback_root as u32,
								&entry.rollback_path)?;
						if platform::path_info(&back).exists
						{
							platform::rename(&back, &target, true)?;
						}
					},
					false =>
					{
						if platform::path_info(&target).exists
						{
							platform::remove_file(&target)?;
						}
					},
				}
			},
		}
	}

	Ok(())
}


/// Internal rollback after a failed apply: reverse the tree, clear the
/// work areas, but leave the journal file where it is for forensics.
pub(super) fn rollback_files(ctx: &mut Ctx, journal_path: &Path)
		-> Result<()>
{
	let j = journal::read_file(journal_path)?;
	reverse_walk(&j)?;

	for sub in [super::STAGED_PREFIX, super::BACKUP_PREFIX,
			".dsu_txn/state"]
	{
		let p = crate::util::path_join(&j.txn_root, sub);
		let _ = platform::remove_tree(&p);
	}

	ctx.audit_mut().push(Event {
		phase: Phase::Rollback,
		event_id: events::TXN_ROLLED_BACK,
		severity: severity::WARN,
		digest_a: j.journal_id,
		..Event::default()
	});
	Ok(())
}


/// The public entry: roll back a transaction described by a journal
/// file, then clear its txn root entirely.
pub fn rollback_journal(ctx: &mut Ctx, journal_path: &Path,
		_opts: &TxnOptions)
		-> Result<TxnResult>
{
	let j = journal::read_file(journal_path)?;
	reverse_walk(&j)?;

	let _ = super::remove_txn_root(&j.txn_root);

	ctx.audit_mut().push(Event {
		phase: Phase::Rollback,
		event_id: events::TXN_ROLLED_BACK,
		severity: severity::INFO,
		digest_a: j.journal_id,
		message: "journal rolled back".into(),
		..Event::default()
	});

	Ok(TxnResult {
		journal_id: j.journal_id,
		digest64: j.plan_digest,
		install_root: j.install_root.clone(),
		txn_root: j.txn_root.clone(),
		journal_path: journal_path.to_path_buf(),
		state_rel_path: j.state_rel.clone(),
		journal_entry_count: j.entries.len() as u32,
		commit_progress: j.commit_progress,
		..TxnResult::default()
	})
}
