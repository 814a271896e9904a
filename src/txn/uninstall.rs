//! Uninstall, driven from the installed state.
//!
//! The forward entries are DELETE_FILEs for every owned file of the
//! components going away (implemented as renames into backup, so they
//! reverse), then either a rewrite of the reconciled state or the
//! removal of the state file itself when the last component goes.
//! Files tagged user_data or cache stay put.

use std::path::Path;

use crate::audit::{events, severity, Event, Phase};
use crate::ctx::Ctx;
use crate::journal::{entry_flags, roots, Entry, EntryType};
use crate::platform;
use crate::resolve::Operation;
use crate::state::{Ownership, State, STATE_REL_PATH};
use crate::status::{Result, SetupError};

use super::{backup_rel, open_work, rollback, TxnOptions, TxnResult,
		Work, STATE_NEW_REL};


/// Uninstall every component in the state.  The state file goes with
/// them.
pub fn uninstall_state(ctx: &mut Ctx, state: &State,
		state_path: &Path, opts: &TxnOptions)
		-> Result<TxnResult>
{
	let ids: Vec<String> = state.components.iter()
			.map(|c| c.id.clone()).collect();
	uninstall_components(ctx, state, &ids, state_path, opts)
}


/// Uninstall a subset of the state's components.
pub(super) fn uninstall_components(ctx: &mut Ctx, state: &State,
		ids: &[String], state_path: &Path, opts: &TxnOptions)
		-> Result<TxnResult>
{
	// Everything named must actually be installed.
	for id in ids
	{
		if state.component(id).is_none()
		{
			return Err(SetupError::new(
					crate::status::Status::MissingComponent,
					format!("'{id}' is not installed")));
		}
	}

	let install_root_abs = state.primary_root()?.to_string();

	if opts.dry_run
	{
		// Nothing to stage; a dry-run uninstall is pure arithmetic.
		let nfiles = doomed_files(state, ids).count() as u32;
		ctx.audit_mut().emit(Phase::Commit, events::TXN_COMMITTED,
				severity::INFO,
				format!("dry run: would remove {nfiles} files"));
		return Ok(TxnResult {
			install_root: install_root_abs,
			state_rel_path: STATE_REL_PATH.to_string(),
			staged_file_count: nfiles,
			..TxnResult::default()
		});
	}

	let (mut work, journal_id, journal_path) =
			open_work(ctx, &install_root_abs, state.plan_digest64, opts)?;

	work.ctx.audit_mut().push(Event {
		phase: Phase::Commit,
		event_id: events::TXN_BEGIN,
		path: install_root_abs.clone(),
		message: format!("uninstall {} components", ids.len()),
		..Event::default()
	});

	let mut result = TxnResult {
		journal_id,
		digest64: state.plan_digest64,
		install_root: install_root_abs.clone(),
		txn_root: work.txn_root_abs.clone(),
		journal_path: journal_path.clone(),
		state_rel_path: STATE_REL_PATH.to_string(),
		..TxnResult::default()
	};

	let run = (|| -> Result<()> {
		run_deletes(&mut work, state, ids, state_path)
	})();

	let txn_root = work.txn_root_abs.clone();
	result.journal_entry_count = work.forward_entries;
	result.commit_progress = work.commit_entries;

	match run
	{
		Ok(_) =>
		{
			work.journal.append_progress(work.commit_entries)?;
			result.commit_progress = work.commit_entries;
			drop(work);
			super::remove_txn_root(&txn_root)?;
			ctx.audit_mut().emit(Phase::Commit, events::TXN_COMMITTED,
					severity::INFO, "uninstall committed");
			if let Some(lp) = &opts.audit_log_path
			{
				ctx.audit_mut().write_file(lp)?;
			}
			Ok(result)
		},
		Err(e) =>
		{
			drop(work);
			rollback::rollback_files(ctx, &journal_path)?;
			Err(e)
		},
	}
}


/// The owned files of the doomed components, in canonical order.
fn doomed_files<'a>(state: &'a State, ids: &'a [String])
		-> impl Iterator<Item = (&'a str, &'a crate::state::StateFile)>
{
	state.components.iter()
			.filter(move |c| ids.contains(&c.id))
			.flat_map(|c| c.files.iter().map(move |f| (c.id.as_str(), f)))
			.filter(|(_, f)| f.ownership == Ownership::Owned)
}


fn run_deletes(work: &mut Work, state: &State, ids: &[String],
		state_path: &Path)
		-> Result<()>
{
	// DELETE_FILE per owned file.  Each is a rename into backup; a
	// file already missing from disk is simply not our problem today.
	let doomed: Vec<(String, String)> = doomed_files(state, ids)
			.map(|(_, f)| (f.rel_path.clone(), backup_rel(&f.rel_path)))
			.collect();
	for (rel, brel) in &doomed
	{
		let target_abs = work.roots.resolve(roots::INSTALL as u32, rel)?;
		if !platform::path_info(&target_abs).exists { continue; }

		let backup_abs = work.roots.resolve(roots::TXN as u32, brel)?;
		if let Some(parent) = backup_abs.parent()
		{
			platform::mkdir_p(parent)?;
		}

		work.journal_commit_entry(EntryType::DeleteFile, &Entry {
			target_root: roots::INSTALL,
			target_path: rel.clone(),
			rollback_root: roots::TXN,
			rollback_path: brel.clone(),
			flags: entry_flags::TARGET_PREEXISTED,
			..Entry::default()
		})?;
		platform::rename(&target_abs, &backup_abs, false)?;
	}

	// Reconcile the state.
	let mut remaining = state.clone();
	remaining.remove_components(ids);

	let target_abs = work.roots.resolve(roots::INSTALL as u32,
			STATE_REL_PATH)?;
	// The state file we loaded may live elsewhere (caller's copy);
	// only the canonical in-root one takes part in the transaction.
	let in_root = platform::path_info(&target_abs).exists
			&& state_path == target_abs;

	match remaining.components.is_empty()
	{
		true =>
		{
			// Last component gone: the record goes too.
			if in_root
			{
				let brel = backup_rel(STATE_REL_PATH);
				let backup_abs = work.roots.resolve(roots::TXN as u32,
						&brel)?;
				if let Some(parent) = backup_abs.parent()
				{
					platform::mkdir_p(parent)?;
				}
				work.journal_commit_entry(EntryType::DeleteFile, &Entry {
					target_root: roots::INSTALL,
					target_path: STATE_REL_PATH.to_string(),
					rollback_root: roots::TXN,
					rollback_path: brel,
					flags: entry_flags::TARGET_PREEXISTED,
					..Entry::default()
				})?;
				platform::rename(&target_abs, &backup_abs, false)?;
				work.ctx.audit_mut().emit(Phase::State,
						events::STATE_REMOVED, severity::INFO,
						"installed state removed");
			}
		},
		false =>
		{
			// Rewrite the reconciled record.
			remaining.last_operation = Operation::Uninstall;
			remaining.last_journal_id = work.journal.journal_id();

			let new_abs = crate::util::path_join(&work.txn_root_abs,
					STATE_NEW_REL);
			let bytes = remaining.to_bytes()?;
			std::fs::write(&new_abs, &bytes)?;

			let preexisted = platform::path_info(&target_abs).exists;
			let brel = backup_rel(STATE_REL_PATH);
			let backup_abs = work.roots.resolve(roots::TXN as u32,
					&brel)?;

			work.journal_commit_entry(EntryType::WriteState, &Entry {
				target_root: roots::INSTALL,
				target_path: STATE_REL_PATH.to_string(),
				source_root: roots::TXN,
				source_path: STATE_NEW_REL.to_string(),
				rollback_root: roots::TXN,
				rollback_path: brel,
				flags: match preexisted {
					true => entry_flags::TARGET_PREEXISTED,
					false => 0,
				},
				..Entry::default()
			})?;
			if preexisted
			{
				if let Some(parent) = backup_abs.parent()
				{
					platform::mkdir_p(parent)?;
				}
				platform::rename(&target_abs, &backup_abs, false)?;
			}
			platform::rename(&new_abs, &target_abs, true)?;

			work.ctx.audit_mut().push(Event {
				phase: Phase::State,
				event_id: events::STATE_WRITTEN,
				severity: severity::INFO,
				path: STATE_REL_PATH.to_string(),
				..Event::default()
			});
		},
	}

	Ok(())
}
