//! Commit phase: the renames, and the state write that seals them.
//!
//! By the time we're here every byte is staged and verified on the
//! same volume, so the only operations left are mkdir, rename, rename.
//! Each one is journaled first.  Pre-existing targets get shuffled
//! into the backup area rather than clobbered, so rollback can always
//! put the old world back.

use crate::audit::{events, severity, Event, Phase};
use crate::config::Failpoint;
use crate::journal::{entry_flags, roots, Entry, EntryType};
use crate::plan::Plan;
use crate::platform;
use crate::resolve::Action;
use crate::state::{Ownership, RootRole, State, StateComponent,
		StateFile, StateInstallRoot, STATE_REL_DIR, STATE_REL_PATH};
use crate::status::Result;

use super::{backup_rel, staged_rel, TxnResult, Work, STATE_NEW_REL};


/// Phase 3.
pub(super) fn commit(work: &mut Work, plan: &Plan,
		prior: Option<&State>, result: &mut TxnResult)
		-> Result<()>
{
	// Target directories.
	for dir in &plan.dirs
	{
		work.journal_commit_entry(EntryType::CreateDir, &Entry {
			target_root: roots::INSTALL,
			target_path: dir.clone(),
			..Entry::default()
		})?;
		let abs = work.roots.resolve(roots::INSTALL as u32, dir)?;
		platform::mkdir_p(&abs)?;
	}

	// File moves.
	for f in &plan.files
	{
		let rel = &f.rel_target;
		let target_abs = work.roots.resolve(roots::INSTALL as u32, rel)?;

		// A regular file already there gets shadowed into backup/.
		let info = platform::path_info(&target_abs);
		if info.exists && !info.is_dir
		{
			let brel = backup_rel(rel);
			let backup_abs = work.roots.resolve(roots::TXN as u32,
					&brel)?;
			if let Some(parent) = backup_abs.parent()
			{
				platform::mkdir_p(parent)?;
			}

			work.journal_commit_entry(EntryType::MoveFile, &Entry {
				target_root: roots::TXN,
				target_path: brel.clone(),
				source_root: roots::INSTALL,
				source_path: rel.clone(),
				rollback_root: roots::INSTALL,
				rollback_path: rel.clone(),
				flags: entry_flags::TARGET_PREEXISTED,
				..Entry::default()
			})?;
			platform::rename(&target_abs, &backup_abs, false)?;
		}

		// And the staged shadow onto the target.
		let srel = staged_rel(rel);
		let staged_abs = work.roots.resolve(roots::TXN as u32, &srel)?;

		work.journal_commit_entry(EntryType::MoveFile, &Entry {
			target_root: roots::INSTALL,
			target_path: rel.clone(),
			source_root: roots::TXN,
			source_path: srel.clone(),
			rollback_root: roots::TXN,
			rollback_path: srel.clone(),
			..Entry::default()
		})?;
		platform::rename(&staged_abs, &target_abs, true)?;
	}

	work.hit(Failpoint::BeforeStateWrite)?;

	// Build the next installed state and stage its bytes inside the
	// txn root, so publishing it is one more rename.
	let mut next = build_state(work, plan, prior)?;
	let new_abs = crate::util::path_join(&work.txn_root_abs,
			STATE_NEW_REL);
	let bytes = next.to_bytes()?;
	std::fs::write(&new_abs, &bytes)?;

	// Its directory under the install root.
	work.journal_commit_entry(EntryType::CreateDir, &Entry {
		target_root: roots::INSTALL,
		target_path: STATE_REL_DIR.to_string(),
		..Entry::default()
	})?;
	let dsu_abs = work.roots.resolve(roots::INSTALL as u32,
			STATE_REL_DIR)?;
	platform::mkdir_p(&dsu_abs)?;

	// WRITE_STATE: shadow any old state into backup/, then rename the
	// new one into place.
	let target_abs = work.roots.resolve(roots::INSTALL as u32,
			STATE_REL_PATH)?;
	let preexisted = platform::path_info(&target_abs).exists;
	let brel = backup_rel(STATE_REL_PATH);
	let backup_abs = work.roots.resolve(roots::TXN as u32, &brel)?;

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
		digest_a: next.plan_digest64,
		..Event::default()
	});

	result.commit_progress = work.commit_entries;
	Ok(())
}


/// Compute the next installed state: prior state (when upgrading or
/// repairing over one) with the plan's applied components upserted.
fn build_state(work: &mut Work, plan: &Plan, prior: Option<&State>)
		-> Result<State>
{
	let mut st = match prior {
		Some(p) => p.clone(),
		None => State {
			install_roots: vec![StateInstallRoot {
				role: RootRole::Primary,
				path_abs: work.install_root_abs.clone(),
			}],
			..State::default()
		},
	};

	st.product_id = plan.product_id.clone();
	st.product_version = plan.product_version.clone();
	st.build_channel = plan.build_channel.clone();
	st.platform = plan.platform.clone();
	st.scope = plan.scope;
	st.manifest_digest64 = plan.manifest_digest64;
	st.resolved_digest64 = plan.resolved_digest64;
	st.plan_digest64 = plan.id_hash64;
	st.last_operation = plan.operation;
	st.last_journal_id = work.journal.journal_id();

	// Instance identity survives upgrades and repairs; it's minted
	// exactly once, at first install.
	if st.install_instance_id == 0
	{
		st.install_instance_id = work.ctx.next_id();
	}

	// The audit log linkage is best-effort: whatever was last flushed.
	match work.ctx.audit().last_written_digest64()
	{
		Some(d) => st.last_audit_log_digest64 = Some(d),
		None => (),
	}

	// The applied components, rebuilt from the plan.
	let mut upserts = Vec::new();
	for (ix, pc) in plan.components.iter().enumerate()
	{
		match pc.action
		{
			Action::Install | Action::Upgrade | Action::Repair => (),
			Action::Uninstall | Action::None => continue,
		}

		let files = plan.files.iter()
				.filter(|f| f.component_ix == ix as u32)
				.map(|f| StateFile {
					root_index: 0,
					rel_path: f.rel_target.clone(),
					sha256: f.sha256,
					size: f.size,
					digest64: work.content64.get(&f.rel_target)
							.copied().unwrap_or(0),
					ownership: Ownership::Owned,
					flags: 0,
				})
				.collect();

		upserts.push(StateComponent {
			id: pc.id.clone(),
			version: pc.version.clone(),
			kind: pc.kind,
			install_time_policy: 0,
			registrations: pc.registrations.clone(),
			markers: pc.markers.clone(),
			files,
		});
	}
	st.upsert_components(upserts);

	Ok(st)
}
