//! The transaction engine.
//!
//! Stage, verify, commit, and (when anything goes wrong) roll back.
//! The rules that make it crash-safe:
//!
//!  - every mutation gets its journal entry written and flushed
//!    *before* the mutation itself happens;
//!  - every staged byte lives on the same volume as the install root,
//!    so the commit phase is renames only;
//!  - every durable mutation has a recorded reverse, and rollback
//!    replays the journal backwards off disk, not out of memory.
//!
//! On any failure the install root comes back byte-identical, no
//! installed-state is written, and the journal stays on disk for
//! forensics (or an explicit `rollback_journal`).

/// Stage + verify phases
mod stage;

/// Commit phase + state write
mod commit;

/// Reverse walk
mod rollback;
pub use rollback::rollback_journal;

/// Uninstall via installed state
mod uninstall;
pub use uninstall::uninstall_state;

/// Verify-only walk
mod verify;
pub use verify::verify_state;


use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::audit::{events, severity, Event, Phase};
use crate::config::Failpoint;
use crate::ctx::Ctx;
use crate::journal::{self, Entry, EntryType};
use crate::paths::RootSet;
use crate::plan::Plan;
use crate::platform;
use crate::resolve::Operation;
use crate::state::{State, STATE_REL_PATH};
use crate::status::{Result, SetupError, Status};
use crate::util::hex16;


/// Commit-progress checkpoint cadence (forward entries per NOOP).
const PROGRESS_INTERVAL: u32 = 8;

/// Free-space margin demanded over the raw payload size.
const FREE_SPACE_HEADROOM: u64 = 4 * 1024 * 1024;

/// Layout under the txn root.
pub(crate) const STAGED_PREFIX: &str = ".dsu_txn/staged";
pub(crate) const BACKUP_PREFIX: &str = ".dsu_txn/backup";
pub(crate) const STATE_NEW_REL: &str = ".dsu_txn/state/new.dsustate";

/// Default journal filename under the txn root.
pub(crate) const JOURNAL_NAME: &str = "txn.dsujournal";


/// Caller-tunable knobs for one transaction.
#[derive(Debug, Clone, Default)]
pub struct TxnOptions
{
	/// Stage and verify, then tear down instead of committing.
	pub dry_run: bool,

	/// Override the journal location (default: in the txn root).
	pub journal_path: Option<PathBuf>,

	/// Override the txn root (default: `<install_root>.txn/<id hex>`).
	pub txn_root: Option<String>,

	/// Abort right after the Nth journaled forward entry (0 = off).
	pub fail_after_entries: u32,

	/// Where WRITE_LOG flushes the audit log (skipped when unset).
	pub audit_log_path: Option<PathBuf>,
}


/// What a transaction reports back.
#[derive(Debug, Clone, Default)]
pub struct TxnResult
{
	pub journal_id: u64,
	pub digest64: u64,

	pub install_root: String,
	pub txn_root: String,
	pub journal_path: PathBuf,
	pub state_rel_path: String,

	pub journal_entry_count: u32,
	pub commit_progress: u32,

	pub staged_file_count: u32,
	pub verified_ok: u32,
	pub verified_missing: u32,
	pub verified_mismatch: u32,
}


/// Mirror a target-relative path into the staging area.
pub(crate) fn staged_rel(rel: &str) -> String
{
	format!("{STAGED_PREFIX}/{rel}")
}

/// Mirror a target-relative path into the backup area.
pub(crate) fn backup_rel(rel: &str) -> String
{
	format!("{BACKUP_PREFIX}/{rel}")
}


/// The in-flight machinery shared by the phases.
pub(crate) struct Work<'a>
{
	pub(crate) ctx: &'a mut Ctx,

	/// Index 0 = install root, 1 = txn root; matches the journal's
	/// root bytes.
	pub(crate) roots: RootSet,
	pub(crate) install_root_abs: String,
	pub(crate) txn_root_abs: String,

	pub(crate) journal: journal::Writer,

	/// All journaled forward entries so far (stage + commit).
	pub(crate) forward_entries: u32,

	/// Commit-phase entries only (mid_commit counts these).
	pub(crate) commit_entries: u32,

	pub(crate) fail_after: u32,
	pub(crate) failpoint: Option<Failpoint>,

	/// Per-target content digest64, collected while staging streams
	/// the bytes; the installed state records them.
	pub(crate) content64: HashMap<String, u64>,
}

impl<'a> Work<'a>
{
	/// Journal one forward entry, then run the injection checks.  The
	/// caller performs the actual mutation *after* this returns.
	pub(crate) fn journal_entry(&mut self, et: EntryType, entry: &Entry)
			-> Result<()>
	{
		self.journal.append_entry(et, entry)?;
		self.forward_entries += 1;

		if self.fail_after != 0 && self.forward_entries >= self.fail_after
		{
			return Err(SetupError::new(Status::InternalError,
					format!("injected failure after entry {}",
						self.forward_entries)));
		}
		Ok(())
	}

	/// Same, during commit; also drives the progress checkpoints and
	/// the mid_commit failpoint.
	pub(crate) fn journal_commit_entry(&mut self, et: EntryType,
			entry: &Entry)
			-> Result<()>
	{
		self.journal_entry(et, entry)?;
		self.commit_entries += 1;

		if self.commit_entries % PROGRESS_INTERVAL == 0
		{
			self.journal.append_progress(self.commit_entries)?;
		}

		if let Some(Failpoint::MidCommit(n)) = self.failpoint
		{
			if self.commit_entries >= n
			{
				return Err(SetupError::new(Status::InternalError,
						format!("injected failure at commit entry {}",
							self.commit_entries)));
			}
		}
		Ok(())
	}

	/// Non-counting failpoint check at a labelled position.
	pub(crate) fn hit(&self, fp: Failpoint) -> Result<()>
	{
		if self.failpoint == Some(fp)
		{
			return Err(SetupError::new(Status::InternalError,
					format!("injected failure at {fp:?}")));
		}
		Ok(())
	}
}


/// Turn a possibly-relative declared root into an absolute canonical
/// path string.
pub(crate) fn absolutize_root(declared: &str) -> Result<String>
{
	use crate::paths;

	let c = paths::canonicalize(declared)?;
	if paths::is_absolute(&c) { return Ok(c); }

	let cwd = platform::cwd()?;
	let joined = format!("{}/{c}", cwd.to_string_lossy());
	Ok(paths::canonicalize(&joined)?)
}


/// Remove a txn root wholesale, plus its `.txn` parent when that's
/// now empty (the default layout nests per-journal dirs under one).
pub(crate) fn remove_txn_root(txn_root: &str) -> std::io::Result<()>
{
	let p = Path::new(txn_root);
	platform::remove_tree(p)?;
	if let Some(parent) = p.parent()
	{
		let _ = platform::rmdir_empty(parent);
	}
	Ok(())
}


/// Path of the installed-state file under an install root.
pub(crate) fn state_path_under(install_root_abs: &str) -> PathBuf
{
	crate::util::path_join(install_root_abs, STATE_REL_PATH)
}

/// Load the prior state under an install root, if there is one.
pub(crate) fn load_prior_state(install_root_abs: &str)
		-> Result<Option<State>>
{
	let p = state_path_under(install_root_abs);
	match platform::path_info(&p).exists
	{
		false => Ok(None),
		true => Ok(Some(State::load_file(&p)?)),
	}
}


/// Set up the txn scaffolding (txn root, subdirs, journal with its
/// metadata record) and hand back the Work.
fn open_work<'a>(ctx: &'a mut Ctx, install_root_abs: &str,
		plan_digest: u64, opts: &TxnOptions)
		-> Result<(Work<'a>, u64, PathBuf)>
{
	let journal_id = ctx.next_id();

	let txn_root_abs = match &opts.txn_root {
		Some(t) => absolutize_root(t)?,
		None => format!("{install_root_abs}.txn/{}", hex16(journal_id)),
	};

	// Scaffolding.  These live inside the txn root, so they're cleaned
	// up wholesale and don't need journaling.
	for sub in [STAGED_PREFIX, BACKUP_PREFIX, ".dsu_txn/state"]
	{
		platform::mkdir_p(&crate::util::path_join(&txn_root_abs, sub))?;
	}

	let journal_path = match &opts.journal_path {
		Some(p) => p.clone(),
		None => crate::util::path_join(&txn_root_abs, JOURNAL_NAME),
	};

	let mut journal = journal::Writer::create(&journal_path, journal_id,
			plan_digest)?;
	journal.write_meta(install_root_abs, &txn_root_abs,
			STATE_REL_PATH)?;

	let mut roots = RootSet::new();
	roots.add(install_root_abs)?;
	roots.add(&txn_root_abs)?;

	let failpoint = ctx.config().failpoint;
	let work = Work {
		ctx,
		roots,
		install_root_abs: install_root_abs.to_string(),
		txn_root_abs,
		journal,
		forward_entries: 0,
		commit_entries: 0,
		fail_after: opts.fail_after_entries,
		failpoint,
		content64: HashMap::new(),
	};

	Ok((work, journal_id, journal_path))
}


/// Apply a plan: stage → verify → commit, or dry-run, with rollback on
/// any failure.  Uninstall plans route through the state-driven
/// uninstall path.
pub fn apply_plan(ctx: &mut Ctx, plan: &Plan, opts: &TxnOptions)
		-> Result<TxnResult>
{
	let install_root_abs = absolutize_root(&plan.install_root)?;

	if plan.operation == Operation::Uninstall
	{
		let prior = load_prior_state(&install_root_abs)?
				.ok_or_else(|| SetupError::invalid_request(
					"uninstall: nothing installed here"))?;
		let ids: Vec<String> = plan.components.iter()
				.filter(|c| c.action == crate::resolve::Action::Uninstall)
				.map(|c| c.id.clone())
				.collect();
		let state_path = state_path_under(&install_root_abs);
		return uninstall::uninstall_components(ctx, &prior, &ids,
				&state_path, opts);
	}

	// Nothing to do?  Then do nothing, successfully.
	if plan.is_noop()
	{
		ctx.audit_mut().emit(Phase::Commit, events::TXN_COMMITTED,
				severity::INFO, "no-op plan; nothing to apply");
		return Ok(TxnResult {
			digest64: plan.id_hash64,
			install_root: install_root_abs,
			state_rel_path: STATE_REL_PATH.to_string(),
			..TxnResult::default()
		});
	}

	platform::mkdir_p(Path::new(&install_root_abs))?;
	let prior = load_prior_state(&install_root_abs)?;

	let (mut work, journal_id, journal_path) =
			open_work(ctx, &install_root_abs, plan.id_hash64, opts)?;

	work.ctx.audit_mut().push(Event {
		phase: Phase::Stage,
		event_id: events::TXN_BEGIN,
		digest_a: plan.id_hash64,
		path: install_root_abs.clone(),
		..Event::default()
	});

	let mut result = TxnResult {
		journal_id,
		digest64: plan.id_hash64,
		install_root: install_root_abs.clone(),
		txn_root: work.txn_root_abs.clone(),
		journal_path: journal_path.clone(),
		state_rel_path: STATE_REL_PATH.to_string(),
		..TxnResult::default()
	};

	// The guarded body: everything that can dirty the tree.
	let run = (|| -> Result<()> {
		stage::stage(&mut work, plan, &mut result)?;
		stage::verify(&mut work, plan, &mut result)?;

		if opts.dry_run { return Ok(()); }

		commit::commit(&mut work, plan, prior.as_ref(), &mut result)?;
		Ok(())
	})();

	let txn_root = work.txn_root_abs.clone();
	result.journal_entry_count = work.forward_entries;
	result.commit_progress = work.commit_entries;

	match run
	{
		Ok(_) if opts.dry_run =>
		{
			// Dry run leaves nothing behind, journal included.
			drop(work);
			let _ = remove_txn_root(&txn_root);
			ctx.audit_mut().emit(Phase::Verify, events::TXN_VERIFIED,
					severity::INFO, "dry run complete");
			Ok(result)
		},
		Ok(_) =>
		{
			// Success: final checkpoint, then the txn area evaporates.
			work.journal.append_progress(work.commit_entries)?;
			result.commit_progress = work.commit_entries;
			drop(work);
			remove_txn_root(&txn_root)?;
			ctx.audit_mut().emit(Phase::Commit, events::TXN_COMMITTED,
					severity::INFO, "transaction committed");

			// WRITE_LOG
			if let Some(lp) = &opts.audit_log_path
			{
				ctx.audit_mut().write_file(lp)?;
			}
			Ok(result)
		},
		Err(e) =>
		{
			// Close the writer so the journal is complete on disk,
			// then reverse it.  The journal file itself stays for
			// forensics.
			drop(work);
			rollback::rollback_files(ctx, &journal_path)?;
			ctx.audit_mut().push(Event {
				phase: Phase::Rollback,
				event_id: events::TXN_ROLLED_BACK,
				severity: severity::WARN,
				message: e.to_string(),
				..Event::default()
			});
			Err(e)
		},
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn rel_path_mirrors()
	{
		assert_eq!(staged_rel("bin/app"), ".dsu_txn/staged/bin/app");
		assert_eq!(backup_rel(".dsu/installed_state.dsustate"),
				".dsu_txn/backup/.dsu/installed_state.dsustate");
	}

	#[test]
	fn absolutize()
	{
		let abs = absolutize_root("/x/y").unwrap();
		assert_eq!(abs, "/x/y");

		let rel = absolutize_root("some/dir").unwrap();
		assert!(crate::paths::is_absolute(&rel));
		assert!(rel.ends_with("some/dir"));
	}
}
