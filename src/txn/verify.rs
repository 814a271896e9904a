//! Verify-only: recompute every declared file against the state.
//!
//! No mutation anywhere in here; this is the read-only cousin of the
//! report module's verify, returning counters instead of prose.

use crate::audit::{events, severity, Event, Phase};
use crate::ctx::Ctx;
use crate::paths::RootSet;
use crate::platform;
use crate::state::State;
use crate::status::Result;
use crate::util::hash::sha256_file;

use super::{TxnOptions, TxnResult};


pub fn verify_state(ctx: &mut Ctx, state: &State, _opts: &TxnOptions)
		-> Result<TxnResult>
{
	let mut roots = RootSet::new();
	for ir in &state.install_roots
	{
		roots.add(&ir.path_abs)?;
	}

	let mut result = TxnResult {
		install_root: state.primary_root()?.to_string(),
		state_rel_path: crate::state::STATE_REL_PATH.to_string(),
		..TxnResult::default()
	};

	for (comp, f) in state.files()
	{
		// A symlink smuggled into the path prefix counts as the file
		// not being what we installed.
		let abs = match roots.resolve(f.root_index, &f.rel_path) {
			Ok(a) => a,
			Err(_) => {
				result.verified_mismatch += 1;
				continue;
			},
		};

		if !platform::path_info(&abs).exists
		{
			result.verified_missing += 1;
			ctx.audit_mut().push(Event {
				phase: Phase::Verify,
				event_id: events::VERIFY_FILE,
				severity: severity::WARN,
				path: f.rel_path.clone(),
				component_id: comp.id.clone(),
				message: "missing".into(),
				..Event::default()
			});
			continue;
		}

		match sha256_file(&abs)
		{
			Ok((sha, size)) if sha == f.sha256 && size == f.size =>
					result.verified_ok += 1,
			Ok(_) => {
				result.verified_mismatch += 1;
				ctx.audit_mut().push(Event {
					phase: Phase::Verify,
					event_id: events::VERIFY_FILE,
					severity: severity::WARN,
					path: f.rel_path.clone(),
					component_id: comp.id.clone(),
					message: "modified".into(),
					..Event::default()
				});
			},
			Err(_) => result.verified_mismatch += 1,
		}
	}

	ctx.audit_mut().push(Event {
		phase: Phase::Verify,
		event_id: events::VERIFY_SUMMARY,
		severity: severity::INFO,
		digest_a: result.verified_ok as u64,
		digest_b: result.verified_missing as u64,
		digest_c: result.verified_mismatch as u64,
		..Event::default()
	});

	Ok(result)
}
