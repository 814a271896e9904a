//! $0 plan
use crate::command::{build_request, CmdArg};
use crate::status::{Result, SetupError};


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, mut ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Plan(a) => a,
		_ => return Err(SetupError::internal("plan dispatched wrong")),
	};

	let (manifest, request) = build_request(&args.resolve)?;
	let (_, declared_root) = crate::resolve::select_placement(
			&manifest, &request)?;
	let root_abs = crate::txn::absolutize_root(&declared_root)?;
	let prior = crate::txn::load_prior_state(&root_abs)?;

	let resolved = crate::resolve::resolve(&mut ctx, &manifest,
			prior.as_ref(), &request)?;
	let plan = crate::plan::build(&mut ctx, &manifest,
			&args.resolve.manifest, &resolved)?;

	crate::plan::write_file(&plan, &args.out)?;

	println!("plan {} ({} steps, {} files, {} dirs)",
			crate::util::hex16(plan.id_hash64),
			plan.steps.len(), plan.files.len(), plan.dirs.len());
	println!("wrote {}", args.out.display());

	Ok(())
}
