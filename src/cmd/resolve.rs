//! $0 resolve
use crate::command::{build_request, CmdArg};
use crate::status::{Result, SetupError};


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, mut ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Resolve(a) => a,
		_ => return Err(SetupError::internal(
				"resolve dispatched wrong")),
	};

	let (manifest, request) = build_request(&args.resolve)?;

	// Any prior install at the declared root feeds reconciliation.
	let (_, declared_root) = crate::resolve::select_placement(
			&manifest, &request)?;
	let root_abs = crate::txn::absolutize_root(&declared_root)?;
	let prior = crate::txn::load_prior_state(&root_abs)?;

	let resolved = crate::resolve::resolve(&mut ctx, &manifest,
			prior.as_ref(), &request)?;

	println!("{} {} on {} ({})", resolved.operation,
			manifest.product_id, resolved.platform, resolved.scope);
	println!("install root: {}", resolved.install_root);
	for c in &resolved.components
	{
		println!("  {:<10} {} {} ({})", c.action.to_string(), c.id,
				c.version, c.source);
	}
	println!("manifest digest {:016x}, resolved digest {:016x}",
			resolved.manifest_digest64, resolved.resolved_digest64);

	Ok(())
}
