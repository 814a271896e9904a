//! $0 apply
use crate::command::{build_request, CmdArg};
use crate::status::{Result, SetupError};
use crate::txn::TxnOptions;
use crate::util::plural;


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, mut ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Apply(a) => a,
		_ => return Err(SetupError::internal("apply dispatched wrong")),
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

	let napply = resolved.applied().count();
	println!("{} {} {}: {} component{} to touch",
			resolved.operation, manifest.product_id,
			manifest.product_version, napply, plural(napply));

	let opts = TxnOptions {
		dry_run: args.dry_run,
		journal_path: args.journal.clone(),
		txn_root: args.txn_root.clone(),
		fail_after_entries: args.fail_after,
		audit_log_path: args.log.clone(),
	};

	let res = crate::txn::apply_plan(&mut ctx, &plan, &opts)?;

	match args.dry_run
	{
		true => println!("dry run ok: {} file{} staged and verified",
				res.staged_file_count, plural(res.staged_file_count
					as usize)),
		false => match res.journal_id
		{
			0 => println!("nothing to do."),
			_ => println!("applied: journal {}, {} entr{}",
					crate::util::hex16(res.journal_id),
					res.journal_entry_count,
					if res.journal_entry_count == 1 { "y" }
						else { "ies" }),
		},
	}

	Ok(())
}
