//! $0 verify
use crate::command::CmdArg;
use crate::state::State;
use crate::status::{Result, SetupError};


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, ctx: _ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Verify(a) => a,
		_ => return Err(SetupError::internal("verify dispatched wrong")),
	};

	let root_abs = crate::txn::absolutize_root(&args.root)?;
	let state_path = crate::txn::state_path_under(&root_abs);
	let state = State::load_file(&state_path)?;

	let format = args.format.parse().map_err(|_|
			SetupError::invalid_args(format!(
				"unknown format '{}'", args.format)))?;

	let (text, summary) = crate::report::verify(&state, format,
			args.extra)?;
	print!("{text}");

	// Any damage is a nonzero exit; verify is used in scripts.
	match summary.missing + summary.modified + summary.errors
	{
		0 => Ok(()),
		_ => Err(SetupError::integrity(format!(
				"{} missing, {} modified", summary.missing,
				summary.modified))),
	}
}
