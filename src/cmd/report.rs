//! $0 report
use crate::command::CmdArg;
use crate::state::State;
use crate::status::{Result, SetupError};


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, ctx: _ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Report(a) => a,
		_ => return Err(SetupError::internal("report dispatched wrong")),
	};

	let root_abs = crate::txn::absolutize_root(&args.root)?;
	let state_path = crate::txn::state_path_under(&root_abs);
	let state = State::load_file(&state_path)?;

	let format = args.format.parse().map_err(|_|
			SetupError::invalid_args(format!(
				"unknown format '{}'", args.format)))?;

	use crate::report;
	let text = match args.kind.as_str()
	{
		"inventory" => report::list_installed(&state, format)?,
		"touched" => report::touched_paths(&state, format)?,
		"preview" => report::uninstall_preview(&state,
				&args.components, format)?,
		"verify" => report::verify(&state, format, true)?.0,
		other => return Err(SetupError::invalid_args(format!(
				"unknown report kind '{other}'"))),
	};
	print!("{text}");

	Ok(())
}
