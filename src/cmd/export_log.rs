//! $0 export-log
use crate::audit::AuditLog;
use crate::command::CmdArg;
use crate::status::{Result, SetupError};


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, ctx: _ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::ExportLog(a) => a,
		_ => return Err(SetupError::internal(
				"export-log dispatched wrong")),
	};

	let log = AuditLog::read_file(&args.log)?;
	let json = log.export_json()?;

	match &args.out
	{
		Some(p) => {
			std::fs::write(p, json.as_bytes())?;
			println!("wrote {} ({} events)", p.display(), log.len());
		},
		None => println!("{json}"),
	}

	Ok(())
}
