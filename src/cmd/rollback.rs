//! $0 rollback
use crate::command::CmdArg;
use crate::status::{Result, SetupError};
use crate::txn::TxnOptions;


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, mut ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Rollback(a) => a,
		_ => return Err(SetupError::internal(
				"rollback dispatched wrong")),
	};

	let res = crate::txn::rollback_journal(&mut ctx, &args.journal,
			&TxnOptions::default())?;

	println!("rolled back journal {} ({} entries, progress was {})",
			crate::util::hex16(res.journal_id),
			res.journal_entry_count, res.commit_progress);
	println!("install root restored: {}", res.install_root);

	Ok(())
}
