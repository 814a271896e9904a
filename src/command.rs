//! General command handling.  This is sorta the central dispatch for
//! everything that goes on.

/// Command-line parsing and handling
mod line;
pub use line::parse;
pub use line::DsArgs;
pub(crate) use line::DsCmds;
pub(crate) use line::ResolveArgs;

use std::process::ExitCode;

use crate::config::Config;
use crate::ctx::Ctx;
use crate::status::SetupError;


/// Pass a bunch of info to the individual command runners as a block
#[derive(Debug)]
pub(crate) struct CmdArg
{
	/// The command-line args
	pub(crate) clargs: DsArgs,

	/// The engine context
	pub(crate) ctx: Ctx,
}


/// Dispatch a command
pub fn run(clargs: DsArgs) -> ExitCode
{
	// Environment first, flags over it.
	let mut config = match Config::from_env() {
		Ok(c) => c,
		Err(e) => return fail(e),
	};
	if clargs.deterministic { config.deterministic = true; }

	let ctx = Ctx::new(config);
	let carg = CmdArg { clargs, ctx };

	use crate::cmd;
	use DsCmds as DC;
	let ret = match &carg.clargs.command {
		// Read-only
		DC::Resolve{..} => cmd::resolve::run(carg),
		DC::Plan{..}    => cmd::plan::run(carg),
		DC::Verify{..}  => cmd::verify::run(carg),
		DC::Report{..}  => cmd::report::run(carg),
		DC::ExportLog{..} => cmd::export_log::run(carg),

		// Mutating
		DC::Apply{..}     => cmd::apply::run(carg),
		DC::Uninstall{..} => cmd::uninstall::run(carg),
		DC::Rollback{..}  => cmd::rollback::run(carg),
	};

	match ret
	{
		Ok(_) => ExitCode::SUCCESS,
		Err(e) => fail(e),
	}
}


fn fail(e: SetupError) -> ExitCode
{
	eprintln!("dominium-setup: {e}");
	e.into()
}


/// Turn the shared resolve args into an engine request + loaded
/// manifest.  Used by resolve/plan/apply.
pub(crate) fn build_request(args: &ResolveArgs)
		-> Result<(crate::manifest::Manifest, crate::resolve::Request),
			SetupError>
{
	use crate::manifest;
	use crate::resolve::Request;

	let m = manifest::load_file(&args.manifest)?;

	let operation = args.operation.parse().map_err(|_|
			SetupError::invalid_args(format!(
				"unknown operation '{}'", args.operation)))?;
	let scope = args.scope.parse().map_err(|_|
			SetupError::invalid_args(format!(
				"unknown scope '{}'", args.scope)))?;

	let rq = Request {
		operation,
		scope,
		target_platform: args.platform.clone(),
		requested: args.components.clone(),
		excluded: args.exclude.clone(),
	};
	Ok((m, rq))
}
