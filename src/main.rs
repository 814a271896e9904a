//! The thin end of the wedge: parse args, run, exit with the
//! contract's code.

use std::process::ExitCode;

fn main() -> ExitCode
{
	let clargs = dominium_setup::command::parse();
	dominium_setup::command::run(clargs)
}
