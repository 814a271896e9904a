//! Command line handling
//!
//! General invocation:
//! $0 [options] <command> [command-opts]

use clap::{Parser, Subcommand};
use std::path::PathBuf;


/// Main arg entry point
#[derive(Debug)]
#[derive(Parser)]
#[command(about = "Deterministic, journaled product setup.")]
#[command(version)]
pub struct DsArgs
{
	#[command(subcommand)]
	pub(crate) command: DsCmds,

	/// Run in deterministic mode: zero timestamps, reproducible
	/// digests and file bytes.
	///
	/// Identical inputs then produce byte-identical plans, states,
	/// and audit logs on any host, which is what you want for
	/// image-building pipelines and for diffing two runs against
	/// each other.
	#[arg(long)]
	pub(crate) deterministic: bool,
}



/// Individual subcommands and their args
#[derive(Debug)]
#[derive(Subcommand)]
pub(crate) enum DsCmds
{
	/// Resolve a manifest against a request.
	///
	/// Shows which components would be selected, where each came from
	/// (request, default, or dependency closure), and what would be
	/// done to it.  Nothing is touched.
	Resolve(DsCmdResolve),

	/// Build a plan and write it to a file.
	///
	/// The plan is the complete, canonical description of the
	/// transaction; its identity hash is deterministic, so a plan
	/// built from the same manifest and request on another machine is
	/// byte-identical.
	Plan(DsCmdPlan),

	/// Apply: resolve, plan, and run the transaction.
	///
	/// Stage, verify, then commit; on any failure the install root is
	/// rolled back to exactly its prior bytes and the journal is left
	/// on disk for inspection.  `--dry-run` stops after verify.
	Apply(DsCmdApply),

	/// Verify an install against its recorded state.
	///
	/// Rehashes every recorded file and classifies it as ok, missing,
	/// or modified; `--extra` also reports files present on disk that
	/// the state doesn't know about.
	Verify(DsCmdVerify),

	/// Uninstall components (default: everything).
	///
	/// Removes owned files only; anything recorded as user data is
	/// preserved.  Removing the last component removes the state file
	/// too.
	Uninstall(DsCmdUninstall),

	/// Roll back a transaction from its journal file.
	///
	/// Replays the journal in reverse, restoring the tree the
	/// transaction was mutating.  Used when a crash interrupted a
	/// commit and the automatic rollback never got to run.
	Rollback(DsCmdRollback),

	/// Produce a report over an installed state.
	Report(DsCmdReport),

	/// Export a binary audit log as JSON.
	ExportLog(DsCmdExportLog),
}


/// Args shared by everything that resolves a manifest.
#[derive(Debug, clap::Args)]
pub(crate) struct ResolveArgs
{
	/// The product manifest (.dsumanifest)
	#[arg(short, long)]
	pub(crate) manifest: PathBuf,

	/// Operation to resolve for
	#[arg(short, long, default_value = "install")]
	pub(crate) operation: String,

	/// Install scope (system, user, portable)
	#[arg(short, long, default_value = "portable")]
	pub(crate) scope: String,

	/// Target platform; required when the product targets several
	#[arg(short, long)]
	pub(crate) platform: Option<String>,

	/// Components to act on (repeatable); default per operation
	#[arg(short, long)]
	pub(crate) components: Vec<String>,

	/// Components to exclude (repeatable)
	#[arg(short = 'x', long)]
	pub(crate) exclude: Vec<String>,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdResolve
{
	#[command(flatten)]
	pub(crate) resolve: ResolveArgs,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdPlan
{
	#[command(flatten)]
	pub(crate) resolve: ResolveArgs,

	/// Where to write the plan
	#[arg(long)]
	pub(crate) out: PathBuf,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdApply
{
	#[command(flatten)]
	pub(crate) resolve: ResolveArgs,

	/// Stage and verify only; leave the tree untouched
	#[arg(short = 'n', long)]
	pub(crate) dry_run: bool,

	/// Override the journal path
	#[arg(long)]
	pub(crate) journal: Option<PathBuf>,

	/// Override the txn root
	#[arg(long)]
	pub(crate) txn_root: Option<String>,

	/// Abort after N journaled entries (failure injection)
	#[arg(long, default_value_t = 0)]
	pub(crate) fail_after: u32,

	/// Flush the audit log here after commit
	#[arg(long)]
	pub(crate) log: Option<PathBuf>,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdVerify
{
	/// The install root holding the state
	#[arg(short, long)]
	pub(crate) root: String,

	/// Output format (text, json)
	#[arg(short, long, default_value = "text")]
	pub(crate) format: String,

	/// Also list files on disk the state doesn't own
	#[arg(long)]
	pub(crate) extra: bool,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdUninstall
{
	/// The install root holding the state
	#[arg(short, long)]
	pub(crate) root: String,

	/// Components to remove (default: all)
	#[arg(short, long)]
	pub(crate) components: Vec<String>,

	/// Report what would happen without doing it
	#[arg(short = 'n', long)]
	pub(crate) dry_run: bool,

	/// Flush the audit log here afterwards
	#[arg(long)]
	pub(crate) log: Option<PathBuf>,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdRollback
{
	/// The journal file to replay in reverse
	#[arg(short, long)]
	pub(crate) journal: PathBuf,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdReport
{
	/// The install root holding the state
	#[arg(short, long)]
	pub(crate) root: String,

	/// Report kind (inventory, verify, preview, touched)
	#[arg(short, long, default_value = "inventory")]
	pub(crate) kind: String,

	/// Output format (text, json)
	#[arg(short, long, default_value = "text")]
	pub(crate) format: String,

	/// For preview: components to scope to
	#[arg(short, long)]
	pub(crate) components: Vec<String>,
}


#[derive(Debug, clap::Args)]
pub(crate) struct DsCmdExportLog
{
	/// The binary audit log
	#[arg(short, long)]
	pub(crate) log: PathBuf,

	/// Where the JSON goes (stdout when absent)
	#[arg(short, long)]
	pub(crate) out: Option<PathBuf>,
}


/// Parse the command line (or die trying, with clap's usual manners).
pub fn parse() -> DsArgs
{
	DsArgs::parse()
}
