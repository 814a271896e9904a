//! $0 uninstall
use crate::command::CmdArg;
use crate::state::State;
use crate::status::{Result, SetupError};
use crate::txn::TxnOptions;
use crate::util::plural;


pub(crate) fn run(carg: CmdArg) -> Result<()>
{
	let CmdArg { clargs, mut ctx } = carg;
	let args = match &clargs.command {
		crate::command::DsCmds::Uninstall(a) => a,
		_ => return Err(SetupError::internal(
				"uninstall dispatched wrong")),
	};

	let root_abs = crate::txn::absolutize_root(&args.root)?;
	let state_path = crate::txn::state_path_under(&root_abs);
	let state = State::load_file(&state_path)?;

	let opts = TxnOptions {
		dry_run: args.dry_run,
		audit_log_path: args.log.clone(),
		..TxnOptions::default()
	};

	// Show what's about to happen before it happens.
	let preview = crate::report::uninstall_preview(&state,
			&args.components, crate::report::Format::Text)?;
	print!("{preview}");

	let res = match args.components.is_empty()
	{
		true => crate::txn::uninstall_state(&mut ctx, &state,
				&state_path, &opts)?,
		false =>
		{
			// Scoped uninstall goes through the resolver-shaped plan
			// path so subset errors surface properly.
			use crate::resolve::{Action, Operation};
			let plan = scoped_plan(&mut ctx, &state, &args.components)?;
			debug_assert!(plan.components.iter()
					.all(|c| c.action == Action::Uninstall));
			debug_assert_eq!(plan.operation, Operation::Uninstall);
			crate::txn::apply_plan(&mut ctx, &plan, &opts)?
		},
	};

	match args.dry_run
	{
		true => println!("dry run: {} file{} would go",
				res.staged_file_count,
				plural(res.staged_file_count as usize)),
		false => println!("uninstalled ({} journal entr{})",
				res.journal_entry_count,
				if res.journal_entry_count == 1 { "y" }
					else { "ies" }),
	}

	Ok(())
}


/// A minimal uninstall plan over a state subset; mirrors what a full
/// manifest resolve would build, without needing the manifest.
fn scoped_plan(ctx: &mut crate::ctx::Ctx, state: &State,
		components: &[String])
		-> Result<crate::plan::Plan>
{
	use crate::plan::{Plan, PlanComponent, Step, StepKind};
	use crate::resolve::{Action, Operation};
	use crate::status::Status;

	let mut plan = Plan {
		flags: match ctx.deterministic() {
			true => crate::plan::flags::DETERMINISTIC,
			false => 0,
		},
		operation: Operation::Uninstall,
		scope: state.scope,
		product_id: state.product_id.clone(),
		product_version: state.product_version.clone(),
		build_channel: state.build_channel.clone(),
		platform: state.platform.clone(),
		install_root: state.primary_root()?.to_string(),
		payload_base: String::new(),
		manifest_digest64: state.manifest_digest64,
		resolved_digest64: state.resolved_digest64,
		components: Vec::new(),
		steps: vec![Step {
			kind: StepKind::DeclareInstallRoot,
			arg: state.primary_root()?.to_string(),
		}],
		dirs: Vec::new(),
		files: Vec::new(),
		id_hash32: 0,
		id_hash64: 0,
	};

	let mut ids: Vec<&String> = components.iter().collect();
	ids.sort_unstable();
	for id in ids
	{
		let sc = state.component(id).ok_or_else(||
				SetupError::new(Status::MissingComponent,
					format!("'{id}' is not installed")))?;
		plan.components.push(PlanComponent {
			id: sc.id.clone(),
			version: sc.version.clone(),
			kind: sc.kind,
			action: Action::Uninstall,
			registrations: sc.registrations.clone(),
			markers: sc.markers.clone(),
		});
		plan.steps.push(Step {
			kind: StepKind::UninstallComponent,
			arg: sc.id.clone(),
		});
	}
	plan.steps.push(Step
			{ kind: StepKind::WriteState, arg: String::new() });
	plan.steps.push(Step
			{ kind: StepKind::WriteLog, arg: String::new() });

	plan.compute_ids();
	Ok(plan)
}
