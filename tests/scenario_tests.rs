//! End-to-end scenarios: fresh install, upgrade, repair, uninstall,
//! and commit-failure rollback, each against a real filesystem
//! sandbox.

mod helpers;

use helpers::{apply, build_sandbox, ctx, ctx_failing, make_plan,
		snapshot, Sandbox};

use dominium_setup::config::Failpoint;
use dominium_setup::manifest::flags;
use dominium_setup::resolve::{Action, Operation};
use dominium_setup::status::Status;
use dominium_setup::txn::{self, TxnOptions};


fn fresh_core() -> Sandbox
{
	build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/hello.txt", b"hello\n" as &[u8]),
			("data/config.json", b"{\"k\":1}\n"),
		]),
	])
}


#[test]
fn s1_fresh_install_portable()
{
	let sb = fresh_core();
	let mut cx = ctx();

	let res = apply(&mut cx, &sb, Operation::Install).unwrap();
	assert!(res.journal_id != 0);

	// Both files, byte for byte
	assert_eq!(std::fs::read(sb.install_file("bin/hello.txt")).unwrap(),
			b"hello\n");
	assert_eq!(
			std::fs::read(sb.install_file("data/config.json")).unwrap(),
			b"{\"k\":1}\n");

	// State exists and is sane
	assert!(sb.state_path().is_file());
	let st = sb.load_state();
	assert_eq!(st.product_id, "dominium");
	assert_eq!(st.product_version.as_str(), "1.0.0");
	assert_eq!(st.components.len(), 1);
	assert_eq!(st.components[0].files.len(), 2);

	// The txn root is gone
	let parent = sb.install_root.parent().unwrap();
	let leftovers: Vec<_> = std::fs::read_dir(parent).unwrap()
			.map(|e| e.unwrap().file_name().to_string_lossy()
					.into_owned())
			.filter(|n| n.contains(".txn"))
			.collect();
	assert!(leftovers.is_empty(), "txn junk left: {leftovers:?}");

	// Re-running the same install resolves to all-none and is a
	// clean no-op.
	let mut cx2 = ctx();
	let plan2 = make_plan(&mut cx2, &sb, Operation::Install).unwrap();
	assert!(plan2.is_noop());
	let before = snapshot(&sb.install_root);
	let res2 = txn::apply_plan(&mut cx2, &plan2,
			&TxnOptions::default()).unwrap();
	assert_eq!(res2.journal_id, 0);
	assert_eq!(before, snapshot(&sb.install_root));
}


#[test]
fn s2_upgrade_v1_to_v2()
{
	let sb = build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/version.txt", b"version v1\n" as &[u8]),
		]),
	]);
	let mut cx = ctx();
	apply(&mut cx, &sb, Operation::Install).unwrap();
	let inst_id = sb.load_state().install_instance_id;
	assert!(inst_id != 0);

	// Same sandbox dir, new manifest contents at v2.  Rebuild the
	// manifest + payload in place.
	upgrade_manifest_inplace(&sb, "2.0.0", b"version v2\n");

	let mut cx2 = ctx();
	apply(&mut cx2, &sb, Operation::Upgrade).unwrap();

	assert_eq!(
			std::fs::read(sb.install_file("bin/version.txt")).unwrap(),
			b"version v2\n");
	let st = sb.load_state();
	assert_eq!(st.product_version.as_str(), "2.0.0");
	assert_eq!(st.component("core").unwrap().version.as_str(), "2.0.0");
	assert_eq!(st.install_instance_id, inst_id,
			"instance id must survive upgrades");
	assert_eq!(st.last_operation, Operation::Upgrade);
}

/// Rewrite the sandbox's manifest/payload in place as a newer version
/// of the same product, same layout.
fn upgrade_manifest_inplace(sb: &Sandbox, version: &str,
		version_txt: &[u8])
{
	use dominium_setup::manifest::{self, Payload, PayloadKind};
	use dominium_setup::util::hash::sha256_buf;

	let mut m = manifest::load_file(&sb.manifest_path).unwrap();
	m.product_version = version.into();
	let payload_dir = sb.manifest_path.parent().unwrap()
			.join("payload");
	std::fs::write(payload_dir.join("bin/version.txt"), version_txt)
			.unwrap();
	m.components[0].payloads = vec![Payload {
		kind: PayloadKind::Fileset,
		container_path: "payload".into(),
		member_path: "bin/version.txt".into(),
		sha256: sha256_buf(version_txt),
		size: version_txt.len() as u64,
	}];
	manifest::write_file(&mut m, &sb.manifest_path).unwrap();
}


#[test]
fn s3_cross_scope_upgrade_rejected()
{
	use dominium_setup::manifest::{self, InstallRoot, Scope};
	use dominium_setup::resolve::{self, Request};
	use dominium_setup::state::State;

	let sb = fresh_core();
	let mut cx = ctx();
	apply(&mut cx, &sb, Operation::Install).unwrap();

	// Declare a user-scope root too, so placement itself succeeds.
	let mut m = manifest::load_file(&sb.manifest_path).unwrap();
	let user_root = sb.install_root.parent().unwrap().join("user-inst");
	m.install_roots.push(InstallRoot {
		scope: Scope::User,
		platform: "linux-x86_64".into(),
		path: user_root.to_str().unwrap().to_string(),
	});
	manifest::write_file(&mut m, &sb.manifest_path).unwrap();

	// The installed (portable) state against a user-scope upgrade
	// request is an invalid request, full stop.
	let portable_state = State::load_file(&sb.state_path()).unwrap();
	let rq = Request {
		operation: Operation::Upgrade,
		scope: Scope::User,
		..Request::default()
	};
	let e = resolve::resolve(&mut ctx(), &m, Some(&portable_state), &rq)
			.unwrap_err();
	assert_eq!(e.status(), Status::InvalidRequest);

	// And with no prior state at the user root, upgrade is equally
	// invalid.
	let e = resolve::resolve(&mut ctx(), &m, None, &rq).unwrap_err();
	assert_eq!(e.status(), Status::InvalidRequest);
}


#[test]
fn s4_repair_restores_tampered_file()
{
	let sb = build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/hello.txt", b"hello\n" as &[u8]),
			("tools/tools.txt", b"tools\n"),
		]),
	]);
	let mut cx = ctx();
	apply(&mut cx, &sb, Operation::Install).unwrap();

	// Vandalize
	std::fs::remove_file(sb.install_file("tools/tools.txt")).unwrap();

	let mut cx2 = ctx();
	let plan = make_plan(&mut cx2, &sb, Operation::Repair).unwrap();
	assert!(plan.components.iter()
			.any(|c| c.action == Action::Repair));
	txn::apply_plan(&mut cx2, &plan, &TxnOptions::default()).unwrap();

	assert_eq!(
			std::fs::read(sb.install_file("tools/tools.txt")).unwrap(),
			b"tools\n");
	assert_eq!(std::fs::read(sb.install_file("bin/hello.txt")).unwrap(),
			b"hello\n");
}


#[test]
fn s5_uninstall_preserves_user_data()
{
	let sb = build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/launcher.txt", b"launch\n" as &[u8]),
		]),
	]);
	let mut cx = ctx();
	apply(&mut cx, &sb, Operation::Install).unwrap();

	// A file the user made, not recorded anywhere.
	let marker = sb.install_file("user/marker.txt");
	std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
	std::fs::write(&marker, b"user\n").unwrap();

	let st = sb.load_state();
	let mut cx2 = ctx();
	txn::uninstall_state(&mut cx2, &st, &sb.state_path(),
			&TxnOptions::default()).unwrap();

	assert!(!sb.install_file("bin/launcher.txt").exists());
	assert_eq!(std::fs::read(&marker).unwrap(), b"user\n");
	assert!(!sb.state_path().exists(),
			"state file must be removed with the last component");
}


#[test]
fn uninstall_subset_keeps_the_rest()
{
	let sb = build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/hello.txt", b"hello\n" as &[u8]),
		]),
		("tools", flags::DEFAULT_SELECTED, vec![
			("tools/tools.txt", b"tools\n" as &[u8]),
		]),
	]);
	let mut cx = ctx();
	apply(&mut cx, &sb, Operation::Install).unwrap();

	// Resolve an uninstall of just tools, through the planner.
	use dominium_setup::manifest;
	use dominium_setup::resolve::{self, Request};
	use dominium_setup::state::State;
	use dominium_setup::manifest::Scope;

	let m = manifest::load_file(&sb.manifest_path).unwrap();
	let prior = State::load_file(&sb.state_path()).unwrap();
	let rq = Request {
		operation: Operation::Uninstall,
		scope: Scope::Portable,
		requested: vec!["tools".into()],
		..Request::default()
	};
	let mut cx2 = ctx();
	let resolved = resolve::resolve(&mut cx2, &m, Some(&prior), &rq)
			.unwrap();
	let plan = dominium_setup::plan::build(&mut cx2, &m,
			&sb.manifest_path, &resolved).unwrap();
	txn::apply_plan(&mut cx2, &plan, &TxnOptions::default()).unwrap();

	// tools gone, core intact, state rewritten with one component.
	assert!(!sb.install_file("tools/tools.txt").exists());
	assert_eq!(std::fs::read(sb.install_file("bin/hello.txt")).unwrap(),
			b"hello\n");
	let st = sb.load_state();
	assert_eq!(st.components.len(), 1);
	assert_eq!(st.components[0].id, "core");
	assert_eq!(st.last_operation, Operation::Uninstall);
}


#[test]
fn s6_commit_failure_rolls_back()
{
	let sb = build_sandbox("1.0.0", &[
		("core", flags::DEFAULT_SELECTED, vec![
			("bin/launcher.txt", b"NEW\n" as &[u8]),
		]),
	]);

	// Pre-existing file the plan will want to replace.
	let launcher = sb.install_file("bin/launcher.txt");
	std::fs::create_dir_all(launcher.parent().unwrap()).unwrap();
	std::fs::write(&launcher, b"OLD\n").unwrap();

	let before = snapshot(&sb.install_root);

	let mut cx = ctx_failing(Failpoint::MidCommit(1));
	let e = apply(&mut cx, &sb, Operation::Install).unwrap_err();
	assert!(e.to_string().contains("injected"));

	assert_eq!(std::fs::read(&launcher).unwrap(), b"OLD\n");
	assert!(!sb.state_path().exists());
	assert_eq!(before, snapshot(&sb.install_root),
			"install root must be byte-identical after rollback");
}
