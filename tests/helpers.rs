//! Shared test utilities: sandboxes with a manifest, payload files,
//! and an install root, plus tree snapshotting for pristine-rollback
//! checks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dominium_setup::config::Config;
use dominium_setup::ctx::Ctx;
use dominium_setup::manifest::{self, Action, ActionKind, Component,
		ComponentKind, InstallRoot, Manifest, Payload, PayloadKind,
		Scope};
use dominium_setup::plan::Plan;
use dominium_setup::resolve::{self, Operation, Request};
use dominium_setup::state::State;
use dominium_setup::status::{SetupError, Status};
use dominium_setup::txn::{self, TxnOptions, TxnResult};
use dominium_setup::util::hash::{sha256_buf, sha256_file};


/// Pull the `Status` out of an `anyhow::Error` wrapping a `SetupError`,
/// so tests can assert on it without caring which helper boxed it.
pub trait AnyhowStatusExt
{
	fn status(&self) -> Status;
}

impl AnyhowStatusExt for anyhow::Error
{
	fn status(&self) -> Status
	{
		self.downcast_ref::<SetupError>()
				.unwrap_or_else(|| panic!("error is not a SetupError: {self:?}"))
				.status()
	}
}


/// One sandbox: a temp dir holding `work/` (manifest + payloads) and
/// `install/` (the install root).
pub struct Sandbox
{
	pub _td: TempDir,
	pub manifest_path: PathBuf,
	pub install_root: PathBuf,
}

impl Sandbox
{
	pub fn state_path(&self) -> PathBuf
	{
		self.install_root.join(".dsu/installed_state.dsustate")
	}

	pub fn load_state(&self) -> State
	{
		State::load_file(&self.state_path()).expect("state loads")
	}

	pub fn install_file(&self, rel: &str) -> PathBuf
	{
		self.install_root.join(rel)
	}
}


/// A deterministic context: pinned seed, zero timestamps.
pub fn ctx() -> Ctx
{
	Ctx::new(Config {
		deterministic: true,
		seed: Some(42),
		..Config::default()
	})
}

/// Same, with a failpoint armed.
pub fn ctx_failing(fp: dominium_setup::config::Failpoint) -> Ctx
{
	Ctx::new(Config {
		deterministic: true,
		seed: Some(42),
		failpoint: Some(fp),
	})
}


/// Component description for build_sandbox: (id, flags, [(rel, bytes)]).
pub type CompSpec<'a> = (&'a str, u32, Vec<(&'a str, &'a [u8])>);

/// Lay out payload files and a manifest for a product.
pub fn build_sandbox(version: &str, comps: &[CompSpec]) -> Sandbox
{
	let td = TempDir::new().expect("tempdir");
	let work = td.path().join("work");
	let payload_dir = work.join("payload");
	std::fs::create_dir_all(&payload_dir).expect("payload dir");

	let install_root = td.path().join("install");

	let mut components = Vec::new();
	for (id, fl, files) in comps
	{
		let mut payloads = Vec::new();
		for (rel, bytes) in files
		{
			let p = payload_dir.join(rel);
			std::fs::create_dir_all(p.parent().unwrap()).unwrap();
			std::fs::write(&p, bytes).unwrap();
			payloads.push(Payload {
				kind: PayloadKind::Fileset,
				container_path: "payload".into(),
				member_path: (*rel).to_string(),
				sha256: sha256_buf(bytes),
				size: bytes.len() as u64,
			});
		}
		components.push(Component {
			id: (*id).to_string(),
			kind: ComponentKind::Core,
			flags: *fl,
			payloads,
			actions: vec![Action {
				kind: ActionKind::Marker,
				arg: format!("{id}-present"),
			}],
			..Component::default()
		});
	}

	let mut m = Manifest {
		product_id: "dominium".into(),
		product_version: version.into(),
		build_channel: "stable".into(),
		platform_targets: vec!["linux-x86_64".into()],
		install_roots: vec![InstallRoot {
			scope: Scope::Portable,
			platform: "linux-x86_64".into(),
			path: install_root.to_str().unwrap().to_string(),
		}],
		components,
		..Manifest::default()
	};

	let manifest_path = work.join("product.dsumanifest");
	manifest::write_file(&mut m, &manifest_path).expect("manifest write");

	Sandbox { _td: td, manifest_path, install_root }
}


/// Resolve + plan for an operation against whatever state is on disk.
pub fn make_plan(ctx: &mut Ctx, sb: &Sandbox, op: Operation)
		-> anyhow::Result<Plan>
{
	let m = manifest::load_file(&sb.manifest_path)?;
	let rq = Request {
		operation: op,
		scope: Scope::Portable,
		..Request::default()
	};
	let prior = match sb.state_path().is_file() {
		true => Some(State::load_file(&sb.state_path())?),
		false => None,
	};
	let resolved = resolve::resolve(ctx, &m, prior.as_ref(), &rq)?;
	Ok(dominium_setup::plan::build(ctx, &m, &sb.manifest_path,
			&resolved)?)
}


/// The full pipeline for an operation, default options.
pub fn apply(ctx: &mut Ctx, sb: &Sandbox, op: Operation)
		-> anyhow::Result<TxnResult>
{
	let plan = make_plan(ctx, sb, op)?;
	Ok(txn::apply_plan(ctx, &plan, &TxnOptions::default())?)
}


/// Snapshot a tree as rel-path -> (size, sha256 hex), sorted by the
/// map.  Missing root counts as an empty tree.
pub fn snapshot(root: &Path) -> BTreeMap<String, (u64, String)>
{
	let mut out = BTreeMap::new();
	if root.is_dir()
	{
		walk(root, "", &mut out);
	}
	out
}

fn walk(base: &Path, prefix: &str, out: &mut BTreeMap<String,
		(u64, String)>)
{
	let mut names: Vec<_> = std::fs::read_dir(base).unwrap()
			.map(|e| e.unwrap().file_name())
			.collect();
	names.sort_unstable();
	for name in names
	{
		let n = name.to_str().unwrap().to_string();
		let rel = match prefix.is_empty() {
			true => n.clone(),
			false => format!("{prefix}/{n}"),
		};
		let abs = base.join(&n);
		if abs.is_dir()
		{
			walk(&abs, &rel, out);
		}
		else
		{
			let (sha, size) = sha256_file(&abs).unwrap();
			out.insert(rel, (size, sha.to_string()));
		}
	}
}
