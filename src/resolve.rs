//! The resolver.
//!
//! Given a manifest, a request, and maybe a prior installed state, work
//! out the exact ordered set of components to act on and what to do
//! with each.  Everything here is deterministic: same inputs, same
//! output, same digests, on any host.  The audit log gets an entry for
//! every decision in canonical order, which is what makes "why did it
//! install that" answerable after the fact.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::audit::{events, severity, Event, Phase};
use crate::codec::Digest64;
use crate::ctx::Ctx;
use crate::manifest::{Manifest, Scope, Version};
use crate::state::State;
use crate::status::{Result, SetupError, Status};


/// What the caller wants done.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Operation
{
	#[default]
	Install,
	Upgrade,
	Repair,
	Uninstall,
}

impl Operation
{
	pub(crate) fn to_u8(self) -> u8
	{
		use Operation as O;
		match self {
			O::Install => 0, O::Upgrade => 1,
			O::Repair => 2, O::Uninstall => 3,
		}
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		use Operation as O;
		match v {
			0 => Some(O::Install), 1 => Some(O::Upgrade),
			2 => Some(O::Repair), 3 => Some(O::Uninstall),
			_ => None,
		}
	}
}


/// How a component ended up in the selection.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Source
{
	#[default]
	Default,
	User,
	Dependency,
}


/// What will actually happen to a selected component.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action
{
	Install,
	Upgrade,
	Repair,
	Uninstall,
	#[default]
	None,
}

impl Action
{
	pub(crate) fn to_u8(self) -> u8
	{
		use Action as A;
		match self {
			A::Install => 0, A::Upgrade => 1, A::Repair => 2,
			A::Uninstall => 3, A::None => 4,
		}
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		use Action as A;
		match v {
			0 => Some(A::Install), 1 => Some(A::Upgrade),
			2 => Some(A::Repair), 3 => Some(A::Uninstall),
			4 => Some(A::None),
			_ => None,
		}
	}
}


/// A resolve request, as handed over by the caller.
#[derive(Debug, Clone, Default)]
pub struct Request
{
	pub operation: Operation,
	pub scope: Scope,
	pub target_platform: Option<String>,
	pub requested: Vec<String>,
	pub excluded: Vec<String>,
}


/// One resolved component.
#[derive(Debug, Clone)]
pub struct ResolvedComponent
{
	pub id: String,
	pub version: Version,
	pub source: Source,
	pub action: Action,
}


/// The resolver's output: ordered, digested, immutable.
#[derive(Debug, Clone)]
pub struct Resolved
{
	pub operation: Operation,
	pub scope: Scope,
	pub platform: String,

	/// The manifest-declared install root for (scope, platform),
	/// verbatim.  Resolution to an absolute path is the transaction's
	/// business.
	pub install_root: String,

	/// Sorted by id, byte-wise.
	pub components: Vec<ResolvedComponent>,

	pub manifest_digest64: u64,
	pub resolved_digest64: u64,
}

impl Resolved
{
	/// The components something will actually be done to.
	pub fn applied(&self) -> impl Iterator<Item = &ResolvedComponent>
	{
		self.components.iter().filter(|c| c.action != Action::None)
	}

	pub fn all_noop(&self) -> bool
	{
		self.components.iter().all(|c| c.action == Action::None)
	}
}


fn inv_req(msg: impl Into<String>) -> SetupError
{
	SetupError::new(Status::InvalidRequest, msg.into())
}


/// Step 1: platform selection.
fn pick_platform(manifest: &Manifest, request: &Request)
		-> Result<String>
{
	let targets = &manifest.platform_targets;

	match &request.target_platform
	{
		Some(p) => {
			match targets.iter().any(|t| t == p)
			{
				true => Ok(p.clone()),
				false => Err(SetupError::new(Status::PlatformIncompatible,
						format!("platform '{p}' not targeted by product"))),
			}
		},
		None => {
			match targets.len()
			{
				0 => Err(SetupError::new(Status::PlatformIncompatible,
						"product targets no platforms".to_string())),
				1 => Ok(targets[0].clone()),
				_ => Err(inv_req("multiple platform targets; pick one")),
			}
		},
	}
}


/// Step 2: install-root selection.
fn pick_install_root(manifest: &Manifest, scope: Scope, platform: &str)
		-> Result<String>
{
	manifest.install_roots.iter()
			.find(|ir| ir.scope == scope && ir.platform == platform)
			.map(|ir| ir.path.clone())
			.ok_or_else(|| SetupError::new(Status::PlatformIncompatible,
				format!("no install root declared for ({scope}, \
						{platform})")))
}


/// Just the placement decision: (platform, declared install root).
/// The CLI uses this to find a prior state before resolving proper.
pub fn select_placement(manifest: &Manifest, request: &Request)
		-> Result<(String, String)>
{
	let platform = pick_platform(manifest, request)?;
	let root = pick_install_root(manifest, request.scope, &platform)?;
	Ok((platform, root))
}


/// The main event.
pub fn resolve(ctx: &mut Ctx, manifest: &Manifest,
		prior: Option<&State>, request: &Request)
		-> Result<Resolved>
{
	let op = request.operation;

	// Requested components must exist.
	for id in &request.requested
	{
		if manifest.component(id).is_none()
		{
			return Err(SetupError::new(Status::MissingComponent,
					format!("requested component '{id}' not in manifest")));
		}
	}

	// A component both requested and excluded is a caller bug, not a
	// tie to break.
	let excluded: HashSet<&str> = request.excluded.iter()
			.map(|s| s.as_str()).collect();
	for id in &request.requested
	{
		if excluded.contains(id.as_str())
		{
			return Err(SetupError::invalid_args(format!(
					"component '{id}' both requested and excluded")));
		}
	}

	// Operations over an existing install need that install to line up
	// with the request.
	if let Some(st) = prior
	{
		if st.product_id != manifest.product_id
		{
			return Err(inv_req(format!(
					"prior state is for product '{}', manifest is '{}'",
					st.product_id, manifest.product_id)));
		}
		if st.scope != request.scope
		{
			return Err(inv_req(format!(
					"prior install is scope '{}', request is '{}'",
					st.scope, request.scope)));
		}
	}
	match op
	{
		Operation::Upgrade | Operation::Repair | Operation::Uninstall
				if prior.is_none() =>
		{
			return Err(inv_req(format!("{op} requires a prior \
					installed state")));
		},
		_ => (),
	}

	// Platform + root
	let platform = pick_platform(manifest, request)?;
	let install_root = pick_install_root(manifest, request.scope,
			&platform)?;
	ctx.audit_mut().push(Event {
		phase: Phase::Resolve,
		event_id: events::RESOLVE_PLATFORM,
		severity: severity::INFO,
		message: platform.clone(),
		..Event::default()
	});
	ctx.audit_mut().push(Event {
		phase: Phase::Resolve,
		event_id: events::RESOLVE_INSTALL_ROOT,
		severity: severity::INFO,
		path: install_root.clone(),
		..Event::default()
	});

	// Step 3: seed set.
	// sources maps id -> how it got in; insertion also *is* selection.
	let mut sources: HashMap<String, Source> = HashMap::new();
	for id in &request.requested
	{
		sources.insert(id.clone(), Source::User);
	}
	if op == Operation::Install
	{
		for c in &manifest.components
		{
			if c.default_selected() && !excluded.contains(c.id.as_str())
			{
				sources.entry(c.id.clone()).or_insert(Source::Default);
			}
		}
	}
	// An empty request against an existing install means "all of it"
	// for the state-driven operations.
	if sources.is_empty()
	{
		if let Some(st) = prior
		{
			if matches!(op, Operation::Upgrade | Operation::Repair
					| Operation::Uninstall)
			{
				for c in &st.components
				{
					if !excluded.contains(c.id.as_str())
					{
						sources.insert(c.id.clone(), Source::Default);
					}
				}
			}
		}
	}
	if sources.is_empty()
	{
		return Err(inv_req("nothing selected"));
	}

	let mut seeds: Vec<&String> = sources.keys().collect();
	seeds.sort_unstable();
	for id in seeds.iter()
	{
		ctx.audit_mut().push(Event {
			phase: Phase::Resolve,
			event_id: events::RESOLVE_SEED,
			component_id: (*id).clone(),
			..Event::default()
		});
	}

	// Step 4: dependency closure (BFS, canonical order).  Uninstall
	// doesn't pull dependencies in; removing a thing never requires
	// removing what it depends on.
	if op != Operation::Uninstall
	{
		let mut queue: VecDeque<String> = {
			let mut s: Vec<String> = sources.keys().cloned().collect();
			s.sort_unstable();
			s.into()
		};
		while let Some(id) = queue.pop_front()
		{
			// Selected components always exist in the manifest; we
			// checked requested above and deps are validated below as
			// we add them.
			let comp = manifest.component(&id).ok_or_else(||
					SetupError::internal(format!(
						"selected '{id}' vanished from manifest")))?;
			for dep in &comp.deps
			{
				if excluded.contains(dep.id.as_str())
				{
					return Err(SetupError::new(
							Status::UnsatisfiedDependency,
							format!("'{id}' needs '{}', which is \
									excluded", dep.id)));
				}
				check_constraint(manifest, &id, dep)?;
				if !sources.contains_key(&dep.id)
				{
					sources.insert(dep.id.clone(), Source::Dependency);
					ctx.audit_mut().push(Event {
						phase: Phase::Resolve,
						event_id: events::RESOLVE_DEP_ADD,
						component_id: dep.id.clone(),
						message: id.clone(),
						..Event::default()
					});
					queue.push_back(dep.id.clone());
				}
			}
		}
	}

	// Step 5: conflicts.  Declared on either side counts.
	{
		let selected: Vec<&String> = {
			let mut s: Vec<&String> = sources.keys().collect();
			s.sort_unstable();
			s
		};
		for id in &selected
		{
			let comp = manifest.component(id)
					.ok_or_else(|| SetupError::internal(
						format!("selected '{id}' not in manifest")))?;
			for other in &comp.conflicts
			{
				if sources.contains_key(other)
				{
					return Err(SetupError::new(Status::ExplicitConflict,
							format!("'{id}' conflicts with '{other}'")));
				}
			}
		}
	}

	// Step 6: operation reconciliation.
	let mut components = Vec::with_capacity(sources.len());
	{
		let mut ids: Vec<String> = sources.keys().cloned().collect();
		ids.sort_unstable();

		for id in ids
		{
			let source = sources[&id];
			let (version, action) = reconcile(manifest, prior, op, &id)?;
			ctx.audit_mut().push(Event {
				phase: Phase::Resolve,
				event_id: events::RESOLVE_ACTION,
				component_id: id.clone(),
				message: action.to_string(),
				..Event::default()
			});
			components.push(ResolvedComponent
					{ id, version, source, action });
		}
	}

	// Step 7: digests over the canonical tuple.
	let resolved_digest64 = {
		let mut d = Digest64::new();
		d.str(&platform).sep();
		d.u8(request.scope.to_u8()).sep();
		for c in &components
		{
			d.str(&c.id).sep();
			d.str(c.version.as_str()).sep();
		}
		d.finish()
	};
	ctx.audit_mut().push(Event {
		phase: Phase::Resolve,
		event_id: events::RESOLVE_DIGESTS,
		digest_a: manifest.digest64,
		digest_b: resolved_digest64,
		..Event::default()
	});

	Ok(Resolved {
		operation: op,
		scope: request.scope,
		platform,
		install_root,
		components,
		manifest_digest64: manifest.digest64,
		resolved_digest64,
	})
}


/// Dependency version constraints.  Empty means any; "=V" means
/// exactly V; anything else is a minimum.
fn check_constraint(manifest: &Manifest, from: &str,
		dep: &crate::manifest::Dep) -> Result<()>
{
	use std::cmp::Ordering;

	if dep.constraint.is_empty() { return Ok(()); }

	let comp = manifest.component(&dep.id).ok_or_else(||
			SetupError::internal(format!("dep '{}' not in manifest",
				dep.id)))?;
	let have = manifest.component_version(comp);

	let (want, exact) = match dep.constraint.strip_prefix('=')
	{
		Some(v) => (Version::from(v), true),
		None => (Version::from(dep.constraint.as_str()), false),
	};

	let ord = have.cmp_dotted(&want);
	let ok = match exact {
		true => ord == Ordering::Equal,
		false => ord != Ordering::Less,
	};
	match ok
	{
		true => Ok(()),
		false => Err(SetupError::new(Status::VersionConflict,
				format!("'{from}' needs '{}' {}, have {have}",
					dep.id, dep.constraint))),
	}
}


/// Work out (version, action) for one selected component under the
/// requested operation.
fn reconcile(manifest: &Manifest, prior: Option<&State>, op: Operation,
		id: &str)
		-> Result<(Version, Action)>
{
	use std::cmp::Ordering;

	let mcomp = manifest.component(id);
	let mvers = mcomp.map(|c| manifest.component_version(c).clone());
	let prior_comp = prior.and_then(|st| st.component(id));

	match op
	{
		Operation::Install =>
		{
			let mvers = mvers.ok_or_else(|| SetupError::internal(
					format!("'{id}' not in manifest")))?;
			match prior_comp
			{
				None => Ok((mvers, Action::Install)),
				Some(pc) => {
					// Re-running an install over the same bits is a
					// no-op; a different version is not something
					// "install" does.
					match pc.version.cmp_dotted(&mvers)
					{
						Ordering::Equal => Ok((mvers, Action::None)),
						_ => Err(SetupError::new(Status::VersionConflict,
								format!("'{id}' already installed at {}; \
										use upgrade", pc.version))),
					}
				},
			}
		},

		Operation::Upgrade =>
		{
			let mvers = mvers.ok_or_else(|| SetupError::internal(
					format!("'{id}' not in manifest")))?;
			match prior_comp
			{
				None => Ok((mvers, Action::Install)),
				Some(pc) => {
					match pc.version.cmp_dotted(&mvers)
					{
						Ordering::Equal => Ok((mvers, Action::None)),
						Ordering::Less => Ok((mvers, Action::Upgrade)),
						Ordering::Greater =>
							Err(SetupError::new(Status::IllegalDowngrade,
								format!("'{id}': installed {} is newer \
										than manifest {mvers}",
									pc.version))),
					}
				},
			}
		},

		Operation::Repair =>
		{
			let mvers = mvers.ok_or_else(|| SetupError::internal(
					format!("'{id}' not in manifest")))?;
			match prior_comp
			{
				Some(_) => Ok((mvers, Action::Repair)),
				None => Ok((mvers, Action::Install)),
			}
		},

		Operation::Uninstall =>
		{
			// Selection must be a subset of what's installed.  The
			// version that matters is the installed one.
			match prior_comp
			{
				Some(pc) => Ok((pc.version.clone(), Action::Uninstall)),
				None => Err(SetupError::new(Status::MissingComponent,
						format!("'{id}' is not installed"))),
			}
		},
	}
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::config::Config;
	use crate::manifest::{flags, Component, ComponentKind, Dep,
			InstallRoot, Manifest};

	fn mk_ctx() -> Ctx
	{
		Ctx::new(Config { deterministic: true, seed: Some(7),
				..Config::default() })
	}

	fn mk_manifest() -> Manifest
	{
		let comp = |id: &str, fl: u32, deps: Vec<Dep>, confl: Vec<String>|
				Component {
					id: id.into(),
					kind: ComponentKind::Core,
					flags: fl,
					deps,
					conflicts: confl,
					..Component::default()
				};
		let dep = |id: &str| Dep { id: id.into(),
				constraint: String::new() };

		Manifest {
			product_id: "dominium".into(),
			product_version: "1.0.0".into(),
			platform_targets: vec!["linux-x86_64".into()],
			install_roots: vec![InstallRoot {
				scope: Scope::Portable,
				platform: "linux-x86_64".into(),
				path: "install".into(),
			}],
			components: vec![
				comp("core", flags::DEFAULT_SELECTED,
						vec![dep("runtime")], vec![]),
				comp("runtime", 0, vec![], vec![]),
				comp("tools", 0, vec![dep("core")], vec![]),
				comp("tools-legacy", 0, vec![],
						vec!["tools".to_string()]),
			],
			digest64: 0x1111,
			..Manifest::default()
		}
	}

	fn mk_request(op: Operation) -> Request
	{
		Request {
			operation: op,
			scope: Scope::Portable,
			target_platform: None,
			..Request::default()
		}
	}

	#[test]
	fn fresh_install_defaults_and_deps()
	{
		let m = mk_manifest();
		let mut ctx = mk_ctx();
		let r = resolve(&mut ctx, &m, None,
				&mk_request(Operation::Install)).unwrap();

		// core by default, runtime by dependency, sorted by id
		let ids: Vec<_> = r.components.iter()
				.map(|c| c.id.as_str()).collect();
		assert_eq!(ids, ["core", "runtime"]);
		assert_eq!(r.components[0].source, Source::Default);
		assert_eq!(r.components[1].source, Source::Dependency);
		assert!(r.components.iter()
				.all(|c| c.action == Action::Install));
		assert_eq!(r.platform, "linux-x86_64");
		assert_eq!(r.install_root, "install");
		assert_ne!(r.resolved_digest64, 0);
	}

	#[test]
	fn resolved_digest_stable()
	{
		let m = mk_manifest();
		let a = resolve(&mut mk_ctx(), &m, None,
				&mk_request(Operation::Install)).unwrap();
		let b = resolve(&mut mk_ctx(), &m, None,
				&mk_request(Operation::Install)).unwrap();
		assert_eq!(a.resolved_digest64, b.resolved_digest64);
	}

	#[test]
	fn requested_and_excluded_is_an_error()
	{
		let m = mk_manifest();
		let mut rq = mk_request(Operation::Install);
		rq.requested = vec!["tools".into()];
		rq.excluded = vec!["tools".into()];
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::InvalidArgs);
	}

	#[test]
	fn excluded_dependency_fails()
	{
		let m = mk_manifest();
		let mut rq = mk_request(Operation::Install);
		rq.excluded = vec!["runtime".into()];
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::UnsatisfiedDependency);
	}

	#[test]
	fn conflicts_fail()
	{
		let m = mk_manifest();
		let mut rq = mk_request(Operation::Install);
		rq.requested = vec!["tools".into(), "tools-legacy".into()];
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::ExplicitConflict);
	}

	#[test]
	fn unknown_request_fails()
	{
		let m = mk_manifest();
		let mut rq = mk_request(Operation::Install);
		rq.requested = vec!["nonesuch".into()];
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::MissingComponent);
	}

	#[test]
	fn platform_ambiguity()
	{
		let mut m = mk_manifest();
		m.platform_targets.push("windows-x86_64".into());
		let e = resolve(&mut mk_ctx(), &m, None,
				&mk_request(Operation::Install)).unwrap_err();
		assert_eq!(e.status(), Status::InvalidRequest);

		// Explicitly picking one of them is fine
		let mut rq = mk_request(Operation::Install);
		rq.target_platform = Some("linux-x86_64".into());
		resolve(&mut mk_ctx(), &m, None, &rq).unwrap();

		// Picking one the product doesn't target isn't
		rq.target_platform = Some("plan9-mips".into());
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::PlatformIncompatible);
	}

	#[test]
	fn upgrade_requires_prior()
	{
		let m = mk_manifest();
		let e = resolve(&mut mk_ctx(), &m, None,
				&mk_request(Operation::Upgrade)).unwrap_err();
		assert_eq!(e.status(), Status::InvalidRequest);
	}

	/*
	 * Reconciliation against a prior state
	 */

	fn mk_prior(core_version: &str) -> crate::state::State
	{
		use crate::state::{RootRole, State, StateComponent,
				StateInstallRoot};

		State {
			product_id: "dominium".into(),
			product_version: core_version.into(),
			platform: "linux-x86_64".into(),
			scope: Scope::Portable,
			install_instance_id: 7,
			install_roots: vec![StateInstallRoot {
				role: RootRole::Primary,
				path_abs: "/inst".into(),
			}],
			components: vec![
				StateComponent {
					id: "core".into(),
					version: core_version.into(),
					..StateComponent::default()
				},
				StateComponent {
					id: "runtime".into(),
					version: core_version.into(),
					..StateComponent::default()
				},
			],
			..State::default()
		}
	}

	#[test]
	fn install_over_same_version_is_noop()
	{
		let m = mk_manifest();
		let prior = mk_prior("1.0.0");
		let r = resolve(&mut mk_ctx(), &m, Some(&prior),
				&mk_request(Operation::Install)).unwrap();
		assert!(r.components.iter().all(|c| c.action == Action::None));
		assert!(r.all_noop());
	}

	#[test]
	fn install_over_other_version_conflicts()
	{
		let m = mk_manifest();
		let prior = mk_prior("0.9.0");
		let e = resolve(&mut mk_ctx(), &m, Some(&prior),
				&mk_request(Operation::Install)).unwrap_err();
		assert_eq!(e.status(), Status::VersionConflict);
	}

	#[test]
	fn upgrade_actions()
	{
		let m = mk_manifest();

		// Older installed: upgrades
		let r = resolve(&mut mk_ctx(), &m, Some(&mk_prior("0.9.0")),
				&mk_request(Operation::Upgrade)).unwrap();
		assert!(r.components.iter()
				.all(|c| c.action == Action::Upgrade));

		// Equal: nothing to do
		let r = resolve(&mut mk_ctx(), &m, Some(&mk_prior("1.0.0")),
				&mk_request(Operation::Upgrade)).unwrap();
		assert!(r.all_noop());

		// Newer installed: refuse to walk backwards
		let e = resolve(&mut mk_ctx(), &m, Some(&mk_prior("1.2.0")),
				&mk_request(Operation::Upgrade)).unwrap_err();
		assert_eq!(e.status(), Status::IllegalDowngrade);
	}

	#[test]
	fn repair_splits_installed_vs_new()
	{
		let m = mk_manifest();
		let mut prior = mk_prior("1.0.0");
		// Only core is installed; runtime will be a fresh install.
		prior.components.retain(|c| c.id == "core");

		let mut rq = mk_request(Operation::Repair);
		rq.requested = vec!["core".into()];
		let r = resolve(&mut mk_ctx(), &m, Some(&prior), &rq).unwrap();

		let find = |id: &str| r.components.iter()
				.find(|c| c.id == id).unwrap();
		assert_eq!(find("core").action, Action::Repair);
		// runtime came in via the dependency closure, as an install
		assert_eq!(find("runtime").action, Action::Install);
		assert_eq!(find("runtime").source, Source::Dependency);
	}

	#[test]
	fn uninstall_actions()
	{
		let m = mk_manifest();
		let prior = mk_prior("1.0.0");

		// Default: everything installed goes
		let r = resolve(&mut mk_ctx(), &m, Some(&prior),
				&mk_request(Operation::Uninstall)).unwrap();
		assert_eq!(r.components.len(), 2);
		assert!(r.components.iter()
				.all(|c| c.action == Action::Uninstall));

		// Subset works, and uses the *installed* version
		let mut rq = mk_request(Operation::Uninstall);
		rq.requested = vec!["runtime".into()];
		let r = resolve(&mut mk_ctx(), &m, Some(&prior), &rq).unwrap();
		assert_eq!(r.components.len(), 1);
		assert_eq!(r.components[0].id, "runtime");

		// Asking to remove something not installed fails
		let mut rq = mk_request(Operation::Uninstall);
		rq.requested = vec!["tools".into()];
		let e = resolve(&mut mk_ctx(), &m, Some(&prior), &rq)
				.unwrap_err();
		assert_eq!(e.status(), Status::MissingComponent);
	}

	#[test]
	fn prior_product_and_scope_must_match()
	{
		let m = mk_manifest();

		let mut prior = mk_prior("1.0.0");
		prior.product_id = "otherware".into();
		let e = resolve(&mut mk_ctx(), &m, Some(&prior),
				&mk_request(Operation::Upgrade)).unwrap_err();
		assert_eq!(e.status(), Status::InvalidRequest);

		let mut prior = mk_prior("1.0.0");
		prior.scope = Scope::User;
		let e = resolve(&mut mk_ctx(), &m, Some(&prior),
				&mk_request(Operation::Upgrade)).unwrap_err();
		assert_eq!(e.status(), Status::InvalidRequest);
	}

	#[test]
	fn version_constraints()
	{
		use crate::manifest::Dep;

		// tools depends on core >= 2; manifest only has 1.0.0
		let mut m = mk_manifest();
		m.components[2].deps = vec![Dep {
			id: "core".into(),
			constraint: "2.0".into(),
		}];
		let mut rq = mk_request(Operation::Install);
		rq.requested = vec!["tools".into()];
		let e = resolve(&mut mk_ctx(), &m, None, &rq).unwrap_err();
		assert_eq!(e.status(), Status::VersionConflict);

		// Exact-match constraint that does match is fine
		m.components[2].deps = vec![Dep {
			id: "core".into(),
			constraint: "=1.0.0".into(),
		}];
		resolve(&mut mk_ctx(), &m, None, &rq).unwrap();
	}
}
