//! The plan.
//!
//! A plan is the fully-expanded, ordered, canonical description of one
//! transaction: the steps, every directory to make, every file to put
//! where, and nothing left to decide.  Build it once, hash it, and the
//! hash is its identity; equal inputs make byte-equal plans on any
//! host.  The transaction engine executes plans, it never reinterprets
//! them.

use std::path::Path;

use crate::codec::{framed, tlv, Digest32, Digest64};
use crate::ctx::Ctx;
use crate::audit::{events, Event, Phase};
use crate::manifest::{ComponentKind, Manifest, PayloadKind, Scope,
		Version};
use crate::resolve::{Action, Operation, Resolved};
use crate::status::{Result, SetupError, Status};
use crate::util::hash::Sha256Hash;


const MAGIC: [u8; 4] = *b"DSUP";
pub const PLAN_VERSION: u16 = 3;


/// Plan flag bits.
pub mod flags
{
	/// Built under the determinism contract (zero timestamps, seeded
	/// ids); two such plans from equal inputs are byte-identical.
	pub const DETERMINISTIC: u32 = 1 << 0;
}


/// The step kinds, in wire order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StepKind
{
	DeclareInstallRoot,
	InstallComponent,
	WriteState,
	WriteLog,
	UpgradeComponent,
	RepairComponent,
	UninstallComponent,
}

impl StepKind
{
	pub(crate) fn to_u8(self) -> u8
	{
		use StepKind as SK;
		match self {
			SK::DeclareInstallRoot => 0,
			SK::InstallComponent => 1,
			SK::WriteState => 2,
			SK::WriteLog => 3,
			SK::UpgradeComponent => 4,
			SK::RepairComponent => 5,
			SK::UninstallComponent => 6,
		}
	}

	pub(crate) fn from_u8(v: u8) -> Option<Self>
	{
		use StepKind as SK;
		match v {
			0 => Some(SK::DeclareInstallRoot),
			1 => Some(SK::InstallComponent),
			2 => Some(SK::WriteState),
			3 => Some(SK::WriteLog),
			4 => Some(SK::UpgradeComponent),
			5 => Some(SK::RepairComponent),
			6 => Some(SK::UninstallComponent),
			_ => None,
		}
	}

	fn for_action(a: Action) -> Option<Self>
	{
		use StepKind as SK;
		match a
		{
			Action::Install => Some(SK::InstallComponent),
			Action::Upgrade => Some(SK::UpgradeComponent),
			Action::Repair => Some(SK::RepairComponent),
			Action::Uninstall => Some(SK::UninstallComponent),
			Action::None => None,
		}
	}
}


#[derive(Debug, Clone)]
pub struct Step
{
	pub kind: StepKind,
	pub arg: String,
}


#[derive(Debug, Clone)]
pub struct PlanComponent
{
	pub id: String,
	pub version: Version,
	pub kind: ComponentKind,
	pub action: Action,

	/// OS-integration handles and marker strings the installed state
	/// will record; expanded here from the manifest's actions so the
	/// transaction never has to look back at the manifest.
	pub registrations: Vec<String>,
	pub markers: Vec<String>,
}


/// One file intent: put these payload bytes at this target.
#[derive(Debug, Clone)]
pub struct PlanFile
{
	/// Index into `Plan::components`
	pub component_ix: u32,

	pub rel_target: String,
	pub payload_kind: PayloadKind,
	pub container_path: String,
	pub member_path: String,
	pub size: u64,
	pub sha256: Sha256Hash,
}


#[derive(Debug, Clone)]
pub struct Plan
{
	pub flags: u32,
	pub operation: Operation,
	pub scope: Scope,
	pub product_id: String,
	pub product_version: Version,
	pub build_channel: String,
	pub platform: String,

	/// The manifest-declared install root, verbatim; possibly relative
	/// (portable installs).  Resolved at apply time.
	pub install_root: String,

	/// Where payload container paths resolve from: the directory the
	/// manifest was loaded out of, as given.
	pub payload_base: String,

	pub manifest_digest64: u64,
	pub resolved_digest64: u64,

	pub components: Vec<PlanComponent>,
	pub steps: Vec<Step>,
	pub dirs: Vec<String>,
	pub files: Vec<PlanFile>,

	pub id_hash32: u32,
	pub id_hash64: u64,
}


impl Plan
{
	/// Nothing to do?  (All resolved actions were `none`.)
	pub fn is_noop(&self) -> bool
	{
		self.components.iter().all(|c| c.action == Action::None)
	}

	pub fn total_payload_size(&self) -> u64
	{
		self.files.iter().map(|f| f.size).sum()
	}


	/// Fold the identity hashes over every field in canonical traversal
	/// order, one separator after each logical field.
	pub(crate) fn compute_ids(&mut self)
	{
		// Write the fold once, run it for both widths.  A macro is the
		// honest way to be generic over Digest32/Digest64 without
		// inventing a trait nobody else needs.
		macro_rules! fold {
			($d:expr) => {{
				let d = $d;
				d.u64_le(self.manifest_digest64).sep();
				d.u64_le(self.resolved_digest64).sep();
				d.u8(self.operation.to_u8()).sep();
				d.u8(self.scope.to_u8()).sep();
				d.str(&self.product_id).sep();
				d.str(self.product_version.as_str()).sep();
				d.str(&self.build_channel).sep();
				d.str(&self.platform).sep();
				d.str(&self.install_root).sep();
				d.str(&self.payload_base).sep();
				d.u64_le(self.flags as u64).sep();
				for c in &self.components
				{
					d.str(&c.id).sep();
					d.str(c.version.as_str()).sep();
					d.u8(c.kind.to_u8()).sep();
					d.u8(c.action.to_u8()).sep();
					for r in &c.registrations
					{
						d.str(r).sep();
					}
					for m in &c.markers
					{
						d.str(m).sep();
					}
				}
				for s in &self.steps
				{
					d.u8(s.kind.to_u8()).sep();
					d.str(&s.arg).sep();
				}
				for dir in &self.dirs
				{
					d.str(dir).sep();
				}
				for f in &self.files
				{
					d.u64_le(f.component_ix as u64).sep();
					d.str(&f.rel_target).sep();
					d.u8(f.payload_kind.to_u8()).sep();
					d.str(&f.container_path).sep();
					d.str(&f.member_path).sep();
					d.u64_le(f.size).sep();
					d.update(f.sha256.as_bytes()).sep();
				}
			}};
		}

		let mut h32 = Digest32::new();
		fold!(&mut h32);
		let mut h64 = Digest64::new();
		fold!(&mut h64);
		self.id_hash32 = h32.finish();
		self.id_hash64 = h64.finish();
	}
}


/// Build a plan from a manifest plus its resolved selection.
///
/// `manifest_path` is where the manifest was loaded from; payload
/// containers resolve relative to its parent directory.
pub fn build(ctx: &mut Ctx, manifest: &Manifest, manifest_path: &Path,
		resolved: &Resolved)
		-> Result<Plan>
{
	let payload_base = manifest_path.parent()
			.map(|p| p.to_string_lossy().into_owned())
			.filter(|p| !p.is_empty())
			.unwrap_or_else(|| ".".to_string());

	let mut plan = Plan {
		flags: match ctx.deterministic() {
			true => flags::DETERMINISTIC,
			false => 0,
		},
		operation: resolved.operation,
		scope: resolved.scope,
		product_id: manifest.product_id.clone(),
		product_version: manifest.product_version.clone(),
		build_channel: manifest.build_channel.clone(),
		platform: resolved.platform.clone(),
		install_root: resolved.install_root.clone(),
		payload_base,
		manifest_digest64: resolved.manifest_digest64,
		resolved_digest64: resolved.resolved_digest64,
		components: Vec::new(),
		steps: Vec::new(),
		dirs: Vec::new(),
		files: Vec::new(),
		id_hash32: 0,
		id_hash64: 0,
	};

	// Components carry over in resolver (canonical) order, with their
	// actions expanded to the registration/marker strings the state
	// will record.
	for rc in &resolved.components
	{
		use crate::manifest::ActionKind;

		let mut kind = ComponentKind::default();
		let mut registrations = Vec::new();
		let mut markers = Vec::new();
		if let Some(mc) = manifest.component(&rc.id)
		{
			kind = mc.kind;
			for a in &mc.actions
			{
				match a.kind
				{
					ActionKind::Register =>
							registrations.push(a.arg.clone()),
					ActionKind::Marker => markers.push(a.arg.clone()),
				}
			}
		}
		registrations.sort_unstable();
		markers.sort_unstable();

		plan.components.push(PlanComponent {
			id: rc.id.clone(),
			version: rc.version.clone(),
			kind,
			action: rc.action,
			registrations,
			markers,
		});
	}

	// Steps: declare the root, one action per applied component, then
	// the bookkeeping writes.
	plan.steps.push(Step {
		kind: StepKind::DeclareInstallRoot,
		arg: plan.install_root.clone(),
	});
	for rc in &resolved.components
	{
		if let Some(kind) = StepKind::for_action(rc.action)
		{
			plan.steps.push(Step { kind, arg: rc.id.clone() });
		}
	}
	plan.steps.push(Step
			{ kind: StepKind::WriteState, arg: String::new() });
	plan.steps.push(Step
			{ kind: StepKind::WriteLog, arg: String::new() });

	// File intents, for the operations that place files.  Uninstall
	// works from the installed state instead; its plan carries steps
	// only.
	if resolved.operation != Operation::Uninstall
	{
		for (ix, rc) in resolved.components.iter().enumerate()
		{
			match rc.action
			{
				Action::Install | Action::Upgrade | Action::Repair => (),
				Action::Uninstall | Action::None => continue,
			}
			let mc = manifest.component(&rc.id).ok_or_else(||
					SetupError::internal(format!(
						"resolved '{}' not in manifest", rc.id)))?;
			for p in &mc.payloads
			{
				if p.kind != PayloadKind::Fileset
				{
					// Archive expansion lives outside the core.
					return Err(SetupError::new(Status::InvalidRequest,
							format!("component '{}' uses an archive \
									payload; not supported here",
								rc.id)));
				}
				plan.files.push(PlanFile {
					component_ix: ix as u32,
					rel_target: p.member_path.clone(),
					payload_kind: p.kind,
					container_path: p.container_path.clone(),
					member_path: p.member_path.clone(),
					size: p.size,
					sha256: p.sha256,
				});
			}
		}
	}
	plan.files.sort_unstable_by(|a, b|
			(a.component_ix, a.rel_target.as_str())
				.cmp(&(b.component_ix, b.rel_target.as_str())));

	// Directories: every parent prefix of every target, sorted, so a
	// straight walk mkdir -p's parents before children.
	{
		let mut dirs = std::collections::BTreeSet::new();
		for f in &plan.files
		{
			if let Some((dir, _base)) = f.rel_target.rsplit_once('/')
			{
				let mut prefix = String::new();
				for seg in dir.split('/')
				{
					if !prefix.is_empty() { prefix.push('/'); }
					prefix.push_str(seg);
					dirs.insert(prefix.clone());
				}
			}
		}
		plan.dirs = dirs.into_iter().collect();
	}

	plan.compute_ids();

	ctx.audit_mut().push(Event {
		phase: Phase::Resolve,
		event_id: events::PLAN_BUILT,
		digest_a: plan.id_hash64,
		digest_b: plan.id_hash32 as u64,
		..Event::default()
	});

	Ok(plan)
}


/*
 * File form (DSUP)
 */

// Root
const T_ROOT: u16 = 0x0001;
const T_ROOT_VERSION: u16 = 0x0002;

// Scalars
const T_FLAGS: u16 = 0x0010;
const T_OPERATION: u16 = 0x0011;
const T_SCOPE: u16 = 0x0012;
const T_PRODUCT_ID: u16 = 0x0013;
const T_PRODUCT_VERSION: u16 = 0x0014;
const T_PLATFORM: u16 = 0x0015;
const T_INSTALL_ROOT: u16 = 0x0016;
const T_PAYLOAD_BASE: u16 = 0x0017;
const T_MANIFEST_DIGEST64: u16 = 0x0018;
const T_RESOLVED_DIGEST64: u16 = 0x0019;
const T_ID_HASH32: u16 = 0x001A;
const T_ID_HASH64: u16 = 0x001B;
const T_BUILD_CHANNEL: u16 = 0x001C;

// Components
const T_COMPONENT: u16 = 0x0020;
const T_C_ID: u16 = 0x0021;
const T_C_VERSTR: u16 = 0x0022;
const T_C_KIND: u16 = 0x0023;
const T_C_ACTION: u16 = 0x0024;
const T_C_REGISTRATION: u16 = 0x0025;
const T_C_MARKER: u16 = 0x0026;

// Steps
const T_STEP: u16 = 0x0030;
const T_S_KIND: u16 = 0x0031;
const T_S_ARG: u16 = 0x0032;

// Dirs/files
const T_DIR: u16 = 0x0040;
const T_FILE: u16 = 0x0050;
const T_F_VERSION: u16 = 0x0051;
const T_F_COMPONENT_IX: u16 = 0x0052;
const T_F_REL_TARGET: u16 = 0x0053;
const T_F_PAYLOAD_KIND: u16 = 0x0054;
const T_F_CONTAINER: u16 = 0x0055;
const T_F_MEMBER: u16 = 0x0056;
const T_F_SIZE: u16 = 0x0057;
const T_F_SHA256: u16 = 0x0058;


fn payload_bytes(plan: &Plan) -> Vec<u8>
{
	let mut root = Vec::new();
	tlv::put_u32(&mut root, T_ROOT_VERSION, PLAN_VERSION as u32);
	tlv::put_u32(&mut root, T_FLAGS, plan.flags);
	tlv::put_u8(&mut root, T_OPERATION, plan.operation.to_u8());
	tlv::put_u8(&mut root, T_SCOPE, plan.scope.to_u8());
	tlv::put_str(&mut root, T_PRODUCT_ID, &plan.product_id);
	tlv::put_str(&mut root, T_PRODUCT_VERSION,
			plan.product_version.as_str());
	tlv::put_str(&mut root, T_BUILD_CHANNEL, &plan.build_channel);
	tlv::put_str(&mut root, T_PLATFORM, &plan.platform);
	tlv::put_str(&mut root, T_INSTALL_ROOT, &plan.install_root);
	tlv::put_str(&mut root, T_PAYLOAD_BASE, &plan.payload_base);
	tlv::put_u64(&mut root, T_MANIFEST_DIGEST64, plan.manifest_digest64);
	tlv::put_u64(&mut root, T_RESOLVED_DIGEST64, plan.resolved_digest64);
	tlv::put_u32(&mut root, T_ID_HASH32, plan.id_hash32);
	tlv::put_u64(&mut root, T_ID_HASH64, plan.id_hash64);

	for c in &plan.components
	{
		let mut cb = Vec::new();
		tlv::put_str(&mut cb, T_C_ID, &c.id);
		tlv::put_str(&mut cb, T_C_VERSTR, c.version.as_str());
		tlv::put_u8(&mut cb, T_C_KIND, c.kind.to_u8());
		tlv::put_u8(&mut cb, T_C_ACTION, c.action.to_u8());
		for r in &c.registrations
		{
			tlv::put_str(&mut cb, T_C_REGISTRATION, r);
		}
		for m in &c.markers
		{
			tlv::put_str(&mut cb, T_C_MARKER, m);
		}
		tlv::put(&mut root, T_COMPONENT, &cb);
	}

	for s in &plan.steps
	{
		let mut sb = Vec::new();
		tlv::put_u8(&mut sb, T_S_KIND, s.kind.to_u8());
		tlv::put_str(&mut sb, T_S_ARG, &s.arg);
		tlv::put(&mut root, T_STEP, &sb);
	}

	for d in &plan.dirs
	{
		tlv::put_str(&mut root, T_DIR, d);
	}

	for f in &plan.files
	{
		let mut fb = Vec::new();
		tlv::put_u32(&mut fb, T_F_VERSION, 1);
		tlv::put_u32(&mut fb, T_F_COMPONENT_IX, f.component_ix);
		tlv::put_str(&mut fb, T_F_REL_TARGET, &f.rel_target);
		tlv::put_u8(&mut fb, T_F_PAYLOAD_KIND, f.payload_kind.to_u8());
		tlv::put_str(&mut fb, T_F_CONTAINER, &f.container_path);
		tlv::put_str(&mut fb, T_F_MEMBER, &f.member_path);
		tlv::put_u64(&mut fb, T_F_SIZE, f.size);
		tlv::put(&mut fb, T_F_SHA256, f.sha256.as_bytes());
		tlv::put(&mut root, T_FILE, &fb);
	}

	let mut payload = Vec::new();
	tlv::put(&mut payload, T_ROOT, &root);
	payload
}


pub fn write_file(plan: &Plan, path: &Path) -> Result<()>
{
	let img = framed::wrap(MAGIC, PLAN_VERSION, &payload_bytes(plan));
	std::fs::write(path, img)?;
	Ok(())
}


pub fn read_file(path: &Path) -> Result<Plan>
{
	let bytes = std::fs::read(path).map_err(|e|
			SetupError::io(format!("read {}: {e}", path.display())))?;
	let (version, payload) = framed::unwrap(MAGIC, "plan", &bytes)?;
	if version > PLAN_VERSION
	{
		return Err(SetupError::unsupported_version(
				format!("plan version {version} > {PLAN_VERSION}")));
	}

	let perr = |m: &str| SetupError::parse(format!("plan: {m}"));

	let mut plan = Plan {
		flags: 0,
		operation: Operation::Install,
		scope: Scope::Portable,
		product_id: String::new(),
		product_version: Version::default(),
		build_channel: String::new(),
		platform: String::new(),
		install_root: String::new(),
		payload_base: String::new(),
		manifest_digest64: 0,
		resolved_digest64: 0,
		components: Vec::new(),
		steps: Vec::new(),
		dirs: Vec::new(),
		files: Vec::new(),
		id_hash32: 0,
		id_hash64: 0,
	};
	let mut stored32 = 0u32;
	let mut stored64 = 0u64;

	let mut w = tlv::Walker::new(payload);
	let root = match w.next()? {
		Some(t) if t.tag == T_ROOT => t,
		_ => return Err(SetupError::integrity("plan: missing root")),
	};

	let mut rw = tlv::Walker::new(root.value);
	while let Some(t) = rw.next()?
	{
		match t.tag
		{
			T_FLAGS => plan.flags = t.as_u32()?,
			T_OPERATION => plan.operation
					= Operation::from_u8(t.as_u8()?)
						.ok_or_else(|| perr("bad operation"))?,
			T_SCOPE => plan.scope = Scope::from_u8(t.as_u8()?)
					.ok_or_else(|| perr("bad scope"))?,
			T_PRODUCT_ID => plan.product_id = t.as_string()?,
			T_PRODUCT_VERSION =>
					plan.product_version = Version(t.as_string()?),
			T_BUILD_CHANNEL => plan.build_channel = t.as_string()?,
			T_PLATFORM => plan.platform = t.as_string()?,
			T_INSTALL_ROOT => plan.install_root = t.as_string()?,
			T_PAYLOAD_BASE => plan.payload_base = t.as_string()?,
			T_MANIFEST_DIGEST64 =>
					plan.manifest_digest64 = t.as_u64()?,
			T_RESOLVED_DIGEST64 =>
					plan.resolved_digest64 = t.as_u64()?,
			T_ID_HASH32 => stored32 = t.as_u32()?,
			T_ID_HASH64 => stored64 = t.as_u64()?,
			T_COMPONENT => {
				let mut pc = PlanComponent {
					id: String::new(),
					version: Version::default(),
					kind: ComponentKind::default(),
					action: Action::None,
					registrations: Vec::new(),
					markers: Vec::new(),
				};
				let mut cw = tlv::Walker::new(t.value);
				while let Some(c) = cw.next()?
				{
					match c.tag
					{
						T_C_ID => pc.id = c.as_string()?,
						T_C_VERSTR =>
								pc.version = Version(c.as_string()?),
						T_C_KIND => pc.kind
								= ComponentKind::from_u8(c.as_u8()?)
									.ok_or_else(|| perr("bad kind"))?,
						T_C_ACTION => pc.action
								= Action::from_u8(c.as_u8()?)
									.ok_or_else(|| perr("bad action"))?,
						T_C_REGISTRATION =>
								pc.registrations.push(c.as_string()?),
						T_C_MARKER =>
								pc.markers.push(c.as_string()?),
						_ => (),
					}
				}
				plan.components.push(pc);
			},
			T_STEP => {
				let mut kind = None;
				let mut arg = String::new();
				let mut sw = tlv::Walker::new(t.value);
				while let Some(s) = sw.next()?
				{
					match s.tag
					{
						T_S_KIND => kind = StepKind::from_u8(s.as_u8()?),
						T_S_ARG => arg = s.as_string()?,
						_ => (),
					}
				}
				plan.steps.push(Step {
					kind: kind.ok_or_else(|| perr("bad step kind"))?,
					arg,
				});
			},
			T_DIR => plan.dirs.push(t.as_string()?),
			T_FILE => {
				let mut f = PlanFile {
					component_ix: 0,
					rel_target: String::new(),
					payload_kind: PayloadKind::Fileset,
					container_path: String::new(),
					member_path: String::new(),
					size: 0,
					sha256: Sha256Hash::default(),
				};
				let mut fw = tlv::Walker::new(t.value);
				while let Some(ft) = fw.next()?
				{
					match ft.tag
					{
						T_F_COMPONENT_IX =>
								f.component_ix = ft.as_u32()?,
						T_F_REL_TARGET =>
								f.rel_target = ft.as_string()?,
						T_F_PAYLOAD_KIND => f.payload_kind
								= PayloadKind::from_u8(ft.as_u8()?)
									.ok_or_else(||
										perr("bad payload kind"))?,
						T_F_CONTAINER =>
								f.container_path = ft.as_string()?,
						T_F_MEMBER => f.member_path = ft.as_string()?,
						T_F_SIZE => f.size = ft.as_u64()?,
						T_F_SHA256 => f.sha256
								= Sha256Hash::from_slice(ft.value)
									.ok_or_else(||
										perr("bad sha256 length"))?,
						_ => (),
					}
				}
				if f.rel_target.is_empty()
				{ return Err(perr("file without target")); }
				plan.files.push(f);
			},
			_ => (),
		}
	}

	// The stored identity must match a recompute; a plan whose fields
	// and hashes disagree has been edited or mangled.
	plan.compute_ids();
	if plan.id_hash32 != stored32 || plan.id_hash64 != stored64
	{
		return Err(SetupError::integrity(
				"plan: identity hash mismatch"));
	}

	Ok(plan)
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::config::Config;
	use crate::manifest::{flags as mflags, Component, InstallRoot,
			Manifest, Payload};
	use crate::resolve::{self, Request};
	use crate::util::hash::sha256_buf;
	use tempfile::TempDir;

	fn mk_ctx() -> Ctx
	{
		Ctx::new(Config { deterministic: true, seed: Some(3),
				..Config::default() })
	}

	fn mk_manifest() -> Manifest
	{
		Manifest {
			product_id: "dominium".into(),
			product_version: "1.0.0".into(),
			platform_targets: vec!["linux-x86_64".into()],
			install_roots: vec![InstallRoot {
				scope: Scope::Portable,
				platform: "linux-x86_64".into(),
				path: "install".into(),
			}],
			components: vec![Component {
				id: "core".into(),
				flags: mflags::DEFAULT_SELECTED,
				payloads: vec![
					Payload {
						kind: PayloadKind::Fileset,
						container_path: "payload".into(),
						member_path: "bin/hello.txt".into(),
						sha256: sha256_buf(b"hello\n"),
						size: 6,
					},
					Payload {
						kind: PayloadKind::Fileset,
						container_path: "payload".into(),
						member_path: "data/sub/config.json".into(),
						sha256: sha256_buf(b"{\"k\":1}\n"),
						size: 8,
					},
				],
				..Component::default()
			}],
			digest64: 0x77,
			..Manifest::default()
		}
	}

	fn mk_plan(ctx: &mut Ctx) -> Plan
	{
		let m = mk_manifest();
		let rq = Request { operation: Operation::Install,
				scope: Scope::Portable, ..Request::default() };
		let r = resolve::resolve(ctx, &m, None, &rq).unwrap();
		build(ctx, &m, Path::new("work/prod.dsumanifest"), &r).unwrap()
	}

	#[test]
	fn shape()
	{
		let mut ctx = mk_ctx();
		let p = mk_plan(&mut ctx);

		// DECLARE, INSTALL core, WRITE_STATE, WRITE_LOG
		let kinds: Vec<_> = p.steps.iter().map(|s| s.kind).collect();
		assert_eq!(kinds, [
			StepKind::DeclareInstallRoot,
			StepKind::InstallComponent,
			StepKind::WriteState,
			StepKind::WriteLog,
		]);
		assert_eq!(p.steps[1].arg, "core");

		// Parents before children, all prefixes present
		assert_eq!(p.dirs, ["bin", "data", "data/sub"]);

		// Files sorted by (component, target)
		let targets: Vec<_> = p.files.iter()
				.map(|f| f.rel_target.as_str()).collect();
		assert_eq!(targets, ["bin/hello.txt", "data/sub/config.json"]);

		assert_eq!(p.payload_base, "work");
		assert!(p.flags & flags::DETERMINISTIC != 0);
		assert_ne!(p.id_hash32, 0);
		assert_ne!(p.id_hash64, 0);
	}

	#[test]
	fn identity_stable()
	{
		let a = mk_plan(&mut mk_ctx());
		let b = mk_plan(&mut mk_ctx());
		assert_eq!(a.id_hash32, b.id_hash32);
		assert_eq!(a.id_hash64, b.id_hash64);
	}

	#[test]
	fn file_roundtrip_bytewise()
	{
		let td = TempDir::new().unwrap();
		let pa = td.path().join("a.dsuplan");
		let pb = td.path().join("b.dsuplan");

		let plan = mk_plan(&mut mk_ctx());
		write_file(&plan, &pa).unwrap();
		let back = read_file(&pa).unwrap();
		assert_eq!(back.id_hash64, plan.id_hash64);
		assert_eq!(back.files.len(), plan.files.len());
		assert_eq!(back.install_root, "install");

		// Write-out of the re-read plan is byte-identical
		write_file(&back, &pb).unwrap();
		assert_eq!(std::fs::read(&pa).unwrap(),
				std::fs::read(&pb).unwrap());
	}

	#[test]
	fn tamper_caught()
	{
		let td = TempDir::new().unwrap();
		let p = td.path().join("t.dsuplan");
		write_file(&mk_plan(&mut mk_ctx()), &p).unwrap();

		// Flip a payload byte and rewrap so the frame checksum stays
		// valid; the identity hash should still catch it.
		let img = std::fs::read(&p).unwrap();
		let (_, payload) = crate::codec::framed::unwrap(
				*b"DSUP", "plan", &img).unwrap();
		let mut payload = payload.to_vec();
		let ix = payload.len() / 2;
		payload[ix] ^= 0x01;
		let img2 = crate::codec::framed::wrap(*b"DSUP", PLAN_VERSION,
				&payload);
		std::fs::write(&p, img2).unwrap();

		assert!(read_file(&p).is_err());
	}
}
