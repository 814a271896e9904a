//! Manifest file (de)serialization.
//!
//! Magic `DSUM`, framed header, one root TLV.  Serialization is
//! canonical (fixed field order, components in declaration order), so
//! the file bytes are a stable identity for the manifest; digest64 of
//! the payload is the `manifest_digest64` everything downstream quotes.

use std::path::Path;

use crate::codec::{framed, tlv, digest::digest64_buf};
use crate::status::{Result, SetupError, Status};
use crate::util::hash::Sha256Hash;

use super::{Action, ActionKind, Component, ComponentKind, Dep,
		InstallRoot, Manifest, Payload, PayloadKind, Scope, Version};


const MAGIC: [u8; 4] = *b"DSUM";
pub const MANIFEST_VERSION: u16 = 1;

// Root
const T_ROOT: u16 = 0x0001;
const T_ROOT_VERSION: u16 = 0x0002;

// Product
const T_PRODUCT_ID: u16 = 0x0010;
const T_PRODUCT_VERSION: u16 = 0x0011;
const T_BUILD_CHANNEL: u16 = 0x0012;

// Platforms
const T_PLATFORM_TARGET: u16 = 0x0020;

// Install roots
const T_INSTALL_ROOT: u16 = 0x0030;
const T_IR_VERSION: u16 = 0x0031;
const T_IR_SCOPE: u16 = 0x0032;
const T_IR_PLATFORM: u16 = 0x0033;
const T_IR_PATH: u16 = 0x0034;

// Components
const T_COMPONENT: u16 = 0x0040;
const T_C_VERSION: u16 = 0x0041;
const T_C_ID: u16 = 0x0042;
const T_C_VERSTR: u16 = 0x0043;
const T_C_KIND: u16 = 0x0044;
const T_C_FLAGS: u16 = 0x0045;
const T_C_DEP: u16 = 0x0046;
const T_C_DEP_ID: u16 = 0x0047;
const T_C_DEP_CONSTRAINT: u16 = 0x0048;
const T_C_CONFLICT: u16 = 0x0049;

// Payloads
const T_PAYLOAD: u16 = 0x0050;
const T_P_VERSION: u16 = 0x0051;
const T_P_KIND: u16 = 0x0052;
const T_P_CONTAINER: u16 = 0x0053;
const T_P_MEMBER: u16 = 0x0054;
const T_P_SHA256: u16 = 0x0055;
const T_P_SIZE: u16 = 0x0056;

// Actions
const T_ACTION: u16 = 0x0060;
const T_A_KIND: u16 = 0x0061;
const T_A_ARG: u16 = 0x0062;


fn perr(msg: impl Into<String>) -> SetupError
{
	SetupError::new(Status::ParseError, msg.into())
}


/*
 * Writing
 */

fn payload_bytes(m: &Manifest) -> Vec<u8>
{
	let mut root = Vec::new();
	tlv::put_u32(&mut root, T_ROOT_VERSION, MANIFEST_VERSION as u32);
	tlv::put_str(&mut root, T_PRODUCT_ID, &m.product_id);
	tlv::put_str(&mut root, T_PRODUCT_VERSION, m.product_version.as_str());
	tlv::put_str(&mut root, T_BUILD_CHANNEL, &m.build_channel);

	for pt in &m.platform_targets
	{
		tlv::put_str(&mut root, T_PLATFORM_TARGET, pt);
	}

	for ir in &m.install_roots
	{
		let mut b = Vec::new();
		tlv::put_u32(&mut b, T_IR_VERSION, 1);
		tlv::put_u8(&mut b, T_IR_SCOPE, ir.scope.to_u8());
		tlv::put_str(&mut b, T_IR_PLATFORM, &ir.platform);
		tlv::put_str(&mut b, T_IR_PATH, &ir.path);
		tlv::put(&mut root, T_INSTALL_ROOT, &b);
	}

	for c in &m.components
	{
		let mut cb = Vec::new();
		tlv::put_u32(&mut cb, T_C_VERSION, 1);
		tlv::put_str(&mut cb, T_C_ID, &c.id);
		if let Some(v) = &c.version
		{
			tlv::put_str(&mut cb, T_C_VERSTR, v.as_str());
		}
		tlv::put_u8(&mut cb, T_C_KIND, c.kind.to_u8());
		tlv::put_u32(&mut cb, T_C_FLAGS, c.flags);

		for d in &c.deps
		{
			let mut db = Vec::new();
			tlv::put_str(&mut db, T_C_DEP_ID, &d.id);
			tlv::put_str(&mut db, T_C_DEP_CONSTRAINT, &d.constraint);
			tlv::put(&mut cb, T_C_DEP, &db);
		}
		for cf in &c.conflicts
		{
			tlv::put_str(&mut cb, T_C_CONFLICT, cf);
		}

		for p in &c.payloads
		{
			let mut pb = Vec::new();
			tlv::put_u32(&mut pb, T_P_VERSION, 1);
			tlv::put_u8(&mut pb, T_P_KIND, p.kind.to_u8());
			tlv::put_str(&mut pb, T_P_CONTAINER, &p.container_path);
			tlv::put_str(&mut pb, T_P_MEMBER, &p.member_path);
			tlv::put(&mut pb, T_P_SHA256, p.sha256.as_bytes());
			tlv::put_u64(&mut pb, T_P_SIZE, p.size);
			tlv::put(&mut cb, T_PAYLOAD, &pb);
		}

		for a in &c.actions
		{
			let mut ab = Vec::new();
			tlv::put_u8(&mut ab, T_A_KIND, a.kind.to_u8());
			tlv::put_str(&mut ab, T_A_ARG, &a.arg);
			tlv::put(&mut cb, T_ACTION, &ab);
		}

		tlv::put(&mut root, T_COMPONENT, &cb);
	}

	let mut payload = Vec::new();
	tlv::put(&mut payload, T_ROOT, &root);
	payload
}


/// Serialize and write a manifest.  Mostly for tooling and tests; the
/// engine proper only reads these.  Fills in `digest64` as a side
/// effect, same as loading would.
pub fn write_file(m: &mut Manifest, path: &Path) -> Result<()>
{
	m.validate()?;
	let payload = payload_bytes(m);
	m.digest64 = digest64_buf(&payload);
	let img = framed::wrap(MAGIC, MANIFEST_VERSION, &payload);
	std::fs::write(path, img)?;
	Ok(())
}


/*
 * Reading
 */

fn parse_install_root(buf: &[u8]) -> Result<InstallRoot>
{
	let mut scope = None;
	let mut platform = None;
	let mut path = None;

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_IR_SCOPE => scope = Some(Scope::from_u8(t.as_u8()?)
					.ok_or_else(|| perr("manifest: bad scope byte"))?),
			T_IR_PLATFORM => platform = Some(t.as_string()?),
			T_IR_PATH => path = Some(t.as_string()?),
			_ => (),
		}
	}

	Ok(InstallRoot {
		scope: scope.ok_or_else(|| perr("install root: no scope"))?,
		platform: platform
				.ok_or_else(|| perr("install root: no platform"))?,
		path: path.ok_or_else(|| perr("install root: no path"))?,
	})
}

fn parse_payload(buf: &[u8]) -> Result<Payload>
{
	let mut kind = PayloadKind::default();
	let mut container = None;
	let mut member = None;
	let mut sha256 = None;
	let mut size = 0u64;

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_P_KIND => kind = PayloadKind::from_u8(t.as_u8()?)
					.ok_or_else(|| perr("payload: bad kind byte"))?,
			T_P_CONTAINER => container = Some(t.as_string()?),
			T_P_MEMBER => member = Some(t.as_string()?),
			T_P_SHA256 => sha256 = Some(Sha256Hash::from_slice(t.value)
					.ok_or_else(|| perr("payload: bad sha256 length"))?),
			T_P_SIZE => size = t.as_u64()?,
			_ => (),
		}
	}

	Ok(Payload {
		kind,
		container_path: container
				.ok_or_else(|| perr("payload: no container path"))?,
		member_path: member
				.ok_or_else(|| perr("payload: no member path"))?,
		sha256: sha256.ok_or_else(|| perr("payload: no sha256"))?,
		size,
	})
}

fn parse_component(buf: &[u8]) -> Result<Component>
{
	let mut c = Component::default();

	let mut w = tlv::Walker::new(buf);
	while let Some(t) = w.next()?
	{
		match t.tag
		{
			T_C_ID => c.id = t.as_string()?,
			T_C_VERSTR => c.version = Some(Version(t.as_string()?)),
			T_C_KIND => c.kind = ComponentKind::from_u8(t.as_u8()?)
					.ok_or_else(|| perr("component: bad kind byte"))?,
			T_C_FLAGS => c.flags = t.as_u32()?,
			T_C_DEP => {
				let mut id = None;
				let mut constraint = String::new();
				let mut dw = tlv::Walker::new(t.value);
				while let Some(d) = dw.next()?
				{
					match d.tag
					{
						T_C_DEP_ID => id = Some(d.as_string()?),
						T_C_DEP_CONSTRAINT =>
								constraint = d.as_string()?,
						_ => (),
					}
				}
				c.deps.push(Dep {
					id: id.ok_or_else(|| perr("dep: no id"))?,
					constraint,
				});
			},
			T_C_CONFLICT => c.conflicts.push(t.as_string()?),
			T_PAYLOAD => c.payloads.push(parse_payload(t.value)?),
			T_ACTION => {
				let mut kind = None;
				let mut arg = String::new();
				let mut aw = tlv::Walker::new(t.value);
				while let Some(a) = aw.next()?
				{
					match a.tag
					{
						T_A_KIND => kind = ActionKind::from_u8(a.as_u8()?),
						T_A_ARG => arg = a.as_string()?,
						_ => (),
					}
				}
				c.actions.push(Action {
					kind: kind
							.ok_or_else(|| perr("action: bad kind"))?,
					arg,
				});
			},
			_ => (),
		}
	}

	if c.id.is_empty() { return Err(perr("component: no id")); }
	Ok(c)
}


/// Load a manifest from disk: framing, version policy, parse, validate.
pub fn load_file(path: &Path) -> Result<Manifest>
{
	let bytes = std::fs::read(path).map_err(|e|
			SetupError::io(format!("read {}: {e}", path.display())))?;

	let (version, payload) = framed::unwrap(MAGIC, "manifest", &bytes)?;
	if version > MANIFEST_VERSION
	{
		return Err(SetupError::unsupported_version(format!(
				"manifest version {version} > {MANIFEST_VERSION}")));
	}

	let mut m = Manifest { digest64: digest64_buf(payload),
			..Manifest::default() };

	let mut w = tlv::Walker::new(payload);
	let root = match w.next()? {
		Some(t) if t.tag == T_ROOT => t,
		_ => return Err(SetupError::integrity("manifest: missing root")),
	};

	let mut rw = tlv::Walker::new(root.value);
	while let Some(t) = rw.next()?
	{
		match t.tag
		{
			T_ROOT_VERSION => {
				let v = t.as_u32()?;
				if v > MANIFEST_VERSION as u32
				{
					return Err(SetupError::unsupported_version(format!(
							"manifest root version {v}")));
				}
			},
			T_PRODUCT_ID => m.product_id = t.as_string()?,
			T_PRODUCT_VERSION =>
					m.product_version = Version(t.as_string()?),
			T_BUILD_CHANNEL => m.build_channel = t.as_string()?,
			T_PLATFORM_TARGET => m.platform_targets.push(t.as_string()?),
			T_INSTALL_ROOT =>
					m.install_roots.push(parse_install_root(t.value)?),
			T_COMPONENT => m.components.push(parse_component(t.value)?),
			_ => (),
		}
	}

	m.validate()?;
	Ok(m)
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::manifest::flags;
	use crate::util::hash::sha256_buf;
	use tempfile::TempDir;

	pub(crate) fn sample() -> Manifest
	{
		Manifest {
			product_id: "dominium".into(),
			product_version: "1.0.0".into(),
			build_channel: "stable".into(),
			platform_targets: vec!["linux-x86_64".into()],
			install_roots: vec![InstallRoot {
				scope: Scope::Portable,
				platform: "linux-x86_64".into(),
				path: "install".into(),
			}],
			components: vec![Component {
				id: "core".into(),
				kind: ComponentKind::Core,
				flags: flags::DEFAULT_SELECTED,
				payloads: vec![Payload {
					kind: PayloadKind::Fileset,
					container_path: "payload".into(),
					member_path: "bin/hello.txt".into(),
					sha256: sha256_buf(b"hello\n"),
					size: 6,
				}],
				actions: vec![Action {
					kind: ActionKind::Marker,
					arg: "core-installed".into(),
				}],
				..Component::default()
			}],
			..Manifest::default()
		}
	}

	#[test]
	fn roundtrip()
	{
		let td = TempDir::new().unwrap();
		let p = td.path().join("prod.dsumanifest");

		let mut m = sample();
		write_file(&mut m, &p).unwrap();
		assert_ne!(m.digest64, 0);

		let back = load_file(&p).unwrap();
		assert_eq!(back.product_id, "dominium");
		assert_eq!(back.product_version.as_str(), "1.0.0");
		assert_eq!(back.digest64, m.digest64);
		assert_eq!(back.components.len(), 1);
		let c = &back.components[0];
		assert_eq!(c.id, "core");
		assert!(c.default_selected());
		assert_eq!(c.payloads.len(), 1);
		assert_eq!(c.payloads[0].member_path, "bin/hello.txt");
		assert_eq!(c.payloads[0].size, 6);
		assert_eq!(c.actions.len(), 1);
	}

	#[test]
	fn deterministic_bytes()
	{
		let td = TempDir::new().unwrap();
		let pa = td.path().join("a");
		let pb = td.path().join("b");
		write_file(&mut sample(), &pa).unwrap();
		write_file(&mut sample(), &pb).unwrap();
		assert_eq!(std::fs::read(&pa).unwrap(),
				std::fs::read(&pb).unwrap());
	}

	#[test]
	fn corruption_and_version()
	{
		use crate::status::Status;
		let td = TempDir::new().unwrap();
		let p = td.path().join("m");
		write_file(&mut sample(), &p).unwrap();

		// Truncation: integrity
		let img = std::fs::read(&p).unwrap();
		std::fs::write(&p, &img[..img.len() - 2]).unwrap();
		let e = load_file(&p).unwrap_err();
		assert_eq!(e.status(), Status::IntegrityError);

		// Future version: unsupported.  Patch version bytes and redo
		// the header checksum by rewrapping.
		let (_, payload) = crate::codec::framed::unwrap(
				*b"DSUM", "m", &img).unwrap();
		let img2 = crate::codec::framed::wrap(*b"DSUM", 99, payload);
		std::fs::write(&p, img2).unwrap();
		let e = load_file(&p).unwrap_err();
		assert_eq!(e.status(), Status::UnsupportedVersion);
	}
}
