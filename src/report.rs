//! Deterministic reporting over installed state.
//!
//! Everything here reads; nothing writes.  Reports come out sorted and
//! stable, so two runs over the same install produce byte-identical
//! output in both the JSON and text renderings.  That's a feature the
//! test suite leans on, not an accident.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::paths::RootSet;
use crate::platform;
use crate::state::{Ownership, State};
use crate::status::{Result, SetupError};
use crate::util::hash::sha256_file;


/// Output renderings.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Format
{
	Json,
	Text,
}


/// Verify classifications, in display order.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[derive(serde::Serialize)]
#[derive(strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FileStatus
{
	Ok,
	Missing,
	Modified,
	Extra,
}


/// The counters the §-verify report hands back next to its prose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[derive(serde::Serialize)]
pub struct VerifySummary
{
	pub checked: u32,
	pub ok: u32,
	pub missing: u32,
	pub modified: u32,
	pub extra: u32,
	pub errors: u32,
}


#[derive(Debug, serde::Serialize)]
struct VerifyRow
{
	root_index: u32,
	path: String,
	component: String,
	status: FileStatus,
}

#[derive(Debug, serde::Serialize)]
struct VerifyReport<'a>
{
	product_id: &'a str,
	product_version: &'a str,
	rows: Vec<VerifyRow>,
	summary: VerifySummary,
}


fn roots_of(state: &State) -> Result<RootSet>
{
	let mut roots = RootSet::new();
	for ir in &state.install_roots
	{
		roots.add(&ir.path_abs)?;
	}
	Ok(roots)
}


/// Recursively gather every file under `dir` as a sorted list of
/// canonical rel paths.  `.dsu/` bookkeeping is not part of anybody's
/// inventory.
fn walk_tree(base: &PathBuf, prefix: &str, out: &mut Vec<String>)
		-> Result<()>
{
	let names = platform::list_dir(base).map_err(|e|
			SetupError::io(format!("walk {}: {e}", base.display())))?;
	for name in names
	{
		let name = match name.to_str() {
			Some(n) => n.to_string(),
			// Paths we can't even name can't be in a state file either;
			// surface them as-is, lossily.
			None => name.to_string_lossy().into_owned(),
		};
		let rel = match prefix.is_empty() {
			true => name.clone(),
			false => format!("{prefix}/{name}"),
		};
		if rel == crate::state::STATE_REL_DIR { continue; }

		let abs = base.join(&name);
		let info = platform::path_info(&abs);
		match info.is_dir && !info.is_symlink
		{
			true => walk_tree(&abs, &rel, out)?,
			false => out.push(rel),
		}
	}
	Ok(())
}


/// The verify report: every declared file classified, optionally plus
/// the files on disk that nobody declared.
pub fn verify(state: &State, format: Format, include_extra: bool)
		-> Result<(String, VerifySummary)>
{
	let roots = roots_of(state)?;
	let mut summary = VerifySummary::default();
	let mut rows = Vec::new();

	// Declared files, already canonically ordered within components;
	// collect then sort rows by (root, path, component) for output.
	for (comp, f) in state.files()
	{
		summary.checked += 1;
		let status = (|| {
			let abs = match roots.resolve(f.root_index, &f.rel_path) {
				Ok(a) => a,
				Err(_) => return FileStatus::Modified,
			};
			if !platform::path_info(&abs).exists
			{ return FileStatus::Missing; }
			match sha256_file(&abs)
			{
				Ok((sha, size))
						if sha == f.sha256 && size == f.size
						=> FileStatus::Ok,
				Ok(_) => FileStatus::Modified,
				Err(_) => FileStatus::Modified,
			}
		})();
		match status
		{
			FileStatus::Ok => summary.ok += 1,
			FileStatus::Missing => summary.missing += 1,
			FileStatus::Modified => summary.modified += 1,
			FileStatus::Extra => (),
		}
		rows.push(VerifyRow {
			root_index: f.root_index,
			path: f.rel_path.clone(),
			component: comp.id.clone(),
			status,
		});
	}

	// Extra files: on disk, not in state.
	if include_extra
	{
		let declared: BTreeSet<(u32, &str)> = state.files()
				.map(|(_, f)| (f.root_index, f.rel_path.as_str()))
				.collect();
		for (ix, ir) in state.install_roots.iter().enumerate()
		{
			let base = PathBuf::from(&ir.path_abs);
			if !platform::path_info(&base).exists { continue; }
			let mut found = Vec::new();
			walk_tree(&base, "", &mut found)?;
			for rel in found
			{
				if !declared.contains(&(ix as u32, rel.as_str()))
				{
					summary.extra += 1;
					rows.push(VerifyRow {
						root_index: ix as u32,
						path: rel,
						component: String::new(),
						status: FileStatus::Extra,
					});
				}
			}
		}
	}

	rows.sort_unstable_by(|a, b|
			(a.root_index, a.path.as_str(), a.component.as_str())
				.cmp(&(b.root_index, b.path.as_str(),
					b.component.as_str())));

	let text = match format
	{
		Format::Json => {
			let rep = VerifyReport {
				product_id: &state.product_id,
				product_version: state.product_version.as_str(),
				rows,
				summary,
			};
			to_json(&rep)?
		},
		Format::Text => {
			let mut s = String::new();
			let _ = writeln!(s, "verify {} {}", state.product_id,
					state.product_version);
			for r in &rows
			{
				let _ = writeln!(s, "  {:<8} {}:{}  {}", r.status,
						r.root_index, r.path, r.component);
			}
			let _ = writeln!(s, "checked={} ok={} missing={} \
					modified={} extra={} errors={}",
					summary.checked, summary.ok, summary.missing,
					summary.modified, summary.extra, summary.errors);
			s
		},
	};

	Ok((text, summary))
}


#[derive(Debug, serde::Serialize)]
struct InventoryComponent<'a>
{
	id: &'a str,
	version: &'a str,
	kind: String,
	files: u32,
	registrations: &'a [String],
	markers: &'a [String],
}

#[derive(Debug, serde::Serialize)]
struct Inventory<'a>
{
	product_id: &'a str,
	product_version: &'a str,
	platform: &'a str,
	scope: String,
	install_roots: Vec<&'a str>,
	components: Vec<InventoryComponent<'a>>,
}


/// What's installed, per component.
pub fn list_installed(state: &State, format: Format) -> Result<String>
{
	let inv = Inventory {
		product_id: &state.product_id,
		product_version: state.product_version.as_str(),
		platform: &state.platform,
		scope: state.scope.to_string(),
		install_roots: state.install_roots.iter()
				.map(|r| r.path_abs.as_str()).collect(),
		components: state.components.iter()
				.map(|c| InventoryComponent {
					id: &c.id,
					version: c.version.as_str(),
					kind: c.kind.to_string(),
					files: c.files.len() as u32,
					registrations: &c.registrations,
					markers: &c.markers,
				})
				.collect(),
	};

	match format
	{
		Format::Json => to_json(&inv),
		Format::Text => {
			let mut s = String::new();
			let _ = writeln!(s, "{} {} ({}, {})", inv.product_id,
					inv.product_version, inv.platform, inv.scope);
			for c in &inv.components
			{
				let _ = writeln!(s, "  {} {} [{}] {} file{}", c.id,
						c.version, c.kind, c.files,
						crate::util::plural(c.files as usize));
			}
			Ok(s)
		},
	}
}


/// Every path the install owns, flat and sorted.
pub fn touched_paths(state: &State, format: Format) -> Result<String>
{
	let mut paths: Vec<(u32, &str)> = state.files()
			.map(|(_, f)| (f.root_index, f.rel_path.as_str()))
			.collect();
	paths.sort_unstable();
	paths.dedup();

	match format
	{
		Format::Json => {
			#[derive(serde::Serialize)]
			struct Row<'a> { root_index: u32, path: &'a str }
			let rows: Vec<Row> = paths.into_iter()
					.map(|(root_index, path)| Row { root_index, path })
					.collect();
			to_json(&rows)
		},
		Format::Text => {
			let mut s = String::new();
			for (ix, p) in paths
			{
				let _ = writeln!(s, "{ix}:{p}");
			}
			Ok(s)
		},
	}
}


#[derive(Debug, serde::Serialize)]
struct PreviewRow<'a>
{
	root_index: u32,
	path: &'a str,
	component: &'a str,
	ownership: String,
	removed: bool,
}


/// What an uninstall of `components` (empty = everything) would do.
/// Sorted by (root, path) then owning component.
pub fn uninstall_preview(state: &State, components: &[String],
		format: Format)
		-> Result<String>
{
	use itertools::Itertools as _;

	let all = components.is_empty();
	let mut rows: Vec<PreviewRow> = state.files()
			.filter(|(c, _)| all || components.contains(&c.id))
			.map(|(c, f)| PreviewRow {
				root_index: f.root_index,
				path: &f.rel_path,
				component: &c.id,
				ownership: f.ownership.to_string(),
				removed: f.ownership == Ownership::Owned,
			})
			.collect();
	rows.sort_unstable_by(|a, b|
			(a.root_index, a.path, a.component)
				.cmp(&(b.root_index, b.path, b.component)));

	match format
	{
		Format::Json => to_json(&rows),
		Format::Text => {
			let mut s = String::new();
			for r in rows.iter()
			{
				let verb = match r.removed {
					true => "remove",
					false => "keep",
				};
				let _ = writeln!(s, "{:<7} {}:{}  {} ({})", verb,
						r.root_index, r.path, r.component, r.ownership);
			}
			let nrm = rows.iter().filter(|r| r.removed).count();
			let nkeep = rows.len() - nrm;
			let comps = rows.iter().map(|r| r.component)
					.unique().count();
			let _ = writeln!(s, "{nrm} removed, {nkeep} kept, \
					{comps} component{}", crate::util::plural(comps));
			Ok(s)
		},
	}
}


fn to_json<T: serde::Serialize>(v: &T) -> Result<String>
{
	serde_json::to_string_pretty(v)
			.map_err(|e| SetupError::internal(format!("report json: {e}")))
}



#[cfg(test)]
mod tests
{
	use super::*;
	use crate::state::tests::mk_state;
	use tempfile::TempDir;

	/// Put the mk_state files on disk under a real root.
	fn materialize(td: &TempDir) -> crate::state::State
	{
		let root = td.path().to_str().unwrap();
		let mut st = mk_state(root);
		st.canonicalize().unwrap();

		for (_, f) in st.files()
		{
			let abs = td.path().join(&f.rel_path);
			std::fs::create_dir_all(abs.parent().unwrap()).unwrap();
			let bytes: &[u8] = match f.rel_path.as_str() {
				"bin/hello.txt" => b"hello\n",
				"data/config.json" => b"{\"k\":1}\n",
				"tools/tools.txt" => b"tools\n",
				_ => b"",
			};
			std::fs::write(&abs, bytes).unwrap();
		}
		st
	}

	#[test]
	fn verify_classification()
	{
		let td = TempDir::new().unwrap();
		let st = materialize(&td);

		// Pristine: all ok
		let (_, sum) = verify(&st, Format::Text, false).unwrap();
		assert_eq!(sum.checked, 4);
		assert_eq!(sum.ok, 4);

		// Delete one, modify another
		std::fs::remove_file(td.path().join("tools/tools.txt")).unwrap();
		std::fs::write(td.path().join("bin/hello.txt"), b"tampered\n")
				.unwrap();
		let (text, sum) = verify(&st, Format::Text, false).unwrap();
		assert_eq!(sum.checked, 4);
		assert_eq!(sum.ok, 2);
		assert_eq!(sum.missing, 1);
		assert_eq!(sum.modified, 1);
		assert!(text.contains("missing"));
		assert!(text.contains("modified"));
	}

	#[test]
	fn verify_extra_files()
	{
		let td = TempDir::new().unwrap();
		let st = materialize(&td);

		// A stray file shows as extra; .dsu content doesn't.
		std::fs::write(td.path().join("bin/stray.txt"), b"?").unwrap();
		std::fs::create_dir_all(td.path().join(".dsu")).unwrap();
		std::fs::write(td.path()
				.join(".dsu/installed_state.dsustate"), b"x").unwrap();

		let (text, sum) = verify(&st, Format::Text, true).unwrap();
		assert_eq!(sum.extra, 1);
		assert!(text.contains("bin/stray.txt"));
		assert!(!text.contains("installed_state"));
	}

	#[test]
	fn reports_deterministic()
	{
		let td = TempDir::new().unwrap();
		let st = materialize(&td);

		for fmt in [Format::Json, Format::Text]
		{
			let a = verify(&st, fmt, true).unwrap().0;
			let b = verify(&st, fmt, true).unwrap().0;
			assert_eq!(a, b);

			assert_eq!(list_installed(&st, fmt).unwrap(),
					list_installed(&st, fmt).unwrap());
			assert_eq!(touched_paths(&st, fmt).unwrap(),
					touched_paths(&st, fmt).unwrap());
			assert_eq!(uninstall_preview(&st, &[], fmt).unwrap(),
					uninstall_preview(&st, &[], fmt).unwrap());
		}
	}

	#[test]
	fn preview_shape()
	{
		let td = TempDir::new().unwrap();
		let st = materialize(&td);

		let text = uninstall_preview(&st, &[], Format::Text).unwrap();
		// user_data kept, owned removed
		assert!(text.contains("keep    0:user/prefs.txt"));
		assert!(text.contains("remove  0:bin/hello.txt"));

		// Scoped to one component
		let text = uninstall_preview(&st, &["tools".to_string()],
				Format::Text).unwrap();
		assert!(text.contains("tools/tools.txt"));
		assert!(!text.contains("bin/hello.txt"));
	}
}
