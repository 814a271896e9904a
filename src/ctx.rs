//! The engine context.
//!
//! One of these per caller; it owns the configuration, the audit log,
//! and the id generator.  Nothing in here is shared or global, which is
//! most of the point: two contexts can't trample each other, and a test
//! can pin the whole thing down with a seed.

use rand::{RngCore as _, SeedableRng as _};
use rand_pcg::Pcg64;

use crate::audit::AuditLog;
use crate::config::Config;


pub struct Ctx
{
	config: Config,
	audit: AuditLog,
	rng: Pcg64,
}

impl std::fmt::Debug for Ctx
{
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result
	{
		// Pcg64 doesn't Debug usefully, and nobody wants its state in
		// a log anyway.
		f.debug_struct("Ctx")
				.field("config", &self.config)
				.field("audit_events", &self.audit.len())
				.finish()
	}
}


impl Ctx
{
	pub fn new(config: Config) -> Self
	{
		let rng = match config.seed {
			Some(s) => Pcg64::seed_from_u64(s),
			None => {
				// Entropy-seeded.  We only use this for ids, so a
				// thread_rng bootstrap is plenty.
				Pcg64::seed_from_u64(rand::rngs::OsRng.next_u64())
			},
		};
		let audit = AuditLog::new(config.deterministic);
		Self { config, audit, rng }
	}

	/// Context with environment-derived config; the common entry.
	pub fn from_env() -> crate::status::Result<Self>
	{
		Ok(Self::new(Config::from_env()?))
	}

	pub fn config(&self) -> &Config { &self.config }
	pub fn deterministic(&self) -> bool { self.config.deterministic }

	pub fn audit(&self) -> &AuditLog { &self.audit }
	pub fn audit_mut(&mut self) -> &mut AuditLog { &mut self.audit }
	pub fn reset_audit(&mut self) { self.audit.reset(); }

	/// A fresh id (journal id, install-instance id).  Never zero; zero
	/// is the "unset" value in several file fields.
	pub fn next_id(&mut self) -> u64
	{
		loop
		{
			let v = self.rng.next_u64();
			if v != 0 { return v; }
		}
	}
}



#[cfg(test)]
mod tests
{
	use super::*;

	#[test]
	fn seeded_ids_repeat()
	{
		let cfg = Config { seed: Some(42), deterministic: true,
				..Config::default() };
		let mut a = Ctx::new(cfg.clone());
		let mut b = Ctx::new(cfg);

		let ida: Vec<u64> = (0..4).map(|_| a.next_id()).collect();
		let idb: Vec<u64> = (0..4).map(|_| b.next_id()).collect();
		assert_eq!(ida, idb);
		assert!(ida.iter().all(|v| *v != 0));
	}

	#[test]
	fn unseeded_ids_differ()
	{
		let mut a = Ctx::new(Config::default());
		let mut b = Ctx::new(Config::default());
		// Not a guarantee in theory; in practice if these collide,
		// buy a lottery ticket.
		assert_ne!(a.next_id(), b.next_id());
	}
}
