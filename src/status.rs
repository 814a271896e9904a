//! Status taxonomy.
//!
//! Every fallible operation in the engine resolves to one of these kinds
//! sooner or later.  The per-module error enums carry the detail; this is
//! the coarse classification the CLI turns into an exit code, and the
//! thing tests match on.

use std::process::ExitCode;


/// The coarse status of a failed (or successful) engine operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Status
{
	Success,
	InvalidArgs,
	InvalidRequest,
	IoError,
	ParseError,
	UnsupportedVersion,
	IntegrityError,
	PlatformIncompatible,
	IllegalDowngrade,
	ExplicitConflict,
	MissingComponent,
	UnsatisfiedDependency,
	VersionConflict,
	InternalError,
}


impl Status
{
	/// The exit-code contract.  0/2..7 are fixed; domain failures get
	/// their own positive codes above that.
	pub fn exit_code(&self) -> u8
	{
		use Status as S;
		match self
		{
			S::Success            => 0,
			S::InvalidArgs        => 2,
			S::IoError            => 3,
			S::ParseError         => 4,
			S::UnsupportedVersion => 5,
			S::IntegrityError     => 6,
			S::InternalError      => 7,

			// Domain failures
			S::InvalidRequest        => 8,
			S::PlatformIncompatible  => 9,
			S::IllegalDowngrade      => 10,
			S::ExplicitConflict      => 11,
			S::MissingComponent      => 12,
			S::UnsatisfiedDependency => 13,
			S::VersionConflict       => 14,
		}
	}
}


/// The error type the public API surfaces.  It's a kind plus a human
/// blurb; the blurb is for people, the kind is for programs.
#[derive(Debug)]
#[derive(thiserror::Error)]
#[error("{status}: {msg}")]
pub struct SetupError
{
	pub status: Status,
	pub msg: String,
}


impl SetupError
{
	pub fn new(status: Status, msg: impl Into<String>) -> Self
	{
		Self { status, msg: msg.into() }
	}

	pub fn status(&self) -> Status { self.status }


	/*
	 * Shorthands; these read a lot better at call sites than
	 * SetupError::new(Status::Whatever, ...) everywhere.
	 */
	pub fn invalid_args(msg: impl Into<String>) -> Self
	{ Self::new(Status::InvalidArgs, msg) }

	pub fn invalid_request(msg: impl Into<String>) -> Self
	{ Self::new(Status::InvalidRequest, msg) }

	pub fn io(msg: impl Into<String>) -> Self
	{ Self::new(Status::IoError, msg) }

	pub fn parse(msg: impl Into<String>) -> Self
	{ Self::new(Status::ParseError, msg) }

	pub fn unsupported_version(msg: impl Into<String>) -> Self
	{ Self::new(Status::UnsupportedVersion, msg) }

	pub fn integrity(msg: impl Into<String>) -> Self
	{ Self::new(Status::IntegrityError, msg) }

	pub fn internal(msg: impl Into<String>) -> Self
	{ Self::new(Status::InternalError, msg) }
}


impl From<std::io::Error> for SetupError
{
	fn from(e: std::io::Error) -> Self
	{
		Self::new(Status::IoError, e.to_string())
	}
}

impl From<SetupError> for ExitCode
{
	fn from(e: SetupError) -> Self
	{
		e.status.exit_code().into()
	}
}


/// The usual result alias.
pub type Result<T> = std::result::Result<T, SetupError>;



#[cfg(test)]
mod tests
{
	use super::Status;

	#[test]
	fn exit_codes()
	{
		// The fixed part of the contract; if these move, somebody's
		// scripts break.
		assert_eq!(Status::Success.exit_code(), 0);
		assert_eq!(Status::InvalidArgs.exit_code(), 2);
		assert_eq!(Status::IoError.exit_code(), 3);
		assert_eq!(Status::ParseError.exit_code(), 4);
		assert_eq!(Status::UnsupportedVersion.exit_code(), 5);
		assert_eq!(Status::IntegrityError.exit_code(), 6);
		assert_eq!(Status::InternalError.exit_code(), 7);
	}

	#[test]
	fn names()
	{
		// Stringy names are part of the report/JSON surface.
		assert_eq!(Status::UnsupportedVersion.to_string(),
				"unsupported_version");
		assert_eq!(Status::IllegalDowngrade.to_string(),
				"illegal_downgrade");
		let st: Status = "integrity_error".parse().unwrap();
		assert_eq!(st, Status::IntegrityError);
	}
}
