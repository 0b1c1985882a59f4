//! Engine-wide error type.
//!
//! The library never terminates the process; every fallible entry point
//! returns `Result<_, EngineError>`. The binary maps `InputFormat` and
//! `InputContract` to exit code 4 and everything else to a generic failure,
//! matching the tool's historical exit-code convention.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// A malformed input file (pinout, ballout, technology, blockage).
  #[error("input format error in {path}: {reason}")]
  InputFormat { path: PathBuf, reason: String },

  /// Structurally valid input that violates a substrate contract, e.g. two
  /// signals claiming the same point of interest.
  #[error("input contract violation: {0}")]
  InputContract(String),

  /// I/O failure reading inputs or writing artefacts.
  #[error("io error on {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The LP oracle reported the flow problem infeasible.
  #[error("flow problem infeasible for {0}")]
  LpInfeasible(String),

  /// The linear-system oracle failed to converge.
  #[error("linear solve diverged: {0}")]
  KspDiverged(String),
}

impl EngineError {
  pub fn input_format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    EngineError::InputFormat {
      path: path.into(),
      reason: reason.into(),
    }
  }

  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    EngineError::Io {
      path: path.into(),
      source,
    }
  }

  /// Exit code the CLI should report for this error kind.
  pub fn exit_code(&self) -> i32 {
    match self {
      EngineError::InputFormat { .. } | EngineError::InputContract(_) => 4,
      _ => 1,
    }
  }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_codes_by_kind() {
    let format = EngineError::input_format("a.pinout", "bad line");
    assert_eq!(format.exit_code(), 4);
    let contract = EngineError::InputContract("duplicate point".into());
    assert_eq!(contract.exit_code(), 4);

    let io = EngineError::io("a.pinout", std::io::Error::from(std::io::ErrorKind::NotFound));
    assert_eq!(io.exit_code(), 1);
    assert_eq!(EngineError::LpInfeasible("p1".into()).exit_code(), 1);
    assert_eq!(EngineError::KspDiverged("cg".into()).exit_code(), 1);
  }

  #[test]
  fn test_messages_name_the_file() {
    let err = EngineError::input_format("inputs/x.tch", "unknown key");
    let text = err.to_string();
    assert!(text.contains("inputs/x.tch"));
    assert!(text.contains("unknown key"));
  }
}
