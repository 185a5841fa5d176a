//! Attempt-fatal errors. Unification failure is never represented here: it
//! is an expected negative result carried as `Option`/`bool` by the movers.

use std::fmt;

#[derive(Debug)]
pub enum FatalError {
  /// A library record violating the record grammar. The library file is
  /// well-formed by construction, so this means a corrupted or hand-edited
  /// file.
  MalformedRecord { offset: u64, msg: String },
  /// The sort checker rejected a freshly appended statement.
  SortFailure { stmt: String, msg: String },
}

impl fmt::Display for FatalError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FatalError::MalformedRecord { offset, msg } =>
        write!(f, "malformed library record at offset {offset}: {msg}"),
      FatalError::SortFailure { stmt, msg } => write!(f, "sort failure in '{stmt}': {msg}"),
    }
  }
}

impl std::error::Error for FatalError {}

impl FatalError {
  pub fn report(&self, path: &std::path::Path) -> ! {
    eprintln!("error in {}: {self}", path.display());
    std::process::exit(1)
  }
}
