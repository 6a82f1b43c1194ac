use std::fmt::{self, Display};

use crate::ast::Pos;

/// The kinds of diagnostics the back end can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrMsg {
  /// A fixed resource of the object format was exhausted.
  MaxCapacity(String),
  /// The output path holds a file this compiler did not produce.
  UnknownFile(String),
  /// The object file could not be written.
  ObjectWrite(String),
  /// An internal invariant was violated. These should be unreachable.
  Internal(String),
}

impl Display for ErrMsg {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ErrMsg::MaxCapacity(msg) => write!(f, "{}", msg),
      ErrMsg::UnknownFile(path) => {
        write!(f, "trying to overwrite unknown file: {}", path)
      }
      ErrMsg::ObjectWrite(path) => {
        write!(f, "failed to write object file: {}", path)
      }
      ErrMsg::Internal(msg) => write!(f, "internal: {}", msg),
    }
  }
}

/// A single diagnostic, tied to a source position.
#[derive(Debug, Clone)]
pub struct ErrorReport {
  pub pos: Pos,
  pub err_msg: ErrMsg,
  pub hint: Option<String>,
}

impl Display for ErrorReport {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "[{}:{}] {}", self.pos.line, self.pos.column, self.err_msg)?;

    if let Some(hint) = &self.hint {
      write!(f, " ({})", hint)?;
    }

    Ok(())
  }
}

/// Marker returned by a fatal diagnostic. It carries no data of its own;
/// the reports live in the code generator and are handed back at the
/// public boundary. Every fatal path unwinds through this single type to
/// the caller, which is the one point allowed to abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bail;

/// The result type used throughout the back end.
pub type BailResult<T> = Result<T, Bail>;
