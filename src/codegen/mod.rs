use std::path::PathBuf;

use crate::ast::{Ast, Format, Pos};
use crate::errors::{Bail, BailResult, ErrMsg, ErrorReport};
use crate::pcode::Pcode;

mod chunk;
mod expr;
mod indexer;
mod object;
mod stmt;

pub use object::BUFFER_SIZE;

/// Driver-provided settings for one publication.
pub struct Options {
  pub object_file: PathBuf,
}

/// The synthesized map array holding run-time dimension metadata for
/// multi-dimensional arrays and structure members.
#[derive(Default)]
pub struct SharedArray {
  pub used: bool,
  pub index: i32,
  pub size: i32,
  pub diminfo_size: i32,
}

/// A forward jump awaiting its destination.
#[derive(Debug, Clone, Copy)]
pub struct JumpMark {
  pub pos: i32,
  pub opc: Pcode,
}

/// The state of one code-generation task. Owns the output buffer, the
/// instruction-emitter state and the diagnostics; borrows the AST for
/// the duration of the task, writing back only assigned slots, sizes,
/// offsets and usage flags.
pub struct Codegen<'a> {
  pub ast: &'a mut Ast,
  options: &'a Options,
  pub diags: Vec<ErrorReport>,
  // Object buffer.
  buffers: Vec<object::Buffer>,
  current: usize,
  // Instruction-emitter state.
  opc: Pcode,
  opc_args: usize,
  push_immediate: bool,
  immediates: std::collections::VecDeque<i32>,
  pub compress: bool,
  // Run-time dimension metadata.
  pub shared_array: SharedArray,
  // Call sites of nested functions, patched once every body of the
  // enclosing script or function has been written, and the position
  // each call site resumes at.
  nested_jumps: Vec<(JumpMark, crate::ast::FuncIdx)>,
  nested_returns: hashbrown::HashMap<crate::ast::NodeIdx, i32>,
}

impl<'a> Codegen<'a> {
  pub fn new(ast: &'a mut Ast, options: &'a Options) -> Self {
    Codegen {
      ast,
      options,
      diags: vec![],
      buffers: vec![object::Buffer::new()],
      current: 0,
      opc: Pcode::Nop,
      opc_args: 0,
      push_immediate: false,
      immediates: std::collections::VecDeque::new(),
      compress: false,
      shared_array: SharedArray::default(),
      nested_jumps: vec![],
      nested_returns: hashbrown::HashMap::new(),
    }
  }

  /// Publishes the main library into its object file.
  ///
  /// # Returns:
  /// The diagnostics of the task, when any of them was fatal.
  pub fn publish(ast: &'a mut Ast, options: &'a Options) -> Result<(), Vec<ErrorReport>> {
    let mut codegen = Codegen::new(ast, options);

    match codegen.run() {
      Ok(()) => Ok(()),
      Err(Bail) => Err(codegen.diags),
    }
  }

  fn run(&mut self) -> BailResult<()> {
    self.ast.strings.link_usable();
    self.alloc_indexes()?;
    self.write_object()?;
    Ok(())
  }

  pub(super) fn object_file(&self) -> &PathBuf {
    &self.options.object_file
  }

  /// Records a diagnostic.
  pub(super) fn diag(&mut self, pos: Pos, err_msg: ErrMsg, hint: Option<String>) {
    self.diags.push(ErrorReport { pos, err_msg, hint });
  }

  /// Records a diagnostic and aborts the task.
  pub(super) fn bail<T>(&mut self, pos: Pos, err_msg: ErrMsg, hint: Option<String>) -> BailResult<T> {
    self.diag(pos, err_msg, hint);
    Err(Bail)
  }

  pub(super) fn is_little_e(&self) -> bool {
    self.ast.main_library().format == Format::LittleE
  }
}
