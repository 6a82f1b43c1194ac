mod chunk;
mod object;

use std::path::PathBuf;

use crate::ast::*;
use crate::codegen::{Codegen, Options};
use crate::errors::ErrorReport;

// ========================== Publication ===========================

fn object_path(name: &str) -> PathBuf {
  let mut path = std::env::temp_dir();
  path.push(format!("acsc-{}-{}.o", name, std::process::id()));
  path
}

/// Publishes the library and returns the object-file image.
fn publish(ast: &mut Ast, name: &str) -> Vec<u8> {
  let path = object_path(name);
  let _ = std::fs::remove_file(&path);
  let options = Options {
    object_file: path.clone(),
  };
  Codegen::publish(ast, &options).expect("publication failed");
  let bytes = std::fs::read(&path).expect("object file missing");
  let _ = std::fs::remove_file(&path);
  bytes
}

/// Publishes a library that must fail, returning the diagnostics and
/// whether an object file was left behind.
fn publish_err(ast: &mut Ast, name: &str) -> (Vec<ErrorReport>, bool) {
  let path = object_path(name);
  let _ = std::fs::remove_file(&path);
  let options = Options {
    object_file: path.clone(),
  };
  let reports = match Codegen::publish(ast, &options) {
    Ok(()) => panic!("publication unexpectedly succeeded"),
    Err(reports) => reports,
  };
  let written = path.exists();
  let _ = std::fs::remove_file(&path);
  (reports, written)
}

/// Runs an emitter session against an empty library and returns the
/// raw bytes written.
fn with_emitter(compress: bool, emit: impl FnOnce(&mut Codegen)) -> Vec<u8> {
  let mut ast = Ast::new("emit");
  let options = Options {
    object_file: object_path("emitter-session"),
  };
  let mut codegen = Codegen::new(&mut ast, &options);
  codegen.compress = compress;
  emit(&mut codegen);
  // Flush anything still queued.
  let _ = codegen.tell();
  codegen.output()
}

// ============================ Builders ============================

fn lit(ast: &mut Ast, value: i32) -> NodeIdx {
  ast.push_node(NodeKind::Literal(value))
}

/// An expression the semantic pass folded to a constant.
fn const_expr(ast: &mut Ast, value: i32) -> NodeIdx {
  let root = lit(ast, value);
  ast.push_expr(root, value, true, false)
}

/// An expression left for the emitter to work through.
fn raw_expr(ast: &mut Ast, root: NodeIdx) -> NodeIdx {
  ast.push_expr(root, 0, false, false)
}

fn string_expr(ast: &mut Ast, text: &str) -> (NodeIdx, StringIdx) {
  let string = ast.strings.intern(text);
  let root = ast.push_node(NodeKind::IndexedStringUsage(string));
  let expr = ast.push_expr(root, 0, false, true);
  (expr, string)
}

fn block(ast: &mut Ast, stmts: Vec<NodeIdx>) -> NodeIdx {
  ast.push_node(NodeKind::Block(stmts))
}

/// An expression statement.
fn expr_stmt(ast: &mut Ast, expr: NodeIdx) -> NodeIdx {
  ast.push_node(NodeKind::PackedExpr(PackedExprNode { expr, block: None }))
}

fn add_script(ast: &mut Ast, number: i32, body: NodeIdx) -> ScriptIdx {
  ast.scripts.push(Script::new(number, body));
  let s = ast.scripts.len() - 1;
  ast.libraries[0].scripts.push(s);
  s
}

fn add_map_scalar(ast: &mut Ast, name: &str, init: Option<i32>) -> VarIdx {
  let mut var = Var::new(name, Storage::Map);
  if let Some(value) = init {
    let expr = const_expr(ast, value);
    var.value.push(Value {
      index: 0,
      expr,
      string_initz: false,
    });
  }
  ast.vars.push(var);
  let v = ast.vars.len() - 1;
  ast.libraries[0].vars.push(v);
  ast.libraries[0].objects.push(ObjectRef::Var(v));
  v
}

fn add_map_array(ast: &mut Ast, name: &str, size: i32) -> VarIdx {
  let mut var = Var::new(name, Storage::Map);
  var.dim.push(Dim {
    size,
    element_size: 1,
  });
  var.size = size;
  ast.vars.push(var);
  let v = ast.vars.len() - 1;
  ast.libraries[0].vars.push(v);
  ast.libraries[0].objects.push(ObjectRef::Var(v));
  v
}

/// A local declaration, returning the variable and its statement node.
fn add_local(ast: &mut Ast, name: &str) -> (VarIdx, NodeIdx) {
  ast.vars.push(Var::new(name, Storage::Local));
  let v = ast.vars.len() - 1;
  let stmt = ast.push_node(NodeKind::Var(v));
  (v, stmt)
}

/// A function with a dedicated instruction, like Delay.
fn ded_func(ast: &mut Ast, name: &str, opcode: crate::pcode::Pcode) -> FuncIdx {
  let body = ast.push_node(NodeKind::Block(vec![]));
  let mut func = Func::user(name, body);
  func.kind = FuncKind::Ded { opcode };
  ast.funcs.push(func);
  ast.funcs.len() - 1
}

fn user_func(ast: &mut Ast, name: &str, body: NodeIdx) -> FuncIdx {
  ast.funcs.push(Func::user(name, body));
  let f = ast.funcs.len() - 1;
  ast.libraries[0].funcs.push(f);
  f
}

fn call_expr(ast: &mut Ast, func: FuncIdx, args: Vec<NodeIdx>) -> NodeIdx {
  let name = ast.funcs[func].name.clone();
  let operand = ast.push_node(NodeKind::NameUsage(NameUsage {
    name,
    object: UsageObject::Func(func),
  }));
  let call = ast.push_node(NodeKind::Call(CallNode {
    operand,
    func,
    args,
    nested_call_id: -1,
  }));
  ast.push_expr(call, 0, false, false)
}

fn call_stmt(ast: &mut Ast, func: FuncIdx, args: Vec<NodeIdx>) -> NodeIdx {
  let expr = call_expr(ast, func, args);
  expr_stmt(ast, expr)
}

// ========================= Object probing =========================

fn read_i16(bytes: &[u8], at: usize) -> i16 {
  i16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
  i32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Decodes a byte run as little-endian words.
fn words(bytes: &[u8]) -> Vec<i32> {
  bytes.chunks_exact(4).map(|word| read_i32(word, 0)).collect()
}

/// Finds a chunk in the chunk region and returns its payload.
fn find_chunk<'b>(bytes: &'b [u8], tag: &str) -> Option<&'b [u8]> {
  let mut pos = read_i32(bytes, 4) as usize;
  while pos + 8 <= bytes.len() {
    let length = read_i32(bytes, pos + 4) as usize;
    if &bytes[pos..pos + 4] == tag.as_bytes() {
      return Some(&bytes[pos + 8..pos + 8 + length]);
    }
    pos += 8 + length;
  }
  None
}

fn chunk_len(bytes: &[u8], tag: &str) -> i32 {
  let mut pos = read_i32(bytes, 4) as usize;
  while pos + 8 <= bytes.len() {
    let length = read_i32(bytes, pos + 4);
    if &bytes[pos..pos + 4] == tag.as_bytes() {
      return length;
    }
    pos += 8 + length as usize;
  }
  panic!("chunk {} not found", tag);
}
