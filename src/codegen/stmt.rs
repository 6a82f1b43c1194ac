use hashbrown::HashMap;

use crate::ast::*;
use crate::pcode::Pcode;

use super::{Codegen, JumpMark};

/// Case labels collected while the body of a switch is written.
pub(super) struct SwitchFrame {
  pub cases: Vec<(i32, i32)>,
  pub default_pos: Option<i32>,
}

/// Whose body is being written.
#[derive(Clone, Copy)]
pub(super) enum BodyKind {
  Script(ScriptIdx),
  Func(FuncIdx),
  Nested(FuncIdx),
}

/// Streams one body into the user-code region. Control-flow statements
/// emit forward jumps with a zero operand and patch them by seeking
/// back into the buffer once the destination is known.
pub(super) struct BodyWriter<'c, 'a> {
  pub codegen: &'c mut Codegen<'a>,
  kind: BodyKind,
  labels: HashMap<String, i32>,
  label_jumps: Vec<(JumpMark, String)>,
  break_frames: Vec<Vec<JumpMark>>,
  continue_frames: Vec<Vec<JumpMark>>,
  switch_frames: Vec<SwitchFrame>,
  /// Jumps to the return dispatch of a nested function.
  nested_exit_jumps: Vec<JumpMark>,
}

impl<'a> Codegen<'a> {
  pub(super) fn emit_jump(&mut self, opc: Pcode) -> JumpMark {
    let pos = self.tell();
    self.add_opc(opc);
    self.add_arg(0);
    JumpMark { pos, opc }
  }

  pub(super) fn patch_jump(&mut self, mark: JumpMark, dest: i32) {
    self.seek(mark.pos);
    self.add_opc(mark.opc);
    self.add_arg(dest);
    self.seek_end();
  }

  /// Writes the bodies of every script and function into the user-code
  /// region, recording their entry offsets.
  pub(super) fn write_user_code(&mut self) {
    let scripts = self.ast.main_library().scripts.clone();
    for s in scripts {
      self.write_script(s);
    }
    let funcs = self.ast.main_library().funcs.clone();
    for f in funcs {
      self.write_func(f);
    }
  }

  fn write_script(&mut self, s: ScriptIdx) {
    let offset = self.tell();
    self.ast.scripts[s].offset = offset;
    self.nested_returns.clear();
    self.nested_jumps.clear();

    let body = self.ast.scripts[s].body;
    let mut writer = BodyWriter::new(self, BodyKind::Script(s));
    writer.write_stmt(body);
    writer.finish();

    self.add_opc(Pcode::Terminate);

    let nested = self.ast.scripts[s].nested_funcs.clone();
    self.write_nested_funcs(&nested, true);
    self.patch_nested_calls();
  }

  fn write_func(&mut self, f: FuncIdx) {
    let obj_pos = self.tell();
    self.ast.funcs[f].impl_mut().obj_pos = obj_pos;
    self.nested_returns.clear();
    self.nested_jumps.clear();

    let body = self.ast.funcs[f].impl_().body;
    let returns_value = self.ast.funcs[f].return_spec != Spec::Void;
    let mut writer = BodyWriter::new(self, BodyKind::Func(f));
    writer.write_stmt(body);
    writer.finish();

    // Fall-through epilogue.
    if returns_value {
      self.add_opc(Pcode::PushNumber);
      self.add_arg(0);
      self.add_opc(Pcode::ReturnVal);
    } else {
      self.add_opc(Pcode::ReturnVoid);
    }

    let nested = self.ast.funcs[f].impl_().nested_funcs.clone();
    self.write_nested_funcs(&nested, false);
    self.patch_nested_calls();
  }

  /// Writes the bodies of nested functions after their enclosing body,
  /// then the return dispatch of each. The dispatch comes last so that
  /// every call site, including those inside sibling nested functions,
  /// has its return position recorded by then.
  fn write_nested_funcs(&mut self, funcs: &[FuncIdx], in_script: bool) {
    let mut epilogues = vec![];

    for &f in funcs {
      let obj_pos = self.tell();
      self.ast.funcs[f].impl_mut().obj_pos = obj_pos;
      let body = self.ast.funcs[f].impl_().body;
      let returns_value = self.ast.funcs[f].return_spec != Spec::Void;

      let mut writer = BodyWriter::new(self, BodyKind::Nested(f));
      writer.write_stmt(body);
      // Fall-through exit: a value-returning body leaves a default
      // result under the call id.
      if returns_value {
        writer.codegen.add_opc(Pcode::PushNumber);
        writer.codegen.add_arg(0);
        writer.codegen.add_opc(Pcode::Swap);
      }
      let mark = writer.codegen.emit_jump(Pcode::Goto);
      writer.nested_exit_jumps.push(mark);
      writer.finish();
      let exits = std::mem::take(&mut writer.nested_exit_jumps);
      epilogues.push((f, exits));
    }

    for (f, exits) in epilogues {
      let pos = self.tell();
      for mark in exits {
        self.patch_jump(mark, pos);
      }

      // Return dispatch: the call id left on the stack selects the
      // call site to resume.
      let calls = self.ast.funcs[f].impl_().nested_calls.clone();
      for call in calls {
        let id = match self.ast.node(call) {
          NodeKind::Call(node) => node.nested_call_id,
          _ => unreachable!("nested-call entry is not a call node"),
        };
        let ret = self.nested_returns.get(&call).copied().unwrap_or(0);
        self.add_opc(Pcode::CaseGoto);
        self.add_arg(id);
        self.add_arg(ret);
      }
      self.add_opc(if in_script {
        Pcode::Terminate
      } else {
        Pcode::ReturnVoid
      });
    }
  }

  fn patch_nested_calls(&mut self) {
    let jumps = std::mem::take(&mut self.nested_jumps);
    for (mark, f) in jumps {
      let dest = self.ast.funcs[f].impl_().obj_pos;
      self.patch_jump(mark, dest);
    }
  }
}

impl<'c, 'a> BodyWriter<'c, 'a> {
  pub(super) fn new(codegen: &'c mut Codegen<'a>, kind: BodyKind) -> Self {
    BodyWriter {
      codegen,
      kind,
      labels: HashMap::new(),
      label_jumps: vec![],
      break_frames: vec![],
      continue_frames: vec![],
      switch_frames: vec![],
      nested_exit_jumps: vec![],
    }
  }

  /// Resolves the goto statements of the body. Labels are collected
  /// while the body streams out, so patching waits until the end.
  pub(super) fn finish(&mut self) {
    let jumps = std::mem::take(&mut self.label_jumps);
    for (mark, name) in jumps {
      let dest = match self.labels.get(&name) {
        Some(&dest) => dest,
        None => unreachable!("goto to undefined label '{}'", name),
      };
      self.codegen.patch_jump(mark, dest);
    }
  }

  pub(super) fn write_stmt(&mut self, node: NodeIdx) {
    match self.codegen.ast.node(node).clone() {
      NodeKind::Block(stmts) => {
        for stmt in stmts {
          self.write_stmt(stmt);
        }
      }
      NodeKind::If(stmt) => self.write_if(stmt),
      NodeKind::While(stmt) => self.write_while(stmt),
      NodeKind::For(stmt) => self.write_for(stmt),
      NodeKind::Switch(stmt) => self.write_switch(stmt),
      NodeKind::Case(label) => {
        let value = self.codegen.ast.expr_value(label.number);
        let pos = self.codegen.tell();
        match self.switch_frames.last_mut() {
          Some(frame) => frame.cases.push((value, pos)),
          None => unreachable!("case label outside a switch"),
        }
      }
      NodeKind::CaseDefault(_) => {
        let pos = self.codegen.tell();
        match self.switch_frames.last_mut() {
          Some(frame) => frame.default_pos = Some(pos),
          None => unreachable!("default label outside a switch"),
        }
      }
      NodeKind::GotoLabel(name) => {
        let pos = self.codegen.tell();
        self.labels.insert(name, pos);
      }
      NodeKind::Goto(label) => {
        let name = match self.codegen.ast.node(label) {
          NodeKind::GotoLabel(name) => name.clone(),
          _ => unreachable!("goto target is not a label"),
        };
        let mark = self.codegen.emit_jump(Pcode::Goto);
        self.label_jumps.push((mark, name));
      }
      NodeKind::Jump(kind) => self.write_jump(kind),
      NodeKind::ScriptJump(kind) => {
        self.codegen.add_opc(match kind {
          ScriptJumpKind::Terminate => Pcode::Terminate,
          ScriptJumpKind::Suspend => Pcode::Suspend,
          ScriptJumpKind::Restart => Pcode::Restart,
        });
      }
      NodeKind::Return(stmt) => self.write_return(stmt),
      NodeKind::PackedExpr(packed) => self.write_packed_expr(packed),
      NodeKind::Paltrans(trans) => self.write_paltrans(trans),
      NodeKind::FormatItem(item) => self.write_format_items(item),
      NodeKind::Var(v) => self.write_local_var(v),
      // Declarations produce no code where they stand; nested function
      // bodies follow the enclosing body.
      NodeKind::Func(_) | NodeKind::Import(_) => {}
      _ => unreachable!("expression node in statement position"),
    }
  }

  fn write_if(&mut self, stmt: IfNode) {
    self.write_expr(stmt.cond);
    let then_jump = self.codegen.emit_jump(Pcode::IfNotGoto);
    self.write_stmt(stmt.body);

    match stmt.else_body {
      Some(else_body) => {
        let exit_jump = self.codegen.emit_jump(Pcode::Goto);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(then_jump, dest);
        self.write_stmt(else_body);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(exit_jump, dest);
      }
      None => {
        let dest = self.codegen.tell();
        self.codegen.patch_jump(then_jump, dest);
      }
    }
  }

  fn write_while(&mut self, stmt: WhileNode) {
    match stmt.kind {
      WhileKind::While | WhileKind::Until => {
        let top = self.codegen.tell();
        self.write_expr(stmt.cond);
        let exit_jump = self.codegen.emit_jump(match stmt.kind {
          WhileKind::While => Pcode::IfNotGoto,
          _ => Pcode::IfGoto,
        });

        self.break_frames.push(vec![]);
        self.continue_frames.push(vec![]);
        self.write_stmt(stmt.body);
        self.codegen.add_opc(Pcode::Goto);
        self.codegen.add_arg(top);

        let end = self.codegen.tell();
        self.codegen.patch_jump(exit_jump, end);
        self.patch_break_frame(end);
        self.patch_continue_frame(top);
      }
      WhileKind::DoWhile | WhileKind::DoUntil => {
        let top = self.codegen.tell();
        self.break_frames.push(vec![]);
        self.continue_frames.push(vec![]);
        self.write_stmt(stmt.body);

        let cond_pos = self.codegen.tell();
        self.write_expr(stmt.cond);
        self.codegen.add_opc(match stmt.kind {
          WhileKind::DoWhile => Pcode::IfGoto,
          _ => Pcode::IfNotGoto,
        });
        self.codegen.add_arg(top);

        let end = self.codegen.tell();
        self.patch_break_frame(end);
        self.patch_continue_frame(cond_pos);
      }
    }
  }

  fn write_for(&mut self, stmt: ForNode) {
    for node in stmt.init {
      match self.codegen.ast.node(node).clone() {
        NodeKind::Var(v) => self.write_local_var(v),
        NodeKind::Expr(_) => self.write_expr_stmt(node),
        _ => {}
      }
    }

    let top = self.codegen.tell();
    let exit_jump = match stmt.cond {
      Some(cond) => {
        self.write_expr(cond);
        Some(self.codegen.emit_jump(Pcode::IfNotGoto))
      }
      None => None,
    };

    self.break_frames.push(vec![]);
    self.continue_frames.push(vec![]);
    self.write_stmt(stmt.body);

    let post_pos = self.codegen.tell();
    for node in stmt.post {
      self.write_expr_stmt(node);
    }
    self.codegen.add_opc(Pcode::Goto);
    self.codegen.add_arg(top);

    let end = self.codegen.tell();
    if let Some(exit_jump) = exit_jump {
      self.codegen.patch_jump(exit_jump, end);
    }
    self.patch_break_frame(end);
    self.patch_continue_frame(post_pos);
  }

  /// Writes a switch as a dispatch table following the body: the
  /// condition value jumps to the table, the table runs a `CaseGoto`
  /// per collected label, and unmatched values fall into the default
  /// label, if any, after dropping the condition.
  fn write_switch(&mut self, stmt: SwitchNode) {
    self.write_expr(stmt.cond);
    let table_jump = self.codegen.emit_jump(Pcode::Goto);

    self.break_frames.push(vec![]);
    self.switch_frames.push(SwitchFrame {
      cases: vec![],
      default_pos: None,
    });
    self.write_stmt(stmt.body);
    let body_exit = self.codegen.emit_jump(Pcode::Goto);

    let table_pos = self.codegen.tell();
    self.codegen.patch_jump(table_jump, table_pos);
    let frame = match self.switch_frames.pop() {
      Some(frame) => frame,
      None => unreachable!("switch frame lost"),
    };
    for (value, pos) in frame.cases {
      self.codegen.add_opc(Pcode::CaseGoto);
      self.codegen.add_arg(value);
      self.codegen.add_arg(pos);
    }
    self.codegen.add_opc(Pcode::Drop);
    if let Some(default_pos) = frame.default_pos {
      self.codegen.add_opc(Pcode::Goto);
      self.codegen.add_arg(default_pos);
    }

    let end = self.codegen.tell();
    self.codegen.patch_jump(body_exit, end);
    self.patch_break_frame(end);
  }

  fn write_jump(&mut self, kind: JumpKind) {
    let mark = self.codegen.emit_jump(Pcode::Goto);
    let frame = match kind {
      JumpKind::Break => self.break_frames.last_mut(),
      JumpKind::Continue => self.continue_frames.last_mut(),
    };
    match frame {
      Some(frame) => frame.push(mark),
      None => unreachable!("break or continue outside a loop"),
    }
  }

  fn patch_break_frame(&mut self, dest: i32) {
    let marks = match self.break_frames.pop() {
      Some(marks) => marks,
      None => unreachable!("break frame lost"),
    };
    for mark in marks {
      self.codegen.patch_jump(mark, dest);
    }
  }

  fn patch_continue_frame(&mut self, dest: i32) {
    let marks = match self.continue_frames.pop() {
      Some(marks) => marks,
      None => unreachable!("continue frame lost"),
    };
    for mark in marks {
      self.codegen.patch_jump(mark, dest);
    }
  }

  fn write_return(&mut self, stmt: ReturnNode) {
    let value = match stmt.value {
      Some(packed) => match self.codegen.ast.node(packed).clone() {
        NodeKind::PackedExpr(packed) => {
          if let Some(block) = packed.block {
            self.write_stmt(block);
          }
          Some(packed.expr)
        }
        _ => unreachable!("return value is not a packed expression"),
      },
      None => None,
    };

    match self.kind {
      BodyKind::Script(_) => {
        if let Some(expr) = value {
          self.write_expr(expr);
          self.codegen.add_opc(Pcode::SetResultValue);
        }
        self.codegen.add_opc(Pcode::Terminate);
      }
      BodyKind::Func(_) => match value {
        Some(expr) => {
          self.write_expr(expr);
          self.codegen.add_opc(Pcode::ReturnVal);
        }
        None => self.codegen.add_opc(Pcode::ReturnVoid),
      },
      BodyKind::Nested(_) => {
        // The call id sits on top; expose the result beneath it and
        // leave through the return dispatch.
        if let Some(expr) = value {
          self.write_expr(expr);
          self.codegen.add_opc(Pcode::Swap);
        }
        let mark = self.codegen.emit_jump(Pcode::Goto);
        self.nested_exit_jumps.push(mark);
      }
    }
  }

  fn write_packed_expr(&mut self, packed: PackedExprNode) {
    if let Some(block) = packed.block {
      self.write_stmt(block);
    }
    self.write_expr_stmt(packed.expr);
  }

  /// Writes the initializers of a local declaration. Slots are reused
  /// across sibling blocks, so every initializer is stored on each
  /// entry, zeros included.
  fn write_local_var(&mut self, v: VarIdx) {
    if self.codegen.ast.vars[v].storage != Storage::Local {
      return;
    }

    if self.codegen.ast.vars[v].dim.is_empty() {
      let index = self.codegen.ast.vars[v].index;
      if let Some(value) = self.codegen.ast.vars[v].value.first().copied() {
        self.write_expr(value.expr);
        self.codegen.add_opc(Pcode::AssignScriptVar);
        self.codegen.add_arg(index);
      }
      return;
    }

    let array_id = self.local_array_id(v);
    let values = self.codegen.ast.vars[v].value.clone();
    for value in values {
      if value.string_initz {
        let string = match self.codegen.ast.node(self.codegen.ast.expr_root(value.expr)) {
          NodeKind::IndexedStringUsage(string) => *string,
          _ => unreachable!("string initializer without a string"),
        };
        let text = self.codegen.ast.strings.get(string).value.clone();
        for (i, ch) in text.bytes().enumerate() {
          self.codegen.add_opc(Pcode::PushNumber);
          self.codegen.add_arg(value.index + i as i32);
          self.codegen.add_opc(Pcode::PushNumber);
          self.codegen.add_arg(ch as i32);
          self.codegen.add_opc(Pcode::AssignScriptArray);
          self.codegen.add_arg(array_id);
        }
      } else {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(value.index);
        self.write_expr(value.expr);
        self.codegen.add_opc(Pcode::AssignScriptArray);
        self.codegen.add_arg(array_id);
      }
    }
  }

  /// The id of a local array: its position among the array declarations
  /// of the enclosing script or function, matching the published size
  /// list.
  pub(super) fn local_array_id(&self, v: VarIdx) -> i32 {
    let vars = match self.kind {
      BodyKind::Script(s) => &self.codegen.ast.scripts[s].vars,
      BodyKind::Func(f) | BodyKind::Nested(f) => &self.codegen.ast.funcs[f].impl_().vars,
    };
    let mut id = 0;
    for &candidate in vars {
      if candidate == v {
        break;
      }
      if !self.codegen.ast.vars[candidate].dim.is_empty() {
        id += 1;
      }
    }
    id
  }
}
