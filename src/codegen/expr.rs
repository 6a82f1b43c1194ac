use crate::ast::*;
use crate::pcode::Pcode;

use super::stmt::BodyWriter;

/// A storage location resolved from the left side of an assignment,
/// subscript or member access.
struct VarRef {
  storage: Storage,
  var: VarIdx,
  /// Slot offset of the accessed structure member.
  member_offset: i32,
  /// Dimensions governing the collected subscripts.
  dims: Vec<Dim>,
  /// Subscript expressions, outermost last.
  subscripts: Vec<NodeIdx>,
}

impl VarRef {
  /// A plain scalar variable, as opposed to an element of an
  /// aggregate.
  fn is_scalar(&self, ast: &Ast) -> bool {
    let var = &ast.vars[self.var];
    var.dim.is_empty() && var.structure.is_none()
  }
}

fn push_var_opcode(storage: Storage) -> Pcode {
  match storage {
    Storage::Local => Pcode::PushScriptVar,
    Storage::Map => Pcode::PushMapVar,
    Storage::World => Pcode::PushWorldVar,
    Storage::Global => Pcode::PushGlobalVar,
  }
}

fn push_array_opcode(storage: Storage) -> Pcode {
  match storage {
    Storage::Local => Pcode::PushScriptArray,
    Storage::Map => Pcode::PushMapArray,
    Storage::World => Pcode::PushWorldArray,
    Storage::Global => Pcode::PushGlobalArray,
  }
}

fn pick(storage: Storage, set: (Pcode, Pcode, Pcode, Pcode)) -> Pcode {
  match storage {
    Storage::Local => set.0,
    Storage::Map => set.1,
    Storage::World => set.2,
    Storage::Global => set.3,
  }
}

fn assign_var_opcode(op: AssignOp, storage: Storage) -> Pcode {
  use Pcode::*;
  let set = match op {
    AssignOp::Plain => (AssignScriptVar, AssignMapVar, AssignWorldVar, AssignGlobalVar),
    AssignOp::Add => (AddScriptVar, AddMapVar, AddWorldVar, AddGlobalVar),
    AssignOp::Sub => (SubScriptVar, SubMapVar, SubWorldVar, SubGlobalVar),
    AssignOp::Mul => (MulScriptVar, MulMapVar, MulWorldVar, MulGlobalVar),
    AssignOp::Div => (DivScriptVar, DivMapVar, DivWorldVar, DivGlobalVar),
    AssignOp::Mod => (ModScriptVar, ModMapVar, ModWorldVar, ModGlobalVar),
    AssignOp::ShiftL => (LsScriptVar, LsMapVar, LsWorldVar, LsGlobalVar),
    AssignOp::ShiftR => (RsScriptVar, RsMapVar, RsWorldVar, RsGlobalVar),
    AssignOp::BitAnd => (AndScriptVar, AndMapVar, AndWorldVar, AndGlobalVar),
    AssignOp::BitXor => (EorScriptVar, EorMapVar, EorWorldVar, EorGlobalVar),
    AssignOp::BitOr => (OrScriptVar, OrMapVar, OrWorldVar, OrGlobalVar),
  };
  pick(storage, set)
}

fn assign_array_opcode(op: AssignOp, storage: Storage) -> Pcode {
  use Pcode::*;
  let set = match op {
    AssignOp::Plain => (
      AssignScriptArray,
      AssignMapArray,
      AssignWorldArray,
      AssignGlobalArray,
    ),
    AssignOp::Add => (AddScriptArray, AddMapArray, AddWorldArray, AddGlobalArray),
    AssignOp::Sub => (SubScriptArray, SubMapArray, SubWorldArray, SubGlobalArray),
    AssignOp::Mul => (MulScriptArray, MulMapArray, MulWorldArray, MulGlobalArray),
    AssignOp::Div => (DivScriptArray, DivMapArray, DivWorldArray, DivGlobalArray),
    AssignOp::Mod => (ModScriptArray, ModMapArray, ModWorldArray, ModGlobalArray),
    AssignOp::ShiftL => (LsScriptArray, LsMapArray, LsWorldArray, LsGlobalArray),
    AssignOp::ShiftR => (RsScriptArray, RsMapArray, RsWorldArray, RsGlobalArray),
    AssignOp::BitAnd => (AndScriptArray, AndMapArray, AndWorldArray, AndGlobalArray),
    AssignOp::BitXor => (EorScriptArray, EorMapArray, EorWorldArray, EorGlobalArray),
    AssignOp::BitOr => (OrScriptArray, OrMapArray, OrWorldArray, OrGlobalArray),
  };
  pick(storage, set)
}

fn binary_opcode(op: BinaryOp) -> Pcode {
  match op {
    BinaryOp::LogOr => Pcode::OrLogical,
    BinaryOp::LogAnd => Pcode::AndLogical,
    BinaryOp::BitOr => Pcode::OrBitwise,
    BinaryOp::BitXor => Pcode::EorBitwise,
    BinaryOp::BitAnd => Pcode::AndBitwise,
    BinaryOp::Eq => Pcode::Eq,
    BinaryOp::Ne => Pcode::Ne,
    BinaryOp::Lt => Pcode::Lt,
    BinaryOp::Le => Pcode::Le,
    BinaryOp::Gt => Pcode::Gt,
    BinaryOp::Ge => Pcode::Ge,
    BinaryOp::ShiftL => Pcode::Lshift,
    BinaryOp::ShiftR => Pcode::Rshift,
    BinaryOp::Add => Pcode::Add,
    BinaryOp::Sub => Pcode::Subtract,
    BinaryOp::Mul => Pcode::Multiply,
    BinaryOp::Div => Pcode::Divide,
    BinaryOp::Mod => Pcode::Modulus,
  }
}

impl<'c, 'a> BodyWriter<'c, 'a> {
  /// Writes an expression, leaving its value on the stack. A tree the
  /// semantic pass already folded to a plain constant is pushed
  /// directly.
  pub(super) fn write_expr(&mut self, node: NodeIdx) {
    let expr = match self.codegen.ast.node(node) {
      NodeKind::Expr(expr) => expr.clone(),
      _ => unreachable!("expected an expression node"),
    };

    if expr.folded && !expr.has_str {
      self.codegen.add_opc(Pcode::PushNumber);
      self.codegen.add_arg(expr.value);
      return;
    }

    self.write_operand(expr.root);
  }

  /// Writes an expression statement, discarding whatever value it
  /// leaves behind.
  pub(super) fn write_expr_stmt(&mut self, node: NodeIdx) {
    let root = self.codegen.ast.expr_root(node);

    match self.codegen.ast.node(root).clone() {
      NodeKind::Assign(assign) => self.write_assign(assign, false),
      NodeKind::Unary(unary) if is_incdec(unary.op) => self.write_incdec(unary, false),
      NodeKind::Call(call) => self.write_call(root, call, true),
      _ => {
        self.write_expr(node);
        self.codegen.add_opc(Pcode::Drop);
      }
    }
  }

  fn write_operand(&mut self, node: NodeIdx) {
    match self.codegen.ast.node(node).clone() {
      NodeKind::Expr(_) => self.write_expr(node),
      NodeKind::Literal(value) => {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(value);
      }
      NodeKind::IndexedStringUsage(string) => self.write_string_usage(string),
      NodeKind::Paren(inside) => self.write_operand(inside),
      NodeKind::Unary(unary) => {
        if is_incdec(unary.op) {
          self.write_incdec(unary, true);
          return;
        }
        self.write_operand(unary.operand);
        match unary.op {
          UnaryOp::Minus => self.codegen.add_opc(Pcode::UnaryMinus),
          UnaryOp::LogNot => self.codegen.add_opc(Pcode::NegateLogical),
          UnaryOp::BitNot => self.codegen.add_opc(Pcode::NegateBinary),
          UnaryOp::Plus => {}
          _ => unreachable!("increment handled above"),
        }
      }
      NodeKind::Binary(binary) => {
        self.write_operand(binary.lside);
        self.write_operand(binary.rside);
        self.codegen.add_opc(binary_opcode(binary.op));
      }
      NodeKind::NameUsage(usage) => self.write_name_usage(usage),
      NodeKind::Constant(constant) => {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(constant.value);
      }
      NodeKind::ParamUsage(f, i) => {
        let index = self.codegen.ast.funcs[f].params[i].index;
        self.codegen.add_opc(Pcode::PushScriptVar);
        self.codegen.add_arg(index);
      }
      NodeKind::Conditional(cond) => self.write_conditional(cond),
      NodeKind::Subscript(_) | NodeKind::Access(_) => {
        let reference = self.resolve_ref(node);
        self.write_ref_value(&reference);
      }
      NodeKind::Assign(assign) => self.write_assign(assign, true),
      NodeKind::Call(call) => self.write_call(node, call, false),
      NodeKind::Strcpy(call) => self.write_strcpy(call),
      NodeKind::FormatItem(item) => self.write_format_items(item),
      _ => unreachable!("statement node in expression position"),
    }
  }

  fn write_string_usage(&mut self, string: StringIdx) {
    let index = self.codegen.ast.strings.get(string).index;
    self.codegen.add_opc(Pcode::PushNumber);
    self.codegen.add_arg(index);
    // In a library, the engine rebases string handles at load time.
    if self.codegen.ast.main_library().importable {
      self.codegen.add_opc(Pcode::TagString);
    }
  }

  fn write_name_usage(&mut self, usage: NameUsage) {
    match usage.object {
      UsageObject::Var(v) => {
        let var = &self.codegen.ast.vars[v];
        if var.dim.is_empty() && var.structure.is_none() {
          let (opcode, index) = (push_var_opcode(var.storage), var.index);
          self.codegen.add_opc(opcode);
          self.codegen.add_arg(index);
        } else {
          // An aggregate as a value stands for its storage number.
          let index = var.index;
          self.codegen.add_opc(Pcode::PushNumber);
          self.codegen.add_arg(index);
        }
      }
      UsageObject::Func(f) => {
        let index = self.codegen.ast.funcs[f].impl_().index;
        self.codegen.add_opc(Pcode::PushFunction);
        self.codegen.add_arg(index);
      }
      UsageObject::Constant(node) => {
        let value = match self.codegen.ast.node(node) {
          NodeKind::Constant(constant) => constant.value,
          _ => unreachable!("constant usage without a constant"),
        };
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(value);
      }
      UsageObject::Member(..) => unreachable!("member used outside an access"),
    }
  }

  fn write_conditional(&mut self, cond: ConditionalNode) {
    match cond.middle {
      Some(middle) => {
        self.write_operand(cond.left);
        let else_jump = self.codegen.emit_jump(Pcode::IfNotGoto);
        self.write_operand(middle);
        let exit_jump = self.codegen.emit_jump(Pcode::Goto);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(else_jump, dest);
        self.write_operand(cond.right);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(exit_jump, dest);
      }
      None => {
        // left ?: right — keep the tested value when it holds.
        self.write_operand(cond.left);
        self.codegen.add_opc(Pcode::Dup);
        let else_jump = self.codegen.emit_jump(Pcode::IfNotGoto);
        let exit_jump = self.codegen.emit_jump(Pcode::Goto);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(else_jump, dest);
        self.codegen.add_opc(Pcode::Drop);
        self.write_operand(cond.right);
        let dest = self.codegen.tell();
        self.codegen.patch_jump(exit_jump, dest);
      }
    }
  }

  // ====================== Storage references =======================

  fn resolve_ref(&mut self, node: NodeIdx) -> VarRef {
    match self.codegen.ast.node(node).clone() {
      NodeKind::Paren(inside) => self.resolve_ref(inside),
      NodeKind::NameUsage(usage) => match usage.object {
        UsageObject::Var(v) => {
          let var = &self.codegen.ast.vars[v];
          VarRef {
            storage: var.storage,
            var: v,
            member_offset: 0,
            dims: var.dim.clone(),
            subscripts: vec![],
          }
        }
        _ => unreachable!("reference does not name a variable"),
      },
      NodeKind::Access(access) => {
        let mut reference = self.resolve_ref(access.lside);
        let (s, m) = match self.codegen.ast.node(access.rside) {
          NodeKind::NameUsage(NameUsage {
            object: UsageObject::Member(s, m),
            ..
          }) => (*s, *m),
          _ => unreachable!("access does not name a member"),
        };
        let member = &self.codegen.ast.structures[s].members[m];
        reference.member_offset += member.offset;
        reference.dims = member.dim.clone();
        reference
      }
      NodeKind::Subscript(sub) => {
        let mut reference = self.resolve_ref(sub.lside);
        reference.subscripts.push(sub.index);
        reference
      }
      _ => unreachable!("node is not a storage reference"),
    }
  }

  /// Pushes the element offset selected by a reference into an
  /// aggregate. Constant subscripts collapse in the immediate queue.
  fn write_ref_offset(&mut self, reference: &VarRef) {
    if reference.subscripts.is_empty() {
      self.codegen.add_opc(Pcode::PushNumber);
      self.codegen.add_arg(reference.member_offset);
      return;
    }

    for (k, &sub) in reference.subscripts.iter().enumerate() {
      self.write_expr(sub);
      let element_size = match reference.dims.get(k) {
        Some(dim) => dim.element_size,
        None => 1,
      };
      if element_size != 1 {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(element_size);
        self.codegen.add_opc(Pcode::Multiply);
      }
      if k > 0 {
        self.codegen.add_opc(Pcode::Add);
      }
    }

    if reference.member_offset != 0 {
      self.codegen.add_opc(Pcode::PushNumber);
      self.codegen.add_arg(reference.member_offset);
      self.codegen.add_opc(Pcode::Add);
    }
  }

  fn ref_array_index(&self, reference: &VarRef) -> i32 {
    match reference.storage {
      Storage::Local => self.local_array_id(reference.var),
      _ => self.codegen.ast.vars[reference.var].index,
    }
  }

  fn write_ref_value(&mut self, reference: &VarRef) {
    if reference.is_scalar(self.codegen.ast) {
      let index = self.codegen.ast.vars[reference.var].index;
      self.codegen.add_opc(push_var_opcode(reference.storage));
      self.codegen.add_arg(index);
      return;
    }

    self.write_ref_offset(reference);
    let index = self.ref_array_index(reference);
    self.codegen.add_opc(push_array_opcode(reference.storage));
    self.codegen.add_arg(index);
  }

  fn write_assign(&mut self, assign: AssignNode, value_needed: bool) {
    let reference = self.resolve_ref(assign.lside);

    if reference.is_scalar(self.codegen.ast) {
      let index = self.codegen.ast.vars[reference.var].index;
      self.write_operand(assign.rside);
      self.codegen.add_opc(assign_var_opcode(assign.op, reference.storage));
      self.codegen.add_arg(index);
      if value_needed {
        self.codegen.add_opc(push_var_opcode(reference.storage));
        self.codegen.add_arg(index);
      }
      return;
    }

    let index = self.ref_array_index(&reference);
    self.write_ref_offset(&reference);
    self.write_operand(assign.rside);
    self.codegen.add_opc(assign_array_opcode(assign.op, reference.storage));
    self.codegen.add_arg(index);
    if value_needed {
      // Read the target back; the subscript is re-evaluated.
      self.write_ref_offset(&reference);
      self.codegen.add_opc(push_array_opcode(reference.storage));
      self.codegen.add_arg(index);
    }
  }

  fn write_incdec(&mut self, unary: UnaryNode, value_needed: bool) {
    use Pcode::*;

    let reference = self.resolve_ref(unary.operand);
    let inc = matches!(unary.op, UnaryOp::PreInc | UnaryOp::PostInc);
    let pre = matches!(unary.op, UnaryOp::PreInc | UnaryOp::PreDec);

    if reference.is_scalar(self.codegen.ast) {
      let index = self.codegen.ast.vars[reference.var].index;
      let step = if inc {
        pick(reference.storage, (IncScriptVar, IncMapVar, IncWorldVar, IncGlobalVar))
      } else {
        pick(reference.storage, (DecScriptVar, DecMapVar, DecWorldVar, DecGlobalVar))
      };

      if value_needed && !pre {
        self.codegen.add_opc(push_var_opcode(reference.storage));
        self.codegen.add_arg(index);
      }
      self.codegen.add_opc(step);
      self.codegen.add_arg(index);
      if value_needed && pre {
        self.codegen.add_opc(push_var_opcode(reference.storage));
        self.codegen.add_arg(index);
      }
      return;
    }

    let index = self.ref_array_index(&reference);
    let step = if inc {
      pick(reference.storage, (IncScriptArray, IncMapArray, IncWorldArray, IncGlobalArray))
    } else {
      pick(reference.storage, (DecScriptArray, DecMapArray, DecWorldArray, DecGlobalArray))
    };

    if value_needed && !pre {
      self.write_ref_offset(&reference);
      self.codegen.add_opc(push_array_opcode(reference.storage));
      self.codegen.add_arg(index);
    }
    self.write_ref_offset(&reference);
    self.codegen.add_opc(step);
    self.codegen.add_arg(index);
    if value_needed && pre {
      self.write_ref_offset(&reference);
      self.codegen.add_opc(push_array_opcode(reference.storage));
      self.codegen.add_arg(index);
    }
  }

  // ============================= Calls =============================

  fn write_call(&mut self, node: NodeIdx, call: CallNode, discard: bool) {
    if call.nested_call_id >= 0 {
      self.write_nested_call(node, &call, discard);
      return;
    }

    // How the callee is reached, copied out so emission below can
    // borrow the writer freely.
    enum CallKind {
      Aspec(i32),
      Ded(Pcode),
      Ext(i32),
      Format(Pcode),
      User,
    }

    let returns_value = self.codegen.ast.funcs[call.func].return_spec != Spec::Void;
    let kind = match &self.codegen.ast.funcs[call.func].kind {
      FuncKind::Aspec { id } => CallKind::Aspec(*id),
      FuncKind::Ded { opcode } => CallKind::Ded(*opcode),
      FuncKind::Ext { id } => CallKind::Ext(*id),
      FuncKind::Format { opcode } => CallKind::Format(*opcode),
      FuncKind::User(_) => CallKind::User,
    };

    match kind {
      CallKind::Aspec(id) => {
        let count = self.write_call_args(&call);

        if discard {
          let mut count = count;
          if count == 0 {
            // The invocation forms start at one argument.
            self.codegen.add_opc(Pcode::PushNumber);
            self.codegen.add_arg(0);
            count = 1;
          }
          let opcode = match count {
            1 => Pcode::Lspec1,
            2 => Pcode::Lspec2,
            3 => Pcode::Lspec3,
            4 => Pcode::Lspec4,
            _ => Pcode::Lspec5,
          };
          self.codegen.add_opc(opcode);
          self.codegen.add_arg(id);
        } else {
          // The result form takes all five arguments.
          for _ in count..5 {
            self.codegen.add_opc(Pcode::PushNumber);
            self.codegen.add_arg(0);
          }
          self.codegen.add_opc(Pcode::Lspec5Result);
          self.codegen.add_arg(id);
        }
      }
      CallKind::Ded(opcode) => {
        self.write_call_args(&call);
        self.codegen.add_opc(opcode);
        if returns_value && discard {
          self.codegen.add_opc(Pcode::Drop);
        }
      }
      CallKind::Ext(id) => {
        let count = self.write_call_args(&call);
        self.codegen.add_opc(Pcode::CallFunc);
        self.codegen.add_arg(count);
        self.codegen.add_arg(id);
        if discard {
          self.codegen.add_opc(Pcode::Drop);
        }
      }
      CallKind::Format(opcode) => {
        self.codegen.add_opc(Pcode::BeginPrint);
        for &arg in &call.args {
          let root = self.codegen.ast.expr_root(arg);
          match self.codegen.ast.node(root).clone() {
            NodeKind::FormatItem(item) => self.write_format_items(item),
            _ => self.write_expr(arg),
          }
        }
        self.codegen.add_opc(opcode);
      }
      CallKind::User => {
        let count = self.write_call_args(&call);
        let (optional, index) = {
          let func = &self.codegen.ast.funcs[call.func];
          (func.min_param < func.max_param, func.impl_().index)
        };
        if optional {
          // Hidden parameter holding the number of arguments passed.
          self.codegen.add_opc(Pcode::PushNumber);
          self.codegen.add_arg(count);
        }
        self.codegen.add_opc(if discard {
          Pcode::CallDiscard
        } else {
          Pcode::Call
        });
        self.codegen.add_arg(index);
      }
    }
  }

  /// Writes the provided arguments, completing the tail with default
  /// values. Returns the number of values pushed.
  fn write_call_args(&mut self, call: &CallNode) -> i32 {
    let mut count = 0;

    for &arg in &call.args {
      self.write_expr(arg);
      count += 1;
    }

    for i in call.args.len()..self.codegen.ast.funcs[call.func].params.len() {
      match self.codegen.ast.funcs[call.func].params[i].default_value {
        Some(default_value) => {
          self.write_expr(default_value);
          count += 1;
        }
        None => break,
      }
    }

    count
  }

  /// A call into a nested function: the arguments go straight into the
  /// callee's pre-allocated slots, the call id goes on the stack, and
  /// control transfers with a jump. The callee's return dispatch jumps
  /// back to the recorded resume position.
  fn write_nested_call(&mut self, node: NodeIdx, call: &CallNode, discard: bool) {
    let params = self.codegen.ast.funcs[call.func].params.clone();

    for (i, &arg) in call.args.iter().enumerate() {
      self.write_expr(arg);
      self.codegen.add_opc(Pcode::AssignScriptVar);
      self.codegen.add_arg(params[i].index);
    }
    for (i, param) in params.iter().enumerate().skip(call.args.len()) {
      if let Some(default_value) = param.default_value {
        self.write_expr(default_value);
        self.codegen.add_opc(Pcode::AssignScriptVar);
        self.codegen.add_arg(params[i].index);
      }
    }

    self.codegen.add_opc(Pcode::PushNumber);
    self.codegen.add_arg(call.nested_call_id);
    let mark = self.codegen.emit_jump(Pcode::Goto);
    self.codegen.nested_jumps.push((mark, call.func));
    let resume = self.codegen.tell();
    self.codegen.nested_returns.insert(node, resume);

    let returns_value = self.codegen.ast.funcs[call.func].return_spec != Spec::Void;
    if returns_value && discard {
      self.codegen.add_opc(Pcode::Drop);
    }
  }

  // ======================== Format output ==========================

  /// Writes a chain of format items inside an open print sequence.
  pub(super) fn write_format_items(&mut self, mut item: FormatItemNode) {
    loop {
      match item.cast {
        FormatCast::Array => {
          let root = self.codegen.ast.expr_root(item.value);
          let reference = self.resolve_ref(root);
          let index = self.ref_array_index(&reference);
          self.codegen.add_opc(Pcode::PushNumber);
          self.codegen.add_arg(index);
          self.codegen.add_opc(match reference.storage {
            Storage::Local => Pcode::PrintScriptCharArray,
            Storage::Map => Pcode::PrintMapCharArray,
            Storage::World => Pcode::PrintWorldCharArray,
            Storage::Global => Pcode::PrintGlobalCharArray,
          });
        }
        _ => {
          self.write_expr(item.value);
          self.codegen.add_opc(match item.cast {
            FormatCast::Binary => Pcode::PrintBinary,
            FormatCast::Char => Pcode::PrintCharacter,
            FormatCast::Decimal => Pcode::PrintNumber,
            FormatCast::Fixed => Pcode::PrintFixed,
            FormatCast::Key => Pcode::PrintBind,
            FormatCast::LocalString => Pcode::PrintLocalized,
            FormatCast::Name => Pcode::PrintName,
            FormatCast::String => Pcode::PrintString,
            FormatCast::Hex => Pcode::PrintHex,
            FormatCast::Array => unreachable!("array cast handled above"),
          });
        }
      }

      match item.next {
        Some(next) => match self.codegen.ast.node(next).clone() {
          NodeKind::FormatItem(node) => item = node,
          _ => unreachable!("format-item chain broken"),
        },
        None => break,
      }
    }
  }

  fn write_strcpy(&mut self, call: StrcpyNode) {
    let array_root = self.codegen.ast.expr_root(call.array);
    let reference = self.resolve_ref(array_root);
    let index = self.ref_array_index(&reference);

    self.codegen.add_opc(Pcode::PushNumber);
    self.codegen.add_arg(index);
    match call.array_offset {
      Some(array_offset) => self.write_expr(array_offset),
      None => {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(0);
      }
    }
    match call.array_length {
      Some(array_length) => self.write_expr(array_length),
      None => {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(i32::MAX);
      }
    }
    self.write_expr(call.string);
    match call.offset {
      Some(offset) => self.write_expr(offset),
      None => {
        self.codegen.add_opc(Pcode::PushNumber);
        self.codegen.add_arg(0);
      }
    }

    self.codegen.add_opc(match reference.storage {
      Storage::Local => Pcode::StrcpyToScriptChRange,
      Storage::Map => Pcode::StrcpyToMapChRange,
      Storage::World => Pcode::StrcpyToWorldChRange,
      Storage::Global => Pcode::StrcpyToGlobalChRange,
    });
  }

  pub(super) fn write_paltrans(&mut self, trans: PaltransNode) {
    self.write_expr(trans.number);
    self.codegen.add_opc(Pcode::StartTranslation);

    for range in trans.ranges {
      self.write_expr(range.begin);
      self.write_expr(range.end);
      match range.value {
        PalRangeValue::Ent { begin, end } => {
          self.write_expr(begin);
          self.write_expr(end);
          self.codegen.add_opc(Pcode::TranslationRange1);
        }
        PalRangeValue::Rgb {
          red1,
          green1,
          blue1,
          red2,
          green2,
          blue2,
        } => {
          self.write_expr(red1);
          self.write_expr(green1);
          self.write_expr(blue1);
          self.write_expr(red2);
          self.write_expr(green2);
          self.write_expr(blue2);
          self.codegen.add_opc(Pcode::TranslationRange2);
        }
      }
    }

    self.codegen.add_opc(Pcode::EndTranslation);
  }
}

fn is_incdec(op: UnaryOp) -> bool {
  matches!(
    op,
    UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec
  )
}
