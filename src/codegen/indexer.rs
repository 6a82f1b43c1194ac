use crate::ast::*;
use crate::errors::{BailResult, ErrMsg};
use crate::{MAX_LITTLE_E_FUNCS, MAX_MAP_LOCATIONS};

use super::Codegen;

/// Local-slot bookkeeping of one block. Sibling blocks inherit the same
/// starting slot, so slots are reclaimed when a block ends and reused
/// by the next one.
struct LocalAlloc {
  /// Next free slot.
  index: i32,
  /// Slots live across the enclosing block chain.
  func_size: i32,
}

/// Local-slot bookkeeping of one script or function body.
struct FuncAlloc {
  /// Stack of open blocks, innermost last.
  locals: Vec<LocalAlloc>,
  /// First slot available to the body. Non-zero for a function nested
  /// inside a block, whose slots sit above the live locals.
  start_index: i32,
  /// High-water mark of simultaneously live slots.
  size: i32,
}

impl FuncAlloc {
  fn new(start_index: i32) -> Self {
    FuncAlloc {
      locals: vec![],
      start_index,
      size: 0,
    }
  }
}

/// The allocation walk over one library:
///
/// - Allocates an index for every local variable.
/// - Determines which strings need to be present at run time. Counting
///   the usage of strings is done so only strings that are used are
///   outputted into the object file; there is no need to output the
///   default arguments of a built-in function that is never called.
struct IndexWalker<'c, 'a> {
  codegen: &'c mut Codegen<'a>,
  func: Option<FuncAlloc>,
}

impl<'a> Codegen<'a> {
  /// Runs index allocation for the task: map-variable slots, function
  /// identifiers, local-variable slots and nested-call ids, marking
  /// used strings along the way.
  pub(super) fn alloc_indexes(&mut self) -> BailResult<()> {
    self.alloc_mapvars_index()?;
    self.alloc_func_indexes()?;
    let mut walker = IndexWalker {
      codegen: self,
      func: None,
    };
    walker.visit_tree();
    Ok(())
  }

  // Order of allocation:
  // - arrays
  // - scalars, with-no-value
  // - scalars, with-value
  // - scalars, with-value, hidden
  // - scalars, with-no-value, hidden
  // - arrays, hidden
  // - imported
  fn alloc_mapvars_index(&mut self) -> BailResult<()> {
    let vars = self.ast.main_library().vars.clone();
    let mut index = 0;

    // Arrays.
    for &v in &vars {
      let var = &mut self.ast.vars[v];
      if var.storage == Storage::Map && (!var.dim.is_empty() || !var.primitive) && !var.hidden {
        var.index = index;
        index += 1;
      }
    }
    // Scalars, with-no-value.
    for &v in &vars {
      if self.map_scalar(v, false) && self.zero_init(v) {
        self.ast.vars[v].index = index;
        index += 1;
      }
    }
    // Scalars, with-value.
    for &v in &vars {
      if self.map_scalar(v, false) && !self.zero_init(v) {
        self.ast.vars[v].index = index;
        index += 1;
      }
    }
    // Scalars, with-value, hidden.
    for &v in &vars {
      if self.map_scalar(v, true) && !self.zero_init(v) {
        self.ast.vars[v].index = index;
        index += 1;
      }
    }
    // Scalars, with-no-value, hidden.
    for &v in &vars {
      if self.map_scalar(v, true) && self.zero_init(v) {
        self.ast.vars[v].index = index;
        index += 1;
      }
    }
    // Arrays, hidden.
    for &v in &vars {
      let var = &mut self.ast.vars[v];
      if var.storage == Storage::Map && (!var.dim.is_empty() || !var.primitive) && var.hidden {
        var.index = index;
        index += 1;
      }
    }
    // Imported.
    let dynamic = self.ast.main_library().dynamic.clone();
    for lib in dynamic {
      let lib_vars = self.ast.libraries[lib].vars.clone();
      for v in lib_vars {
        let var = &mut self.ast.vars[v];
        if var.storage == Storage::Map && var.used {
          var.index = index;
          index += 1;
        }
      }
    }

    index = self.setup_shared_array(index);

    // Don't go over the variable limit.
    if index > MAX_MAP_LOCATIONS {
      let pos = self.ast.main_library().file_pos;
      return self.bail(
        pos,
        ErrMsg::MaxCapacity(format!(
          "library uses over maximum {} variables",
          MAX_MAP_LOCATIONS
        )),
        None,
      );
    }

    Ok(())
  }

  fn map_scalar(&self, v: VarIdx, hidden: bool) -> bool {
    let var = &self.ast.vars[v];
    var.storage == Storage::Map && var.dim.is_empty() && var.primitive && var.hidden == hidden
  }

  fn zero_init(&self, v: VarIdx) -> bool {
    match self.ast.vars[v].value.first() {
      Some(value) => self.ast.expr_value(value.expr) == 0,
      None => true,
    }
  }

  /// Lays out the array holding run-time dimension metadata, when any
  /// aggregate needs it: slot zero stays null, and each aggregate's
  /// dimension strides follow in declaration order.
  fn setup_shared_array(&mut self, index: i32) -> i32 {
    let objects = self.ast.main_library().objects.clone();
    let mut offset = 1;
    let mut needed = false;

    for object in objects {
      match object {
        ObjectRef::Var(v) => {
          let dims = self.ast.vars[v].dim.len() as i32;
          if dims > 0 {
            self.ast.vars[v].diminfo_offset = offset;
            offset += dims;
          }
          if dims > 1 {
            needed = true;
          }
        }
        ObjectRef::Structure(s) => {
          for member in &self.ast.structures[s].members {
            let dims = member.dim.len() as i32;
            if dims > 0 {
              offset += dims;
              needed = true;
            }
          }
        }
      }
    }

    if !needed {
      return index;
    }

    self.shared_array.used = true;
    self.shared_array.index = index;
    self.shared_array.diminfo_size = offset - 1;
    self.shared_array.size = offset;
    index + 1
  }

  fn alloc_func_indexes(&mut self) -> BailResult<()> {
    let mut index = 0;

    // Imported functions.
    let dynamic = self.ast.main_library().dynamic.clone();
    for lib in dynamic {
      let funcs = self.ast.libraries[lib].funcs.clone();
      for f in funcs {
        let func = &mut self.ast.funcs[f];
        if let FuncKind::User(user) = &mut func.kind {
          if user.usage != 0 {
            user.index = index;
            index += 1;
          }
        }
      }
    }
    // Functions.
    let funcs = self.ast.main_library().funcs.clone();
    for f in funcs {
      let func = &mut self.ast.funcs[f];
      if !func.hidden {
        func.impl_mut().index = index;
        index += 1;
      }
    }

    // In the compressed format, the field of the function-call
    // instruction that stores the index of the function is a byte in
    // size, limiting how many different functions can be called.
    if self.is_little_e() && index > MAX_LITTLE_E_FUNCS {
      let pos = self.ast.main_library().file_pos;
      return self.bail(
        pos,
        ErrMsg::MaxCapacity(format!(
          "library uses over maximum {} functions",
          MAX_LITTLE_E_FUNCS
        )),
        Some("to use more functions, try using the #nocompact directive".to_string()),
      );
    }

    Ok(())
  }
}

impl<'c, 'a> IndexWalker<'c, 'a> {
  fn ast(&mut self) -> &mut Ast {
    &mut *self.codegen.ast
  }

  fn visit_tree(&mut self) {
    let scripts = self.ast().main_library().scripts.clone();
    for script in scripts {
      self.visit_script(script);
    }
    // Functions.
    let funcs = self.ast().main_library().funcs.clone();
    for func in funcs {
      self.visit_func(func);
    }
    // Variables.
    let vars = self.ast().main_library().vars.clone();
    for var in vars {
      self.func = None;
      self.visit_var(var);
    }
  }

  fn visit_script(&mut self, s: ScriptIdx) {
    let mut func_alloc = FuncAlloc::new(0);
    for i in 0..self.ast().scripts[s].params.len() {
      self.ast().scripts[s].params[i].index = func_alloc.start_index;
      func_alloc.start_index += 1;
      func_alloc.size += 1;
    }
    self.func = Some(func_alloc);
    let body = self.ast().scripts[s].body;
    self.visit_stmt(body);
    let size = match self.func.take() {
      Some(func_alloc) => func_alloc.size,
      None => unreachable!("script allocation dropped mid-walk"),
    };
    self.ast().scripts[s].size = size;
    let nested = self.ast().scripts[s].nested_funcs.clone();
    if !nested.is_empty() {
      self.assign_nestedcalls_id(&nested);
    }
  }

  fn visit_func(&mut self, f: FuncIdx) {
    let mut func_alloc = FuncAlloc::new(0);
    for i in 0..self.ast().funcs[f].params.len() {
      self.ast().funcs[f].params[i].index = func_alloc.start_index;
      func_alloc.start_index += 1;
      func_alloc.size += 1;
    }
    self.func = Some(func_alloc);
    let body = self.ast().funcs[f].impl_().body;
    self.visit_stmt(body);
    let size = match self.func.take() {
      Some(func_alloc) => func_alloc.size,
      None => unreachable!("function allocation dropped mid-walk"),
    };
    self.ast().funcs[f].impl_mut().size = size;
    let nested = self.ast().funcs[f].impl_().nested_funcs.clone();
    if !nested.is_empty() {
      self.assign_nestedcalls_id(&nested);
    }
  }

  /// Within each nested function, numbers the call sites that reach it
  /// with a dense id in source order.
  fn assign_nestedcalls_id(&mut self, nested_funcs: &[FuncIdx]) {
    for &f in nested_funcs {
      let calls = self.ast().funcs[f].impl_().nested_calls.clone();
      for (id, call) in calls.into_iter().enumerate() {
        match self.ast().node_mut(call) {
          NodeKind::Call(node) => node.nested_call_id = id as i32,
          _ => unreachable!("nested-call entry is not a call node"),
        }
      }
    }
  }

  fn visit_block(&mut self, stmts: Vec<NodeIdx>) {
    let func = match self.func.as_mut() {
      Some(func) => func,
      None => unreachable!("block visited outside a function"),
    };
    let frame = match func.locals.last() {
      Some(parent) => LocalAlloc {
        index: parent.index,
        func_size: parent.func_size,
      },
      None => LocalAlloc {
        index: func.start_index,
        func_size: func.size,
      },
    };
    func.locals.push(frame);

    for stmt in stmts {
      self.visit_block_item(stmt);
    }

    if let Some(func) = self.func.as_mut() {
      func.locals.pop();
    }
  }

  fn visit_block_item(&mut self, node: NodeIdx) {
    match self.ast().node(node).clone() {
      NodeKind::Func(f) => self.visit_nested_func(f),
      NodeKind::Case(label) => self.visit_expr(label.number),
      NodeKind::Var(v) => self.visit_var(v),
      // Ignored.
      NodeKind::CaseDefault(_) | NodeKind::GotoLabel(_) | NodeKind::Import(_) => {}
      _ => self.visit_stmt(node),
    }
  }

  fn visit_stmt(&mut self, node: NodeIdx) {
    match self.ast().node(node).clone() {
      NodeKind::If(stmt) => {
        self.visit_stmt(stmt.body);
        self.visit_expr(stmt.cond);
        if let Some(else_body) = stmt.else_body {
          self.visit_stmt(else_body);
        }
      }
      NodeKind::While(stmt) => {
        self.visit_expr(stmt.cond);
        self.visit_stmt(stmt.body);
      }
      NodeKind::For(stmt) => self.visit_for(stmt),
      NodeKind::FormatItem(item) => self.visit_format_item(item),
      NodeKind::Switch(stmt) => {
        self.visit_expr(stmt.cond);
        self.visit_stmt(stmt.body);
      }
      NodeKind::Block(stmts) => self.visit_block(stmts),
      NodeKind::Return(stmt) => {
        if let Some(value) = stmt.value {
          self.visit_stmt(value);
        }
      }
      NodeKind::PackedExpr(packed) => self.visit_packed_expr(packed),
      NodeKind::Paltrans(trans) => self.visit_paltrans(trans),
      _ => {}
    }
  }

  fn visit_for(&mut self, stmt: ForNode) {
    for node in stmt.init {
      match self.ast().node(node).clone() {
        NodeKind::Expr(_) => self.visit_expr(node),
        NodeKind::Var(v) => self.visit_var(v),
        _ => {}
      }
    }
    if let Some(cond) = stmt.cond {
      self.visit_expr(cond);
    }
    for node in stmt.post {
      self.visit_expr(node);
    }
    self.visit_stmt(stmt.body);
  }

  fn visit_nested_func(&mut self, f: FuncIdx) {
    let is_user = matches!(self.ast().funcs[f].kind, FuncKind::User(_));
    if is_user {
      self.visit_nested_userfunc(f);
    } else {
      self.visit_nested_builtinfunc(f);
    }
  }

  fn visit_nested_userfunc(&mut self, f: FuncIdx) {
    // The nested function's slots begin above the locals live at the
    // declaration, so the two sets survive side by side across the
    // inner call.
    let index_offset = match self.func.as_ref().and_then(|func| func.locals.last()) {
      Some(local) => local.index,
      None => unreachable!("nested function outside a block"),
    };
    self.ast().funcs[f].impl_mut().index_offset = index_offset;

    let mut func_alloc = FuncAlloc::new(index_offset);
    for i in 0..self.ast().funcs[f].params.len() {
      self.ast().funcs[f].params[i].index = func_alloc.start_index;
      func_alloc.start_index += 1;
      func_alloc.size += 1;
    }

    let parent = std::mem::replace(&mut self.func, Some(func_alloc));
    let body = self.ast().funcs[f].impl_().body;
    match self.ast().node(body).clone() {
      NodeKind::Block(stmts) => self.visit_block(stmts),
      _ => unreachable!("function body is not a block"),
    }
    let size = match std::mem::replace(&mut self.func, parent) {
      Some(func_alloc) => func_alloc.size,
      None => unreachable!("nested-function allocation dropped mid-walk"),
    };
    self.ast().funcs[f].impl_mut().size = size;

    if let Some(parent) = self.func.as_mut() {
      if let Some(local) = parent.locals.last() {
        let new_size = local.func_size + size;
        if parent.size < new_size {
          parent.size = new_size;
        }
      }
    }
  }

  fn visit_nested_builtinfunc(&mut self, f: FuncIdx) {
    // Allocate a script variable only for a parameter that is used as
    // part of the default value of a later parameter.
    for i in 0..self.ast().funcs[f].params.len() {
      if self.ast().funcs[f].params[i].used {
        let index = self.alloc_scriptvar();
        self.ast().funcs[f].params[i].index = index;
      }
    }
  }

  fn visit_var(&mut self, v: VarIdx) {
    let values = self.ast().vars[v].value.clone();
    for value in values {
      if !value.string_initz {
        self.visit_expr(value.expr);
      }
    }
    if self.ast().vars[v].storage == Storage::Local {
      let index = self.alloc_scriptvar();
      self.ast().vars[v].index = index;
    }
  }

  fn visit_format_item(&mut self, mut item: FormatItemNode) {
    loop {
      self.visit_expr(item.value);
      match item.next {
        Some(next) => match self.ast().node(next).clone() {
          NodeKind::FormatItem(node) => item = node,
          _ => unreachable!("format-item chain broken"),
        },
        None => break,
      }
    }
  }

  /// Increases the space size of local variables by one, returning the
  /// index of the space slot.
  fn alloc_scriptvar(&mut self) -> i32 {
    let func = match self.func.as_mut() {
      Some(func) => func,
      None => unreachable!("local allocated outside a function"),
    };
    let local = match func.locals.last_mut() {
      Some(local) => local,
      None => unreachable!("local allocated outside a block"),
    };
    let index = local.index;
    local.index += 1;
    local.func_size += 1;
    if local.func_size > func.size {
      func.size = local.func_size;
    }
    index
  }

  fn visit_packed_expr(&mut self, packed: PackedExprNode) {
    self.visit_expr(packed.expr);
    if let Some(block) = packed.block {
      match self.ast().node(block).clone() {
        NodeKind::Block(stmts) => self.visit_block(stmts),
        _ => unreachable!("format block is not a block"),
      }
    }
  }

  fn visit_expr(&mut self, node: NodeIdx) {
    match self.ast().node(node).clone() {
      NodeKind::Expr(expr) => self.visit_expr(expr.root),
      NodeKind::Unary(unary) => self.visit_expr(unary.operand),
      NodeKind::Binary(binary) => {
        self.visit_expr(binary.lside);
        self.visit_expr(binary.rside);
      }
      NodeKind::IndexedStringUsage(string) => {
        self.ast().strings.get_mut(string).used = true;
      }
      NodeKind::Call(call) => self.visit_call(call),
      NodeKind::FormatItem(item) => self.visit_format_item(item),
      NodeKind::Access(access) => {
        self.visit_expr(access.lside);
        self.visit_expr(access.rside);
      }
      NodeKind::Paren(inside) => self.visit_expr(inside),
      NodeKind::Subscript(sub) => {
        self.visit_expr(sub.lside);
        self.visit_expr(sub.index);
      }
      NodeKind::Assign(assign) => {
        self.visit_expr(assign.lside);
        self.visit_expr(assign.rside);
      }
      NodeKind::Constant(constant) => {
        if let Some(value_node) = constant.value_node {
          self.visit_expr(value_node);
        }
      }
      NodeKind::NameUsage(usage) => {
        if let UsageObject::Constant(node) = usage.object {
          self.visit_expr(node);
        }
      }
      NodeKind::ParamUsage(f, i) => {
        if let Some(default_value) = self.ast().funcs[f].params[i].default_value {
          self.visit_expr(default_value);
        }
      }
      NodeKind::Conditional(cond) => {
        self.visit_expr(cond.left);
        if let Some(middle) = cond.middle {
          self.visit_expr(middle);
        }
        self.visit_expr(cond.right);
      }
      NodeKind::Strcpy(call) => self.visit_strcpy(call),
      _ => {}
    }
  }

  fn visit_call(&mut self, call: CallNode) {
    self.visit_expr(call.operand);
    if let FuncKind::User(user) = &mut self.ast().funcs[call.func].kind {
      user.usage = 1;
    }
    // Arguments.
    for &arg in &call.args {
      self.visit_expr(arg);
    }
    // Default arguments of the parameters left unprovided. Walking them
    // only here keeps the strings of never-reached defaults out of the
    // object file.
    for i in call.args.len()..self.ast().funcs[call.func].params.len() {
      if let Some(default_value) = self.ast().funcs[call.func].params[i].default_value {
        self.visit_expr(default_value);
      }
    }
  }

  fn visit_paltrans(&mut self, trans: PaltransNode) {
    self.visit_expr(trans.number);
    for range in trans.ranges {
      self.visit_expr(range.begin);
      self.visit_expr(range.end);
      match range.value {
        PalRangeValue::Rgb {
          red1,
          green1,
          blue1,
          red2,
          green2,
          blue2,
        } => {
          self.visit_expr(red1);
          self.visit_expr(green1);
          self.visit_expr(blue1);
          self.visit_expr(red2);
          self.visit_expr(green2);
          self.visit_expr(blue2);
        }
        PalRangeValue::Ent { begin, end } => {
          self.visit_expr(begin);
          self.visit_expr(end);
        }
      }
    }
  }

  fn visit_strcpy(&mut self, call: StrcpyNode) {
    self.visit_expr(call.array);
    if let Some(array_offset) = call.array_offset {
      self.visit_expr(array_offset);
      if let Some(array_length) = call.array_length {
        self.visit_expr(array_length);
      }
    }
    self.visit_expr(call.string);
    if let Some(offset) = call.offset {
      self.visit_expr(offset);
    }
  }
}
