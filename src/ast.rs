use bitflags::bitflags;
use hashbrown::HashMap;

/// Represents the index of a node in the `Ast` arena.
pub type NodeIdx = usize;
/// Represents the index of a variable in the `Ast` arena.
pub type VarIdx = usize;
/// Represents the index of a function in the `Ast` arena.
pub type FuncIdx = usize;
/// Represents the index of a script in the `Ast` arena.
pub type ScriptIdx = usize;
/// Represents the index of a structure in the `Ast` arena.
pub type StructureIdx = usize;
/// Represents the index of a library in the `Ast` arena.
pub type LibraryIdx = usize;
/// Represents the index of a string in the string table.
pub type StringIdx = usize;

/// A source position, carried for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pos {
  pub line: usize,
  pub column: usize,
}

/// The abstract syntax tree of a compilation task, in the form of an
/// arena data structure.
///
/// Identifiers point back at declarations and declarations at their
/// uses, so the tree is really a graph; storing every entity in a typed
/// section and cross-referencing through indexes keeps ownership in one
/// place. Because variables, functions, scripts and libraries are heavy
/// and mutated by the back end (assigned slots, sizes, object offsets),
/// they live in their own sections so the `NodeKind` enum is not
/// penalized by their weight.
#[derive(Default)]
pub struct Ast {
  nodes: Vec<NodeKind>,
  pub vars: Vec<Var>,
  pub funcs: Vec<Func>,
  pub scripts: Vec<Script>,
  pub structures: Vec<Structure>,
  /// All libraries of the task. The first entry is the main library;
  /// the rest are imports.
  pub libraries: Vec<Library>,
  pub strings: StringTable,
}

impl Ast {
  /// Creates an arena holding a single, empty main library.
  pub fn new(name: &str) -> Self {
    let mut ast = Ast::default();
    ast.libraries.push(Library::new(name));
    ast
  }

  /// Pushes a new node to the arena.
  pub fn push_node(&mut self, node: NodeKind) -> NodeIdx {
    self.nodes.push(node);
    self.nodes.len() - 1
  }

  pub fn node(&self, idx: NodeIdx) -> &NodeKind {
    &self.nodes[idx]
  }

  pub fn node_mut(&mut self, idx: NodeIdx) -> &mut NodeKind {
    &mut self.nodes[idx]
  }

  /// Wraps an already-built operand tree into an expression node with
  /// its compile-time value, the way the semantic pass hands trees to
  /// the back end. `folded` marks a tree that reduced to the plain
  /// constant in `value`.
  pub fn push_expr(&mut self, root: NodeIdx, value: i32, folded: bool, has_str: bool) -> NodeIdx {
    self.push_node(NodeKind::Expr(ExprNode {
      root,
      value,
      folded,
      has_str,
    }))
  }

  /// The compile-time value of an expression node.
  pub fn expr_value(&self, idx: NodeIdx) -> i32 {
    match self.node(idx) {
      NodeKind::Expr(expr) => expr.value,
      _ => unreachable!("expected an expression node"),
    }
  }

  /// The operand tree of an expression node.
  pub fn expr_root(&self, idx: NodeIdx) -> NodeIdx {
    match self.node(idx) {
      NodeKind::Expr(expr) => expr.root,
      _ => unreachable!("expected an expression node"),
    }
  }

  /// Whether an expression node holds a string somewhere in its tree.
  pub fn expr_has_str(&self, idx: NodeIdx) -> bool {
    match self.node(idx) {
      NodeKind::Expr(expr) => expr.has_str,
      _ => unreachable!("expected an expression node"),
    }
  }

  pub fn main_library(&self) -> &Library {
    &self.libraries[0]
  }

  /// The name of a named script, read from its number expression.
  pub fn script_name(&self, script: &Script) -> Option<StringIdx> {
    let number = script.number?;
    match self.node(self.expr_root(number)) {
      NodeKind::IndexedStringUsage(string) => Some(*string),
      _ => None,
    }
  }
}

// ============================ Libraries =============================

/// The object-file format to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
  /// Uncompressed, magic `ACSE`.
  BigE,
  /// Compressed, magic `ACSe`.
  LittleE,
}

/// A top-level declaration of a library, in declaration order. Used to
/// lay out run-time dimension metadata.
#[derive(Debug, Clone, Copy)]
pub enum ObjectRef {
  Var(VarIdx),
  Structure(StructureIdx),
}

/// A compilation unit. One library produces one object file.
pub struct Library {
  pub name: String,
  pub file_pos: Pos,
  pub vars: Vec<VarIdx>,
  pub funcs: Vec<FuncIdx>,
  pub scripts: Vec<ScriptIdx>,
  /// Every top-level object, in declaration order.
  pub objects: Vec<ObjectRef>,
  /// Imported libraries that must be present at run time.
  pub dynamic: Vec<LibraryIdx>,
  pub format: Format,
  pub importable: bool,
  pub encrypt_str: bool,
  /// A compile-time-only import is not listed in the `LOAD` chunk.
  pub compiletime: bool,
}

impl Library {
  pub fn new(name: &str) -> Self {
    Library {
      name: name.to_string(),
      file_pos: Pos::default(),
      vars: vec![],
      funcs: vec![],
      scripts: vec![],
      objects: vec![],
      dynamic: vec![],
      format: Format::BigE,
      importable: false,
      encrypt_str: false,
      compiletime: false,
    }
  }
}

// ============================ Variables =============================

/// Where a variable lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
  Local,
  Map,
  World,
  Global,
}

/// One dimension of an array type. `element_size` is the number of
/// primitive slots one element of this dimension occupies.
#[derive(Debug, Clone, Copy)]
pub struct Dim {
  pub size: i32,
  pub element_size: i32,
}

/// One entry of an initializer, positioned at `index` within the
/// variable's storage.
#[derive(Debug, Clone, Copy)]
pub struct Value {
  pub index: i32,
  pub expr: NodeIdx,
  /// The entry spells a string into consecutive character slots rather
  /// than storing the string handle itself.
  pub string_initz: bool,
}

pub struct Var {
  pub name: String,
  pub pos: Pos,
  pub storage: Storage,
  pub dim: Vec<Dim>,
  pub structure: Option<StructureIdx>,
  pub value: Vec<Value>,
  /// Total primitive slots occupied.
  pub size: i32,
  /// Storage slot, assigned by the index allocator.
  pub index: i32,
  pub hidden: bool,
  pub used: bool,
  pub initial_has_str: bool,
  /// Whether the variable's type is a primitive type.
  pub primitive: bool,
  /// Offset of this variable's dimension strides inside the shared
  /// metadata array, when one is published.
  pub diminfo_offset: i32,
}

impl Var {
  pub fn new(name: &str, storage: Storage) -> Self {
    Var {
      name: name.to_string(),
      pos: Pos::default(),
      storage,
      dim: vec![],
      structure: None,
      value: vec![],
      size: 1,
      index: 0,
      hidden: false,
      used: false,
      initial_has_str: false,
      primitive: true,
      diminfo_offset: 0,
    }
  }
}

pub struct Structure {
  pub name: String,
  pub members: Vec<StructureMember>,
  /// Total primitive slots one value of this structure occupies.
  pub size: i32,
}

pub struct StructureMember {
  pub name: String,
  pub dim: Vec<Dim>,
  pub offset: i32,
  pub size: i32,
}

// ============================ Functions =============================

/// The type specifier of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spec {
  Void,
  Int,
  Fixed,
  Bool,
  Str,
}

/// A script or function parameter.
#[derive(Debug, Clone)]
pub struct Param {
  pub pos: Pos,
  pub size: i32,
  /// Storage slot, assigned by the index allocator.
  pub index: i32,
  /// Set when a later parameter's default value reads this one, which
  /// forces the argument into a hidden pre-call slot.
  pub used: bool,
  pub default_value: Option<NodeIdx>,
}

impl Param {
  pub fn new() -> Self {
    Param {
      pos: Pos::default(),
      size: 1,
      index: 0,
      used: false,
      default_value: None,
    }
  }
}

impl Default for Param {
  fn default() -> Self {
    Param::new()
  }
}

/// How a call to the function is carried out at run time.
pub enum FuncKind {
  /// An action special, invoked through the `LSPEC*` instructions.
  Aspec { id: i32 },
  /// An engine extension function, invoked through `CallFunc`.
  Ext { id: i32 },
  /// A function with a dedicated instruction.
  Ded { opcode: crate::pcode::Pcode },
  /// A print-family function; the opcode terminates the format block.
  Format { opcode: crate::pcode::Pcode },
  /// A user function compiled into the user-code region.
  User(Box<UserFunc>),
}

/// The compiled representation of a user function.
pub struct UserFunc {
  /// Identifier used by the call instructions, assigned by the index
  /// allocator.
  pub index: i32,
  /// Local-variable high-water mark, parameters included.
  pub size: i32,
  /// Number of calls reaching the function.
  pub usage: i32,
  /// Byte offset of the body in the object file.
  pub obj_pos: i32,
  /// First local slot, when the function is nested inside a block and
  /// must not collide with the enclosing live locals.
  pub index_offset: i32,
  pub body: NodeIdx,
  /// Local array declarations, published per function.
  pub vars: Vec<VarIdx>,
  pub nested_funcs: Vec<FuncIdx>,
  /// Call sites that target this nested function, in source order.
  pub nested_calls: Vec<NodeIdx>,
}

impl UserFunc {
  pub fn new(body: NodeIdx) -> Self {
    UserFunc {
      index: 0,
      size: 0,
      usage: 0,
      obj_pos: 0,
      index_offset: 0,
      body,
      vars: vec![],
      nested_funcs: vec![],
      nested_calls: vec![],
    }
  }
}

pub struct Func {
  pub name: String,
  pub pos: Pos,
  pub params: Vec<Param>,
  pub min_param: i32,
  pub max_param: i32,
  pub return_spec: Spec,
  pub hidden: bool,
  pub kind: FuncKind,
}

impl Func {
  pub fn user(name: &str, body: NodeIdx) -> Self {
    Func {
      name: name.to_string(),
      pos: Pos::default(),
      params: vec![],
      min_param: 0,
      max_param: 0,
      return_spec: Spec::Void,
      hidden: false,
      kind: FuncKind::User(Box::new(UserFunc::new(body))),
    }
  }

  pub fn impl_(&self) -> &UserFunc {
    match &self.kind {
      FuncKind::User(user) => user,
      _ => unreachable!("function has no user implementation"),
    }
  }

  pub fn impl_mut(&mut self) -> &mut UserFunc {
    match &mut self.kind {
      FuncKind::User(user) => user,
      _ => unreachable!("function has no user implementation"),
    }
  }
}

// ============================= Scripts ==============================

/// The engine trigger of a script. The numbering is the object-file
/// encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ScriptType {
  Closed = 0,
  Open = 1,
  Respawn = 2,
  Death = 3,
  Enter = 4,
  Pickup = 5,
  BlueReturn = 6,
  RedReturn = 7,
  WhiteReturn = 8,
  Lightning = 12,
  Unloading = 13,
  Disconnect = 14,
  Return = 15,
}

bitflags! {
  /// Execution flags published through the `SFLG` chunk.
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct ScriptFlags: u16 {
    const NET = 0x1;
    const CLIENTSIDE = 0x2;
  }
}

pub struct Script {
  pub pos: Pos,
  /// The number the engine addresses the script by. Named scripts get
  /// theirs assigned during semantic analysis.
  pub assigned_number: i32,
  /// The number (or name) expression as written.
  pub number: Option<NodeIdx>,
  pub kind: ScriptType,
  pub named_script: bool,
  /// Byte offset of the body in the object file.
  pub offset: i32,
  pub num_param: i32,
  /// Local-variable high-water mark, parameters included.
  pub size: i32,
  pub flags: ScriptFlags,
  pub params: Vec<Param>,
  pub body: NodeIdx,
  /// Local array declarations, published per script.
  pub vars: Vec<VarIdx>,
  pub nested_funcs: Vec<FuncIdx>,
}

impl Script {
  pub fn new(number: i32, body: NodeIdx) -> Self {
    Script {
      pos: Pos::default(),
      assigned_number: number,
      number: None,
      kind: ScriptType::Closed,
      named_script: false,
      offset: 0,
      num_param: 0,
      size: 0,
      flags: ScriptFlags::empty(),
      params: vec![],
      body,
      vars: vec![],
      nested_funcs: vec![],
    }
  }
}

// ============================= Strings ==============================

/// A string literal interned into the task-wide table.
pub struct IndexedString {
  pub value: String,
  /// Final slot in the published string pool, assigned once the usable
  /// strings are linked.
  pub index: i32,
  /// Set by the allocator walk when reachable code references the
  /// string.
  pub used: bool,
  pub imported: bool,
  /// An imported string referenced from a constant is usable by the
  /// importing library.
  pub in_constant: bool,
}

impl IndexedString {
  /// Length in bytes, NUL terminator not included.
  pub fn len(&self) -> usize {
    self.value.len()
  }

  pub fn is_empty(&self) -> bool {
    self.value.is_empty()
  }
}

/// The task-wide string table.
///
/// Strings are interned once and addressed by `StringIdx`. Before the
/// object file is written, the usable strings are linked into their
/// publication order: strings of the current library first, then
/// imported strings that appear in constants. Used strings thereby
/// cluster at the front, keeping the published pool short.
#[derive(Default)]
pub struct StringTable {
  strings: Vec<IndexedString>,
  lookup: HashMap<String, StringIdx>,
  usable: Vec<StringIdx>,
}

impl StringTable {
  /// Interns a string, returning the existing entry when the value was
  /// seen before.
  pub fn intern(&mut self, value: &str) -> StringIdx {
    if let Some(idx) = self.lookup.get(value) {
      return *idx;
    }

    self.strings.push(IndexedString {
      value: value.to_string(),
      index: 0,
      used: false,
      imported: false,
      in_constant: false,
    });

    let idx = self.strings.len() - 1;
    self.lookup.insert(value.to_string(), idx);
    idx
  }

  pub fn get(&self, idx: StringIdx) -> &IndexedString {
    &self.strings[idx]
  }

  pub fn get_mut(&mut self, idx: StringIdx) -> &mut IndexedString {
    &mut self.strings[idx]
  }

  pub fn len(&self) -> usize {
    self.strings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.strings.is_empty()
  }

  /// Links the strings that have the potential to be used and assigns
  /// their pool indexes. Strings of the current library appear first;
  /// of the imported libraries, only strings in a constant are useful.
  pub fn link_usable(&mut self) {
    self.usable.clear();

    for idx in 0..self.strings.len() {
      if !self.strings[idx].imported {
        self.usable.push(idx);
      }
    }

    for idx in 0..self.strings.len() {
      let string = &self.strings[idx];
      if string.imported && string.in_constant {
        self.usable.push(idx);
      }
    }

    for (index, idx) in self.usable.iter().enumerate() {
      self.strings[*idx].index = index as i32;
    }
  }

  /// The strings that must appear in the published pool: the usable
  /// list cut after the last used entry, so that every published slot
  /// matches its assigned index while unused tail entries stay out of
  /// the object file.
  pub fn published(&self) -> &[StringIdx] {
    let mut end = 0;

    for (position, idx) in self.usable.iter().enumerate() {
      if self.strings[*idx].used {
        end = position + 1;
      }
    }

    &self.usable[..end]
  }
}

// =============================== Nodes ==============================

/// The operator of a unary expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Minus,
  Plus,
  LogNot,
  BitNot,
  PreInc,
  PreDec,
  PostInc,
  PostDec,
}

/// The operator of a binary expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  LogOr,
  LogAnd,
  BitOr,
  BitXor,
  BitAnd,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  ShiftL,
  ShiftR,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
}

/// The operator of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
  Plain,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  ShiftL,
  ShiftR,
  BitAnd,
  BitXor,
  BitOr,
}

/// The cast of a format item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCast {
  Array,
  Binary,
  Char,
  Decimal,
  Fixed,
  Key,
  LocalString,
  Name,
  String,
  Hex,
}

/// The loop form of a while statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhileKind {
  While,
  Until,
  DoWhile,
  DoUntil,
}

/// A break or continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
  Break,
  Continue,
}

/// A whole-script control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptJumpKind {
  Terminate,
  Suspend,
  Restart,
}

/// The declaration an identifier resolves to.
#[derive(Debug, Clone, Copy)]
pub enum UsageObject {
  Var(VarIdx),
  Func(FuncIdx),
  Constant(NodeIdx),
  Member(StructureIdx, usize),
}

#[derive(Clone)]
pub struct ExprNode {
  pub root: NodeIdx,
  /// The compile-time value, filled in by the semantic pass when the
  /// tree folds to a constant.
  pub value: i32,
  /// Whether the tree reduced to `value` at compile time.
  pub folded: bool,
  pub has_str: bool,
}

#[derive(Clone)]
pub struct UnaryNode {
  pub op: UnaryOp,
  pub operand: NodeIdx,
}

#[derive(Clone)]
pub struct BinaryNode {
  pub op: BinaryOp,
  pub lside: NodeIdx,
  pub rside: NodeIdx,
}

#[derive(Clone)]
pub struct NameUsage {
  pub name: String,
  pub object: UsageObject,
}

#[derive(Clone)]
pub struct ConstantNode {
  pub value: i32,
  pub value_node: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct CallNode {
  pub operand: NodeIdx,
  pub func: FuncIdx,
  pub args: Vec<NodeIdx>,
  /// Dense id among the call sites of a nested function, assigned by
  /// the index allocator; -1 everywhere else.
  pub nested_call_id: i32,
}

#[derive(Clone)]
pub struct FormatItemNode {
  pub cast: FormatCast,
  pub value: NodeIdx,
  pub next: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct AccessNode {
  pub lside: NodeIdx,
  pub rside: NodeIdx,
}

#[derive(Clone)]
pub struct SubscriptNode {
  pub lside: NodeIdx,
  pub index: NodeIdx,
}

#[derive(Clone)]
pub struct AssignNode {
  pub op: AssignOp,
  pub lside: NodeIdx,
  pub rside: NodeIdx,
}

#[derive(Clone)]
pub struct ConditionalNode {
  pub left: NodeIdx,
  pub middle: Option<NodeIdx>,
  pub right: NodeIdx,
}

#[derive(Clone)]
pub struct StrcpyNode {
  pub array: NodeIdx,
  pub array_offset: Option<NodeIdx>,
  pub array_length: Option<NodeIdx>,
  pub string: NodeIdx,
  pub offset: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct PackedExprNode {
  pub expr: NodeIdx,
  pub block: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct IfNode {
  pub cond: NodeIdx,
  pub body: NodeIdx,
  pub else_body: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct WhileNode {
  pub kind: WhileKind,
  pub cond: NodeIdx,
  pub body: NodeIdx,
}

#[derive(Clone)]
pub struct ForNode {
  pub init: Vec<NodeIdx>,
  pub cond: Option<NodeIdx>,
  pub post: Vec<NodeIdx>,
  pub body: NodeIdx,
}

#[derive(Clone)]
pub struct SwitchNode {
  pub cond: NodeIdx,
  pub body: NodeIdx,
}

#[derive(Clone)]
pub struct CaseNode {
  pub pos: Pos,
  pub number: NodeIdx,
}

#[derive(Clone)]
pub struct ReturnNode {
  pub value: Option<NodeIdx>,
}

#[derive(Clone)]
pub struct PalRange {
  pub begin: NodeIdx,
  pub end: NodeIdx,
  pub value: PalRangeValue,
}

#[derive(Clone)]
pub enum PalRangeValue {
  Ent {
    begin: NodeIdx,
    end: NodeIdx,
  },
  Rgb {
    red1: NodeIdx,
    green1: NodeIdx,
    blue1: NodeIdx,
    red2: NodeIdx,
    green2: NodeIdx,
    blue2: NodeIdx,
  },
}

#[derive(Clone)]
pub struct PaltransNode {
  pub number: NodeIdx,
  pub ranges: Vec<PalRange>,
}

/// An expression or statement node. The back end reads nodes by value
/// (every payload is cheap to clone) so walks can mutate the entity
/// sections of the arena while descending.
#[derive(Clone)]
pub enum NodeKind {
  Expr(ExprNode),
  Literal(i32),
  IndexedStringUsage(StringIdx),
  Unary(UnaryNode),
  Binary(BinaryNode),
  Paren(NodeIdx),
  NameUsage(NameUsage),
  Constant(ConstantNode),
  Call(CallNode),
  FormatItem(FormatItemNode),
  Access(AccessNode),
  Subscript(SubscriptNode),
  Assign(AssignNode),
  Conditional(ConditionalNode),
  Strcpy(StrcpyNode),
  ParamUsage(FuncIdx, usize),
  PackedExpr(PackedExprNode),

  Block(Vec<NodeIdx>),
  If(IfNode),
  While(WhileNode),
  For(ForNode),
  Switch(SwitchNode),
  Case(CaseNode),
  CaseDefault(Pos),
  GotoLabel(String),
  Goto(NodeIdx),
  Jump(JumpKind),
  ScriptJump(ScriptJumpKind),
  Return(ReturnNode),
  Paltrans(PaltransNode),
  Var(VarIdx),
  Func(FuncIdx),
  Import(LibraryIdx),
}
