use crate::ast::*;
use crate::errors::BailResult;

use super::Codegen;

const STR_ENCRYPTION_CONSTANT: i32 = 157135;

/// Scripts get this many local slots without a count override.
const DEFAULT_SCRIPT_SIZE: i32 = 20;

const TAG_INTEGER: u8 = 0;
const TAG_STRING: u8 = 1;

fn alignpad(size: i32, align: i32) -> i32 {
  (align - size % align) % align
}

fn total_param_size(func: &Func) -> i32 {
  let mut size = 0;
  for param in &func.params {
    size += param.size;
  }
  // In functions with optional parameters, a hidden parameter used to
  // store the number of arguments passed is found after the last
  // function parameter.
  if func.min_param < func.max_param {
    size += 1;
  }
  size
}

fn aray_var(var: &Var) -> bool {
  var.storage == Storage::Map && (!var.dim.is_empty() || var.structure.is_some()) && !var.hidden
}

fn mimp_var(var: &Var) -> bool {
  var.storage == Storage::Map && var.used && var.dim.is_empty() && var.structure.is_none()
}

fn aimp_array(var: &Var) -> bool {
  var.storage == Storage::Map && var.used && (var.structure.is_some() || !var.dim.is_empty())
}

fn mexp_array(var: &Var) -> bool {
  var.storage == Storage::Map && (!var.dim.is_empty() || var.structure.is_some()) && !var.hidden
}

fn mstr_var(var: &Var) -> bool {
  var.storage == Storage::Map
    && var.dim.is_empty()
    && var.structure.is_none()
    && var.initial_has_str
}

fn astr_var(var: &Var) -> bool {
  var.storage == Storage::Map
    && !var.dim.is_empty()
    && var.structure.is_none()
    && var.initial_has_str
}

fn atag_var(var: &Var) -> bool {
  var.storage == Storage::Map && var.structure.is_some() && var.initial_has_str
}

fn script_array(var: &Var) -> bool {
  var.storage == Storage::Local && !var.dim.is_empty()
}

impl<'a> Codegen<'a> {
  /// Writes the whole object: the reserved header, the user-code
  /// region, every applicable chunk, and finally the back-patched
  /// header, then flushes the buffer to disk.
  pub(super) fn write_object(&mut self) -> BailResult<()> {
    if self.is_little_e() {
      self.compress = true;
    }

    // Reserve header.
    self.add_int(0);
    self.add_int(0);
    self.write_user_code();
    let chunk_pos = self.tell();

    self.do_sptr();
    self.do_svct();
    self.do_sflg();
    self.do_snam();
    self.do_func();
    self.do_fnam();
    self.do_strl();
    self.do_mini();
    self.do_aray();
    self.do_aini();
    self.do_load();
    self.do_mimp();
    self.do_aimp();
    self.do_sary();
    if self.ast.main_library().importable {
      self.do_mexp();
      self.do_mstr();
      self.do_astr();
      self.do_atag();
    }

    // When an object lump is below 32 bytes in size, the engine
    // considers it to be of unknown format, even though it appears to
    // be valid, just empty. An unknown format is an error, so pad up
    // to the minimum limit.
    while self.tell() < 32 {
      self.add_byte(0);
    }

    self.seek(0);
    if self.is_little_e() {
      self.add_str("ACSe");
    } else {
      self.add_str("ACSE");
    }
    self.add_int(chunk_pos);
    self.flush()
  }

  fn mini_var(&self, v: VarIdx) -> bool {
    let var = &self.ast.vars[v];
    var.storage == Storage::Map
      && var.dim.is_empty()
      && var.structure.is_none()
      && match var.value.first() {
        Some(value) => self.ast.expr_value(value.expr) != 0,
        None => false,
      }
  }

  fn mexp_zeroinit_scalar(&self, v: VarIdx) -> bool {
    let var = &self.ast.vars[v];
    var.storage == Storage::Map
      && var.dim.is_empty()
      && var.structure.is_none()
      && !var.hidden
      && match var.value.first() {
        Some(value) => self.ast.expr_value(value.expr) == 0,
        None => true,
      }
  }

  fn mexp_nonzeroinit_scalar(&self, v: VarIdx) -> bool {
    let var = &self.ast.vars[v];
    var.storage == Storage::Map
      && var.dim.is_empty()
      && var.structure.is_none()
      && !var.hidden
      && match var.value.first() {
        Some(value) => self.ast.expr_value(value.expr) != 0,
        None => false,
      }
  }

  fn do_sptr(&mut self) {
    let scripts = self.ast.main_library().scripts.clone();
    if scripts.is_empty() {
      return;
    }

    self.add_str("SPTR");
    self.add_int(12 * scripts.len() as i32);
    for s in scripts {
      let (number, kind, offset, num_param) = {
        let script = &self.ast.scripts[s];
        (
          script.assigned_number as i16,
          script.kind as i16,
          script.offset,
          script.num_param,
        )
      };
      self.add_short(number);
      self.add_short(kind);
      self.add_int(offset);
      self.add_int(num_param);
    }
  }

  fn do_svct(&mut self) {
    let scripts = self.ast.main_library().scripts.clone();
    let count = scripts
      .iter()
      .filter(|&&s| self.ast.scripts[s].size > DEFAULT_SCRIPT_SIZE)
      .count() as i32;
    if count == 0 {
      return;
    }

    self.add_str("SVCT");
    self.add_int(4 * count);
    for s in scripts {
      let (number, size) = {
        let script = &self.ast.scripts[s];
        (script.assigned_number as i16, script.size as i16)
      };
      if i32::from(size) > DEFAULT_SCRIPT_SIZE {
        self.add_short(number);
        self.add_short(size);
      }
    }
  }

  fn do_sflg(&mut self) {
    let scripts = self.ast.main_library().scripts.clone();
    let count = scripts
      .iter()
      .filter(|&&s| !self.ast.scripts[s].flags.is_empty())
      .count() as i32;
    if count == 0 {
      return;
    }

    self.add_str("SFLG");
    self.add_int(4 * count);
    for s in scripts {
      let (number, flags) = {
        let script = &self.ast.scripts[s];
        (script.assigned_number as i16, script.flags)
      };
      if !flags.is_empty() {
        self.add_short(number);
        self.add_short(flags.bits() as i16);
      }
    }
  }

  fn do_snam(&mut self) {
    let scripts = self.ast.main_library().scripts.clone();
    let mut names = vec![];
    for &s in &scripts {
      let script = &self.ast.scripts[s];
      if script.named_script {
        match self.ast.script_name(script) {
          Some(string) => names.push(string),
          None => unreachable!("named script without a name"),
        }
      }
    }
    if names.is_empty() {
      return;
    }

    let count = names.len() as i32;
    let total_length: i32 = names
      .iter()
      .map(|&string| self.ast.strings.get(string).len() as i32 + 1)
      .sum();
    let mut size = 4 + 4 * count + total_length;
    let padding = alignpad(size, 4);
    size += padding;

    self.add_str("SNAM");
    self.add_int(size);
    self.add_int(count);
    // Offsets.
    let mut offset = 4 + 4 * count;
    for &string in &names {
      self.add_int(offset);
      offset += self.ast.strings.get(string).len() as i32 + 1;
    }
    // Text.
    for &string in &names {
      let value = self.ast.strings.get(string).value.clone();
      self.add_str_z(&value);
    }
    for _ in 0..padding {
      self.add_byte(0);
    }
  }

  /// The functions every imported library contributes when used,
  /// followed by every function of this library. Positions in this
  /// chunk are the identifiers the call instructions use.
  fn do_func(&mut self) {
    let funcs = self.ast.main_library().funcs.clone();
    let imported = self.imported_used_funcs();
    let count = (funcs.len() + imported.len()) as i32;
    if count == 0 {
      return;
    }

    self.add_str("FUNC");
    self.add_int(8 * count);
    // Imported functions.
    for f in imported {
      let (params, value) = {
        let func = &self.ast.funcs[f];
        (
          total_param_size(func) as u8,
          (func.return_spec != Spec::Void) as u8,
        )
      };
      self.add_byte(params);
      self.add_byte(0);
      self.add_byte(value);
      self.add_byte(0);
      self.add_int(0);
    }
    // Visible functions.
    for f in funcs {
      let (params, size, value, offset) = {
        let func = &self.ast.funcs[f];
        let params = total_param_size(func);
        (
          params as u8,
          (func.impl_().size - params) as u8,
          (func.return_spec != Spec::Void) as u8,
          func.impl_().obj_pos,
        )
      };
      self.add_byte(params);
      self.add_byte(size);
      self.add_byte(value);
      self.add_byte(0);
      self.add_int(offset);
    }
  }

  fn imported_used_funcs(&self) -> Vec<FuncIdx> {
    let mut found = vec![];
    for &lib in &self.ast.main_library().dynamic {
      for &f in &self.ast.libraries[lib].funcs {
        if let FuncKind::User(user) = &self.ast.funcs[f].kind {
          if user.usage != 0 {
            found.push(f);
          }
        }
      }
    }
    found
  }

  fn do_fnam(&mut self) {
    let mut names = vec![];
    for f in self.imported_used_funcs() {
      names.push(self.ast.funcs[f].name.clone());
    }
    for &f in &self.ast.main_library().funcs {
      let func = &self.ast.funcs[f];
      if !func.hidden {
        names.push(func.name.clone());
      }
    }
    if names.is_empty() {
      return;
    }

    let count = names.len() as i32;
    let size: i32 = names.iter().map(|name| name.len() as i32 + 1).sum();
    let mut offset = 4 + 4 * count;
    let padding = alignpad(offset + size, 4);

    self.add_str("FNAM");
    self.add_int(offset + size + padding);
    self.add_int(count);
    // Offsets.
    for name in &names {
      self.add_int(offset);
      offset += name.len() as i32 + 1;
    }
    // Names.
    for name in &names {
      let name = name.clone();
      self.add_str_z(&name);
    }
    for _ in 0..padding {
      self.add_byte(0);
    }
  }

  fn do_strl(&mut self) {
    let published = self.ast.strings.published().to_vec();
    if published.is_empty() {
      return;
    }

    let count = published.len() as i32;
    let size: i32 = published
      .iter()
      .map(|&string| self.ast.strings.get(string).len() as i32 + 1)
      .sum();
    // String count, padded with a zero on each side, then the offsets.
    let mut offset = 4 * 3 + 4 * count;
    let padding = alignpad(offset + size, 4);
    let offset_initial = offset;
    let encrypt = self.ast.main_library().encrypt_str;

    self.add_str(if encrypt { "STRE" } else { "STRL" });
    self.add_int(offset + size + padding);
    self.add_int(0);
    self.add_int(count);
    self.add_int(0);
    // Offsets.
    for &string in &published {
      self.add_int(offset);
      offset += self.ast.strings.get(string).len() as i32 + 1;
    }
    // Strings.
    offset = offset_initial;
    for &string in &published {
      let value = self.ast.strings.get(string).value.clone();
      if encrypt {
        let key = offset.wrapping_mul(STR_ENCRYPTION_CONSTANT);
        // Each character of the string is encoded, including the NUL
        // character.
        let bytes = value.as_bytes();
        for i in 0..=bytes.len() {
          let ch = if i < bytes.len() { bytes[i] } else { 0 };
          let ch = ((ch as i32) ^ key.wrapping_add((i / 2) as i32)) as u8;
          self.add_byte(ch);
        }
        offset += value.len() as i32 + 1;
      } else {
        self.add_str_z(&value);
      }
    }
    for _ in 0..padding {
      self.add_byte(0);
    }
  }

  fn do_mini(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    let mut first_var = None;
    let mut count = 0;
    for &v in &vars {
      if self.mini_var(v) {
        if first_var.is_none() {
          first_var = Some(v);
        }
        count += 1;
      }
    }
    let first_var = match first_var {
      Some(v) => v,
      None => return,
    };

    self.add_str("MINI");
    self.add_int(4 * (count + 1));
    let index = self.ast.vars[first_var].index;
    self.add_int(index);
    for v in vars {
      if self.mini_var(v) {
        let value = match self.ast.vars[v].value.first() {
          Some(value) => self.ast.expr_value(value.expr),
          None => unreachable!("initialized scalar without a value"),
        };
        self.add_int(value);
      }
    }
  }

  fn do_aray(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    let mut count = vars.iter().filter(|&&v| aray_var(&self.ast.vars[v])).count() as i32;
    count += self.shared_array.used as i32;
    if count == 0 {
      return;
    }

    self.add_str("ARAY");
    self.add_int(8 * count);
    // Arrays.
    for v in vars {
      let (matches, index, size) = {
        let var = &self.ast.vars[v];
        (aray_var(var), var.index, var.size)
      };
      if matches {
        self.add_int(index);
        self.add_int(size);
      }
    }
    // The dimension-metadata array. Hidden arrays otherwise stay out
    // of this chunk.
    if self.shared_array.used {
      let (index, size) = (self.shared_array.index, self.shared_array.size);
      self.add_int(index);
      self.add_int(size);
    }
  }

  fn do_aini(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    for v in vars {
      let var = &self.ast.vars[v];
      if var.storage == Storage::Map
        && (!var.dim.is_empty() || var.structure.is_some())
        && !var.value.is_empty()
      {
        self.do_aini_single(v);
      }
    }
    // Shared array.
    if self.shared_array.used {
      self.do_aini_sharedarray();
    }
  }

  fn do_aini_single(&mut self, v: VarIdx) {
    let values = self.ast.vars[v].value.clone();
    let mut count = 0;
    for value in &values {
      if value.string_initz {
        let string = self.string_initz_string(value.expr);
        count = value.index + self.ast.strings.get(string).len() as i32;
      } else if self.ast.expr_value(value.expr) != 0 {
        count = value.index + 1;
      }
    }
    if count == 0 {
      return;
    }

    self.add_str("AINI");
    self.add_int(4 + 4 * count);
    let index = self.ast.vars[v].index;
    self.add_int(index);

    let mut written = 0;
    for value in &values {
      let scalar = if value.string_initz {
        0
      } else {
        self.ast.expr_value(value.expr)
      };
      // Nullify uninitialized space.
      if written < value.index && (value.string_initz || scalar != 0) {
        self.add_int_zero(value.index - written);
        written = value.index;
      }
      if value.string_initz {
        let string = self.string_initz_string(value.expr);
        let text = self.ast.strings.get(string).value.clone();
        for ch in text.bytes() {
          self.add_int(ch as i32);
        }
        written += text.len() as i32;
      } else if scalar != 0 {
        self.add_int(scalar);
        written += 1;
      }
    }
  }

  fn string_initz_string(&self, expr: NodeIdx) -> StringIdx {
    match self.ast.node(self.ast.expr_root(expr)) {
      NodeKind::IndexedStringUsage(string) => *string,
      _ => unreachable!("string initializer without a string"),
    }
  }

  fn do_aini_sharedarray(&mut self) {
    self.add_str("AINI");
    self.add_int(4 + 4 + 4 * self.shared_array.diminfo_size);
    self.add_int(self.shared_array.index);
    // Null element.
    self.add_int(0);
    // Array dimension information.
    let objects = self.ast.main_library().objects.clone();
    for object in objects {
      match object {
        ObjectRef::Var(v) => {
          let dims = self.ast.vars[v].dim.clone();
          for dim in dims {
            self.add_int(dim.size * dim.element_size);
          }
        }
        ObjectRef::Structure(s) => {
          let dims: Vec<Dim> = self.ast.structures[s]
            .members
            .iter()
            .flat_map(|member| member.dim.iter().copied())
            .collect();
          for dim in dims {
            self.add_int(dim.size * dim.element_size);
          }
        }
      }
    }
  }

  fn do_load(&mut self) {
    let dynamic = self.ast.main_library().dynamic.clone();
    let mut size = 0;
    for &lib in &dynamic {
      let library = &self.ast.libraries[lib];
      if !library.compiletime {
        size += library.name.len() as i32 + 1;
      }
    }
    if size == 0 {
      return;
    }

    let padding = alignpad(size, 4);
    self.add_str("LOAD");
    self.add_int(size + padding);
    for lib in dynamic {
      let (skip, name) = {
        let library = &self.ast.libraries[lib];
        (library.compiletime, library.name.clone())
      };
      if !skip {
        self.add_str_z(&name);
      }
    }
    for _ in 0..padding {
      self.add_byte(0);
    }
  }

  // NOTE: This chunk might cause any subsequent chunk to be
  // misaligned.
  fn do_mimp(&mut self) {
    let dynamic = self.ast.main_library().dynamic.clone();
    let mut size = 0;
    for &lib in &dynamic {
      for &v in &self.ast.libraries[lib].vars {
        let var = &self.ast.vars[v];
        if mimp_var(var) {
          size += 4 + var.name.len() as i32 + 1;
        }
      }
    }
    if size == 0 {
      return;
    }

    self.add_str("MIMP");
    self.add_int(size);
    for lib in dynamic {
      let vars = self.ast.libraries[lib].vars.clone();
      for v in vars {
        let (matches, index, name) = {
          let var = &self.ast.vars[v];
          (mimp_var(var), var.index, var.name.clone())
        };
        if matches {
          self.add_int(index);
          self.add_str_z(&name);
        }
      }
    }
  }

  // NOTE: This chunk might cause any subsequent chunk to be
  // misaligned.
  fn do_aimp(&mut self) {
    let libraries: Vec<LibraryIdx> = (1..self.ast.libraries.len()).collect();
    let mut count = 0;
    let mut size = 4;
    for &lib in &libraries {
      for &v in &self.ast.libraries[lib].vars {
        let var = &self.ast.vars[v];
        if aimp_array(var) {
          size += 4 + 4 + var.name.len() as i32 + 1;
          count += 1;
        }
      }
    }
    if count == 0 {
      return;
    }

    self.add_str("AIMP");
    self.add_int(size);
    self.add_int(count);
    for lib in libraries {
      let vars = self.ast.libraries[lib].vars.clone();
      for v in vars {
        let (matches, index, total, name) = {
          let var = &self.ast.vars[v];
          (aimp_array(var), var.index, var.size, var.name.clone())
        };
        if matches {
          self.add_int(index);
          self.add_int(total);
          self.add_str_z(&name);
        }
      }
    }
  }

  /// The map variables this library exports, in the same order their
  /// indexes were allocated, so an importing library can pair each
  /// name with its slot.
  fn do_mexp(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    let mut names = vec![];
    for &v in &vars {
      let var = &self.ast.vars[v];
      if var.storage == Storage::Map && !var.hidden {
        names.push(var.name.clone());
      }
    }
    if names.is_empty() {
      return;
    }

    let count = names.len() as i32;
    let size: i32 = names.iter().map(|name| name.len() as i32 + 1).sum();
    // Number of variables; a zero is NOT padded on each side.
    let mut offset = 4 + 4 * count;
    let padding = alignpad(offset + size, 4);

    self.add_str("MEXP");
    self.add_int(offset + size + padding);
    self.add_int(count);
    // Offsets.
    // Arrays.
    for &v in &vars {
      if mexp_array(&self.ast.vars[v]) {
        let length = self.ast.vars[v].name.len() as i32 + 1;
        self.add_int(offset);
        offset += length;
      }
    }
    // Scalars, with-no-value.
    for &v in &vars {
      if self.mexp_zeroinit_scalar(v) {
        let length = self.ast.vars[v].name.len() as i32 + 1;
        self.add_int(offset);
        offset += length;
      }
    }
    // Scalars, with-value.
    for &v in &vars {
      if self.mexp_nonzeroinit_scalar(v) {
        let length = self.ast.vars[v].name.len() as i32 + 1;
        self.add_int(offset);
        offset += length;
      }
    }
    // Names.
    for &v in &vars {
      if mexp_array(&self.ast.vars[v]) {
        let name = self.ast.vars[v].name.clone();
        self.add_str_z(&name);
      }
    }
    for &v in &vars {
      if self.mexp_zeroinit_scalar(v) {
        let name = self.ast.vars[v].name.clone();
        self.add_str_z(&name);
      }
    }
    for &v in &vars {
      if self.mexp_nonzeroinit_scalar(v) {
        let name = self.ast.vars[v].name.clone();
        self.add_str_z(&name);
      }
    }
    for _ in 0..padding {
      self.add_byte(0);
    }
  }

  fn do_mstr(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    let count = vars.iter().filter(|&&v| mstr_var(&self.ast.vars[v])).count() as i32;
    if count == 0 {
      return;
    }

    self.add_str("MSTR");
    self.add_int(4 * count);
    for v in vars {
      let (matches, index) = {
        let var = &self.ast.vars[v];
        (mstr_var(var), var.index)
      };
      if matches {
        self.add_int(index);
      }
    }
  }

  fn do_astr(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    let count = vars.iter().filter(|&&v| astr_var(&self.ast.vars[v])).count() as i32;
    if count == 0 {
      return;
    }

    self.add_str("ASTR");
    self.add_int(4 * count);
    for v in vars {
      let (matches, index) = {
        let var = &self.ast.vars[v];
        (astr_var(var), var.index)
      };
      if matches {
        self.add_int(index);
      }
    }
  }

  fn do_atag(&mut self) {
    let vars = self.ast.main_library().vars.clone();
    for v in vars {
      if atag_var(&self.ast.vars[v]) {
        self.write_atagchunk(v);
      }
    }
  }

  /// Marks which elements of a structure's initializer hold string
  /// handles, so the engine can rebase them at load time.
  fn write_atagchunk(&mut self, v: VarIdx) {
    let values = self.ast.vars[v].value.clone();
    let mut count = 0;
    for value in &values {
      if self.ast.expr_has_str(value.expr) && !value.string_initz {
        count = value.index + 1;
      }
    }
    if count == 0 {
      return;
    }

    self.add_str("ATAG");
    // Version, array number, then one tag per element.
    self.add_int(1 + 4 + count);
    self.add_byte(0);
    let index = self.ast.vars[v].index;
    self.add_int(index);

    let mut written = 0;
    for value in &values {
      if written >= count {
        break;
      }
      if self.ast.expr_has_str(value.expr) && !value.string_initz {
        while written < value.index {
          self.add_byte(TAG_INTEGER);
          written += 1;
        }
        self.add_byte(TAG_STRING);
        written += 1;
      }
    }
  }

  fn do_sary(&mut self) {
    // Scripts.
    let scripts = self.ast.main_library().scripts.clone();
    for s in scripts {
      let (number, vars) = {
        let script = &self.ast.scripts[s];
        (script.assigned_number, script.vars.clone())
      };
      self.write_sary_chunk("SARY", number, &vars);
    }
    // Functions.
    let funcs = self.ast.main_library().funcs.clone();
    for f in funcs {
      let (index, vars) = {
        let user = self.ast.funcs[f].impl_();
        (user.index, user.vars.clone())
      };
      self.write_sary_chunk("FARY", index, &vars);
    }
  }

  fn write_sary_chunk(&mut self, chunk_name: &str, index: i32, vars: &[VarIdx]) {
    let count = vars
      .iter()
      .filter(|&&v| script_array(&self.ast.vars[v]))
      .count() as i32;
    if count == 0 {
      return;
    }

    self.add_str(chunk_name);
    // Function-index/script-number, then the list of array sizes.
    self.add_int(2 + 4 * count);
    self.add_short(index as i16);
    for &v in vars {
      let (matches, size) = {
        let var = &self.ast.vars[v];
        (script_array(var), var.size)
      };
      if matches {
        self.add_int(size);
      }
    }
  }
}
