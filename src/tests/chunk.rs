use super::*;
use crate::ast::*;
use crate::codegen::{Codegen, Options};
use crate::pcode::Pcode;

#[test]
fn empty_big_e_library_is_a_padded_header() {
  let mut ast = Ast::new("empty");

  let bytes = publish(&mut ast, "empty");

  assert_eq!(bytes.len(), 32);
  assert_eq!(&bytes[0..4], b"ACSE");
  assert_eq!(read_i32(&bytes, 4), 8);
  assert!(bytes[8..].iter().all(|&byte| byte == 0));
}

#[test]
fn compressed_delay_uses_the_byte_direct_form() {
  let mut ast = Ast::new("delay");
  ast.libraries[0].format = Format::LittleE;
  let delay = ded_func(&mut ast, "Delay", Pcode::Delay);
  let arg = const_expr(&mut ast, 35);
  let stmt = call_stmt(&mut ast, delay, vec![arg]);
  let body = block(&mut ast, vec![stmt]);
  add_script(&mut ast, 1, body);

  let bytes = publish(&mut ast, "delay");

  assert_eq!(&bytes[0..4], b"ACSe");
  assert_eq!(
    &bytes[8..11],
    &[Pcode::DelayDirectB as u8, 35, Pcode::Terminate as u8]
  );
  let sptr = find_chunk(&bytes, "SPTR").expect("SPTR missing");
  assert_eq!(sptr.len(), 12);
  assert_eq!(read_i16(sptr, 0), 1);
  assert_eq!(read_i16(sptr, 2), 0);
  assert_eq!(read_i32(sptr, 4), 8);
  assert_eq!(read_i32(sptr, 8), 0);
}

#[test]
fn importable_libraries_export_string_holding_scalars() {
  let mut ast = Ast::new("export");
  ast.libraries[0].importable = true;
  let (expr, string) = string_expr(&mut ast, "hi");
  let mut var = Var::new("s", Storage::Map);
  var.initial_has_str = true;
  var.value.push(Value {
    index: 0,
    expr,
    string_initz: false,
  });
  ast.vars.push(var);
  let v = ast.vars.len() - 1;
  ast.libraries[0].vars.push(v);
  ast.libraries[0].objects.push(ObjectRef::Var(v));

  let bytes = publish(&mut ast, "export");

  assert!(ast.strings.get(string).used);
  let strl = find_chunk(&bytes, "STRL").expect("STRL missing");
  assert_eq!(read_i32(strl, 4), 1);
  let text = read_i32(strl, 12) as usize;
  assert_eq!(&strl[text..text + 3], b"hi\0");
  let mstr = find_chunk(&bytes, "MSTR").expect("MSTR missing");
  assert_eq!(words(mstr), vec![ast.vars[v].index]);
  let mexp = find_chunk(&bytes, "MEXP").expect("MEXP missing");
  assert_eq!(read_i32(mexp, 0), 1);
  let name = read_i32(mexp, 4) as usize;
  assert_eq!(&mexp[name..name + 2], b"s\0");
}

#[test]
fn doubled_negation_folds_away() {
  let mut ast = Ast::new("fold");
  let five = lit(&mut ast, 5);
  let inner = ast.push_node(NodeKind::Unary(UnaryNode {
    op: UnaryOp::Minus,
    operand: five,
  }));
  let outer = ast.push_node(NodeKind::Unary(UnaryNode {
    op: UnaryOp::Minus,
    operand: inner,
  }));
  let expr = raw_expr(&mut ast, outer);
  let stmt = expr_stmt(&mut ast, expr);
  let body = block(&mut ast, vec![stmt]);
  add_script(&mut ast, 1, body);

  let bytes = publish(&mut ast, "fold");

  let chunk_pos = read_i32(&bytes, 4) as usize;
  let code = words(&bytes[8..chunk_pos]);
  let pushes = code
    .windows(2)
    .filter(|pair| pair[0] == Pcode::PushNumber as i32 && pair[1] == 5)
    .count();
  assert_eq!(pushes, 1);
  assert!(!code.contains(&(Pcode::UnaryMinus as i32)));
}

#[test]
fn named_scripts_publish_their_names() {
  let mut ast = Ast::new("named");
  let (name_expr, _) = string_expr(&mut ast, "doorkeeper");
  let body = block(&mut ast, vec![]);
  let s = add_script(&mut ast, -1, body);
  ast.scripts[s].named_script = true;
  ast.scripts[s].number = Some(name_expr);

  let bytes = publish(&mut ast, "named");

  let snam = find_chunk(&bytes, "SNAM").expect("SNAM missing");
  assert_eq!(read_i32(snam, 0), 1);
  assert_eq!(read_i32(snam, 4), 8);
  assert_eq!(&snam[8..19], b"doorkeeper\0");
  assert_eq!(chunk_len(&bytes, "SNAM") % 4, 0);
  let sptr = find_chunk(&bytes, "SPTR").expect("SPTR missing");
  assert_eq!(read_i16(sptr, 0), -1);
}

#[test]
fn script_flags_publish_when_present() {
  let mut ast = Ast::new("flags");
  let body = block(&mut ast, vec![]);
  let s = add_script(&mut ast, 2, body);
  ast.scripts[s].flags = ScriptFlags::NET;

  let bytes = publish(&mut ast, "flags");

  let sflg = find_chunk(&bytes, "SFLG").expect("SFLG missing");
  assert_eq!(read_i16(sflg, 0), 2);
  assert_eq!(read_i16(sflg, 2), 1);
}

#[test]
fn functions_publish_metadata_and_names() {
  let mut ast = Ast::new("funcs");
  let body = block(&mut ast, vec![]);
  let f = user_func(&mut ast, "helper", body);
  ast.funcs[f].return_spec = Spec::Int;
  ast.funcs[f].params.push(Param::new());
  ast.funcs[f].params.push(Param::new());
  ast.funcs[f].min_param = 2;
  ast.funcs[f].max_param = 2;

  let bytes = publish(&mut ast, "funcs");

  let func = find_chunk(&bytes, "FUNC").expect("FUNC missing");
  assert_eq!(func.len(), 8);
  assert_eq!(func[0], 2);
  assert_eq!(func[1], 0);
  assert_eq!(func[2], 1);
  assert_eq!(func[3], 0);
  assert_eq!(read_i32(func, 4), 8);
  let fnam = find_chunk(&bytes, "FNAM").expect("FNAM missing");
  assert_eq!(read_i32(fnam, 0), 1);
  let name = read_i32(fnam, 4) as usize;
  assert_eq!(&fnam[name..name + 7], b"helper\0");
  assert_eq!(chunk_len(&bytes, "FNAM") % 4, 0);
}

#[test]
fn encrypted_strings_decrypt_back() {
  let mut ast = Ast::new("stre");
  ast.libraries[0].encrypt_str = true;
  let (first, _) = string_expr(&mut ast, "hello");
  let (second, _) = string_expr(&mut ast, "world!");
  let first = expr_stmt(&mut ast, first);
  let second = expr_stmt(&mut ast, second);
  let body = block(&mut ast, vec![first, second]);
  add_script(&mut ast, 1, body);

  let bytes = publish(&mut ast, "stre");

  assert!(find_chunk(&bytes, "STRL").is_none());
  let stre = find_chunk(&bytes, "STRE").expect("STRE missing");
  assert_eq!(read_i32(stre, 4), 2);
  let expected: [&[u8]; 2] = [b"hello\0", b"world!\0"];
  for (i, text) in expected.iter().enumerate() {
    let offset = read_i32(stre, 12 + 4 * i);
    let key = offset.wrapping_mul(157_135);
    for (j, &ch) in text.iter().enumerate() {
      let enc = stre[offset as usize + j];
      let dec = ((enc as i32) ^ key.wrapping_add((j / 2) as i32)) as u8;
      assert_eq!(dec, ch, "string {} byte {}", i, j);
    }
  }
  assert_eq!(chunk_len(&bytes, "STRE") % 4, 0);
}

#[test]
fn imported_libraries_publish_their_bindings() {
  let mut ast = Ast::new("imports");
  ast.libraries.push(Library::new("mylib"));
  let lib = ast.libraries.len() - 1;
  ast.libraries[0].dynamic.push(lib);
  let mut scalar = Var::new("ext_counter", Storage::Map);
  scalar.used = true;
  ast.vars.push(scalar);
  let scalar = ast.vars.len() - 1;
  ast.libraries[lib].vars.push(scalar);
  let mut array = Var::new("ext_table", Storage::Map);
  array.used = true;
  array.dim.push(Dim {
    size: 8,
    element_size: 1,
  });
  array.size = 8;
  ast.vars.push(array);
  let array = ast.vars.len() - 1;
  ast.libraries[lib].vars.push(array);

  let bytes = publish(&mut ast, "imports");

  assert_eq!(ast.vars[scalar].index, 0);
  assert_eq!(ast.vars[array].index, 1);
  let load = find_chunk(&bytes, "LOAD").expect("LOAD missing");
  assert_eq!(&load[0..6], b"mylib\0");
  assert_eq!(load.len() % 4, 0);
  let mimp = find_chunk(&bytes, "MIMP").expect("MIMP missing");
  assert_eq!(read_i32(mimp, 0), 0);
  assert_eq!(&mimp[4..16], b"ext_counter\0");
  let aimp = find_chunk(&bytes, "AIMP").expect("AIMP missing");
  assert_eq!(read_i32(aimp, 0), 1);
  assert_eq!(read_i32(aimp, 4), 1);
  assert_eq!(read_i32(aimp, 8), 8);
  assert_eq!(&aimp[12..22], b"ext_table\0");
}

#[test]
fn array_initializers_zero_fill_gaps() {
  let mut ast = Ast::new("aini");
  let v = add_map_array(&mut ast, "table", 10);
  let seven = const_expr(&mut ast, 7);
  let nine = const_expr(&mut ast, 9);
  ast.vars[v].value.push(Value {
    index: 2,
    expr: seven,
    string_initz: false,
  });
  ast.vars[v].value.push(Value {
    index: 5,
    expr: nine,
    string_initz: false,
  });

  let bytes = publish(&mut ast, "aini");

  let aini = find_chunk(&bytes, "AINI").expect("AINI missing");
  assert_eq!(words(aini), vec![0, 0, 0, 7, 0, 0, 9]);
}

#[test]
fn local_arrays_publish_their_sizes() {
  let mut ast = Ast::new("sary");
  // A script with one local array.
  let mut buffer = Var::new("buffer", Storage::Local);
  buffer.dim.push(Dim {
    size: 16,
    element_size: 1,
  });
  buffer.size = 16;
  ast.vars.push(buffer);
  let buffer = ast.vars.len() - 1;
  let buffer_stmt = ast.push_node(NodeKind::Var(buffer));
  let body = block(&mut ast, vec![buffer_stmt]);
  let s = add_script(&mut ast, 9, body);
  ast.scripts[s].vars.push(buffer);
  // A function with one local array.
  let mut tmp = Var::new("tmp", Storage::Local);
  tmp.dim.push(Dim {
    size: 8,
    element_size: 1,
  });
  tmp.size = 8;
  ast.vars.push(tmp);
  let tmp = ast.vars.len() - 1;
  let tmp_stmt = ast.push_node(NodeKind::Var(tmp));
  let fbody = block(&mut ast, vec![tmp_stmt]);
  let f = user_func(&mut ast, "work", fbody);
  ast.funcs[f].impl_mut().vars.push(tmp);

  let bytes = publish(&mut ast, "sary");

  let sary = find_chunk(&bytes, "SARY").expect("SARY missing");
  assert_eq!(read_i16(sary, 0), 9);
  assert_eq!(read_i32(sary, 2), 16);
  let fary = find_chunk(&bytes, "FARY").expect("FARY missing");
  assert_eq!(read_i16(fary, 0), 0);
  assert_eq!(read_i32(fary, 2), 8);
}

#[test]
fn structure_initializers_publish_string_tags() {
  let mut ast = Ast::new("atag");
  ast.libraries[0].importable = true;
  ast.structures.push(Structure {
    name: "info".to_string(),
    members: vec![
      StructureMember {
        name: "id".to_string(),
        dim: vec![],
        offset: 0,
        size: 1,
      },
      StructureMember {
        name: "label".to_string(),
        dim: vec![],
        offset: 1,
        size: 1,
      },
    ],
    size: 2,
  });
  let id_value = const_expr(&mut ast, 3);
  let (label_value, _) = string_expr(&mut ast, "tag");
  let mut var = Var::new("meta", Storage::Map);
  var.structure = Some(0);
  var.primitive = false;
  var.size = 2;
  var.initial_has_str = true;
  var.value.push(Value {
    index: 0,
    expr: id_value,
    string_initz: false,
  });
  var.value.push(Value {
    index: 1,
    expr: label_value,
    string_initz: false,
  });
  ast.vars.push(var);
  let meta = ast.vars.len() - 1;
  ast.libraries[0].vars.push(meta);
  ast.libraries[0].objects.push(ObjectRef::Var(meta));
  // An array holding string handles publishes through its own table.
  let labels = add_map_array(&mut ast, "labels", 4);
  ast.vars[labels].initial_has_str = true;

  let bytes = publish(&mut ast, "atag");

  let atag = find_chunk(&bytes, "ATAG").expect("ATAG missing");
  assert_eq!(atag.len(), 7);
  assert_eq!(atag[0], 0);
  assert_eq!(read_i32(atag, 1), ast.vars[meta].index);
  assert_eq!(&atag[5..7], &[0, 1]);
  let astr = find_chunk(&bytes, "ASTR").expect("ASTR missing");
  assert_eq!(words(astr), vec![ast.vars[labels].index]);
}

#[test]
fn the_header_points_at_the_first_chunk() {
  let mut ast = Ast::new("header");
  let delay = ded_func(&mut ast, "Delay", Pcode::Delay);
  let arg = const_expr(&mut ast, 8);
  let stmt = call_stmt(&mut ast, delay, vec![arg]);
  let body = block(&mut ast, vec![stmt]);
  add_script(&mut ast, 1, body);

  let bytes = publish(&mut ast, "header");

  assert_eq!(&bytes[0..4], b"ACSE");
  let chunk_pos = read_i32(&bytes, 4) as usize;
  assert_eq!(&bytes[chunk_pos..chunk_pos + 4], b"SPTR");
  // Uncompressed: direct delay and terminate, three words of code.
  assert_eq!(chunk_pos, 8 + 12);
}

#[test]
fn unknown_files_are_not_overwritten() {
  let path = object_path("guard");
  std::fs::write(&path, b"not an object").expect("seed file");
  let mut ast = Ast::new("guard");
  let options = Options {
    object_file: path.clone(),
  };

  let reports = Codegen::publish(&mut ast, &options).unwrap_err();

  assert!(reports[0].to_string().contains("unknown file"));
  assert_eq!(std::fs::read(&path).expect("seed kept"), b"not an object");
  let _ = std::fs::remove_file(&path);
}

#[test]
fn existing_objects_are_replaced() {
  let path = object_path("replace");
  std::fs::write(&path, b"ACSE\x20\x00\x00\x00stale").expect("seed file");
  let mut ast = Ast::new("replace");
  let options = Options {
    object_file: path.clone(),
  };

  Codegen::publish(&mut ast, &options).expect("publication failed");

  let bytes = std::fs::read(&path).expect("object file missing");
  assert_eq!(bytes.len(), 32);
  assert_eq!(&bytes[0..4], b"ACSE");
  let _ = std::fs::remove_file(&path);
}
