use num_traits::FromPrimitive;

use super::*;
use crate::pcode::Pcode;

#[test]
fn binary_folding_matches_plain_push() {
  let cases = [
    (Pcode::Add, 2_000_000, 345, 2_000_345),
    (Pcode::Add, i32::MAX, 1, i32::MIN),
    (Pcode::Subtract, 3, 10, -7),
    (Pcode::Multiply, 70_000, 70_000, 70_000i32.wrapping_mul(70_000)),
    (Pcode::Divide, -7, 2, -3),
    (Pcode::Divide, 9, 0, 0),
    (Pcode::Modulus, -7, 2, -1),
    (Pcode::Modulus, 4, 0, 0),
    (Pcode::OrLogical, 0, 5, 1),
    (Pcode::AndLogical, 3, 0, 0),
    (Pcode::OrBitwise, 0b1010, 0b0101, 0b1111),
    (Pcode::EorBitwise, 0b1100, 0b1010, 0b0110),
    (Pcode::AndBitwise, 0b1100, 0b1010, 0b1000),
    (Pcode::Eq, 4, 4, 1),
    (Pcode::Ne, 4, 4, 0),
    (Pcode::Lt, 3, 4, 1),
    (Pcode::Le, 4, 4, 1),
    (Pcode::Gt, 4, 4, 0),
    (Pcode::Ge, 5, 4, 1),
    (Pcode::Lshift, 1, 33, 2),
    (Pcode::Rshift, -8, 1, -4),
  ];

  for (code, l, r, expected) in cases {
    let folded = with_emitter(false, |c| {
      c.add_opc(Pcode::PushNumber);
      c.add_arg(l);
      c.add_opc(Pcode::PushNumber);
      c.add_arg(r);
      c.add_opc(code);
    });
    let plain = with_emitter(false, |c| {
      c.add_opc(Pcode::PushNumber);
      c.add_arg(expected);
    });
    assert_eq!(folded, plain, "folding {:?} over {} and {}", code, l, r);
  }
}

#[test]
fn unary_folding_collapses_nested_negation() {
  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(5);
    c.add_opc(Pcode::UnaryMinus);
    c.add_opc(Pcode::UnaryMinus);
  });
  assert_eq!(words(&bytes), vec![Pcode::PushNumber as i32, 5]);
}

#[test]
fn unary_folding_handles_logical_and_bitwise_negation() {
  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(0);
    c.add_opc(Pcode::NegateLogical);
  });
  assert_eq!(words(&bytes), vec![Pcode::PushNumber as i32, 1]);

  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(6);
    c.add_opc(Pcode::NegateBinary);
  });
  assert_eq!(words(&bytes), vec![Pcode::PushNumber as i32, !6]);
}

#[test]
fn lspec_direct_forms_match_hand_assembly() {
  // Uncompressed: the direct form absorbs both immediates, special
  // number first.
  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(1);
    c.add_opc(Pcode::PushNumber);
    c.add_arg(2);
    c.add_opc(Pcode::Lspec2);
    c.add_arg(70);
  });
  assert_eq!(words(&bytes), vec![Pcode::Lspec2Direct as i32, 70, 1, 2]);

  // Compressed with byte-sized immediates: the all-byte form.
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(1);
    c.add_opc(Pcode::PushNumber);
    c.add_arg(2);
    c.add_opc(Pcode::Lspec2);
    c.add_arg(70);
  });
  assert_eq!(bytes, vec![Pcode::Lspec2DirectB as u8, 70, 1, 2]);

  // Compressed with a wide immediate: byte opcode, byte special
  // number, full-width arguments.
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(300);
    c.add_opc(Pcode::PushNumber);
    c.add_arg(2);
    c.add_opc(Pcode::Lspec2);
    c.add_arg(70);
  });
  let mut expected = vec![Pcode::Lspec2Direct as u8, 70];
  expected.extend_from_slice(&300i32.to_le_bytes());
  expected.extend_from_slice(&2i32.to_le_bytes());
  assert_eq!(bytes, expected);
}

#[test]
fn direct_rewrite_flushes_excess_immediates() {
  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(9);
    c.add_opc(Pcode::PushNumber);
    c.add_arg(35);
    c.add_opc(Pcode::Delay);
  });
  assert_eq!(
    words(&bytes),
    vec![
      Pcode::PushNumber as i32,
      9,
      Pcode::DelayDirect as i32,
      35,
    ]
  );
}

#[test]
fn queued_pushes_pack_into_byte_groups() {
  let bytes = with_emitter(false, |c| {
    for value in [1, 2, 3, 4, 250, 70_000] {
      c.add_opc(Pcode::PushNumber);
      c.add_arg(value);
    }
  });
  let mut expected = (Pcode::Push4Bytes as i32).to_le_bytes().to_vec();
  expected.extend_from_slice(&[1, 2, 3, 4]);
  expected.extend_from_slice(&(Pcode::PushNumber as i32).to_le_bytes());
  expected.extend_from_slice(&250i32.to_le_bytes());
  expected.extend_from_slice(&(Pcode::PushNumber as i32).to_le_bytes());
  expected.extend_from_slice(&70_000i32.to_le_bytes());
  assert_eq!(bytes, expected);
}

#[test]
fn compressed_pushes_use_the_byte_push_forms() {
  let bytes = with_emitter(true, |c| {
    for value in [5, 6, 7] {
      c.add_opc(Pcode::PushNumber);
      c.add_arg(value);
    }
  });
  assert_eq!(bytes, vec![Pcode::Push3Bytes as u8, 5, 6, 7]);

  let bytes = with_emitter(true, |c| {
    for value in 1..=6 {
      c.add_opc(Pcode::PushNumber);
      c.add_arg(value);
    }
  });
  assert_eq!(bytes, vec![Pcode::PushBytes as u8, 6, 1, 2, 3, 4, 5, 6]);
}

#[test]
fn compressed_wide_opcodes_use_the_escape_byte() {
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::DivGlobalArray);
    c.add_arg(3);
  });
  assert_eq!(
    bytes,
    vec![240, (Pcode::DivGlobalArray as i32 - 240) as u8, 3]
  );
}

#[test]
fn callfunc_arguments_use_mixed_widths() {
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::CallFunc);
    c.add_arg(2);
    c.add_arg(300);
  });
  let mut expected = vec![240, (Pcode::CallFunc as i32 - 240) as u8, 2];
  expected.extend_from_slice(&300i16.to_le_bytes());
  assert_eq!(bytes, expected);

  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::CallFunc);
    c.add_arg(2);
    c.add_arg(300);
  });
  assert_eq!(words(&bytes), vec![Pcode::CallFunc as i32, 2, 300]);
}

#[test]
fn sorted_case_tables_align_their_arguments() {
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::Drop);
    c.add_opc(Pcode::CaseGotoSorted);
    c.add_arg(1);
    c.add_arg(2);
    c.add_arg(40);
  });
  assert_eq!(bytes[0], Pcode::Drop as u8);
  assert_eq!(
    &bytes[1..3],
    &[240, (Pcode::CaseGotoSorted as i32 - 240) as u8]
  );
  // One byte of zero padding brings the arguments to a word boundary.
  assert_eq!(bytes[3], 0);
  assert_eq!(read_i32(&bytes, 4), 1);
  assert_eq!(read_i32(&bytes, 8), 2);
  assert_eq!(read_i32(&bytes, 12), 40);
}

#[test]
fn variable_arguments_shrink_when_compressed() {
  let bytes = with_emitter(true, |c| {
    c.add_opc(Pcode::PushMapVar);
    c.add_arg(3);
  });
  assert_eq!(bytes, vec![Pcode::PushMapVar as u8, 3]);

  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::PushMapVar);
    c.add_arg(3);
  });
  assert_eq!(words(&bytes), vec![Pcode::PushMapVar as i32, 3]);
}

#[test]
fn tell_reports_final_positions() {
  with_emitter(false, |c| {
    c.add_opc(Pcode::PushNumber);
    c.add_arg(7);
    // The queued push flushes before the position is reported.
    assert_eq!(c.tell(), 8);
  });
}

#[test]
fn jump_patching_rewrites_in_place() {
  let bytes = with_emitter(false, |c| {
    let pos = c.tell();
    c.add_opc(Pcode::Goto);
    c.add_arg(0);
    c.add_opc(Pcode::Drop);
    let dest = c.tell();
    c.seek(pos);
    c.add_opc(Pcode::Goto);
    c.add_arg(dest);
    c.seek_end();
  });
  assert_eq!(
    words(&bytes),
    vec![Pcode::Goto as i32, 12, Pcode::Drop as i32]
  );
}

#[test]
fn buffer_splits_writes_across_pages() {
  let bytes = with_emitter(false, |c| {
    c.add_int_zero(20_000);
    assert_eq!(c.tell(), 80_000);
    c.seek(65_534);
    c.add_int(0x1122_3344);
    c.seek_end();
    assert_eq!(c.tell(), 80_000);
  });
  assert_eq!(bytes.len(), 80_000);
  assert_eq!(read_i32(&bytes, 65_534), 0x1122_3344);
  assert_eq!(bytes[65_538], 0);
}

#[test]
fn instruction_words_decode_back() {
  let bytes = with_emitter(false, |c| {
    c.add_opc(Pcode::Restart);
  });
  assert_eq!(Pcode::from_i32(read_i32(&bytes, 0)), Some(Pcode::Restart));
}
