use thiserror::Error;

/// 64-symbol alphabet used by the positional substitution cipher, in the two
/// orderings seen in delivered scripts.
const ALPHABET_UPPER_FIRST: &[u8; 64] =
  b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const ALPHABET_LOWER_FIRST: &[u8; 64] =
  b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlphabetVariant {
  UpperFirst,
  LowerFirst,
}

impl AlphabetVariant {
  fn table(self) -> &'static [u8; 64] {
    match self {
      Self::UpperFirst => ALPHABET_UPPER_FIRST,
      Self::LowerFirst => ALPHABET_LOWER_FIRST,
    }
  }
}

/// The operation vocabulary recovered from delivered scripts. Offsets are
/// modulo-normalized against the buffer length before use, so any integer
/// operand is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
  Reverse,
  /// Append the operand's rendering to the buffer.
  Append,
  RotateLeft,
  RotateRight,
  /// Exchange the first element with the one at the normalized offset.
  Swap,
  /// Drop the first `n` elements.
  Splice,
  /// Move the element at the normalized offset to the front.
  SpliceReinsert,
  /// Positional substitution with a self-extending key over a fixed alphabet.
  AlphabetCipher(AlphabetVariant),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
  Int(i64),
  Str(String),
  /// Marks the slot where the obfuscated input value itself sits.
  SelfRef,
  Op(OpKind),
  Null,
}

impl Primitive {
  fn describe(&self) -> &'static str {
    match self {
      Self::Int(_) => "int",
      Self::Str(_) => "string",
      Self::SelfRef => "self-reference",
      Self::Op(_) => "operation",
      Self::Null => "null",
    }
  }
}

/// One call in the recovered program: which primitive is the operation, and
/// which primitives are its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
  pub op: usize,
  pub args: Vec<usize>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpretError {
  #[error("step {step} references primitive {index}, but only {len} exist")]
  PrimitiveOutOfRange { step: usize, index: usize, len: usize },
  #[error("step {step} calls a {found} primitive, not an operation")]
  NotAnOperation { step: usize, found: &'static str },
  #[error("step {step} ({op:?}) received a {found} operand")]
  BadOperand {
    step: usize,
    op: OpKind,
    found: &'static str,
  },
  #[error("step {step} ({op:?}) is missing its operand")]
  MissingOperand { step: usize, op: OpKind },
}

/// An obfuscation program recovered from a delivered script. Immutable once
/// built; `run` never mutates shared state, so one compiled program is safe
/// to replay from any number of concurrent resolutions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
  pub primitives: Vec<Primitive>,
  pub steps: Vec<Step>,
}

impl Program {
  /// Structural check performed at compile time so interpretation can only
  /// fail on genuinely adversarial operand payloads.
  pub fn validate(&self) -> Result<(), InterpretError> {
    for (idx, step) in self.steps.iter().enumerate() {
      match self.primitives.get(step.op) {
        Some(Primitive::Op(_)) => {}
        Some(other) => {
          return Err(InterpretError::NotAnOperation {
            step: idx,
            found: other.describe(),
          });
        }
        None => {
          return Err(InterpretError::PrimitiveOutOfRange {
            step: idx,
            index: step.op,
            len: self.primitives.len(),
          });
        }
      }
      for &arg in &step.args {
        if arg >= self.primitives.len() {
          return Err(InterpretError::PrimitiveOutOfRange {
            step: idx,
            index: arg,
            len: self.primitives.len(),
          });
        }
      }
    }
    Ok(())
  }

  /// Replays the program over a buffer seeded with `input`.
  pub fn run(&self, input: &str) -> Result<String, InterpretError> {
    let mut buffer: Vec<char> = input.chars().collect();
    for (idx, step) in self.steps.iter().enumerate() {
      let op = match self.primitives.get(step.op) {
        Some(Primitive::Op(op)) => *op,
        Some(other) => {
          return Err(InterpretError::NotAnOperation {
            step: idx,
            found: other.describe(),
          });
        }
        None => {
          return Err(InterpretError::PrimitiveOutOfRange {
            step: idx,
            index: step.op,
            len: self.primitives.len(),
          });
        }
      };
      self.execute(op, step, idx, &mut buffer)?;
    }
    Ok(buffer.into_iter().collect())
  }

  fn operand(&self, step: &Step, idx: usize, op: OpKind) -> Result<&Primitive, InterpretError> {
    let arg = step
      .args
      .first()
      .ok_or(InterpretError::MissingOperand { step: idx, op })?;
    self.primitives
      .get(*arg)
      .ok_or(InterpretError::PrimitiveOutOfRange {
        step: idx,
        index: *arg,
        len: self.primitives.len(),
      })
  }

  fn int_operand(&self, step: &Step, idx: usize, op: OpKind) -> Result<i64, InterpretError> {
    match self.operand(step, idx, op)? {
      Primitive::Int(n) => Ok(*n),
      other => Err(InterpretError::BadOperand {
        step: idx,
        op,
        found: other.describe(),
      }),
    }
  }

  fn execute(
    &self,
    op: OpKind,
    step: &Step,
    idx: usize,
    buffer: &mut Vec<char>,
  ) -> Result<(), InterpretError> {
    match op {
      OpKind::Reverse => buffer.reverse(),
      OpKind::Append => match self.operand(step, idx, op)? {
        Primitive::Int(n) => buffer.extend(n.to_string().chars()),
        Primitive::Str(s) => buffer.extend(s.chars()),
        Primitive::SelfRef => {
          let copy = buffer.clone();
          buffer.extend(copy);
        }
        other => {
          return Err(InterpretError::BadOperand {
            step: idx,
            op,
            found: other.describe(),
          });
        }
      },
      OpKind::RotateLeft => {
        let offset = self.int_operand(step, idx, op)?;
        if let Some(k) = normalize_offset(offset, buffer.len()) {
          buffer.rotate_left(k);
        }
      }
      OpKind::RotateRight => {
        let offset = self.int_operand(step, idx, op)?;
        if let Some(k) = normalize_offset(offset, buffer.len()) {
          buffer.rotate_right(k);
        }
      }
      OpKind::Swap => {
        let offset = self.int_operand(step, idx, op)?;
        if let Some(k) = normalize_offset(offset, buffer.len()) {
          buffer.swap(0, k);
        }
      }
      OpKind::Splice => {
        let count = self.int_operand(step, idx, op)?.max(0) as usize;
        buffer.drain(..count.min(buffer.len()));
      }
      OpKind::SpliceReinsert => {
        let offset = self.int_operand(step, idx, op)?;
        if let Some(k) = normalize_offset(offset, buffer.len()) {
          let moved = buffer.remove(k);
          buffer.insert(0, moved);
        }
      }
      OpKind::AlphabetCipher(variant) => {
        let key_seed: Vec<char> = match self.operand(step, idx, op)? {
          Primitive::Str(s) => s.chars().collect(),
          Primitive::SelfRef => buffer.clone(),
          other => {
            return Err(InterpretError::BadOperand {
              step: idx,
              op,
              found: other.describe(),
            });
          }
        };
        alphabet_cipher(buffer, key_seed, variant.table());
      }
    }
    Ok(())
  }
}

/// Maps any integer offset into `0..len`, the way the delivered programs
/// normalize with a double modulo. `None` when the buffer is empty, which
/// turns indexed ops into no-ops.
fn normalize_offset(offset: i64, len: usize) -> Option<usize> {
  if len == 0 {
    return None;
  }
  Some(offset.rem_euclid(len as i64) as usize)
}

fn index_of(table: &[u8; 64], c: char) -> Option<usize> {
  if c.is_ascii() {
    table.iter().position(|&b| b == c as u8)
  } else {
    None
  }
}

/// Substitution over the fixed alphabet. Each output symbol is appended to
/// the key, so the key stretches to cover any input length. Symbols outside
/// the alphabet pass through untouched and keep the key in sync.
fn alphabet_cipher(buffer: &mut [char], mut key: Vec<char>, table: &'static [u8; 64]) {
  for m in 0..buffer.len() {
    let current = buffer[m];
    let substituted = match (index_of(table, current), key.get(m).and_then(|&k| index_of(table, k))) {
      (Some(ci), Some(ki)) => table[(ci + 64 - ki) % 64] as char,
      _ => current,
    };
    buffer[m] = substituted;
    key.push(substituted);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn one_op(op: OpKind, operand: Option<Primitive>) -> Program {
    let mut primitives = vec![Primitive::SelfRef, Primitive::Op(op)];
    let mut args = Vec::new();
    if let Some(p) = operand {
      primitives.push(p);
      args.push(2);
    }
    Program {
      primitives,
      steps: vec![Step { op: 1, args }],
    }
  }

  #[test]
  fn reverse_flips_the_buffer() {
    let p = one_op(OpKind::Reverse, None);
    assert_eq!(p.run("abc").unwrap(), "cba");
  }

  #[test]
  fn append_renders_ints_strings_and_self() {
    let p = one_op(OpKind::Append, Some(Primitive::Int(42)));
    assert_eq!(p.run("ab").unwrap(), "ab42");
    let p = one_op(OpKind::Append, Some(Primitive::Str("xy".into())));
    assert_eq!(p.run("ab").unwrap(), "abxy");
    let p = one_op(OpKind::Append, Some(Primitive::SelfRef));
    assert_eq!(p.run("ab").unwrap(), "abab");
  }

  #[test]
  fn rotations_normalize_any_offset() {
    let p = one_op(OpKind::RotateLeft, Some(Primitive::Int(2)));
    assert_eq!(p.run("abcde").unwrap(), "cdeab");
    let p = one_op(OpKind::RotateRight, Some(Primitive::Int(2)));
    assert_eq!(p.run("abcde").unwrap(), "deabc");
    // 7 ≡ 2 (mod 5), -3 ≡ 2 (mod 5)
    let p = one_op(OpKind::RotateLeft, Some(Primitive::Int(7)));
    assert_eq!(p.run("abcde").unwrap(), "cdeab");
    let p = one_op(OpKind::RotateLeft, Some(Primitive::Int(-3)));
    assert_eq!(p.run("abcde").unwrap(), "cdeab");
  }

  #[test]
  fn swap_exchanges_front_with_offset() {
    let p = one_op(OpKind::Swap, Some(Primitive::Int(3)));
    assert_eq!(p.run("hello").unwrap(), "lelho");
    let p = one_op(OpKind::Swap, Some(Primitive::Int(8)));
    assert_eq!(p.run("hello").unwrap(), "lelho");
  }

  #[test]
  fn splice_drops_prefix() {
    let p = one_op(OpKind::Splice, Some(Primitive::Int(2)));
    assert_eq!(p.run("abcde").unwrap(), "cde");
    let p = one_op(OpKind::Splice, Some(Primitive::Int(99)));
    assert_eq!(p.run("abcde").unwrap(), "");
  }

  #[test]
  fn splice_reinsert_moves_element_to_front() {
    let p = one_op(OpKind::SpliceReinsert, Some(Primitive::Int(3)));
    assert_eq!(p.run("abcde").unwrap(), "dabce");
  }

  #[test]
  fn alphabet_cipher_with_self_extending_key() {
    let p = one_op(
      OpKind::AlphabetCipher(AlphabetVariant::UpperFirst),
      Some(Primitive::Str("ab".into())),
    );
    // 'a'-'a' -> 'A'; 'b'-'b' -> 'A'; then the extended key supplies 'A',
    // so 'c'-'A' -> 'c'.
    assert_eq!(p.run("abc").unwrap(), "AAc");
  }

  #[test]
  fn non_alphabet_symbols_pass_through() {
    let p = one_op(
      OpKind::AlphabetCipher(AlphabetVariant::UpperFirst),
      Some(Primitive::Str("ab".into())),
    );
    assert_eq!(p.run("a=c").unwrap(), "A=c");
  }

  #[test]
  fn indexed_ops_on_empty_buffer_are_noops() {
    for op in [OpKind::RotateLeft, OpKind::RotateRight, OpKind::Swap, OpKind::SpliceReinsert] {
      let p = one_op(op, Some(Primitive::Int(3)));
      assert_eq!(p.run("").unwrap(), "");
    }
  }

  #[test]
  fn run_is_pure() {
    let p = Program {
      primitives: vec![
        Primitive::SelfRef,
        Primitive::Op(OpKind::Reverse),
        Primitive::Op(OpKind::Swap),
        Primitive::Int(2),
        Primitive::Op(OpKind::Splice),
        Primitive::Int(1),
      ],
      steps: vec![
        Step { op: 1, args: vec![] },
        Step { op: 2, args: vec![3] },
        Step { op: 4, args: vec![5] },
      ],
    };
    let first = p.run("0123456789").unwrap();
    let second = p.run("0123456789").unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn validate_rejects_non_op_targets_and_bad_indices() {
    let p = Program {
      primitives: vec![Primitive::Int(1)],
      steps: vec![Step { op: 0, args: vec![] }],
    };
    assert!(matches!(
      p.validate(),
      Err(InterpretError::NotAnOperation { .. })
    ));

    let p = Program {
      primitives: vec![Primitive::Op(OpKind::Reverse)],
      steps: vec![Step { op: 5, args: vec![] }],
    };
    assert!(matches!(
      p.validate(),
      Err(InterpretError::PrimitiveOutOfRange { .. })
    ));
  }

  #[test]
  fn bad_operand_type_errors_instead_of_panicking() {
    let p = Program {
      primitives: vec![
        Primitive::Op(OpKind::RotateLeft),
        Primitive::Str("nope".into()),
      ],
      steps: vec![Step { op: 0, args: vec![1] }],
    };
    assert!(matches!(
      p.run("abc"),
      Err(InterpretError::BadOperand { .. })
    ));
  }
}
