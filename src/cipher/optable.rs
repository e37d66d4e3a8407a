use regex::Regex;

use crate::cipher::interpreter::{AlphabetVariant, OpKind};

const ALPHABET_UPPER_FIRST_LITERAL: &str =
  "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
const ALPHABET_LOWER_FIRST_LITERAL: &str =
  "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_";

struct OpPattern {
  regex: Regex,
  op: OpKind,
}

/// Ordered structural patterns that classify an extracted function body as
/// one of the known operations. The delivered scripts are adversarial and
/// reshuffle cosmetics between versions, so these are shape probes, not a
/// grammar; first match wins and order is significant (a rotation body also
/// contains `reverse()`, the substitution body also contains `push(`).
///
/// The table is versioned data. When a new script generation appears, add a
/// new builder and keep the old one for replaying cached scripts.
pub struct OpTable {
  version: u32,
  patterns: Vec<OpPattern>,
}

impl OpTable {
  pub fn v1() -> Result<Self, regex::Error> {
    let patterns = vec![
      // Substitution cipher: the only body walking two sequences with
      // indexOf. Variant is resolved separately from the alphabet shape.
      OpPattern {
        regex: Regex::new(r"forEach[\s\S]*indexOf")?,
        op: OpKind::AlphabetCipher(AlphabetVariant::UpperFirst),
      },
      // Rotation via negative-splice prefix move.
      OpPattern {
        regex: Regex::new(r"splice\(\s*-")?,
        op: OpKind::RotateRight,
      },
      // Rotation loops: end-to-front is a right rotation, front-to-end left.
      OpPattern {
        regex: Regex::new(r"unshift\(\s*\w+\s*\.\s*pop\(\s*\)\s*\)")?,
        op: OpKind::RotateRight,
      },
      OpPattern {
        regex: Regex::new(r"push\(\s*\w+\s*\.\s*shift\(\s*\)\s*\)")?,
        op: OpKind::RotateLeft,
      },
      // Element pulled out with splice and put back at the front.
      OpPattern {
        regex: Regex::new(r"(?:unshift|splice\(\s*0\s*,\s*0\s*,)\s*\(?\s*\w+\.splice\(")?,
        op: OpKind::SpliceReinsert,
      },
      // Swap, either through a temporary or through nested splices.
      OpPattern {
        regex: Regex::new(r"var\s+\w+\s*=\s*\w+\[\s*0\s*\]")?,
        op: OpKind::Swap,
      },
      OpPattern {
        regex: Regex::new(r"splice\(\s*0\s*,\s*1\s*,\s*\w+\.splice\(")?,
        op: OpKind::Swap,
      },
      OpPattern {
        regex: Regex::new(r"\[\s*0\s*\]\s*=\s*\w+\[")?,
        op: OpKind::Swap,
      },
      // Plain prefix removal.
      OpPattern {
        regex: Regex::new(r"splice\(\s*0\s*,")?,
        op: OpKind::Splice,
      },
      OpPattern {
        regex: Regex::new(r"reverse\(\s*\)")?,
        op: OpKind::Reverse,
      },
      // Bare append; everything push-shaped above matched already.
      OpPattern {
        regex: Regex::new(r"push\(")?,
        op: OpKind::Append,
      },
    ];
    Ok(Self {
      version: 1,
      patterns,
    })
  }

  pub fn version(&self) -> u32 {
    self.version
  }

  /// Classifies one function body. `None` means the shape is not in this
  /// table version, which callers treat as a compile failure for the whole
  /// program, never a guess.
  pub fn classify(&self, body: &str) -> Option<OpKind> {
    for pattern in &self.patterns {
      if pattern.regex.is_match(body) {
        return Some(self.refine(pattern.op, body));
      }
    }
    None
  }

  /// Substitution bodies carry their alphabet either as a literal or as a
  /// char-code generator loop; both reveal which ordering is in play.
  fn refine(&self, op: OpKind, body: &str) -> OpKind {
    if !matches!(op, OpKind::AlphabetCipher(_)) {
      return op;
    }
    if body.contains(ALPHABET_LOWER_FIRST_LITERAL) {
      return OpKind::AlphabetCipher(AlphabetVariant::LowerFirst);
    }
    if body.contains(ALPHABET_UPPER_FIRST_LITERAL) {
      return OpKind::AlphabetCipher(AlphabetVariant::UpperFirst);
    }
    // Generator form: the jump taken after the digit block tells the
    // orderings apart (into uppercase vs into lowercase codes).
    if body.contains("case 58:") && body.contains("=96") {
      return OpKind::AlphabetCipher(AlphabetVariant::LowerFirst);
    }
    OpKind::AlphabetCipher(AlphabetVariant::UpperFirst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn table() -> OpTable {
    OpTable::v1().unwrap()
  }

  #[test]
  fn classifies_the_plain_array_ops() {
    let t = table();
    assert_eq!(t.classify("d.reverse()"), Some(OpKind::Reverse));
    assert_eq!(t.classify("d.push(e)"), Some(OpKind::Append));
    assert_eq!(t.classify("d.splice(0,e)"), Some(OpKind::Splice));
    assert_eq!(
      t.classify("var f=d[0];d[0]=d[e%d.length];d[e%d.length]=f"),
      Some(OpKind::Swap)
    );
  }

  #[test]
  fn rotation_bodies_do_not_fall_through_to_reverse() {
    let t = table();
    assert_eq!(
      t.classify("e=(e%d.length+d.length)%d.length;d.splice(-e).reverse().forEach(function(f){d.unshift(f)})"),
      Some(OpKind::RotateRight)
    );
    assert_eq!(
      t.classify("for(e=(e%d.length+d.length)%d.length;e--;)d.unshift(d.pop())"),
      Some(OpKind::RotateRight)
    );
    assert_eq!(
      t.classify("for(e=(e%d.length+d.length)%d.length;e--;)d.push(d.shift())"),
      Some(OpKind::RotateLeft)
    );
  }

  #[test]
  fn nested_splice_swap_is_a_swap() {
    let t = table();
    assert_eq!(
      t.classify("e=(e%d.length+d.length)%d.length;d.splice(0,1,d.splice(e,1,d[0])[0])"),
      Some(OpKind::Swap)
    );
  }

  #[test]
  fn splice_unshift_is_a_reinsert() {
    let t = table();
    assert_eq!(
      t.classify("e=(e%d.length+d.length)%d.length;d.unshift(d.splice(e,1)[0])"),
      Some(OpKind::SpliceReinsert)
    );
  }

  #[test]
  fn cipher_variant_resolves_from_alphabet_literal() {
    let t = table();
    let upper = format!(
      "d.forEach(function(l,m,n){{this.push(n[m]=\"{}\"[0])}},e.split(\"\")); n.indexOf(l)",
      ALPHABET_UPPER_FIRST_LITERAL
    );
    assert_eq!(
      t.classify(&upper),
      Some(OpKind::AlphabetCipher(AlphabetVariant::UpperFirst))
    );
    let lower = upper.replace(ALPHABET_UPPER_FIRST_LITERAL, ALPHABET_LOWER_FIRST_LITERAL);
    assert_eq!(
      t.classify(&lower),
      Some(OpKind::AlphabetCipher(AlphabetVariant::LowerFirst))
    );
  }

  #[test]
  fn unknown_shape_is_not_guessed() {
    let t = table();
    assert_eq!(t.classify("d.sort()"), None);
    assert_eq!(t.classify(""), None);
  }
}
