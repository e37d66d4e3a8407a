use regex::Regex;
use thiserror::Error;

use crate::cipher::interpreter::{InterpretError, OpKind, Primitive, Program, Step};
use crate::cipher::optable::OpTable;

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("could not locate {what} in the delivered script")]
  AnchorNotFound { what: &'static str },

  #[error("unbalanced {what} block")]
  UnbalancedBlock { what: &'static str },

  #[error("function shape not in the operation table: {snippet}")]
  UnknownOperation { snippet: String },

  #[error("unparseable call step: {snippet}")]
  BadStep { snippet: String },

  #[error("recovered program failed validation: {0}")]
  Invalid(#[from] InterpretError),

  #[error("pattern error: {0}")]
  Regex(#[from] regex::Error),
}

/// Returns the balanced `{...}` / `[...]` block beginning at `open`
/// (inclusive of both delimiters). String literals are skipped so quoted
/// delimiters do not unbalance the scan.
pub(crate) fn balanced_block<'a>(
  text: &'a str,
  open: usize,
  open_ch: char,
  close_ch: char,
  what: &'static str,
) -> Result<&'a str, ExtractError> {
  let bytes = text.as_bytes();
  if bytes.get(open) != Some(&(open_ch as u8)) {
    return Err(ExtractError::UnbalancedBlock { what });
  }
  let mut depth = 0usize;
  let mut quote: Option<u8> = None;
  let mut escaped = false;
  for (offset, &b) in bytes[open..].iter().enumerate() {
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == q {
        quote = None;
      }
      continue;
    }
    match b {
      b'"' | b'\'' => quote = Some(b),
      _ if b == open_ch as u8 => depth += 1,
      _ if b == close_ch as u8 => {
        depth -= 1;
        if depth == 0 {
          return Ok(&text[open..=open + offset]);
        }
      }
      _ => {}
    }
  }
  Err(ExtractError::UnbalancedBlock { what })
}

/// Splits an array-literal interior on commas at nesting depth zero.
pub(crate) fn split_top_level(list: &str) -> Vec<&str> {
  let mut parts = Vec::new();
  let mut depth = 0usize;
  let mut quote: Option<u8> = None;
  let mut escaped = false;
  let mut start = 0usize;
  for (i, &b) in list.as_bytes().iter().enumerate() {
    if let Some(q) = quote {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == q {
        quote = None;
      }
      continue;
    }
    match b {
      b'"' | b'\'' => quote = Some(b),
      b'(' | b'[' | b'{' => depth += 1,
      b')' | b']' | b'}' => depth = depth.saturating_sub(1),
      b',' if depth == 0 => {
        parts.push(&list[start..i]);
        start = i + 1;
      }
      _ => {}
    }
  }
  if start < list.len() || !parts.is_empty() {
    parts.push(&list[start..]);
  }
  parts
}

fn unquote(s: &str) -> Option<String> {
  let s = s.trim();
  let inner = s
    .strip_prefix('"')
    .and_then(|r| r.strip_suffix('"'))
    .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))?;
  Some(inner.replace("\\\"", "\"").replace("\\'", "'").replace("\\\\", "\\"))
}

/// Recovers the signature routine: a split/join wrapper whose body is a run
/// of helper-object calls, with the helpers defined in a sibling object
/// literal. Two anchor generations are tried; both are shape probes over an
/// adversarial input.
pub fn extract_signature_program(script: &str, table: &OpTable) -> Result<Program, ExtractError> {
  // Assignment form, then declaration form. The body carries no braces of
  // its own, which is what bounds the match.
  let anchors = [
    r#"[a-zA-Z0-9$_]+\s*=\s*function\(\s*[a-zA-Z0-9$]\s*\)\s*\{([^{}]*return\s+[a-zA-Z0-9$]+\.join\([^{}]*)\}"#,
    r#"function\s+[a-zA-Z0-9$_]+\(\s*[a-zA-Z0-9$]\s*\)\s*\{([^{}]*return\s+[a-zA-Z0-9$]+\.join\([^{}]*)\}"#,
  ];

  let mut body = None;
  for anchor in anchors {
    let re = Regex::new(anchor)?;
    for caps in re.captures_iter(script) {
      let candidate = caps.get(1).map(|m| m.as_str()).unwrap_or("");
      if candidate.contains(".split(") {
        body = Some(candidate);
        break;
      }
    }
    if body.is_some() {
      break;
    }
  }
  let body = body.ok_or(ExtractError::AnchorNotFound {
    what: "signature routine",
  })?;

  // Helper calls: OBJ.method(a, 3) or OBJ["method"](a, 3).
  let call_re = Regex::new(
    r#"([a-zA-Z0-9$_]+)(?:\.([a-zA-Z0-9$_]+)|\[\s*(?:"([^"]+)"|'([^']+)')\s*\])\(\s*[a-zA-Z0-9$]+\s*(?:,\s*(-?\d+)\s*)?\)"#,
  )?;

  let mut helper_object = None;
  let mut calls: Vec<(String, Option<i64>)> = Vec::new();
  for caps in call_re.captures_iter(body) {
    let object = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let method = caps
      .get(2)
      .or_else(|| caps.get(3))
      .or_else(|| caps.get(4))
      .map(|m| m.as_str().to_string())
      .ok_or(ExtractError::AnchorNotFound {
        what: "helper method name",
      })?;
    let operand = caps.get(5).and_then(|m| m.as_str().parse::<i64>().ok());
    match &helper_object {
      None => helper_object = Some(object.to_string()),
      // Every call goes through the same helper object.
      Some(existing) if existing != object => continue,
      Some(_) => {}
    }
    calls.push((method, operand));
  }
  let helper_object = helper_object.ok_or(ExtractError::AnchorNotFound {
    what: "helper object reference",
  })?;
  if calls.is_empty() {
    return Err(ExtractError::AnchorNotFound {
      what: "helper calls",
    });
  }

  // The helper object literal, located anywhere in the script.
  let object_re = Regex::new(&format!(
    r"(?:var\s+|,\s*|^\s*){}\s*=\s*\{{",
    regex::escape(&helper_object)
  ))?;
  let object_match = object_re
    .find(script)
    .ok_or(ExtractError::AnchorNotFound {
      what: "helper object literal",
    })?;
  let brace = object_match.end() - 1;
  let object_src = balanced_block(script, brace, '{', '}', "helper object")?;

  let method_re =
    Regex::new(r#"(?:^|[,{]\s*)(?:"([a-zA-Z0-9$_]+)"|'([a-zA-Z0-9$_]+)'|([a-zA-Z0-9$_]+))\s*:\s*function\s*\([^)]*\)\s*\{"#)?;
  let mut methods: Vec<(String, OpKind)> = Vec::new();
  for caps in method_re.captures_iter(object_src) {
    let name = caps
      .get(1)
      .or_else(|| caps.get(2))
      .or_else(|| caps.get(3))
      .map(|m| m.as_str().to_string())
      .ok_or(ExtractError::AnchorNotFound {
        what: "helper method",
      })?;
    let brace = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
    let fn_body = balanced_block(object_src, brace, '{', '}', "helper body")?;
    let op = table
      .classify(fn_body)
      .ok_or_else(|| ExtractError::UnknownOperation {
        snippet: snippet(fn_body),
      })?;
    methods.push((name, op));
  }

  // Assemble: slot 0 carries the input, then one op per helper, then one
  // int per call operand.
  let mut program = Program {
    primitives: vec![Primitive::SelfRef],
    steps: Vec::new(),
  };
  let mut op_index = std::collections::HashMap::new();
  for (name, op) in &methods {
    op_index.insert(name.clone(), program.primitives.len());
    program.primitives.push(Primitive::Op(*op));
  }
  for (method, operand) in &calls {
    let op = *op_index
      .get(method)
      .ok_or_else(|| ExtractError::BadStep {
        snippet: method.clone(),
      })?;
    let mut args = Vec::new();
    if let Some(n) = operand {
      args.push(program.primitives.len());
      program.primitives.push(Primitive::Int(*n));
    }
    program.steps.push(Step { op, args });
  }
  program.validate()?;
  Ok(program)
}

/// Recovers the throttling routine: located through its `"n"` query hook,
/// possibly behind an array indirection, with a primitives array and a run
/// of indexed calls inside the body.
pub fn extract_throttle_program(script: &str, table: &OpTable) -> Result<Program, ExtractError> {
  let hook_re = Regex::new(
    r#"\.get\(\s*"n"\s*\)\s*\)\s*&&\s*\(\s*[a-zA-Z0-9$_]+\s*=\s*([a-zA-Z0-9$_]+)(?:\[(\d+)\])?\s*\("#,
  )?;
  let caps = hook_re
    .captures(script)
    .ok_or(ExtractError::AnchorNotFound {
      what: "throttling hook",
    })?;
  let mut fn_name = caps
    .get(1)
    .map(|m| m.as_str().to_string())
    .ok_or(ExtractError::AnchorNotFound {
      what: "throttling routine name",
    })?;

  // Array indirection: `var X=[real]` with the hook calling X[idx].
  if let Some(index) = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok()) {
    let alias_re = Regex::new(&format!(
      r"var\s+{}\s*=\s*\[([^\]]*)\]",
      regex::escape(&fn_name)
    ))?;
    let alias = alias_re
      .captures(script)
      .ok_or(ExtractError::AnchorNotFound {
        what: "throttling alias table",
      })?;
    let names = alias.get(1).map(|m| m.as_str()).unwrap_or("");
    fn_name = names
      .split(',')
      .nth(index)
      .map(|s| s.trim().to_string())
      .filter(|s| !s.is_empty())
      .ok_or(ExtractError::AnchorNotFound {
        what: "aliased throttling routine",
      })?;
  }

  let def_re = Regex::new(&format!(
    r"{}\s*=\s*function\s*\(\s*([a-zA-Z0-9$_]+)\s*\)\s*\{{",
    regex::escape(&fn_name)
  ))?;
  let def = def_re.find(script).ok_or(ExtractError::AnchorNotFound {
    what: "throttling routine body",
  })?;
  let param = def_re
    .captures(script)
    .and_then(|c| c.get(1).map(|m| m.as_str().to_string()))
    .ok_or(ExtractError::AnchorNotFound {
      what: "throttling routine parameter",
    })?;
  let body = balanced_block(script, def.end() - 1, '{', '}', "throttling body")?;

  // The char buffer the input is split into, when named.
  let split_var = Regex::new(r"var\s+([a-zA-Z0-9$_]+)\s*=\s*[a-zA-Z0-9$_]+\s*\.\s*split")?
    .captures(body)
    .and_then(|c| c.get(1).map(|m| m.as_str().to_string()));

  // The operation array dwarfs every other literal in the body; take the
  // widest balanced candidate.
  let array_open_re = Regex::new(r"([a-zA-Z0-9$_]+)\s*=\s*\[")?;
  let mut array: Option<(String, usize, &str)> = None;
  for caps in array_open_re.captures_iter(body) {
    let name = caps.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
    let open = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
    if let Ok(block) = balanced_block(body, open, '[', ']', "primitives array") {
      if array.as_ref().map_or(true, |(_, _, best)| block.len() > best.len()) {
        array = Some((name, open, block));
      }
    }
  }
  let (array_name, array_open, array_src) = array.ok_or(ExtractError::AnchorNotFound {
    what: "primitives array",
  })?;
  let interior = &array_src[1..array_src.len() - 1];

  let mut program = Program::default();
  let mut self_slot = None;
  for element in split_top_level(interior) {
    let primitive = parse_primitive(element, table, &param, split_var.as_deref())?;
    if primitive == Primitive::SelfRef && self_slot.is_none() {
      self_slot = Some(program.primitives.len());
    }
    program.primitives.push(primitive);
  }

  // Calls come after the array; scanning from its end keeps any indexed
  // reads inside the array literal out of the step list.
  let steps_src = &body[array_open + array_src.len()..];
  let step_re = Regex::new(&format!(
    r"{}\[(\d+)\]\(\s*([^()]*)\)",
    regex::escape(&array_name)
  ))?;
  let arg_re = Regex::new(&format!(r"^{}\[(\d+)\]$", regex::escape(&array_name)))?;
  for caps in step_re.captures_iter(steps_src) {
    let op = caps
      .get(1)
      .and_then(|m| m.as_str().parse::<usize>().ok())
      .ok_or_else(|| ExtractError::BadStep {
        snippet: snippet(caps.get(0).map(|m| m.as_str()).unwrap_or("")),
      })?;
    let mut args = Vec::new();
    let raw_args = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    for raw in raw_args.split(',') {
      let raw = raw.trim();
      if raw.is_empty() {
        continue;
      }
      if let Some(arg_caps) = arg_re.captures(raw) {
        let index = arg_caps
          .get(1)
          .and_then(|m| m.as_str().parse::<usize>().ok())
          .ok_or_else(|| ExtractError::BadStep {
            snippet: snippet(raw),
          })?;
        args.push(index);
      } else if raw == param || split_var.as_deref() == Some(raw) {
        let slot = *self_slot.get_or_insert_with(|| {
          program.primitives.push(Primitive::SelfRef);
          program.primitives.len() - 1
        });
        args.push(slot);
      } else {
        return Err(ExtractError::BadStep {
          snippet: snippet(raw),
        });
      }
    }
    // The buffer itself is always the implicit first argument.
    if args
      .first()
      .is_some_and(|&a| program.primitives.get(a) == Some(&Primitive::SelfRef))
    {
      args.remove(0);
    }
    program.steps.push(Step { op, args });
  }
  if program.steps.is_empty() {
    return Err(ExtractError::AnchorNotFound {
      what: "throttling call steps",
    });
  }
  program.validate()?;
  Ok(program)
}

fn parse_primitive(
  element: &str,
  table: &OpTable,
  param: &str,
  split_var: Option<&str>,
) -> Result<Primitive, ExtractError> {
  let s = element.trim();
  if s == "null" {
    return Ok(Primitive::Null);
  }
  if s == param || split_var == Some(s) {
    return Ok(Primitive::SelfRef);
  }
  if let Ok(n) = s.parse::<i64>() {
    return Ok(Primitive::Int(n));
  }
  if let Some(text) = unquote(s) {
    return Ok(Primitive::Str(text));
  }
  if s.starts_with("function") {
    let brace = s.find('{').ok_or(ExtractError::UnbalancedBlock {
      what: "primitive function",
    })?;
    let fn_body = balanced_block(s, brace, '{', '}', "primitive function")?;
    let op = table
      .classify(fn_body)
      .ok_or_else(|| ExtractError::UnknownOperation {
        snippet: snippet(fn_body),
      })?;
    return Ok(Primitive::Op(op));
  }
  // References to the array itself, globals, and other exotica: inert.
  Ok(Primitive::Null)
}

fn snippet(s: &str) -> String {
  const LIMIT: usize = 80;
  let trimmed = s.trim();
  if trimmed.len() <= LIMIT {
    trimmed.to_string()
  } else {
    let mut end = LIMIT;
    while !trimmed.is_char_boundary(end) {
      end -= 1;
    }
    format!("{}…", &trimmed[..end])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SIG_SCRIPT: &str = concat!(
    r#"var Zq={wS:function(a){a.reverse()},"#,
    r#"pN:function(a,b){a.splice(0,b)},"#,
    r#"xK:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}};"#,
    "\n",
    r#"tR=function(a){a=a.split("");Zq.xK(a,1);Zq.wS(a,3);Zq.pN(a,2);return a.join("")};"#,
  );

  const N_SCRIPT: &str = concat!(
    r#"Vp=function(a){var b=a.split(a.slice(0,0)),c=[function(d){d.reverse()},"#,
    r#"b,"#,
    r#"function(d,e){e=(e%d.length+d.length)%d.length;var f=d[0];d[0]=d[e];d[e]=f},"#,
    r#"2,"#,
    r#""_secret_","#,
    r#"function(d,e){d.push(e)},"#,
    r#"null];"#,
    r#"try{c[0](c[1]),c[2](c[1],c[3]),c[5](c[1],c[4])}catch(f){return"fault_"+a}"#,
    r#"return b.join("")};"#,
    "\n",
    r#"var Uo=[Vp];"#,
    "\n",
    r#"g.prototype.Bk=function(d){var e=d.url;e.get("n"))&&(b=Uo[0](b),e.set("n",b))};"#,
  );

  #[test]
  fn signature_program_round_trip() {
    let table = OpTable::v1().unwrap();
    let program = extract_signature_program(SIG_SCRIPT, &table).unwrap();
    // swap(1), reverse, drop first two
    assert_eq!(program.run("abcdef").unwrap(), "dcab");
  }

  #[test]
  fn signature_extraction_fails_on_unrelated_script() {
    let table = OpTable::v1().unwrap();
    let err = extract_signature_program("var x=1;", &table).unwrap_err();
    assert!(matches!(err, ExtractError::AnchorNotFound { .. }));
  }

  #[test]
  fn throttle_program_resolves_array_indirection() {
    let table = OpTable::v1().unwrap();
    let program = extract_throttle_program(N_SCRIPT, &table).unwrap();
    // reverse, swap(2), append "_secret_"
    assert_eq!(program.run("abc123").unwrap(), "123cba_secret_");
  }

  #[test]
  fn throttle_program_is_pure_across_runs() {
    let table = OpTable::v1().unwrap();
    let program = extract_throttle_program(N_SCRIPT, &table).unwrap();
    assert_eq!(program.run("XYZ").unwrap(), program.run("XYZ").unwrap());
  }

  #[test]
  fn unknown_helper_shape_is_a_compile_failure() {
    let table = OpTable::v1().unwrap();
    let script = concat!(
      r#"var Zq={wS:function(a){a.sort()}};"#,
      "\n",
      r#"tR=function(a){a=a.split("");Zq.wS(a,3);return a.join("")};"#,
    );
    let err = extract_signature_program(script, &table).unwrap_err();
    assert!(matches!(err, ExtractError::UnknownOperation { .. }));
  }

  #[test]
  fn balanced_block_skips_quoted_delimiters() {
    let text = r#"{a:"}",b:{c:1}}"#;
    assert_eq!(balanced_block(text, 0, '{', '}', "t").unwrap(), text);
  }

  #[test]
  fn split_top_level_honors_nesting() {
    let parts = split_top_level(r#"1,"a,b",function(d){d.push(1,2)},[3,4]"#);
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "1");
    assert_eq!(parts[1], "\"a,b\"");
    assert_eq!(parts[3], "[3,4]");
  }
}
