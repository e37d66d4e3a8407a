use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::cipher::extract::extract_signature_program;
use crate::cipher::interpreter::Program;
use crate::cipher::optable::OpTable;

/// Decoder for the protected-signature scheme. Compiled once per delivered
/// script; a recovery or interpretation failure disables it for the rest of
/// the script's lifetime rather than producing garbage URLs.
pub struct SignatureCipherDecoder {
  program: Option<Program>,
  disabled: AtomicBool,
}

impl SignatureCipherDecoder {
  pub fn compile(script: &str, table: &OpTable) -> Self {
    match extract_signature_program(script, table) {
      Ok(program) => Self {
        program: Some(program),
        disabled: AtomicBool::new(false),
      },
      Err(err) => {
        warn!("signature routine recovery failed: {err}");
        Self {
          program: None,
          disabled: AtomicBool::new(true),
        }
      }
    }
  }

  pub fn is_disabled(&self) -> bool {
    self.disabled.load(Ordering::Relaxed)
  }

  /// Decodes one scrambled signature. `None` means the stream carrying it
  /// must be dropped; after the first interpretation failure every further
  /// call answers `None` without logging again.
  pub fn decode(&self, scrambled: &str) -> Option<String> {
    if self.is_disabled() {
      return None;
    }
    let program = self.program.as_ref()?;
    match program.run(scrambled) {
      Ok(clear) => Some(clear),
      Err(err) => {
        if !self.disabled.swap(true, Ordering::Relaxed) {
          warn!("signature interpretation failed, decoder disabled: {err}");
        }
        None
      }
    }
  }
}
