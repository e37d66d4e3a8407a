use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::cipher::extract::extract_throttle_program;
use crate::cipher::interpreter::Program;
use crate::cipher::optable::OpTable;

/// Calculator for the per-client throttling parameter. Unlike the signature
/// decoder, failure here is survivable: the stream still plays, just at a
/// reduced rate, so every failure path answers with the input unchanged.
pub struct ThrottlingParameterCalculator {
  program: Option<Program>,
  disabled: AtomicBool,
}

impl ThrottlingParameterCalculator {
  pub fn compile(script: &str, table: &OpTable) -> Self {
    match extract_throttle_program(script, table) {
      Ok(program) => Self {
        program: Some(program),
        disabled: AtomicBool::new(false),
      },
      Err(err) => {
        warn!("throttling routine recovery failed: {err}");
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

  /// Rewrites one throttling parameter. Identity on any failure, and the
  /// first interpretation failure silences the calculator for the rest of
  /// the script's lifetime.
  pub fn calculate(&self, parameter: &str) -> String {
    if self.is_disabled() {
      return parameter.to_string();
    }
    let Some(program) = self.program.as_ref() else {
      return parameter.to_string();
    };
    match program.run(parameter) {
      Ok(out) => out,
      Err(err) => {
        if !self.disabled.swap(true, Ordering::Relaxed) {
          warn!("throttling interpretation failed, passing parameters through: {err}");
        }
        parameter.to_string()
      }
    }
  }
}
