use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
  /// Base level when `RUST_LOG` is unset ("info" if missing).
  pub level: Option<String>,
  /// Extra per-target directives appended to the base level.
  pub directives: Option<String>,
}

impl LoggingConfig {
  pub fn env_filter(&self) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
      return filter;
    }
    let mut spec = self.level.clone().unwrap_or_else(|| "info".to_string());
    if let Some(directives) = &self.directives {
      spec.push(',');
      spec.push_str(directives);
    }
    EnvFilter::new(spec)
  }
}
