/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Upstream video identifier (the 11-character watch id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
  /// Pulls a video id out of a watch/short/live URL, or takes the input
  /// verbatim when it already looks like a bare id.
  pub fn parse(identifier: &str) -> Self {
    let id = if identifier.contains("v=") {
      identifier
        .split("v=")
        .nth(1)
        .unwrap_or(identifier)
        .split('&')
        .next()
        .unwrap_or(identifier)
    } else if identifier.contains("youtu.be/") {
      identifier
        .split("youtu.be/")
        .nth(1)
        .unwrap_or(identifier)
        .split('?')
        .next()
        .unwrap_or(identifier)
    } else if identifier.contains("/live/") {
      identifier
        .split("/live/")
        .nth(1)
        .unwrap_or(identifier)
        .split('?')
        .next()
        .unwrap_or(identifier)
    } else if identifier.contains("/shorts/") {
      identifier
        .split("/shorts/")
        .nth(1)
        .unwrap_or(identifier)
        .split('?')
        .next()
        .unwrap_or(identifier)
    } else {
      identifier
    };
    Self(id.to_string())
  }

  pub fn watch_url(&self) -> String {
    format!("https://www.youtube.com/watch?v={}", self.0)
  }
}

impl From<String> for VideoId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

impl From<&str> for VideoId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

impl std::ops::Deref for VideoId {
  type Target = str;
  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl std::fmt::Display for VideoId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}
