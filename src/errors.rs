use thiserror::Error;

/// Terminal failures surfaced to the caller of a resolution.
///
/// Conditions the engine absorbs internally (an itag it does not know, a
/// de-obfuscation program that stopped matching the player script) are logged
/// and handled in place; they never appear here.
#[derive(Error, Debug)]
pub enum ResolveError {
  /// Upstream said the content cannot be played, with its localized reason.
  #[error("content not available: {reason}")]
  NotAvailable { reason: String },

  /// Playback needs credentials and none were configured.
  #[error("sign-in required to play this content")]
  AuthRequired,

  /// Gated content that stays locked even with working credentials.
  #[error("age or membership gate: {reason}")]
  AgeOrMembershipGate { reason: String },

  /// Upstream kept answering 5xx past the retry budget.
  #[error("upstream server error persisted across retries")]
  TransientServerError,

  /// Every persona was exhausted without producing a usable stream set.
  #[error("no playable streams found")]
  NoStreamsFound,

  #[error("http transport error: {0}")]
  Http(#[from] reqwest::Error),

  /// The delivered player page or script no longer matches its anchors.
  #[error("player script discovery failed: {0}")]
  ScriptDiscovery(String),

  #[error("manifest serialization error: {0}")]
  Manifest(String),

  #[error("configuration error: {0}")]
  Config(String),
}

impl ResolveError {
  /// True when retrying the same request later could plausibly succeed.
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::TransientServerError | Self::Http(_))
  }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
