use serde::{Deserialize, Serialize};

/// Playback resolution behaviour. Everything here has a workable default so a
/// bare `[resolver]` table (or none at all) still resolves.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResolverConfig {
  /// Preferred audio language (BCP-47 primary subtag, e.g. "en").
  #[serde(default = "default_base_language")]
  pub base_language: String,
  /// Pick a dubbed track over the original when both exist in the base language.
  #[serde(default)]
  pub prefer_dubbed_audio: bool,
  /// Hand the scored progressive list back to the host instead of choosing.
  #[serde(default)]
  pub ask_for_quality: bool,
  /// Always answer with the adaptive manifest, even when progressive would do.
  #[serde(default)]
  pub use_mpd: bool,
  /// Progressive streams above this height are trimmed from the answer.
  #[serde(default = "default_height_cutoff")]
  pub progressive_height_cutoff: u32,
  #[serde(default = "default_true")]
  pub allow_vp9: bool,
  #[serde(default = "default_true")]
  pub allow_av1: bool,
  /// Omit a video codec family from the manifest when a newer family
  /// already covers the same resolutions.
  #[serde(default)]
  pub drop_covered_codecs: bool,
  #[serde(default)]
  pub features: FeatureGates,
  #[serde(default)]
  pub subtitles: SubtitleConfig,
  /// Attempts per persona on transient upstream failures.
  #[serde(default = "default_retry_attempts")]
  pub retry_attempts: u32,
  /// Player script metadata cache lifetime.
  #[serde(default = "default_script_cache_ttl_secs")]
  pub script_cache_ttl_secs: u64,
}

fn default_base_language() -> String {
  "en".to_string()
}

fn default_height_cutoff() -> u32 {
  1080
}

fn default_true() -> bool {
  true
}

fn default_retry_attempts() -> u32 {
  3
}

fn default_script_cache_ttl_secs() -> u64 {
  // Matches the upstream player response expiry window.
  6 * 60 * 60
}

impl Default for ResolverConfig {
  fn default() -> Self {
    Self {
      base_language: default_base_language(),
      prefer_dubbed_audio: false,
      ask_for_quality: false,
      use_mpd: false,
      progressive_height_cutoff: default_height_cutoff(),
      allow_vp9: default_true(),
      allow_av1: default_true(),
      drop_covered_codecs: false,
      features: FeatureGates::default(),
      subtitles: SubtitleConfig::default(),
      retry_attempts: default_retry_attempts(),
      script_cache_ttl_secs: default_script_cache_ttl_secs(),
    }
  }
}

/// Stream families that are dropped during grouping unless enabled.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FeatureGates {
  #[serde(default)]
  pub hdr: bool,
  #[serde(default = "default_true")]
  pub high_fps: bool,
  #[serde(default)]
  pub multichannel: bool,
  #[serde(default)]
  pub spatial_audio: bool,
  #[serde(default)]
  pub vr: bool,
  #[serde(default)]
  pub stereo_3d: bool,
}

impl Default for FeatureGates {
  fn default() -> Self {
    Self {
      hdr: false,
      high_fps: default_true(),
      multichannel: false,
      spatial_audio: false,
      vr: false,
      stereo_3d: false,
    }
  }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubtitleMode {
  #[default]
  None,
  All,
  CurrentLanguage,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SubtitleConfig {
  #[serde(default)]
  pub mode: SubtitleMode,
  /// Accept machine-generated tracks when no uploaded track matches.
  #[serde(default)]
  pub include_auto_generated: bool,
}

/// Credentials for the optional signed-in retry pass. Tokens are long-lived
/// refresh tokens; access tokens are exchanged on demand.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
  #[serde(default)]
  pub refresh_tokens: Vec<String>,
}
