use serde_json::Value;

use crate::formats::scorer::SortKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
  Mp4,
  Webm,
  ThreeGp,
  Flv,
  MpegTs,
  Unknown,
}

impl Container {
  pub fn from_mime(mime: &str) -> Self {
    let base = mime.split(';').next().unwrap_or(mime).trim();
    match base {
      "video/mp4" | "audio/mp4" => Self::Mp4,
      "video/webm" | "audio/webm" => Self::Webm,
      "video/3gpp" => Self::ThreeGp,
      "video/x-flv" => Self::Flv,
      "video/mp2t" | "application/x-mpegURL" | "application/vnd.apple.mpegurl" => {
        Self::MpegTs
      }
      _ => Self::Unknown,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
  Av1,
  /// VP9 profile 2, the HDR-capable variant.
  Vp9Profile2,
  Vp9,
  H264,
  Vp8,
  H263,
  Unknown,
}

impl VideoCodec {
  pub fn from_codecs(codecs: &str) -> Self {
    let c = codecs.to_ascii_lowercase();
    if c.contains("av01") {
      Self::Av1
    } else if c.contains("vp09.02") {
      Self::Vp9Profile2
    } else if c.contains("vp9") || c.contains("vp09") {
      Self::Vp9
    } else if c.contains("avc1") || c.contains("avc3") || c.contains("h264") {
      Self::H264
    } else if c.contains("vp8") {
      Self::Vp8
    } else if c.contains("mp4v") || c.contains("h263") {
      Self::H263
    } else {
      Self::Unknown
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioCodec {
  Opus,
  Aac,
  Eac3,
  Ac3,
  Vorbis,
  Mp3,
  /// DTS Express, multichannel only.
  Dtse,
  Unknown,
}

impl AudioCodec {
  pub fn from_codecs(codecs: &str) -> Self {
    let c = codecs.to_ascii_lowercase();
    if c.contains("opus") {
      Self::Opus
    } else if c.contains("mp4a.40.34") || c.contains("mp3") {
      Self::Mp3
    } else if c.contains("mp4a") {
      Self::Aac
    } else if c.contains("ec-3") {
      Self::Eac3
    } else if c.contains("ac-3") {
      Self::Ac3
    } else if c.contains("vorbis") {
      Self::Vorbis
    } else if c.contains("dtse") {
      Self::Dtse
    } else {
      Self::Unknown
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
  Video,
  Audio,
  /// Progressive stream carrying both tracks in one file.
  Muxed,
}

/// Audio track flavour, highest preference first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioRole {
  Original,
  Dub,
  Secondary,
  AutoDub,
  Descriptive,
  Alternate,
}

impl AudioRole {
  pub fn priority(self) -> u8 {
    match self {
      Self::Original => 0,
      Self::Dub => 1,
      Self::Secondary => 2,
      Self::AutoDub => 3,
      Self::Descriptive => 4,
      Self::Alternate => 5,
    }
  }

  /// DASH Role@value for the track. The preferred track is always emitted
  /// as "main" regardless of flavour.
  pub fn dash_role(self) -> &'static str {
    match self {
      Self::Original => "main",
      Self::Dub | Self::AutoDub => "dub",
      Self::Descriptive => "description",
      Self::Secondary | Self::Alternate => "alternate",
    }
  }

  fn from_acont(value: &str) -> Option<Self> {
    match value {
      "original" => Some(Self::Original),
      "dubbed" => Some(Self::Dub),
      "dubbed-auto" => Some(Self::AutoDub),
      "secondary" => Some(Self::Secondary),
      "descriptive" => Some(Self::Descriptive),
      "alternate" => Some(Self::Alternate),
      _ => None,
    }
  }
}

/// Where the media bytes come from. `Ciphered` still carries the raw
/// `signatureCipher` blob and must never reach a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
  Direct(String),
  Ciphered(String),
}

impl StreamSource {
  pub fn direct_url(&self) -> Option<&str> {
    match self {
      Self::Direct(url) => Some(url),
      Self::Ciphered(_) => None,
    }
  }
}

/// One playable (or not-yet-unlocked) stream variant.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
  pub itag: u32,
  pub container: Container,
  pub kind: MediaKind,
  pub video_codec: Option<VideoCodec>,
  pub audio_codec: Option<AudioCodec>,
  /// Full mimeType as delivered, e.g. `video/mp4; codecs="avc1.64001F"`.
  pub mime: String,
  pub codecs: String,
  pub bitrate: u64,
  pub width: Option<u32>,
  pub height: Option<u32>,
  pub fps: Option<u32>,
  pub hdr: bool,
  pub spatial_audio: bool,
  pub stereo_3d: bool,
  pub vr: bool,
  pub channels: Option<u32>,
  pub audio_sample_rate: Option<u32>,
  pub language: Option<String>,
  pub audio_role: Option<AudioRole>,
  pub default_audio: bool,
  pub drc: bool,
  pub source: StreamSource,
  /// User agent of the persona that delivered this stream. Media requests
  /// must present the same one or the CDN answers 403.
  pub user_agent: Option<&'static str>,
  pub init_range: Option<(u64, u64)>,
  pub index_range: Option<(u64, u64)>,
  pub content_length: Option<u64>,
  pub approx_duration_ms: Option<u64>,
  pub live: bool,
  pub preferred_audio: bool,
  /// Catalog override that trumps every computed score.
  pub manual_priority: i32,
  pub sort_key: SortKey,
}

impl StreamDescriptor {
  pub fn is_video(&self) -> bool {
    matches!(self.kind, MediaKind::Video | MediaKind::Muxed)
  }

  pub fn is_audio(&self) -> bool {
    matches!(self.kind, MediaKind::Audio | MediaKind::Muxed)
  }

  pub fn is_progressive(&self) -> bool {
    self.kind == MediaKind::Muxed
  }

  /// Primary language subtag, lowercased, for preference comparison
  /// ("en-US" and "en-GB" both answer "en").
  pub fn language_base(&self) -> Option<String> {
    self.language
      .as_ref()
      .map(|l| l.split('-').next().unwrap_or(l).to_ascii_lowercase())
  }
}

pub(crate) fn parse_range(item: &Value, field: &str) -> Option<(u64, u64)> {
  let range = item.get(field)?;
  let start = range.get("start").and_then(value_as_u64)?;
  let end = range.get("end").and_then(value_as_u64)?;
  Some((start, end))
}

/// Numeric fields arrive either as JSON numbers or as quoted strings
/// depending on the persona; accept both.
pub(crate) fn value_as_u64(v: &Value) -> Option<u64> {
  v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Splits `video/mp4; codecs="avc1.64001F, mp4a.40.2"` into its container
/// and bare codecs list.
pub(crate) fn split_mime(mime: &str) -> (Container, String) {
  let container = Container::from_mime(mime);
  let codecs = mime
    .split("codecs=\"")
    .nth(1)
    .and_then(|rest| rest.split('"').next())
    .unwrap_or("")
    .to_string();
  (container, codecs)
}

/// Audio track metadata spread across `audioTrack` and the xtags blob.
pub(crate) fn parse_audio_track(item: &Value) -> (Option<String>, Option<AudioRole>, bool) {
  let audio_track = item.get("audioTrack");
  let is_default = audio_track
    .and_then(|t| t.get("audioIsDefault"))
    .and_then(|v| v.as_bool())
    .unwrap_or(false);

  let mut language = audio_track
    .and_then(|t| t.get("id"))
    .and_then(|v| v.as_str())
    .map(|id| id.split('.').next().unwrap_or(id).to_string());

  let mut role = None;
  if let Some(xtags) = item.get("xtags").and_then(|v| v.as_str()) {
    for tag in xtags.split(':') {
      let mut kv = tag.splitn(2, '=');
      match (kv.next(), kv.next()) {
        (Some("acont"), Some(v)) => role = AudioRole::from_acont(v),
        (Some("lang"), Some(v)) if language.is_none() => {
          language = Some(v.to_string());
        }
        _ => {}
      }
    }
  }

  if role.is_none() {
    if let Some(name) = audio_track
      .and_then(|t| t.get("displayName"))
      .and_then(|v| v.as_str())
    {
      let lower = name.to_ascii_lowercase();
      if lower.contains("original") {
        role = Some(AudioRole::Original);
      } else if lower.contains("descriptive") {
        role = Some(AudioRole::Descriptive);
      } else if lower.contains("dub") {
        role = Some(AudioRole::Dub);
      }
    }
  }

  // A lone default track with no markers is the original recording.
  if role.is_none() && is_default {
    role = Some(AudioRole::Original);
  }

  (language, role, is_default)
}
