use serde_json::Value;

use crate::formats::scorer::SortKey;
use crate::formats::stream::{
  AudioCodec, Container, MediaKind, StreamDescriptor, StreamSource, VideoCodec, parse_audio_track,
  parse_range, split_mime, value_as_u64,
};

/// Ids outside the upstream itag space, for streams this engine synthesizes
/// itself (whole-manifest descriptors rather than single files).
pub const ITAG_HLS_LIVE: u32 = 10_001;
pub const ITAG_REMOTE_DASH: u32 = 10_002;

/// Nominal profile for one encoding id. Observed metadata on the raw item
/// always overrides these values.
#[derive(Debug, Clone, Copy)]
pub struct FormatSpec {
  pub container: Container,
  pub kind: MediaKind,
  pub video: Option<VideoCodec>,
  pub audio: Option<AudioCodec>,
  pub height: Option<u32>,
  pub fps: Option<u32>,
  pub hdr: bool,
  pub spatial_audio: bool,
  pub channels: Option<u32>,
}

impl FormatSpec {
  const fn video(container: Container, codec: VideoCodec, height: u32, fps: u32) -> Self {
    Self {
      container,
      kind: MediaKind::Video,
      video: Some(codec),
      audio: None,
      height: Some(height),
      fps: Some(fps),
      hdr: false,
      spatial_audio: false,
      channels: None,
    }
  }

  const fn video_hdr(container: Container, codec: VideoCodec, height: u32, fps: u32) -> Self {
    let mut spec = Self::video(container, codec, height, fps);
    spec.hdr = true;
    spec
  }

  const fn audio(container: Container, codec: AudioCodec) -> Self {
    Self {
      container,
      kind: MediaKind::Audio,
      video: None,
      audio: Some(codec),
      height: None,
      fps: None,
      hdr: false,
      spatial_audio: false,
      channels: Some(2),
    }
  }

  const fn audio_multichannel(container: Container, codec: AudioCodec, channels: u32) -> Self {
    let mut spec = Self::audio(container, codec);
    spec.channels = Some(channels);
    spec
  }

  const fn audio_spatial(container: Container, codec: AudioCodec, channels: u32) -> Self {
    let mut spec = Self::audio_multichannel(container, codec, channels);
    spec.spatial_audio = true;
    spec
  }

  const fn muxed(
    container: Container,
    video: VideoCodec,
    audio: AudioCodec,
    height: u32,
    fps: u32,
  ) -> Self {
    Self {
      container,
      kind: MediaKind::Muxed,
      video: Some(video),
      audio: Some(audio),
      height: Some(height),
      fps: Some(fps),
      hdr: false,
      spatial_audio: false,
      channels: Some(2),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub enum FormatLookup {
  Known(FormatSpec),
  /// Upstream retired the profile; not worth carrying metadata for.
  Discontinued,
  Unknown,
}

pub struct FormatCatalog;

impl FormatCatalog {
  pub fn lookup(itag: u32) -> FormatLookup {
    use AudioCodec::*;
    use Container::*;
    use VideoCodec::*;

    let spec = match itag {
      // Progressive mp4
      18 => FormatSpec::muxed(Mp4, H264, Aac, 360, 30),
      22 => FormatSpec::muxed(Mp4, H264, Aac, 720, 30),

      // Live transport-stream variants
      91 => FormatSpec::muxed(MpegTs, H264, Aac, 144, 30),
      92 => FormatSpec::muxed(MpegTs, H264, Aac, 240, 30),
      93 => FormatSpec::muxed(MpegTs, H264, Aac, 360, 30),
      94 => FormatSpec::muxed(MpegTs, H264, Aac, 480, 30),
      95 => FormatSpec::muxed(MpegTs, H264, Aac, 720, 30),
      96 => FormatSpec::muxed(MpegTs, H264, Aac, 1080, 30),
      300 => FormatSpec::muxed(MpegTs, H264, Aac, 720, 60),
      301 => FormatSpec::muxed(MpegTs, H264, Aac, 1080, 60),

      // Adaptive h264
      160 => FormatSpec::video(Mp4, H264, 144, 30),
      133 => FormatSpec::video(Mp4, H264, 240, 30),
      134 => FormatSpec::video(Mp4, H264, 360, 30),
      135 => FormatSpec::video(Mp4, H264, 480, 30),
      136 => FormatSpec::video(Mp4, H264, 720, 30),
      137 => FormatSpec::video(Mp4, H264, 1080, 30),
      264 => FormatSpec::video(Mp4, H264, 1440, 30),
      266 => FormatSpec::video(Mp4, H264, 2160, 30),
      138 => FormatSpec::video(Mp4, H264, 4320, 30),
      298 => FormatSpec::video(Mp4, H264, 720, 60),
      299 => FormatSpec::video(Mp4, H264, 1080, 60),
      304 => FormatSpec::video(Mp4, H264, 1440, 60),
      305 => FormatSpec::video(Mp4, H264, 2160, 60),

      // Adaptive vp9
      278 => FormatSpec::video(Webm, Vp9, 144, 30),
      242 => FormatSpec::video(Webm, Vp9, 240, 30),
      243 => FormatSpec::video(Webm, Vp9, 360, 30),
      244 => FormatSpec::video(Webm, Vp9, 480, 30),
      247 => FormatSpec::video(Webm, Vp9, 720, 30),
      248 => FormatSpec::video(Webm, Vp9, 1080, 30),
      271 => FormatSpec::video(Webm, Vp9, 1440, 30),
      313 => FormatSpec::video(Webm, Vp9, 2160, 30),
      272 => FormatSpec::video(Webm, Vp9, 4320, 30),
      302 => FormatSpec::video(Webm, Vp9, 720, 60),
      303 => FormatSpec::video(Webm, Vp9, 1080, 60),
      308 => FormatSpec::video(Webm, Vp9, 1440, 60),
      315 => FormatSpec::video(Webm, Vp9, 2160, 60),

      // vp9 profile 2, HDR
      330 => FormatSpec::video_hdr(Webm, Vp9Profile2, 144, 60),
      331 => FormatSpec::video_hdr(Webm, Vp9Profile2, 240, 60),
      332 => FormatSpec::video_hdr(Webm, Vp9Profile2, 360, 60),
      333 => FormatSpec::video_hdr(Webm, Vp9Profile2, 480, 60),
      334 => FormatSpec::video_hdr(Webm, Vp9Profile2, 720, 60),
      335 => FormatSpec::video_hdr(Webm, Vp9Profile2, 1080, 60),
      336 => FormatSpec::video_hdr(Webm, Vp9Profile2, 1440, 60),
      337 => FormatSpec::video_hdr(Webm, Vp9Profile2, 2160, 60),

      // AV1
      394 => FormatSpec::video(Mp4, Av1, 144, 30),
      395 => FormatSpec::video(Mp4, Av1, 240, 30),
      396 => FormatSpec::video(Mp4, Av1, 360, 30),
      397 => FormatSpec::video(Mp4, Av1, 480, 30),
      398 => FormatSpec::video(Mp4, Av1, 720, 30),
      399 => FormatSpec::video(Mp4, Av1, 1080, 30),
      400 => FormatSpec::video(Mp4, Av1, 1440, 30),
      401 => FormatSpec::video(Mp4, Av1, 2160, 30),
      402 => FormatSpec::video(Mp4, Av1, 4320, 30),

      // Audio
      139 => FormatSpec::audio(Mp4, Aac),
      140 => FormatSpec::audio(Mp4, Aac),
      141 => FormatSpec::audio(Mp4, Aac),
      256 => FormatSpec::audio_multichannel(Mp4, Aac, 6),
      258 => FormatSpec::audio_multichannel(Mp4, Aac, 6),
      325 => FormatSpec::audio_multichannel(Mp4, Dtse, 6),
      328 => FormatSpec::audio_multichannel(Mp4, Eac3, 6),
      380 => FormatSpec::audio_multichannel(Mp4, Ac3, 6),
      249 | 250 | 251 => FormatSpec::audio(Webm, Opus),
      338 => FormatSpec::audio_spatial(Webm, Opus, 4),

      // Synthetic whole-manifest entries
      ITAG_HLS_LIVE => FormatSpec::muxed(MpegTs, H264, Aac, 720, 30),
      ITAG_REMOTE_DASH => FormatSpec::muxed(Mp4, H264, Aac, 720, 30),

      // Retired profiles: flv/3gp era, DASH-less webm, stereo 3d, old vorbis
      5 | 6 | 17 | 34 | 35 | 36 | 37 | 38 | 43 | 44 | 45 | 46 | 59 | 78 | 82 | 83 | 84
      | 85 | 100 | 101 | 102 | 132 | 151 | 171 | 172 => return FormatLookup::Discontinued,

      _ => return FormatLookup::Unknown,
    };
    FormatLookup::Known(spec)
  }

  /// Turns one raw item from `formats` / `adaptiveFormats` into a
  /// descriptor, or drops it (unknown id, retired id, no source at all).
  pub fn descriptor_from_item(item: &Value, progressive: bool, live: bool) -> Option<StreamDescriptor> {
    let itag = item.get("itag").and_then(value_as_u64)? as u32;

    let spec = match Self::lookup(itag) {
      FormatLookup::Known(spec) => spec,
      FormatLookup::Discontinued => {
        tracing::debug!(itag, "retired encoding id, dropping stream");
        return None;
      }
      FormatLookup::Unknown => {
        tracing::warn!(itag, metadata = %item, "unknown encoding id, dropping stream");
        return None;
      }
    };

    let source = if let Some(url) = item.get("url").and_then(|v| v.as_str()) {
      StreamSource::Direct(url.to_string())
    } else if let Some(blob) = item
      .get("signatureCipher")
      .or_else(|| item.get("cipher"))
      .and_then(|v| v.as_str())
    {
      StreamSource::Ciphered(blob.to_string())
    } else {
      tracing::warn!(itag, "stream item carries no url or cipher, dropping");
      return None;
    };

    let mime = item
      .get("mimeType")
      .and_then(|v| v.as_str())
      .unwrap_or("")
      .to_string();
    let (observed_container, codecs) = split_mime(&mime);
    let container = if observed_container == Container::Unknown {
      spec.container
    } else {
      observed_container
    };

    let kind = if progressive {
      MediaKind::Muxed
    } else if mime.starts_with("audio/") {
      MediaKind::Audio
    } else if mime.starts_with("video/") {
      MediaKind::Video
    } else {
      spec.kind
    };

    let video_codec = match kind {
      MediaKind::Audio => None,
      _ => {
        let observed = VideoCodec::from_codecs(&codecs);
        if observed == VideoCodec::Unknown {
          spec.video
        } else {
          Some(observed)
        }
      }
    };
    let audio_codec = match kind {
      MediaKind::Video => None,
      _ => {
        let observed = AudioCodec::from_codecs(&codecs);
        if observed == AudioCodec::Unknown {
          spec.audio
        } else {
          Some(observed)
        }
      }
    };

    let quality_label = item
      .get("qualityLabel")
      .and_then(|v| v.as_str())
      .unwrap_or("");
    let hdr = spec.hdr
      || quality_label.contains("HDR")
      || item
        .get("colorInfo")
        .and_then(|c| c.get("primaries"))
        .and_then(|v| v.as_str())
        .is_some_and(|p| p.contains("BT2020"));
    let vr = item
      .get("projectionType")
      .and_then(|v| v.as_str())
      .is_some_and(|p| p == "EQUIRECTANGULAR" || p == "MESH");
    let stereo_3d = item
      .get("stereoLayout")
      .and_then(|v| v.as_str())
      .is_some_and(|s| s != "STEREO_LAYOUT_UNKNOWN" && s != "STEREO_LAYOUT_NONE");

    let (language, audio_role, default_audio) = parse_audio_track(item);

    let channels = item
      .get("audioChannels")
      .and_then(value_as_u64)
      .map(|c| c as u32)
      .or(spec.channels);

    Some(StreamDescriptor {
      itag,
      container,
      kind,
      video_codec,
      audio_codec,
      mime,
      codecs,
      bitrate: item
        .get("averageBitrate")
        .or_else(|| item.get("bitrate"))
        .and_then(value_as_u64)
        .unwrap_or(0),
      width: item.get("width").and_then(value_as_u64).map(|w| w as u32),
      height: item
        .get("height")
        .and_then(value_as_u64)
        .map(|h| h as u32)
        .or(spec.height),
      fps: item
        .get("fps")
        .and_then(value_as_u64)
        .map(|f| f as u32)
        .or(spec.fps),
      hdr,
      spatial_audio: spec.spatial_audio,
      stereo_3d,
      vr,
      channels,
      audio_sample_rate: item
        .get("audioSampleRate")
        .and_then(value_as_u64)
        .map(|r| r as u32),
      language,
      audio_role,
      default_audio,
      drc: item.get("isDrc").and_then(|v| v.as_bool()).unwrap_or(false),
      source,
      user_agent: None,
      init_range: parse_range(item, "initRange"),
      index_range: parse_range(item, "indexRange"),
      content_length: item.get("contentLength").and_then(value_as_u64),
      approx_duration_ms: item.get("approxDurationMs").and_then(value_as_u64),
      live,
      preferred_audio: false,
      manual_priority: 0,
      sort_key: SortKey::default(),
    })
  }

  /// Descriptor for a live stream reachable only through its HLS playlist.
  pub fn live_hls_descriptor(manifest_url: &str) -> StreamDescriptor {
    let mut d = Self::synthetic_descriptor(ITAG_HLS_LIVE, manifest_url);
    d.mime = "application/x-mpegURL".to_string();
    d.container = Container::MpegTs;
    d.live = true;
    d
  }

  /// Descriptor pointing at an upstream-provided DASH manifest.
  pub fn remote_dash_descriptor(manifest_url: &str) -> StreamDescriptor {
    let mut d = Self::synthetic_descriptor(ITAG_REMOTE_DASH, manifest_url);
    d.mime = "application/dash+xml".to_string();
    d
  }

  fn synthetic_descriptor(itag: u32, url: &str) -> StreamDescriptor {
    StreamDescriptor {
      itag,
      container: Container::Unknown,
      kind: MediaKind::Muxed,
      video_codec: None,
      audio_codec: None,
      mime: String::new(),
      codecs: String::new(),
      bitrate: 0,
      width: None,
      height: None,
      fps: None,
      hdr: false,
      spatial_audio: false,
      stereo_3d: false,
      vr: false,
      channels: None,
      audio_sample_rate: None,
      language: None,
      audio_role: None,
      default_audio: false,
      drc: false,
      source: StreamSource::Direct(url.to_string()),
      user_agent: None,
      init_range: None,
      index_range: None,
      content_length: None,
      approx_duration_ms: None,
      live: false,
      preferred_audio: false,
      // Whole-manifest entries outrank any single file.
      manual_priority: 1,
      sort_key: SortKey::default(),
    }
  }
}

impl StreamDescriptor {
  pub fn is_synthetic(&self) -> bool {
    self.itag == ITAG_HLS_LIVE || self.itag == ITAG_REMOTE_DASH
  }
}
