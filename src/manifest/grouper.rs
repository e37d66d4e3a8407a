use tracing::debug;

use crate::configs::ResolverConfig;
use crate::formats::scorer::{QualityScorer, SortKey};
use crate::formats::stream::{
  AudioCodec, AudioRole, Container, MediaKind, StreamDescriptor, VideoCodec,
};

/// Identity of one adaptation set. Video keys ignore the audio fields and
/// vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClusterKey {
  pub container: Container,
  pub video_codec: Option<VideoCodec>,
  pub audio_codec: Option<AudioCodec>,
  /// Resolution tier for video, channel count for audio.
  pub bucket: u32,
  pub language: Option<String>,
  pub role: Option<AudioRole>,
}

#[derive(Debug, Clone)]
pub struct StreamCluster {
  pub key: ClusterKey,
  pub label: String,
  /// DASH Role@value. The preferred audio cluster is always "main".
  pub dash_role: &'static str,
  pub preferred: bool,
  /// Members ordered best-first; becomes the Representation order.
  pub streams: Vec<StreamDescriptor>,
}

impl StreamCluster {
  pub fn best(&self) -> SortKey {
    self.streams.first().map(|s| s.sort_key).unwrap_or_default()
  }

  pub fn max_height(&self) -> u32 {
    self.streams.iter().filter_map(|s| s.height).max().unwrap_or(0)
  }
}

#[derive(Debug, Clone, Default)]
pub struct GroupedStreams {
  pub video: Vec<StreamCluster>,
  pub audio: Vec<StreamCluster>,
}

impl GroupedStreams {
  pub fn is_empty(&self) -> bool {
    self.video.is_empty() && self.audio.is_empty()
  }

  /// Drops a video cluster when another one in the same resolution tier
  /// ranks higher and reaches at least the same height.
  pub fn drop_covered_video(&mut self) {
    let snapshot: Vec<(ClusterKey, u32, SortKey)> = self
      .video
      .iter()
      .map(|c| (c.key.clone(), c.max_height(), c.best()))
      .collect();
    self.video.retain(|c| {
      let covered = snapshot.iter().any(|(key, height, best)| {
        *key != c.key
          && key.bucket == c.key.bucket
          && *height >= c.max_height()
          && *best > c.best()
      });
      if covered {
        debug!(label = %c.label, "dropping video set covered by a superior codec");
      }
      !covered
    });
  }
}

/// Filters raw descriptors by policy, resolves the preferred audio track and
/// folds what survives into per-adaptation-set clusters.
pub struct AdaptiveStreamGrouper<'a> {
  config: &'a ResolverConfig,
}

impl<'a> AdaptiveStreamGrouper<'a> {
  pub fn new(config: &'a ResolverConfig) -> Self {
    Self { config }
  }

  pub fn group(&self, streams: Vec<StreamDescriptor>) -> GroupedStreams {
    let mut kept: Vec<StreamDescriptor> = streams
      .into_iter()
      .filter(|s| self.passes_gates(s))
      .collect();
    drop_drc_twins(&mut kept);

    if let Some((language, role)) = preferred_audio_track(
      &kept,
      &self.config.base_language,
      self.config.prefer_dubbed_audio,
    ) {
      for s in kept.iter_mut().filter(|s| s.kind == MediaKind::Audio) {
        s.preferred_audio = s.language_base() == language && s.audio_role == role;
      }
    }

    let mut grouped = GroupedStreams::default();
    for stream in kept {
      match stream.kind {
        MediaKind::Video => push_into(&mut grouped.video, video_key(&stream), stream),
        MediaKind::Audio => push_into(&mut grouped.audio, audio_key(&stream), stream),
        MediaKind::Muxed => {
          debug!(itag = stream.itag, "progressive stream has no place in an adaptive manifest");
        }
      }
    }

    for cluster in &mut grouped.video {
      QualityScorer::rank(&mut cluster.streams);
      cluster.dash_role = "main";
      cluster.label = format!(
        "{} {}",
        codec_word(cluster.key.video_codec),
        tier_word(cluster.key.bucket)
      );
    }
    for cluster in &mut grouped.audio {
      QualityScorer::rank(&mut cluster.streams);
      cluster.preferred = cluster.streams.iter().any(|s| s.preferred_audio);
      cluster.dash_role = if cluster.preferred {
        "main"
      } else {
        cluster.key.role.map(AudioRole::dash_role).unwrap_or("alternate")
      };
      cluster.label = match &cluster.key.language {
        Some(lang) => format!("{lang} {}", role_word(cluster.key.role)),
        None => role_word(cluster.key.role).to_string(),
      };
    }

    grouped.video.sort_by(|a, b| b.best().cmp(&a.best()));
    grouped.audio.sort_by(|a, b| {
      let rank = |c: &StreamCluster| {
        (
          !c.preferred,
          effective_priority(c.key.role, false),
          std::cmp::Reverse(c.best()),
        )
      };
      rank(a).cmp(&rank(b))
    });
    grouped
  }

  fn passes_gates(&self, s: &StreamDescriptor) -> bool {
    let gates = &self.config.features;
    let rejected = (s.hdr && !gates.hdr)
      || (s.fps.unwrap_or(0) > 30 && !gates.high_fps)
      || (s.channels.unwrap_or(0) > 2 && !gates.multichannel)
      || (s.spatial_audio && !gates.spatial_audio)
      || (s.vr && !gates.vr)
      || (s.stereo_3d && !gates.stereo_3d)
      || matches!(
        s.video_codec,
        Some(VideoCodec::Vp9 | VideoCodec::Vp9Profile2) if !self.config.allow_vp9
      )
      || matches!(s.video_codec, Some(VideoCodec::Av1) if !self.config.allow_av1);
    if rejected {
      debug!(itag = s.itag, "stream rejected by feature policy");
    }
    !rejected
  }
}

/// Loudness-normalized variants duplicate an existing track; keep the
/// untouched one when both arrived.
fn drop_drc_twins(streams: &mut Vec<StreamDescriptor>) {
  let clean: Vec<(Option<String>, Option<AudioCodec>, Option<u32>)> = streams
    .iter()
    .filter(|s| s.kind == MediaKind::Audio && !s.drc)
    .map(|s| (s.language_base(), s.audio_codec, s.channels))
    .collect();
  streams.retain(|s| {
    let twin = s.drc && clean.contains(&(s.language_base(), s.audio_codec, s.channels));
    if twin {
      debug!(itag = s.itag, "dropping loudness-normalized twin");
    }
    !twin
  });
}

/// Original outranks dub outranks everything else, unless dubs are asked for.
/// Untagged tracks rank last.
fn effective_priority(role: Option<AudioRole>, prefer_dub: bool) -> u8 {
  match role {
    Some(AudioRole::Original) if prefer_dub => 1,
    Some(AudioRole::Dub) if prefer_dub => 0,
    Some(r) => r.priority(),
    None => 6,
  }
}

/// Picks the one `(language, role)` pair that gets the "main" slot. Tracks in
/// the configured language win; otherwise the upstream default track is
/// promoted, then the best-ranked role.
fn preferred_audio_track(
  streams: &[StreamDescriptor],
  base_language: &str,
  prefer_dub: bool,
) -> Option<(Option<String>, Option<AudioRole>)> {
  let base = base_language.to_ascii_lowercase();
  let mut candidates: Vec<(Option<String>, Option<AudioRole>, bool)> = Vec::new();
  for s in streams.iter().filter(|s| s.kind == MediaKind::Audio) {
    let language = s.language_base();
    match candidates
      .iter_mut()
      .find(|c| c.0 == language && c.1 == s.audio_role)
    {
      Some(c) => c.2 |= s.default_audio,
      None => candidates.push((language, s.audio_role, s.default_audio)),
    }
  }
  if candidates.is_empty() {
    return None;
  }

  if let Some(best) = candidates
    .iter()
    .filter(|c| c.0.as_deref() == Some(base.as_str()))
    .min_by_key(|c| effective_priority(c.1, prefer_dub))
  {
    return Some((best.0.clone(), best.1));
  }

  let best = candidates
    .iter()
    .min_by_key(|c| (!c.2, effective_priority(c.1, prefer_dub)))?;
  debug!(
    language = best.0.as_deref().unwrap_or(""),
    "configured audio language absent, promoting fallback track"
  );
  Some((best.0.clone(), best.1))
}

fn push_into(clusters: &mut Vec<StreamCluster>, key: ClusterKey, stream: StreamDescriptor) {
  match clusters.iter_mut().find(|c| c.key == key) {
    Some(c) => c.streams.push(stream),
    None => clusters.push(StreamCluster {
      key,
      label: String::new(),
      dash_role: "main",
      preferred: false,
      streams: vec![stream],
    }),
  }
}

/// SD under 720, HD up to 1080, UHD above.
fn resolution_tier(height: Option<u32>) -> u32 {
  match height.unwrap_or(0) {
    0..=719 => 0,
    720..=1080 => 1,
    _ => 2,
  }
}

fn video_key(s: &StreamDescriptor) -> ClusterKey {
  ClusterKey {
    container: s.container,
    video_codec: s.video_codec,
    audio_codec: None,
    bucket: resolution_tier(s.height),
    language: None,
    role: None,
  }
}

fn audio_key(s: &StreamDescriptor) -> ClusterKey {
  ClusterKey {
    container: s.container,
    video_codec: None,
    audio_codec: s.audio_codec,
    bucket: s.channels.unwrap_or(2),
    language: s.language_base(),
    role: s.audio_role,
  }
}

fn codec_word(codec: Option<VideoCodec>) -> &'static str {
  match codec {
    Some(VideoCodec::Av1) => "AV1",
    Some(VideoCodec::Vp9Profile2) => "VP9.2",
    Some(VideoCodec::Vp9) => "VP9",
    Some(VideoCodec::H264) => "H.264",
    Some(VideoCodec::Vp8) => "VP8",
    Some(VideoCodec::H263) => "H.263",
    Some(VideoCodec::Unknown) | None => "video",
  }
}

fn tier_word(bucket: u32) -> &'static str {
  match bucket {
    0 => "SD",
    1 => "HD",
    _ => "UHD",
  }
}

fn role_word(role: Option<AudioRole>) -> &'static str {
  match role {
    Some(AudioRole::Original) => "original",
    Some(AudioRole::Dub) => "dubbed",
    Some(AudioRole::AutoDub) => "auto-dubbed",
    Some(AudioRole::Secondary) => "secondary",
    Some(AudioRole::Descriptive) => "descriptive",
    Some(AudioRole::Alternate) => "alternate",
    None => "audio",
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::formats::stream::StreamSource;

  fn descriptor(itag: u32) -> StreamDescriptor {
    StreamDescriptor {
      itag,
      container: Container::Webm,
      kind: MediaKind::Audio,
      video_codec: None,
      audio_codec: Some(AudioCodec::Opus),
      mime: "audio/webm".to_string(),
      codecs: "opus".to_string(),
      bitrate: 128_000,
      width: None,
      height: None,
      fps: None,
      hdr: false,
      spatial_audio: false,
      stereo_3d: false,
      vr: false,
      channels: Some(2),
      audio_sample_rate: Some(48_000),
      language: None,
      audio_role: None,
      default_audio: false,
      drc: false,
      source: StreamSource::Direct("https://example.com/a".to_string()),
      user_agent: None,
      init_range: Some((0, 600)),
      index_range: Some((601, 1200)),
      content_length: Some(1_000_000),
      approx_duration_ms: Some(60_000),
      live: false,
      preferred_audio: false,
      manual_priority: 0,
      sort_key: SortKey::default(),
    }
  }

  fn audio_track(itag: u32, language: &str, role: AudioRole) -> StreamDescriptor {
    let mut s = descriptor(itag);
    s.language = Some(language.to_string());
    s.audio_role = Some(role);
    s
  }

  fn video_track(itag: u32, codec: VideoCodec, height: u32, fps: u32) -> StreamDescriptor {
    let mut s = descriptor(itag);
    s.kind = MediaKind::Video;
    s.audio_codec = None;
    s.channels = None;
    s.video_codec = Some(codec);
    s.height = Some(height);
    s.fps = Some(fps);
    s.container = Container::Mp4;
    s.mime = "video/mp4".to_string();
    s
  }

  #[test]
  fn original_in_base_language_takes_the_main_slot() {
    let streams = vec![
      audio_track(251, "en-US", AudioRole::Original),
      audio_track(251, "en-US", AudioRole::Dub),
      audio_track(251, "fr", AudioRole::Dub),
    ];
    let config = ResolverConfig::default();
    let grouped = AdaptiveStreamGrouper::new(&config).group(streams);

    assert_eq!(grouped.audio.len(), 3);
    let main = &grouped.audio[0];
    assert!(main.preferred);
    assert_eq!(main.dash_role, "main");
    assert_eq!(main.key.language.as_deref(), Some("en"));
    assert_eq!(main.key.role, Some(AudioRole::Original));
    for other in &grouped.audio[1..] {
      assert!(!other.preferred);
      assert_eq!(other.dash_role, "dub");
    }
  }

  #[test]
  fn dub_preference_flips_the_main_slot() {
    let streams = vec![
      audio_track(251, "en", AudioRole::Original),
      audio_track(251, "en", AudioRole::Dub),
    ];
    let mut config = ResolverConfig::default();
    config.prefer_dubbed_audio = true;
    let grouped = AdaptiveStreamGrouper::new(&config).group(streams);
    assert_eq!(grouped.audio[0].key.role, Some(AudioRole::Dub));
    assert!(grouped.audio[0].preferred);
  }

  #[test]
  fn absent_language_promotes_the_upstream_default() {
    let mut fr = audio_track(251, "fr", AudioRole::Dub);
    fr.default_audio = true;
    let es = audio_track(251, "es", AudioRole::Original);
    let config = ResolverConfig::default(); // base language "en"
    let grouped = AdaptiveStreamGrouper::new(&config).group(vec![fr, es]);
    assert_eq!(grouped.audio[0].key.language.as_deref(), Some("fr"));
    assert!(grouped.audio[0].preferred);
  }

  #[test]
  fn feature_gates_drop_disabled_families() {
    let mut hdr = video_track(335, VideoCodec::Vp9Profile2, 1080, 60);
    hdr.hdr = true;
    let sixty = video_track(299, VideoCodec::H264, 1080, 60);
    let mut surround = descriptor(258);
    surround.channels = Some(6);
    let plain = video_track(137, VideoCodec::H264, 1080, 30);

    let config = ResolverConfig::default();
    let grouped =
      AdaptiveStreamGrouper::new(&config).group(vec![hdr, sixty, surround, plain]);

    // HDR and 6-channel go, 60fps stays under the default gates.
    assert!(grouped.audio.is_empty());
    let itags: Vec<u32> = grouped
      .video
      .iter()
      .flat_map(|c| c.streams.iter().map(|s| s.itag))
      .collect();
    assert_eq!(itags, vec![299, 137]);
  }

  #[test]
  fn same_family_streams_share_one_cluster_per_tier() {
    let streams = vec![
      video_track(243, VideoCodec::Vp9, 360, 30),
      video_track(244, VideoCodec::Vp9, 480, 30),
      video_track(248, VideoCodec::Vp9, 1080, 30),
    ];
    let config = ResolverConfig::default();
    let grouped = AdaptiveStreamGrouper::new(&config).group(streams);

    assert_eq!(grouped.video.len(), 2);
    // HD tier ranks above SD, members best-first inside the SD set
    assert_eq!(grouped.video[0].streams[0].itag, 248);
    let sd: Vec<u32> = grouped.video[1].streams.iter().map(|s| s.itag).collect();
    assert_eq!(sd, vec![244, 243]);
  }

  #[test]
  fn loudness_normalized_twin_is_dropped() {
    let plain = audio_track(140, "en", AudioRole::Original);
    let mut drc = audio_track(140, "en", AudioRole::Original);
    drc.drc = true;
    let config = ResolverConfig::default();
    let grouped = AdaptiveStreamGrouper::new(&config).group(vec![drc, plain]);
    assert_eq!(grouped.audio.len(), 1);
    assert_eq!(grouped.audio[0].streams.len(), 1);
    assert!(!grouped.audio[0].streams[0].drc);
  }

  #[test]
  fn covered_codec_filter_removes_the_weaker_family() {
    let config = ResolverConfig::default();
    let mut grouped = AdaptiveStreamGrouper::new(&config).group(vec![
      video_track(399, VideoCodec::Av1, 1080, 30),
      video_track(137, VideoCodec::H264, 1080, 30),
      video_track(138, VideoCodec::H264, 4320, 30),
    ]);
    assert_eq!(grouped.video.len(), 3);
    grouped.drop_covered_video();

    let codecs: Vec<Option<VideoCodec>> =
      grouped.video.iter().map(|c| c.key.video_codec).collect();
    // the 8K set sits alone in its tier and survives
    assert!(codecs.contains(&Some(VideoCodec::Av1)));
    assert_eq!(
      grouped
        .video
        .iter()
        .filter(|c| c.key.video_codec == Some(VideoCodec::H264))
        .count(),
      1
    );
  }
}
