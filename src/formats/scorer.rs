use crate::formats::stream::{AudioCodec, StreamDescriptor, VideoCodec};

/// Composite ranking key. Field order is the comparison order: the manual
/// override wins outright, then video quality, then audio quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct SortKey {
  pub manual: i32,
  pub video: u64,
  pub audio: u64,
}

/// Relative codec preference in hundredths, applied multiplicatively so a
/// newer codec outranks an older one at the same resolution or bitrate.
fn video_factor(codec: VideoCodec) -> u64 {
  match codec {
    VideoCodec::Av1 => 120,
    VideoCodec::Vp9Profile2 => 115,
    VideoCodec::Vp9 => 110,
    VideoCodec::H264 => 100,
    VideoCodec::Vp8 => 90,
    VideoCodec::H263 => 50,
    VideoCodec::Unknown => 10,
  }
}

fn audio_factor(codec: AudioCodec) -> u64 {
  match codec {
    AudioCodec::Opus => 110,
    AudioCodec::Aac => 100,
    AudioCodec::Eac3 => 98,
    AudioCodec::Ac3 => 96,
    AudioCodec::Vorbis => 90,
    AudioCodec::Mp3 => 80,
    AudioCodec::Dtse => 70,
    AudioCodec::Unknown => 10,
  }
}

pub struct QualityScorer;

impl QualityScorer {
  pub fn score(stream: &StreamDescriptor) -> SortKey {
    let video = match (stream.height, stream.video_codec) {
      (Some(height), Some(codec)) => u64::from(height) * video_factor(codec),
      (Some(height), None) => u64::from(height) * video_factor(VideoCodec::Unknown),
      _ => 0,
    };
    let audio = match stream.audio_codec {
      Some(codec) => stream.bitrate * audio_factor(codec),
      None => 0,
    };
    SortKey {
      manual: stream.manual_priority,
      video,
      audio,
    }
  }

  /// Recomputes every key and orders best-first. Stable, so catalog order
  /// breaks exact ties.
  pub fn rank(streams: &mut [StreamDescriptor]) {
    for stream in streams.iter_mut() {
      stream.sort_key = Self::score(stream);
    }
    streams.sort_by(|a, b| b.sort_key.cmp(&a.sort_key));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::formats::stream::{Container, MediaKind, StreamSource};

  fn video_stream(itag: u32, codec: VideoCodec, height: u32) -> StreamDescriptor {
    StreamDescriptor {
      itag,
      container: Container::Mp4,
      kind: MediaKind::Video,
      video_codec: Some(codec),
      audio_codec: None,
      mime: String::new(),
      codecs: String::new(),
      bitrate: 0,
      width: None,
      height: Some(height),
      fps: Some(30),
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
      source: StreamSource::Direct("https://example.com/v".into()),
      user_agent: None,
      init_range: None,
      index_range: None,
      content_length: None,
      approx_duration_ms: None,
      live: false,
      preferred_audio: false,
      manual_priority: 0,
      sort_key: SortKey::default(),
    }
  }

  fn audio_stream(itag: u32, codec: AudioCodec, bitrate: u64) -> StreamDescriptor {
    let mut s = video_stream(itag, VideoCodec::H264, 0);
    s.kind = MediaKind::Audio;
    s.video_codec = None;
    s.height = None;
    s.audio_codec = Some(codec);
    s.bitrate = bitrate;
    s
  }

  #[test]
  fn newer_video_codec_outranks_older_at_equal_height() {
    let ordered = [
      VideoCodec::Av1,
      VideoCodec::Vp9Profile2,
      VideoCodec::Vp9,
      VideoCodec::H264,
      VideoCodec::Vp8,
      VideoCodec::H263,
    ];
    for pair in ordered.windows(2) {
      let newer = QualityScorer::score(&video_stream(1, pair[0], 1080));
      let older = QualityScorer::score(&video_stream(2, pair[1], 1080));
      assert!(newer > older, "{:?} should outrank {:?}", pair[0], pair[1]);
    }
  }

  #[test]
  fn efficient_audio_codec_outranks_legacy_at_equal_bitrate() {
    let ordered = [
      AudioCodec::Opus,
      AudioCodec::Aac,
      AudioCodec::Eac3,
      AudioCodec::Ac3,
      AudioCodec::Vorbis,
      AudioCodec::Mp3,
      AudioCodec::Dtse,
    ];
    for pair in ordered.windows(2) {
      let better = QualityScorer::score(&audio_stream(1, pair[0], 128_000));
      let worse = QualityScorer::score(&audio_stream(2, pair[1], 128_000));
      assert!(better > worse, "{:?} should outrank {:?}", pair[0], pair[1]);
    }
  }

  #[test]
  fn height_dominates_codec_factor() {
    let hd_h264 = QualityScorer::score(&video_stream(1, VideoCodec::H264, 1080));
    let sd_av1 = QualityScorer::score(&video_stream(2, VideoCodec::Av1, 480));
    assert!(hd_h264 > sd_av1);
  }

  #[test]
  fn manual_priority_beats_any_score() {
    let mut synthetic = video_stream(1, VideoCodec::H263, 144);
    synthetic.manual_priority = 1;
    let best_regular = video_stream(2, VideoCodec::Av1, 4320);
    assert!(QualityScorer::score(&synthetic) > QualityScorer::score(&best_regular));
  }

  #[test]
  fn rank_orders_best_first() {
    let mut streams = vec![
      video_stream(18, VideoCodec::H264, 360),
      video_stream(22, VideoCodec::H264, 720),
    ];
    QualityScorer::rank(&mut streams);
    assert_eq!(streams[0].itag, 22);
    assert_eq!(streams[1].itag, 18);
  }
}
