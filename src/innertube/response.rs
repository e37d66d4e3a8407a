use std::collections::HashSet;

use serde_json::Value;

use crate::innertube::personas::Persona;

/// Outcome classes for one persona attempt, derived from the transport
/// status plus keyword matching on the playability verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
  Ok,
  LiveOffline,
  AuthRequired,
  ReauthRequired,
  Abort,
  Skip,
  Retry,
  Unknown,
}

#[derive(Debug, Clone)]
pub struct Classified {
  pub class: ResponseClass,
  pub reason: Option<String>,
}

impl Classified {
  fn new(class: ResponseClass, reason: Option<String>) -> Self {
    Self { class, reason }
  }
}

/// Classifies one player response. Pure over (status, body) so every branch
/// is testable without network I/O.
pub fn classify(status: u16, body: &Value) -> Classified {
  match status {
    401 => return Classified::new(ResponseClass::ReauthRequired, None),
    403 => return Classified::new(ResponseClass::AuthRequired, None),
    429 => return Classified::new(ResponseClass::Retry, None),
    s if s >= 500 => return Classified::new(ResponseClass::Retry, None),
    _ => {}
  }

  let Some(playability) = body.get("playabilityStatus") else {
    return Classified::new(ResponseClass::Unknown, None);
  };
  let verdict = playability
    .get("status")
    .and_then(|s| s.as_str())
    .unwrap_or("UNKNOWN");
  let reason = playability_reason(playability);
  let lowered = reason.as_deref().unwrap_or("").to_lowercase();

  let class = match verdict {
    "OK" => ResponseClass::Ok,
    "LIVE_STREAM_OFFLINE" => ResponseClass::LiveOffline,
    "ERROR" => ResponseClass::Abort,
    "LOGIN_REQUIRED" | "CONTENT_CHECK_REQUIRED" | "AGE_CHECK_REQUIRED" => {
      ResponseClass::AuthRequired
    }
    "UNPLAYABLE" => {
      if lowered.contains("not available on this app")
        || lowered.contains("latest version of")
      {
        ResponseClass::Skip
      } else if lowered.contains("members") || lowered.contains("join this channel") {
        ResponseClass::AuthRequired
      } else if lowered.contains("premiere") {
        ResponseClass::LiveOffline
      } else {
        ResponseClass::Abort
      }
    }
    _ => ResponseClass::Unknown,
  };
  Classified::new(class, reason)
}

fn playability_reason(playability: &Value) -> Option<String> {
  if let Some(reason) = playability.get("reason").and_then(|r| r.as_str()) {
    return Some(reason.to_string());
  }
  playability
    .get("errorScreen")
    .and_then(|e| e.get("playerErrorMessageRenderer"))
    .and_then(|r| r.get("reason"))
    .and_then(|r| r.get("simpleText"))
    .and_then(|t| t.as_str())
    .map(|s| s.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct VideoMetadata {
  pub id: String,
  pub title: String,
  pub author: String,
  pub channel_id: String,
  pub duration_ms: u64,
  pub live: bool,
  pub live_content: bool,
}

impl VideoMetadata {
  pub fn from_video_details(details: &Value) -> Option<Self> {
    let id = details.get("videoId").and_then(|v| v.as_str())?;
    let duration_ms = details
      .get("lengthSeconds")
      .and_then(|v| v.as_str())
      .and_then(|s| s.parse::<u64>().ok())
      .map(|s| s * 1000)
      .unwrap_or(0);
    Some(Self {
      id: id.to_string(),
      title: details
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string(),
      author: details
        .get("author")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string(),
      channel_id: details
        .get("channelId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string(),
      duration_ms,
      live: details
        .get("isLive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false),
      live_content: details
        .get("isLiveContent")
        .and_then(|v| v.as_bool())
        .unwrap_or(false),
    })
  }
}

/// One raw stream item plus the identity that produced it: stream byte
/// requests must replay the same user agent or the edge rejects them.
#[derive(Debug, Clone)]
pub struct RawStream {
  pub item: Value,
  pub user_agent: &'static str,
  /// Listed under `formats` (one muxed file) rather than `adaptiveFormats`.
  pub progressive: bool,
}

impl RawStream {
  pub fn itag(&self) -> Option<i64> {
    self.item.get("itag").and_then(|v| v.as_i64())
  }
}

/// Accumulates complementary data across OK responses. First non-empty value
/// wins per field; stream items deduplicate by itag, with later personas only
/// filling fields the first one left missing.
#[derive(Debug, Default)]
pub struct AggregatedPlayback {
  pub video: Option<VideoMetadata>,
  pub streams: Vec<RawStream>,
  pub hls_manifest_url: Option<String>,
  pub dash_manifest_url: Option<String>,
  pub caption_tracks: Vec<Value>,
  pub visitor_data: Option<String>,
  seen_itags: HashSet<i64>,
}

impl AggregatedPlayback {
  pub fn capture_visitor_data(&mut self, body: &Value) {
    if self.visitor_data.is_some() {
      return;
    }
    self.visitor_data = body
      .get("responseContext")
      .and_then(|r| r.get("visitorData"))
      .and_then(|v| v.as_str())
      .map(|s| s.to_string());
  }

  pub fn absorb(&mut self, persona: &Persona, body: &Value) {
    self.capture_visitor_data(body);

    if self.video.is_none() {
      self.video = body
        .get("videoDetails")
        .and_then(VideoMetadata::from_video_details);
    }

    if let Some(streaming) = body.get("streamingData") {
      if self.hls_manifest_url.is_none() {
        self.hls_manifest_url = streaming
          .get("hlsManifestUrl")
          .and_then(|v| v.as_str())
          .map(|s| s.to_string());
      }
      if self.dash_manifest_url.is_none() {
        self.dash_manifest_url = streaming
          .get("dashManifestUrl")
          .and_then(|v| v.as_str())
          .map(|s| s.to_string());
      }
      for (key, progressive) in [("formats", true), ("adaptiveFormats", false)] {
        let Some(items) = streaming.get(key).and_then(|v| v.as_array()) else {
          continue;
        };
        for item in items {
          let Some(itag) = item.get("itag").and_then(|v| v.as_i64()) else {
            continue;
          };
          if self.seen_itags.insert(itag) {
            self.streams.push(RawStream {
              item: item.clone(),
              user_agent: persona.user_agent,
              progressive,
            });
          } else {
            self.backfill(itag, item);
          }
        }
      }
    }

    if self.caption_tracks.is_empty() {
      if let Some(tracks) = body
        .get("captions")
        .and_then(|c| c.get("playerCaptionsTracklistRenderer"))
        .and_then(|r| r.get("captionTracks"))
        .and_then(|t| t.as_array())
      {
        self.caption_tracks = tracks.clone();
      }
    }
  }

  fn backfill(&mut self, itag: i64, item: &Value) {
    let Some(existing) = self.streams.iter_mut().find(|s| s.itag() == Some(itag)) else {
      return;
    };
    if let (Some(target), Some(source)) = (existing.item.as_object_mut(), item.as_object()) {
      for (key, value) in source {
        target
          .entry(key.clone())
          .or_insert_with(|| value.clone());
      }
    }
  }

  pub fn has_streams(&self) -> bool {
    !self.streams.is_empty()
      || self.hls_manifest_url.is_some()
      || self.dash_manifest_url.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::innertube::personas::{ANDROID, IOS};
  use serde_json::json;

  #[test]
  fn transport_statuses_classify_before_body_inspection() {
    assert_eq!(classify(401, &Value::Null).class, ResponseClass::ReauthRequired);
    assert_eq!(classify(403, &Value::Null).class, ResponseClass::AuthRequired);
    assert_eq!(classify(429, &Value::Null).class, ResponseClass::Retry);
    assert_eq!(classify(503, &Value::Null).class, ResponseClass::Retry);
  }

  #[test]
  fn playability_verdicts_map_to_classes() {
    let cases = [
      (json!({"status": "OK"}), ResponseClass::Ok),
      (
        json!({"status": "LIVE_STREAM_OFFLINE", "reason": "Offline"}),
        ResponseClass::LiveOffline,
      ),
      (
        json!({"status": "ERROR", "reason": "This video is unavailable"}),
        ResponseClass::Abort,
      ),
      (
        json!({"status": "LOGIN_REQUIRED", "reason": "Sign in to confirm your age"}),
        ResponseClass::AuthRequired,
      ),
      (
        json!({"status": "UNPLAYABLE", "reason": "This video is not available on this app"}),
        ResponseClass::Skip,
      ),
      (
        json!({"status": "UNPLAYABLE", "reason": "Join this channel to get access"}),
        ResponseClass::AuthRequired,
      ),
      (
        json!({"status": "UNPLAYABLE", "reason": "Video not available in your country"}),
        ResponseClass::Abort,
      ),
      (json!({"status": "SOMETHING_NEW"}), ResponseClass::Unknown),
    ];
    for (playability, expected) in cases {
      let body = json!({ "playabilityStatus": playability });
      assert_eq!(classify(200, &body).class, expected, "body: {body}");
    }
  }

  #[test]
  fn reason_falls_back_to_the_error_screen() {
    let body = json!({
      "playabilityStatus": {
        "status": "ERROR",
        "errorScreen": {
          "playerErrorMessageRenderer": {
            "reason": { "simpleText": "Video unavailable" }
          }
        }
      }
    });
    assert_eq!(classify(200, &body).reason.as_deref(), Some("Video unavailable"));
  }

  #[test]
  fn missing_playability_is_unknown() {
    assert_eq!(classify(200, &json!({})).class, ResponseClass::Unknown);
  }

  fn ok_body(itags: &[(i64, Value)]) -> Value {
    let formats: Vec<Value> = itags
      .iter()
      .map(|(itag, extra)| {
        let mut item = json!({ "itag": itag });
        if let (Some(target), Some(source)) = (item.as_object_mut(), extra.as_object()) {
          for (k, v) in source {
            target.insert(k.clone(), v.clone());
          }
        }
        item
      })
      .collect();
    json!({
      "responseContext": { "visitorData": "visitor-1" },
      "playabilityStatus": { "status": "OK" },
      "videoDetails": {
        "videoId": "abc123def45",
        "title": "Example",
        "author": "Channel",
        "lengthSeconds": "61",
        "isLive": false
      },
      "streamingData": { "adaptiveFormats": formats }
    })
  }

  #[test]
  fn first_persona_wins_itag_dedup_and_later_ones_backfill() {
    let mut aggregate = AggregatedPlayback::default();
    aggregate.absorb(&ANDROID, &ok_body(&[(140, json!({"bitrate": 130000}))]));
    aggregate.absorb(
      &IOS,
      &ok_body(&[
        (140, json!({"bitrate": 999, "audioQuality": "AUDIO_QUALITY_MEDIUM"})),
        (251, json!({"bitrate": 160000})),
      ]),
    );

    assert_eq!(aggregate.streams.len(), 2);
    let first = &aggregate.streams[0];
    assert_eq!(first.itag(), Some(140));
    // existing field kept, missing field filled
    assert_eq!(first.item["bitrate"], 130000);
    assert_eq!(first.item["audioQuality"], "AUDIO_QUALITY_MEDIUM");
    assert_eq!(first.user_agent, ANDROID.user_agent);
    assert_eq!(aggregate.streams[1].user_agent, IOS.user_agent);
  }

  #[test]
  fn items_remember_which_list_they_came_from() {
    let mut body = ok_body(&[(251, json!({}))]);
    body["streamingData"]["formats"] = json!([{ "itag": 18 }]);
    let mut aggregate = AggregatedPlayback::default();
    aggregate.absorb(&ANDROID, &body);

    let by_itag = |itag: i64| {
      aggregate
        .streams
        .iter()
        .find(|s| s.itag() == Some(itag))
        .unwrap()
    };
    assert!(by_itag(18).progressive);
    assert!(!by_itag(251).progressive);
  }

  #[test]
  fn metadata_and_visitor_data_take_first_value() {
    let mut aggregate = AggregatedPlayback::default();
    aggregate.absorb(&ANDROID, &ok_body(&[]));
    let mut second = ok_body(&[]);
    second["responseContext"]["visitorData"] = json!("visitor-2");
    second["videoDetails"]["title"] = json!("Other");
    aggregate.absorb(&IOS, &second);

    assert_eq!(aggregate.visitor_data.as_deref(), Some("visitor-1"));
    assert_eq!(aggregate.video.as_ref().map(|v| v.title.as_str()), Some("Example"));
    assert_eq!(aggregate.video.as_ref().map(|v| v.duration_ms), Some(61_000));
  }

  #[test]
  fn manifest_urls_count_as_streams() {
    let mut aggregate = AggregatedPlayback::default();
    assert!(!aggregate.has_streams());
    let body = json!({
      "playabilityStatus": { "status": "OK" },
      "streamingData": { "hlsManifestUrl": "https://example.com/index.m3u8" }
    });
    aggregate.absorb(&IOS, &body);
    assert!(aggregate.has_streams());
    assert_eq!(
      aggregate.hls_manifest_url.as_deref(),
      Some("https://example.com/index.m3u8")
    );
  }
}
