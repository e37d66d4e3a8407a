use serde_json::{Value, json};

use crate::innertube::personas::Persona;

/// InnerTube API base endpoint (googleapis is more stable and avoids some
/// geo-restrictions that www.youtube.com may impose).
pub const INNERTUBE_API: &str = "https://youtubei.googleapis.com";

/// Inputs shared by every persona attempt within one resolution call.
#[derive(Debug, Clone, Default)]
pub struct PlayerRequest {
  pub video_id: String,
  pub visitor_data: Option<String>,
  pub signature_timestamp: Option<u32>,
}

/// Build the InnerTube context block for a persona, passing visitorData
/// through when a previous attempt already produced one.
pub fn build_context(persona: &Persona, visitor_data: Option<&str>) -> Value {
  let mut client = json!({
    "clientName": persona.client_name,
    "clientVersion": persona.client_version,
    "userAgent": persona.user_agent,
    "hl": "en",
    "gl": "US"
  });

  if let Some(obj) = client.as_object_mut() {
    if let Some(v) = persona.os_name {
      obj.insert("osName".to_string(), v.into());
    }
    if let Some(v) = persona.os_version {
      obj.insert("osVersion".to_string(), v.into());
    }
    if let Some(v) = persona.device_make {
      obj.insert("deviceMake".to_string(), v.into());
    }
    if let Some(v) = persona.device_model {
      obj.insert("deviceModel".to_string(), v.into());
    }
    if let Some(v) = persona.android_sdk_version {
      obj.insert("androidSdkVersion".to_string(), v.into());
    }
    if persona.embed_url.is_some() {
      obj.insert("clientScreen".to_string(), "EMBED".into());
    }
    if let Some(vd) = visitor_data {
      obj.insert("visitorData".to_string(), vd.into());
    }
  }

  let mut context = json!({
    "client": client,
    "user": { "lockedSafetyMode": false },
    "request": { "useSsl": true }
  });
  if let Some(embed) = persona.embed_url {
    context["thirdParty"] = json!({ "embedUrl": embed });
  }
  context
}

pub fn build_player_body(persona: &Persona, request: &PlayerRequest) -> Value {
  let mut body = json!({
    "context": build_context(persona, request.visitor_data.as_deref()),
    "videoId": request.video_id,
    "contentCheckOk": true,
    "racyCheckOk": true
  });
  if let Some(params) = persona.params {
    body["params"] = json!(params);
  }
  // Signature-protected identities must state which script generation they
  // decode with, or the endpoint serves stale stream URLs.
  if persona.requires_script {
    if let Some(sts) = request.signature_timestamp {
      body["playbackContext"] = json!({
        "contentPlaybackContext": {
          "signatureTimestamp": sts,
          "html5Preference": "HTML5_PREF_WANTS"
        }
      });
    }
  }
  body
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::innertube::personas::{ANDROID, TV_EMBEDDED, WEB};

  fn request() -> PlayerRequest {
    PlayerRequest {
      video_id: "dQw4w9WgXcQ".to_string(),
      visitor_data: Some("visitor123".to_string()),
      signature_timestamp: Some(19953),
    }
  }

  #[test]
  fn body_carries_identity_and_video() {
    let body = build_player_body(&ANDROID, &request());
    assert_eq!(body["videoId"], "dQw4w9WgXcQ");
    assert_eq!(body["context"]["client"]["clientName"], "ANDROID");
    assert_eq!(body["context"]["client"]["androidSdkVersion"], "34");
    assert_eq!(body["context"]["client"]["visitorData"], "visitor123");
    assert_eq!(body["contentCheckOk"], true);
  }

  #[test]
  fn embedded_identities_claim_a_host_page() {
    let body = build_player_body(&TV_EMBEDDED, &request());
    assert_eq!(
      body["context"]["thirdParty"]["embedUrl"],
      "https://www.youtube.com/tv"
    );
    assert_eq!(body["context"]["client"]["clientScreen"], "EMBED");
    assert_eq!(body["params"], "2AMB");
  }

  #[test]
  fn script_timestamp_only_for_protected_identities() {
    let web = build_player_body(&WEB, &request());
    assert_eq!(
      web["playbackContext"]["contentPlaybackContext"]["signatureTimestamp"],
      19953
    );

    let android = build_player_body(&ANDROID, &request());
    assert!(android.get("playbackContext").is_none());
  }

  #[test]
  fn missing_visitor_data_is_omitted() {
    let body = build_player_body(
      &ANDROID,
      &PlayerRequest {
        video_id: "abc".to_string(),
        ..PlayerRequest::default()
      },
    );
    assert!(body["context"]["client"].get("visitorData").is_none());
  }
}
