use serde_json::Value;
use tracing::debug;

use crate::configs::{ResolverConfig, SubtitleMode};

/// One caption track ready for playback, URL already pointing at the VTT
/// rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleTrack {
  pub language: String,
  pub label: String,
  pub url: String,
  /// Machine-generated (speech recognition) rather than uploaded.
  pub auto_generated: bool,
  /// Machine-translated fallback synthesized for the configured language.
  pub translated: bool,
}

/// Applies the configured caption policy to the raw track list of one
/// playback response.
pub struct SubtitleResolver<'a> {
  mode: SubtitleMode,
  include_auto_generated: bool,
  base_language: &'a str,
}

struct ParsedTrack {
  language: String,
  label: String,
  base_url: String,
  auto_generated: bool,
  translatable: bool,
}

impl<'a> SubtitleResolver<'a> {
  pub fn new(config: &'a ResolverConfig) -> Self {
    Self {
      mode: config.subtitles.mode,
      include_auto_generated: config.subtitles.include_auto_generated,
      base_language: &config.base_language,
    }
  }

  pub fn resolve(&self, raw_tracks: &[Value]) -> Vec<SubtitleTrack> {
    if self.mode == SubtitleMode::None || raw_tracks.is_empty() {
      return Vec::new();
    }

    let tracks: Vec<ParsedTrack> = raw_tracks.iter().filter_map(parse_track).collect();
    match self.mode {
      SubtitleMode::None => Vec::new(),
      SubtitleMode::All => self.all_tracks(&tracks),
      SubtitleMode::CurrentLanguage => self.current_language(&tracks),
    }
  }

  fn all_tracks(&self, tracks: &[ParsedTrack]) -> Vec<SubtitleTrack> {
    tracks
      .iter()
      .filter(|t| self.auto_generated_eligible(t, tracks))
      .map(materialize)
      .collect()
  }

  fn current_language(&self, tracks: &[ParsedTrack]) -> Vec<SubtitleTrack> {
    let base = self.base_language.to_ascii_lowercase();
    let matching: Vec<&ParsedTrack> = tracks
      .iter()
      .filter(|t| language_base(&t.language) == base)
      .filter(|t| self.auto_generated_eligible(t, tracks))
      .collect();
    if !matching.is_empty() {
      return matching.into_iter().map(materialize).collect();
    }

    // Nothing in the configured language; fall back to a machine
    // translation of the best translatable track.
    let source = tracks
      .iter()
      .find(|t| t.translatable && !t.auto_generated)
      .or_else(|| tracks.iter().find(|t| t.translatable));
    let Some(source) = source else {
      debug!(language = self.base_language, "no caption track can cover the configured language");
      return Vec::new();
    };
    vec![SubtitleTrack {
      language: base.clone(),
      label: format!("{base} (auto-translated)"),
      url: vtt_url(&format!("{}&tlang={base}", source.base_url)),
      auto_generated: source.auto_generated,
      translated: true,
    }]
  }

  /// Speech-recognition tracks ride along only when asked for, or when a
  /// language has no uploaded track at all.
  fn auto_generated_eligible(&self, track: &ParsedTrack, all: &[ParsedTrack]) -> bool {
    if !track.auto_generated || self.include_auto_generated {
      return true;
    }
    !all.iter().any(|other| {
      !other.auto_generated && language_base(&other.language) == language_base(&track.language)
    })
  }
}

fn materialize(track: &ParsedTrack) -> SubtitleTrack {
  SubtitleTrack {
    language: track.language.clone(),
    label: track.label.clone(),
    url: vtt_url(&track.base_url),
    auto_generated: track.auto_generated,
    translated: false,
  }
}

fn parse_track(value: &Value) -> Option<ParsedTrack> {
  let base_url = value.get("baseUrl")?.as_str()?.to_string();
  let language = value.get("languageCode")?.as_str()?.to_string();
  let label = value
    .get("name")
    .and_then(track_name)
    .unwrap_or_else(|| language.clone());
  let auto_generated = value.get("kind").and_then(|k| k.as_str()) == Some("asr")
    || value
      .get("vssId")
      .and_then(|v| v.as_str())
      .is_some_and(|id| id.starts_with("a."));
  let translatable = value
    .get("isTranslatable")
    .and_then(|v| v.as_bool())
    .unwrap_or(false);
  Some(ParsedTrack {
    language,
    label,
    base_url,
    auto_generated,
    translatable,
  })
}

/// Track names arrive either as `simpleText` or as a `runs` list.
fn track_name(name: &Value) -> Option<String> {
  if let Some(text) = name.get("simpleText").and_then(|v| v.as_str()) {
    return Some(text.to_string());
  }
  name.get("runs")?
    .get(0)?
    .get("text")?
    .as_str()
    .map(str::to_string)
}

fn language_base(code: &str) -> String {
  code.split('-').next().unwrap_or(code).to_ascii_lowercase()
}

/// Rewrites the delivery format to VTT, replacing whatever format the track
/// list advertised.
fn vtt_url(base: &str) -> String {
  let (path, query) = match base.split_once('?') {
    Some((path, query)) => (path, Some(query)),
    None => (base, None),
  };
  let mut params: Vec<&str> = query
    .map(|q| {
      q.split('&')
        .filter(|p| !p.starts_with("fmt=") && !p.is_empty())
        .collect()
    })
    .unwrap_or_default();
  params.push("fmt=vtt");
  format!("{path}?{}", params.join("&"))
}
