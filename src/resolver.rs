use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::cipher::{PlayerScriptManager, StreamUnlocker};
use crate::common::{HttpClient, VideoId};
use crate::configs::{Config, ResolverConfig};
use crate::errors::{ResolveError, Result};
use crate::formats::{FormatCatalog, QualityScorer, StreamDescriptor, StreamSource};
use crate::innertube::response::AggregatedPlayback;
use crate::innertube::{
  AuthBroker, AuthorizationProvider, ClientPersonaRegistry, InnerTubeApi, PlayerApi,
  PlayerRequestOrchestrator, VideoMetadata,
};
use crate::manifest::{AdaptiveStreamGrouper, ManifestSynthesizer, SynthesizedManifest};
use crate::subtitles::{SubtitleResolver, SubtitleTrack};

/// How the flat stream list handed back to the caller is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionPolicy {
  /// Return every progressive option and let the host pick.
  AskUser,
  /// Trim progressive streams above the cutoff.
  FixedHeight(u32),
  /// The manifest carries playback; the list is only a fallback.
  FullyAdaptive,
}

impl SelectionPolicy {
  fn from_config(config: &ResolverConfig) -> Self {
    if config.use_mpd {
      Self::FullyAdaptive
    } else if config.ask_for_quality {
      Self::AskUser
    } else {
      Self::FixedHeight(config.progressive_height_cutoff)
    }
  }
}

/// Everything one successful resolution produces. Immutable once returned.
#[derive(Debug)]
pub struct ResolvedPlayback {
  pub video: VideoMetadata,
  /// Progressive (or whole-manifest) options, best first, URLs resolved.
  pub streams: Vec<StreamDescriptor>,
  pub manifest: Option<SynthesizedManifest>,
  pub subtitles: Vec<SubtitleTrack>,
}

/// The engine facade: one call takes a video identifier to playable URLs,
/// an adaptive manifest and caption tracks.
pub struct StreamResolver {
  config: Config,
  registry: ClientPersonaRegistry,
  orchestrator: PlayerRequestOrchestrator,
  scripts: PlayerScriptManager,
}

impl StreamResolver {
  pub fn new(config: Config, cache: Arc<dyn CacheStore>) -> Result<Self> {
    let client = HttpClient::new()?;
    let api: Arc<dyn PlayerApi> = Arc::new(InnerTubeApi::new(
      client.clone(),
      config.resolver.retry_attempts,
    ));
    let auth: Option<Arc<dyn AuthorizationProvider>> = match &config.auth {
      Some(auth_config) if !auth_config.refresh_tokens.is_empty() => Some(Arc::new(
        AuthBroker::new(auth_config.refresh_tokens.clone(), client),
      )),
      _ => None,
    };
    Self::with_components(config, cache, api, auth)
  }

  /// Seam for hosts that bring their own transport or credential source.
  pub fn with_components(
    config: Config,
    cache: Arc<dyn CacheStore>,
    api: Arc<dyn PlayerApi>,
    auth: Option<Arc<dyn AuthorizationProvider>>,
  ) -> Result<Self> {
    let script_client = HttpClient::new_with_timeout(Duration::from_secs(30))?;
    let scripts = PlayerScriptManager::new(
      script_client,
      cache,
      Duration::from_secs(config.resolver.script_cache_ttl_secs),
    )?;
    Ok(Self {
      registry: ClientPersonaRegistry::new(&config.resolver),
      orchestrator: PlayerRequestOrchestrator::new(api, auth),
      scripts,
      config,
    })
  }

  pub async fn resolve(&self, identifier: &str) -> Result<ResolvedPlayback> {
    let video_id = VideoId::parse(identifier);
    info!(video_id = %video_id, "resolving playback");

    let compiled = match self.scripts.current().await {
      Ok(compiled) => Some(compiled),
      Err(e) => {
        warn!(error = %e, "player script unavailable, continuing with script-free personas");
        None
      }
    };
    let signature_timestamp = compiled.as_ref().and_then(|c| c.signature_timestamp);

    let aggregate = self
      .orchestrator
      .resolve(&self.registry, &video_id, signature_timestamp)
      .await?;

    let video = aggregate.video.clone().unwrap_or_else(|| VideoMetadata {
      id: video_id.to_string(),
      title: String::new(),
      author: String::new(),
      channel_id: String::new(),
      duration_ms: 0,
      live: false,
      live_content: false,
    });

    if video.live {
      return self.resolve_live(video, &aggregate);
    }

    let mut unlocker = compiled.map(StreamUnlocker::new);
    let mut unlocked: Vec<StreamDescriptor> = Vec::new();
    for raw in &aggregate.streams {
      let Some(mut descriptor) =
        FormatCatalog::descriptor_from_item(&raw.item, raw.progressive, video.live)
      else {
        continue;
      };
      descriptor.user_agent = Some(raw.user_agent);
      let resolved = match &mut unlocker {
        Some(unlocker) => unlocker.unlock(&descriptor.source),
        None => descriptor.source.direct_url().map(str::to_string),
      };
      match resolved {
        Some(url) => {
          descriptor.source = StreamSource::Direct(url);
          unlocked.push(descriptor);
        }
        None => {
          warn!(itag = descriptor.itag, "stream url cannot be made playable, dropping");
        }
      }
    }
    QualityScorer::rank(&mut unlocked);
    let (progressive, adaptive): (Vec<_>, Vec<_>) =
      unlocked.into_iter().partition(StreamDescriptor::is_progressive);

    let subtitles = SubtitleResolver::new(&self.config.resolver).resolve(&aggregate.caption_tracks);

    let manifest = if adaptive.is_empty() {
      None
    } else {
      let mut grouped = AdaptiveStreamGrouper::new(&self.config.resolver).group(adaptive);
      if self.config.resolver.drop_covered_codecs {
        grouped.drop_covered_video();
      }
      if grouped.is_empty() {
        None
      } else {
        match ManifestSynthesizer::synthesize(&video, &grouped, &subtitles) {
          Ok(manifest) => Some(manifest),
          Err(e) => {
            warn!(error = %e, "adaptive manifest synthesis failed");
            None
          }
        }
      }
    };

    let mut streams = match SelectionPolicy::from_config(&self.config.resolver) {
      SelectionPolicy::AskUser | SelectionPolicy::FullyAdaptive => progressive,
      SelectionPolicy::FixedHeight(cutoff) => progressive
        .into_iter()
        .filter(|s| s.height.unwrap_or(0) <= cutoff)
        .collect(),
    };

    // Upstream sometimes serves a ready-made manifest where single files
    // are missing entirely.
    if streams.is_empty() && manifest.is_none() {
      if let Some(dash_url) = &aggregate.dash_manifest_url {
        streams.push(FormatCatalog::remote_dash_descriptor(dash_url));
      }
    }
    if streams.is_empty() && manifest.is_none() {
      return Err(ResolveError::NoStreamsFound);
    }

    Ok(ResolvedPlayback {
      video,
      streams,
      manifest,
      subtitles,
    })
  }

  /// Live playback rides on upstream manifests, never on synthesized ones.
  fn resolve_live(
    &self,
    video: VideoMetadata,
    aggregate: &AggregatedPlayback,
  ) -> Result<ResolvedPlayback> {
    let descriptor = if let Some(hls_url) = &aggregate.hls_manifest_url {
      FormatCatalog::live_hls_descriptor(hls_url)
    } else if let Some(dash_url) = &aggregate.dash_manifest_url {
      let mut descriptor = FormatCatalog::remote_dash_descriptor(dash_url);
      descriptor.live = true;
      descriptor
    } else {
      return Err(ResolveError::NoStreamsFound);
    };
    let mut streams = vec![descriptor];
    QualityScorer::rank(&mut streams);
    Ok(ResolvedPlayback {
      video,
      streams,
      manifest: None,
      subtitles: Vec::new(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryCache;
  use crate::formats::catalog::ITAG_HLS_LIVE;
  use crate::innertube::api::PlayerCallOutcome;
  use crate::innertube::personas::Persona;
  use crate::innertube::request::PlayerRequest;
  use async_trait::async_trait;
  use serde_json::{Value, json};
  use std::collections::VecDeque;
  use std::sync::Mutex;

  struct CannedApi {
    outcomes: Mutex<VecDeque<Value>>,
  }

  impl CannedApi {
    fn repeating(body: Value) -> Arc<Self> {
      // every persona in the fan-out sees the same response
      Arc::new(Self {
        outcomes: Mutex::new(VecDeque::from(vec![body; 8])),
      })
    }
  }

  #[async_trait]
  impl PlayerApi for CannedApi {
    async fn player(
      &self,
      _persona: &Persona,
      _request: &PlayerRequest,
      _authorization: Option<&str>,
    ) -> Result<PlayerCallOutcome> {
      let body = self
        .outcomes
        .lock()
        .unwrap()
        .pop_front()
        .expect("canned outcomes exhausted");
      Ok(PlayerCallOutcome { status: 200, body })
    }
  }

  fn resolver_with(config: Config, api: Arc<dyn PlayerApi>) -> StreamResolver {
    StreamResolver::with_components(config, Arc::new(MemoryCache::new()), api, None).unwrap()
  }

  fn details() -> Value {
    json!({
      "videoId": "abc123def45",
      "title": "Example",
      "author": "Channel",
      "lengthSeconds": "61"
    })
  }

  fn progressive_body() -> Value {
    json!({
      "playabilityStatus": { "status": "OK" },
      "videoDetails": details(),
      "streamingData": {
        "formats": [
          {
            "itag": 18,
            "url": "https://r1.example.com/18",
            "mimeType": "video/mp4; codecs=\"avc1.42001E, mp4a.40.2\"",
            "bitrate": 500_000,
            "width": 640, "height": 360
          },
          {
            "itag": 22,
            "url": "https://r1.example.com/22",
            "mimeType": "video/mp4; codecs=\"avc1.64001F, mp4a.40.2\"",
            "bitrate": 2_000_000,
            "width": 1280, "height": 720
          }
        ]
      }
    })
  }

  #[tokio::test]
  async fn progressive_only_video_yields_the_scored_list() {
    let resolver = resolver_with(
      Config::default(),
      CannedApi::repeating(progressive_body()),
    );
    let playback = resolver.resolve("abc123def45").await.unwrap();

    let itags: Vec<u32> = playback.streams.iter().map(|s| s.itag).collect();
    assert_eq!(itags, vec![22, 18]);
    assert!(playback.manifest.is_none());
    assert!(playback
      .streams
      .iter()
      .all(|s| s.source.direct_url().is_some()));
    assert!(playback.streams[0].user_agent.is_some());
  }

  #[tokio::test]
  async fn height_cutoff_trims_the_progressive_list() {
    let mut config = Config::default();
    config.resolver.progressive_height_cutoff = 480;
    let resolver = resolver_with(config, CannedApi::repeating(progressive_body()));
    let playback = resolver.resolve("abc123def45").await.unwrap();
    let itags: Vec<u32> = playback.streams.iter().map(|s| s.itag).collect();
    assert_eq!(itags, vec![18]);
  }

  #[tokio::test]
  async fn ask_for_quality_returns_everything_scored() {
    let mut config = Config::default();
    config.resolver.ask_for_quality = true;
    config.resolver.progressive_height_cutoff = 480;
    let resolver = resolver_with(config, CannedApi::repeating(progressive_body()));
    let playback = resolver.resolve("abc123def45").await.unwrap();
    let itags: Vec<u32> = playback.streams.iter().map(|s| s.itag).collect();
    assert_eq!(itags, vec![22, 18]);
  }

  #[tokio::test]
  async fn adaptive_streams_synthesize_a_manifest() {
    let body = json!({
      "playabilityStatus": { "status": "OK" },
      "videoDetails": details(),
      "streamingData": {
        "adaptiveFormats": [
          {
            "itag": 137,
            "url": "https://r1.example.com/137",
            "mimeType": "video/mp4; codecs=\"avc1.640028\"",
            "bitrate": 4_500_000,
            "width": 1920, "height": 1080, "fps": 30,
            "initRange": { "start": "0", "end": "740" },
            "indexRange": { "start": "741", "end": "2200" }
          },
          {
            "itag": 140,
            "url": "https://r1.example.com/140",
            "mimeType": "audio/mp4; codecs=\"mp4a.40.2\"",
            "bitrate": 130_000,
            "audioSampleRate": "44100",
            "audioChannels": 2,
            "initRange": { "start": "0", "end": "600" },
            "indexRange": { "start": "601", "end": "1200" }
          }
        ]
      }
    });
    let resolver = resolver_with(Config::default(), CannedApi::repeating(body));
    let playback = resolver.resolve("abc123def45").await.unwrap();

    assert!(playback.streams.is_empty());
    let manifest = playback.manifest.expect("manifest");
    assert!(manifest.document.contains("urn:mpeg:dash:schema:mpd:2011"));
    assert!(manifest.document.contains("avc1.640028"));
    assert!(manifest.document.contains("mp4a.40.2"));
    // a relay needs the persona user agent to replay range requests
    assert!(manifest.user_agent.is_some());
  }

  #[tokio::test]
  async fn live_with_only_an_hls_manifest_returns_one_live_descriptor() {
    let mut live_details = details();
    live_details["isLive"] = json!(true);
    let body = json!({
      "playabilityStatus": { "status": "OK" },
      "videoDetails": live_details,
      "streamingData": {
        "hlsManifestUrl": "https://manifest.example.com/index.m3u8"
      }
    });
    let resolver = resolver_with(Config::default(), CannedApi::repeating(body));
    let playback = resolver.resolve("abc123def45").await.unwrap();

    assert_eq!(playback.streams.len(), 1);
    let descriptor = &playback.streams[0];
    assert!(descriptor.live);
    assert_eq!(descriptor.itag, ITAG_HLS_LIVE);
    assert_eq!(
      descriptor.source.direct_url(),
      Some("https://manifest.example.com/index.m3u8")
    );
    assert!(playback.manifest.is_none());
  }
}
