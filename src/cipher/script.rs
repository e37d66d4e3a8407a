use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use regex::Regex;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::cipher::optable::OpTable;
use crate::cipher::signature::SignatureCipherDecoder;
use crate::cipher::throttling::ThrottlingParameterCalculator;
use crate::errors::{ResolveError, Result};
use crate::formats::StreamSource;

const EMBED_PAGE: &str = "https://www.youtube.com/embed/";
const FALLBACK_WATCH_PAGE: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

/// Everything recovered from one delivered player script. Compiled once and
/// shared; the decoders inside carry their own disable latches.
pub struct CompiledScript {
  pub url: String,
  pub signature_timestamp: Option<u32>,
  pub signature: SignatureCipherDecoder,
  pub throttling: ThrottlingParameterCalculator,
}

impl CompiledScript {
  pub fn compile(url: &str, source: &str, table: &OpTable) -> Self {
    debug!(url = %url, table_version = table.version(), "compiling delivered player script");
    let signature_timestamp = Regex::new(r"(?:signatureTimestamp|sts)\s*:\s*(\d+)")
      .ok()
      .and_then(|re| re.captures(source))
      .and_then(|caps| caps.get(1))
      .and_then(|m| m.as_str().parse::<u32>().ok());
    if signature_timestamp.is_none() {
      warn!(url = %url, "delivered script carries no signature timestamp");
    }
    Self {
      url: url.to_string(),
      signature_timestamp,
      signature: SignatureCipherDecoder::compile(source, table),
      throttling: ThrottlingParameterCalculator::compile(source, table),
    }
  }
}

struct DiscoveredScript {
  url: String,
  expires_at: Instant,
}

/// Discovers the currently delivered player script and keeps one compiled
/// form per script URL. Script sources go through the injected cache so
/// neighbouring processes share the download.
pub struct PlayerScriptManager {
  client: Client,
  cache: Arc<dyn CacheStore>,
  table: OpTable,
  discovered: RwLock<Option<DiscoveredScript>>,
  compiled: DashMap<String, Arc<CompiledScript>>,
  script_ttl: Duration,
}

impl PlayerScriptManager {
  pub fn new(client: Client, cache: Arc<dyn CacheStore>, script_ttl: Duration) -> Result<Self> {
    let table = OpTable::v1()
      .map_err(|e| ResolveError::Config(format!("operation table: {e}")))?;
    Ok(Self {
      client,
      cache,
      table,
      discovered: RwLock::new(None),
      compiled: DashMap::new(),
      script_ttl,
    })
  }

  /// Compiled decoders for whatever script the player pages deliver now.
  pub async fn current(&self) -> Result<Arc<CompiledScript>> {
    let url = self.current_script_url().await?;
    self.compiled_for(&url).await
  }

  pub async fn current_script_url(&self) -> Result<String> {
    {
      let cache = self.discovered.read().await;
      if let Some(found) = &*cache {
        if Instant::now() < found.expires_at {
          return Ok(found.url.clone());
        }
      }
    }

    let mut cache = self.discovered.write().await;
    // Check again after acquiring write lock
    if let Some(found) = &*cache {
      if Instant::now() < found.expires_at {
        return Ok(found.url.clone());
      }
    }

    let url = self.discover_script_url().await?;
    *cache = Some(DiscoveredScript {
      url: url.clone(),
      expires_at: Instant::now() + self.script_ttl,
    });
    Ok(url)
  }

  /// Compiled decoders for one specific script URL. Two concurrent
  /// resolutions may both compile; the entry API keeps one visible.
  pub async fn compiled_for(&self, script_url: &str) -> Result<Arc<CompiledScript>> {
    if let Some(existing) = self.compiled.get(script_url) {
      return Ok(Arc::clone(&existing));
    }
    let source = self.fetch_script_source(script_url).await?;
    let compiled = Arc::new(CompiledScript::compile(script_url, &source, &self.table));
    let entry = self
      .compiled
      .entry(script_url.to_string())
      .or_insert(compiled);
    Ok(Arc::clone(&entry))
  }

  async fn discover_script_url(&self) -> Result<String> {
    let text = self.client.get(EMBED_PAGE).send().await?.text().await?;

    let re = Regex::new(r#""jsUrl":"([^"]+)""#)
      .map_err(|e| ResolveError::ScriptDiscovery(e.to_string()))?;
    let raw = if let Some(caps) = re.captures(&text) {
      caps[1].to_string()
    } else {
      // Fallback to watch page
      let text = self
        .client
        .get(FALLBACK_WATCH_PAGE)
        .send()
        .await?
        .text()
        .await?;
      re.captures(&text)
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
          ResolveError::ScriptDiscovery("no jsUrl on embed or watch page".into())
        })?
    };
    Ok(normalize_script_url(&raw))
  }

  async fn fetch_script_source(&self, script_url: &str) -> Result<String> {
    let key = format!("player_script:{script_url}");
    if let Some(hit) = self.cache.get(&key).await {
      debug!(url = %script_url, "player script source served from cache");
      return Ok(hit);
    }
    let response = self
      .client
      .get(script_url)
      .send()
      .await?
      .error_for_status()?;
    let source = response.text().await?;
    self.cache.set(&key, source.clone(), self.script_ttl).await;
    Ok(source)
  }
}

/// Pins the script URL's locale segment so every process compiles the same
/// bytes, and absolutizes relative paths.
fn normalize_script_url(raw: &str) -> String {
  let normalized = match Regex::new(r"/([a-z]{2}_[A-Z]{2})/") {
    Ok(re) => re.replace(raw, "/en_US/").to_string(),
    Err(_) => raw.to_string(),
  };
  if normalized.starts_with("http") {
    normalized
  } else {
    format!("https://www.youtube.com{normalized}")
  }
}

/// Per-resolution worker that turns stream sources into playable URLs.
/// Remembers the last throttling rewrite because every stream of one
/// response carries the same parameter.
pub struct StreamUnlocker {
  compiled: Arc<CompiledScript>,
  n_memo: Option<(String, String)>,
}

impl StreamUnlocker {
  pub fn new(compiled: Arc<CompiledScript>) -> Self {
    Self {
      compiled,
      n_memo: None,
    }
  }

  pub fn signature_timestamp(&self) -> Option<u32> {
    self.compiled.signature_timestamp
  }

  /// `None` means the stream cannot be made playable and must be dropped.
  pub fn unlock(&mut self, source: &StreamSource) -> Option<String> {
    match source {
      StreamSource::Direct(url) => Some(self.rewrite_throttling(url)),
      StreamSource::Ciphered(blob) => {
        let (url, scrambled, key) = split_cipher_blob(blob)?;
        let clear = self.compiled.signature.decode(&scrambled)?;
        let separator = if url.contains('?') { '&' } else { '?' };
        let with_signature =
          format!("{url}{separator}{key}={}", urlencoding::encode(&clear));
        Some(self.rewrite_throttling(&with_signature))
      }
    }
  }

  fn rewrite_throttling(&mut self, url: &str) -> String {
    let Some((value_start, value)) = locate_throttling_parameter(url) else {
      return url.to_string();
    };
    let rewritten = match &self.n_memo {
      Some((input, output)) if input == value => output.clone(),
      _ => {
        let output = self.compiled.throttling.calculate(value);
        self.n_memo = Some((value.to_string(), output.clone()));
        output
      }
    };
    if rewritten == value {
      return url.to_string();
    }
    let mut result = String::with_capacity(url.len() + rewritten.len());
    result.push_str(&url[..value_start]);
    result.push_str(&rewritten);
    result.push_str(&url[value_start + value.len()..]);
    result
  }
}

/// Splits a protection blob into (stream url, scrambled signature, query key
/// the decoded signature goes under).
fn split_cipher_blob(blob: &str) -> Option<(String, String, String)> {
  let mut url = None;
  let mut scrambled = None;
  let mut key = None;
  for part in blob.split('&') {
    if let Some((k, v)) = part.split_once('=') {
      let decoded = urlencoding::decode(v).ok()?.to_string();
      match k {
        "url" => url = Some(decoded),
        "s" => scrambled = Some(decoded),
        "sp" => key = Some(decoded),
        _ => {}
      }
    }
  }
  Some((url?, scrambled?, key.unwrap_or_else(|| "signature".to_string())))
}

fn locate_throttling_parameter(url: &str) -> Option<(usize, &str)> {
  let value_start = url
    .find("&n=")
    .map(|i| i + 3)
    .or_else(|| url.find("?n=").map(|i| i + 3))?;
  let rest = &url[value_start..];
  let value = rest.split('&').next().unwrap_or(rest);
  Some((value_start, value))
}
