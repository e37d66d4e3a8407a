use std::sync::Arc;

use tracing::{error, info};

use tubelink::cache::MemoryCache;
use tubelink::configs::Config;
use tubelink::resolver::StreamResolver;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  let config = Config::load().unwrap_or_else(|e| {
    eprintln!("falling back to default configuration: {e}");
    Config::default()
  });

  let env_filter = config.logging.clone().unwrap_or_default().env_filter();
  tracing_subscriber::fmt().with_env_filter(env_filter).init();

  let Some(identifier) = std::env::args().nth(1) else {
    eprintln!("usage: tubelink <video id or watch url>");
    std::process::exit(2);
  };

  let resolver = StreamResolver::new(config, Arc::new(MemoryCache::new()))?;
  let playback = match resolver.resolve(&identifier).await {
    Ok(playback) => playback,
    Err(e) => {
      error!(error = %e, "resolution failed");
      // sysexits EX_TEMPFAIL for failures worth retrying
      std::process::exit(if e.is_transient() { 75 } else { 1 });
    }
  };

  info!(
    title = %playback.video.title,
    author = %playback.video.author,
    duration_ms = playback.video.duration_ms,
    live = playback.video.live,
    "resolved"
  );
  for stream in &playback.streams {
    println!(
      "itag {:>5}  {:>9}  {}  {}",
      stream.itag,
      stream
        .height
        .map(|h| format!("{h}p"))
        .unwrap_or_else(|| "-".to_string()),
      stream.codecs,
      stream.source.direct_url().unwrap_or("-"),
    );
  }
  for track in &playback.subtitles {
    println!("subtitle {:>6}  {}  {}", track.language, track.label, track.url);
  }
  if let Some(manifest) = &playback.manifest {
    println!("{}", manifest.document);
  }

  Ok(())
}
