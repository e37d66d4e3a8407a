use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::warn;
use uuid::Uuid;

use crate::errors::{ResolveError, Result};
use crate::formats::stream::{Container, MediaKind, StreamDescriptor};
use crate::innertube::response::VideoMetadata;
use crate::manifest::grouper::{GroupedStreams, StreamCluster};
use crate::subtitles::SubtitleTrack;

const DASH_NAMESPACE: &str = "urn:mpeg:dash:schema:mpd:2011";
const ROLE_SCHEME: &str = "urn:mpeg:dash:role:2011";
const CHANNELS_SCHEME: &str = "urn:mpeg:dash:23003:3:audio_channel_configuration:2011";

/// A finished manifest document plus the salt that makes its ids unique to
/// this resolution call.
#[derive(Debug, Clone)]
pub struct SynthesizedManifest {
  pub id: String,
  pub document: String,
  /// User agent the referenced urls were resolved under. A relay fetching
  /// the byte ranges must replay it verbatim.
  pub user_agent: Option<&'static str>,
}

/// Writes the single-Period static MPD. Everything is byte-range addressed
/// (`SegmentBase` over one file per Representation); element order is fixed
/// so the same input produces the same document, salt aside.
pub struct ManifestSynthesizer;

impl ManifestSynthesizer {
  pub fn synthesize(
    video: &VideoMetadata,
    grouped: &GroupedStreams,
    subtitles: &[SubtitleTrack],
  ) -> Result<SynthesizedManifest> {
    let salt = Uuid::new_v4().simple().to_string();
    let rep_salt = &salt[..8];

    let renderable = |cluster: &&StreamCluster| {
      cluster.streams.iter().any(|s| s.source.direct_url().is_some())
    };
    let video_sets: Vec<&StreamCluster> = grouped.video.iter().filter(renderable).collect();
    let audio_sets: Vec<&StreamCluster> = grouped.audio.iter().filter(renderable).collect();
    if video_sets.is_empty() && audio_sets.is_empty() {
      return Err(ResolveError::Manifest(
        "no stream with a resolved url survived grouping".to_string(),
      ));
    }
    let user_agent = video_sets
      .iter()
      .chain(audio_sets.iter())
      .flat_map(|cluster| cluster.streams.iter())
      .find_map(|s| s.user_agent);

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
      .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
      .map_err(xml_err)?;

    let mut mpd = BytesStart::new("MPD");
    mpd.push_attribute(("xmlns", DASH_NAMESPACE));
    mpd.push_attribute(("profiles", "urn:mpeg:dash:profile:isoff-on-demand:2011"));
    mpd.push_attribute(("type", "static"));
    mpd.push_attribute(("id", salt.as_str()));
    mpd.push_attribute((
      "mediaPresentationDuration",
      iso_duration(video.duration_ms).as_str(),
    ));
    mpd.push_attribute(("minBufferTime", "PT1.500S"));
    writer.write_event(Event::Start(mpd)).map_err(xml_err)?;

    let mut period = BytesStart::new("Period");
    period.push_attribute(("id", "0"));
    period.push_attribute(("start", "PT0S"));
    writer.write_event(Event::Start(period)).map_err(xml_err)?;

    let mut set_id = 0u32;
    for cluster in video_sets.iter().chain(audio_sets.iter()) {
      write_adaptation_set(&mut writer, cluster, set_id, rep_salt)?;
      set_id += 1;
    }
    for (index, track) in subtitles.iter().enumerate() {
      write_text_set(&mut writer, track, set_id, index, rep_salt)?;
      set_id += 1;
    }

    writer
      .write_event(Event::End(BytesEnd::new("Period")))
      .map_err(xml_err)?;
    writer
      .write_event(Event::End(BytesEnd::new("MPD")))
      .map_err(xml_err)?;

    let document = String::from_utf8(writer.into_inner().into_inner()).map_err(xml_err)?;
    Ok(SynthesizedManifest {
      id: salt,
      document,
      user_agent,
    })
  }
}

fn write_adaptation_set(
  writer: &mut Writer<Cursor<Vec<u8>>>,
  cluster: &StreamCluster,
  set_id: u32,
  rep_salt: &str,
) -> Result<()> {
  let mut set = BytesStart::new("AdaptationSet");
  set.push_attribute(("id", set_id.to_string().as_str()));
  set.push_attribute(("mimeType", mime_base(cluster).as_str()));
  if let Some(lang) = &cluster.key.language {
    set.push_attribute(("lang", lang.as_str()));
  }
  set.push_attribute(("startWithSAP", "1"));
  set.push_attribute(("subsegmentAlignment", "true"));
  writer.write_event(Event::Start(set)).map_err(xml_err)?;

  write_role(writer, cluster.dash_role)?;
  write_label(writer, &cluster.label)?;

  for stream in &cluster.streams {
    let Some(url) = stream.source.direct_url() else {
      warn!(itag = stream.itag, "stream url still locked, leaving it out of the manifest");
      continue;
    };
    write_representation(writer, stream, url, rep_salt)?;
  }

  writer
    .write_event(Event::End(BytesEnd::new("AdaptationSet")))
    .map_err(xml_err)
}

fn write_representation(
  writer: &mut Writer<Cursor<Vec<u8>>>,
  stream: &StreamDescriptor,
  url: &str,
  rep_salt: &str,
) -> Result<()> {
  let mut rep = BytesStart::new("Representation");
  rep.push_attribute(("id", format!("{}.{rep_salt}", stream.itag).as_str()));
  rep.push_attribute(("bandwidth", stream.bitrate.to_string().as_str()));
  rep.push_attribute(("codecs", stream.codecs.as_str()));
  if stream.kind == MediaKind::Video {
    if let Some(width) = stream.width {
      rep.push_attribute(("width", width.to_string().as_str()));
    }
    if let Some(height) = stream.height {
      rep.push_attribute(("height", height.to_string().as_str()));
    }
    if let Some(fps) = stream.fps {
      rep.push_attribute(("frameRate", fps.to_string().as_str()));
    }
  } else if let Some(rate) = stream.audio_sample_rate {
    rep.push_attribute(("audioSamplingRate", rate.to_string().as_str()));
  }
  writer.write_event(Event::Start(rep)).map_err(xml_err)?;

  if stream.kind == MediaKind::Audio {
    let mut channels = BytesStart::new("AudioChannelConfiguration");
    channels.push_attribute(("schemeIdUri", CHANNELS_SCHEME));
    channels.push_attribute(("value", stream.channels.unwrap_or(2).to_string().as_str()));
    writer.write_event(Event::Empty(channels)).map_err(xml_err)?;
  }

  writer
    .write_event(Event::Start(BytesStart::new("BaseURL")))
    .map_err(xml_err)?;
  writer
    .write_event(Event::Text(BytesText::new(url)))
    .map_err(xml_err)?;
  writer
    .write_event(Event::End(BytesEnd::new("BaseURL")))
    .map_err(xml_err)?;

  // Missing ranges fall back to whole-file addressing, which players
  // handle by fetching the sidx themselves.
  if let Some((index_start, index_end)) = stream.index_range {
    let mut segment_base = BytesStart::new("SegmentBase");
    segment_base.push_attribute((
      "indexRange",
      format!("{index_start}-{index_end}").as_str(),
    ));
    writer
      .write_event(Event::Start(segment_base))
      .map_err(xml_err)?;
    if let Some((init_start, init_end)) = stream.init_range {
      let mut init = BytesStart::new("Initialization");
      init.push_attribute(("range", format!("{init_start}-{init_end}").as_str()));
      writer.write_event(Event::Empty(init)).map_err(xml_err)?;
    }
    writer
      .write_event(Event::End(BytesEnd::new("SegmentBase")))
      .map_err(xml_err)?;
  }

  writer
    .write_event(Event::End(BytesEnd::new("Representation")))
    .map_err(xml_err)
}

fn write_text_set(
  writer: &mut Writer<Cursor<Vec<u8>>>,
  track: &SubtitleTrack,
  set_id: u32,
  index: usize,
  rep_salt: &str,
) -> Result<()> {
  let mut set = BytesStart::new("AdaptationSet");
  set.push_attribute(("id", set_id.to_string().as_str()));
  set.push_attribute(("mimeType", "text/vtt"));
  set.push_attribute(("lang", track.language.as_str()));
  writer.write_event(Event::Start(set)).map_err(xml_err)?;

  write_role(writer, "subtitle")?;
  write_label(writer, &track.label)?;

  let mut rep = BytesStart::new("Representation");
  rep.push_attribute(("id", format!("caption-{index}.{rep_salt}").as_str()));
  rep.push_attribute(("bandwidth", "0"));
  writer.write_event(Event::Start(rep)).map_err(xml_err)?;
  writer
    .write_event(Event::Start(BytesStart::new("BaseURL")))
    .map_err(xml_err)?;
  writer
    .write_event(Event::Text(BytesText::new(&track.url)))
    .map_err(xml_err)?;
  writer
    .write_event(Event::End(BytesEnd::new("BaseURL")))
    .map_err(xml_err)?;
  writer
    .write_event(Event::End(BytesEnd::new("Representation")))
    .map_err(xml_err)?;

  writer
    .write_event(Event::End(BytesEnd::new("AdaptationSet")))
    .map_err(xml_err)
}

fn write_role(writer: &mut Writer<Cursor<Vec<u8>>>, value: &str) -> Result<()> {
  let mut role = BytesStart::new("Role");
  role.push_attribute(("schemeIdUri", ROLE_SCHEME));
  role.push_attribute(("value", value));
  writer.write_event(Event::Empty(role)).map_err(xml_err)
}

fn write_label(writer: &mut Writer<Cursor<Vec<u8>>>, label: &str) -> Result<()> {
  writer
    .write_event(Event::Start(BytesStart::new("Label")))
    .map_err(xml_err)?;
  writer
    .write_event(Event::Text(BytesText::new(label)))
    .map_err(xml_err)?;
  writer
    .write_event(Event::End(BytesEnd::new("Label")))
    .map_err(xml_err)
}

fn mime_base(cluster: &StreamCluster) -> String {
  if let Some(stream) = cluster.streams.first() {
    if let Some(base) = stream.mime.split(';').next() {
      if !base.is_empty() {
        return base.trim().to_string();
      }
    }
  }
  let family = if cluster.key.video_codec.is_some() {
    "video"
  } else {
    "audio"
  };
  let container = match cluster.key.container {
    Container::Webm => "webm",
    _ => "mp4",
  };
  format!("{family}/{container}")
}

/// `PT61.300S` style duration, millisecond precision.
fn iso_duration(duration_ms: u64) -> String {
  format!("PT{}.{:03}S", duration_ms / 1000, duration_ms % 1000)
}

fn xml_err<E: std::fmt::Display>(e: E) -> ResolveError {
  ResolveError::Manifest(e.to_string())
}
