pub mod grouper;
pub mod mpd;

pub use grouper::{AdaptiveStreamGrouper, ClusterKey, GroupedStreams, StreamCluster};
pub use mpd::{ManifestSynthesizer, SynthesizedManifest};
