pub mod cache;
pub mod cipher;
pub mod common;
pub mod configs;
pub mod errors;
pub mod formats;
pub mod innertube;
pub mod manifest;
pub mod resolver;
pub mod subtitles;
