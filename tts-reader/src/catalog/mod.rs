//! Voice catalog browsing and voice installation

pub mod client;
pub mod download;

pub use client::{
    download_urls, filter_by_language, model_size_mb, parse_catalog, unique_languages,
    CatalogClient, DownloadUrls, VoiceEntry, VoiceFile,
};
pub use download::{is_voice_installed, DownloadProgress, VoiceDownloader};
