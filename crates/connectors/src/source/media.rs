//! Downloads of messaging attachments by URI.

use crate::{
    error::SourceError,
    http::{build_client, unavailable},
};
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::warn;

/// Extensions chosen for types the registry maps to several, matching what
/// earlier loads used.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mp4", "m4a"),
    ("audio/mpeg", "mp3"),
    ("audio/ogg", "ogg"),
    ("image/jpeg", "jpg"),
    ("text/plain", "txt"),
    ("video/mp4", "mp4"),
];

/// File extension (without the dot) for a MIME type, ignoring parameters
/// such as `; codecs=opus`.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    PREFERRED_EXTENSIONS
        .iter()
        .find(|(m, _)| *m == essence)
        .map(|(_, ext)| *ext)
        .or_else(|| mime_guess::get_mime_extensions_str(&essence)?.first().copied())
}

/// Object file name for a media URI: the last path segment, with an
/// extension derived from `mime` when the segment has none.
pub fn media_filename(uri: &str, mime: Option<&str>) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let name = path.rsplit('/').next().unwrap_or(path);
    if name.rsplit_once('.').is_some_and(|(stem, _)| !stem.is_empty()) {
        return name.to_string();
    }
    match mime.and_then(extension_for_mime) {
        Some(ext) => format!("{name}.{ext}"),
        None => name.to_string(),
    }
}

pub struct MediaDownloader {
    client: Client,
}

impl MediaDownloader {
    pub fn new(proxy: Option<&str>) -> Result<Self, SourceError> {
        Ok(MediaDownloader {
            client: build_client(proxy)?,
        })
    }

    /// Fetches `uri`. A non-success status is logged and yields `None` so a
    /// single missing attachment does not fail the batch.
    pub async fn download(
        &self,
        uri: &str,
        headers: &BTreeMap<String, String>,
    ) -> Result<Option<Vec<u8>>, SourceError> {
        let req = headers
            .iter()
            .fold(self.client.get(uri), |req, (name, value)| req.header(name, value));
        let resp = req.send().await.map_err(unavailable(uri))?;
        let status = resp.status();
        if !status.is_success() {
            warn!(%uri, status = status.as_u16(), "Skipping attachment");
            return Ok(None);
        }
        let bytes = resp.bytes().await.map_err(unavailable(uri))?;
        Ok(Some(bytes.to_vec()))
    }
}
