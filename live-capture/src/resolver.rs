//! Source resolution: from a source URL to something ffmpeg can record.
//!
//! Page scraping is not part of this crate; [`SourceResolver`] is the seam
//! for it. [`DirectResolver`] covers sources whose URL already is the media
//! playlist.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::{Error, Result};

/// A source ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub display_name: String,
    pub media_url: String,
    pub work_dir: PathBuf,
}

/// Turns a source URL into a [`ResolvedSource`].
///
/// A failure aborts session creation before any process is spawned.
#[async_trait]
pub trait SourceResolver: Send + Sync {
    async fn resolve(&self, source_url: &str, display_name: Option<&str>)
    -> Result<ResolvedSource>;
}

/// Pick the media URL to record from a list of candidates.
///
/// Only `https://` URLs whose trimmed form ends in a digit are playable. An
/// `hd.m3u8` playlist wins (the last one listed); otherwise the first
/// playable candidate is used.
pub fn select_media_url<'a, I>(candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut first = None;
    let mut hd = None;
    for url in candidates {
        let playable = url.starts_with("https://")
            && url.trim_end().ends_with(|c: char| c.is_ascii_digit());
        if !playable {
            continue;
        }
        first.get_or_insert(url);
        if url.contains("hd.m3u8") {
            hd = Some(url);
        }
    }
    hd.or(first)
}

/// Records the source URL itself.
#[derive(Debug, Clone)]
pub struct DirectResolver {
    output_root: PathBuf,
}

impl DirectResolver {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
        }
    }
}

#[async_trait]
impl SourceResolver for DirectResolver {
    async fn resolve(
        &self,
        source_url: &str,
        display_name: Option<&str>,
    ) -> Result<ResolvedSource> {
        let source_url = source_url.trim();
        if source_url.is_empty() {
            return Err(Error::resolution(source_url, "empty source URL"));
        }

        let media_url = select_media_url([source_url])
            .ok_or_else(|| Error::resolution(source_url, "no playable media URL"))?;

        let display_name = display_name
            .map(sanitize_name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| name_from_url(source_url));

        debug!(source_url, display_name = %display_name, "Resolved source");
        Ok(ResolvedSource {
            work_dir: self.output_root.join(&display_name),
            media_url: media_url.to_string(),
            display_name,
        })
    }
}

/// The last non-empty path segment of `url`, or `Unknown`.
fn name_from_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or_default();
    let path = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);

    path.split('/')
        .skip(1)
        .filter(|segment| !segment.is_empty())
        .last()
        .map(sanitize_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Keep a name usable as a directory and file name prefix.
fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}
