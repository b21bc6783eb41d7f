#![forbid(unsafe_code)]

//! On-disk layout and the write/download sequence for one scraped post.
//!
//! Layout: `<output_dir>/<username>/<url basename>/<basename>.<username>.<title>.{json,jpg,mp4}`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use tracing::{error, info, warn};
use url::Url;

use crate::fetch::Downloader;
use crate::metadata::Metadata;

/// What to do when the poster or video download fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed download and return its error.
    #[default]
    Abort,
    /// Record the failure and move on to the next file.
    Continue,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!(
                "unknown download failure policy {other:?} (expected abort or continue)"
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
        })
    }
}

/// Last path segment of `source`, without query, fragment or trailing slash.
///
/// Falls back to the host when the path is empty, and to plain string
/// splitting when `source` is not an absolute URL.
pub fn url_basename(source: &str) -> String {
    let base = match Url::parse(source) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
            .map(str::to_string)
            .or_else(|| parsed.host_str().map(str::to_string)),
        Err(_) => source
            .split(['?', '#'])
            .next()
            .and_then(|path| path.split('/').filter(|segment| !segment.is_empty()).last())
            .map(str::to_string),
    };
    path_safe(&base.unwrap_or_default())
}

/// Replaces characters that would change the directory structure.
fn path_safe(component: &str) -> String {
    let cleaned = component.replace(['/', '\\'], "_");
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Where the three output files of one post go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub directory: PathBuf,
    pub base_name: String,
}

impl OutputLayout {
    pub fn new(output_dir: &Path, source_url: &str, metadata: &Metadata) -> Self {
        let id = url_basename(source_url);
        let username = path_safe(&metadata.username);
        let title = metadata.title.replace([' ', '/', '\\'], "_");
        Self {
            directory: output_dir.join(&username).join(&id),
            base_name: format!("{id}.{username}.{title}"),
        }
    }

    fn file(&self, extension: &str) -> PathBuf {
        self.directory.join(format!("{}.{extension}", self.base_name))
    }

    pub fn json_path(&self) -> PathBuf {
        self.file("json")
    }

    pub fn poster_path(&self) -> PathBuf {
        self.file("jpg")
    }

    pub fn video_path(&self) -> PathBuf {
        self.file("mp4")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Poster,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Poster => "poster",
            Self::Video => "video",
        })
    }
}

/// A download that failed under [`FailurePolicy::Continue`].
#[derive(Debug, Clone)]
pub struct MediaFailure {
    pub kind: MediaKind,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct PersistReport {
    pub json: PathBuf,
    pub poster: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub failures: Vec<MediaFailure>,
}

/// Creates the layout directory, writes the JSON sidecar, then downloads the
/// poster and the video in that order.
///
/// A JSON failure stops everything before any download starts.
pub fn persist(
    downloader: &impl Downloader,
    layout: &OutputLayout,
    metadata: &Metadata,
    policy: FailurePolicy,
) -> Result<PersistReport> {
    if let Err(err) = fs::create_dir_all(&layout.directory) {
        error!(path = %layout.directory.display(), "output directory not created: {err}");
        return Err(err).with_context(|| format!("creating {}", layout.directory.display()));
    }

    let json = layout.json_path();
    if let Err(err) = metadata.write_json(&json) {
        error!(path = %json.display(), "metadata sidecar not written: {err:#}");
        return Err(err);
    }
    info!(path = %json.display(), "metadata written");

    let mut report = PersistReport {
        json,
        ..PersistReport::default()
    };

    for (kind, url, dest) in [
        (MediaKind::Poster, &metadata.poster_url, layout.poster_path()),
        (MediaKind::Video, &metadata.video_url, layout.video_path()),
    ] {
        match fetch_media(downloader, kind, url, &dest) {
            Ok(()) => match kind {
                MediaKind::Poster => report.poster = Some(dest),
                MediaKind::Video => report.video = Some(dest),
            },
            Err(err) if policy == FailurePolicy::Continue => {
                warn!(%kind, url = %url, "download failed, continuing: {err:#}");
                report.failures.push(MediaFailure {
                    kind,
                    url: url.clone(),
                    reason: format!("{err:#}"),
                });
            }
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}

fn fetch_media(downloader: &impl Downloader, kind: MediaKind, url: &str, dest: &Path) -> Result<()> {
    if url.trim().is_empty() {
        bail!("no {kind} URL was extracted from the page");
    }
    let bytes = downloader
        .download_to(url, dest)
        .with_context(|| format!("downloading {kind}"))?;
    info!(%kind, path = %dest.display(), bytes, "saved");
    Ok(())
}
