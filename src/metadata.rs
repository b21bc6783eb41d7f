#![forbid(unsafe_code)]

//! The metadata record scraped from one post page.
//!
//! The struct mirrors the JSON sidecar written next to the downloaded media,
//! so field order and names here define the on-disk format.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Everything extracted for a single video post.
///
/// Fields that could not be found on the page stay empty; a partially filled
/// record is still persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub poster_url: String,
    #[serde(default)]
    pub video_url: String,
    #[serde(default)]
    pub music: String,
    #[serde(default)]
    pub title: String,
}

impl Metadata {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("serializing metadata")
    }

    /// Serializes the record and writes it to `path`, replacing any previous file.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let payload = self.to_json()?;
        fs::write(path, payload).with_context(|| format!("writing {}", path.display()))
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Names of the fields that are still empty, in schema order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("username", &self.username),
            ("poster_url", &self.poster_url),
            ("video_url", &self.video_url),
            ("music", &self.music),
            ("title", &self.title),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
