#![forbid(unsafe_code)]

//! Field extraction from a post page.
//!
//! Every field has its own lookup returning `Option<String>`; `extract` runs
//! them all over one parsed document and folds the results into a
//! [`Metadata`] record. A lookup that finds nothing leaves its field empty
//! and never affects the others.

use std::fmt;

use anyhow::{Result, anyhow};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::metadata::Metadata;

const POSTER_CARD: &str = "div._video_card_big_left";
const POSTER_MEDIA: &str = "video";
const HEAD_SCRIPTS: &str = "head script";
const MUSIC_CARD: &str = "div._video_card_big_meta_info_music";
const MUSIC_TEXT: &str = "a";
const TITLE_CARD: &str = "h1._video_card_big_meta_info_title";
const TITLE_TEXT: &str = "span";
const USER_CARD: &str = "div._video_card_big_user_info_names";
const USER_TEXT: &str = "p._video_card_big_user_info_nickname";

/// Marker a script URL must contain to count as the video file.
pub const VIDEO_MARKER: &str = ".mp4";

/// Absolute URLs with an explicit scheme and a real host: a dotted domain
/// with an alphabetic TLD, a dotted IPv4 address or `localhost`.
const STRICT_URL: &str = r#"(?i)\b(?:https?|ftp)://(?:(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,63}|(?:\d{1,3}\.){3}\d{1,3}|localhost)(?::\d{1,5})?(?:[/?#][^\s"'<>\\`{}|^]*)?"#;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}'];

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {css:?}: {err:?}"))
}

/// How many structural containers each lookup matched on the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub poster: usize,
    pub scripts: usize,
    pub music: usize,
    pub title: usize,
    pub username: usize,
}

impl fmt::Display for MatchCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "poster {}, scripts {}, music {}, title {}, username {}",
            self.poster, self.scripts, self.music, self.title, self.username
        )
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub metadata: Metadata,
    pub matches: MatchCounts,
}

/// Compiled selectors and URL pattern, built once per run.
#[derive(Debug)]
pub struct Extractor {
    poster_card: Selector,
    poster_media: Selector,
    head_scripts: Selector,
    music_card: Selector,
    music_text: Selector,
    title_card: Selector,
    title_text: Selector,
    user_card: Selector,
    user_text: Selector,
    url_pattern: Regex,
}

impl Extractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poster_card: selector(POSTER_CARD)?,
            poster_media: selector(POSTER_MEDIA)?,
            head_scripts: selector(HEAD_SCRIPTS)?,
            music_card: selector(MUSIC_CARD)?,
            music_text: selector(MUSIC_TEXT)?,
            title_card: selector(TITLE_CARD)?,
            title_text: selector(TITLE_TEXT)?,
            user_card: selector(USER_CARD)?,
            user_text: selector(USER_TEXT)?,
            url_pattern: Regex::new(STRICT_URL)?,
        })
    }

    pub fn extract(&self, html: &str) -> Extraction {
        let document = Html::parse_document(html);

        let metadata = Metadata {
            username: self.username(&document).unwrap_or_default(),
            poster_url: self.poster_url(&document).unwrap_or_default(),
            video_url: self.video_url(&document).unwrap_or_default(),
            music: self.music(&document).unwrap_or_default(),
            title: self.title(&document).unwrap_or_default(),
        };
        let matches = MatchCounts {
            poster: document.select(&self.poster_card).count(),
            scripts: document.select(&self.head_scripts).count(),
            music: document.select(&self.music_card).count(),
            title: document.select(&self.title_card).count(),
            username: document.select(&self.user_card).count(),
        };

        let missing = metadata.missing_fields();
        if !missing.is_empty() {
            debug!(?missing, "fields not found on page");
        }
        Extraction { metadata, matches }
    }

    /// `poster` attribute of the media element inside the main video card.
    pub fn poster_url(&self, document: &Html) -> Option<String> {
        document.select(&self.poster_card).find_map(|card| {
            card.select(&self.poster_media)
                .find_map(|media| media.value().attr("poster"))
                .map(str::trim)
                .filter(|poster| !poster.is_empty())
                .map(str::to_string)
        })
    }

    /// First strict URL in the head's inline scripts that points at an mp4.
    pub fn video_url(&self, document: &Html) -> Option<String> {
        let scripts: Vec<String> = document
            .select(&self.head_scripts)
            .map(|script| script.text().collect::<String>())
            .collect();
        let text = scripts.join("\n");
        find_cdn_url(&self.scan_urls(&text)).map(str::to_string)
    }

    pub fn music(&self, document: &Html) -> Option<String> {
        child_text(document, &self.music_card, &self.music_text)
    }

    pub fn title(&self, document: &Html) -> Option<String> {
        child_text(document, &self.title_card, &self.title_text)
    }

    pub fn username(&self, document: &Html) -> Option<String> {
        child_text(document, &self.user_card, &self.user_text)
    }

    /// Every well-formed absolute URL in `text`, in order of appearance.
    pub fn scan_urls<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.url_pattern
            .find_iter(text)
            .map(|found| found.as_str().trim_end_matches(TRAILING_PUNCTUATION))
            .filter(|candidate| {
                Url::parse(candidate)
                    .map(|parsed| parsed.has_host())
                    .unwrap_or(false)
            })
            .collect()
    }
}

/// Picks the first URL carrying the video container marker.
pub fn find_cdn_url<'a>(urls: &[&'a str]) -> Option<&'a str> {
    urls.iter().copied().find(|url| url.contains(VIDEO_MARKER))
}

/// Joined, trimmed text of every `child` under the first `container` that
/// has non-empty child text.
fn child_text(document: &Html, container: &Selector, child: &Selector) -> Option<String> {
    document
        .select(container)
        .find_map(|card| text_of(card.select(child)))
}

fn text_of<'a>(elements: impl Iterator<Item = ElementRef<'a>>) -> Option<String> {
    let joined: String = elements.flat_map(|element| element.text()).collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
