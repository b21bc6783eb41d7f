#![forbid(unsafe_code)]

//! The download run: fetch the page, extract the metadata, then persist it
//! together with the poster and the video.

use std::fmt;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

use crate::config::Settings;
use crate::extract::{Extraction, Extractor, MatchCounts};
use crate::fetch::{FetchedPage, HttpClient};
use crate::metadata::Metadata;
use crate::persist::{OutputLayout, PersistReport, persist};

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub source_url: String,
    pub metadata: Metadata,
    pub layout: OutputLayout,
    pub files: PersistReport,
}

/// Request and match counters for the verbose summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageStats {
    pub requests: usize,
    pub responses: usize,
    pub page_bytes: usize,
    pub matches: MatchCounts,
}

impl fmt::Display for PageStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Requests made: {} ({} responses) | Page bytes: {} | Matches: {}",
            self.requests, self.responses, self.page_bytes, self.matches
        )
    }
}

/// Scrapes `url` and writes the JSON sidecar, poster and video below
/// `settings.output_dir`.
pub fn download(url: &str, settings: &Settings) -> Result<DownloadReport> {
    let client = HttpClient::new(settings.user_agent_mode());
    let extractor = Extractor::new()?;
    download_with(&client, &extractor, url, settings)
}

pub fn download_with(
    client: &HttpClient,
    extractor: &Extractor,
    url: &str,
    settings: &Settings,
) -> Result<DownloadReport> {
    info!(url, "fetching page");
    let page = client
        .fetch_page(url)
        .with_context(|| format!("fetching page {url}"))?;

    let Extraction { metadata, matches } = extractor.extract(&page.body);
    if settings.verbose {
        let stats = PageStats {
            requests: 1,
            responses: 1,
            page_bytes: page.body.len(),
            matches,
        };
        print_summary(&summary_prefix(settings.color), &page, &metadata, &stats);
    }

    let layout = OutputLayout::new(&settings.output_dir, url, &metadata);
    let files = persist(client, &layout, &metadata, settings.on_download_failure)?;
    info!(
        directory = %layout.directory.display(),
        failures = files.failures.len(),
        "download finished"
    );

    Ok(DownloadReport {
        source_url: url.to_string(),
        metadata,
        layout,
        files,
    })
}

pub fn summary_prefix(color: bool) -> String {
    if color {
        format!("{}{}{}", "[".yellow(), "✓".green(), "]".yellow())
    } else {
        "[✓]".to_string()
    }
}

pub fn summary_lines(
    prefix: &str,
    page: &FetchedPage,
    metadata: &Metadata,
    stats: &PageStats,
) -> Vec<String> {
    vec![
        format!("{prefix} Finished:     {}", page.final_url),
        format!("{prefix} User:         {}", metadata.username),
        format!("{prefix} Title:        {}", metadata.title),
        format!("{prefix} Music:        {}", metadata.music),
        format!("{prefix} Poster link:  {}", metadata.poster_url),
        format!("{prefix} Video link:   {}", metadata.video_url),
        String::new(),
        format!("{prefix} Statistics:   {stats}"),
    ]
}

fn print_summary(prefix: &str, page: &FetchedPage, metadata: &Metadata, stats: &PageStats) {
    for line in summary_lines(prefix, page, metadata, stats) {
        println!("{line}");
    }
}
