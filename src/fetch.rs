#![forbid(unsafe_code)]

//! Blocking HTTP access: the page fetch and the streamed media downloads.
//!
//! The agent only speaks HTTP/1.1, which keeps servers that misbehave under
//! HTTP/2 negotiation out of the picture.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::debug;

pub const DEFAULT_USER_AGENT: &str = concat!("tiktokdl/", env!("CARGO_PKG_VERSION"));

/// Browser identities used when the user-agent is randomized.
pub const USER_AGENT_POOL: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:131.0) Gecko/20100101 Firefox/131.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:130.0) Gecko/20100101 Firefox/130.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.6 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Mobile Safari/537.36",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserAgentMode {
    #[default]
    Fixed,
    /// A different pool entry is drawn for every request.
    Random,
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    USER_AGENT_POOL[rng.random_range(0..USER_AGENT_POOL.len())]
}

/// A fetched page, read fully into memory.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub requested_url: String,
    /// Where the request ended up after redirects.
    pub final_url: String,
    pub status: u16,
    pub user_agent: String,
    pub body: String,
}

/// Anything that can copy a remote resource into a local file.
pub trait Downloader {
    /// Downloads `url` into `dest` and returns the number of bytes written.
    fn download_to(&self, url: &str, dest: &Path) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
    mode: UserAgentMode,
}

impl HttpClient {
    pub fn new(mode: UserAgentMode) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(DEFAULT_USER_AGENT)
            .build();
        Self { agent, mode }
    }

    fn user_agent(&self) -> &'static str {
        match self.mode {
            UserAgentMode::Fixed => DEFAULT_USER_AGENT,
            UserAgentMode::Random => random_user_agent(),
        }
    }

    /// Issues a GET; transport errors and non-2xx statuses are both errors.
    fn get(&self, url: &str) -> Result<(ureq::Response, &'static str)> {
        let user_agent = self.user_agent();
        debug!(url, user_agent, "GET");
        let response = self
            .agent
            .get(url)
            .set("User-Agent", user_agent)
            .call()
            .with_context(|| format!("GET {url}"))?;
        Ok((response, user_agent))
    }

    pub fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        let (response, user_agent) = self.get(url)?;
        let status = response.status();
        let final_url = response.get_url().to_string();
        let mut raw = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut raw)
            .with_context(|| format!("reading page body from {url}"))?;
        // Invalid UTF-8 becomes U+FFFD instead of failing the fetch.
        let body = String::from_utf8_lossy(&raw).into_owned();
        debug!(url, status, bytes = raw.len(), "page fetched");
        Ok(FetchedPage {
            requested_url: url.to_string(),
            final_url,
            status,
            user_agent: user_agent.to_string(),
            body,
        })
    }
}

impl Downloader for HttpClient {
    fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let (response, _) = self.get(url)?;
        let mut reader = response.into_reader();
        let mut file =
            File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
        let written = io::copy(&mut reader, &mut file)
            .with_context(|| format!("writing {} from {url}", dest.display()))?;
        debug!(url, path = %dest.display(), bytes = written, "download finished");
        Ok(written)
    }
}
