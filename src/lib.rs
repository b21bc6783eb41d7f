#![forbid(unsafe_code)]

//! Scrape a short-form video post page and download its poster, video and a
//! JSON sidecar of the extracted metadata.

pub mod config;
pub mod extract;
pub mod fetch;
pub mod metadata;
pub mod persist;
pub mod pipeline;

