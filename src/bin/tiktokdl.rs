#![forbid(unsafe_code)]

//! Command-line front end: scrape one post page and save its metadata,
//! poster and video under `<output>/<user>/<id>/`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tiktokdl::config::{SettingsOverrides, resolve_settings};
use tiktokdl::persist::FailurePolicy;
use tiktokdl::pipeline::download;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Post page URL
    url: String,

    /// Output directory [default: ./users/]
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Use a different browser user-agent for every request
    #[arg(long)]
    random_ua: bool,

    /// Print the extracted fields before saving
    #[arg(short, long)]
    verbose: bool,

    /// Plain summary prefix without colours
    #[arg(long)]
    no_color: bool,

    /// What to do when the poster or video download fails: abort or continue
    #[arg(long, value_name = "POLICY")]
    on_download_failure: Option<FailurePolicy>,

    /// Settings file with TIKTOKDL_* keys
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            output_dir: self.output.clone(),
            random_user_agent: self.random_ua.then_some(true),
            verbose: self.verbose.then_some(true),
            color: self.no_color.then_some(false),
            on_download_failure: self.on_download_failure,
            env_path: self.env_file.clone(),
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "tiktokdl=debug" } else { "tiktokdl=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = resolve_settings(cli.overrides())?;
    init_logging(settings.verbose);

    let report = download(&cli.url, &settings)?;
    for failure in &report.files.failures {
        warn!(kind = %failure.kind, url = %failure.url, "not saved: {}", failure.reason);
    }
    println!("Saved to {}", report.layout.directory.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_become_overrides() {
        let cli = Cli::try_parse_from([
            "tiktokdl",
            "--random-ua",
            "-v",
            "--no-color",
            "--on-download-failure",
            "continue",
            "-o",
            "/tmp/clips",
            "https://www.tiktok.com/@alice/video/1",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(cli.url, "https://www.tiktok.com/@alice/video/1");
        assert_eq!(overrides.output_dir, Some(PathBuf::from("/tmp/clips")));
        assert_eq!(overrides.random_user_agent, Some(true));
        assert_eq!(overrides.verbose, Some(true));
        assert_eq!(overrides.color, Some(false));
        assert_eq!(overrides.on_download_failure, Some(FailurePolicy::Continue));
    }

    #[test]
    fn absent_flags_defer_to_environment() {
        let cli = Cli::try_parse_from(["tiktokdl", "https://x.example/v/1"]).unwrap();
        let overrides = cli.overrides();
        assert!(overrides.output_dir.is_none());
        assert!(overrides.random_user_agent.is_none());
        assert!(overrides.verbose.is_none());
        assert!(overrides.color.is_none());
        assert!(overrides.on_download_failure.is_none());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(
            Cli::try_parse_from(["tiktokdl", "--on-download-failure", "panic", "https://x.example/v/1"])
                .is_err()
        );
    }
}
