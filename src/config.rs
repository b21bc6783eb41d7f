#![forbid(unsafe_code)]

use anyhow::{Context, Result, anyhow, bail};
use std::{
    collections::HashMap,
    env, fs, io,
    path::{Path, PathBuf},
};

use crate::fetch::UserAgentMode;
use crate::persist::FailurePolicy;

pub const DEFAULT_ENV_PATH: &str = ".env";
pub const DEFAULT_OUTPUT_DIR: &str = "./users/";

const OUTPUT_DIR_KEY: &str = "TIKTOKDL_OUTPUT_DIR";
const RANDOM_UA_KEY: &str = "TIKTOKDL_RANDOM_UA";
const VERBOSE_KEY: &str = "TIKTOKDL_VERBOSE";
const COLOR_KEY: &str = "TIKTOKDL_COLOR";
const FAILURE_POLICY_KEY: &str = "TIKTOKDL_ON_DOWNLOAD_FAILURE";

/// Everything a download run needs to know besides the source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub output_dir: PathBuf,
    pub random_user_agent: bool,
    pub verbose: bool,
    /// Colour the `[✓]` prefix of the verbose summary.
    pub color: bool,
    pub on_download_failure: FailurePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            random_user_agent: false,
            verbose: false,
            color: true,
            on_download_failure: FailurePolicy::default(),
        }
    }
}

impl Settings {
    /// Settings for a plain library call; an empty `output_dir` means the default.
    pub fn new(output_dir: &str, random_user_agent: bool, verbose: bool) -> Self {
        Self {
            output_dir: output_dir_or_default(output_dir),
            random_user_agent,
            verbose,
            ..Self::default()
        }
    }

    pub fn user_agent_mode(&self) -> UserAgentMode {
        if self.random_user_agent {
            UserAgentMode::Random
        } else {
            UserAgentMode::Fixed
        }
    }
}

fn output_dir_or_default(value: &str) -> PathBuf {
    if value.trim().is_empty() {
        PathBuf::from(DEFAULT_OUTPUT_DIR)
    } else {
        PathBuf::from(value)
    }
}

/// Values given on the command line; they win over the environment and the
/// env file.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub output_dir: Option<PathBuf>,
    pub random_user_agent: Option<bool>,
    pub verbose: Option<bool>,
    pub color: Option<bool>,
    pub on_download_failure: Option<FailurePolicy>,
    pub env_path: Option<PathBuf>,
}

pub fn resolve_settings(overrides: SettingsOverrides) -> Result<Settings> {
    let env_path = overrides
        .env_path
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_ENV_PATH));
    let file_vars = read_env_file(env_path)?;
    build_settings_with_overrides(&file_vars, process_env, overrides)
}

#[cfg(test)]
fn build_settings(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    build_settings_with_overrides(file_vars, env_lookup, SettingsOverrides::default())
}

fn build_settings_with_overrides(
    file_vars: &HashMap<String, String>,
    env_lookup: impl Fn(&str) -> Option<String>,
    overrides: SettingsOverrides,
) -> Result<Settings> {
    // A blank environment value falls through to the file.
    let lookup = |key: &str| {
        env_lookup(key)
            .as_deref()
            .and_then(non_blank)
            .or_else(|| file_vars.get(key).and_then(|value| non_blank(value)))
    };
    let lookup_bool = |key: &str| -> Result<Option<bool>> {
        lookup(key).map(|value| parse_bool(key, &value)).transpose()
    };

    let output_dir = overrides
        .output_dir
        .map(|path| path.to_string_lossy().into_owned())
        .filter(|value| !value.trim().is_empty())
        .or_else(|| lookup(OUTPUT_DIR_KEY))
        .map(|value| output_dir_or_default(&value))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

    let random_user_agent = match overrides.random_user_agent {
        Some(value) => value,
        None => lookup_bool(RANDOM_UA_KEY)?.unwrap_or(false),
    };
    let verbose = match overrides.verbose {
        Some(value) => value,
        None => lookup_bool(VERBOSE_KEY)?.unwrap_or(false),
    };
    let color = match overrides.color {
        Some(value) => value,
        None => lookup_bool(COLOR_KEY)?.unwrap_or_else(|| env_lookup("NO_COLOR").is_none()),
    };
    let on_download_failure = match overrides.on_download_failure {
        Some(policy) => policy,
        None => lookup(FAILURE_POLICY_KEY)
            .map(|value| {
                value
                    .parse::<FailurePolicy>()
                    .map_err(|err| anyhow!("{FAILURE_POLICY_KEY}: {err}"))
            })
            .transpose()?
            .unwrap_or_default(),
    };

    Ok(Settings {
        output_dir,
        random_user_agent,
        verbose,
        color,
        on_download_failure,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{key}: expected a boolean, got {other:?}"),
    }
}

/// The trimmed value, or `None` when nothing is left of it.
fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn process_env(key: &str) -> Option<String> {
    env::var(key).ok().as_deref().and_then(non_blank)
}

/// Reads a dotenv-style settings file. A missing file is the same as an
/// empty one.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    Ok(content
        .lines()
        .filter_map(parse_env_line)
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect())
}

/// Splits `[export ]KEY=value` and drops one pair of matching quotes around
/// the value. Blank lines, comments and lines without `=` give `None`.
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.strip_prefix("export ").unwrap_or(line).split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    let value = value.trim();
    let bytes = value.as_bytes();
    let quoted = bytes.len() >= 2
        && matches!(bytes[0], b'"' | b'\'')
        && bytes[bytes.len() - 1] == bytes[0];
    Some((key, if quoted { &value[1..value.len() - 1] } else { value }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn settings_from(contents: &str) -> Settings {
        let cfg = make_config(contents);
        let vars = read_env_file(cfg.path()).unwrap();
        build_settings(&vars, |_| None).unwrap()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let settings = settings_from("");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.output_dir, PathBuf::from("./users/"));
        assert_eq!(settings.user_agent_mode(), UserAgentMode::Fixed);
    }

    #[test]
    fn new_maps_empty_output_dir_to_default() {
        assert_eq!(Settings::new("", false, false).output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(Settings::new("  ", true, false).output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
        let custom = Settings::new("/tmp/clips", true, true);
        assert_eq!(custom.output_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(custom.user_agent_mode(), UserAgentMode::Random);
        assert!(custom.verbose);
    }

    #[test]
    fn file_values_are_applied() {
        let settings = settings_from(
            "TIKTOKDL_OUTPUT_DIR=\"/data/clips\"\nTIKTOKDL_RANDOM_UA=yes\nTIKTOKDL_VERBOSE=1\nTIKTOKDL_COLOR=off\nTIKTOKDL_ON_DOWNLOAD_FAILURE=continue\n",
        );
        assert_eq!(
            settings,
            Settings {
                output_dir: PathBuf::from("/data/clips"),
                random_user_agent: true,
                verbose: true,
                color: false,
                on_download_failure: FailurePolicy::Continue,
            }
        );
    }

    #[test]
    fn blank_output_dir_falls_back_to_default() {
        let settings = settings_from("TIKTOKDL_OUTPUT_DIR=\"\"\n");
        assert_eq!(settings.output_dir, PathBuf::from(DEFAULT_OUTPUT_DIR));
    }

    #[test]
    fn env_wins_over_file() {
        let vars = read_env_file(make_config("TIKTOKDL_VERBOSE=false\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            if key == VERBOSE_KEY {
                Some("true".to_string())
            } else {
                None
            }
        })
        .unwrap();
        assert!(settings.verbose);
    }

    #[test]
    fn blank_env_value_falls_through_to_file() {
        let vars = read_env_file(make_config("TIKTOKDL_ON_DOWNLOAD_FAILURE=continue\n").path()).unwrap();
        let settings = build_settings(&vars, |key| {
            (key == FAILURE_POLICY_KEY).then(|| "   ".to_string())
        })
        .unwrap();
        assert_eq!(settings.on_download_failure, FailurePolicy::Continue);
    }

    #[test]
    fn mismatched_quotes_are_kept() {
        let vars = read_env_file(make_config("TIKTOKDL_OUTPUT_DIR=\"/data'\nTIKTOKDL_COLOR='\n").path()).unwrap();
        assert_eq!(vars.get(OUTPUT_DIR_KEY).unwrap(), "\"/data'");
        assert_eq!(vars.get(COLOR_KEY).unwrap(), "'");
    }

    #[test]
    fn no_color_env_disables_color_by_default() {
        let settings = build_settings(&HashMap::new(), |key| {
            (key == "NO_COLOR").then(|| "1".to_string())
        })
        .unwrap();
        assert!(!settings.color);
    }

    #[test]
    fn overrides_win_over_everything() {
        let mut vars = HashMap::new();
        vars.insert(OUTPUT_DIR_KEY.to_string(), "/file".to_string());
        vars.insert(RANDOM_UA_KEY.to_string(), "true".to_string());
        vars.insert(FAILURE_POLICY_KEY.to_string(), "continue".to_string());

        let settings = build_settings_with_overrides(
            &vars,
            |key| (key == VERBOSE_KEY).then(|| "true".to_string()),
            SettingsOverrides {
                output_dir: Some(PathBuf::from("/cli")),
                random_user_agent: Some(false),
                verbose: None,
                color: Some(false),
                on_download_failure: Some(FailurePolicy::Abort),
                env_path: None,
            },
        )
        .unwrap();

        assert_eq!(settings.output_dir, PathBuf::from("/cli"));
        assert!(!settings.random_user_agent);
        assert!(settings.verbose);
        assert!(!settings.color);
        assert_eq!(settings.on_download_failure, FailurePolicy::Abort);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let vars = read_env_file(make_config("TIKTOKDL_RANDOM_UA=maybe\n").path()).unwrap();
        let err = build_settings(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains(RANDOM_UA_KEY));

        let vars =
            read_env_file(make_config("TIKTOKDL_ON_DOWNLOAD_FAILURE=explode\n").path()).unwrap();
        let err = build_settings(&vars, |_| None).unwrap_err();
        assert!(err.to_string().contains(FAILURE_POLICY_KEY));
    }

    #[test]
    fn read_env_file_handles_export_and_quotes() {
        let cfg = make_config(
            r#"
            export TIKTOKDL_OUTPUT_DIR="/media"
            TIKTOKDL_COLOR='false'
            TIKTOKDL_VERBOSE =  "on"
            # comment
            INVALID_LINE
            "#,
        );
        let vars = read_env_file(cfg.path()).unwrap();
        assert_eq!(vars.get(OUTPUT_DIR_KEY).unwrap(), "/media");
        assert_eq!(vars.get(COLOR_KEY).unwrap(), "false");
        assert_eq!(vars.get(VERBOSE_KEY).unwrap(), "on");
        assert!(!vars.contains_key("INVALID_LINE"));
    }

    #[test]
    fn read_env_file_missing_file_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = read_env_file(&dir.path().join("missing.env")).unwrap();
        assert!(vars.is_empty());
    }
}
