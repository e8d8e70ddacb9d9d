//! User configuration
//!
//! Read from `config.toml` or `config.json` in the config directory. Command
//! line flags and environment variables override the file.

use crate::cli::GatewayArgs;
use crate::paths;
use anyhow::{Context, Result, bail};
use gateway::HttpGateway;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Admin API address used when nothing else is configured
pub const DEFAULT_ADMIN_URL: &str = "http://localhost:8001";

/// Default number of parallel gateway calls
pub const DEFAULT_JOBS: usize = 4;

/// Supported config file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Toml => "config.toml",
            Self::Json => "config.json",
        }
    }
}

/// Find the config file in `dir`, preferring TOML.
pub fn find_config_file(dir: &Path) -> Option<(PathBuf, ConfigFormat)> {
    [ConfigFormat::Toml, ConfigFormat::Json]
        .into_iter()
        .map(|format| (dir.join(format.file_name()), format))
        .find(|(path, _)| path.is_file())
}

/// Contents of the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub admin_url: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub jobs: Option<usize>,
    pub select_tags: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load the config file from the config directory, if there is one.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_dir()?)
    }

    pub fn load_from(dir: &Path) -> Result<Self> {
        let Some((path, format)) = find_config_file(dir) else {
            log::debug!("No config file in {}", dir.display());
            return Ok(Self::default());
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config = match format {
            ConfigFormat::Toml => toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            ConfigFormat::Json => serde_json::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
        };
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Effective settings after merging the config file with flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub admin_url: String,
    pub headers: Vec<(String, String)>,
    pub select_tags: Vec<String>,
    pub jobs: usize,
    pub timeout: Option<Duration>,
}

impl Settings {
    pub fn resolve(file: FileConfig, args: &GatewayArgs) -> Result<Self> {
        let mut headers: BTreeMap<String, String> = file.headers;
        for raw in &args.headers {
            let (name, value) = parse_header(raw)?;
            headers.insert(name, value);
        }

        let mut select_tags = file.select_tags;
        for tag in &args.select_tags {
            if !select_tags.contains(tag) {
                select_tags.push(tag.clone());
            }
        }

        let admin_url = args
            .admin_url
            .clone()
            .or(file.admin_url)
            .unwrap_or_else(|| DEFAULT_ADMIN_URL.to_string());

        Ok(Self {
            admin_url,
            headers: headers.into_iter().collect(),
            select_tags,
            jobs: file.jobs.unwrap_or(DEFAULT_JOBS),
            timeout: file.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Apply per-run overrides from the sync command.
    pub fn with_run_overrides(mut self, jobs: Option<usize>, timeout_secs: Option<u64>) -> Self {
        if let Some(jobs) = jobs {
            self.jobs = jobs;
        }
        if let Some(secs) = timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        self
    }

    /// HTTP client for the configured Admin API.
    pub fn gateway(&self) -> HttpGateway {
        self.headers
            .iter()
            .fold(HttpGateway::new(&self.admin_url), |gw, (name, value)| {
                gw.with_header(name, value)
            })
    }
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Invalid header '{raw}': expected NAME:VALUE");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{raw}': empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_is_default() {
        let dir = TempDir::new().unwrap();
        assert_eq!(FileConfig::load_from(dir.path()).unwrap(), FileConfig::default());
    }

    #[test]
    fn test_load_toml_before_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "admin_url = \"http://kong:8001\"\njobs = 8\n\n[headers]\nKong-Admin-Token = \"t\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("config.json"), r#"{"jobs": 2}"#).unwrap();

        let config = FileConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.admin_url.as_deref(), Some("http://kong:8001"));
        assert_eq!(config.jobs, Some(8));
        assert_eq!(config.headers["Kong-Admin-Token"], "t");
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"select_tags": ["team-a"], "timeout_secs": 60}"#,
        )
        .unwrap();
        let config = FileConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.select_tags, ["team-a"]);
        assert_eq!(config.timeout_secs, Some(60));
    }

    #[test]
    fn test_invalid_config_names_the_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.toml"), "jobs = \"many\"").unwrap();
        let err = FileConfig::load_from(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("config.toml"));
    }

    #[test]
    fn test_flags_override_file() {
        let file = FileConfig {
            admin_url: Some("http://file:8001".to_string()),
            headers: BTreeMap::from([("Kong-Admin-Token".to_string(), "old".to_string())]),
            jobs: Some(2),
            select_tags: vec!["a".to_string()],
            timeout_secs: None,
        };
        let args = GatewayArgs {
            admin_url: Some("http://flag:8001".to_string()),
            headers: vec!["Kong-Admin-Token: new".to_string()],
            select_tags: vec!["a".to_string(), "b".to_string()],
        };

        let settings = Settings::resolve(file, &args)
            .unwrap()
            .with_run_overrides(Some(6), Some(30));
        assert_eq!(settings.admin_url, "http://flag:8001");
        assert_eq!(
            settings.headers,
            [("Kong-Admin-Token".to_string(), "new".to_string())]
        );
        assert_eq!(settings.select_tags, ["a", "b"]);
        assert_eq!(settings.jobs, 6);
        assert_eq!(settings.timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.gateway().base_url(), "http://flag:8001");
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(FileConfig::default(), &GatewayArgs::default()).unwrap();
        assert_eq!(settings.admin_url, DEFAULT_ADMIN_URL);
        assert_eq!(settings.jobs, DEFAULT_JOBS);
        assert_eq!(settings.timeout, None);
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("X-Token:abc:def").unwrap(),
            ("X-Token".to_string(), "abc:def".to_string())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(":value").is_err());
    }
}
