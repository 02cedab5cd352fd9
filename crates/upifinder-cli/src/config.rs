//! Configuration loading from TOML files

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;

use upifinder_core::scan::{DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECK_WORKERS, DEFAULT_WALK_WORKERS};

use crate::cmd::{OutputFormat, parse_duration};

/// Global configuration for upifinder
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Glob patterns scanned when no path is given on the command line
    #[serde(deserialize_with = "deserialize_patterns")]
    pub archives: Vec<String>,
    pub workers: WorkersConfig,
    pub scan: ScanConfig,
    pub check: CheckConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub walk: usize,
    pub check: usize,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            walk: DEFAULT_WALK_WORKERS,
            check: DEFAULT_CHECK_WORKERS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub channel_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub min_duration: TimeDelta,
    pub keep_invalid: bool,
    pub all_gaps: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

/// Patterns referencing an unset variable are dropped with a warning.
fn deserialize_patterns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let patterns: Vec<String> = Vec::deserialize(deserializer)?;
    Ok(patterns
        .into_iter()
        .filter_map(|p| {
            let expanded = expand_env_vars(&p);
            if expanded.is_none() {
                log::warn!("archive pattern {p:?} references an unset variable, skipped");
            }
            expanded
        })
        .collect())
}

/// Expand every `${VAR}` in `s`. `None` if a variable is unset.
fn expand_env_vars(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(ix) = rest.find("${") {
        let Some(len) = rest[ix + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..ix]);
        out.push_str(&std::env::var(&rest[ix + 2..ix + 2 + len]).ok()?);
        rest = &rest[ix + 3 + len..];
    }
    out.push_str(rest);
    Some(out)
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./upifinder.toml (current directory)
    /// 2. ~/.config/upifinder/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("upifinder.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "upifinder") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Expand the `archives` glob patterns into existing paths, sorted.
    pub fn archive_roots(&self) -> Result<Vec<PathBuf>> {
        let mut roots = Vec::new();
        for pattern in &self.archives {
            let paths = glob::glob(pattern)
                .with_context(|| format!("Invalid archive pattern: {pattern}"))?;
            for entry in paths {
                match entry {
                    Ok(path) => roots.push(path),
                    Err(e) => log::warn!("{e}"),
                }
            }
        }
        roots.sort();
        roots.dedup();
        Ok(roots)
    }
}
