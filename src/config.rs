//! Runtime configuration.
//!
//! Values come from an optional TOML file (named by `WARDEN_CONFIG`) and are
//! then overridden by `WARDEN_*` environment variables. Forked children
//! inherit the environment, so parent and child always agree on where the
//! lock lives.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_ENV: &str = "WARDEN_CONFIG";
pub const RUN_DIR_ENV: &str = "WARDEN_RUN_DIR";
pub const FALLBACK_DIR_ENV: &str = "WARDEN_FALLBACK_DIR";
pub const LOG_ENV: &str = "WARDEN_LOG";
pub const VERBOSE_ENV: &str = "WARDEN_VERBOSE";
pub const WORK_SECS_ENV: &str = "WARDEN_WORK_SECS";
pub const RESPAWN_DELAY_ENV: &str = "WARDEN_RESPAWN_DELAY_MS";

const DEFAULT_RUN_DIR: &str = "/var/run";

/// Where log events end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    Discard,
    #[default]
    Stderr,
    Syslog,
}

impl FromStr for LogTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discard" | "none" | "off" => Ok(LogTarget::Discard),
            "stderr" | "stream" => Ok(LogTarget::Stderr),
            "syslog" => Ok(LogTarget::Syslog),
            other => bail!("unknown log target '{other}' (expected discard, stderr or syslog)"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub target: LogTarget,
    /// Emit debug-level events as well as normal ones
    pub verbose: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Preferred lock directory, used only when owned by the effective user
    pub run_dir: PathBuf,
    /// Shared directory used when `run_dir` belongs to someone else
    pub fallback_dir: PathBuf,
    /// PID of the system init process, used by the daemon heuristic
    pub init_pid: i32,
    /// Pause between respawn iterations
    pub respawn_delay_ms: u64,
    pub log: LogConfig,
    /// How long the demo workload runs once resident; unset means until signalled
    pub work_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run_dir: PathBuf::from(DEFAULT_RUN_DIR),
            fallback_dir: std::env::temp_dir(),
            init_pid: 1,
            respawn_delay_ms: 0,
            log: LogConfig::default(),
            work_secs: None,
        }
    }
}

impl Config {
    /// Load the file named by `WARDEN_CONFIG` (if any), then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path))?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay values from an environment lookup.
    ///
    /// Empty values are ignored so `WARDEN_RUN_DIR=` does not clobber the
    /// file setting.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(RUN_DIR_ENV) {
            self.run_dir = PathBuf::from(dir);
        }
        if let Some(dir) = get(FALLBACK_DIR_ENV) {
            self.fallback_dir = PathBuf::from(dir);
        }
        if let Some(target) = get(LOG_ENV) {
            self.log.target = target.parse()?;
        }
        if let Some(verbose) = get(VERBOSE_ENV) {
            self.log.verbose = parse_flag(&verbose);
        }
        if let Some(secs) = get(WORK_SECS_ENV) {
            let secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{WORK_SECS_ENV} must be a whole number of seconds"))?;
            self.work_secs = Some(secs);
        }
        if let Some(ms) = get(RESPAWN_DELAY_ENV) {
            self.respawn_delay_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("{RESPAWN_DELAY_ENV} must be a whole number of milliseconds"))?;
        }
        Ok(())
    }

    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_delay_ms)
    }

    pub fn work_duration(&self) -> Option<Duration> {
        self.work_secs.map(Duration::from_secs)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
