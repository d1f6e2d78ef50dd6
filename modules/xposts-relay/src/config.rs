use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use masa_client::{RequestShape, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SEARCH_PATH};
use serde::Deserialize;
use tracing::info;

use crate::backoff::WaitPolicy;
use crate::error::{RelayError, Result};
use crate::poller::PollPolicy;
use crate::scheduler::RetryPolicy;
use crate::seen_store::LogFormat;

pub const DEFAULT_CONFIG_PATH: &str = "relay.toml";
pub const DEFAULT_MAX_RESULTS: u32 = 10;
pub const DEFAULT_POLL_ATTEMPTS: u32 = 5;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_DATA_SOURCE_TYPE: &str = "twitter-scraper";
pub const DEFAULT_SEARCH_METHOD: &str = "searchbyquery";

/// One watched account or query. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDescriptor {
    pub label: String,
    pub handle: Option<String>,
    pub query: String,
    pub log_file: PathBuf,
    /// Require the post author to be `handle` (for queries that return other authors).
    pub match_author: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub base_url: String,
    pub search_path: String,
    pub max_results: u32,
    pub shape: RequestShape,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timing {
    pub request_timeout: Duration,
    pub poll: PollPolicy,
    pub cycle_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll: PollPolicy::default(),
            cycle_delay: DEFAULT_CYCLE_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    Discord { token: String, channel_id: String },
    Slack { webhook_url: String },
    DryRun,
}

/// Application configuration. Secrets come from the environment; the watch
/// list and timing come from the optional TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub search: SearchSettings,
    pub timing: Timing,
    pub sink: SinkConfig,
    pub accounts: Vec<AccountDescriptor>,
    pub log_format: LogFormat,
}

// ---------------------------------------------------------------------------
// TOML file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub search: SearchSection,
    pub poll: PollSection,
    pub cycle: CycleSection,
    pub storage: StorageSection,
    pub accounts: Vec<AccountSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeName {
    Flat,
    Typed,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchSection {
    pub path: Option<String>,
    pub max_results: Option<u32>,
    pub shape: Option<ShapeName>,
    pub data_source_type: Option<String>,
    pub method: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitSection {
    Fixed {
        secs: u64,
    },
    Exponential {
        base_secs: u64,
        #[serde(default = "default_growth")]
        growth: f64,
        max_secs: Option<u64>,
    },
}

fn default_growth() -> f64 {
    2.0
}

impl WaitSection {
    fn to_policy(&self) -> Result<WaitPolicy> {
        match *self {
            WaitSection::Fixed { secs } => Ok(WaitPolicy::Fixed(Duration::from_secs(secs))),
            WaitSection::Exponential {
                base_secs,
                growth,
                max_secs,
            } => {
                if !(growth >= 1.0 && growth.is_finite()) {
                    return Err(RelayError::Config(format!(
                        "backoff growth must be a finite number >= 1.0, got {growth}"
                    )));
                }
                Ok(WaitPolicy::Exponential {
                    base: Duration::from_secs(base_secs),
                    growth,
                    max: max_secs.map(Duration::from_secs),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PollSection {
    /// 0 means unbounded.
    pub max_attempts: Option<u32>,
    pub wait: Option<WaitSection>,
    pub initial_delay_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CycleSection {
    pub delay_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_wait: Option<WaitSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StorageSection {
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AccountSection {
    pub handle: Option<String>,
    pub label: Option<String>,
    pub query: Option<String>,
    pub match_author: Option<bool>,
    pub log_file: Option<PathBuf>,
}

/// Load and parse a TOML config file.
pub fn load_file_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RelayError::Config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        RelayError::Config(format!("failed to parse config file {}: {e}", path.display()))
    })
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

impl Config {
    /// Load `.env`, the TOML file named by `RELAY_CONFIG` (default
    /// `relay.toml`, optional unless named explicitly) and the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let explicit = env_value("RELAY_CONFIG");
        let path = PathBuf::from(
            explicit
                .clone()
                .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string()),
        );
        let file = if path.exists() {
            load_file_config(&path)?
        } else if explicit.is_some() {
            return Err(RelayError::Config(format!(
                "config file {} not found",
                path.display()
            )));
        } else {
            FileConfig::default()
        };

        Self::from_sources(env_value, file)
    }

    /// Assemble and validate a config from an env lookup and a parsed file.
    pub fn from_sources(env: impl Fn(&str) -> Option<String>, file: FileConfig) -> Result<Self> {
        let api_key = required(&env, "MASA_API_KEY")?;
        let sink = sink_from(&env)?;

        let search = SearchSettings {
            base_url: env("MASA_API_BASE").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            search_path: env("MASA_SEARCH_PATH")
                .or(file.search.path.clone())
                .unwrap_or_else(|| DEFAULT_SEARCH_PATH.to_string()),
            max_results: match env("MASA_MAX_RESULTS") {
                Some(raw) => parse_number(&raw, "MASA_MAX_RESULTS")?,
                None => file.search.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            },
            shape: match file.search.shape.unwrap_or(ShapeName::Typed) {
                ShapeName::Flat => RequestShape::Flat,
                ShapeName::Typed => RequestShape::Typed {
                    source_type: env("MASA_DATA_SOURCE_TYPE")
                        .or(file.search.data_source_type.clone())
                        .unwrap_or_else(|| DEFAULT_DATA_SOURCE_TYPE.to_string()),
                    method: env("MASA_SEARCH_METHOD")
                        .or(file.search.method.clone())
                        .unwrap_or_else(|| DEFAULT_SEARCH_METHOD.to_string()),
                },
            },
        };
        if search.max_results == 0 {
            return Err(RelayError::Config("max_results must be at least 1".into()));
        }

        let timing = timing_from(&file)?;
        let log_format = file.storage.format.unwrap_or_default();
        let data_dir = env("DATA_DIR")
            .map(PathBuf::from)
            .or(file.storage.dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));

        let sections: Vec<AccountSection> = if file.accounts.is_empty() {
            env("WATCH_ACCOUNTS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(|h| AccountSection {
                    handle: Some(h.to_string()),
                    ..AccountSection::default()
                })
                .collect()
        } else {
            file.accounts.clone()
        };
        if sections.is_empty() {
            return Err(RelayError::Config(
                "no accounts configured: add [[accounts]] to the config file or set WATCH_ACCOUNTS"
                    .into(),
            ));
        }

        let accounts = sections
            .into_iter()
            .map(|s| account_from(s, &data_dir, log_format))
            .collect::<Result<Vec<_>>>()?;

        let mut log_files = HashSet::new();
        for account in &accounts {
            if !log_files.insert(account.log_file.clone()) {
                return Err(RelayError::Config(format!(
                    "log file {} is shared by more than one account",
                    account.log_file.display()
                )));
            }
        }

        Ok(Self {
            api_key,
            search,
            timing,
            sink,
            accounts,
            log_format,
        })
    }

    /// Log the loaded configuration with secrets shortened.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{head}...({} chars)", val.chars().count())
        }

        info!("Config loaded:");
        info!("  MASA_API_KEY: {}", preview(&self.api_key));
        match &self.sink {
            SinkConfig::Discord { token, channel_id } => {
                info!("  DISCORD_TOKEN: {}", preview(token));
                info!("  CHANNEL_ID: {channel_id}");
            }
            SinkConfig::Slack { webhook_url } => {
                info!("  SLACK_WEBHOOK_URL: {}", preview(webhook_url));
            }
            SinkConfig::DryRun => info!("  DRY_RUN: true"),
        }
        info!(
            base_url = %self.search.base_url,
            path = %self.search.search_path,
            max_results = self.search.max_results,
            "  Search"
        );
        info!(
            poll_attempts = ?self.timing.poll.max_attempts,
            cycle_delay_secs = self.timing.cycle_delay.as_secs(),
            max_retries = self.timing.retry.max_retries,
            "  Timing"
        );
        for account in &self.accounts {
            info!(
                label = %account.label,
                query = %account.query,
                log_file = %account.log_file.display(),
                "  Watching"
            );
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    env(key).ok_or_else(|| RelayError::Config(format!("{key} environment variable is required")))
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| RelayError::Config(format!("{key} must be a number, got {raw:?}")))
}

fn truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn sink_from(env: &impl Fn(&str) -> Option<String>) -> Result<SinkConfig> {
    if env("DRY_RUN").is_some_and(|v| truthy(&v)) {
        return Ok(SinkConfig::DryRun);
    }
    if let Some(token) = env("DISCORD_TOKEN") {
        let channel_id = required(env, "CHANNEL_ID")?;
        return Ok(SinkConfig::Discord { token, channel_id });
    }
    if let Some(webhook_url) = env("SLACK_WEBHOOK_URL") {
        return Ok(SinkConfig::Slack { webhook_url });
    }
    Err(RelayError::Config(
        "no notification sink: set DISCORD_TOKEN and CHANNEL_ID, SLACK_WEBHOOK_URL, or DRY_RUN=true"
            .into(),
    ))
}

fn timing_from(file: &FileConfig) -> Result<Timing> {
    let defaults = Timing::default();

    let request_timeout = file
        .search
        .request_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.request_timeout);
    if request_timeout.is_zero() {
        return Err(RelayError::Config("request_timeout_secs must be positive".into()));
    }

    let poll = PollPolicy {
        max_attempts: match file.poll.max_attempts {
            Some(0) => None,
            Some(n) => Some(n),
            None => Some(DEFAULT_POLL_ATTEMPTS),
        },
        wait: match &file.poll.wait {
            Some(w) => w.to_policy()?,
            None => WaitPolicy::Fixed(DEFAULT_POLL_INTERVAL),
        },
        initial_delay: file
            .poll
            .initial_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(Duration::ZERO),
    };
    if poll.max_attempts.is_none() && poll.wait.delay(0).is_zero() {
        return Err(RelayError::Config(
            "unbounded polling (max_attempts = 0) needs a positive poll wait".into(),
        ));
    }

    let cycle_delay = file
        .cycle
        .delay_secs
        .map(Duration::from_secs)
        .unwrap_or(defaults.cycle_delay);
    if cycle_delay.is_zero() {
        return Err(RelayError::Config("cycle delay_secs must be positive".into()));
    }

    let retry = RetryPolicy {
        max_retries: file
            .cycle
            .max_retries
            .unwrap_or(defaults.retry.max_retries),
        wait: match &file.cycle.retry_wait {
            Some(w) => w.to_policy()?,
            None => defaults.retry.wait,
        },
    };

    Ok(Timing {
        request_timeout,
        poll,
        cycle_delay,
        retry,
    })
}

fn account_from(
    section: AccountSection,
    data_dir: &Path,
    format: LogFormat,
) -> Result<AccountDescriptor> {
    let handle = section
        .handle
        .map(|h| h.trim().trim_start_matches('@').to_string())
        .filter(|h| !h.is_empty());
    let query = match (section.query.filter(|q| !q.trim().is_empty()), &handle) {
        (Some(q), _) => q.trim().to_string(),
        (None, Some(h)) => format!("from:{h}"),
        (None, None) => {
            return Err(RelayError::Config(
                "every account needs a handle or a query".into(),
            ))
        }
    };
    let label = section
        .label
        .filter(|l| !l.trim().is_empty())
        .or_else(|| handle.clone())
        .unwrap_or_else(|| query.clone());
    let match_author = section.match_author.unwrap_or(false);
    if match_author && handle.is_none() {
        return Err(RelayError::Config(format!(
            "account {label}: match_author needs a handle"
        )));
    }

    let log_file = match section.log_file {
        Some(p) if p.is_relative() => data_dir.join(p),
        Some(p) => p,
        None => data_dir.join(format!(
            "tweets-log-{}.{}",
            slug(&label),
            format.extension()
        )),
    };

    Ok(AccountDescriptor {
        label,
        handle,
        query,
        log_file,
        match_author,
    })
}

fn slug(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
