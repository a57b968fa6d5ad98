// Configuration loading and parsing (league.toml, credentials.toml).

use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Environment variable consulted when credentials.toml has no API key.
pub const API_KEY_ENV: &str = "SLASHGOLF_API_KEY";

/// Upper bound on `league.status_refresh_interval_secs` (one day).
pub const MAX_REFRESH_INTERVAL_SECS: u64 = 86_400;

const CONFIG_DIR: &str = "config";
const DEFAULTS_DIR: &str = "defaults";
const LEAGUE_FILE: &str = "league.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub feed: FeedConfig,
    pub purses: PurseConfig,
    pub credentials: CredentialsConfig,
    pub db_path: String,
    /// `league.timezone`, parsed.
    pub timezone: Tz,
}

impl Config {
    /// API key from credentials.toml, else from the environment.
    pub fn api_key(&self) -> Option<String> {
        self.credentials
            .slashgolf_api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()))
    }
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire league.toml file.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
    feed: FeedConfig,
    database: DatabaseSection,
    #[serde(default)]
    purses: PurseConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub season_year: i32,
    pub timezone: String,
    #[serde(default = "default_refresh_interval")]
    pub status_refresh_interval_secs: u64,
    #[serde(default = "default_min_field_size")]
    pub min_field_size: usize,
    #[serde(default = "default_deadline_hour")]
    pub fallback_deadline_hour: u32,
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_min_field_size() -> usize {
    50
}

fn default_deadline_hour() -> u32 {
    7
}

/// Provider quota tier. Free mode runs each sync step on fewer days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    #[default]
    Standard,
    Free,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Standard => "standard",
            SyncMode::Free => "free",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub api_host: String,
    pub org_id: String,
    #[serde(default)]
    pub sync_mode: SyncMode,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurseConfig {
    pub default: i64,
    #[serde(default)]
    pub excluded: Vec<String>,
    #[serde(default)]
    pub estimates: HashMap<String, i64>,
}

impl Default for PurseConfig {
    fn default() -> Self {
        Self {
            default: 10_000_000,
            excluded: Vec::new(),
            estimates: HashMap::new(),
        }
    }
}

impl PurseConfig {
    pub fn is_excluded(&self, tournament_name: &str) -> bool {
        self.excluded.iter().any(|name| name == tournament_name)
    }

    /// Purse to assume when the provider reports none.
    pub fn estimate_for(&self, tournament_name: &str) -> i64 {
        self.estimates
            .get(tournament_name)
            .copied()
            .unwrap_or(self.default)
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub slashgolf_api_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not auto-copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join(CONFIG_DIR);

    // --- league.toml (required) ---
    let league_path = config_dir.join(LEAGUE_FILE);
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join(CREDENTIALS_FILE);
    let credentials = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsConfig::default()
    };

    let timezone: Tz = league_file
        .league
        .timezone
        .parse()
        .map_err(|_| ConfigError::ValidationError {
            field: "league.timezone".into(),
            message: format!("unknown time zone `{}`", league_file.league.timezone),
        })?;

    let config = Config {
        league: league_file.league,
        feed: league_file.feed,
        purses: league_file.purses,
        credentials,
        db_path: league_file.database.path,
        timezone,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/league.toml` from `defaults/league.toml` on first run.
///
/// `credentials.toml` is never seeded: it is optional and holds a secret, and
/// `defaults/credentials.toml.example` only documents its shape. Returns the
/// path written, or `None` when the league file was already in place.
pub fn ensure_config_files(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join(CONFIG_DIR).join(LEAGUE_FILE);
    if target.exists() {
        return Ok(None);
    }

    let template = base_dir.join(DEFAULTS_DIR).join(LEAGUE_FILE);
    let contents = std::fs::read(&template).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!(
            "{} is missing and its template {} could not be read ({e}); \
             run from the project root",
            target.display(),
            template.display()
        ),
    })?;

    std::fs::create_dir_all(base_dir.join(CONFIG_DIR))
        .and_then(|()| std::fs::write(&target, contents))
        .map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to seed {}: {e}", target.display()),
        })?;
    Ok(Some(target))
}

/// Loads config relative to the current working directory, seeding the
/// league file from defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    if let Some(seeded) = ensure_config_files(&cwd)? {
        info!("Seeded {} from defaults", seeded.display());
    }
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;
    if league.name.trim().is_empty() {
        return Err(invalid("league.name", "must not be empty"));
    }
    if !(2000..=2100).contains(&league.season_year) {
        return Err(invalid(
            "league.season_year",
            format!("must be between 2000 and 2100, got {}", league.season_year),
        ));
    }
    if !(1..=MAX_REFRESH_INTERVAL_SECS).contains(&league.status_refresh_interval_secs) {
        return Err(invalid(
            "league.status_refresh_interval_secs",
            format!(
                "must be between 1 and {MAX_REFRESH_INTERVAL_SECS}, got {}",
                league.status_refresh_interval_secs
            ),
        ));
    }
    if league.min_field_size == 0 {
        return Err(invalid("league.min_field_size", "must be > 0"));
    }
    if league.fallback_deadline_hour > 23 {
        return Err(invalid(
            "league.fallback_deadline_hour",
            format!("must be between 0 and 23, got {}", league.fallback_deadline_hour),
        ));
    }

    let feed = &config.feed;
    if !feed.base_url.starts_with("http://") && !feed.base_url.starts_with("https://") {
        return Err(invalid(
            "feed.base_url",
            format!("must be an http(s) URL, got `{}`", feed.base_url),
        ));
    }
    if feed.max_attempts == 0 {
        return Err(invalid("feed.max_attempts", "must be >= 1"));
    }
    if feed.timeout_secs == 0 {
        return Err(invalid("feed.timeout_secs", "must be > 0"));
    }
    if feed.max_delay_ms < feed.base_delay_ms {
        return Err(invalid(
            "feed.max_delay_ms",
            format!(
                "must be >= feed.base_delay_ms ({}), got {}",
                feed.base_delay_ms, feed.max_delay_ms
            ),
        ));
    }

    if config.purses.default < 0 {
        return Err(invalid("purses.default", "must be >= 0"));
    }
    if let Some((name, value)) = config.purses.estimates.iter().find(|(_, v)| **v < 0) {
        return Err(invalid(
            "purses.estimates",
            format!("estimate for `{name}` must be >= 0, got {value}"),
        ));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
