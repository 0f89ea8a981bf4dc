//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or an explicit path) relative to the current
//! working directory, then applies `ACADEMY_WORK_DIR` and `ACADEMY_LOG_LEVEL`
//! env overrides.

use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Which [`Storage`](crate::state::storage::Storage) backs the state store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// One JSON file per key under [`StoreConfig::dir`].
    File,
    /// Process memory only; nothing survives a restart.
    Memory,
}

impl StorageBackend {
    fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(AppError::Config(format!(
                "unknown store backend '{other}' (expected \"file\" or \"memory\")"
            ))),
        }
    }
}

/// State store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StorageBackend,
    /// Fixed key the whole document is persisted under.
    pub key: String,
    /// Storage directory (already resolved against `work_dir`).
    pub dir: PathBuf,
}

/// Credential table and user identity settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// username -> lowercase hex SHA-256 of the password.
    pub users: BTreeMap<String, String>,
    /// Domain used to derive `{username}@{domain}` e-mail addresses.
    pub email_domain: String,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Only the newest `max_events` events are kept in the store.
    pub max_events: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressConfig {
    pub points_per_level: u64,
    /// Study minutes credited per completed lesson.
    pub lesson_minutes: u64,
}

/// Fully-resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub academy_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub analytics: AnalyticsConfig,
    pub progress: ProgressConfig,
}

impl Config {
    /// Built-in defaults rooted at `work_dir`, with an empty credential
    /// table and the in-memory backend.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            academy_name: default_academy_name(),
            work_dir: work_dir.to_path_buf(),
            log_level: default_log_level(),
            store: StoreConfig {
                backend: StorageBackend::Memory,
                key: default_store_key(),
                dir: work_dir.join(default_store_dir()),
            },
            auth: AuthConfig {
                users: BTreeMap::new(),
                email_domain: default_email_domain(),
            },
            analytics: AnalyticsConfig {
                max_events: default_max_events(),
            },
            progress: ProgressConfig {
                points_per_level: default_points_per_level(),
                lesson_minutes: default_lesson_minutes(),
            },
        }
    }
}

/// Raw TOML shape, the `serde` target before resolution.
#[derive(Deserialize)]
struct RawConfig {
    academy: RawAcademy,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    auth: RawAuth,
    #[serde(default)]
    analytics: RawAnalytics,
    #[serde(default)]
    progress: RawProgress,
}

#[derive(Deserialize)]
struct RawAcademy {
    #[serde(default = "default_academy_name")]
    name: String,
    work_dir: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_backend")]
    backend: String,
    #[serde(default = "default_store_key")]
    key: String,
    /// Relative paths resolve against `work_dir`.
    #[serde(default = "default_store_dir")]
    dir: String,
}

impl Default for RawStore {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            key: default_store_key(),
            dir: default_store_dir(),
        }
    }
}

#[derive(Deserialize)]
struct RawAuth {
    #[serde(default)]
    users: BTreeMap<String, String>,
    #[serde(default = "default_email_domain")]
    email_domain: String,
}

impl Default for RawAuth {
    fn default() -> Self {
        Self { users: BTreeMap::new(), email_domain: default_email_domain() }
    }
}

#[derive(Deserialize)]
struct RawAnalytics {
    #[serde(default = "default_max_events")]
    max_events: usize,
}

impl Default for RawAnalytics {
    fn default() -> Self {
        Self { max_events: default_max_events() }
    }
}

#[derive(Deserialize)]
struct RawProgress {
    #[serde(default = "default_points_per_level")]
    points_per_level: u64,
    #[serde(default = "default_lesson_minutes")]
    lesson_minutes: u64,
}

impl Default for RawProgress {
    fn default() -> Self {
        Self {
            points_per_level: default_points_per_level(),
            lesson_minutes: default_lesson_minutes(),
        }
    }
}

fn default_academy_name() -> String { "Teacher Alex English Academy".to_string() }
fn default_log_level() -> String { "warn".to_string() }
fn default_backend() -> String { "file".to_string() }
fn default_store_key() -> String { "academy_state".to_string() }
fn default_store_dir() -> String { "state".to_string() }
fn default_email_domain() -> String { "academy.com".to_string() }
fn default_max_events() -> usize { 1000 }
fn default_points_per_level() -> u64 { 1000 }
fn default_lesson_minutes() -> u64 { 15 }

/// Load config from `config_path` (default `config/default.toml`), then
/// apply env-var overrides.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let work_dir_override = env::var("ACADEMY_WORK_DIR").ok();
    let log_level_override = env::var("ACADEMY_LOG_LEVEL").ok();
    load_from(
        Path::new(config_path.unwrap_or(DEFAULT_CONFIG_PATH)),
        work_dir_override.as_deref(),
        log_level_override.as_deref(),
    )
}

/// Load from an explicit path with optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let a = parsed.academy;
    let work_dir = expand_home(work_dir_override.unwrap_or(&a.work_dir));
    let log_level = log_level_override.unwrap_or(&a.log_level).to_string();

    let store_dir = PathBuf::from(&parsed.store.dir);
    let store_dir = if store_dir.is_absolute() { store_dir } else { work_dir.join(store_dir) };

    crate::logger::parse_level(&log_level)?;
    if parsed.store.key.trim().is_empty() {
        return Err(AppError::Config("store.key must not be empty".into()));
    }
    if parsed.progress.points_per_level == 0 {
        return Err(AppError::Config("progress.points_per_level must be positive".into()));
    }

    let users: BTreeMap<String, String> = parsed
        .auth
        .users
        .into_iter()
        .map(|(name, digest)| (name.trim().to_lowercase(), digest.trim().to_lowercase()))
        .collect();
    // Usernames become single state-path segments.
    if let Some(bad) = users.keys().find(|name| name.is_empty() || name.contains('.')) {
        return Err(AppError::Config(format!(
            "auth.users: invalid username '{bad}' (must be non-empty and contain no '.')"
        )));
    }

    Ok(Config {
        academy_name: a.name,
        work_dir,
        log_level,
        store: StoreConfig {
            backend: StorageBackend::parse(&parsed.store.backend)?,
            key: parsed.store.key,
            dir: store_dir,
        },
        auth: AuthConfig {
            users,
            email_domain: parsed.auth.email_domain,
        },
        analytics: AnalyticsConfig {
            max_events: parsed.analytics.max_events,
        },
        progress: ProgressConfig {
            points_per_level: parsed.progress.points_per_level,
            lesson_minutes: parsed.progress.lesson_minutes,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
