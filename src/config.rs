use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::mail::MailField;
use crate::error::ConfigError;
use crate::mail::filter::MailFilter;
use crate::secrets;

pub const DEFAULT_FOLDER: &str = "INBOX";
pub const DEFAULT_ALTERNATE_CACHE: usize = 25;
pub const MAX_FETCH_WINDOW_DAYS: u32 = 3650;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
    #[serde(default)]
    pub feeds: BTreeMap<String, FeedConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Minutes between feed sweeps.
    #[serde(default = "default_wait_to_update")]
    pub wait_to_update: u64,
    /// IMAP only offers day granularity on SINCE and no timezone for
    /// INTERNALDATE, so anything under two days risks missing mail.
    #[serde(default = "default_fetch_window_days")]
    pub fetch_window_days: u32,
    pub data_dir: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            wait_to_update: default_wait_to_update(),
            fetch_window_days: default_fetch_window_days(),
            data_dir: None,
            static_dir: None,
        }
    }
}

impl AppConfig {
    /// Accepts the usual `log` level names plus `warning`.
    pub fn level_filter(&self) -> log::LevelFilter {
        let level = self.log_level.trim().to_ascii_lowercase();
        match level.as_str() {
            "warning" => log::LevelFilter::Warn,
            "critical" => log::LevelFilter::Error,
            other => other.parse().unwrap_or(log::LevelFilter::Warn),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccountConfig {
    pub server: ServerOptions,
    pub auth: AuthConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerOptions {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Implicit TLS when true, STARTTLS otherwise.
    #[serde(default = "default_true")]
    pub ssl: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthKind {
    Login,
    #[serde(alias = "oauth2")]
    XOAuth2,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    pub auth_type: AuthKind,
    pub user: String,
    /// Password, or access token for XOAUTH2. Falls back to the OS keyring.
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedConfig {
    pub account_name: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_alternate_cache")]
    pub alternate_cache: usize,
    #[serde(default)]
    pub feed_info: FeedInfo,
    #[serde(default)]
    pub filters: BTreeMap<MailField, FieldRules>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedInfo {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_fqdn")]
    pub fqdn: String,
    #[serde(default = "default_author_name", alias = "author-name")]
    pub author_name: String,
    pub language: Option<String>,
    pub logo: Option<String>,
}

impl Default for FeedInfo {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            fqdn: default_fqdn(),
            author_name: default_author_name(),
            language: None,
            logo: None,
        }
    }
}

impl FeedInfo {
    /// Public URL for a path below the site root, e.g. `feeds/news.xml`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}/{}", self.protocol, self.fqdn, path.trim_start_matches('/'))
    }
}

/// Regex rules for one mail field. See `MailFilter` for how they combine.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FieldRules {
    #[serde(default, alias = "AND")]
    pub and: Vec<String>,
    #[serde(default, alias = "OR")]
    pub or: Vec<String>,
    #[serde(default, alias = "EXCLUDE")]
    pub exclude: Vec<String>,
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_wait_to_update() -> u64 {
    15
}

fn default_fetch_window_days() -> u32 {
    2
}

fn default_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_alternate_cache() -> usize {
    DEFAULT_ALTERNATE_CACHE
}

fn default_protocol() -> String {
    "https://".to_string()
}

fn default_fqdn() -> String {
    "localhost".to_string()
}

fn default_author_name() -> String {
    "mailfeed".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_config(path)
    }

    pub fn feed_names(&self) -> BTreeSet<String> {
        self.feeds.keys().cloned().collect()
    }

    pub fn feed(&self, name: &str) -> Result<&FeedConfig, ConfigError> {
        self.feeds
            .get(name)
            .ok_or_else(|| ConfigError::UnknownFeed(name.to_string()))
    }

    pub fn account(&self, name: &str) -> Result<&AccountConfig, ConfigError> {
        self.accounts
            .get(name)
            .ok_or_else(|| ConfigError::UnknownAccountName(name.to_string()))
    }

    /// Password or token for the account, from the config or the keyring.
    pub fn credentials(&self, account_name: &str) -> Result<String, ConfigError> {
        let account = self.account(account_name)?;
        secrets::resolve_account_secret(account_name, &account.auth)
    }

    pub fn account_for(&self, feed_name: &str) -> Result<&AccountConfig, ConfigError> {
        let feed = self.feed(feed_name)?;
        self.accounts
            .get(&feed.account_name)
            .ok_or_else(|| ConfigError::UnknownAccount {
                feed: feed_name.to_string(),
                account: feed.account_name.clone(),
            })
    }
}

fn config_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::config_dir()
        .ok_or_else(|| ConfigError::Validation {
            message: "no config dir available".to_string(),
        })?
        .join("mailfeed"))
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load the config at `path`, writing a template there first if it is missing.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        write_template(path)?;
        return Err(ConfigError::Validation {
            message: format!(
                "Created template config at {}; edit it and run again",
                path.display()
            ),
        });
    }
    let s = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&s)
}

pub fn parse_config(s: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(s)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn validate_config(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.wait_to_update == 0 {
        return Err(ConfigError::Validation {
            message: "app.wait_to_update must be at least 1 minute".to_string(),
        });
    }
    if cfg.app.fetch_window_days > MAX_FETCH_WINDOW_DAYS {
        return Err(ConfigError::Validation {
            message: format!("app.fetch_window_days must be at most {MAX_FETCH_WINDOW_DAYS}"),
        });
    }
    for (name, feed) in &cfg.feeds {
        if feed.alternate_cache == 0 {
            return Err(ConfigError::Validation {
                message: format!("feeds.{name}.alternate_cache must be at least 1"),
            });
        }
        cfg.account_for(name)?;
        MailFilter::compile(name, &feed.filters)?;
    }
    Ok(())
}

fn write_template(path: &Path) -> Result<(), ConfigError> {
    let mut sample = Config::default();
    sample.accounts.insert(
        "personal".to_string(),
        AccountConfig {
            server: ServerOptions {
                host: "imap.example.com".to_string(),
                port: default_port(),
                ssl: true,
            },
            auth: AuthConfig {
                auth_type: AuthKind::Login,
                user: "you@example.com".to_string(),
                password: None,
            },
        },
    );
    sample.feeds.insert(
        "news".to_string(),
        FeedConfig {
            account_name: "personal".to_string(),
            folder: default_folder(),
            alternate_cache: default_alternate_cache(),
            feed_info: FeedInfo::default(),
            filters: BTreeMap::new(),
        },
    );

    let write_err = |source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tom = toml::to_string_pretty(&sample).map_err(|e| ConfigError::Validation {
        message: format!("failed to render template config: {e}"),
    })?;
    fs::write(path, tom).map_err(write_err)?;
    Ok(())
}

/// Filesystem locations derived from the app section.
#[derive(Debug, Clone)]
pub struct Paths {
    pub db_path: PathBuf,
    pub feed_dir: PathBuf,
    pub alt_dir: PathBuf,
}

impl Paths {
    pub fn from_config(app: &AppConfig) -> Result<Self, ConfigError> {
        let data_dir = match &app.data_dir {
            Some(p) => p.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| ConfigError::Validation {
                    message: "no data dir available; set app.data_dir".to_string(),
                })?
                .join("mailfeed"),
        };
        let static_dir = app
            .static_dir
            .clone()
            .unwrap_or_else(|| data_dir.join("static"));
        Ok(Self::new(&data_dir, &static_dir))
    }

    pub fn new(data_dir: &Path, static_dir: &Path) -> Self {
        Self {
            db_path: data_dir.join("mailfeed.db"),
            feed_dir: static_dir.join("feeds"),
            alt_dir: static_dir.join("alt"),
        }
    }

    pub fn make_run_dirs(&self) -> std::io::Result<()> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&self.feed_dir)?;
        fs::create_dir_all(&self.alt_dir)?;
        Ok(())
    }

    pub fn feed_file(&self, feed_name: &str) -> PathBuf {
        self.feed_dir.join(format!("{feed_name}.xml"))
    }

    pub fn alt_file(&self, alt_id: &str) -> PathBuf {
        self.alt_dir.join(format!("{alt_id}.html"))
    }
}
