use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// In-memory database marker for `VIPWATCH_DB_PATH`.
pub const IN_MEMORY_DB: &str = ":memory:";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("cannot read config file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Which face collection the daemon talks to.
#[derive(Debug, Clone, PartialEq)]
pub enum MatcherBackend {
    /// Hosted face-collection service.
    Remote {
        endpoint: String,
        collection_id: String,
        api_key: Option<String>,
    },
    /// In-process fingerprint matcher (development only).
    Memory,
}

/// Daemon configuration.
///
/// Sources, highest precedence first: `VIPWATCH_*` environment variables
/// (a `.env` file is loaded into the environment), then the TOML file named
/// by `VIPWATCH_CONFIG`, whose keys are the variable names without the
/// prefix, lowercased (`matcher_url = "..."`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: SocketAddr,
    pub matcher: MatcherBackend,
    /// SQLite database file, or `:memory:`.
    pub db_path: PathBuf,
    /// Create the detection-log date index at startup.
    pub provision_date_index: bool,
    /// Minimum similarity (percent) for a match.
    pub similarity_threshold: f32,
    /// Upper bound in seconds on each face-service or store call.
    pub call_timeout_secs: u64,
    /// Days of absence before a match is announced as returning.
    pub returning_after_days: i64,
    /// Directory holding the web UI; not mounted when unset.
    pub static_dir: Option<PathBuf>,
    /// Request body limit for enrollment uploads.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `.env`, the optional TOML file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let file = match std::env::var("VIPWATCH_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::File { path, source })?;
                Some(text.parse::<toml::Table>()?)
            }
            Err(_) => None,
        };

        Self::resolve(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| file.as_ref().and_then(|t| file_value(t, key)))
        })
    }

    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let matcher = match lookup("VIPWATCH_MATCHER").as_deref().unwrap_or("remote") {
            "remote" => MatcherBackend::Remote {
                endpoint: lookup("VIPWATCH_MATCHER_URL")
                    .ok_or(ConfigError::Missing("VIPWATCH_MATCHER_URL"))?,
                collection_id: lookup("VIPWATCH_COLLECTION_ID")
                    .ok_or(ConfigError::Missing("VIPWATCH_COLLECTION_ID"))?,
                api_key: lookup("VIPWATCH_MATCHER_API_KEY"),
            },
            "memory" => MatcherBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "VIPWATCH_MATCHER",
                    value: other.to_string(),
                    reason: "expected 'remote' or 'memory'".into(),
                })
            }
        };

        let db_path = lookup("VIPWATCH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| default_data_dir().join("vipwatch.db"));

        Ok(Self {
            bind: parse(&lookup, "VIPWATCH_BIND", SocketAddr::from(([0, 0, 0, 0], 8000)))?,
            matcher,
            db_path,
            provision_date_index: parse_bool(&lookup, "VIPWATCH_PROVISION_DATE_INDEX", true)?,
            similarity_threshold: parse(&lookup, "VIPWATCH_SIMILARITY_THRESHOLD", 98.0)?,
            call_timeout_secs: parse(&lookup, "VIPWATCH_CALL_TIMEOUT_SECS", 5)?,
            returning_after_days: parse(&lookup, "VIPWATCH_RETURNING_AFTER_DAYS", 30)?,
            static_dir: lookup("VIPWATCH_STATIC_DIR").map(PathBuf::from),
            max_upload_bytes: parse(&lookup, "VIPWATCH_MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
        })
    }

    pub fn in_memory_db(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY_DB
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vipwatch")
}

/// `VIPWATCH_MATCHER_URL` → `matcher_url` in the TOML file.
fn file_value(table: &toml::Table, key: &str) -> Option<String> {
    let name = key.strip_prefix("VIPWATCH_")?.to_ascii_lowercase();
    match table.get(&name)? {
        toml::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
