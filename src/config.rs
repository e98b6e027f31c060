//! Process configuration from environment variables

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::collaborators::DEFAULT_NOMINATIM_URL;
use crate::matching::location::InvalidBounds;
use crate::matching::provider::DEFAULT_CANDIDATE_LIMIT;
use crate::matching::GeoBounds;
use crate::runtime::RuntimeSettings;

const DEFAULT_CLOUD_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("HUSTLR_BOUNDS: {0}")]
    Bounds(#[from] InvalidBounds),

    #[error("unknown session backend {0:?} (expected sqlite or sled)")]
    UnknownBackend(String),

    #[error("HUSTLR_SESSION_BACKENDS lists no backend")]
    NoBackends,

    #[error("{0:?} is local to one process and cannot back sessions shared by several instances")]
    LocalBackendShared(BackendKind),
}

/// Session backend kinds, in the order they are tried
///
/// `Sled` is a file owned by one process: every instance falling back to it
/// writes its own copy, so it is only allowed for single-instance deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sqlite,
    Sled,
}

impl BackendKind {
    /// Visible to every instance of the deployment
    pub fn is_shared(self) -> bool {
        matches!(self, BackendKind::Sqlite)
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(BackendKind::Sqlite),
            "sled" => Ok(BackendKind::Sled),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Parse a comma-separated backend ranking, dropping repeats
pub fn parse_backends(value: &str) -> Result<Vec<BackendKind>, ConfigError> {
    let mut kinds = Vec::new();
    for part in value.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: BackendKind = part.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    if kinds.is_empty() {
        return Err(ConfigError::NoBackends);
    }
    Ok(kinds)
}

/// Reject process-local backends when several instances share sessions
pub fn check_backends(kinds: &[BackendKind], multi_instance: bool) -> Result<(), ConfigError> {
    match kinds.iter().find(|k| !k.is_shared()) {
        Some(kind) if multi_instance => Err(ConfigError::LocalBackendShared(*kind)),
        _ => Ok(()),
    }
}

/// Where the Cloud API access token comes from
#[derive(Clone)]
pub enum TokenSource {
    Inline(String),
    /// Read on every transport (re)build so a rotated token is picked up
    /// on SIGHUP
    File(PathBuf),
}

impl std::fmt::Debug for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Inline(_) => f.write_str("Inline(<redacted>)"),
            TokenSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

impl TokenSource {
    pub fn token(&self) -> std::io::Result<String> {
        match self {
            TokenSource::Inline(token) => Ok(token.clone()),
            TokenSource::File(path) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
        }
    }
}

/// WhatsApp Cloud API settings
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    /// Full messages endpoint
    pub messages_url: String,
    pub token: TokenSource,
}

impl WhatsAppConfig {
    /// `None` unless a token (inline or file) and a phone number id (or
    /// explicit API URL) are set
    pub fn from_env() -> Option<Self> {
        let token = match var("WHATSAPP_ACCESS_TOKEN_FILE") {
            Some(path) => TokenSource::File(PathBuf::from(path)),
            None => TokenSource::Inline(var("WHATSAPP_ACCESS_TOKEN")?),
        };
        let messages_url = match var("WHATSAPP_API_URL") {
            Some(url) => url,
            None => {
                let phone_number_id = var("WHATSAPP_PHONE_NUMBER_ID")?;
                format!("{DEFAULT_CLOUD_API_BASE}/{phone_number_id}/messages")
            }
        };
        Some(Self { messages_url, token })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_path: PathBuf,
    pub sled_path: PathBuf,
    pub session_backends: Vec<BackendKind>,
    /// More than one process serves the same users
    pub multi_instance: bool,
    /// Extra service keywords (JSON list of `{pattern, service}`)
    pub service_keywords: Option<PathBuf>,
    pub max_candidates: usize,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    /// Nominatim by default; `off` disables reverse geocoding
    pub geocoder_url: Option<String>,
    pub geocoder_timeout: Duration,
    /// Intent classification is disabled when unset
    pub classifier_url: Option<String>,
    pub classifier_timeout: Duration,
    pub transport_timeout: Duration,
    pub bounds: GeoBounds,
    /// Messages are only logged when unset
    pub whatsapp: Option<WhatsAppConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_dir = var("HUSTLR_DATA_DIR").map_or_else(
            || {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".hustlr")
            },
            PathBuf::from,
        );

        let multi_instance = parsed("HUSTLR_MULTI_INSTANCE", false)?;
        let default_backends = if multi_instance { "sqlite" } else { "sqlite,sled" };
        let session_backends = parse_backends(
            &var("HUSTLR_SESSION_BACKENDS").unwrap_or_else(|| default_backends.to_string()),
        )?;
        check_backends(&session_backends, multi_instance)?;

        Ok(Self {
            port: parsed("HUSTLR_PORT", 8000)?,
            db_path: var("HUSTLR_DB_PATH").map_or_else(|| data_dir.join("hustlr.db"), PathBuf::from),
            sled_path: var("HUSTLR_SLED_PATH").map_or_else(|| data_dir.join("sessions.sled"), PathBuf::from),
            session_backends,
            multi_instance,
            service_keywords: var("HUSTLR_SERVICE_KEYWORDS").map(PathBuf::from),
            max_candidates: parsed("HUSTLR_MAX_CANDIDATES", DEFAULT_CANDIDATE_LIMIT)?,
            breaker_threshold: parsed("HUSTLR_BREAKER_THRESHOLD", 3)?,
            breaker_cooldown: Duration::from_secs(parsed("HUSTLR_BREAKER_COOLDOWN_SECS", 30)?),
            geocoder_url: match var("HUSTLR_GEOCODER_URL") {
                Some(url) if url.trim().eq_ignore_ascii_case("off") => None,
                Some(url) => Some(url),
                None => Some(DEFAULT_NOMINATIM_URL.to_string()),
            },
            geocoder_timeout: millis("HUSTLR_GEOCODER_TIMEOUT_MS", 4000)?,
            classifier_url: var("HUSTLR_CLASSIFIER_URL"),
            classifier_timeout: millis("HUSTLR_CLASSIFIER_TIMEOUT_MS", 3000)?,
            transport_timeout: millis("HUSTLR_TRANSPORT_TIMEOUT_MS", 10_000)?,
            bounds: var("HUSTLR_BOUNDS")
                .map(|b| b.parse::<GeoBounds>())
                .transpose()?
                .unwrap_or_default(),
            whatsapp: WhatsAppConfig::from_env(),
        })
    }

    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            max_candidates: self.max_candidates,
            bounds: self.bounds,
            geocoder_timeout: self.geocoder_timeout,
            classifier_timeout: self.classifier_timeout,
            ..RuntimeSettings::default()
        }
    }
}

/// Set and non-blank
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { var: name, value }),
    }
}

fn millis(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parsed(name, default).map(Duration::from_millis)
}
