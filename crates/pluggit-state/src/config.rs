//! Store configuration
//!
//! Reads:
//! - PLUGGIT_DATABASE_URL (optional, default: "ws://localhost:8000")
//! - PLUGGIT_DB_NAMESPACE (optional, default: "pluggit")
//! - PLUGGIT_DB_DATABASE (optional, default: "feeds")
//! - PLUGGIT_DB_USERNAME / PLUGGIT_DB_PASSWORD (optional, both or neither)
//! - PLUGGIT_DB_ROOT (optional, default: "false") - set to "true" for root users
//! - PLUGGIT_DB_TIMEOUT_MS (optional, default: 5000)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StateError;
use crate::Result;

pub const DEFAULT_TARGET: &str = "ws://localhost:8000";
pub const DEFAULT_NAMESPACE: &str = "pluggit";
pub const DEFAULT_DATABASE: &str = "feeds";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

pub const ENV_TARGET: &str = "PLUGGIT_DATABASE_URL";
pub const ENV_NAMESPACE: &str = "PLUGGIT_DB_NAMESPACE";
pub const ENV_DATABASE: &str = "PLUGGIT_DB_DATABASE";
pub const ENV_USERNAME: &str = "PLUGGIT_DB_USERNAME";
pub const ENV_PASSWORD: &str = "PLUGGIT_DB_PASSWORD";
pub const ENV_ROOT: &str = "PLUGGIT_DB_ROOT";
pub const ENV_TIMEOUT_MS: &str = "PLUGGIT_DB_TIMEOUT_MS";

/// Storage engine selected by a connection target's scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetScheme {
    Memory,
    SurrealKv,
    RocksDb,
    Ws,
    Wss,
    Http,
    Https,
}

impl TargetScheme {
    fn parse(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "mem" | "memory" => Some(TargetScheme::Memory),
            "surrealkv" => Some(TargetScheme::SurrealKv),
            "rocksdb" => Some(TargetScheme::RocksDb),
            "ws" => Some(TargetScheme::Ws),
            "wss" => Some(TargetScheme::Wss),
            "http" => Some(TargetScheme::Http),
            "https" => Some(TargetScheme::Https),
            _ => None,
        }
    }

    /// Whether the target names a remote server rather than an embedded engine
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            TargetScheme::Ws | TargetScheme::Wss | TargetScheme::Http | TargetScheme::Https
        )
    }
}

/// A syntactically valid connection descriptor (`scheme://rest`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    raw: String,
    scheme: TargetScheme,
}

impl ConnectionTarget {
    pub fn parse(target: &str) -> Result<Self> {
        let malformed = |reason: &str| StateError::MalformedTarget {
            target: target.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(malformed("empty target"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }

        let (scheme, rest) = trimmed
            .split_once("://")
            .ok_or_else(|| malformed("expected scheme://address"))?;
        let scheme = TargetScheme::parse(scheme)
            .ok_or_else(|| malformed(&format!("unsupported scheme {scheme:?}")))?;

        if scheme != TargetScheme::Memory && rest.is_empty() {
            return Err(malformed("missing address"));
        }
        if scheme.is_remote() {
            let authority = rest.split('/').next().unwrap_or_default();
            let (host, port) = split_authority(authority)
                .ok_or_else(|| malformed("malformed IPv6 host"))?;
            if let Some(port) = port {
                if port.parse::<u16>().is_err() {
                    return Err(malformed(&format!("invalid port {port:?}")));
                }
            }
            if host.is_empty() || host == "[]" {
                return Err(malformed("missing host"));
            }
        }

        Ok(Self {
            raw: trimmed.to_string(),
            scheme,
        })
    }

    /// In-memory target, mostly for tests
    pub fn memory() -> Self {
        Self {
            raw: "mem://".to_string(),
            scheme: TargetScheme::Memory,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> TargetScheme {
        self.scheme
    }
}

/// Split `host[:port]`, where host may be a bracketed IPv6 literal.
fn split_authority(authority: &str) -> Option<(&str, Option<&str>)> {
    if authority.starts_with('[') {
        let close = authority.find(']')?;
        let (host, after) = authority.split_at(close + 1);
        return match after.strip_prefix(':') {
            Some(port) => Some((host, Some(port))),
            None if after.is_empty() => Some((host, None)),
            None => None,
        };
    }
    Some(match authority.rsplit_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    })
}

impl FromStr for ConnectionTarget {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self> {
        ConnectionTarget::parse(s)
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Sign-in credentials for a remote server
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Root user (true) or database user (false)
    pub is_root: bool,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("is_root", &self.is_root)
            .finish()
    }
}

/// Everything needed to open a store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub target: ConnectionTarget,
    pub namespace: String,
    pub database: String,
    pub credentials: Option<Credentials>,
    /// Upper bound on every backend call
    pub op_timeout: Duration,
}

impl StoreConfig {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            credentials: None,
            op_timeout: DEFAULT_TIMEOUT,
        }
    }

    /// In-memory configuration
    pub fn memory() -> Self {
        Self::new(ConnectionTarget::memory())
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let target = match var(ENV_TARGET) {
            Some(raw) => ConnectionTarget::parse(&raw)?,
            None => ConnectionTarget::parse(DEFAULT_TARGET)?,
        };

        let mut config = Self::new(target);
        if let Some(ns) = var(ENV_NAMESPACE) {
            config.namespace = ns;
        }
        if let Some(db) = var(ENV_DATABASE) {
            config.database = db;
        }

        config.credentials = match (var(ENV_USERNAME), var(ENV_PASSWORD)) {
            (Some(username), Some(password)) => Some(Credentials {
                username,
                password,
                is_root: var(ENV_ROOT)
                    .map(|v| v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            }),
            (None, None) => None,
            _ => {
                return Err(StateError::Config(format!(
                    "{ENV_USERNAME} and {ENV_PASSWORD} must be set together"
                )))
            }
        };

        if let Some(ms) = var(ENV_TIMEOUT_MS) {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                StateError::Config(format!("{ENV_TIMEOUT_MS} is not a number: {ms:?}"))
            })?;
            if ms == 0 {
                return Err(StateError::Config(format!(
                    "{ENV_TIMEOUT_MS} must be greater than zero"
                )));
            }
            config.op_timeout = Duration::from_millis(ms);
        }

        Ok(config)
    }
}
