//! Process configuration read from the environment (and an optional `.env` file).

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TIER_NAME: &str = "Bronze";
const DEFAULT_WRITE_RETRIES: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    /// Unrecognised values fall back to development.
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub loyalty: LoyaltyConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = read_var("APP_ENV")
            .map(|raw| AppEnvironment::parse(&raw))
            .unwrap_or(AppEnvironment::Development);

        let port = match read_var("APP_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort)?,
            None => DEFAULT_PORT,
        };
        let server = ServerConfig {
            host: read_var("APP_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
        };

        let telemetry = TelemetryConfig {
            log_level: read_var("APP_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        Ok(Self {
            environment,
            server,
            telemetry,
            loyalty: LoyaltyConfig::from_env()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// `localhost` is accepted alongside literal IPv4/IPv6 addresses.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip = if self.host.eq_ignore_ascii_case("localhost") {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.host
                .parse::<IpAddr>()
                .map_err(|source| ConfigError::InvalidHost { source })?
        };
        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

/// Business-rule dials shared by every tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoyaltyConfig {
    /// Tier name assigned on enrollment when a program has no tiers configured.
    pub default_tier_name: String,
    /// How many times a stale loyalty write is re-read and retried.
    pub write_retries: u8,
}

impl LoyaltyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let default_tier_name = match read_var("LOYALTY_DEFAULT_TIER") {
            Some(name) if name.is_empty() => return Err(ConfigError::EmptyDefaultTier),
            Some(name) => name,
            None => DEFAULT_TIER_NAME.to_string(),
        };
        let write_retries = match read_var("LOYALTY_WRITE_RETRIES") {
            Some(raw) => raw
                .parse::<u8>()
                .map_err(|_| ConfigError::InvalidWriteRetries)?,
            None => DEFAULT_WRITE_RETRIES,
        };

        Ok(Self {
            default_tier_name,
            write_retries,
        })
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            default_tier_name: DEFAULT_TIER_NAME.to_string(),
            write_retries: DEFAULT_WRITE_RETRIES,
        }
    }
}

/// Trimmed value of `key`; `None` when unset or not valid unicode.
fn read_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    EmptyDefaultTier,
    InvalidWriteRetries,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a port number (0-65535)"),
            ConfigError::InvalidHost { source } => {
                write!(f, "APP_HOST is not an IP address or localhost: {}", source)
            }
            ConfigError::EmptyDefaultTier => {
                write!(f, "LOYALTY_DEFAULT_TIER must not be blank")
            }
            ConfigError::InvalidWriteRetries => {
                write!(f, "LOYALTY_WRITE_RETRIES must be an integer between 0 and 255")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::EmptyDefaultTier
            | ConfigError::InvalidWriteRetries => None,
        }
    }
}
