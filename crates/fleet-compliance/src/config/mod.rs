use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::obligations::config::{
    ComplianceConfig, DEFAULT_SCAN_INTERVAL_SECS, DEFAULT_SCAN_PAGE_SIZE,
};
use crate::obligations::domain::ObligationCategory;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub compliance: ComplianceConfig,
    pub archive: ArchiveConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let archive_root =
            env::var("COMPLIANCE_ARCHIVE_ROOT").unwrap_or_else(|_| "./evidence".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            compliance: load_compliance()?,
            archive: ArchiveConfig {
                root: PathBuf::from(archive_root),
            },
        })
    }
}

fn load_compliance() -> Result<ComplianceConfig, ConfigError> {
    let mut config = ComplianceConfig::default();

    for category in ObligationCategory::ordered() {
        let suffix = category.slug().to_ascii_uppercase();

        let notice_var = format!("COMPLIANCE_NOTICE_DAYS_{suffix}");
        if let Some(raw) = read_var(&notice_var) {
            let days = parse_number::<u32>(&notice_var, &raw)?;
            config.notice_window_days.set(category, days);
        }

        let eligibility_var = format!("COMPLIANCE_ELIGIBILITY_DAYS_{suffix}");
        if let Some(raw) = read_var(&eligibility_var) {
            let days = match raw.to_ascii_lowercase().as_str() {
                "none" | "off" | "disabled" => None,
                _ => Some(parse_number::<u32>(&eligibility_var, &raw)?),
            };
            config.eligibility_window_days.set(category, days);
        }
    }

    if let Some(raw) = read_var("COMPLIANCE_SCAN_INTERVAL_SECS") {
        let secs = parse_number::<u64>("COMPLIANCE_SCAN_INTERVAL_SECS", &raw)?;
        if secs == 0 {
            return Err(ConfigError::InvalidNumber {
                var: "COMPLIANCE_SCAN_INTERVAL_SECS".to_string(),
                value: raw,
            });
        }
        config.scan_interval = Duration::from_secs(secs);
    } else {
        config.scan_interval = Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS);
    }

    config.scan_page_size = match read_var("COMPLIANCE_SCAN_PAGE_SIZE") {
        Some(raw) => match parse_number::<usize>("COMPLIANCE_SCAN_PAGE_SIZE", &raw)? {
            0 => {
                return Err(ConfigError::InvalidNumber {
                    var: "COMPLIANCE_SCAN_PAGE_SIZE".to_string(),
                    value: raw,
                })
            }
            size => size,
        },
        None => DEFAULT_SCAN_PAGE_SIZE,
    };

    Ok(config)
}

fn read_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(var: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        var: var.to_string(),
        value: raw.to_string(),
    })
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where evidence files are kept.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub root: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a positive whole number, got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
