use crate::config::ConfigError;
use crate::obligations::alerts::{AlertStoreError, ScanError};
use crate::obligations::renewal::RenewalError;
use crate::obligations::rules::RuleError;
use crate::obligations::store::StoreError;
use crate::telemetry::TelemetryError;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Rule(RuleError),
    Renewal(RenewalError),
    Scan(ScanError),
    Store(StoreError),
    Alerts(AlertStoreError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Rule(err) => write!(f, "rule error: {}", err),
            AppError::Renewal(err) => write!(f, "renewal error: {}", err),
            AppError::Scan(err) => write!(f, "scan error: {}", err),
            AppError::Store(err) => write!(f, "store error: {}", err),
            AppError::Alerts(err) => write!(f, "alert error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Rule(err) => Some(err),
            AppError::Renewal(err) => Some(err),
            AppError::Scan(err) => Some(err),
            AppError::Store(err) => Some(err),
            AppError::Alerts(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RuleError> for AppError {
    fn from(value: RuleError) -> Self {
        Self::Rule(value)
    }
}

impl From<RenewalError> for AppError {
    fn from(value: RenewalError) -> Self {
        Self::Renewal(value)
    }
}

impl From<ScanError> for AppError {
    fn from(value: ScanError) -> Self {
        Self::Scan(value)
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<AlertStoreError> for AppError {
    fn from(value: AlertStoreError) -> Self {
        Self::Alerts(value)
    }
}
