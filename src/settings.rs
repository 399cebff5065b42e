use config::{Config, Environment, File};
use log::warn;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub cert_verify: Option<bool>,
    pub cert_path: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("XO_BASE_URL is required")]
    MissingBaseUrl,

    #[error("XO_BASE_URL '{0}' is not a valid URL: {1}")]
    InvalidBaseUrl(String, String),

    #[error("XO_API_TOKEN is required")]
    MissingApiToken,

    #[error("CERT_PATH '{}' does not point to a readable file", .0.display())]
    CaCertMissing(PathBuf),

    #[error("Upstream timeout must be at least one second")]
    ZeroTimeout,
}

/// Resolved upstream connection parameters. Built once at startup.
#[derive(Clone)]
pub struct ConnectionProfile {
    pub base_url: Url,
    pub api_token: String,
    pub tls_verify: bool,
    pub ca_cert_path: Option<PathBuf>,
    pub timeout: Duration,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("base_url", &self.base_url.as_str())
            .field("api_token", &"<redacted>")
            .field("tls_verify", &self.tls_verify)
            .field("ca_cert_path", &self.ca_cert_path)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Settings {
    pub fn new(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let mut s = Config::builder();

        // A file named on the command line must exist; the default one is optional.
        if let Some(path) = config_path {
            s = s.add_source(File::with_name(path).required(true));
        } else {
            s = s.add_source(File::with_name("config").required(false));
        }

        // XO_BASE_URL -> base_url, XO_API_TOKEN -> api_token, ...
        s = s.add_source(Environment::with_prefix("XO").try_parsing(true));

        Ok(s.build()?.try_deserialize()?)
    }

    pub fn resolve(self) -> Result<ConnectionProfile, SettingsError> {
        let raw_url = non_empty(self.base_url).ok_or(SettingsError::MissingBaseUrl)?;
        let base_url = parse_base_url(raw_url.trim())?;
        let api_token = non_empty(self.api_token).ok_or(SettingsError::MissingApiToken)?;
        let tls_verify = self.cert_verify.unwrap_or(true);

        let ca_cert_path = match non_empty(self.cert_path) {
            Some(path) if tls_verify => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(SettingsError::CaCertMissing(path));
                }
                Some(path)
            }
            Some(path) => {
                warn!("CERT_PATH '{}' ignored because CERT_VERIFY is false", path);
                None
            }
            None => None,
        };

        let timeout_secs = self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(SettingsError::ZeroTimeout);
        }

        Ok(ConnectionProfile {
            base_url,
            api_token,
            tls_verify,
            ca_cert_path,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ConnectionProfile {
    pub fn ca_cert_path(&self) -> Option<&Path> {
        self.ca_cert_path.as_deref()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let invalid = |reason: String| SettingsError::InvalidBaseUrl(raw.to_string(), reason);

    let mut url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }

    // Endpoints are joined relative to the base, which requires a trailing slash.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
