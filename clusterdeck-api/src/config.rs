use base64::{Engine, prelude::BASE64_STANDARD};
use clusterdeck_config::Config;
use clusterdeck_config::shared::{PgConnectionConfig, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Required length in bytes for a valid API key.
const API_KEY_LENGTH_IN_BYTES: usize = 32;

/// Complete configuration of the cluster management API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Database holding cluster records and workload mirrors.
    pub database: PgConnectionConfig,
    /// HTTP server settings.
    pub application: ApplicationSettings,
    /// Base64 encoded API keys accepted as bearer tokens.
    ///
    /// Any key in the list authenticates a request, which allows rotation.
    pub api_keys: Vec<String>,
    /// Settings applied to every client built for a managed cluster.
    pub kube: KubeClientConfig,
}

impl Config for ApiConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &["api_keys"];
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.tls.validate()?;
        self.kube.validate()
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    /// Host address the API listens on.
    pub host: String,
    /// Port number the API listens on.
    pub port: u16,
}

impl fmt::Display for ApplicationSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Deadlines for requests sent to managed clusters.
///
/// A hung API server would otherwise hold the request handler forever.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct KubeClientConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl KubeClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.connect_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("kube.connect_timeout_secs"));
        }
        if self.read_timeout_secs == 0 {
            return Err(ValidationError::ZeroDuration("kube.read_timeout_secs"));
        }

        Ok(())
    }
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiKeyConversionError {
    #[error("api key is not base64 encoded")]
    NotBase64Encoded,

    #[error("expected length of api key is 32, but actual length is {0}")]
    LengthNot32Bytes(usize),
}

/// An API key decoded into its raw bytes.
#[derive(Debug)]
pub struct ApiKey {
    pub key: [u8; API_KEY_LENGTH_IN_BYTES],
}

impl TryFrom<&str> for ApiKey {
    type Error = ApiKeyConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let key = BASE64_STANDARD
            .decode(value)
            .map_err(|_| ApiKeyConversionError::NotBase64Encoded)?;

        let length = key.len();
        let key: [u8; API_KEY_LENGTH_IN_BYTES] = key
            .try_into()
            .map_err(|_| ApiKeyConversionError::LengthNot32Bytes(length))?;

        Ok(ApiKey { key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_must_decode_to_32_bytes() {
        let valid = BASE64_STANDARD.encode([1u8; 32]);
        assert_eq!(ApiKey::try_from(valid.as_str()).unwrap().key, [1u8; 32]);

        let short = BASE64_STANDARD.encode([1u8; 16]);
        assert!(matches!(
            ApiKey::try_from(short.as_str()),
            Err(ApiKeyConversionError::LengthNot32Bytes(16))
        ));

        assert!(matches!(
            ApiKey::try_from("not base64!"),
            Err(ApiKeyConversionError::NotBase64Encoded)
        ));
    }

    #[test]
    fn zero_kube_timeouts_are_rejected() {
        let config = KubeClientConfig {
            connect_timeout_secs: 0,
            read_timeout_secs: 30,
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ZeroDuration("kube.connect_timeout_secs"))
        ));
        assert!(KubeClientConfig::default().validate().is_ok());
    }
}
