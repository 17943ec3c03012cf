use thiserror::Error;

/// Errors raised when a loaded configuration is internally inconsistent.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),
}
