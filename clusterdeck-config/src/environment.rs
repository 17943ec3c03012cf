use std::fmt;
use std::io;
use std::str::FromStr;

/// Variable that selects which environment file is layered over `base.yaml`.
const ENVIRONMENT_VAR: &str = "APP_ENVIRONMENT";

const PROD: &str = "prod";
const STAGING: &str = "staging";
const DEV: &str = "dev";

/// Deployment environment of a running service.
///
/// Picks the environment specific configuration file and the logging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Prod,
    Staging,
    Dev,
}

impl Environment {
    /// Reads the environment from `APP_ENVIRONMENT`, falling back to
    /// [`Environment::Prod`] when the variable is unset.
    pub fn load() -> Result<Environment, io::Error> {
        match std::env::var(ENVIRONMENT_VAR) {
            Ok(value) => value.parse(),
            Err(_) => Ok(Environment::Prod),
        }
    }

    /// Exports this environment through `APP_ENVIRONMENT` for the current process.
    pub fn set(&self) {
        // Only called from startup code and test setup before any worker threads read it.
        unsafe { std::env::set_var(ENVIRONMENT_VAR, self.as_str()) }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => PROD,
            Environment::Staging => STAGING,
            Environment::Dev => DEV,
        }
    }

    /// Production and staging log as JSON to rolling files.
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod | Environment::Staging)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            PROD => Ok(Environment::Prod),
            STAGING => Ok(Environment::Staging),
            DEV => Ok(Environment::Dev),
            other => Err(io::Error::other(format!(
                "unsupported environment `{other}`, expected one of `{PROD}`, `{STAGING}` or `{DEV}`"
            ))),
        }
    }
}
