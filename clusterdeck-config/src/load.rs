use serde::de::DeserializeOwned;
use std::path::Path;

use crate::environment::Environment;

/// Directory, relative to the working directory, holding the YAML files.
const CONFIGURATION_DIR: &str = "configuration";

const BASE_CONFIG_FILE: &str = "base.yaml";

const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";

/// Nested keys are joined with a double underscore: `APP_DATABASE__HOST`
/// sets `database.host`.
const ENV_SEPARATOR: &str = "__";

/// List values in environment variables are comma separated:
/// `APP_API_KEYS=a,b`.
const LIST_SEPARATOR: &str = ",";

/// Implemented by every top level configuration struct.
pub trait Config {
    /// Keys whose environment variable values must be split into lists.
    const LIST_PARSE_KEYS: &'static [&'static str];
}

/// Loads `T` from `./configuration` for the environment named by
/// `APP_ENVIRONMENT`.
///
/// Sources are applied in order, later ones overriding earlier ones:
/// `base.yaml`, `{environment}.yaml`, then `APP_*` environment variables.
pub fn load_config<T>() -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let current_dir = std::env::current_dir().map_err(|err| {
        config::ConfigError::Message(format!("cannot determine the current directory: {err}"))
    })?;
    let environment = Environment::load()
        .map_err(|err| config::ConfigError::Message(err.to_string()))?;

    load_config_from(&current_dir.join(CONFIGURATION_DIR), environment)
}

/// Same as [`load_config`] with an explicit directory and environment.
pub fn load_config_from<T>(
    configuration_dir: &Path,
    environment: Environment,
) -> Result<T, config::ConfigError>
where
    T: Config + DeserializeOwned,
{
    let mut env_source = config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_PREFIX_SEPARATOR)
        .separator(ENV_SEPARATOR);

    if !T::LIST_PARSE_KEYS.is_empty() {
        env_source = env_source
            .try_parsing(true)
            .list_separator(LIST_SEPARATOR);

        for key in T::LIST_PARSE_KEYS {
            env_source = env_source.with_list_parse_key(key);
        }
    }

    config::Config::builder()
        .add_source(config::File::from(configuration_dir.join(BASE_CONFIG_FILE)))
        .add_source(config::File::from(
            configuration_dir.join(format!("{environment}.yaml")),
        ))
        .add_source(env_source)
        .build()?
        .try_deserialize::<T>()
}
