//! Configuration for the clusterdeck services.
//!
//! Settings are layered from YAML files under `configuration/` and
//! `APP_`-prefixed environment variables. See [`load_config`] for the exact
//! precedence.

mod environment;
mod load;
mod secret;
pub mod shared;

pub use environment::*;
pub use load::*;
pub use secret::*;
