//! Persistence of cluster records and workload mirrors.
//!
//! Services talk to [`CredentialStore`]. [`postgres::PostgresStore`] backs
//! the running API, [`memory::MemoryStore`] keeps everything in process and
//! is what the tests run against.

mod base;
pub mod memory;
pub mod postgres;

pub use base::*;
