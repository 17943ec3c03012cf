//! Values stored as `jsonb` next to the relational columns.

pub mod cluster;
pub mod serde;
pub mod store;
pub mod workload;
