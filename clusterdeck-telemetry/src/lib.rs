//! Tracing setup shared by the clusterdeck binaries and tests.

pub mod tracing;
