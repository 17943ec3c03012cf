//! HTTP API for managing Kubernetes clusters and their workloads.
//!
//! Cluster credentials and a mirror of the managed workloads live in
//! Postgres. Live cluster access goes through the
//! [`k8s::registry::ConnectionRegistry`], which keeps one client per cluster.

pub mod authentication;
pub mod config;
pub mod configs;
pub mod db;
pub mod k8s;
pub mod metrics;
pub mod routes;
pub mod services;
pub mod span_builder;
pub mod startup;
pub mod store;
