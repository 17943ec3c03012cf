//! Access to managed clusters.
//!
//! Services depend on the [`ClusterClient`] trait and obtain instances from
//! the [`registry::ConnectionRegistry`], which builds them through a
//! [`ClusterConnector`]. [`http::KubeConnector`] is the production connector
//! backed by [`kube`]; tests plug in their own.
//!
//! [`manifest`] turns stored workloads into API objects and [`quantity`]
//! parses the resource quantities found in them and in node status.

mod base;
pub mod http;
pub mod manifest;
pub mod quantity;
pub mod registry;

pub use base::*;
