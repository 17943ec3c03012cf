use serde::Serialize;
use serde::de::DeserializeOwned;

/// Marker trait for values that may be written to a `jsonb` column.
///
/// Restricting [`crate::configs::serde::serialize`] to implementors keeps
/// request types from ending up in the database by accident.
pub trait Store: Serialize + DeserializeOwned {}
