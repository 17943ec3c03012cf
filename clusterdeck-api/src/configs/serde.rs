use thiserror::Error;

use crate::configs::store::Store;

#[derive(Debug, Error)]
pub enum DbSerializationError {
    #[error("Error while serializing data to the db: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DbDeserializationError {
    #[error("Error while deserializing data from the db: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn serialize<S>(value: &S) -> Result<serde_json::Value, DbSerializationError>
where
    S: Store,
{
    let serialized_value = serde_json::to_value(value)?;

    Ok(serialized_value)
}

pub fn deserialize_from_value<S>(value: serde_json::Value) -> Result<S, DbDeserializationError>
where
    S: Store,
{
    let deserialized_value = serde_json::from_value(value)?;

    Ok(deserialized_value)
}
