use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::ops::Deref;

/// A [`SecretString`] that can travel through serde.
///
/// Used for passwords in configuration and for cluster credentials in
/// request bodies and the credential store. `Debug` output stays redacted.
#[derive(Clone, Debug)]
pub struct SerializableSecretString(SecretString);

impl SerializableSecretString {
    /// Returns true when the wrapped secret is empty or only whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }
}

impl Deref for SerializableSecretString {
    type Target = SecretString;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for SerializableSecretString {
    fn from(value: String) -> Self {
        Self(SecretString::from(value))
    }
}

impl From<&str> for SerializableSecretString {
    fn from(value: &str) -> Self {
        Self(SecretString::from(value))
    }
}

impl From<SerializableSecretString> for SecretString {
    fn from(value: SerializableSecretString) -> Self {
        value.0
    }
}

impl Serialize for SerializableSecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for SerializableSecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::from)
    }
}
