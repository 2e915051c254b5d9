//! Resource descriptor shared by every signal emitted from one client.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_KEY_LEN: usize = 255;

/// String key/value attributes.
pub type Attributes = BTreeMap<String, String>;

/// Well-known resource attribute keys.
pub mod semconv {
    /// Logical name of the service.
    pub const SERVICE_NAME: &str = "service.name";
    /// Version string of the service.
    pub const SERVICE_VERSION: &str = "service.version";
    /// Deployment environment (production, staging, ...).
    pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
    /// Name of the telemetry SDK.
    pub const TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
    /// Language of the telemetry SDK.
    pub const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";
    /// Version of the telemetry SDK.
    pub const TELEMETRY_SDK_VERSION: &str = "telemetry.sdk.version";
}

/// Validates an attribute key.
///
/// # Errors
///
/// Returns [`Error::InvalidAttributeKey`] if the key is blank or too long.
pub fn validate_attribute_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(Error::InvalidAttributeKey {
            key: key.to_owned(),
            reason: "key cannot be empty".into(),
        });
    }
    if key.len() > MAX_KEY_LEN {
        return Err(Error::InvalidAttributeKey {
            key: key.to_owned(),
            reason: format!("key length must be <= {MAX_KEY_LEN}"),
        });
    }
    Ok(())
}

/// Immutable set of attributes identifying the emitting service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    attributes: Attributes,
}

impl Resource {
    /// Creates a resource from the supplied key/value pairs.
    #[must_use]
    pub fn new<I, K, V>(attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Empty resource.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Process defaults: an `unknown_service:<executable>` service name and the
    /// telemetry SDK identity.
    #[must_use]
    pub fn process_default() -> Self {
        let executable = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let service_name = if executable.is_empty() {
            "unknown_service".to_owned()
        } else {
            format!("unknown_service:{executable}")
        };

        Self::new([
            (semconv::SERVICE_NAME, service_name),
            (semconv::TELEMETRY_SDK_NAME, env!("CARGO_PKG_NAME").to_owned()),
            (semconv::TELEMETRY_SDK_LANGUAGE, "rust".to_owned()),
            (semconv::TELEMETRY_SDK_VERSION, env!("CARGO_PKG_VERSION").to_owned()),
        ])
    }

    /// Merges `other` into a copy of `self`; keys from `other` win on collision.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut attributes = self.attributes.clone();
        attributes.extend(
            other
                .attributes
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        Self { attributes }
    }

    /// Looks up an attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Returns the `service.name` attribute, if present.
    #[must_use]
    pub fn service_name(&self) -> Option<&str> {
        self.get(semconv::SERVICE_NAME)
    }

    /// Returns all attributes.
    #[must_use]
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Iterates attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns `true` when the resource carries no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_incoming_values() {
        let defaults = Resource::new([("service.name", "unknown"), ("host", "a")]);
        let user = Resource::new([("service.name", "svc"), ("team", "payments")]);

        let merged = defaults.merge(&user);
        assert_eq!(merged.service_name(), Some("svc"));
        assert_eq!(merged.get("host"), Some("a"));
        assert_eq!(merged.get("team"), Some("payments"));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn process_default_identifies_sdk() {
        let resource = Resource::process_default();
        assert!(resource.service_name().unwrap().starts_with("unknown_service"));
        assert_eq!(resource.get(semconv::TELEMETRY_SDK_LANGUAGE), Some("rust"));
    }

    #[test]
    fn rejects_blank_keys() {
        assert!(validate_attribute_key("region").is_ok());
        let err = validate_attribute_key("  ").expect_err("blank key");
        assert!(matches!(err, Error::InvalidAttributeKey { .. }));
    }
}
