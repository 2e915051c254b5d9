//! Environment-driven configuration seeds.

use obs_primitives::{Attributes, validate_attribute_key};
use tracing::warn;

/// Variable naming the service.
pub const SERVICE_NAME_VAR: &str = "OTEL_SERVICE_NAME";
/// Variable carrying the service version.
pub const SERVICE_VERSION_VAR: &str = "SERVICE_VERSION";
/// Variable naming the deployment environment.
pub const ENVIRONMENT_VAR: &str = "DEPLOYMENT_ENVIRONMENT";
/// Variable carrying `k=v,k2=v2` resource attributes.
pub const RESOURCE_ATTRIBUTES_VAR: &str = "OTEL_RESOURCE_ATTRIBUTES";

/// Values read from the environment, applied before explicit builder calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvOverlay {
    /// From `OTEL_SERVICE_NAME`.
    pub service_name: Option<String>,
    /// From `SERVICE_VERSION`.
    pub version: Option<String>,
    /// From `DEPLOYMENT_ENVIRONMENT`.
    pub environment: Option<String>,
    /// From `OTEL_RESOURCE_ATTRIBUTES`.
    pub resource_attributes: Attributes,
}

impl EnvOverlay {
    /// Reads the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads values through an arbitrary lookup. Blank values count as unset.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        Self {
            service_name: read(SERVICE_NAME_VAR),
            version: read(SERVICE_VERSION_VAR),
            environment: read(ENVIRONMENT_VAR),
            resource_attributes: read(RESOURCE_ATTRIBUTES_VAR)
                .map(|raw| parse_resource_attributes(&raw))
                .unwrap_or_default(),
        }
    }
}

/// Parses `key=value` pairs separated by commas.
///
/// Malformed pairs and invalid keys are skipped with a warning; later
/// duplicates win.
#[must_use]
pub fn parse_resource_attributes(raw: &str) -> Attributes {
    let mut attributes = Attributes::new();
    for pair in raw.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            warn!(pair, "skipping resource attribute without `=`");
            continue;
        };
        let key = key.trim();
        if let Err(err) = validate_attribute_key(key) {
            warn!(pair, error = %err, "skipping resource attribute");
            continue;
        }
        attributes.insert(key.to_owned(), value.trim().to_owned());
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn parses_pairs_and_skips_garbage() {
        let parsed = parse_resource_attributes("team=payments, region = eu-west-1,broken,=x,team=core");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["team"], "core");
        assert_eq!(parsed["region"], "eu-west-1");
    }

    #[test]
    fn reads_through_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (SERVICE_NAME_VAR, "checkout"),
            (SERVICE_VERSION_VAR, " "),
            (ENVIRONMENT_VAR, "staging"),
            (RESOURCE_ATTRIBUTES_VAR, "host.name=web-1"),
        ]);
        let overlay = EnvOverlay::from_lookup(|name| vars.get(name).map(|v| (*v).to_owned()));

        assert_eq!(overlay.service_name.as_deref(), Some("checkout"));
        assert_eq!(overlay.version, None);
        assert_eq!(overlay.environment.as_deref(), Some("staging"));
        assert_eq!(overlay.resource_attributes["host.name"], "web-1");
    }
}
