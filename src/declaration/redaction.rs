//! Cloud credential scrubbing for service-discovery blocks.
//!
//! Pool members that discover their addresses from a cloud provider carry
//! provider credentials. Those fields never leave a digest in clear text.

use serde_json::Value;

pub const REDACTED: &str = "<redacted>";

/// Sensitive fields per `addressDiscovery` provider.
const PROVIDER_FIELDS: &[(&str, &[&str])] = &[
    ("aws", &["accessKeyId", "secretAccessKey"]),
    ("azure", &["apiAccessKey", "resourceGroup", "subscriptionId", "directoryId", "applicationId"]),
    ("gce", &["encodedCredentials"]),
    ("consul", &["encodedToken"]),
];

/// Replaces provider credentials with [`REDACTED`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudCredentialRedactor;

impl CloudCredentialRedactor {
    /// Redact every discovery block in `declaration` and return how many
    /// fields were replaced. Fields already holding the marker are not counted.
    pub fn redact(&self, declaration: &mut Value) -> usize {
        let mut redacted = 0;
        let mut stack = vec![declaration];

        while let Some(node) = stack.pop() {
            match node {
                Value::Object(map) => {
                    let fields = map
                        .get("addressDiscovery")
                        .and_then(Value::as_str)
                        .and_then(sensitive_fields);
                    if let Some(fields) = fields {
                        for field in fields {
                            if let Some(value) = map.get_mut(*field) {
                                if value.as_str() != Some(REDACTED) {
                                    *value = Value::String(REDACTED.to_string());
                                    redacted += 1;
                                }
                            }
                        }
                    }
                    stack.extend(map.values_mut());
                }
                Value::Array(items) => stack.extend(items.iter_mut()),
                _ => {}
            }
        }

        if redacted > 0 {
            tracing::info!(redacted_fields = redacted, "redacted cloud discovery credentials");
        }
        redacted
    }
}

fn sensitive_fields(provider: &str) -> Option<&'static [&'static str]> {
    PROVIDER_FIELDS.iter().find(|(name, _)| *name == provider).map(|(_, fields)| *fields)
}
