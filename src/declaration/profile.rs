use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::parser::DigestOptions;

/// Target device class of a digest.
///
/// The primary class receives fully expanded declarations with secrets
/// encrypted immediately. The secondary class (a management appliance that
/// forwards declarations) receives them as written, and secret encryption is
/// left to the device that finally applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DeviceProfile {
    #[default]
    #[serde(rename = "BIG-IP", alias = "primary")]
    Primary,
    #[serde(rename = "BIG-IQ", alias = "secondary")]
    Secondary,
}

impl DeviceProfile {
    pub fn should_expand_defaults(&self) -> bool {
        matches!(self, DeviceProfile::Primary)
    }

    pub fn encrypts_secrets_immediately(&self) -> bool {
        matches!(self, DeviceProfile::Primary)
    }

    /// Resolved secrets are mirrored into the base declaration whenever the
    /// caller asks for it and supplies one, on every device class.
    pub fn should_copy_secrets_to_base(&self, options: &DigestOptions<'_>) -> bool {
        options.copy_secrets && options.base_declaration.is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceProfile::Primary => "BIG-IP",
            DeviceProfile::Secondary => "BIG-IQ",
        }
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceProfile {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "big-ip" | "bigip" | "primary" => Ok(DeviceProfile::Primary),
            "big-iq" | "bigiq" | "secondary" => Ok(DeviceProfile::Secondary),
            other => Err(format!("unknown device profile '{}'", other)),
        }
    }
}
