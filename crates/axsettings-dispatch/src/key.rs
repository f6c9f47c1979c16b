//! Setting keys: `(namespace, name)` written as `namespace/name`

use axsettings_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SettingKey {
    pub namespace: String,
    pub name: String,
}

impl SettingKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() => Ok(Self::new(ns, name)),
            _ => Err(Error::invalid_value(format!(
                "Setting key '{}' must look like 'namespace/name'",
                s
            ))),
        }
    }
}

impl TryFrom<String> for SettingKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SettingKey> for String {
    fn from(key: SettingKey) -> Self {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_parts_survive_parsing() {
        let key: SettingKey = "com.apple.macos.display/contrast.enabled".parse().unwrap();
        assert_eq!(key.namespace, "com.apple.macos.display");
        assert_eq!(key.name, "contrast.enabled");
        assert_eq!(key.to_string(), "com.apple.macos.display/contrast.enabled");
    }

    #[test]
    fn rejects_missing_namespace() {
        assert!("contrast".parse::<SettingKey>().is_err());
        assert!("/contrast".parse::<SettingKey>().is_err());
    }
}
