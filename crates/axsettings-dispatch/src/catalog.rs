//! Setting catalogs
//!
//! A catalog is a JSON list of solutions, each naming its settings and how
//! to reach them. The solution id and setting name form the [`SettingKey`].
//!
//! ```json
//! { "solutions": [ { "id": "com.apple.macos.display", "settings": [
//!     { "name": "contrast.enabled", "type": "boolean", "default": false,
//!       "handler": { "type": "native-defaults",
//!                    "domain": "com.apple.universalaccess", "key": "increaseContrast" } } ] } ] }
//! ```

use crate::dispatch::{RegisteredSetting, SettingsDispatcher};
use crate::key::SettingKey;
use crate::native::DefaultsAccessor;
use crate::proxy::{ControlBinding, SettingProxy, TreeAutomation};
use crate::store::JsonFileStore;
use crate::system_settings::SettingsView;
use crate::value::{SettingValue, ValueTransform, ValueType};
use anyhow::Context;
use axsettings_core::{Automation, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const BUILTIN: &str = include_str!("../catalog/accessibility.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub solutions: Vec<Solution>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub settings: Vec<SettingSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<SettingValue>,
    pub handler: HandlerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HandlerSpec {
    NativeDefaults {
        domain: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<ValueTransform>,
    },
    File {
        path: PathBuf,
        pointer: String,
    },
    /// Read through `defaults`, write through the settings pane. For keys
    /// the OS does not let other processes write.
    DefaultsReadUiWrite {
        domain: String,
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transform: Option<ValueTransform>,
        view: SettingsView,
        control: ControlBinding,
    },
    Ui {
        view: SettingsView,
        control: ControlBinding,
    },
}

impl HandlerSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            HandlerSpec::NativeDefaults { .. } => "native-defaults",
            HandlerSpec::File { .. } => "file",
            HandlerSpec::DefaultsReadUiWrite { .. } => "defaults-read-ui-write",
            HandlerSpec::Ui { .. } => "ui",
        }
    }

    pub fn proxy(&self, value_type: ValueType) -> SettingProxy {
        match self {
            HandlerSpec::NativeDefaults { domain, key, transform } => SettingProxy::Native(Arc::new(
                DefaultsAccessor::new(domain, key, value_type).with_transform(*transform),
            )),
            HandlerSpec::File { path, pointer } => {
                SettingProxy::File(JsonFileStore::new(expand_home(path), pointer))
            }
            HandlerSpec::DefaultsReadUiWrite {
                domain,
                key,
                transform,
                view,
                control,
            } => SettingProxy::Tree(
                TreeAutomation::new(*view, control.clone()).with_reader(Arc::new(
                    DefaultsAccessor::new(domain, key, value_type).with_transform(*transform),
                )),
            ),
            HandlerSpec::Ui { view, control } => {
                SettingProxy::Tree(TreeAutomation::new(*view, control.clone()))
            }
        }
    }
}

/// One row of `axs keys`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub key: SettingKey,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<SettingValue>,
    pub handler: &'static str,
}

impl Catalog {
    /// The accessibility settings shipped with the crate.
    pub fn builtin() -> Result<Self> {
        BUILTIN.parse()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog {}", path.display()))?;
        raw.parse()
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.solutions
            .iter()
            .flat_map(|solution| {
                solution.settings.iter().map(|s| CatalogEntry {
                    key: SettingKey::new(&solution.id, &s.name),
                    value_type: s.value_type,
                    default: s.default.clone(),
                    handler: s.handler.kind(),
                })
            })
            .collect()
    }

    /// Check every entry and register it with a new dispatcher.
    pub fn into_dispatcher(self, automation: Automation) -> Result<SettingsDispatcher> {
        let mut dispatcher = SettingsDispatcher::new(automation);
        let mut seen = BTreeSet::new();

        for solution in &self.solutions {
            if solution.id.is_empty() || solution.id.contains('/') {
                return Err(Error::invalid_value(format!(
                    "Solution id '{}' must be non-empty and contain no '/'",
                    solution.id
                )));
            }
            for spec in &solution.settings {
                let key = SettingKey::new(&solution.id, &spec.name);
                if spec.name.is_empty() || !seen.insert(key.clone()) {
                    return Err(Error::invalid_value(format!(
                        "Duplicate or empty setting '{}'",
                        key
                    )));
                }
                let proxy = spec.handler.proxy(spec.value_type);
                let mut setting = RegisteredSetting::new(proxy, spec.value_type);
                if let Some(default) = &spec.default {
                    let default = default.coerce(spec.value_type).map_err(|e| {
                        Error::invalid_value(format!("Default of '{}': {}", key, e.message))
                    })?;
                    setting = setting.with_default(default);
                }
                dispatcher.register(key, setting);
            }
        }
        Ok(dispatcher)
    }
}

impl FromStr for Catalog {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).map_err(|e| Error::invalid_value(format!("Invalid catalog: {}", e)))
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axsettings_core::mock::MockWorkspace;
    use axsettings_core::{EngineConfig, ErrorCode};

    fn automation() -> Automation {
        Automation::new(Arc::new(MockWorkspace::new()), EngineConfig::default())
    }

    #[test]
    fn builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        let entries = catalog.entries();
        let contrast = entries
            .iter()
            .find(|e| e.key.to_string() == "com.apple.macos.display/contrast.enabled")
            .unwrap();
        assert_eq!(contrast.handler, "defaults-read-ui-write");
        assert_eq!(contrast.default, Some(SettingValue::Bool(false)));

        let dispatcher = catalog.into_dispatcher(automation()).unwrap();
        assert_eq!(dispatcher.keys().count(), entries.len());
        let style: SettingKey = "com.apple.macos.zoom/style".parse().unwrap();
        assert!(dispatcher.is_default(&style, &SettingValue::Integer(0)));
    }

    #[test]
    fn handler_kinds_build_matching_proxies() {
        let catalog: Catalog = r#"{"solutions": [{"id": "test", "settings": [
            {"name": "a", "type": "boolean", "handler": {"type": "native-defaults",
                "domain": "com.apple.universalaccess", "key": "closeViewHotkeysEnabled",
                "transform": "negateBoolean"}},
            {"name": "b", "type": "integer",
             "handler": {"type": "file", "path": "/tmp/p.json", "pointer": "/b"}},
            {"name": "c", "type": "double", "handler": {"type": "ui", "view": "mouse",
                "control": {"kind": "slider", "identifier": "tracking"}}}
        ]}]}"#
            .parse()
            .unwrap();
        let d = catalog.into_dispatcher(automation()).unwrap();
        let proxy = |k: &str| d.get(&k.parse().unwrap()).unwrap().proxy.clone();
        assert!(matches!(proxy("test/a"), SettingProxy::Native(_)));
        assert!(matches!(proxy("test/b"), SettingProxy::File(_)));
        match proxy("test/c") {
            SettingProxy::Tree(t) => assert!(t.reader.is_none()),
            other => panic!("unexpected proxy {:?}", other),
        }
    }

    #[test]
    fn bad_default_and_duplicates_are_rejected() {
        let bad_default = r#"{"solutions": [{"id": "t", "settings": [
            {"name": "a", "type": "boolean", "default": "yes",
             "handler": {"type": "file", "path": "p.json", "pointer": "/a"}}]}]}"#;
        let catalog = bad_default.parse::<Catalog>().unwrap();
        let err = catalog.into_dispatcher(automation()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidValue);

        let dup = r#"{"solutions": [{"id": "t", "settings": [
            {"name": "a", "type": "boolean",
             "handler": {"type": "file", "path": "p.json", "pointer": "/a"}},
            {"name": "a", "type": "boolean",
             "handler": {"type": "file", "path": "p.json", "pointer": "/b"}}]}]}"#;
        assert!(dup.parse::<Catalog>().unwrap().into_dispatcher(automation()).is_err());

        assert!("{\"solutions\": 3}".parse::<Catalog>().is_err());
    }

    #[test]
    fn home_is_expanded_in_file_paths() {
        if let Some(home) = std::env::var_os("HOME") {
            let expanded = expand_home(Path::new("~/prefs.json"));
            assert_eq!(expanded, PathBuf::from(home).join("prefs.json"));
        }
        assert_eq!(expand_home(Path::new("/etc/p.json")), PathBuf::from("/etc/p.json"));
    }
}
