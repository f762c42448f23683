use std::collections::BTreeMap;

use lockaudit_core::DependencyKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::ManifestError;

/// Installation map of an npm v2+ lockfile, keyed by installation path (`""` is the root).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lockfile {
    pub name: Option<String>,
    pub version: Option<String>,
    pub lockfile_version: Option<u64>,
    pub packages: BTreeMap<String, LockEntry>,
}

/// One installed instance. Every field is read leniently: a value of the wrong type
/// falls back to the field's default and the instance is kept.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub version: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub resolved: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub integrity: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub license: Option<LicenseField>,
    #[serde(default, deserialize_with = "lenient")]
    pub link: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub in_bundle: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub has_install_script: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub dev: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub optional: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub dev_optional: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub peer: bool,
    #[serde(default, deserialize_with = "specifier_map")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "specifier_map")]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "specifier_map")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "specifier_map")]
    pub peer_dependencies: BTreeMap<String, String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Keeps the string-valued specifiers of a dependency map and drops the rest.
fn specifier_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(map) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };

    Ok(map
        .into_iter()
        .filter_map(|(name, specifier)| match specifier {
            Value::String(specifier) => Some((name, specifier)),
            _ => None,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum LicenseField {
    Text(String),
    Typed {
        #[serde(rename = "type")]
        kind: String,
    },
    Other(Value),
}

impl LockEntry {
    pub fn version(&self) -> Option<&str> {
        non_empty(self.version.as_deref())
    }

    pub fn explicit_name(&self) -> Option<&str> {
        non_empty(self.name.as_deref())
    }

    pub fn license(&self) -> Option<&str> {
        match self.license.as_ref()? {
            LicenseField::Text(text) => non_empty(Some(text)),
            LicenseField::Typed { kind } => non_empty(Some(kind)),
            LicenseField::Other(_) => None,
        }
    }

    pub fn is_dev(&self) -> bool {
        self.dev || self.dev_optional
    }

    pub fn is_optional(&self) -> bool {
        self.optional || self.dev_optional
    }

    pub fn declared(&self, kind: DependencyKind) -> &BTreeMap<String, String> {
        match kind {
            DependencyKind::Prod => &self.dependencies,
            DependencyKind::Dev => &self.dev_dependencies,
            DependencyKind::Optional => &self.optional_dependencies,
            DependencyKind::Peer => &self.peer_dependencies,
        }
    }
}

impl Lockfile {
    pub fn root(&self) -> Option<&LockEntry> {
        self.packages.get("")
    }

    pub fn project_name(&self) -> Option<&str> {
        non_empty(self.name.as_deref()).or_else(|| self.root().and_then(LockEntry::explicit_name))
    }

    pub fn project_version(&self) -> Option<&str> {
        non_empty(self.version.as_deref()).or_else(|| self.root().and_then(LockEntry::version))
    }

    pub fn entry(&self, install_path: &str) -> Option<&LockEntry> {
        self.packages.get(install_path)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLockfile {
    name: Option<String>,
    version: Option<String>,
    lockfile_version: Option<u64>,
    packages: BTreeMap<String, Value>,
}

pub(crate) fn parse_lockfile(value: Value) -> Result<Lockfile, ManifestError> {
    let raw: RawLockfile = serde_json::from_value(value)?;

    let mut packages = BTreeMap::new();
    for (install_path, entry) in raw.packages {
        if !entry.is_object() {
            tracing::debug!(path = %install_path, "skipping non-object lockfile entry");
            continue;
        }

        match serde_json::from_value::<LockEntry>(entry) {
            Ok(entry) => {
                packages.insert(install_path, entry);
            }
            Err(err) => tracing::warn!(
                path = %install_path,
                error = %err,
                "skipping malformed lockfile entry"
            ),
        }
    }

    Ok(Lockfile {
        name: raw.name,
        version: raw.version,
        lockfile_version: raw.lockfile_version,
        packages,
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
