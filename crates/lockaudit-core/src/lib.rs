use serde::{Deserialize, Serialize};

/// Directory segment that introduces a nested installation level.
pub const NESTING_MARKER: &str = "node_modules";
/// Stands in for the empty installation path of the project root inside keys.
pub const ROOT_PATH_SENTINEL: &str = "<root>";
pub const KEY_SEPARATOR: &str = "::";
pub const ROOT_DISPLAY_NAME: &str = "root";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Prod,
    Dev,
    Optional,
    Peer,
}

impl DependencyKind {
    pub const ALL: [DependencyKind; 4] = [Self::Prod, Self::Dev, Self::Optional, Self::Peer];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Optional => "optional",
            Self::Peer => "peer",
        }
    }
}

impl std::str::FromStr for DependencyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "prod" => Ok(Self::Prod),
            "dev" => Ok(Self::Dev),
            "optional" => Ok(Self::Optional),
            "peer" => Ok(Self::Peer),
            other => Err(format!(
                "invalid dependency kind '{other}', expected one of: prod, dev, optional, peer"
            )),
        }
    }
}

impl std::fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an installed instance: `project-id::installation-path`.
pub fn path_key(project_id: &str, install_path: &str) -> String {
    let path = if install_path.is_empty() {
        ROOT_PATH_SENTINEL
    } else {
        install_path
    };
    format!("{project_id}{KEY_SEPARATOR}{path}")
}

/// Identity of a canonical package: `name@version`.
pub fn package_key(name: &str, version: &str) -> String {
    format!("{name}@{version}")
}

/// Identity of a declaration: `owner-path-key::kind::dependency-name`.
pub fn decl_key(owner_path_key: &str, kind: DependencyKind, dependency_name: &str) -> String {
    format!(
        "{owner_path_key}{KEY_SEPARATOR}{}{KEY_SEPARATOR}{dependency_name}",
        kind.as_str()
    )
}

/// Name implied by an installation path: the segment after the last nesting marker.
///
/// `node_modules/a/node_modules/@scope/b` yields `@scope/b`. Paths without a marker
/// (workspace members such as `packages/web`) are returned unchanged, and the root path
/// yields `None`.
pub fn name_from_install_path(install_path: &str) -> Option<&str> {
    if install_path.is_empty() {
        return None;
    }

    let marker = format!("{NESTING_MARKER}/");
    let name = match install_path.rfind(&marker) {
        Some(index) => &install_path[index + marker.len()..],
        None => install_path,
    };

    (!name.is_empty()).then_some(name)
}

/// Whether a specifier names one concrete version rather than a range, tag or location.
///
/// Only a complete semver version counts; `1.2` is a range to npm.
pub fn is_exact_version(specifier: &str) -> bool {
    semver::Version::parse(specifier.trim()).is_ok()
}
