use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

mod lockfile;
mod purl;
mod sbom;

pub use lockfile::{LicenseField, LockEntry, Lockfile};
pub use purl::{Purl, parse_purl};
pub use sbom::{
    BomComponent, BomDependency, BomLicense, BomLicenseChoice, BomMetadata, BomProperty,
    CycloneDxBom, SBOM_GENERATOR_PACKAGE, generate_sbom,
};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manifest is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported manifest: {0}")]
    Unsupported(String),
    #[error("invalid SBOM: {0}")]
    InvalidSbom(String),
    #[error("expected package-lock.json in project root: {}", .0.display())]
    MissingLockfile(PathBuf),
    #[error("failed to generate SBOM: {0}")]
    SbomGeneration(String),
}

/// A dependency manifest in one of the two supported shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Lockfile(Lockfile),
    Sbom(CycloneDxBom),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProjectMetadata {
    pub format_version: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub package_manager: String,
}

impl Manifest {
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Lockfile(_) => "lockfile",
            Self::Sbom(_) => "cyclonedx",
        }
    }

    pub fn project_metadata(&self) -> ProjectMetadata {
        match self {
            Self::Lockfile(lockfile) => ProjectMetadata {
                format_version: lockfile.lockfile_version.map(|version| version.to_string()),
                name: lockfile.project_name().map(str::to_owned),
                version: lockfile.project_version().map(str::to_owned),
                package_manager: "npm".to_owned(),
            },
            Self::Sbom(bom) => {
                let root = bom.metadata.as_ref().and_then(|meta| meta.component.as_ref());
                ProjectMetadata {
                    format_version: bom
                        .spec_version
                        .as_ref()
                        .map(|version| format!("CycloneDX {version}")),
                    name: root.and_then(BomComponent::full_name),
                    version: root.and_then(BomComponent::resolved_version),
                    package_manager: root
                        .and_then(|component| component.purl.as_deref())
                        .and_then(|purl| parse_purl(purl).kind)
                        .unwrap_or_else(|| "npm".to_owned()),
                }
            }
        }
    }
}

pub fn read_manifest(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let raw = fs::read_to_string(path)?;
    parse_manifest(&raw)
}

pub fn parse_manifest(raw: &str) -> Result<Manifest, ManifestError> {
    let value: Value = serde_json::from_str(raw)?;
    let Some(object) = value.as_object() else {
        return Err(ManifestError::Unsupported(
            "manifest root must be a JSON object".to_owned(),
        ));
    };

    if object.contains_key("bomFormat") {
        return sbom::parse_bom(value).map(Manifest::Sbom);
    }

    if object.get("packages").is_some_and(Value::is_object) {
        return lockfile::parse_lockfile(value).map(Manifest::Lockfile);
    }

    Err(ManifestError::Unsupported(
        "expecting an npm lockfile v2+ with a `packages` map or a CycloneDX SBOM".to_owned(),
    ))
}
