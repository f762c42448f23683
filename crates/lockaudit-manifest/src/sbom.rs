use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use serde_json::Value;

use crate::{Manifest, ManifestError, parse_purl, read_manifest};

/// npm package invoked through `npx` to produce a CycloneDX document.
pub const SBOM_GENERATOR_PACKAGE: &str = "@cyclonedx/cyclonedx-npm";

const DEVELOPMENT_PROPERTY: &str = "cdx:npm:package:development";

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycloneDxBom {
    pub bom_format: String,
    pub spec_version: Option<String>,
    pub metadata: Option<BomMetadata>,
    #[serde(default)]
    pub components: Vec<BomComponent>,
    #[serde(default)]
    pub dependencies: Vec<BomDependency>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BomMetadata {
    pub component: Option<BomComponent>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BomComponent {
    #[serde(rename = "bom-ref")]
    pub bom_ref: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub group: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub purl: Option<String>,
    pub scope: Option<String>,
    #[serde(default)]
    pub licenses: Vec<BomLicenseChoice>,
    #[serde(default)]
    pub properties: Vec<BomProperty>,
    #[serde(default)]
    pub components: Vec<BomComponent>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BomLicenseChoice {
    pub license: Option<BomLicense>,
    pub expression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BomLicense {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct BomProperty {
    pub name: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BomDependency {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl BomComponent {
    /// `group/name` when a group is present, falling back to the purl name.
    pub fn full_name(&self) -> Option<String> {
        let name = self.name.as_deref().map(str::trim).filter(|name| !name.is_empty());
        match (self.group.as_deref().map(str::trim), name) {
            (Some(group), Some(name)) if !group.is_empty() => Some(format!("{group}/{name}")),
            (_, Some(name)) => Some(name.to_owned()),
            (_, None) => self.purl.as_deref().and_then(|purl| parse_purl(purl).name),
        }
    }

    pub fn resolved_version(&self) -> Option<String> {
        self.version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
            .map(str::to_owned)
            .or_else(|| self.purl.as_deref().and_then(|purl| parse_purl(purl).version))
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|property| property.name == name)
            .and_then(|property| property.value.as_deref())
    }

    pub fn is_development(&self) -> bool {
        self.property(DEVELOPMENT_PROPERTY) == Some("true")
    }

    pub fn is_optional(&self) -> bool {
        self.scope.as_deref() == Some("optional")
    }

    pub fn license(&self) -> Option<&str> {
        self.licenses.iter().find_map(|choice| {
            choice
                .license
                .as_ref()
                .and_then(|license| license.id.as_deref().or(license.name.as_deref()))
                .or(choice.expression.as_deref())
        })
    }
}

impl CycloneDxBom {
    pub fn root_component(&self) -> Option<&BomComponent> {
        self.metadata.as_ref().and_then(|meta| meta.component.as_ref())
    }

    /// Every component in document order, nested components included.
    pub fn all_components(&self) -> Vec<&BomComponent> {
        fn collect<'a>(components: &'a [BomComponent], out: &mut Vec<&'a BomComponent>) {
            for component in components {
                out.push(component);
                collect(&component.components, out);
            }
        }

        let mut out = Vec::new();
        collect(&self.components, &mut out);
        out
    }
}

pub(crate) fn parse_bom(value: Value) -> Result<CycloneDxBom, ManifestError> {
    if value.get("bomFormat").and_then(Value::as_str) != Some("CycloneDX") {
        return Err(ManifestError::Unsupported(
            "only CycloneDX SBOMs are supported".to_owned(),
        ));
    }
    if !value.get("components").is_some_and(Value::is_array) {
        return Err(ManifestError::InvalidSbom(
            "missing components array".to_owned(),
        ));
    }
    if !value.get("dependencies").is_some_and(Value::is_array) {
        return Err(ManifestError::InvalidSbom(
            "missing dependencies array".to_owned(),
        ));
    }

    Ok(serde_json::from_value(value)?)
}

/// Runs the CycloneDX npm generator in `project_dir` and reads back the produced SBOM.
pub fn generate_sbom(project_dir: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let project_dir = project_dir.as_ref();
    let project_dir = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf());
    if !project_dir.join("package-lock.json").is_file() {
        return Err(ManifestError::MissingLockfile(project_dir));
    }

    let output_file = tempfile::Builder::new()
        .prefix("lockaudit-sbom-")
        .suffix(".json")
        .tempfile()?;

    tracing::info!(
        project = %project_dir.display(),
        generator = SBOM_GENERATOR_PACKAGE,
        "generating SBOM"
    );
    let output = Command::new("npx")
        .current_dir(&project_dir)
        .arg(SBOM_GENERATOR_PACKAGE)
        .arg("--output-file")
        .arg(output_file.path())
        .args(["--output-format", "JSON"])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_owned()
        } else {
            stderr.trim().to_owned()
        };
        return Err(ManifestError::SbomGeneration(format!(
            "{SBOM_GENERATOR_PACKAGE} exited with {}: {detail}",
            output.status
        )));
    }

    read_manifest(output_file.path())
}
