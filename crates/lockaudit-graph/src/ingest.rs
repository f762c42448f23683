use std::collections::{BTreeSet, HashMap};

use lockaudit_core::{
    DependencyKind, ROOT_DISPLAY_NAME, decl_key, is_exact_version, name_from_install_path,
    package_key, path_key,
};
use lockaudit_manifest::{BomComponent, CycloneDxBom, LockEntry, Lockfile, Manifest};
use lockaudit_store::{GraphStore, Params, StoreError};
use serde::Serialize;

use crate::GraphError;
use crate::resolve::resolve_dependency;
use crate::statements::{
    UPSERT_DECL, UPSERT_DECLARES_DEP, UPSERT_DEPENDS_ON, UPSERT_HAS_DEP, UPSERT_HAS_PACKAGE,
    UPSERT_INSTANCE_OF, UPSERT_LOCK_PACKAGE, UPSERT_PACKAGE, UPSERT_PROJECT, UPSERT_RESOLVES_TO,
};

const SBOM_PATH_PROPERTY: &str = "cdx:npm:package:path";
const SBOM_BUNDLED_PROPERTY: &str = "cdx:npm:package:bundled";

/// Counts reported by one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct IngestSummary {
    pub instances: usize,
    pub packages: usize,
    pub declarations: usize,
    pub resolved: usize,
    pub synthesized: usize,
    pub unresolved: usize,
}

/// Writes `manifest` into the graph under `project_id` inside a single store transaction.
///
/// Every write is an upsert keyed by a stable identity, so re-ingesting an unchanged
/// manifest leaves the graph unchanged.
pub fn ingest_manifest(
    store: &dyn GraphStore,
    project_id: &str,
    manifest: &Manifest,
) -> Result<IngestSummary, GraphError> {
    let mut summary = IngestSummary::default();

    store.transaction(&mut |tx| {
        upsert_project(tx, project_id, manifest)?;
        summary = match manifest {
            Manifest::Lockfile(lockfile) => ingest_lockfile(tx, project_id, lockfile)?,
            Manifest::Sbom(bom) => ingest_sbom(tx, project_id, bom)?,
        };
        Ok(())
    })?;

    tracing::info!(
        project = project_id,
        format = manifest.format_name(),
        instances = summary.instances,
        packages = summary.packages,
        declarations = summary.declarations,
        resolved = summary.resolved,
        synthesized = summary.synthesized,
        unresolved = summary.unresolved,
        "ingested manifest"
    );
    Ok(summary)
}

fn upsert_project(
    store: &dyn GraphStore,
    project_id: &str,
    manifest: &Manifest,
) -> Result<(), StoreError> {
    let meta = manifest.project_metadata();
    store.execute(
        UPSERT_PROJECT,
        &Params::new()
            .with("id", project_id)
            .with("manifest_path", project_id)
            .with("format", manifest.format_name())
            .with("format_version", meta.format_version)
            .with("name", meta.name)
            .with("version", meta.version)
            .with("package_manager", meta.package_manager),
    )?;
    Ok(())
}

/// Identity of one installed instance as computed in the first pass.
#[derive(Debug, Clone)]
struct InstanceIdentity {
    path_key: String,
    name: String,
    version: Option<String>,
    package_key: Option<String>,
}

impl InstanceIdentity {
    fn new(project_id: &str, install_path: &str, name: String, version: Option<&str>) -> Self {
        Self {
            path_key: path_key(project_id, install_path),
            package_key: version.map(|version| package_key(&name, version)),
            version: version.map(str::to_owned),
            name,
        }
    }
}

#[derive(Debug, Default)]
struct InstanceAttributes<'a> {
    path: &'a str,
    resolved: Option<&'a str>,
    integrity: Option<&'a str>,
    license: Option<&'a str>,
    is_link: bool,
    is_bundled: bool,
    has_install_script: bool,
    is_dev: bool,
    is_optional: bool,
    is_root: bool,
}

#[derive(Default)]
struct Progress {
    summary: IngestSummary,
    package_keys: BTreeSet<String>,
}

impl Progress {
    fn finish(mut self) -> IngestSummary {
        self.summary.packages = self.package_keys.len();
        self.summary
    }
}

fn upsert_instance(
    store: &dyn GraphStore,
    project_id: &str,
    identity: &InstanceIdentity,
    attributes: &InstanceAttributes<'_>,
    progress: &mut Progress,
) -> Result<(), StoreError> {
    let params = Params::new()
        .with("path_key", identity.path_key.as_str())
        .with("project_id", project_id)
        .with("path", attributes.path)
        .with("name", identity.name.as_str())
        .with("version", identity.version.as_deref())
        .with("resolved", attributes.resolved)
        .with("integrity", attributes.integrity)
        .with("license", attributes.license)
        .with("is_link", attributes.is_link)
        .with("is_bundled", attributes.is_bundled)
        .with("has_install_script", attributes.has_install_script)
        .with("is_dev", attributes.is_dev)
        .with("is_optional", attributes.is_optional)
        .with("is_root", attributes.is_root);

    store.execute(UPSERT_LOCK_PACKAGE, &params)?;
    store.execute(UPSERT_HAS_PACKAGE, &params)?;
    progress.summary.instances += 1;

    if let (Some(key), Some(version)) = (&identity.package_key, &identity.version) {
        upsert_package(store, key, &identity.name, version, progress)?;
        store.execute(
            UPSERT_INSTANCE_OF,
            &params.with("package_key", key.as_str()),
        )?;
    }

    Ok(())
}

fn upsert_package(
    store: &dyn GraphStore,
    key: &str,
    name: &str,
    version: &str,
    progress: &mut Progress,
) -> Result<(), StoreError> {
    store.execute(
        UPSERT_PACKAGE,
        &Params::new()
            .with("package_key", key)
            .with("package_name", name)
            .with("package_version", version),
    )?;
    progress.package_keys.insert(key.to_owned());
    Ok(())
}

/// Records a declaration and its DECLARES_DEP edge; returns the params shared by the
/// resolution edges that follow.
fn upsert_declaration(
    store: &dyn GraphStore,
    owner: &InstanceIdentity,
    kind: DependencyKind,
    dependency_name: &str,
    specifier: &str,
    progress: &mut Progress,
) -> Result<Params, StoreError> {
    let params = Params::new()
        .with("decl_key", decl_key(&owner.path_key, kind, dependency_name))
        .with("owner_path_key", owner.path_key.as_str())
        .with("dep_name", dependency_name)
        .with("specifier", specifier)
        .with("kind", kind.as_str())
        .with("owner_package_key", owner.package_key.as_deref());

    store.execute(UPSERT_DECL, &params)?;
    store.execute(UPSERT_DECLARES_DEP, &params)?;
    progress.summary.declarations += 1;
    Ok(params)
}

/// DEPENDS_ON between the instances, then RESOLVES_TO and HAS_DEP when versions allow.
fn link_resolved(
    store: &dyn GraphStore,
    declaration: Params,
    owner: &InstanceIdentity,
    target: &InstanceIdentity,
    progress: &mut Progress,
) -> Result<(), StoreError> {
    let params = declaration.with("target_path_key", target.path_key.as_str());
    store.execute(UPSERT_DEPENDS_ON, &params)?;
    progress.summary.resolved += 1;

    let Some(target_package) = target.package_key.as_deref() else {
        return Ok(());
    };
    let params = params.with("package_key", target_package);
    store.execute(UPSERT_RESOLVES_TO, &params)?;
    if owner.package_key.is_some() {
        store.execute(UPSERT_HAS_DEP, &params)?;
    }
    Ok(())
}

fn display_name(lockfile: &Lockfile, install_path: &str, entry: &LockEntry) -> String {
    if let Some(name) = entry.explicit_name() {
        return name.to_owned();
    }
    if install_path.is_empty() {
        return lockfile
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(ROOT_DISPLAY_NAME)
            .to_owned();
    }
    name_from_install_path(install_path)
        .unwrap_or(install_path)
        .to_owned()
}

fn ingest_lockfile(
    store: &dyn GraphStore,
    project_id: &str,
    lockfile: &Lockfile,
) -> Result<IngestSummary, StoreError> {
    let mut progress = Progress::default();
    let mut identities: HashMap<&str, InstanceIdentity> = HashMap::new();

    for (install_path, entry) in &lockfile.packages {
        let identity = InstanceIdentity::new(
            project_id,
            install_path,
            display_name(lockfile, install_path, entry),
            entry.version(),
        );
        let attributes = InstanceAttributes {
            path: install_path,
            resolved: entry.resolved.as_deref(),
            integrity: entry.integrity.as_deref(),
            license: entry.license(),
            is_link: entry.link,
            is_bundled: entry.in_bundle,
            has_install_script: entry.has_install_script,
            is_dev: entry.is_dev(),
            is_optional: entry.is_optional(),
            is_root: install_path.is_empty(),
        };

        upsert_instance(store, project_id, &identity, &attributes, &mut progress)?;
        identities.insert(install_path.as_str(), identity);
    }

    for (install_path, entry) in &lockfile.packages {
        let Some(owner) = identities.get(install_path.as_str()) else {
            continue;
        };

        for kind in DependencyKind::ALL {
            for (dependency_name, specifier) in entry.declared(kind) {
                let declaration = upsert_declaration(
                    store,
                    owner,
                    kind,
                    dependency_name,
                    specifier,
                    &mut progress,
                )?;

                let target = resolve_dependency(lockfile, install_path, dependency_name)
                    .and_then(|(target_path, _)| identities.get(target_path));

                match target {
                    Some(target) => {
                        link_resolved(store, declaration, owner, target, &mut progress)?;
                    }
                    None if is_exact_version(specifier) => {
                        let version = specifier.trim();
                        let key = package_key(dependency_name, version);
                        upsert_package(store, &key, dependency_name, version, &mut progress)?;
                        store.execute(
                            UPSERT_RESOLVES_TO,
                            &declaration.with("package_key", key.as_str()),
                        )?;
                        progress.summary.synthesized += 1;
                    }
                    None => {
                        tracing::debug!(
                            owner = %owner.path_key,
                            dependency = %dependency_name,
                            specifier = %specifier,
                            "declaration did not resolve"
                        );
                        progress.summary.unresolved += 1;
                    }
                }
            }
        }
    }

    Ok(progress.finish())
}

struct SbomInstance {
    identity: InstanceIdentity,
    kind: DependencyKind,
}

fn sbom_edge_kind(component: &BomComponent) -> DependencyKind {
    if component.is_development() {
        DependencyKind::Dev
    } else if component.is_optional() {
        DependencyKind::Optional
    } else {
        DependencyKind::Prod
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn ingest_sbom(
    store: &dyn GraphStore,
    project_id: &str,
    bom: &CycloneDxBom,
) -> Result<IngestSummary, StoreError> {
    let mut progress = Progress::default();
    let mut instances: HashMap<&str, SbomInstance> = HashMap::new();

    let components = bom
        .root_component()
        .map(|root| (root, true))
        .into_iter()
        .chain(bom.all_components().into_iter().map(|component| (component, false)));

    for (component, is_root) in components {
        let bom_ref = non_empty(component.bom_ref.as_deref());
        if !is_root && bom_ref.is_none_or(|bom_ref| instances.contains_key(bom_ref)) {
            tracing::debug!(
                name = ?component.full_name(),
                "skipping SBOM component without a unique bom-ref"
            );
            continue;
        }

        let install_path = match (is_root, bom_ref) {
            (true, _) => "",
            (false, Some(bom_ref)) => bom_ref,
            (false, None) => continue,
        };
        let name = component
            .full_name()
            .unwrap_or_else(|| match bom_ref {
                Some(bom_ref) if !is_root => bom_ref.to_owned(),
                _ => ROOT_DISPLAY_NAME.to_owned(),
            });
        let version = component.resolved_version();
        let identity = InstanceIdentity::new(project_id, install_path, name, version.as_deref());

        let attributes = InstanceAttributes {
            path: non_empty(component.property(SBOM_PATH_PROPERTY)).unwrap_or(install_path),
            license: component.license(),
            is_bundled: component.property(SBOM_BUNDLED_PROPERTY) == Some("true"),
            is_dev: component.is_development(),
            is_optional: component.is_optional(),
            is_root,
            ..InstanceAttributes::default()
        };
        upsert_instance(store, project_id, &identity, &attributes, &mut progress)?;

        if let Some(bom_ref) = bom_ref {
            instances.insert(
                bom_ref,
                SbomInstance {
                    identity,
                    kind: sbom_edge_kind(component),
                },
            );
        }
    }

    for dependency in &bom.dependencies {
        let Some(owner) = instances.get(dependency.reference.trim()) else {
            tracing::debug!(reference = %dependency.reference, "skipping unknown SBOM ref");
            continue;
        };

        for target_ref in &dependency.depends_on {
            let Some(target) = instances.get(target_ref.trim()) else {
                tracing::debug!(reference = %target_ref, "skipping unknown SBOM dependsOn ref");
                progress.summary.unresolved += 1;
                continue;
            };

            let declaration = upsert_declaration(
                store,
                &owner.identity,
                target.kind,
                &target.identity.name,
                target.identity.version.as_deref().unwrap_or_default(),
                &mut progress,
            )?;
            link_resolved(
                store,
                declaration,
                &owner.identity,
                &target.identity,
                &mut progress,
            )?;
        }
    }

    Ok(progress.finish())
}
