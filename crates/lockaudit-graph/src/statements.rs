pub(crate) const UPSERT_PROJECT: &str = r#"
    INSERT INTO project (id, manifest_path, format, format_version, name, version, package_manager)
    VALUES (:id, :manifest_path, :format, :format_version, :name, :version, :package_manager)
    ON CONFLICT(id) DO UPDATE SET
        manifest_path = excluded.manifest_path,
        format = excluded.format,
        format_version = excluded.format_version,
        name = excluded.name,
        version = excluded.version,
        package_manager = excluded.package_manager
"#;

pub(crate) const UPSERT_LOCK_PACKAGE: &str = r#"
    INSERT INTO lock_package (
        path_key, project_id, path, name, version, resolved, integrity, license,
        is_link, is_bundled, has_install_script, is_dev, is_optional, is_root
    ) VALUES (
        :path_key, :project_id, :path, :name, :version, :resolved, :integrity, :license,
        :is_link, :is_bundled, :has_install_script, :is_dev, :is_optional, :is_root
    )
    ON CONFLICT(path_key) DO UPDATE SET
        project_id = excluded.project_id,
        path = excluded.path,
        name = excluded.name,
        version = excluded.version,
        resolved = excluded.resolved,
        integrity = excluded.integrity,
        license = excluded.license,
        is_link = excluded.is_link,
        is_bundled = excluded.is_bundled,
        has_install_script = excluded.has_install_script,
        is_dev = excluded.is_dev,
        is_optional = excluded.is_optional,
        is_root = excluded.is_root
"#;

pub(crate) const UPSERT_HAS_PACKAGE: &str = r#"
    INSERT INTO has_package (project_id, path_key) VALUES (:project_id, :path_key)
    ON CONFLICT(project_id, path_key) DO NOTHING
"#;

pub(crate) const UPSERT_PACKAGE: &str = r#"
    INSERT INTO package (key, name, version) VALUES (:package_key, :package_name, :package_version)
    ON CONFLICT(key) DO UPDATE SET
        name = excluded.name,
        version = excluded.version
"#;

pub(crate) const UPSERT_INSTANCE_OF: &str = r#"
    INSERT INTO instance_of (path_key, package_key) VALUES (:path_key, :package_key)
    ON CONFLICT(path_key) DO UPDATE SET package_key = excluded.package_key
"#;

pub(crate) const UPSERT_DECL: &str = r#"
    INSERT INTO dependency_decl (key, owner_path_key, name, specifier, kind)
    VALUES (:decl_key, :owner_path_key, :dep_name, :specifier, :kind)
    ON CONFLICT(key) DO UPDATE SET
        owner_path_key = excluded.owner_path_key,
        name = excluded.name,
        specifier = excluded.specifier,
        kind = excluded.kind
"#;

pub(crate) const UPSERT_DECLARES_DEP: &str = r#"
    INSERT INTO declares_dep (path_key, decl_key) VALUES (:owner_path_key, :decl_key)
    ON CONFLICT(path_key, decl_key) DO NOTHING
"#;

pub(crate) const UPSERT_DEPENDS_ON: &str = r#"
    INSERT INTO depends_on (from_path_key, to_path_key, kind, specifier)
    VALUES (:owner_path_key, :target_path_key, :kind, :specifier)
    ON CONFLICT(from_path_key, to_path_key, kind) DO UPDATE SET specifier = excluded.specifier
"#;

pub(crate) const UPSERT_RESOLVES_TO: &str = r#"
    INSERT INTO resolves_to (decl_key, package_key) VALUES (:decl_key, :package_key)
    ON CONFLICT(decl_key) DO UPDATE SET package_key = excluded.package_key
"#;

pub(crate) const UPSERT_HAS_DEP: &str = r#"
    INSERT INTO has_dep (from_key, to_key, kind) VALUES (:owner_package_key, :package_key, :kind)
    ON CONFLICT(from_key, to_key, kind) DO NOTHING
"#;

pub(crate) const SELECT_ENRICHABLE_PACKAGES: &str = r#"
    SELECT key, name, version
    FROM package
    WHERE name IS NOT NULL AND name <> '' AND version IS NOT NULL AND version <> ''
    ORDER BY key ASC
"#;

pub(crate) const UPSERT_VULNERABILITY: &str = r#"
    INSERT INTO vulnerability (id, source, summary, severity, published, modified)
    VALUES (:id, :source, :summary, :severity, :published, :modified)
    ON CONFLICT(id) DO UPDATE SET
        source = excluded.source,
        summary = excluded.summary,
        severity = excluded.severity,
        published = excluded.published,
        modified = excluded.modified
"#;

pub(crate) const UPSERT_AFFECTS: &str = r#"
    INSERT INTO affects (vulnerability_id, package_key) VALUES (:id, :package_key)
    ON CONFLICT(vulnerability_id, package_key) DO NOTHING
"#;
