use rusqlite::Connection;
use serde::Serialize;

use crate::{GraphStore, Params, StoreError};

pub(crate) fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS project (
            id TEXT PRIMARY KEY,
            manifest_path TEXT NOT NULL,
            format TEXT NOT NULL,
            format_version TEXT,
            name TEXT,
            version TEXT,
            package_manager TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS lock_package (
            path_key TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            version TEXT,
            resolved TEXT,
            integrity TEXT,
            license TEXT,
            is_link INTEGER NOT NULL DEFAULT 0,
            is_bundled INTEGER NOT NULL DEFAULT 0,
            has_install_script INTEGER NOT NULL DEFAULT 0,
            is_dev INTEGER NOT NULL DEFAULT 0,
            is_optional INTEGER NOT NULL DEFAULT 0,
            is_root INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS package (
            key TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            version TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dependency_decl (
            key TEXT PRIMARY KEY,
            owner_path_key TEXT NOT NULL,
            name TEXT NOT NULL,
            specifier TEXT NOT NULL,
            kind TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS vulnerability (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            summary TEXT,
            severity TEXT NOT NULL,
            published TEXT,
            modified TEXT
        );

        CREATE TABLE IF NOT EXISTS has_package (
            project_id TEXT NOT NULL,
            path_key TEXT NOT NULL,
            PRIMARY KEY (project_id, path_key)
        );

        CREATE TABLE IF NOT EXISTS instance_of (
            path_key TEXT PRIMARY KEY,
            package_key TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS declares_dep (
            path_key TEXT NOT NULL,
            decl_key TEXT NOT NULL,
            PRIMARY KEY (path_key, decl_key)
        );

        CREATE TABLE IF NOT EXISTS depends_on (
            from_path_key TEXT NOT NULL,
            to_path_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            specifier TEXT NOT NULL,
            PRIMARY KEY (from_path_key, to_path_key, kind)
        );

        CREATE TABLE IF NOT EXISTS resolves_to (
            decl_key TEXT PRIMARY KEY,
            package_key TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS has_dep (
            from_key TEXT NOT NULL,
            to_key TEXT NOT NULL,
            kind TEXT NOT NULL,
            PRIMARY KEY (from_key, to_key, kind)
        );

        CREATE TABLE IF NOT EXISTS affects (
            vulnerability_id TEXT NOT NULL,
            package_key TEXT NOT NULL,
            PRIMARY KEY (vulnerability_id, package_key)
        );

        CREATE INDEX IF NOT EXISTS idx_lock_package_project ON lock_package(project_id);
        CREATE INDEX IF NOT EXISTS idx_package_name ON package(name);
        CREATE INDEX IF NOT EXISTS idx_instance_of_package ON instance_of(package_key);
        CREATE INDEX IF NOT EXISTS idx_depends_on_target ON depends_on(to_path_key);
        CREATE INDEX IF NOT EXISTS idx_has_dep_target ON has_dep(to_key);
        CREATE INDEX IF NOT EXISTS idx_affects_package ON affects(package_key);
        "#,
    )?;

    Ok(())
}

/// Row counts for every node label and relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GraphStats {
    pub projects: u64,
    pub lock_packages: u64,
    pub packages: u64,
    pub dependency_decls: u64,
    pub vulnerabilities: u64,
    pub has_package: u64,
    pub instance_of: u64,
    pub declares_dep: u64,
    pub depends_on: u64,
    pub resolves_to: u64,
    pub has_dep: u64,
    pub affects: u64,
}

impl GraphStats {
    pub fn entries(&self) -> [(&'static str, u64); 12] {
        [
            ("projects", self.projects),
            ("lock_packages", self.lock_packages),
            ("packages", self.packages),
            ("dependency_decls", self.dependency_decls),
            ("vulnerabilities", self.vulnerabilities),
            ("has_package", self.has_package),
            ("instance_of", self.instance_of),
            ("declares_dep", self.declares_dep),
            ("depends_on", self.depends_on),
            ("resolves_to", self.resolves_to),
            ("has_dep", self.has_dep),
            ("affects", self.affects),
        ]
    }
}

pub fn graph_stats(store: &dyn GraphStore) -> Result<GraphStats, StoreError> {
    let rows = store.query(
        r#"
        SELECT
            (SELECT count(*) FROM project) AS projects,
            (SELECT count(*) FROM lock_package) AS lock_packages,
            (SELECT count(*) FROM package) AS packages,
            (SELECT count(*) FROM dependency_decl) AS dependency_decls,
            (SELECT count(*) FROM vulnerability) AS vulnerabilities,
            (SELECT count(*) FROM has_package) AS has_package,
            (SELECT count(*) FROM instance_of) AS instance_of,
            (SELECT count(*) FROM declares_dep) AS declares_dep,
            (SELECT count(*) FROM depends_on) AS depends_on,
            (SELECT count(*) FROM resolves_to) AS resolves_to,
            (SELECT count(*) FROM has_dep) AS has_dep,
            (SELECT count(*) FROM affects) AS affects
        "#,
        &Params::new(),
    )?;

    let count = |column: &str| {
        rows.integer(0, column)
            .and_then(|value| u64::try_from(value).ok())
            .unwrap_or_default()
    };

    Ok(GraphStats {
        projects: count("projects"),
        lock_packages: count("lock_packages"),
        packages: count("packages"),
        dependency_decls: count("dependency_decls"),
        vulnerabilities: count("vulnerabilities"),
        has_package: count("has_package"),
        instance_of: count("instance_of"),
        declares_dep: count("declares_dep"),
        depends_on: count("depends_on"),
        resolves_to: count("resolves_to"),
        has_dep: count("has_dep"),
        affects: count("affects"),
    })
}
