use std::collections::BTreeMap;

use lockaudit_core::NESTING_MARKER;
use lockaudit_manifest::{LockEntry, Lockfile};

/// Finds the installed instance that satisfies `dependency_name` when required from
/// `owner_path`, using nearest-ancestor lookup.
///
/// Link entries whose `resolved` value names another installation path are followed once.
pub fn resolve_dependency<'a>(
    lockfile: &'a Lockfile,
    owner_path: &str,
    dependency_name: &str,
) -> Option<(&'a str, &'a LockEntry)> {
    walk_ancestors(&lockfile.packages, owner_path, dependency_name, NESTING_MARKER)
}

/// Installation path one nesting level up, or `""` once the root is reached.
///
/// `node_modules/a/node_modules/b` yields `node_modules/a`; `node_modules/a` and workspace
/// paths such as `packages/web` yield the root.
fn parent_with_marker<'p>(install_path: &'p str, marker: &str) -> &'p str {
    let separator = format!("/{marker}/");
    match install_path.rfind(&separator) {
        Some(index) => &install_path[..index],
        None => "",
    }
}

fn candidate_path(base: &str, marker: &str, dependency_name: &str) -> String {
    if base.is_empty() {
        format!("{marker}/{dependency_name}")
    } else {
        format!("{base}/{marker}/{dependency_name}")
    }
}

pub(crate) fn walk_ancestors<'a>(
    packages: &'a BTreeMap<String, LockEntry>,
    owner_path: &str,
    dependency_name: &str,
    marker: &str,
) -> Option<(&'a str, &'a LockEntry)> {
    let mut base = owner_path;
    loop {
        let candidate = candidate_path(base, marker, dependency_name);
        if let Some((path, entry)) = packages.get_key_value(candidate.as_str()) {
            return Some(follow_link(packages, path, entry));
        }

        if base.is_empty() {
            return None;
        }
        base = parent_with_marker(base, marker);
    }
}

fn follow_link<'a>(
    packages: &'a BTreeMap<String, LockEntry>,
    path: &'a str,
    entry: &'a LockEntry,
) -> (&'a str, &'a LockEntry) {
    if !entry.link {
        return (path, entry);
    }

    entry
        .resolved
        .as_deref()
        .and_then(|target| packages.get_key_value(target))
        .map_or((path, entry), |(target, target_entry)| {
            (target.as_str(), target_entry)
        })
}
