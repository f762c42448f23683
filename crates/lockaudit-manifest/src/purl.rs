use std::str::FromStr;

use packageurl::PackageUrl;

/// The parts of a package URL needed to identify a package.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Purl {
    pub kind: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Parses `pkg:<type>/<namespace>/<name>@<version>?<qualifiers>#<subpath>`.
///
/// Namespace and name are joined with `/`, so both `pkg:npm/%40scope%2Fname@1.0.0` and
/// `pkg:npm/%40scope/name@1.0.0` yield `@scope/name`. Invalid purls yield an empty `Purl`.
pub fn parse_purl(purl: &str) -> Purl {
    let parsed = match PackageUrl::from_str(purl.trim()) {
        Ok(parsed) => parsed,
        Err(err) => {
            tracing::debug!(purl, error = %err, "ignoring invalid purl");
            return Purl::default();
        }
    };

    let name = match parsed.namespace().filter(|namespace| !namespace.is_empty()) {
        Some(namespace) => format!("{namespace}/{}", parsed.name()),
        None => parsed.name().to_owned(),
    };

    Purl {
        kind: non_empty(parsed.ty().to_ascii_lowercase()),
        name: non_empty(name),
        version: parsed.version().map(str::to_owned).and_then(non_empty),
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
