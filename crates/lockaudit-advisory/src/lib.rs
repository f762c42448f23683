use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod mock;
mod osv;

pub use mock::MockAdvisorySource;
pub use osv::{OSV_SOURCE, OsvClient};

pub const UNKNOWN_SEVERITY: &str = "UNKNOWN";

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid advisory endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("advisory not found: {0}")]
    NotFound(String),
}

/// One `(ecosystem, name, version)` lookup in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageQuery {
    pub ecosystem: String,
    pub name: String,
    pub version: String,
}

impl PackageQuery {
    pub fn new(ecosystem: &str, name: &str, version: &str) -> Self {
        Self {
            ecosystem: ecosystem.to_owned(),
            name: name.to_owned(),
            version: version.to_owned(),
        }
    }
}

/// Advisory ids matching one query, in the position of that query in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchResult {
    pub vulnerability_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeverityEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub score: String,
}

/// Full advisory record as returned by a single-record fetch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdvisoryRecord {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub severity: Vec<SeverityEntry>,
    #[serde(default)]
    pub database_specific: Option<Value>,
}

impl AdvisoryRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait AdvisorySource: Send + Sync {
    /// Tag stored as the `source` of every vulnerability this source produces.
    fn source_name(&self) -> &str;

    /// Looks up every query at once. Results align by index with `queries`; a shorter
    /// result list means no hits for the missing positions.
    async fn query_batch(
        &self,
        queries: &[PackageQuery],
    ) -> Result<Vec<BatchResult>, AdvisoryError>;

    async fn fetch(&self, id: &str) -> Result<AdvisoryRecord, AdvisoryError>;
}

/// Deterministic severity for a record.
///
/// Prefers CVSS v4 over v3 over v2 over other score types, then the higher numeric score,
/// then the lexicographically smaller score text. Falls back to
/// `database_specific.severity`, then [`UNKNOWN_SEVERITY`].
pub fn pick_severity(record: &AdvisoryRecord) -> String {
    let best = record
        .severity
        .iter()
        .filter(|entry| !entry.score.trim().is_empty())
        .min_by(|left, right| compare_severity(left, right));

    if let Some(entry) = best {
        return entry.score.trim().to_owned();
    }

    record
        .database_specific
        .as_ref()
        .and_then(|value| value.get("severity"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|severity| !severity.is_empty())
        .map_or_else(|| UNKNOWN_SEVERITY.to_owned(), str::to_owned)
}

fn severity_rank(kind: &str) -> u8 {
    match kind.trim().to_ascii_uppercase().as_str() {
        "CVSS_V4" => 3,
        "CVSS_V3" => 2,
        "CVSS_V2" => 1,
        _ => 0,
    }
}

// `Less` means `left` is preferred.
fn compare_severity(left: &SeverityEntry, right: &SeverityEntry) -> Ordering {
    let numeric = |entry: &SeverityEntry| entry.score.trim().parse::<f64>().ok();

    severity_rank(&right.kind)
        .cmp(&severity_rank(&left.kind))
        .then_with(|| match (numeric(left), numeric(right)) {
            (Some(left), Some(right)) => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| left.score.trim().cmp(right.score.trim()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(kind: &str, score: &str) -> SeverityEntry {
        SeverityEntry {
            kind: kind.to_owned(),
            score: score.to_owned(),
        }
    }

    #[test]
    fn pick_severity_prefers_newest_cvss_version() {
        let mut record = AdvisoryRecord::new("GHSA-1");
        record.severity = vec![
            entry("CVSS_V3", "CVSS:3.1/AV:N/AC:L"),
            entry("CVSS_V4", "CVSS:4.0/AV:N/AC:L"),
            entry("Ubuntu", "high"),
        ];

        assert_eq!(pick_severity(&record), "CVSS:4.0/AV:N/AC:L");
    }

    #[test]
    fn pick_severity_breaks_ties_by_score_then_text() {
        let mut record = AdvisoryRecord::new("GHSA-2");
        record.severity = vec![entry("CVSS_V3", "5.3"), entry("CVSS_V3", "9.8")];
        assert_eq!(pick_severity(&record), "9.8");

        record.severity = vec![entry("CVSS_V3", "CVSS:3.1/B"), entry("CVSS_V3", "CVSS:3.1/A")];
        assert_eq!(pick_severity(&record), "CVSS:3.1/A");

        record.severity = vec![entry("CVSS_V3", "CVSS:3.1/A"), entry("CVSS_V3", "7.5")];
        assert_eq!(pick_severity(&record), "7.5");
    }

    #[test]
    fn pick_severity_falls_back_to_database_specific_then_unknown() {
        let mut record = AdvisoryRecord::new("GHSA-3");
        record.severity = vec![entry("CVSS_V3", "  ")];
        record.database_specific = Some(json!({"severity": "MODERATE"}));
        assert_eq!(pick_severity(&record), "MODERATE");

        record.database_specific = Some(json!({"cwe_ids": []}));
        assert_eq!(pick_severity(&record), UNKNOWN_SEVERITY);
    }

    #[test]
    fn advisory_record_deserializes_osv_shape() {
        let record: AdvisoryRecord = serde_json::from_value(json!({
            "id": "GHSA-xxxx",
            "summary": "Prototype pollution",
            "aliases": ["CVE-2020-8203"],
            "published": "2020-07-15T00:00:00Z",
            "modified": "2024-01-01T00:00:00Z",
            "severity": [{"type": "CVSS_V3", "score": "CVSS:3.1/AV:N"}],
            "affected": [{"package": {"ecosystem": "npm", "name": "lodash"}}]
        }))
        .expect("decode record");

        assert_eq!(record.summary.as_deref(), Some("Prototype pollution"));
        assert_eq!(record.aliases, vec!["CVE-2020-8203".to_owned()]);
        assert_eq!(record.severity.len(), 1);
        assert_eq!(record.database_specific, None);
    }
}
