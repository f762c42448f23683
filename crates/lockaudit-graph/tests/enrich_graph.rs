use async_trait::async_trait;
use lockaudit_advisory::{
    AdvisoryError, AdvisoryRecord, AdvisorySource, BatchResult, MockAdvisorySource, PackageQuery,
    SeverityEntry,
};
use lockaudit_graph::{EnrichOptions, enrich_graph, ingest_manifest};
use lockaudit_manifest::parse_manifest;
use lockaudit_store::{GraphStore, Params, SqliteGraphStore, graph_stats};
use tempfile::{TempDir, tempdir};

const LOCKFILE: &str = r#"{
  "lockfileVersion": 3,
  "packages": {
    "": {"name": "app", "version": "1.0.0", "dependencies": {"left-pad": "^1.2.0", "lodash": "^4.17.0"}},
    "node_modules/left-pad": {"version": "1.2.0"},
    "node_modules/lodash": {"version": "4.17.20"}
  }
}"#;

fn ingested_store() -> (TempDir, SqliteGraphStore) {
    let temp = tempdir().expect("tempdir");
    let store = SqliteGraphStore::open(temp.path().join("graph.db")).expect("open store");
    let manifest = parse_manifest(LOCKFILE).expect("parse lockfile");
    ingest_manifest(&store, "/work/app/package-lock.json", &manifest).expect("ingest");
    (temp, store)
}

fn options(batch_size: usize) -> EnrichOptions {
    EnrichOptions {
        ecosystem: "npm".to_owned(),
        batch_size,
    }
}

fn advisory(id: &str, summary: &str, cvss: &str) -> AdvisoryRecord {
    AdvisoryRecord {
        summary: Some(summary.to_owned()),
        published: Some("2021-02-15T00:00:00Z".to_owned()),
        severity: vec![SeverityEntry {
            kind: "CVSS_V3".to_owned(),
            score: cvss.to_owned(),
        }],
        ..AdvisoryRecord::new(id)
    }
}

fn affects_edges(store: &SqliteGraphStore) -> Vec<String> {
    let rows = store
        .query(
            "SELECT vulnerability_id || ' -> ' || package_key AS edge FROM affects ORDER BY edge",
            &Params::new(),
        )
        .expect("query affects");
    (0..rows.len())
        .filter_map(|index| rows.text(index, "edge").map(str::to_owned))
        .collect()
}

fn severity_of(store: &SqliteGraphStore, id: &str) -> Option<String> {
    let rows = store
        .query(
            "SELECT severity FROM vulnerability WHERE id = :id",
            &Params::new().with("id", id),
        )
        .expect("query vulnerability");
    rows.text(0, "severity").map(str::to_owned)
}

#[tokio::test]
async fn shared_advisory_is_fetched_once_and_linked_to_every_package() {
    let (_temp, store) = ingested_store();
    let source = MockAdvisorySource::new()
        .with_advisory(
            advisory("GHSA-shared", "prototype pollution", "7.5"),
            &[("left-pad", "1.2.0"), ("lodash", "4.17.20")],
        )
        .with_advisory(
            advisory("GHSA-lodash", "command injection", "9.8"),
            &[("lodash", "4.17.20")],
        );

    let summary = enrich_graph(&store, &source, &options(1))
        .await
        .expect("enrich");

    assert_eq!(summary.packages, 3);
    assert_eq!(summary.package_hits, 2);
    assert_eq!(summary.vulnerability_ids, 2);
    assert_eq!(summary.advisories_fetched, 2);
    assert_eq!(source.batch_calls(), 3);
    assert_eq!(
        source.fetched_ids(),
        vec!["GHSA-shared".to_owned(), "GHSA-lodash".to_owned()]
    );

    assert_eq!(
        affects_edges(&store),
        vec![
            "GHSA-lodash -> lodash@4.17.20".to_owned(),
            "GHSA-shared -> left-pad@1.2.0".to_owned(),
            "GHSA-shared -> lodash@4.17.20".to_owned(),
        ]
    );

    let source_column = store
        .query("SELECT DISTINCT source FROM vulnerability", &Params::new())
        .expect("query source");
    assert_eq!(source_column.len(), 1);
    assert_eq!(source_column.text(0, "source"), Some("MOCK"));
}

#[tokio::test]
async fn rerun_adds_no_edges_and_overwrites_attributes() {
    let (_temp, store) = ingested_store();
    let mut source = MockAdvisorySource::new().with_advisory(
        advisory("GHSA-1", "first summary", "5.3"),
        &[("left-pad", "1.2.0")],
    );

    enrich_graph(&store, &source, &options(200))
        .await
        .expect("first enrich");
    let first_stats = graph_stats(&store).expect("stats");
    assert_eq!(first_stats.vulnerabilities, 1);
    assert_eq!(first_stats.affects, 1);
    assert_eq!(severity_of(&store, "GHSA-1").as_deref(), Some("5.3"));

    source.update_record(advisory("GHSA-1", "revised summary", "8.1"));
    enrich_graph(&store, &source, &options(200))
        .await
        .expect("second enrich");

    assert_eq!(graph_stats(&store).expect("stats"), first_stats);
    assert_eq!(severity_of(&store, "GHSA-1").as_deref(), Some("8.1"));
    // The cache lives for one run only, so the second run fetches again.
    assert_eq!(source.fetched_ids().len(), 2);
}

#[tokio::test]
async fn advisory_without_scores_is_stored_as_unknown() {
    let (_temp, store) = ingested_store();
    let source = MockAdvisorySource::new()
        .with_advisory(AdvisoryRecord::new("GHSA-bare"), &[("lodash", "4.17.20")]);

    enrich_graph(&store, &source, &options(10))
        .await
        .expect("enrich");

    assert_eq!(severity_of(&store, "GHSA-bare").as_deref(), Some("UNKNOWN"));
}

#[tokio::test]
async fn empty_graph_makes_no_advisory_calls() {
    let temp = tempdir().expect("tempdir");
    let store = SqliteGraphStore::open(temp.path().join("graph.db")).expect("open store");
    let source = MockAdvisorySource::new();

    let summary = enrich_graph(&store, &source, &options(200))
        .await
        .expect("enrich");

    assert_eq!(summary.packages, 0);
    assert_eq!(source.batch_calls(), 0);
}

/// Answers only the first query of each batch with one fixed advisory.
struct ShortBatchSource;

#[async_trait]
impl AdvisorySource for ShortBatchSource {
    fn source_name(&self) -> &str {
        "SHORT"
    }

    async fn query_batch(
        &self,
        queries: &[PackageQuery],
    ) -> Result<Vec<BatchResult>, AdvisoryError> {
        Ok(queries
            .iter()
            .take(1)
            .map(|_| BatchResult {
                vulnerability_ids: vec!["GHSA-first".to_owned()],
            })
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<AdvisoryRecord, AdvisoryError> {
        Ok(AdvisoryRecord::new(id))
    }
}

#[tokio::test]
async fn missing_batch_positions_count_as_no_hits() {
    let (_temp, store) = ingested_store();

    let summary = enrich_graph(&store, &ShortBatchSource, &options(200))
        .await
        .expect("enrich");

    assert_eq!(summary.packages, 3);
    assert_eq!(summary.package_hits, 1);
    // Packages are enriched in key order, so only the first key is linked.
    assert_eq!(affects_edges(&store), vec!["GHSA-first -> app@1.0.0".to_owned()]);
}

/// Fails every fetch to check that errors abort the run.
struct FailingFetchSource;

#[async_trait]
impl AdvisorySource for FailingFetchSource {
    fn source_name(&self) -> &str {
        "FAILING"
    }

    async fn query_batch(
        &self,
        queries: &[PackageQuery],
    ) -> Result<Vec<BatchResult>, AdvisoryError> {
        Ok(queries
            .iter()
            .map(|_| BatchResult {
                vulnerability_ids: vec!["GHSA-gone".to_owned()],
            })
            .collect())
    }

    async fn fetch(&self, id: &str) -> Result<AdvisoryRecord, AdvisoryError> {
        Err(AdvisoryError::NotFound(id.to_owned()))
    }
}

#[tokio::test]
async fn fetch_failure_propagates() {
    let (_temp, store) = ingested_store();

    let result = enrich_graph(&store, &FailingFetchSource, &options(200)).await;

    assert!(matches!(
        result,
        Err(lockaudit_graph::GraphError::Advisory(AdvisoryError::NotFound(id))) if id == "GHSA-gone"
    ));
    assert_eq!(graph_stats(&store).expect("stats").affects, 0);
}
