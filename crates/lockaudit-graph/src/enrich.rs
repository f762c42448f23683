use std::collections::{BTreeSet, HashMap};

use lockaudit_advisory::{AdvisoryRecord, AdvisorySource, PackageQuery, pick_severity};
use lockaudit_store::{GraphStore, Params, StoreError};
use serde::Serialize;

use crate::GraphError;
use crate::statements::{SELECT_ENRICHABLE_PACKAGES, UPSERT_AFFECTS, UPSERT_VULNERABILITY};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichOptions {
    pub ecosystem: String,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EnrichmentSummary {
    /// Packages with both name and version that were looked up.
    pub packages: usize,
    /// Distinct advisory ids seen across all hits.
    pub vulnerability_ids: usize,
    /// Packages with at least one advisory.
    pub package_hits: usize,
    /// Advisory records fetched in full; each id is fetched at most once per run.
    pub advisories_fetched: usize,
}

struct PackageRow {
    key: String,
    name: String,
    version: String,
}

/// Links every versioned Package to the advisories that affect it.
///
/// Advisory records are cached by id for the duration of this call, so each one is
/// fetched and written once no matter how many packages it affects. Re-running over an
/// unchanged graph overwrites vulnerability attributes and adds no edges.
pub async fn enrich_graph(
    store: &dyn GraphStore,
    source: &dyn AdvisorySource,
    options: &EnrichOptions,
) -> Result<EnrichmentSummary, GraphError> {
    let packages = load_packages(store)?;
    let mut summary = EnrichmentSummary {
        packages: packages.len(),
        ..EnrichmentSummary::default()
    };
    if packages.is_empty() {
        tracing::info!("no versioned packages to enrich");
        return Ok(summary);
    }

    let batch_size = options.batch_size.max(1);
    let mut cache: HashMap<String, AdvisoryRecord> = HashMap::new();
    let mut seen_ids: BTreeSet<String> = BTreeSet::new();

    for (batch_index, batch) in packages.chunks(batch_size).enumerate() {
        let queries: Vec<PackageQuery> = batch
            .iter()
            .map(|row| PackageQuery::new(&options.ecosystem, &row.name, &row.version))
            .collect();
        let results = source.query_batch(&queries).await?;
        if results.len() < batch.len() {
            tracing::debug!(
                batch = batch_index,
                expected = batch.len(),
                received = results.len(),
                "advisory batch returned fewer results than queries"
            );
        }

        for (position, row) in batch.iter().enumerate() {
            let Some(ids) = results
                .get(position)
                .map(|result| &result.vulnerability_ids)
                .filter(|ids| !ids.is_empty())
            else {
                continue;
            };
            summary.package_hits += 1;

            for id in ids {
                let id = id.trim();
                if id.is_empty() {
                    continue;
                }
                seen_ids.insert(id.to_owned());

                if !cache.contains_key(id) {
                    let record = source.fetch(id).await?;
                    upsert_vulnerability(store, id, source.source_name(), &record)?;
                    summary.advisories_fetched += 1;
                    cache.insert(id.to_owned(), record);
                }

                store.execute(
                    UPSERT_AFFECTS,
                    &Params::new()
                        .with("id", id)
                        .with("package_key", row.key.as_str()),
                )?;
            }
        }

        tracing::debug!(
            batch = batch_index,
            size = batch.len(),
            advisories = seen_ids.len(),
            "processed advisory batch"
        );
    }

    summary.vulnerability_ids = seen_ids.len();
    tracing::info!(
        packages = summary.packages,
        vulnerability_ids = summary.vulnerability_ids,
        package_hits = summary.package_hits,
        "enriched graph with advisories"
    );
    Ok(summary)
}

fn load_packages(store: &dyn GraphStore) -> Result<Vec<PackageRow>, StoreError> {
    let rows = store.query(SELECT_ENRICHABLE_PACKAGES, &Params::new())?;

    Ok((0..rows.len())
        .filter_map(|index| {
            Some(PackageRow {
                key: rows.text(index, "key")?.to_owned(),
                name: rows.text(index, "name")?.to_owned(),
                version: rows.text(index, "version")?.to_owned(),
            })
        })
        .collect())
}

fn upsert_vulnerability(
    store: &dyn GraphStore,
    id: &str,
    source_name: &str,
    record: &AdvisoryRecord,
) -> Result<(), StoreError> {
    store.execute(
        UPSERT_VULNERABILITY,
        &Params::new()
            .with("id", id)
            .with("source", source_name)
            .with("summary", record.summary.as_deref())
            .with("severity", pick_severity(record))
            .with("published", record.published.as_deref())
            .with("modified", record.modified.as_deref()),
    )?;
    Ok(())
}
