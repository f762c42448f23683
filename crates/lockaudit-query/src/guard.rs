use lockaudit_config::DEFAULT_AGENT_MAX_ROWS;
use lockaudit_store::{GraphStore, Params, StoreError};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Keywords that make a query write-like. Matched case-insensitively on word boundaries,
/// anywhere in the statement.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "CREATE",
    "MERGE",
    "DELETE",
    "DETACH",
    "SET",
    "REMOVE",
    "DROP",
    "ALTER",
    "COPY",
    "LOAD",
    "INSTALL",
    "UNINSTALL",
    "EXPORT",
    "IMPORT",
    "ATTACH",
    "INSERT",
    "UPDATE",
    "PRAGMA",
    "VACUUM",
    "REINDEX",
    "UPSERT",
];

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("graph query is required")]
    EmptyQuery,
    #[error("only read-only graph queries are allowed (found {0})")]
    Blocked(String),
    #[error("graph query failed: {0}")]
    Store(#[from] StoreError),
}

/// What the completion loop sees after a successful tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQueryResult {
    /// The statement that actually ran, including any appended limit.
    pub query: String,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Syntactic read-only check plus row cap for analyst-composed queries.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    blocked: Regex,
    comments: Regex,
    trailing_limit: Regex,
    max_rows: u32,
}

impl QueryGuard {
    /// `max_rows == 0` falls back to the default cap.
    pub fn new(max_rows: u32) -> Result<Self, regex::Error> {
        let blocked = Regex::new(&format!(r"(?i)\b({})\b", BLOCKED_KEYWORDS.join("|")))?;
        let comments = Regex::new(r"(?s)--[^\n]*|/\*.*?\*/")?;
        let trailing_limit =
            Regex::new(r"(?i)\bLIMIT\s+\d+(\s*(,|\bOFFSET\b)\s*\d+)?\s*$")?;

        Ok(Self {
            blocked,
            comments,
            trailing_limit,
            max_rows: if max_rows == 0 {
                DEFAULT_AGENT_MAX_ROWS
            } else {
                max_rows
            },
        })
    }

    pub fn max_rows(&self) -> u32 {
        self.max_rows
    }

    /// Normalizes `query` and returns the statement to execute, or why it may not run.
    pub fn prepare(&self, query: &str) -> Result<String, GuardError> {
        let query = query
            .trim()
            .trim_end_matches(|ch: char| ch == ';' || ch.is_whitespace());
        if query.is_empty() {
            return Err(GuardError::EmptyQuery);
        }

        if let Some(keyword) = self.blocked.find(query) {
            return Err(GuardError::Blocked(keyword.as_str().to_ascii_uppercase()));
        }

        // Only a LIMIT closing the outer statement caps the rows; one in a subquery or
        // comment does not.
        let code = self.comments.replace_all(query, " ");
        if self.trailing_limit.is_match(&code) {
            Ok(query.to_owned())
        } else {
            Ok(format!("{query}\nLIMIT {}", self.max_rows))
        }
    }

    /// Guards and runs `query` against `store`. Nothing reaches the store when the guard
    /// rejects the query.
    pub fn run(&self, store: &dyn GraphStore, query: &str) -> Result<GraphQueryResult, GuardError> {
        let statement = self.prepare(query)?;
        let rows = store.query(&statement, &Params::new())?;

        Ok(GraphQueryResult {
            row_count: rows.len(),
            columns: rows.columns,
            rows: rows.rows,
            query: statement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> QueryGuard {
        QueryGuard::new(200).expect("guard patterns")
    }

    #[test]
    fn write_keywords_are_rejected_in_any_case_and_position() {
        let guard = guard();
        for query in [
            "DELETE FROM package",
            "select * from package where name in (select name from package); delete from package",
            "SELECT key FROM package UNION SELECT 1 FROM (SELECT 1) WHERE 0; Merge x",
            "select * from package -- then DrOp table package",
            "WITH x AS (SELECT 1) INSERT INTO package VALUES ('a', 'a', '1')",
            "pragma table_info(package)",
            "UPDATE vulnerability SET severity = 'LOW'",
        ] {
            assert!(
                matches!(guard.prepare(query), Err(GuardError::Blocked(_))),
                "expected rejection for {query:?}"
            );
        }

        assert!(matches!(
            guard.prepare("match (n) detach delete n"),
            Err(GuardError::Blocked(keyword)) if keyword == "DETACH"
        ));
    }

    #[test]
    fn keywords_inside_identifiers_are_allowed() {
        let guard = guard();
        assert!(guard.prepare("SELECT created_at, dataset FROM package").is_ok());
        assert!(guard.prepare("SELECT offset_value FROM updates_view").is_ok());
    }

    #[test]
    fn limit_is_appended_only_when_missing() {
        let guard = guard();

        assert_eq!(
            guard.prepare("  SELECT key FROM package;;  ").expect("prepare"),
            "SELECT key FROM package\nLIMIT 200"
        );
        assert_eq!(
            guard.prepare("select key from package limit 5").expect("prepare"),
            "select key from package limit 5"
        );
        assert_eq!(
            guard
                .prepare("SELECT key FROM package LIMIT\n10;")
                .expect("prepare"),
            "SELECT key FROM package LIMIT\n10"
        );
        assert_eq!(
            guard.prepare("SELECT 'LIMIT' AS word").expect("prepare"),
            "SELECT 'LIMIT' AS word\nLIMIT 200"
        );
        assert_eq!(
            guard
                .prepare("SELECT key FROM package LIMIT 10 OFFSET 20")
                .expect("prepare"),
            "SELECT key FROM package LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn inner_or_commented_limits_still_get_the_outer_cap() {
        let guard = guard();

        let subquery = "SELECT * FROM package WHERE key IN (SELECT package_key FROM affects LIMIT 5)";
        assert_eq!(
            guard.prepare(subquery).expect("prepare"),
            format!("{subquery}\nLIMIT 200")
        );

        let commented = "SELECT key FROM package -- LIMIT 5";
        assert_eq!(
            guard.prepare(commented).expect("prepare"),
            format!("{commented}\nLIMIT 200")
        );

        let block = "SELECT key FROM package /* LIMIT 5 */";
        assert_eq!(
            guard.prepare(block).expect("prepare"),
            format!("{block}\nLIMIT 200")
        );

        assert_eq!(
            guard
                .prepare("SELECT key FROM package LIMIT 5 -- first page")
                .expect("prepare"),
            "SELECT key FROM package LIMIT 5 -- first page"
        );
    }

    #[test]
    fn empty_queries_are_rejected() {
        let guard = guard();
        assert!(matches!(guard.prepare(""), Err(GuardError::EmptyQuery)));
        assert!(matches!(guard.prepare("  ;; ; "), Err(GuardError::EmptyQuery)));
    }

    #[test]
    fn zero_max_rows_uses_default_cap() {
        let guard = QueryGuard::new(0).expect("guard patterns");
        assert_eq!(guard.max_rows(), DEFAULT_AGENT_MAX_ROWS);
        assert!(
            guard
                .prepare("SELECT 1")
                .expect("prepare")
                .ends_with(&format!("LIMIT {DEFAULT_AGENT_MAX_ROWS}"))
        );
    }

    #[test]
    fn result_serializes_with_camel_case_keys() {
        let result = GraphQueryResult {
            query: "SELECT 1 AS one\nLIMIT 200".to_owned(),
            row_count: 1,
            columns: vec!["one".to_owned()],
            rows: vec![Map::from_iter([("one".to_owned(), Value::from(1))])],
        };

        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            serde_json::json!({
                "query": "SELECT 1 AS one\nLIMIT 200",
                "rowCount": 1,
                "columns": ["one"],
                "rows": [{"one": 1}],
            })
        );
    }
}
