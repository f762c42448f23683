use lockaudit_infer::ToolDefinition;
use serde_json::json;

pub const GRAPH_QUERY_TOOL: &str = "run_graph_query";

pub(crate) fn system_prompt() -> String {
    [
        "You are a dependency-security analyst.",
        "Answer by calling the run_graph_query tool with read-only SQLite SELECT statements against the lockaudit graph.",
        "Do not invent data; if evidence is missing, say so.",
        "Always include concrete evidence from query results.",
        "Node tables:",
        "project(id, manifest_path, format, format_version, name, version, package_manager);",
        "lock_package(path_key, project_id, path, name, version, resolved, integrity, license, is_link, is_bundled, has_install_script, is_dev, is_optional, is_root) is one installed instance;",
        "package(key, name, version) is a canonical name@version identity;",
        "dependency_decl(key, owner_path_key, name, specifier, kind) is a declared requirement;",
        "vulnerability(id, source, summary, severity, published, modified).",
        "Relationship tables:",
        "has_package(project_id, path_key);",
        "instance_of(path_key, package_key);",
        "declares_dep(path_key, decl_key);",
        "depends_on(from_path_key, to_path_key, kind, specifier) links installed instances;",
        "resolves_to(decl_key, package_key);",
        "has_dep(from_key, to_key, kind) links packages;",
        "affects(vulnerability_id, package_key).",
        "kind is one of prod, dev, optional, peer.",
    ]
    .join(" ")
}

pub(crate) fn user_prompt(question: &str) -> String {
    [
        format!("Question: {question}"),
        String::new(),
        "You can call tools multiple times.".to_owned(),
        "Return concise remediation guidance with supporting evidence and direct/transitive context when relevant.".to_owned(),
    ]
    .join("\n")
}

pub(crate) fn graph_query_tool() -> ToolDefinition {
    ToolDefinition::function(
        GRAPH_QUERY_TOOL,
        "Run a read-only SQLite query against the lockaudit graph.",
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Read-only SELECT statement. Writes (INSERT/UPDATE/DELETE/CREATE/DROP/etc) are rejected."
                }
            },
            "required": ["query"]
        }),
    )
}
