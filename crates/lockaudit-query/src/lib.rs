//! Guarded, step-bounded natural-language query loop over the lockaudit graph.

mod agent;
mod guard;
mod prompt;

pub use agent::{
    AgentAnswer, AgentError, AgentOptions, AgentOutcome, AgentState, FALLBACK_HEADER, QueryAgent,
};
pub use guard::{BLOCKED_KEYWORDS, GraphQueryResult, GuardError, QueryGuard};
pub use prompt::GRAPH_QUERY_TOOL;
