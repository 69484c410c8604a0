use thiserror::Error;

/// A convenience `Result` alias using [`HiveError`].
pub type HiveResult<T> = Result<T, HiveError>;

/// Top-level error type for the Hive orchestrator.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Error, Debug)]
pub enum HiveError {
    /// An error originating from an agent session loop.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request (e.g. LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error raised by a tool during invocation.
    #[error("Tool error: {0}")]
    Tool(String),

    /// A file-coordination error (lock registry misuse, bad path).
    #[error("Lock error: {0}")]
    Lock(String),

    /// A dependency-graph error (cycles, unknown agents, deadlock).
    #[error("Graph error: {0}")]
    Graph(String),

    /// An error in configuration or workflow spec parsing.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the top-level orchestration loop.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
