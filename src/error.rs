use thiserror::Error;

#[derive(Error, Debug)]
pub enum Nl2SqlError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Schema fetch error: {0}")]
    SchemaFetch(String),

    #[error("Grammar collision: columns '{first}' and '{second}' both map to terminal {terminal}")]
    GrammarCollision {
        terminal: String,
        first: String,
        second: String,
    },

    #[error("Empty schema: {0}")]
    EmptySchema(String),

    #[error("Generation service error: {0}")]
    GenerationService(String),

    #[error("Query engine error ({status}): {body}")]
    Execution { status: u16, body: String },

    #[error("Query engine unreachable: {0}")]
    QueryTransport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Nl2SqlError>;
