use thiserror::Error;

/// Main error type for Bindsworth operations
#[derive(Error, Debug)]
pub enum BindsworthError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Declaration dump error: {0}")]
    Dump(String),

    #[error("Input invariant violated by {declaration}: {reason}")]
    InvariantViolation { declaration: String, reason: String },

    #[error("Naming conflict: \"{identifier}\" in scope {scope} is claimed by both {first} and {second}")]
    NamingConflict {
        identifier: String,
        scope: String,
        first: String,
        second: String,
    },

    #[error("Query {query} was expected to match exactly one declaration, found {found}")]
    QueryMismatch { query: String, found: usize },

    #[error("{0} unresolved dependencies reported in strict mode")]
    UnresolvedDependencies(usize),

    #[error("File system error: {0}")]
    FileSystem(String),
}

pub type Result<T> = std::result::Result<T, BindsworthError>;
