//! Error types for xmldesk.

use thiserror::Error;

/// Boxed database error carried by [`DeskError::QueryExecution`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for xmldesk operations.
#[derive(Debug, Error)]
pub enum DeskError {
    /// The document is not well-formed XML.
    #[error("Malformed document: {0}")]
    MalformedDocument(#[from] roxmltree::Error),

    /// No APP element in the document.
    #[error("Missing root: no APP element found")]
    MissingRoot,

    /// A field tag that is not allowed where a specific field is mandatory.
    #[error("Unsupported field kind '{kind}' in {scope}")]
    UnsupportedFieldKind { kind: String, scope: &'static str },

    /// A TILE without its aggregate TEXTFIELD.
    #[error("Tile '{tile}' has no aggregate TEXTFIELD")]
    MissingAggregate { tile: String },

    /// A structural invariant of the descriptor does not hold.
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// ACTION with an unknown function or phase.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Menus or grids nested deeper than the parser accepts.
    #[error("Nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },

    /// A compiled query failed to run.
    #[error("Query failed: {source} (sql: {sql})")]
    QueryExecution {
        sql: String,
        #[source]
        source: BoxError,
    },

    /// A textdate cell that does not hold a date.
    #[error("Cannot format '{value}' as a date in field '{field}'")]
    DateFormat { field: String, value: String },

    /// Table or column not present in the introspected schema.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeskError {
    /// Wrap a database error together with the SQL that produced it.
    pub fn query(sql: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::QueryExecution {
            sql: sql.into(),
            source: source.into(),
        }
    }

    /// Create an unsupported field kind error.
    pub fn unsupported(kind: impl Into<String>, scope: &'static str) -> Self {
        Self::UnsupportedFieldKind {
            kind: kind.into(),
            scope,
        }
    }
}

/// Result type alias for xmldesk operations.
pub type DeskResult<T> = Result<T, DeskError>;
