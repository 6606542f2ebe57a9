use std::fmt::Display;

/// The kind of model object a lookup or reference was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    SpaceSystem,
    Parameter,
    Argument,
    Type,
    Container,
    MetaCommand,
    Stream,
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SpaceSystem => "space system",
            Self::Parameter => "parameter",
            Self::Argument => "argument",
            Self::Type => "type",
            Self::Container => "container",
            Self::MetaCommand => "meta command",
            Self::Stream => "stream",
        };
        f.write_str(s)
    }
}

/// Structural errors.
///
/// These abort the requested operation. Data quality problems found while decoding or
/// encoding are reported as warnings instead, see [crate::Outcome].
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("{kind} not found: {query}")]
    NotFound { kind: ObjectKind, query: String },

    #[error("{kind} query '{query}' is ambiguous, matches {matches:?}")]
    Ambiguous {
        kind: ObjectKind,
        query: String,
        matches: Vec<String>,
    },

    #[error("{from} references unresolved {kind} '{reference}'")]
    UnresolvedReference {
        from: String,
        kind: ObjectKind,
        reference: String,
    },

    /// Item has no usable raw encoding definition.
    #[error("item {item} has no valid raw encoding")]
    NoEncoding { item: String },

    #[error("inheritance cycle detected at {0}")]
    InheritanceCycle(String),

    #[error("container {0} includes itself")]
    RecursiveContainer(String),

    #[error("no compatible container found in stream {stream}")]
    NoCompatibleContainer { stream: String },

    #[error("invalid model: {0}")]
    Model(String),

    #[error("Invalid timecode config: {0}")]
    TimecodeConfig(String),

    #[error("Not enough bytes")]
    NotEnoughData { actual: usize, minimum: usize },

    #[error("Overflow")]
    Overflow,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
