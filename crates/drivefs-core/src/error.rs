/// Errors raised by the metadata store and namespace resolver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// No record is reachable at the given path.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// No record is stored under the given id.
    #[error("Unknown record id: {0}")]
    UnknownId(String),

    /// The path cannot be interpreted (e.g. it contains a NUL byte).
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    /// The store has no parentless record to use as the root.
    #[error("No root record: every record has at least one parent")]
    NoRoot,

    /// More than one parentless record and no explicit root id was given.
    #[error("Ambiguous root: {} parentless records ({})", .0.len(), .0.join(", "))]
    MultipleRoots(Vec<String>),

    /// The designated root id is not present in the store.
    #[error("Root record '{0}' is not present in the metadata store")]
    RootNotFound(String),
}

impl CoreError {
    /// Returns true for the "nothing there" family of errors, which callers
    /// report as a plain missing entry rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound(_) | CoreError::UnknownId(_))
    }
}
