use std::fmt;

/// One entry per typed failure the core can surface: IndexError, StoreError,
/// MergeError, SearchError, SuggestError, ExpandError and ValidationError
/// from the spec each become a distinct `ErrorKind`, propagated through a
/// single concrete `Error` type.
#[derive(Debug)]
pub enum ErrorKind {
    Index,
    Store,
    Merge,
    Search,
    Suggest,
    Expand,
    Validation,
    Io,
    Serialize,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error {
            kind,
            context: context.into(),
        }
    }

    pub fn index(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Index, context)
    }

    pub fn store(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Store, context)
    }

    pub fn merge(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Merge, context)
    }

    pub fn search(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Search, context)
    }

    pub fn suggest(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Suggest, context)
    }

    pub fn expand(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Expand, context)
    }

    pub fn validation(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Validation, context)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialize, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Serialize, err.to_string())
    }
}

impl From<fst::Error> for Error {
    fn from(err: fst::Error) -> Self {
        Error::new(ErrorKind::Suggest, format!("fst error: {err}"))
    }
}

impl From<redb::DatabaseError> for Error {
    fn from(err: redb::DatabaseError) -> Self {
        Error::new(ErrorKind::Store, format!("document store: {err}"))
    }
}

impl From<redb::TransactionError> for Error {
    fn from(err: redb::TransactionError) -> Self {
        Error::new(ErrorKind::Store, format!("document store: {err}"))
    }
}

impl From<redb::TableError> for Error {
    fn from(err: redb::TableError) -> Self {
        Error::new(ErrorKind::Store, format!("document store: {err}"))
    }
}

impl From<redb::StorageError> for Error {
    fn from(err: redb::StorageError) -> Self {
        Error::new(ErrorKind::Store, format!("document store: {err}"))
    }
}

impl From<redb::CommitError> for Error {
    fn from(err: redb::CommitError) -> Self {
        Error::new(ErrorKind::Store, format!("document store: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
