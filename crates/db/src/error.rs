use core::fmt::{self, Display};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// Arguments were rejected before reaching the store.
    BadInput,
    /// The table, row, or attribute does not exist.
    NotFound,
    /// The table did not become active within the polling budget.
    NotReady,
    /// A stored row does not follow the expected layout.
    Malformed,
    /// The store failed to serve the request (network, throttling, etc.).
    Unavailable,
    /// Unrecoverable error.
    Fatal,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BadInput => "Unacceptable input.",
            Self::NotFound => "Resource not found.",
            Self::NotReady => "The survey table is not ready yet. Try again later.",
            Self::Malformed => "Encountered a malformed row in the survey table.",
            Self::Unavailable => "The storage service is currently unavailable.",
            Self::Fatal => "Oops! We have encountered an unrecoverable error on our end.",
        })
    }
}

impl std::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;
