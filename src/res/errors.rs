use failure::Fail;

/// The failures a single load could stop with. All of them are retryable in place.
#[derive(Debug, Fail, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadError {
    /// The underlying bundle file is missing. Retry after re-provisioning it.
    #[fail(display = "source bundle not found")]
    SourceNotFound,
    /// The bundle was opened but does not contain the named asset, which usually
    /// means the descriptor index is corrupt.
    #[fail(display = "asset not contained in its bundle")]
    ContentNotContained,
    /// The fetch succeeded but yielded an empty result.
    #[fail(display = "asset is null")]
    ContentIsNull,
}

#[derive(Debug, Fail)]
pub enum StorageError {
    #[fail(display = "Bundle {} could not be found.", _0)]
    NotFound(String),
    #[fail(display = "{}", _0)]
    Io(::std::io::Error),
    #[fail(display = "{}", _0)]
    Bincode(::bincode::Error),
    #[fail(display = "{}", _0)]
    Malformed(String),
}

impl From<::std::io::Error> for StorageError {
    fn from(err: ::std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl From<::bincode::Error> for StorageError {
    fn from(err: ::bincode::Error) -> Self {
        StorageError::Bincode(err)
    }
}
