use std::io;

/// Engine errors. Anything crossing a component boundary is one of these;
/// nothing panics its way out.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("wire error: {0}")]
    Wire(#[from] relaywire::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(String),

    #[error("geolocation error: {0}")]
    Geo(String),

    #[error("generic error: {0}")]
    Generic(String),
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
