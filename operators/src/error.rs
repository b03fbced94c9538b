use serde::{Deserialize, Serialize};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{}{}", location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default(), message))]
    Parse {
        message: String,
        location: Option<String>,
    },

    #[snafu(display("Unsupported coordinate reference system: {}", crs))]
    UnsupportedCrs {
        crs: String,
    },

    #[snafu(display("Unsupported content type: {}", content_type))]
    UnsupportedContentType {
        content_type: String,
    },

    #[snafu(display("IO error: {}", source))]
    Io {
        source: std::io::Error,
    },

    #[snafu(display("Archive error: {}", source))]
    Archive {
        source: zip::result::ZipError,
    },

    #[snafu(display("Scratch store is in the wrong state: {}", details))]
    ScratchStoreState {
        details: String,
    },

    #[snafu(display("Could not (de)serialize a layer row: {}", source))]
    RowSerialization {
        source: serde_json::Error,
    },

    #[snafu(display("Decoder worker failed: {}", reason))]
    WorkerThread {
        reason: String,
    },

    #[snafu(display("Invalid configuration: {}", source))]
    Config {
        source: config::ConfigError,
    },

    #[snafu(display("DataTypeError: {}", source))]
    DataType {
        source: geoingest_datatypes::error::Error,
    },
}

impl Error {
    /// The HTTP status a caller should answer with
    pub fn status(&self) -> u16 {
        match self {
            Error::Parse { .. } | Error::UnsupportedCrs { .. } | Error::Archive { .. } => 400,
            Error::UnsupportedContentType { .. } => 415,
            Error::Io { .. }
            | Error::ScratchStoreState { .. }
            | Error::RowSerialization { .. }
            | Error::WorkerThread { .. }
            | Error::Config { .. }
            | Error::DataType { .. } => 500,
        }
    }

    /// A machine readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Parse { .. } => "ParseError",
            Error::UnsupportedCrs { .. } => "UnsupportedCRS",
            Error::UnsupportedContentType { .. } => "UnsupportedContentType",
            Error::Io { .. } | Error::ScratchStoreState { .. } | Error::RowSerialization { .. } => {
                "IOError"
            }
            Error::Archive { .. } => "ArchiveError",
            Error::Config { .. } => "ConfigError",
            Error::WorkerThread { .. } | Error::DataType { .. } => "InternalError",
        }
    }

    pub fn parse(message: impl Into<String>, location: Option<String>) -> Self {
        Error::Parse {
            message: message.into(),
            location,
        }
    }
}

impl From<geoingest_datatypes::error::Error> for Error {
    fn from(datatype_error: geoingest_datatypes::error::Error) -> Self {
        match datatype_error {
            geoingest_datatypes::error::Error::UnsupportedCrs { crs } => {
                Self::UnsupportedCrs { crs }
            }
            geoingest_datatypes::error::Error::InvalidGeometry { details } => Self::Parse {
                message: details,
                location: None,
            },
            reprojection @ geoingest_datatypes::error::Error::Reprojection { .. } => Self::Parse {
                message: reprojection.to_string(),
                location: None,
            },
            datatype_error => Self::DataType {
                source: datatype_error,
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(io_error: std::io::Error) -> Self {
        Self::Io { source: io_error }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(source: zip::result::ZipError) -> Self {
        Self::Archive { source }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(source: tokio::task::JoinError) -> Self {
        Self::WorkerThread {
            reason: source.to_string(),
        }
    }
}

/// The serializable form of an [`Error`] handed to callers
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        Self {
            status: error.status(),
            error: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}
