use std::path::PathBuf;

/// Error types for the application
///
/// `Validation` is fatal to a run, `Extraction` is recorded as a warning and
/// `Render` is recorded as an error while the remaining work continues.
#[derive(Debug)]
pub enum Error {
    Validation(String),
    Extraction { file: PathBuf, message: String },
    Render { path: PathBuf, message: String },
    IoError(std::io::Error),
    Config(String),
    SerializationError(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::Extraction { file, message } => {
                write!(f, "Extraction warning {}: {}", file.display(), message)
            }
            Error::Render { path, message } => {
                write!(f, "Render error {}: {}", path.display(), message)
            }
            Error::IoError(e) => write!(f, "IO error: {}", e),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON serialization failed: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML serialization failed: {}", err))
    }
}
