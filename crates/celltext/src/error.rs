//! Errors raised by the codec.

/// Error that can occur while converting between notebooks and text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A format option, or a combination of options, that cannot be honoured.
    #[error("invalid format option '{option}': {message}")]
    Config {
        option: &'static str,
        message: String,
    },

    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    #[error("no text format is registered for extension '{0}'")]
    UnknownExtension(String),

    #[error("invalid cell metadata: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid notebook header: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Cell markers that do not form a usable pattern.
    #[error("invalid cell marker pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A reader returned without consuming any line.
    #[error("cell reader made no progress at line {line}")]
    Blocked { line: usize },
}

impl Error {
    pub(crate) fn config(option: &'static str, message: impl Into<String>) -> Self {
        Error::Config {
            option,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
