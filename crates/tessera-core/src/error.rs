use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier errors
    #[error("Invalid tag format: {0}")]
    InvalidTagFormat(String),

    #[error("Unknown facility: {0}")]
    UnknownFacility(String),

    #[error("Unknown event kind: {0}")]
    UnknownEventKind(String),

    // Session errors
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
