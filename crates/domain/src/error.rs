use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Tag not mapped: {0}")]
    NotMapped(String),

    #[error("Value out of range: {0}")]
    Range(String),

    #[error("Component not running: {0}")]
    NotRunning(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tag is read-only: {0}")]
    ReadOnly(String),

    #[error("Value unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
