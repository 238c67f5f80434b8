use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdkError {
    #[error("Metric '{name}' of kind {kind} cannot hold value {value}")]
    KindMismatch {
        name: String,
        kind: String,
        value: String,
    },

    #[error("No previous sample for '{0}', rate will be available on the next run")]
    NoPreviousSample(String),

    #[error("Counter '{0}' went backwards, assuming a reset")]
    CounterReset(String),

    #[error("No time elapsed since the previous sample of '{0}'")]
    NoElapsedTime(String),

    #[error("Duplicate metric definition: {0}")]
    DuplicateDefinition(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SdkError>;
