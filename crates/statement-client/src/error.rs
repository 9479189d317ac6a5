use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to create HTTP client: {0}")]
    Build(String),
}
