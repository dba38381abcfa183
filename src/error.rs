use thiserror::Error;

// Errors surfaced by the model endpoint. The engine treats every variant as
// one retryable transport failure.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    Api(String), // Error payload embedded in an otherwise well-formed response.

    #[error("Network response was not ok ({0})")]
    Status(u16),
}

// Errors surfaced by the character store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Illegal patch: {0}")]
    IllegalPatch(String),

    #[error("No item with id: {0}")]
    MissingItem(String),

    #[error("Update error: {0}")]
    Update(String),
}

impl From<String> for StoreError {
    fn from(error: String) -> Self {
        StoreError::Update(error)
    }
}
