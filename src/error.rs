use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckoutError {
    #[error("Payment provider has not been loaded")]
    ProviderUnavailable,
    #[error("Payment provider error: {0}")]
    Provider(String),
    #[error("Payment session not ready: {0}")]
    SessionNotReady(String),
    #[error("{0}")]
    ValidationIncomplete(String),
    #[error("{0}")]
    ProviderConfirmation(String),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Problem with the cart")]
    CartUnavailable,
    #[error("Invalid checkout event: {0}")]
    InvalidEvent(String),
    #[error("Invalid checkout step index: {0}")]
    InvalidStep(usize),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CheckoutError>;
