pub type Result<T> = std::result::Result<T, BrowserlessError>;

#[derive(Debug, thiserror::Error)]
pub enum BrowserlessError {
    #[error("Browserless API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}
