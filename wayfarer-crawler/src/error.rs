use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("selector '{0}' not found")]
    SelectorNotFound(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error(transparent)]
    Core(#[from] wayfarer_core::CoreError),
}

pub type Result<T> = std::result::Result<T, CrawlError>;
