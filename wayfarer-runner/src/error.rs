use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("step failed: {0}")]
    StepFailed(String),

    #[error("manual step requires an external agent")]
    ManualStep,

    #[error(transparent)]
    Crawl(#[from] wayfarer_crawler::error::CrawlError),

    #[error(transparent)]
    Core(#[from] wayfarer_core::CoreError),
}

pub type Result<T> = std::result::Result<T, RunError>;
