pub mod browser;
pub mod crawler;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod heuristics;
pub mod labeler;
pub mod scripted;

pub use browser::{BrowserSurface, CallLog, SharedCallLog};
pub use crawler::{CrawlConfig, DiscoveryCrawler, ProgressCallback};
pub use error::CrawlError;
pub use fetch::FetchBrowser;
pub use scripted::ScriptedBrowser;
