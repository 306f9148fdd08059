// HTTP-backed browser surface for server-rendered applications. Pages are
// fetched statically; anchor clicks navigate, document and JSON requests
// land in the call log. Script-driven surfaces plug in behind the same
// trait via an external adapter.

use crate::browser::{BrowserSurface, CallLog, SharedCallLog, now_ms};
use crate::error::{CrawlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use wayfarer_core::model::CapturedCall;

#[derive(Default)]
struct FetchState {
    current_url: String,
    current_html: String,
}

pub struct FetchBrowser {
    client: Client,
    state: Mutex<FetchState>,
    log: SharedCallLog,
}

impl FetchBrowser {
    pub fn new() -> Result<Self> {
        Self::with_timeout(10)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Wayfarer/0.1 (+https://github.com/wayfarer-dev/wayfarer)")
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(true)
            .build()
            .map_err(|e| CrawlError::Browser(e.to_string()))?;
        Ok(Self {
            client,
            state: Mutex::new(FetchState::default()),
            log: Arc::new(CallLog::new()),
        })
    }

    fn resolve(&self, url: &str) -> Result<Url> {
        let current = self.state.lock().unwrap().current_url.clone();
        if let Ok(base) = Url::parse(&current)
            && let Ok(joined) = base.join(url)
        {
            return Ok(joined);
        }
        Url::parse(url).map_err(|e| CrawlError::InvalidUrl(format!("{}: {}", url, e)))
    }

    fn select_first(&self, selector: &str) -> Result<Option<String>> {
        let parsed = Selector::parse(selector)
            .map_err(|_| CrawlError::InvalidSelector(selector.to_string()))?;
        let html = self.state.lock().unwrap().current_html.clone();
        let doc = Html::parse_document(&html);
        Ok(doc.select(&parsed).next().map(|el| {
            el.text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        }))
    }

    /// The href of the first element matching `selector`, when it is an
    /// anchor-like element.
    fn href_of(&self, selector: &str) -> Result<Option<String>> {
        let parsed = Selector::parse(selector)
            .map_err(|_| CrawlError::InvalidSelector(selector.to_string()))?;
        let html = self.state.lock().unwrap().current_html.clone();
        let doc = Html::parse_document(&html);
        Ok(doc
            .select(&parsed)
            .next()
            .and_then(|el| el.value().attr("href").map(|h| h.to_string())))
    }
}

#[async_trait]
impl BrowserSurface for FetchBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        let target = self.resolve(url)?;
        debug!(url = %target, "fetching");
        self.log
            .record(CapturedCall::request("GET", target.as_str(), now_ms()));

        let response = self
            .client
            .get(target.clone())
            .send()
            .await
            .map_err(|e| CrawlError::Navigation(e.to_string()))?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let text = response
            .text()
            .await
            .map_err(|e| CrawlError::Navigation(e.to_string()))?;

        let body = if content_type.contains("application/json") {
            serde_json::from_str(&text).ok()
        } else {
            None
        };
        self.log.record(CapturedCall::response(
            "GET",
            final_url.as_str(),
            status,
            body,
            now_ms(),
        ));

        let mut state = self.state.lock().unwrap();
        state.current_url = final_url;
        state.current_html = text;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_url.clone())
    }

    async fn page_html(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_html.clone())
    }

    async fn wait_visible(&self, selector: &str, _timeout: Duration) -> Result<()> {
        // Static snapshots do not change while waiting.
        match self.select_first(selector)? {
            Some(_) => Ok(()),
            None => Err(CrawlError::Timeout(format!("selector '{}'", selector))),
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.select_first(selector)?.is_some())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        match self.href_of(selector)? {
            Some(href) => self.goto(&href).await,
            None => {
                if self.select_first(selector)?.is_some() {
                    warn!(
                        selector = %selector,
                        "click on non-anchor element has no effect on a static surface"
                    );
                    Ok(())
                } else {
                    Err(CrawlError::SelectorNotFound(selector.to_string()))
                }
            }
        }
    }

    async fn fill(&self, selector: &str, _value: &str) -> Result<()> {
        if self.select_first(selector)?.is_some() {
            Ok(())
        } else {
            Err(CrawlError::SelectorNotFound(selector.to_string()))
        }
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>> {
        self.select_first(selector)
    }

    fn call_log(&self) -> SharedCallLog {
        self.log.clone()
    }
}
