//! Deterministic browser surface for tests and offline development.
//!
//! Pages are registered by path with static HTML; clicks can navigate,
//! rewrite the DOM, and emit network calls into the session log.

use crate::browser::{BrowserSurface, CallLog, SharedCallLog, now_ms};
use crate::error::{CrawlError, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wayfarer_core::model::CapturedCall;

#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: Option<Value>,
}

impl ApiCall {
    pub fn new(method: &str, url: &str, status: u16, body: Option<Value>) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClickEffect {
    pub goto: Option<String>,
    pub replace_html: Option<String>,
    pub calls: Vec<ApiCall>,
}

impl ClickEffect {
    pub fn navigate(url: &str) -> Self {
        Self {
            goto: Some(url.to_string()),
            ..Default::default()
        }
    }

    pub fn reveal(html: &str) -> Self {
        Self {
            replace_html: Some(html.to_string()),
            ..Default::default()
        }
    }

    pub fn with_call(mut self, call: ApiCall) -> Self {
        self.calls.push(call);
        self
    }
}

#[derive(Default)]
struct ScriptedPage {
    html: String,
    on_load: Vec<ApiCall>,
    clicks: HashMap<String, ClickEffect>,
}

#[derive(Default)]
struct ScriptedState {
    pages: HashMap<String, ScriptedPage>,
    current_path: String,
    current_html: String,
    fills: Vec<(String, String)>,
}

pub struct ScriptedBrowser {
    state: Mutex<ScriptedState>,
    log: SharedCallLog,
}

fn path_of(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        return parsed.path().to_string();
    }
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptedState::default()),
            log: Arc::new(CallLog::new()),
        }
    }

    pub fn page(self, path: &str, html: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.pages.entry(path.to_string()).or_default().html = html.to_string();
        }
        self
    }

    /// Register an API call emitted while the page loads.
    pub fn on_load_call(self, path: &str, call: ApiCall) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .pages
                .entry(path.to_string())
                .or_default()
                .on_load
                .push(call);
        }
        self
    }

    pub fn on_click(self, path: &str, selector: &str, effect: ClickEffect) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .pages
                .entry(path.to_string())
                .or_default()
                .clicks
                .insert(selector.to_string(), effect);
        }
        self
    }

    pub fn fills(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().fills.clone()
    }

    fn emit(&self, call: &ApiCall) {
        self.log
            .record(CapturedCall::request(&call.method, &call.url, now_ms()));
        self.log.record(CapturedCall::response(
            &call.method,
            &call.url,
            call.status,
            call.body.clone(),
            now_ms(),
        ));
    }

    fn load_page(&self, path: &str) -> Result<Vec<ApiCall>> {
        let mut state = self.state.lock().unwrap();
        let page = state
            .pages
            .get(path)
            .ok_or_else(|| CrawlError::Navigation(format!("no page scripted at {}", path)))?;
        let html = page.html.clone();
        let calls = page.on_load.clone();
        state.current_path = path.to_string();
        state.current_html = html;
        Ok(calls)
    }

    fn matches(&self, selector: &str) -> Result<bool> {
        let parsed = Selector::parse(selector)
            .map_err(|_| CrawlError::InvalidSelector(selector.to_string()))?;
        let html = self.state.lock().unwrap().current_html.clone();
        let doc = Html::parse_document(&html);
        Ok(doc.select(&parsed).next().is_some())
    }
}

impl Default for ScriptedBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserSurface for ScriptedBrowser {
    async fn goto(&self, url: &str) -> Result<()> {
        let calls = self.load_page(&path_of(url))?;
        for call in &calls {
            self.emit(call);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_path.clone())
    }

    async fn page_html(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().current_html.clone())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.matches(selector)? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CrawlError::Timeout(format!("selector '{}'", selector)));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        self.matches(selector)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let effect = {
            let state = self.state.lock().unwrap();
            state
                .pages
                .get(&state.current_path)
                .and_then(|p| p.clicks.get(selector))
                .cloned()
        };

        match effect {
            Some(effect) => {
                for call in &effect.calls {
                    self.emit(call);
                }
                if let Some(ref html) = effect.replace_html {
                    self.state.lock().unwrap().current_html = html.clone();
                }
                if let Some(ref target) = effect.goto {
                    let calls = self.load_page(&path_of(target))?;
                    for call in &calls {
                        self.emit(call);
                    }
                }
                Ok(())
            }
            None => {
                if self.matches(selector)? {
                    // Clickable but inert in this script
                    Ok(())
                } else {
                    Err(CrawlError::SelectorNotFound(selector.to_string()))
                }
            }
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        if !self.matches(selector)? {
            return Err(CrawlError::SelectorNotFound(selector.to_string()));
        }
        self.state
            .lock()
            .unwrap()
            .fills
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>> {
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

    fn call_log(&self) -> SharedCallLog {
        self.log.clone()
    }
}
