// Executes BFS-found paths edge by edge, with an ordered href fallback
// chain before a navigation step is declared failed.

use crate::error::{Result, RunError};
use std::time::Duration;
use tracing::{debug, info, warn};
use wayfarer_core::graph::GraphIndex;
use wayfarer_core::model::Edge;
use wayfarer_crawler::browser::BrowserSurface;

const EDGE_WAIT: Duration = Duration::from_secs(5);

pub struct Navigator<'a> {
    index: &'a GraphIndex,
    browser: &'a dyn BrowserSurface,
    edge_wait: Duration,
}

/// Pull an `href='...'` fragment out of a CSS selector string.
pub fn href_from_selector(selector: &str) -> Option<String> {
    let start = selector.find("href=")? + 5;
    let rest = &selector[start..];
    let quote = rest.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

impl<'a> Navigator<'a> {
    pub fn new(index: &'a GraphIndex, browser: &'a dyn BrowserSurface) -> Self {
        Self {
            index,
            browser,
            edge_wait: EDGE_WAIT,
        }
    }

    pub fn with_edge_wait(mut self, wait: Duration) -> Self {
        self.edge_wait = wait;
        self
    }

    /// Navigate from `current` (a node id, when known) to `target` (node id
    /// or free-text description). Returns the id of the node arrived at.
    pub async fn navigate_to(&self, current: Option<&str>, target: &str) -> Result<String> {
        let target_node = self
            .index
            .resolve_target(target)
            .ok_or_else(|| RunError::Navigation(format!("unknown target '{}'", target)))?;
        let target_id = target_node.id.clone();
        let target_url = target_node.url.clone();

        let path = current.and_then(|c| self.index.find_path(c, &target_id));

        match path {
            Some(edges) if edges.is_empty() => {
                debug!(target = %target_id, "already at target");
                Ok(target_id)
            }
            Some(edges) => {
                info!(target = %target_id, hops = edges.len(), "following graph path");
                for edge in &edges {
                    self.traverse_edge(edge).await?;
                }
                Ok(target_id)
            }
            None => {
                // No edge path known: fall back to direct URL navigation.
                if target_url.contains('{') {
                    return Err(RunError::Navigation(format!(
                        "no path to '{}' and its url '{}' is a template",
                        target_id, target_url
                    )));
                }
                debug!(target = %target_id, url = %target_url, "no graph path, direct navigation");
                self.browser.goto(&target_url).await?;
                Ok(target_id)
            }
        }
    }

    /// One edge: wait for stability, click the stored selector, then fall
    /// back to href-in-selector, the edge's stored href, and finally the
    /// target node's url - in that order.
    async fn traverse_edge(&self, edge: &Edge) -> Result<()> {
        let clicked = match self.browser.wait_visible(&edge.selector, self.edge_wait).await {
            Ok(()) => match self.browser.click(&edge.selector).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(selector = %edge.selector, error = %e, "edge click failed");
                    false
                }
            },
            Err(e) => {
                warn!(selector = %edge.selector, error = %e, "edge selector not visible");
                false
            }
        };
        if clicked {
            return Ok(());
        }

        let mut fallbacks: Vec<String> = Vec::new();
        if let Some(href) = href_from_selector(&edge.selector) {
            fallbacks.push(href);
        }
        if let Some(ref href) = edge.href {
            fallbacks.push(href.clone());
        }
        if let Some(node) = self.index.node(&edge.to)
            && !node.url.contains('{')
        {
            fallbacks.push(node.url.clone());
        }

        for url in fallbacks {
            debug!(url = %url, "edge fallback navigation");
            if self.browser.goto(&url).await.is_ok() {
                return Ok(());
            }
        }

        Err(RunError::Navigation(format!(
            "could not traverse edge {} -> {}",
            edge.from, edge.to
        )))
    }
}
