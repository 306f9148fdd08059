//! Just-in-time selector resolution. Invoked only after a direct locate
//! attempt has timed out; tries graph-known corrections first, page
//! structure second, and reasoning-assisted discovery over a pruned DOM
//! snapshot last. Successful resolutions are recorded for reuse - the
//! system's only learning mechanism, deliberately synchronous and
//! file-based.

use scraper::{Html, Selector};
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn};
use wayfarer_core::model::{Node, SelectorCorrection};
use wayfarer_core::reasoning::{ReasoningService, extract_json};
use wayfarer_crawler::browser::BrowserSurface;

/// Reply sentinel accepted from the reasoning service when nothing fits.
const NOT_FOUND: &str = "NOT_FOUND";

/// Pruned DOM snapshots are capped so stage-two prompts stay bounded.
const SNAPSHOT_CAP: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionIntent {
    Click,
    Fill,
    WaitVisible,
    ReadText,
}

impl fmt::Display for ActionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionIntent::Click => "click",
            ActionIntent::Fill => "fill",
            ActionIntent::WaitVisible => "wait_visible",
            ActionIntent::ReadText => "read_text",
        };
        write!(f, "{}", name)
    }
}

/// Outcome of the chain: a replacement locator, or confirmation that the
/// intent is already satisfied without one (URL-level check).
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Selector(String),
    Confirmed,
}

pub struct SelectorResolver<'a> {
    browser: &'a dyn BrowserSurface,
    reasoning: &'a dyn ReasoningService,
    corrections: Vec<SelectorCorrection>,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(browser: &'a dyn BrowserSurface, reasoning: &'a dyn ReasoningService) -> Self {
        Self {
            browser,
            reasoning,
            corrections: Vec::new(),
        }
    }

    /// Corrections recorded this run, for write-back into the graph and
    /// mission artifacts.
    pub fn take_corrections(&mut self) -> Vec<SelectorCorrection> {
        std::mem::take(&mut self.corrections)
    }

    pub async fn resolve(
        &mut self,
        failed_selector: &str,
        description: &str,
        intent: ActionIntent,
        node: Option<&Node>,
    ) -> Option<Resolution> {
        // 1. Known correction from the persisted graph.
        if let Some(node) = node
            && let Some(corrected) = known_correction(node, failed_selector)
        {
            info!(
                failed = %failed_selector,
                corrected = %corrected,
                "resolved via recorded correction"
            );
            return Some(Resolution::Selector(corrected));
        }

        // 2. Structural fallback, for visibility waits only.
        if intent == ActionIntent::WaitVisible
            && let Some(node) = node
            && let Some(resolution) = self.structural_fallback(failed_selector, node).await
        {
            return Some(resolution);
        }

        // 3. Reasoning-assisted discovery over a pruned snapshot.
        self.assisted_discovery(failed_selector, description, intent, node)
            .await
    }

    /// Try the page's actual headers against the node's stable text, then
    /// current-URL-equals-target as a last resort before escalating.
    async fn structural_fallback(&mut self, failed: &str, node: &Node) -> Option<Resolution> {
        let label = node.display_label.to_lowercase();
        for header_selector in ["h1", "h2", "h3"] {
            if let Ok(Some(text)) = self.browser.text_of(header_selector).await
                && !label.is_empty()
                && text.to_lowercase().contains(&label)
            {
                debug!(selector = header_selector, "structural fallback matched header");
                self.record(failed, header_selector, "wait_visible", node);
                return Some(Resolution::Selector(header_selector.to_string()));
            }
        }

        if let Ok(current) = self.browser.current_url().await {
            let path = url::Url::parse(&current)
                .map(|u| u.path().to_string())
                .unwrap_or(current);
            if path == node.url || wayfarer_core::routes::matches_template(&path, &node.url) {
                debug!(node = %node.id, "structural fallback confirmed by current url");
                return Some(Resolution::Confirmed);
            }
        }
        None
    }

    /// Two stages to bound prompt size: ask which tags/attributes/keywords
    /// matter, prune the DOM to matching elements client-side, then ask for
    /// the single best selector from that snapshot.
    async fn assisted_discovery(
        &mut self,
        failed: &str,
        description: &str,
        intent: ActionIntent,
        node: Option<&Node>,
    ) -> Option<Resolution> {
        let hints = match self.reasoning.invoke(&hint_prompt(description, intent, node)).await {
            Ok(reply) => parse_hints(&reply)?,
            Err(e) => {
                warn!(error = %e, "reasoning unavailable for selector discovery");
                return None;
            }
        };

        let html = self.browser.page_html().await.ok()?;
        let snapshot = prune_dom(&html, &hints, SNAPSHOT_CAP);
        if snapshot.is_empty() {
            debug!("pruned snapshot is empty, nothing matches the hints");
            return None;
        }

        let reply = match self
            .reasoning
            .invoke(&selection_prompt(description, intent, &snapshot))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reasoning unavailable for selector selection");
                return None;
            }
        };
        let candidate = parse_selector_reply(&reply)?;

        if Selector::parse(&candidate).is_err() {
            warn!(candidate = %candidate, "reasoning proposed an unparsable selector");
            return None;
        }
        match self.browser.is_visible(&candidate).await {
            Ok(true) => {
                info!(failed = %failed, corrected = %candidate, "selector resolved via discovery");
                if let Some(node) = node {
                    self.record(failed, &candidate, &intent.to_string(), node);
                } else {
                    self.corrections.push(SelectorCorrection {
                        original_selector: failed.to_string(),
                        corrected_selector: candidate.clone(),
                        action_type: intent.to_string(),
                        node_id: None,
                        component_role: None,
                        timestamp: chrono::Utc::now().timestamp_millis(),
                    });
                }
                Some(Resolution::Selector(candidate))
            }
            _ => {
                debug!(candidate = %candidate, "proposed selector not present on page");
                None
            }
        }
    }

    fn record(&mut self, original: &str, corrected: &str, action: &str, node: &Node) {
        let role = node
            .components
            .iter()
            .find(|c| c.selector == original)
            .map(|c| c.role.clone());
        self.corrections.push(SelectorCorrection {
            original_selector: original.to_string(),
            corrected_selector: corrected.to_string(),
            action_type: action.to_string(),
            node_id: Some(node.id.clone()),
            component_role: role,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
    }
}

fn known_correction(node: &Node, failed: &str) -> Option<String> {
    for component in &node.components {
        if let Some(corrected) = component.previous_selectors.get(failed) {
            return Some(corrected.clone());
        }
    }
    None
}

#[derive(Debug, Default)]
struct DiscoveryHints {
    tags: Vec<String>,
    attributes: Vec<String>,
    keywords: Vec<String>,
}

fn hint_prompt(description: &str, intent: ActionIntent, node: Option<&Node>) -> String {
    let mut context = String::new();
    if let Some(node) = node {
        let known: Vec<String> = node
            .components
            .iter()
            .filter(|c| {
                let desc = description.to_lowercase();
                c.role
                    .split('_')
                    .any(|word| word.len() >= 3 && desc.contains(word))
            })
            .map(|c| format!("{} ({})", c.selector, c.role))
            .take(8)
            .collect();
        if !known.is_empty() {
            context = format!("\nKnown selectors on this page:\n{}", known.join("\n"));
        }
    }
    format!(
        "A {} action needs an element described as: {}.{}\n\
         Which DOM shapes are likely relevant? Reply with JSON only: \
         {{\"tags\": [...], \"attributes\": [...], \"keywords\": [...]}}",
        intent, description, context
    )
}

fn parse_hints(reply: &str) -> Option<DiscoveryHints> {
    let json = extract_json(reply)?;
    let list = |key: &str| -> Vec<String> {
        json.get(key)
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_lowercase())
                    .collect()
            })
            .unwrap_or_default()
    };
    let hints = DiscoveryHints {
        tags: list("tags"),
        attributes: list("attributes"),
        keywords: list("keywords"),
    };
    if hints.tags.is_empty() && hints.attributes.is_empty() && hints.keywords.is_empty() {
        None
    } else {
        Some(hints)
    }
}

fn selection_prompt(description: &str, intent: ActionIntent, snapshot: &str) -> String {
    format!(
        "Pick the single best CSS selector for a {} action on: {}.\n\
         Prefer stable attributes (id, data-testid, aria-label, name) over \
         text matches. Reply with JSON only: {{\"selector\": \"...\"}} or \
         {{\"selector\": \"{}\"}} if nothing matches.\n\nElements:\n{}",
        intent, description, NOT_FOUND, snapshot
    )
}

fn parse_selector_reply(reply: &str) -> Option<String> {
    let candidate = match extract_json(reply) {
        Some(json) => json.get("selector")?.as_str()?.to_string(),
        None => reply.trim().to_string(),
    };
    if candidate.is_empty() || candidate == NOT_FOUND {
        return None;
    }
    Some(candidate)
}

/// Render only the elements matching the hints, one line each, capped in
/// total size.
fn prune_dom(html: &str, hints: &DiscoveryHints, cap: usize) -> String {
    let doc = Html::parse_document(html);
    let Ok(all) = Selector::parse("*") else {
        return String::new();
    };

    let mut out = String::new();
    for el in doc.select(&all) {
        let tag = el.value().name().to_lowercase();
        if matches!(tag.as_str(), "html" | "head" | "body" | "script" | "style") {
            continue;
        }

        let text: String = el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let tag_hit = hints.tags.iter().any(|t| *t == tag);
        let attr_hit = el
            .value()
            .attrs()
            .any(|(name, value)| {
                let name = name.to_lowercase();
                let value = value.to_lowercase();
                hints.attributes.iter().any(|a| name == *a)
                    || hints.keywords.iter().any(|k| value.contains(k))
            });
        let text_hit = {
            let lower = text.to_lowercase();
            !lower.is_empty() && hints.keywords.iter().any(|k| lower.contains(k))
        };
        if !(tag_hit || attr_hit || text_hit) {
            continue;
        }

        let attrs: Vec<String> = el
            .value()
            .attrs()
            .filter(|(name, _)| {
                matches!(
                    *name,
                    "id" | "class" | "name" | "type" | "data-testid" | "aria-label" | "href"
                )
            })
            .map(|(name, value)| format!("{}=\"{}\"", name, value))
            .collect();
        let line = format!(
            "<{} {}>{}</{}>\n",
            tag,
            attrs.join(" "),
            text.chars().take(60).collect::<String>(),
            tag
        );
        if out.len() + line.len() > cap {
            break;
        }
        out.push_str(&line);
    }
    out
}
