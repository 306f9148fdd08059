// Discovery crawler: drives the browser page-by-page and grows the
// semantic graph, skipping URLs already merged into a known template.

use crate::browser::{BrowserSurface, drain_network, now_ms};
use crate::error::{CrawlError, Result};
use crate::extract::{AnchorInfo, extract_page};
use crate::heuristics::{
    infer_primary_entity, method_matches_kind, placeholder_value, suggests_form_opener,
    suggests_reveal,
};
use crate::labeler::label_page;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;
use wayfarer_core::model::{CapturedCall, Component, ComponentKind, Edge, Node, PageGraph};
use wayfarer_core::reasoning::ReasoningService;
use wayfarer_core::routes::{merge_graph, normalize_api_call, parameterize_path};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_depth: usize,
    pub settle_timeout: Duration,
    /// Whether discovery may submit synthesized form data to the target.
    pub allow_side_effects: bool,
    /// Whether to click reveal-style buttons to find dynamic links.
    pub probe_dynamic_links: bool,
    pub max_pages: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            settle_timeout: Duration::from_secs(10),
            allow_side_effects: false,
            probe_dynamic_links: true,
            max_pages: 200,
        }
    }
}

/// All mutable crawl state lives here, owned by one crawl invocation.
struct CrawlSession {
    origin: Url,
    /// Visited concrete path -> node id.
    visited: HashMap<String, String>,
    /// Merged template url -> node id.
    templates: HashMap<String, String>,
    used_ids: HashSet<String>,
    graph: PageGraph,
    session_id: String,
}

#[derive(Debug, Clone)]
struct ParentLink {
    node_id: String,
    selector: String,
    text: String,
    href: String,
}

#[derive(Debug, Clone)]
struct PendingLink {
    url: String,
    depth: usize,
    parent: Option<ParentLink>,
}

pub struct DiscoveryCrawler {
    browser: Arc<dyn BrowserSurface>,
    reasoning: Arc<dyn ReasoningService>,
    config: CrawlConfig,
    progress_callback: Option<ProgressCallback>,
}

impl DiscoveryCrawler {
    pub fn new(browser: Arc<dyn BrowserSurface>, reasoning: Arc<dyn ReasoningService>) -> Self {
        Self {
            browser,
            reasoning,
            config: CrawlConfig::default(),
            progress_callback: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.config.max_depth = depth;
        self
    }

    pub fn with_settle_timeout(mut self, timeout: Duration) -> Self {
        self.config.settle_timeout = timeout;
        self
    }

    pub fn with_side_effects(mut self, allow: bool) -> Self {
        self.config.allow_side_effects = allow;
        self
    }

    pub fn with_probe_dynamic_links(mut self, probe: bool) -> Self {
        self.config.probe_dynamic_links = probe;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.config.max_pages = max_pages;
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Crawl from `start_url`, depth-first over newly found links, and
    /// return the deduplicated semantic graph.
    pub async fn crawl(&self, start_url: &str) -> Result<PageGraph> {
        let origin =
            Url::parse(start_url).map_err(|e| CrawlError::InvalidUrl(e.to_string()))?;
        let mut session = CrawlSession {
            origin,
            visited: HashMap::new(),
            templates: HashMap::new(),
            used_ids: HashSet::new(),
            graph: PageGraph::default(),
            session_id: Uuid::new_v4().to_string(),
        };
        info!(session = %session.session_id, url = %start_url, "starting discovery crawl");

        let mut stack = vec![PendingLink {
            url: start_url.to_string(),
            depth: 0,
            parent: None,
        }];

        while let Some(item) = stack.pop() {
            if session.graph.nodes.len() >= self.config.max_pages {
                warn!(max_pages = self.config.max_pages, "page limit reached, stopping");
                break;
            }

            let path = path_of(&item.url);

            // Template skip: another id of an already-merged shape.
            let parameterized = parameterize_path(&path);
            if parameterized.changed
                && let Some(node_id) = session.templates.get(&parameterized.template)
            {
                debug!(
                    path = %path,
                    template = %parameterized.template,
                    "skipping, matches known template"
                );
                let node_id = node_id.clone();
                if let Some(parent) = item.parent {
                    add_edge(&mut session.graph, &parent, &node_id);
                }
                continue;
            }

            if let Some(node_id) = session.visited.get(&path) {
                let node_id = node_id.clone();
                if let Some(parent) = item.parent {
                    add_edge(&mut session.graph, &parent, &node_id);
                }
                continue;
            }

            if item.depth >= self.config.max_depth {
                continue;
            }

            match self.visit_page(&mut session, &item).await {
                Ok((node_id, children)) => {
                    if let Some(ref callback) = self.progress_callback {
                        callback(session.visited.len(), item.url.clone());
                    }
                    for child in children {
                        stack.push(PendingLink {
                            url: child.absolute_url,
                            depth: item.depth + 1,
                            parent: Some(ParentLink {
                                node_id: node_id.clone(),
                                selector: child.selector,
                                text: child.text,
                                href: child.href,
                            }),
                        });
                    }
                }
                Err(e) => {
                    warn!(url = %item.url, error = %e, "failed to visit page");
                }
            }
        }

        // Safety net for instances that were queued before their template
        // registered.
        merge_graph(&mut session.graph);
        session.graph.validate()?;
        info!(
            nodes = session.graph.nodes.len(),
            edges = session.graph.edges.len(),
            "discovery crawl complete"
        );
        Ok(session.graph)
    }

    async fn visit_page(
        &self,
        session: &mut CrawlSession,
        item: &PendingLink,
    ) -> Result<(String, Vec<ChildLink>)> {
        let path = path_of(&item.url);
        debug!(url = %item.url, depth = item.depth, "visiting");

        let window_start = now_ms();
        self.browser.goto(&item.url).await?;
        let log = self.browser.call_log();
        drain_network(&log, window_start, self.config.settle_timeout).await;

        let html = self.browser.page_html().await?;
        let extracted = extract_page(&html);

        let window_calls = log.calls_since(window_start);
        let active_apis = request_list(&window_calls);

        let label = label_page(self.reasoning.as_ref(), &path, &extracted).await;
        let node_id = unique_id(&mut session.used_ids, &label.slug);

        let mut components = extracted.components;
        attribute_apis(&mut components, &window_calls);

        let mut children = collect_child_links(&session.origin, &item.url, &extracted.anchors);

        if self.config.probe_dynamic_links || self.config.allow_side_effects {
            self.probe_buttons(
                &item.url,
                &extracted.anchors,
                &mut components,
                &mut children,
            )
            .await;
        }

        let parameterized = parameterize_path(&path);
        let mut node = Node::new(node_id.clone(), path.clone(), label.label);
        if parameterized.changed {
            node.url = parameterized.template.clone();
            node.is_template = true;
            node.parameter_name = parameterized.parameter;
            session
                .templates
                .insert(parameterized.template, node_id.clone());
        }
        node.description = label.description;
        node.primary_entity = infer_primary_entity(&active_apis, &path);
        node.active_apis = active_apis;
        node.components = components;

        session.graph.nodes.push(node);
        session.visited.insert(path, node_id.clone());

        if let Some(ref parent) = item.parent {
            add_edge(&mut session.graph, parent, &node_id);
        }

        Ok((node_id, children))
    }

    /// Click buttons that look like they reveal navigation or open a form.
    /// New anchor targets are queued; with side effects allowed, a revealed
    /// form is filled with placeholder values and submitted so the
    /// resulting request attaches to both components.
    async fn probe_buttons(
        &self,
        page_url: &str,
        anchors_before: &[AnchorInfo],
        components: &mut Vec<Component>,
        children: &mut Vec<ChildLink>,
    ) {
        let known_forms: HashSet<String> = components
            .iter()
            .filter(|c| c.kind == ComponentKind::Form)
            .map(|c| c.selector.clone())
            .collect();

        let buttons: Vec<(String, String)> = components
            .iter()
            .filter(|c| c.kind == ComponentKind::Button)
            .map(|c| (c.selector.clone(), c.role.replace('_', " ")))
            .collect();

        let origin = match Url::parse(page_url) {
            Ok(u) => u,
            Err(_) => return,
        };

        for (selector, role_text) in buttons {
            let opener = suggests_form_opener(&role_text);
            let reveal = suggests_reveal(&role_text);
            let probe_for_links = self.config.probe_dynamic_links && (reveal || opener);
            let probe_for_form = self.config.allow_side_effects && opener;
            if !probe_for_links && !probe_for_form {
                continue;
            }

            let click_window = now_ms();
            if let Err(e) = self.browser.click(&selector).await {
                debug!(selector = %selector, error = %e, "probe click failed");
                continue;
            }
            let log = self.browser.call_log();
            drain_network(&log, click_window, Duration::from_secs(2)).await;

            let Ok(html_after) = self.browser.page_html().await else {
                continue;
            };
            let after = extract_page(&html_after);

            for anchor in crate::extract::diff_new_anchors(anchors_before, &after.anchors) {
                if let Some(child) = child_link(&origin, &anchor) {
                    debug!(href = %anchor.href, "dynamic link revealed by click");
                    children.push(child);
                }
            }

            if probe_for_form
                && let Some(form) = after
                    .components
                    .iter()
                    .find(|c| c.kind == ComponentKind::Form && !known_forms.contains(&c.selector))
            {
                let mut form = form.clone();
                self.fill_and_submit(&selector, &mut form, components).await;
                components.push(form);
            }

            // Reset any navigation the probe caused.
            if let Ok(current) = self.browser.current_url().await
                && path_of(&current) != path_of(page_url)
            {
                let _ = self.browser.goto(page_url).await;
            }
        }
    }

    async fn fill_and_submit(
        &self,
        button_selector: &str,
        form: &mut Component,
        components: &mut [Component],
    ) {
        for field in &form.fields {
            let value = placeholder_value(field);
            if let Err(e) = self.browser.fill(&field.selector, &value).await {
                debug!(selector = %field.selector, error = %e, "could not fill field");
            }
        }

        let submit_selector = format!("{} [type='submit']", form.selector);
        let submit_window = now_ms();
        if let Err(e) = self.browser.click(&submit_selector).await {
            debug!(selector = %submit_selector, error = %e, "speculative submit failed");
            return;
        }
        let log = self.browser.call_log();
        drain_network(&log, submit_window, Duration::from_secs(2)).await;

        let writes: Vec<String> = log
            .calls_since(submit_window)
            .iter()
            .filter(|c| {
                c.direction == wayfarer_core::model::CallDirection::Request
                    && method_matches_kind(ComponentKind::Form, &c.method)
            })
            .map(|c| normalize_api_call(&format!("{} {}", c.method, path_of(&c.url))))
            .collect();

        for api in writes {
            if !form.triggers_api.contains(&api) {
                form.triggers_api.push(api.clone());
            }
            if let Some(button) = components
                .iter_mut()
                .find(|c| c.selector == button_selector)
                && !button.triggers_api.contains(&api)
            {
                button.triggers_api.push(api);
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ChildLink {
    absolute_url: String,
    href: String,
    selector: String,
    text: String,
}

fn path_of(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        return parsed.path().to_string();
    }
    url.split(['?', '#']).next().unwrap_or(url).to_string()
}

fn child_link(base: &Url, anchor: &AnchorInfo) -> Option<ChildLink> {
    let href = anchor.href.trim();
    if href.is_empty()
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with('#')
    {
        return None;
    }
    let mut resolved = base.join(href).ok()?;
    resolved.set_fragment(None);
    // Same-origin only
    if resolved.host_str() != base.host_str() || resolved.port() != base.port() {
        return None;
    }
    Some(ChildLink {
        absolute_url: resolved.to_string(),
        href: href.to_string(),
        selector: format!("a[href='{}']", href),
        text: anchor.text.clone(),
    })
}

fn collect_child_links(origin: &Url, page_url: &str, anchors: &[AnchorInfo]) -> Vec<ChildLink> {
    let base = Url::parse(page_url).unwrap_or_else(|_| origin.clone());
    let mut seen = HashSet::new();
    anchors
        .iter()
        .filter_map(|a| child_link(&base, a))
        .filter(|c| seen.insert(c.absolute_url.clone()))
        .collect()
}

fn request_list(calls: &[CapturedCall]) -> Vec<String> {
    let mut seen = HashSet::new();
    calls
        .iter()
        .filter(|c| c.direction == wayfarer_core::model::CallDirection::Request)
        .map(|c| normalize_api_call(&format!("{} {}", c.method, path_of(&c.url))))
        .filter(|api| seen.insert(api.clone()))
        .collect()
}

fn attribute_apis(components: &mut [Component], calls: &[CapturedCall]) {
    let requests: Vec<(String, String)> = calls
        .iter()
        .filter(|c| c.direction == wayfarer_core::model::CallDirection::Request)
        .map(|c| {
            (
                c.method.clone(),
                normalize_api_call(&format!("{} {}", c.method, path_of(&c.url))),
            )
        })
        .collect();

    for component in components.iter_mut() {
        if component.kind == ComponentKind::TableColumn {
            continue;
        }
        for (method, api) in &requests {
            if method_matches_kind(component.kind, method)
                && !component.triggers_api.contains(api)
            {
                component.triggers_api.push(api.clone());
            }
        }
    }
}

fn unique_id(used: &mut HashSet<String>, slug: &str) -> String {
    if used.insert(slug.to_string()) {
        return slug.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", slug, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn add_edge(graph: &mut PageGraph, parent: &ParentLink, to: &str) {
    if parent.node_id == to {
        return;
    }
    if graph
        .edges
        .iter()
        .any(|e| e.from == parent.node_id && e.to == to && e.selector == parent.selector)
    {
        return;
    }
    let description = if parent.text.is_empty() {
        format!("navigate to {}", to)
    } else {
        format!("click '{}'", parent.text)
    };
    graph.edges.push(Edge {
        from: parent.node_id.clone(),
        to: to.to_string(),
        action: "navigate".to_string(),
        selector: parent.selector.clone(),
        description,
        href: Some(parent.href.clone()),
        external: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_suffixes() {
        let mut used = HashSet::new();
        assert_eq!(unique_id(&mut used, "orders"), "orders");
        assert_eq!(unique_id(&mut used, "orders"), "orders-2");
        assert_eq!(unique_id(&mut used, "orders"), "orders-3");
    }

    #[test]
    fn test_child_link_filters_cross_origin_and_schemes() {
        let base = Url::parse("http://app.local/home").unwrap();
        let mk = |href: &str| AnchorInfo {
            href: href.to_string(),
            text: String::new(),
        };
        assert!(child_link(&base, &mk("/orders")).is_some());
        assert!(child_link(&base, &mk("http://other.host/x")).is_none());
        assert!(child_link(&base, &mk("mailto:a@b.c")).is_none());
        assert!(child_link(&base, &mk("#section")).is_none());
        assert!(child_link(&base, &mk("javascript:void(0)")).is_none());
    }

    #[test]
    fn test_request_list_normalizes_and_dedupes() {
        let calls = vec![
            CapturedCall::request("GET", "http://app.local/api/products/5", 1),
            CapturedCall::request("GET", "http://app.local/api/products/9", 2),
            CapturedCall::response("GET", "http://app.local/api/products/5", 200, None, 3),
        ];
        assert_eq!(request_list(&calls), vec!["GET /api/products/{productId}"]);
    }
}
