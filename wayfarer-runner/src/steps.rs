// The step interpreter: a small, closed vocabulary, not a scripting
// language. A failed assertion records and continues for maximal
// diagnostics; a failed action stops the test case.

use crate::navigate::Navigator;
use crate::selectors::{ActionIntent, Resolution, SelectorResolver};
use crate::verify::{TripleChecker, endpoint_matches};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};
use wayfarer_core::compare::{value_to_text, values_match};
use wayfarer_core::db::Storage;
use wayfarer_core::fields::extract_or_find;
use wayfarer_core::graph::GraphIndex;
use wayfarer_core::model::{CapturedCall, Mission, SelectorCorrection, Step, TestCase, TestScope};
use wayfarer_core::reasoning::ReasoningService;
use wayfarer_core::report::{ScenarioResult, StepRecord};
use wayfarer_crawler::browser::{BrowserSurface, SharedCallLog};

const DEFAULT_LOCATE_TIMEOUT: Duration = Duration::from_secs(8);

enum Located {
    Selector(String),
    Confirmed,
}

pub struct StepEngine<'a> {
    browser: &'a dyn BrowserSurface,
    log: SharedCallLog,
    index: &'a GraphIndex,
    storage: Option<&'a Storage>,
    mission: &'a Mission,
    resolver: SelectorResolver<'a>,
    locate_timeout: Duration,
    current_node: Option<String>,
    captured: HashMap<String, Value>,
}

impl<'a> StepEngine<'a> {
    pub fn new(
        browser: &'a dyn BrowserSurface,
        reasoning: &'a dyn ReasoningService,
        index: &'a GraphIndex,
        storage: Option<&'a Storage>,
        mission: &'a Mission,
    ) -> Self {
        let log = browser.call_log();
        Self {
            browser,
            log,
            index,
            storage,
            mission,
            resolver: SelectorResolver::new(browser, reasoning),
            locate_timeout: DEFAULT_LOCATE_TIMEOUT,
            current_node: None,
            captured: HashMap::new(),
        }
    }

    pub fn with_locate_timeout(mut self, timeout: Duration) -> Self {
        self.locate_timeout = timeout;
        self
    }

    pub fn set_current_node(&mut self, node_id: Option<String>) {
        self.current_node = node_id;
    }

    pub fn current_node(&self) -> Option<&str> {
        self.current_node.as_deref()
    }

    pub fn take_corrections(&mut self) -> Vec<SelectorCorrection> {
        self.resolver.take_corrections()
    }

    /// Execute one test case. Step state (captured values) is scoped to
    /// the case.
    pub async fn run_case(&mut self, case: &TestCase) -> ScenarioResult {
        info!(case = %case.id, steps = case.steps.len(), "running test case");
        self.captured.clear();

        let mut records = Vec::new();
        let mut passed = true;
        for step in &case.steps {
            match self.execute(step).await {
                Ok(detail) => records.push(StepRecord {
                    kind: step.kind_name().to_string(),
                    passed: true,
                    detail,
                }),
                Err(detail) => {
                    passed = false;
                    records.push(StepRecord {
                        kind: step.kind_name().to_string(),
                        passed: false,
                        detail: Some(detail),
                    });
                    if !step.is_assertion() {
                        debug!(case = %case.id, "non-assertion step failed, stopping case");
                        break;
                    }
                }
            }
        }

        ScenarioResult {
            name: if case.name.is_empty() {
                case.id.clone()
            } else {
                case.name.clone()
            },
            passed,
            steps: records,
        }
    }

    async fn execute(&mut self, step: &Step) -> Result<Option<String>, String> {
        debug!(kind = step.kind_name(), "executing step");
        match step {
            Step::Goto { url } => {
                self.browser
                    .goto(url)
                    .await
                    .map_err(|e| format!("goto {}: {}", url, e))?;
                self.current_node = self.index.node_for_url(url).map(|n| n.id.clone());
                Ok(None)
            }
            Step::Click {
                selector,
                description,
            } => {
                let located = self
                    .locate(selector, description.as_deref(), ActionIntent::Click)
                    .await?;
                if let Located::Selector(selector) = located {
                    self.browser
                        .click(&selector)
                        .await
                        .map_err(|e| format!("click {}: {}", selector, e))?;
                }
                Ok(None)
            }
            Step::Fill {
                selector,
                value,
                description,
            } => {
                let located = self
                    .locate(selector, description.as_deref(), ActionIntent::Fill)
                    .await?;
                if let Located::Selector(selector) = located {
                    self.browser
                        .fill(&selector, value)
                        .await
                        .map_err(|e| format!("fill {}: {}", selector, e))?;
                }
                Ok(None)
            }
            Step::WaitVisible {
                selector,
                description,
            } => {
                self.locate(selector, description.as_deref(), ActionIntent::WaitVisible)
                    .await?;
                Ok(None)
            }
            Step::AssertVisible {
                selector,
                description: _,
            } => match self.browser.is_visible(selector).await {
                Ok(true) => Ok(None),
                Ok(false) => Err(format!("'{}' is not visible", selector)),
                Err(e) => Err(format!("visibility check failed: {}", e)),
            },
            Step::AssertNotVisible {
                selector,
                description: _,
            } => match self.browser.is_visible(selector).await {
                Ok(false) => Ok(None),
                Ok(true) => Err(format!("'{}' is unexpectedly visible", selector)),
                Err(e) => Err(format!("visibility check failed: {}", e)),
            },
            Step::AssertText { selector, expected } => {
                let text = self
                    .browser
                    .text_of(selector)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("'{}' not found", selector))?;
                if values_match(&Value::String(expected.clone()), &text) {
                    Ok(Some(text))
                } else {
                    Err(format!("expected '{}', found '{}'", expected, text))
                }
            }
            Step::AssertUrlContains { fragment } => {
                let url = self
                    .browser
                    .current_url()
                    .await
                    .map_err(|e| e.to_string())?;
                if url.contains(fragment.as_str()) {
                    Ok(None)
                } else {
                    Err(format!("url '{}' does not contain '{}'", url, fragment))
                }
            }
            Step::NavigateToPage { target } => {
                let navigator =
                    Navigator::new(self.index, self.browser).with_edge_wait(self.locate_timeout);
                let arrived = navigator
                    .navigate_to(self.current_node.as_deref(), target)
                    .await
                    .map_err(|e| e.to_string())?;
                self.current_node = Some(arrived.clone());
                Ok(Some(format!("arrived at {}", arrived)))
            }
            Step::VerifyApi {
                endpoint,
                expected_status,
                expected_values,
            } => self.verify_api(endpoint, *expected_status, expected_values),
            Step::VerifyApiValueInUi {
                field,
                endpoint,
                ui_selector,
            } => {
                let scope = TestScope {
                    db: false,
                    api: true,
                    ui: true,
                };
                let checker = TripleChecker::new(&*self.log, None, self.browser);
                let outcome = checker
                    .check(
                        field,
                        endpoint.as_deref(),
                        ui_selector.as_deref(),
                        None,
                        &scope,
                        None,
                    )
                    .await;
                if outcome.passed(&scope, false) {
                    Ok(Some(format!("'{}' consistent between API and UI", field)))
                } else {
                    Err(serde_json::to_string(&outcome.section).unwrap_or_default())
                }
            }
            Step::VerifyTripleCheck {
                field,
                endpoint,
                ui_selector,
            } => {
                let checker = TripleChecker::new(&*self.log, self.storage, self.browser);
                let outcome = checker
                    .check(
                        field,
                        endpoint.as_deref(),
                        ui_selector.as_deref(),
                        self.mission.db_verification.as_ref(),
                        &self.mission.test_scope,
                        None,
                    )
                    .await;
                let db_required = self
                    .mission
                    .db_verification
                    .as_ref()
                    .map(|d| d.required)
                    .unwrap_or(false);
                if outcome.passed(&self.mission.test_scope, db_required) {
                    Ok(Some(format!("'{}' consistent across layers", field)))
                } else {
                    Err(serde_json::to_string(&outcome.section).unwrap_or_default())
                }
            }
            Step::AssertApiFieldNotShown { field, endpoint } => {
                self.assert_field_not_shown(field, endpoint.as_deref()).await
            }
            Step::CaptureApi { endpoint, save_as } => {
                let call = self
                    .find_response(Some(endpoint), None)
                    .ok_or_else(|| format!("no captured response for '{}'", endpoint))?;
                let body = call
                    .body
                    .ok_or_else(|| format!("response for '{}' had no body", endpoint))?;
                self.captured.insert(save_as.clone(), body);
                Ok(Some(format!("captured as '{}'", save_as)))
            }
            Step::ExtractApiField {
                field,
                from,
                save_as,
            } => {
                let value = match from {
                    Some(name) => {
                        let source = self
                            .captured
                            .get(name)
                            .ok_or_else(|| format!("nothing captured as '{}'", name))?;
                        extract_or_find(source, field).cloned()
                    }
                    None => self
                        .find_response(None, Some(field))
                        .and_then(|c| c.body)
                        .as_ref()
                        .and_then(|b| extract_or_find(b, field))
                        .cloned(),
                };
                let value = value.ok_or_else(|| format!("field '{}' not found", field))?;
                self.captured.insert(save_as.clone(), value.clone());
                Ok(Some(value_to_text(&value)))
            }
            Step::Login => {
                // Login is a precondition handled by the session gateway,
                // not by this engine.
                Ok(Some("login handled by session gateway".to_string()))
            }
            Step::Manual { description } => Err(format!(
                "manual step requires an external agent{}",
                description
                    .as_ref()
                    .map(|d| format!(": {}", d))
                    .unwrap_or_default()
            )),
        }
    }

    /// Direct wait first; only on timeout does the resolution chain run.
    async fn locate(
        &mut self,
        selector: &str,
        description: Option<&str>,
        intent: ActionIntent,
    ) -> Result<Located, String> {
        if self
            .browser
            .wait_visible(selector, self.locate_timeout)
            .await
            .is_ok()
        {
            return Ok(Located::Selector(selector.to_string()));
        }

        let index = self.index;
        let node = self.current_node.as_deref().and_then(|id| index.node(id));
        let description = description.unwrap_or(selector);
        match self
            .resolver
            .resolve(selector, description, intent, node)
            .await
        {
            Some(Resolution::Selector(corrected)) => {
                let recheck = self.locate_timeout.min(Duration::from_secs(2));
                self.browser
                    .wait_visible(&corrected, recheck)
                    .await
                    .map_err(|e| format!("corrected selector '{}': {}", corrected, e))?;
                Ok(Located::Selector(corrected))
            }
            Some(Resolution::Confirmed) => Ok(Located::Confirmed),
            None => Err(format!("selector '{}' not found after resolution", selector)),
        }
    }

    fn verify_api(
        &self,
        endpoint: &str,
        expected_status: Option<u16>,
        expected_values: &std::collections::BTreeMap<String, Value>,
    ) -> Result<Option<String>, String> {
        let call = self
            .find_response(Some(endpoint), None)
            .ok_or_else(|| format!("no captured response for '{}'", endpoint))?;

        if let Some(expected) = expected_status
            && call.status != Some(expected)
        {
            return Err(format!(
                "status {:?} did not match expected {}",
                call.status, expected
            ));
        }

        let mut mismatches = Vec::new();
        if !expected_values.is_empty() {
            let Some(ref body) = call.body else {
                return Err("response had no body to verify".to_string());
            };
            for (field, expected) in expected_values {
                match extract_or_find(body, field) {
                    Some(found) if values_match(expected, &value_to_text(found)) => {}
                    Some(found) => mismatches.push(format!(
                        "{}: expected {}, found {}",
                        field,
                        expected,
                        value_to_text(found)
                    )),
                    None => mismatches.push(format!("{}: missing", field)),
                }
            }
        }

        if mismatches.is_empty() {
            Ok(Some(format!("{} verified", endpoint)))
        } else {
            Err(mismatches.join("; "))
        }
    }

    /// Three-layer negative check: the field must be absent from the API
    /// response and not visible in the UI, regardless of DB state.
    async fn assert_field_not_shown(
        &self,
        field: &str,
        endpoint: Option<&str>,
    ) -> Result<Option<String>, String> {
        for call in self.log.responses_newest_first() {
            if let Some(endpoint) = endpoint
                && !endpoint_matches(&call.method, &call.url, endpoint)
            {
                continue;
            }
            if let Some(ref body) = call.body
                && extract_or_find(body, field).is_some()
            {
                return Err(format!("field '{}' present in API response {}", field, call.url));
            }
        }

        let html = self
            .browser
            .page_html()
            .await
            .map_err(|e| e.to_string())?
            .to_lowercase();
        let variants = [
            field.to_lowercase(),
            field.to_lowercase().replace('_', " "),
            field.to_lowercase().replace('_', "-"),
        ];
        for variant in &variants {
            if !variant.is_empty() && html.contains(variant.as_str()) {
                return Err(format!("'{}' appears in the rendered page", variant));
            }
        }
        Ok(Some(format!("'{}' absent from API and UI", field)))
    }

    fn find_response(
        &self,
        endpoint: Option<&str>,
        with_field: Option<&str>,
    ) -> Option<CapturedCall> {
        self.log.responses_newest_first().into_iter().find(|call| {
            if let Some(endpoint) = endpoint
                && !endpoint_matches(&call.method, &call.url, endpoint)
            {
                return false;
            }
            match with_field {
                Some(field) => call
                    .body
                    .as_ref()
                    .map(|b| extract_or_find(b, field).is_some())
                    .unwrap_or(false),
                None => true,
            }
        })
    }
}
