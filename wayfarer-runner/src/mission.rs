// Mission orchestration: persona login, navigation, test cases, and the
// final triple-check round, assembled into one report. Individual failures
// never abort the mission - partial diagnostic output beats early abort.

use crate::error::Result;
use crate::navigate::Navigator;
use crate::steps::StepEngine;
use crate::verify::TripleChecker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use wayfarer_core::db::Storage;
use wayfarer_core::graph::GraphIndex;
use wayfarer_core::model::{
    DbVerification, Mission, PageGraph, PersonaLogin, SelectorCorrection, TestCase,
};
use wayfarer_core::reasoning::ReasoningService;
use wayfarer_core::report::{LayerResult, Report, TripleCheckSection};
use wayfarer_crawler::browser::BrowserSurface;

pub struct RunOutcome {
    pub report: Report,
    pub corrections: Vec<SelectorCorrection>,
}

pub struct MissionRunner {
    browser: Arc<dyn BrowserSurface>,
    reasoning: Arc<dyn ReasoningService>,
    index: GraphIndex,
    storage: Option<Storage>,
    locate_timeout: Option<std::time::Duration>,
}

impl MissionRunner {
    pub fn new(
        browser: Arc<dyn BrowserSurface>,
        reasoning: Arc<dyn ReasoningService>,
        graph: PageGraph,
    ) -> Result<Self> {
        Ok(Self {
            browser,
            reasoning,
            index: GraphIndex::build(graph)?,
            storage: None,
            locate_timeout: None,
        })
    }

    pub fn with_storage(mut self, storage: Storage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_locate_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.locate_timeout = Some(timeout);
        self
    }

    pub fn graph(&self) -> &PageGraph {
        self.index.graph()
    }

    pub async fn run(&self, mission: &Mission) -> Result<RunOutcome> {
        mission.validate()?;
        info!(
            target = %mission.target_node,
            cases = mission.test_cases.len(),
            "starting mission"
        );

        // Session boundary: the call log starts clean.
        let log = self.browser.call_log();
        log.clear();

        if let Some(ref persona) = mission.persona {
            self.login(persona).await;
        }

        let mut engine = StepEngine::new(
            self.browser.as_ref(),
            self.reasoning.as_ref(),
            &self.index,
            self.storage.as_ref(),
            mission,
        );
        if let Some(timeout) = self.locate_timeout {
            engine = engine.with_locate_timeout(timeout);
        }

        // Establish where we are, then reach the target node.
        if let Ok(url) = self.browser.current_url().await {
            engine.set_current_node(self.index.node_for_url(&url).map(|n| n.id.clone()));
        }

        let mut scenario_results = BTreeMap::new();

        if mission.navigation_steps.is_empty() {
            let navigator = Navigator::new(&self.index, self.browser.as_ref());
            match navigator
                .navigate_to(engine.current_node(), &mission.target_node)
                .await
            {
                Ok(node_id) => engine.set_current_node(Some(node_id)),
                Err(e) => warn!(error = %e, "could not reach target node"),
            }
        } else {
            let navigation = TestCase {
                id: "navigation".to_string(),
                name: "navigation".to_string(),
                steps: mission.navigation_steps.clone(),
            };
            let result = engine.run_case(&navigation).await;
            if !result.passed {
                warn!("navigation steps failed, continuing for diagnostics");
                scenario_results.insert(navigation.id.clone(), result);
            }
        }

        for case in &mission.test_cases {
            let result = engine.run_case(case).await;
            scenario_results.insert(case.id.clone(), result);
        }

        let corrections = engine.take_corrections();
        drop(engine);

        let triple_check = self.final_checks(mission).await;
        let overall_success = triple_check.overall(&mission.test_scope);

        let report = Report {
            mission_id: mission.mission_id.clone(),
            triple_check,
            scenario_results,
            overall_success,
            generated_at: chrono::Utc::now().timestamp_millis(),
        };
        info!(overall = report.overall_success, "mission complete");

        Ok(RunOutcome {
            report,
            corrections,
        })
    }

    /// Persona login is a gateway precondition. Failures are logged and
    /// execution proceeds; the steps will surface the consequences.
    async fn login(&self, persona: &PersonaLogin) {
        info!(url = %persona.login_url, "persona login");
        if let Err(e) = self.browser.goto(&persona.login_url).await {
            warn!(error = %e, "login page unreachable");
            return;
        }
        for (selector, value) in [
            (&persona.username_selector, &persona.username),
            (&persona.password_selector, &persona.password),
        ] {
            if let Err(e) = self.browser.fill(selector, value).await {
                warn!(selector = %selector, error = %e, "login field not fillable");
            }
        }
        if let Err(e) = self.browser.click(&persona.submit_selector).await {
            warn!(error = %e, "login submit failed");
        }
    }

    /// The final verification round: every verification point's fields are
    /// triple-checked and the layers combined (any failure wins).
    async fn final_checks(&self, mission: &Mission) -> TripleCheckSection {
        if mission.verification_points.is_empty() {
            return TripleCheckSection::all_skipped();
        }

        let log = self.browser.call_log();
        let checker = TripleChecker::new(&*log, self.storage.as_ref(), self.browser.as_ref());

        let mut database: Option<LayerResult> = None;
        let mut api: Option<LayerResult> = None;
        let mut ui: Option<LayerResult> = None;

        for point in &mission.verification_points {
            let db_verification = point_db_verification(mission, point.db_table.as_deref());
            for (field, expected) in &point.expected_values {
                let outcome = checker
                    .check(
                        field,
                        point.api_endpoint.as_deref(),
                        point.ui_selector.as_deref(),
                        db_verification.as_ref(),
                        &mission.test_scope,
                        Some(expected),
                    )
                    .await;
                database = Some(combine(database.take(), outcome.section.database));
                api = Some(combine(api.take(), outcome.section.api));
                ui = Some(combine(ui.take(), outcome.section.ui));
            }
        }

        TripleCheckSection {
            database: database.unwrap_or_else(|| LayerResult::skipped("no expected values")),
            api: api.unwrap_or_else(|| LayerResult::skipped("no expected values")),
            ui: ui.unwrap_or_else(|| LayerResult::skipped("no expected values")),
        }
    }
}

/// Merge a verification point's table override into the mission-level
/// database mapping.
fn point_db_verification(mission: &Mission, table: Option<&str>) -> Option<DbVerification> {
    match (mission.db_verification.as_ref(), table) {
        (Some(dbv), Some(table)) => {
            let mut dbv = dbv.clone();
            dbv.table = Some(table.to_string());
            Some(dbv)
        }
        (Some(dbv), None) => Some(dbv.clone()),
        (None, Some(table)) => Some(DbVerification {
            schema: None,
            table: Some(table.to_string()),
            id_column: "id".to_string(),
            column_map: BTreeMap::new(),
            required: false,
        }),
        (None, None) => None,
    }
}

/// Failures dominate; a concrete result replaces a skip.
fn combine(acc: Option<LayerResult>, new: LayerResult) -> LayerResult {
    match acc {
        None => new,
        Some(acc) if !acc.success => acc,
        Some(_) if !new.success => new,
        Some(acc) if acc.is_skipped() && !new.is_skipped() => new,
        Some(acc) => acc,
    }
}

/// Write selector corrections back into the graph's component history so
/// later runs pre-empt the same failures.
pub fn apply_corrections(graph: &mut PageGraph, corrections: &[SelectorCorrection]) -> usize {
    let mut applied = 0;
    for correction in corrections {
        let Some(ref node_id) = correction.node_id else {
            continue;
        };
        let Some(node) = graph.node_mut(node_id) else {
            continue;
        };
        let index = node
            .components
            .iter()
            .position(|c| c.selector == correction.original_selector)
            .or_else(|| {
                node.components.iter().position(|c| {
                    correction
                        .component_role
                        .as_ref()
                        .is_some_and(|role| c.role == *role)
                })
            });
        if let Some(component) = index.map(|i| &mut node.components[i]) {
            component.previous_selectors.insert(
                correction.original_selector.clone(),
                correction.corrected_selector.clone(),
            );
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wayfarer_core::model::{Component, ComponentKind, Node};

    #[test]
    fn test_combine_prefers_failure() {
        let ok = LayerResult::ok(json!({}));
        let failed = LayerResult::failed(json!({}));
        assert!(!combine(Some(ok.clone()), failed.clone()).success);
        assert!(!combine(Some(failed), ok).success);
    }

    #[test]
    fn test_combine_concrete_beats_skip() {
        let skip = LayerResult::skipped("n/a");
        let ok = LayerResult::ok(json!({"value": 1}));
        let combined = combine(Some(skip), ok);
        assert!(combined.success && !combined.is_skipped());
    }

    #[test]
    fn test_apply_corrections_writes_history() {
        let mut node = Node::new("orders", "/orders", "Orders");
        node.components
            .push(Component::new(ComponentKind::Button, "save_button", "#old"));
        let mut graph = PageGraph {
            nodes: vec![node],
            edges: vec![],
        };
        let corrections = vec![SelectorCorrection {
            original_selector: "#old".to_string(),
            corrected_selector: "#new".to_string(),
            action_type: "click".to_string(),
            node_id: Some("orders".to_string()),
            component_role: Some("save_button".to_string()),
            timestamp: 0,
        }];

        assert_eq!(apply_corrections(&mut graph, &corrections), 1);
        let component = &graph.nodes[0].components[0];
        assert_eq!(
            component.previous_selectors.get("#old").map(String::as_str),
            Some("#new")
        );
    }
}
