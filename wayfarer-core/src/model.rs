// Artifact data model: graph, mission, captured network calls.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Form,
    Button,
    List,
    TableColumn,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Form => "form",
            ComponentKind::Button => "button",
            ComponentKind::List => "list",
            ComponentKind::TableColumn => "table_column",
        }
    }
}

/// A single input inside a form component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub input_kind: String,
    pub selector: String,
    pub tag: String,
}

/// A semantically-labeled interactive or data-display element on a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub kind: ComponentKind,
    pub role: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers_api: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impacts_db: Option<String>,
    /// Failed selector -> corrected selector, written back by the runner.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub previous_selectors: BTreeMap<String, String>,
}

impl Component {
    pub fn new(kind: ComponentKind, role: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            kind,
            role: role.into(),
            selector: selector.into(),
            fields: Vec::new(),
            triggers_api: Vec::new(),
            impacts_db: None,
            previous_selectors: BTreeMap::new(),
        }
    }
}

/// A discovered page or page-template in the semantic graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub url: String,
    pub display_label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_entity: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_apis: Vec<String>,
    #[serde(default)]
    pub is_template: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            display_label: label.into(),
            description: String::new(),
            primary_entity: None,
            components: Vec::new(),
            active_apis: Vec::new(),
            is_template: false,
            parameter_name: None,
        }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A directed navigation relationship between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default = "default_action")]
    pub action: String,
    pub selector: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub external: bool,
}

fn default_action() -> String {
    "navigate".to_string()
}

/// The persisted graph artifact: `{nodes, edges}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageGraph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl PageGraph {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Structural validation: unique node ids, unique urls, resolvable edges.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let mut urls = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(CoreError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            if !urls.insert(node.url.as_str()) {
                return Err(CoreError::InvalidGraph(format!(
                    "duplicate node url '{}'",
                    node.url
                )));
            }
        }
        for edge in &self.edges {
            if !ids.contains(edge.from.as_str()) {
                return Err(CoreError::InvalidGraph(format!(
                    "edge references unknown source node '{}'",
                    edge.from
                )));
            }
            if !ids.contains(edge.to.as_str()) {
                return Err(CoreError::InvalidGraph(format!(
                    "edge references unknown target node '{}'",
                    edge.to
                )));
            }
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let graph: PageGraph = serde_json::from_str(&raw).map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        graph.validate().map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(graph)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

/// Resolve the graph file for a persona. A per-persona variant
/// (`graph.admin.json` next to `graph.json`) is preferred when present.
pub fn graph_path_for_persona(base: &Path, persona: Option<&str>) -> PathBuf {
    if let Some(persona) = persona {
        let stem = base
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("graph");
        let ext = base.extension().and_then(|s| s.to_str()).unwrap_or("json");
        let variant = base.with_file_name(format!("{}.{}.{}", stem, persona, ext));
        if variant.exists() {
            return variant;
        }
    }
    base.to_path_buf()
}

// ---------------------------------------------------------------------------
// Mission artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Deterministic,
    Hybrid,
    Agentic,
}

fn default_true() -> bool {
    true
}

/// Which of the DB/API/UI layers the mission wants checked.
/// Absent entries default to "test everything".
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TestScope {
    #[serde(default = "default_true")]
    pub db: bool,
    #[serde(default = "default_true")]
    pub api: bool,
    #[serde(default = "default_true")]
    pub ui: bool,
}

impl Default for TestScope {
    fn default() -> Self {
        Self {
            db: true,
            api: true,
            ui: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbVerification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// API field name -> database column name.
    #[serde(default)]
    pub column_map: BTreeMap<String, String>,
    #[serde(default)]
    pub required: bool,
}

fn default_id_column() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_table: Option<String>,
    #[serde(default)]
    pub expected_values: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_selector: Option<String>,
}

/// One structured test step. The vocabulary is closed: anything the
/// engine cannot express arrives as `Manual` and fails explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    Goto {
        url: String,
    },
    Click {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Fill {
        selector: String,
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    WaitVisible {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    AssertVisible {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    AssertNotVisible {
        selector: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    AssertText {
        selector: String,
        expected: String,
    },
    AssertUrlContains {
        fragment: String,
    },
    NavigateToPage {
        target: String,
    },
    VerifyApi {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_status: Option<u16>,
        #[serde(default)]
        expected_values: BTreeMap<String, serde_json::Value>,
    },
    VerifyApiValueInUi {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ui_selector: Option<String>,
    },
    VerifyTripleCheck {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ui_selector: Option<String>,
    },
    AssertApiFieldNotShown {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
    },
    CaptureApi {
        endpoint: String,
        save_as: String,
    },
    ExtractApiField {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        save_as: String,
    },
    Login,
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
}

impl Step {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Step::Goto { .. } => "goto",
            Step::Click { .. } => "click",
            Step::Fill { .. } => "fill",
            Step::WaitVisible { .. } => "wait_visible",
            Step::AssertVisible { .. } => "assert_visible",
            Step::AssertNotVisible { .. } => "assert_not_visible",
            Step::AssertText { .. } => "assert_text",
            Step::AssertUrlContains { .. } => "assert_url_contains",
            Step::NavigateToPage { .. } => "navigate_to_page",
            Step::VerifyApi { .. } => "verify_api",
            Step::VerifyApiValueInUi { .. } => "verify_api_value_in_ui",
            Step::VerifyTripleCheck { .. } => "verify_triple_check",
            Step::AssertApiFieldNotShown { .. } => "assert_api_field_not_shown",
            Step::CaptureApi { .. } => "capture_api",
            Step::ExtractApiField { .. } => "extract_api_field",
            Step::Login => "login",
            Step::Manual { .. } => "manual",
        }
    }

    /// Assertion steps record their failure and let the case continue;
    /// everything else stops the case when it fails.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Step::AssertVisible { .. }
                | Step::AssertNotVisible { .. }
                | Step::AssertText { .. }
                | Step::AssertUrlContains { .. }
                | Step::VerifyApi { .. }
                | Step::VerifyApiValueInUi { .. }
                | Step::VerifyTripleCheck { .. }
                | Step::AssertApiFieldNotShown { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaLogin {
    pub login_url: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_username_selector")]
    pub username_selector: String,
    #[serde(default = "default_password_selector")]
    pub password_selector: String,
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
}

fn default_username_selector() -> String {
    "input[name='username'], input[type='email']".to_string()
}

fn default_password_selector() -> String {
    "input[type='password']".to_string()
}

fn default_submit_selector() -> String {
    "button[type='submit']".to_string()
}

/// The structured test-execution request, produced by an external planner.
/// Consumed once; this core never mutates it except to append
/// selector-correction metadata at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    pub target_node: String,
    #[serde(default)]
    pub navigation_steps: Vec<Step>,
    #[serde(default, alias = "deterministic_steps")]
    pub test_cases: Vec<TestCase>,
    #[serde(default)]
    pub verification_points: Vec<VerificationPoint>,
    #[serde(default)]
    pub test_scope: TestScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_verification: Option<DbVerification>,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaLogin>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selector_corrections: Vec<SelectorCorrection>,
}

impl Mission {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mission: Mission = serde_json::from_str(&raw).map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        mission.validate().map_err(|e| CoreError::Artifact {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(mission)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_node.trim().is_empty() {
            return Err(CoreError::InvalidMission(
                "target_node must not be empty".to_string(),
            ));
        }
        let mut case_ids = HashSet::new();
        for case in &self.test_cases {
            if !case_ids.insert(case.id.as_str()) {
                return Err(CoreError::InvalidMission(format!(
                    "duplicate test case id '{}'",
                    case.id
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Run-time records
// ---------------------------------------------------------------------------

/// A locator correction discovered at run time, replayed on later runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorCorrection {
    pub original_selector: String,
    pub corrected_selector: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_role: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Request,
    Response,
}

/// One intercepted network event, accumulated per execution session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedCall {
    pub direction: CallDirection,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl CapturedCall {
    pub fn request(method: impl Into<String>, url: impl Into<String>, timestamp: i64) -> Self {
        Self {
            direction: CallDirection::Request,
            method: method.into(),
            url: url.into(),
            status: None,
            body: None,
            timestamp,
        }
    }

    pub fn response(
        method: impl Into<String>,
        url: impl Into<String>,
        status: u16,
        body: Option<serde_json::Value>,
        timestamp: i64,
    ) -> Self {
        Self {
            direction: CallDirection::Response,
            method: method.into(),
            url: url.into(),
            status: Some(status),
            body,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_validate_duplicate_id() {
        let graph = PageGraph {
            nodes: vec![
                Node::new("home", "/", "Home"),
                Node::new("home", "/other", "Other"),
            ],
            edges: vec![],
        };
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_graph_validate_dangling_edge() {
        let graph = PageGraph {
            nodes: vec![Node::new("home", "/", "Home")],
            edges: vec![Edge {
                from: "home".to_string(),
                to: "missing".to_string(),
                action: "navigate".to_string(),
                selector: "a".to_string(),
                description: String::new(),
                href: None,
                external: false,
            }],
        };
        assert!(graph.validate().is_err());
    }

    #[test]
    fn test_test_scope_defaults_to_everything() {
        let mission: Mission = serde_json::from_str(r#"{"target_node": "home"}"#).unwrap();
        assert!(mission.test_scope.db);
        assert!(mission.test_scope.api);
        assert!(mission.test_scope.ui);
    }

    #[test]
    fn test_step_deserializes_from_tagged_json() {
        let step: Step =
            serde_json::from_str(r##"{"kind": "click", "selector": "#save"}"##).unwrap();
        assert_eq!(step.kind_name(), "click");
        assert!(!step.is_assertion());

        let step: Step =
            serde_json::from_str(r#"{"kind": "assert_text", "selector": "h1", "expected": "Orders"}"#)
                .unwrap();
        assert!(step.is_assertion());
    }

    #[test]
    fn test_mission_accepts_deterministic_steps_alias() {
        let mission: Mission = serde_json::from_str(
            r#"{
                "target_node": "orders",
                "deterministic_steps": [
                    {"id": "tc1", "steps": [{"kind": "login"}]}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(mission.test_cases.len(), 1);
    }
}
