// Report artifact assembled by the mission orchestrator.

use crate::error::Result;
use crate::model::TestScope;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerResult {
    pub success: bool,
    #[serde(default)]
    pub details: Value,
}

impl LayerResult {
    pub fn ok(details: Value) -> Self {
        Self {
            success: true,
            details,
        }
    }

    pub fn failed(details: Value) -> Self {
        Self {
            success: false,
            details,
        }
    }

    /// An out-of-scope or unavailable layer: successful, explicitly skipped.
    pub fn skipped(reason: &str) -> Self {
        Self {
            success: true,
            details: json!({"skipped": true, "reason": reason}),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.details
            .get("skipped")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripleCheckSection {
    pub database: LayerResult,
    pub api: LayerResult,
    pub ui: LayerResult,
}

impl TripleCheckSection {
    pub fn all_skipped() -> Self {
        Self {
            database: LayerResult::skipped("no verification points"),
            api: LayerResult::skipped("no verification points"),
            ui: LayerResult::skipped("no verification points"),
        }
    }

    /// Logical AND over the layers the mission put in scope.
    pub fn overall(&self, scope: &TestScope) -> bool {
        let mut ok = true;
        if scope.db {
            ok &= self.database.success;
        }
        if scope.api {
            ok &= self.api.success;
        }
        if scope.ui {
            ok &= self.ui.success;
        }
        ok
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub kind: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,
    pub triple_check: TripleCheckSection,
    pub scenario_results: BTreeMap<String, ScenarioResult>,
    pub overall_success: bool,
    pub generated_at: i64,
}

impl Report {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// One human-readable line per check; the CLI colors these.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (name, layer) in [
            ("database", &self.triple_check.database),
            ("api", &self.triple_check.api),
            ("ui", &self.triple_check.ui),
        ] {
            let status = if layer.is_skipped() {
                "SKIP"
            } else if layer.success {
                "PASS"
            } else {
                "FAIL"
            };
            lines.push(format!("[{}] {} check", status, name));
        }
        for (id, scenario) in &self.scenario_results {
            let status = if scenario.passed { "PASS" } else { "FAIL" };
            let failed_steps = scenario.steps.iter().filter(|s| !s.passed).count();
            if failed_steps > 0 {
                lines.push(format!(
                    "[{}] scenario {} ({} failed step{})",
                    status,
                    id,
                    failed_steps,
                    if failed_steps == 1 { "" } else { "s" }
                ));
            } else {
                lines.push(format!("[{}] scenario {}", status, id));
            }
        }
        lines.push(format!(
            "overall: {}",
            if self.overall_success { "PASS" } else { "FAIL" }
        ));
        lines
    }
}
