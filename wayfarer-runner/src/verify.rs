// Triple-check verification: the same logical value must agree across the
// persisted store, the captured network traffic, and the rendered page.

use scraper::{Html, Selector};
use serde_json::{Value, json};
use tracing::{debug, warn};
use wayfarer_core::compare::{value_to_text, values_match};
use wayfarer_core::db::Storage;
use wayfarer_core::fields::extract_or_find;
use wayfarer_core::model::{DbVerification, TestScope};
use wayfarer_core::report::{LayerResult, TripleCheckSection};
use wayfarer_core::routes::normalize_api_call;
use wayfarer_crawler::browser::{BrowserSurface, CallLog};

/// Common identifier field names scanned for a record id.
const ID_FIELDS: &[&str] = &["id", "uuid", "_id", "recordId", "record_id", "pk"];

pub struct TripleChecker<'a> {
    log: &'a CallLog,
    storage: Option<&'a Storage>,
    browser: &'a dyn BrowserSurface,
}

#[derive(Debug)]
pub struct TripleOutcome {
    pub section: TripleCheckSection,
    pub api_value: Option<Value>,
    pub record_id: Option<String>,
}

impl TripleOutcome {
    /// The step-level verdict: the UI match is required; the storage
    /// comparison is advisory unless the mission marks it required.
    pub fn passed(&self, scope: &TestScope, db_required: bool) -> bool {
        let mut ok = true;
        if scope.api {
            ok &= self.section.api.success;
        }
        if scope.ui {
            ok &= self.section.ui.success;
        }
        if scope.db && db_required {
            ok &= self.section.database.success;
        }
        ok
    }
}

/// True when a captured call's `METHOD /path` covers the given endpoint
/// string (with or without a method prefix).
pub fn endpoint_matches(call_method: &str, call_url: &str, endpoint: &str) -> bool {
    let path = url::Url::parse(call_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| call_url.split(['?', '#']).next().unwrap_or("").to_string());
    let call_norm = normalize_api_call(&format!("{} {}", call_method, path));
    let endpoint = endpoint.trim();
    if endpoint.contains(' ') {
        call_norm == normalize_api_call(endpoint)
    } else {
        let endpoint_norm = normalize_api_call(endpoint);
        call_norm
            .split_whitespace()
            .next_back()
            .map(|p| p == endpoint_norm)
            .unwrap_or(false)
    }
}

impl<'a> TripleChecker<'a> {
    pub fn new(
        log: &'a CallLog,
        storage: Option<&'a Storage>,
        browser: &'a dyn BrowserSurface,
    ) -> Self {
        Self {
            log,
            storage,
            browser,
        }
    }

    pub async fn check(
        &self,
        field: &str,
        endpoint: Option<&str>,
        ui_selector: Option<&str>,
        db_verification: Option<&DbVerification>,
        scope: &TestScope,
        expected: Option<&Value>,
    ) -> TripleOutcome {
        let (api, api_value, record_id) = self.check_api(field, endpoint, scope, expected);
        let database = self.check_database(field, db_verification, scope, api_value.as_ref(), record_id.as_deref());
        let ui = self
            .check_ui(field, ui_selector, scope, api_value.as_ref(), expected)
            .await;

        TripleOutcome {
            section: TripleCheckSection { database, api, ui },
            api_value,
            record_id,
        }
    }

    /// Scan captured responses, most recent first, for the field; also pull
    /// a record identifier out of the same payload.
    fn check_api(
        &self,
        field: &str,
        endpoint: Option<&str>,
        scope: &TestScope,
        expected: Option<&Value>,
    ) -> (LayerResult, Option<Value>, Option<String>) {
        let mut api_value = None;
        let mut record_id = None;

        for call in self.log.responses_newest_first() {
            if let Some(endpoint) = endpoint
                && !endpoint_matches(&call.method, &call.url, endpoint)
            {
                continue;
            }
            let Some(ref body) = call.body else { continue };
            let Some(found) = extract_or_find(body, field) else {
                continue;
            };
            api_value = Some(found.clone());
            record_id = ID_FIELDS
                .iter()
                .find_map(|id_field| extract_or_find(body, id_field))
                .map(|v| value_to_text(v));
            break;
        }

        if !scope.api {
            return (LayerResult::skipped("out of scope"), api_value, record_id);
        }

        let layer = match api_value {
            Some(ref value) => {
                if let Some(expected) = expected {
                    if values_match(expected, &value_to_text(value)) {
                        LayerResult::ok(json!({"field": field, "value": value}))
                    } else {
                        LayerResult::failed(json!({
                            "field": field,
                            "value": value,
                            "expected": expected,
                        }))
                    }
                } else {
                    LayerResult::ok(json!({"field": field, "value": value}))
                }
            }
            None => LayerResult::failed(json!({
                "field": field,
                "reason": "field not found in captured responses",
            })),
        };
        (layer, api_value, record_id)
    }

    /// Storage lookup by record id. External-service failure degrades to a
    /// skipped layer, never an abort.
    fn check_database(
        &self,
        field: &str,
        db_verification: Option<&DbVerification>,
        scope: &TestScope,
        api_value: Option<&Value>,
        record_id: Option<&str>,
    ) -> LayerResult {
        if !scope.db {
            return LayerResult::skipped("out of scope");
        }
        let Some(storage) = self.storage else {
            return LayerResult::skipped("storage unavailable");
        };
        let Some(dbv) = db_verification else {
            return LayerResult::skipped("no database mapping in mission");
        };
        let Some(table) = dbv.table.as_deref() else {
            return LayerResult::skipped("no table named in mission");
        };
        let Some(record_id) = record_id else {
            return LayerResult::skipped("no record id found in API traffic");
        };

        let column = dbv
            .column_map
            .get(field)
            .map(String::as_str)
            .unwrap_or(field);
        match storage.column_value(
            dbv.schema.as_deref(),
            table,
            &dbv.id_column,
            record_id,
            column,
        ) {
            Ok(Some(stored)) => {
                let matches = match api_value {
                    Some(value) => values_match(value, &stored),
                    None => false,
                };
                if matches {
                    LayerResult::ok(json!({"column": column, "value": stored}))
                } else {
                    LayerResult::failed(json!({
                        "column": column,
                        "value": stored,
                        "api_value": api_value,
                    }))
                }
            }
            Ok(None) => LayerResult::failed(json!({
                "column": column,
                "reason": format!("row {} or column missing", record_id),
            })),
            Err(e) => {
                warn!(error = %e, "storage lookup failed, skipping database layer");
                LayerResult::skipped(&format!("storage error: {}", e))
            }
        }
    }

    /// Search the rendered page: header-aligned cell first, then the given
    /// locator, then a full cell scan.
    async fn check_ui(
        &self,
        field: &str,
        ui_selector: Option<&str>,
        scope: &TestScope,
        api_value: Option<&Value>,
        expected: Option<&Value>,
    ) -> LayerResult {
        if !scope.ui {
            return LayerResult::skipped("out of scope");
        }
        let Some(reference) = api_value.or(expected) else {
            return LayerResult::failed(json!({
                "field": field,
                "reason": "no value available to look for",
            }));
        };

        let html = match self.browser.page_html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "page snapshot unavailable, skipping UI layer");
                return LayerResult::skipped(&format!("page unavailable: {}", e));
            }
        };

        if let Some(cell) = header_aligned_cell(&html, field)
            && values_match(reference, &cell)
        {
            return LayerResult::ok(json!({
                "strategy": "table_column",
                "value": cell,
            }));
        }

        if let Some(selector) = ui_selector
            && let Ok(Some(text)) = self.browser.text_of(selector).await
            && values_match(reference, &text)
        {
            return LayerResult::ok(json!({
                "strategy": "locator",
                "selector": selector,
                "value": text,
            }));
        }

        if let Some(cell) = scan_cells(&html, reference) {
            return LayerResult::ok(json!({"strategy": "cell_scan", "value": cell}));
        }

        debug!(field, "value not found anywhere in the rendered page");
        LayerResult::failed(json!({
            "field": field,
            "reason": "value not visible in rendered page",
        }))
    }
}

fn slug(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn element_text(el: &scraper::ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Match a column header by name and read the same-indexed cell of the
/// first data row.
fn header_aligned_cell(html: &str, field: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let table_sel = Selector::parse("table").unwrap();
    let th_sel = Selector::parse("th").unwrap();
    let tr_sel = Selector::parse("tr").unwrap();
    let td_sel = Selector::parse("td").unwrap();

    let wanted = slug(field);
    for table in doc.select(&table_sel) {
        let headers: Vec<String> = table.select(&th_sel).map(|th| element_text(&th)).collect();
        let Some(index) = headers.iter().position(|h| {
            let header = slug(h);
            !header.is_empty() && (header == wanted || header.contains(&wanted))
        }) else {
            continue;
        };

        for row in table.select(&tr_sel) {
            let cells: Vec<String> = row.select(&td_sel).map(|td| element_text(&td)).collect();
            if cells.is_empty() {
                continue;
            }
            return cells.get(index).cloned();
        }
    }
    None
}

/// Last resort: scan every table cell for a tolerant match.
fn scan_cells(html: &str, reference: &Value) -> Option<String> {
    let doc = Html::parse_document(html);
    let cell_sel = Selector::parse("td, li, dd").unwrap();
    for cell in doc.select(&cell_sel) {
        let text = element_text(&cell);
        if !text.is_empty() && values_match(reference, &text) {
            return Some(text);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_matches_with_and_without_method() {
        assert!(endpoint_matches("GET", "http://x/api/orders/5", "/api/orders/{orderId}"));
        assert!(endpoint_matches("GET", "http://x/api/orders/5", "GET /api/orders/5"));
        assert!(!endpoint_matches("POST", "http://x/api/orders", "GET /api/orders"));
        assert!(endpoint_matches("GET", "/api/orders?page=2", "/api/orders"));
    }

    #[test]
    fn test_header_aligned_cell() {
        let html = r#"<table>
            <tr><th>Customer</th><th>Total Amount</th></tr>
            <tr><td>Acme</td><td>$1,234.50</td></tr>
            <tr><td>Globex</td><td>$2.00</td></tr>
        </table>"#;
        assert_eq!(
            header_aligned_cell(html, "total_amount").as_deref(),
            Some("$1,234.50")
        );
        assert_eq!(header_aligned_cell(html, "customer").as_deref(), Some("Acme"));
        assert!(header_aligned_cell(html, "missing_column").is_none());
    }

    #[test]
    fn test_scan_cells_tolerant() {
        let html = "<table><tr><td>$941.20</td></tr></table>";
        assert!(scan_cells(html, &json!(941.2)).is_some());
        assert!(scan_cells(html, &json!(10)).is_none());
    }
}
