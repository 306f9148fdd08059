// Semantic page labeling. The reasoning service sees a structural snapshot
// only (headers, field names, a short excerpt) - never raw data-heavy page
// text - so naming stays stable across runs regardless of page content.

use crate::extract::ExtractedPage;
use crate::heuristics::slugify;
use tracing::debug;
use wayfarer_core::reasoning::{ReasoningService, extract_json};

#[derive(Debug, Clone)]
pub struct PageLabel {
    pub slug: String,
    pub label: String,
    pub description: String,
}

pub fn structural_snapshot(path: &str, page: &ExtractedPage) -> String {
    let mut lines = Vec::new();
    lines.push(format!("path: {}", path));
    if let Some(ref title) = page.title {
        lines.push(format!("title: {}", title));
    }
    if !page.headers.is_empty() {
        lines.push(format!("headers: {}", page.headers.join(" | ")));
    }
    if !page.table_headers.is_empty() {
        lines.push(format!("table columns: {}", page.table_headers.join(", ")));
    }
    if !page.form_field_names.is_empty() {
        lines.push(format!("form fields: {}", page.form_field_names.join(", ")));
    }
    if !page.excerpt.is_empty() {
        lines.push(format!("excerpt: {}", page.excerpt));
    }
    lines.join("\n")
}

fn build_prompt(snapshot: &str) -> String {
    format!(
        "You are labeling a page of a web application from its structure.\n\
         Reply with JSON only: {{\"label\": <short semantic name, 2-4 words>, \
         \"header\": <human-readable page header>, \
         \"description\": <one sentence describing the page structure, \
         no concrete data values>}}\n\n{}",
        snapshot
    )
}

/// Ask the reasoning service for a label; any failure degrades to a slug
/// derived from the URL path.
pub async fn label_page(
    reasoning: &dyn ReasoningService,
    path: &str,
    page: &ExtractedPage,
) -> PageLabel {
    let snapshot = structural_snapshot(path, page);
    match reasoning.invoke(&build_prompt(&snapshot)).await {
        Ok(reply) => {
            if let Some(json) = extract_json(&reply) {
                let label = json
                    .get("header")
                    .or_else(|| json.get("label"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let slug_source = json
                    .get("label")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&label)
                    .to_string();
                let description = json
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                if !label.is_empty() {
                    return PageLabel {
                        slug: slugify(&slug_source),
                        label,
                        description,
                    };
                }
            }
            debug!("reasoning reply carried no usable label, falling back");
            fallback_label(path, page)
        }
        Err(e) => {
            debug!(error = %e, "reasoning service unavailable for labeling");
            fallback_label(path, page)
        }
    }
}

/// Deterministic label from the path and extracted structure.
pub fn fallback_label(path: &str, page: &ExtractedPage) -> PageLabel {
    let last_segment = path
        .split('/')
        .filter(|s| {
            !s.is_empty() && !s.starts_with('{') && !s.chars().all(|c| c.is_ascii_digit())
        })
        .next_back()
        .unwrap_or("home");
    let label = page
        .headers
        .first()
        .cloned()
        .or_else(|| page.title.clone())
        .unwrap_or_else(|| title_case(last_segment));
    let description = describe_structure(page);
    let slug = if path == "/" {
        "home".to_string()
    } else {
        slugify(&label)
    };
    PageLabel {
        slug,
        label,
        description,
    }
}

fn title_case(text: &str) -> String {
    text.split(['-', '_'])
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn describe_structure(page: &ExtractedPage) -> String {
    let forms = page
        .components
        .iter()
        .filter(|c| c.kind == wayfarer_core::model::ComponentKind::Form)
        .count();
    let tables = page.table_headers.len();
    let mut parts = Vec::new();
    if forms > 0 {
        parts.push(format!("{} form{}", forms, if forms == 1 { "" } else { "s" }));
    }
    if tables > 0 {
        parts.push(format!("{} table column{}", tables, if tables == 1 { "" } else { "s" }));
    }
    if parts.is_empty() {
        "Content page".to_string()
    } else {
        format!("Page with {}", parts.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_page;
    use wayfarer_core::reasoning::CannedReasoner;

    #[tokio::test]
    async fn test_label_from_reasoning_json() {
        let reasoner = CannedReasoner::new(vec![
            r#"{"label": "product catalog", "header": "Product Catalog", "description": "Listing of products with a creation form"}"#,
        ]);
        let page = extract_page("<html><body><h1>Stuff</h1></body></html>");
        let label = label_page(&reasoner, "/products", &page).await;
        assert_eq!(label.slug, "product-catalog");
        assert_eq!(label.label, "Product Catalog");
    }

    #[tokio::test]
    async fn test_label_falls_back_on_service_error() {
        let reasoner = CannedReasoner::new(vec![]);
        let page = extract_page("<html><body><h1>Order History</h1></body></html>");
        let label = label_page(&reasoner, "/orders", &page).await;
        assert_eq!(label.slug, "order-history");
        assert_eq!(label.label, "Order History");
    }

    #[test]
    fn test_snapshot_is_structural_only() {
        let page = extract_page(
            r#"<html><body><h1>Orders</h1>
            <table><tr><th>Total</th></tr><tr><td>$941.20</td></tr></table>
            </body></html>"#,
        );
        let snapshot = structural_snapshot("/orders", &page);
        assert!(snapshot.contains("table columns: Total"));
        // excerpt is capped page text; headers/fields carry the structure
        assert!(snapshot.starts_with("path: /orders"));
    }

    #[test]
    fn test_fallback_label_for_root() {
        let page = extract_page("<html><body></body></html>");
        let label = fallback_label("/", &page);
        assert_eq!(label.slug, "home");
    }
}
