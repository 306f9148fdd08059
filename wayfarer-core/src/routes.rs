// Route normalization: numeric-id path segments become named parameters so
// `/products/17` and `/products/42` collapse into one template node.

use crate::model::{Edge, PageGraph};
use std::collections::HashMap;
use tracing::debug;

/// Irregular plurals the generic suffix rules get wrong.
const KNOWN_SINGULARS: &[(&str, &str)] = &[
    ("people", "person"),
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("statuses", "status"),
    ("addresses", "address"),
    ("analyses", "analysis"),
    ("indices", "index"),
];

pub fn singularize(noun: &str) -> String {
    let lower = noun.to_lowercase();
    for (plural, singular) in KNOWN_SINGULARS {
        if lower == *plural {
            return (*singular).to_string();
        }
    }
    if let Some(stem) = lower.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if lower.ends_with("ss") {
        return lower;
    }
    if let Some(stem) = lower.strip_suffix('s') {
        return stem.to_string();
    }
    lower
}

/// Parameter name for a numeric segment, inferred from the segment before it:
/// `products` -> `productId`, unknown nouns fall back to `<segment>Id`.
pub fn parameter_name_for(preceding_segment: &str) -> String {
    let cleaned: String = preceding_segment
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if cleaned.is_empty() {
        return "id".to_string();
    }
    format!("{}Id", singularize(&cleaned))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterizedPath {
    pub template: String,
    /// Name of the last parameter introduced, if any.
    pub parameter: Option<String>,
    pub changed: bool,
}

/// Replace every all-digit path segment with `{<singular-of-previous>Id}`.
pub fn parameterize_path(path: &str) -> ParameterizedPath {
    let path_only = match path.find(['?', '#']) {
        Some(idx) => &path[..idx],
        None => path,
    };

    let mut parameter = None;
    let mut changed = false;
    let mut previous = String::new();
    let mut out = Vec::new();

    for segment in path_only.split('/') {
        if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
            let name = parameter_name_for(&previous);
            out.push(format!("{{{}}}", name));
            parameter = Some(name);
            changed = true;
        } else {
            out.push(segment.to_string());
            if !segment.is_empty() {
                previous = segment.to_string();
            }
        }
    }

    ParameterizedPath {
        template: out.join("/"),
        parameter,
        changed,
    }
}

/// Normalize a recorded API call of the form `METHOD /path?query`:
/// the query string is dropped and numeric segments are parameterized,
/// so the same logical endpoint always has one textual form.
pub fn normalize_api_call(call: &str) -> String {
    let mut parts = call.splitn(2, ' ');
    let first = parts.next().unwrap_or_default();
    let Some(rest) = parts.next() else {
        return parameterize_path(call).template;
    };
    let method = first.to_uppercase();
    let path = rest.split(['?', '#']).next().unwrap_or(rest);
    format!("{} {}", method, parameterize_path(path).template)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MergeReport {
    pub merged_nodes: usize,
    pub rewritten_edges: usize,
}

/// Collapse nodes that only differ in resolved id into one template node.
///
/// The first-discovered node survives as the base: components union by
/// selector (first occurrence wins), active APIs union and re-normalize,
/// and the label is marked as a template. Edges pointing at a merged
/// instance are rewritten to the surviving template id.
pub fn merge_graph(graph: &mut PageGraph) -> MergeReport {
    let mut report = MergeReport::default();
    let mut survivors: Vec<crate::model::Node> = Vec::new();
    let mut by_template: HashMap<String, usize> = HashMap::new();
    let mut id_remap: HashMap<String, String> = HashMap::new();

    for mut node in graph.nodes.drain(..) {
        let parameterized = parameterize_path(&node.url);
        if !parameterized.changed && !node.is_template {
            survivors.push(node);
            continue;
        }

        let template = parameterized.template.clone();
        match by_template.get(&template) {
            None => {
                if parameterized.changed {
                    node.url = template.clone();
                    node.parameter_name = parameterized.parameter.clone();
                }
                node.is_template = true;
                if !node.display_label.ends_with("(template)") {
                    node.display_label = format!("{} (template)", node.display_label.trim_end());
                }
                node.active_apis = normalize_api_list(&node.active_apis);
                by_template.insert(template, survivors.len());
                survivors.push(node);
            }
            Some(&base_idx) => {
                debug!(url = %node.url, "merging node into template {}", template);
                let base = &mut survivors[base_idx];
                id_remap.insert(node.id.clone(), base.id.clone());
                for component in node.components {
                    if !base
                        .components
                        .iter()
                        .any(|c| c.selector == component.selector)
                    {
                        base.components.push(component);
                    }
                }
                let mut apis = base.active_apis.clone();
                apis.extend(node.active_apis);
                base.active_apis = normalize_api_list(&apis);
                report.merged_nodes += 1;
            }
        }
    }

    graph.nodes = survivors;

    let mut seen_edges = std::collections::HashSet::new();
    let mut edges: Vec<Edge> = Vec::new();
    for mut edge in graph.edges.drain(..) {
        if let Some(target) = id_remap.get(&edge.to) {
            edge.to = target.clone();
            report.rewritten_edges += 1;
        }
        if let Some(source) = id_remap.get(&edge.from) {
            edge.from = source.clone();
            report.rewritten_edges += 1;
        }
        if seen_edges.insert((edge.from.clone(), edge.to.clone(), edge.selector.clone())) {
            edges.push(edge);
        }
    }
    graph.edges = edges;

    report
}

fn normalize_api_list(apis: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for api in apis {
        let normalized = normalize_api_call(api);
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

/// True when `path` resolves to `template` under parameterization.
pub fn matches_template(path: &str, template: &str) -> bool {
    parameterize_path(path).template == template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singularize_regular_nouns() {
        assert_eq!(singularize("products"), "product");
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("orders"), "order");
    }

    #[test]
    fn test_singularize_irregular_nouns() {
        assert_eq!(singularize("people"), "person");
        assert_eq!(singularize("statuses"), "status");
    }

    #[test]
    fn test_singularize_leaves_non_plurals() {
        assert_eq!(singularize("status"), "status");
        assert_eq!(singularize("address"), "address");
    }

    #[test]
    fn test_parameterize_trailing_numeric_segment() {
        let p = parameterize_path("/products/123");
        assert_eq!(p.template, "/products/{productId}");
        assert_eq!(p.parameter.as_deref(), Some("productId"));
        assert!(p.changed);
    }

    #[test]
    fn test_parameterize_is_digit_invariant() {
        assert_eq!(
            parameterize_path("/products/1").template,
            parameterize_path("/products/99887").template
        );
    }

    #[test]
    fn test_parameterize_mid_path_segment() {
        let p = parameterize_path("/api/orders/7/items");
        assert_eq!(p.template, "/api/orders/{orderId}/items");
    }

    #[test]
    fn test_parameterize_leaves_plain_paths() {
        let p = parameterize_path("/about");
        assert_eq!(p.template, "/about");
        assert!(!p.changed);
        assert!(p.parameter.is_none());
    }

    #[test]
    fn test_normalize_api_call_strips_query_and_parameterizes() {
        assert_eq!(
            normalize_api_call("get /api/products/55?include=reviews"),
            "GET /api/products/{productId}"
        );
    }

    #[test]
    fn test_matches_template() {
        assert!(matches_template("/products/9", "/products/{productId}"));
        assert!(!matches_template("/orders/9", "/products/{productId}"));
    }
}
