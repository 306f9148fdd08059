// Classification heuristics, kept as pure functions over small rule tables
// so they unit-test without a browser.

use wayfarer_core::model::{ComponentKind, Field};

/// Class/aria-label tokens marking chrome controls (pagination, sorting,
/// column resizing) that should not become graph components.
const NOISE_TOKENS: &[&str] = &[
    "pagination",
    "pager",
    "page-link",
    "page-item",
    "sort",
    "sorter",
    "sortable",
    "resize",
    "resizer",
    "col-resize",
    "collapse-toggle",
    "carousel-control",
];

const NOISE_TEXT: &[&str] = &["«", "»", "‹", "›", "<", ">", "...", "…"];

/// Button text that suggests clicking it opens a creation form.
const FORM_OPENER_WORDS: &[&str] = &["add", "create", "new", "register", "invite", "+"];

/// Button text that suggests the click reveals navigation rather than
/// performing an action.
const REVEAL_WORDS: &[&str] = &["menu", "tools", "more", "options", "show", "expand", "nav"];

pub fn is_noise_button(text: &str, class_attr: &str, aria_label: &str) -> bool {
    let class_lower = class_attr.to_lowercase();
    let aria_lower = aria_label.to_lowercase();
    for token in NOISE_TOKENS {
        if class_lower.contains(token) || aria_lower.contains(token) {
            return true;
        }
    }
    let trimmed = text.trim();
    if NOISE_TEXT.contains(&trimmed) {
        return true;
    }
    // Bare page numbers
    !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit())
}

pub fn suggests_form_opener(text: &str) -> bool {
    let lower = text.to_lowercase();
    FORM_OPENER_WORDS
        .iter()
        .any(|w| lower.split_whitespace().any(|t| t == *w) || lower.trim() == *w)
}

pub fn suggests_reveal(text: &str) -> bool {
    let lower = text.to_lowercase();
    REVEAL_WORDS.iter().any(|w| lower.contains(w))
}

/// Synthesize a plausible placeholder value for a form field, typed by
/// field name first, input kind second.
pub fn placeholder_value(field: &Field) -> String {
    let name = field.name.to_lowercase();
    let kind = field.input_kind.to_lowercase();

    let by_name = [
        ("email", "qa.wayfarer@example.com"),
        ("phone", "5551234567"),
        ("zip", "94103"),
        ("postal", "94103"),
        ("price", "19.99"),
        ("amount", "42"),
        ("quantity", "3"),
        ("qty", "3"),
        ("url", "https://example.com"),
        ("name", "Wayfarer Test"),
        ("title", "Wayfarer Test Entry"),
        ("description", "Created during automated discovery"),
    ];
    for (token, value) in by_name {
        if name.contains(token) {
            return value.to_string();
        }
    }

    match kind.as_str() {
        "email" => "qa.wayfarer@example.com".to_string(),
        "password" => "Wf-Secret-123!".to_string(),
        "number" => "42".to_string(),
        "tel" => "5551234567".to_string(),
        "date" => "2024-01-15".to_string(),
        "url" => "https://example.com".to_string(),
        "checkbox" => "true".to_string(),
        "textarea" => "Created during automated discovery".to_string(),
        _ => "test value".to_string(),
    }
}

/// Component-to-API attribution: forms trigger writes, lists trigger reads,
/// buttons accept either. A heuristic, not a guarantee.
pub fn method_matches_kind(kind: ComponentKind, method: &str) -> bool {
    let method = method.to_uppercase();
    match kind {
        ComponentKind::Form => matches!(method.as_str(), "POST" | "PUT" | "PATCH"),
        ComponentKind::List => method == "GET",
        ComponentKind::Button => {
            matches!(method.as_str(), "GET" | "POST" | "PUT" | "PATCH" | "DELETE")
        }
        ComponentKind::TableColumn => false,
    }
}

pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug
    }
}

/// Best-guess domain noun for a page, derived from its API paths first and
/// its own URL path second.
pub fn infer_primary_entity(active_apis: &[String], url_path: &str) -> Option<String> {
    for api in active_apis {
        let path = api.split_whitespace().last().unwrap_or_default();
        if let Some(entity) = entity_from_path(path) {
            return Some(entity);
        }
    }
    entity_from_path(url_path)
}

fn entity_from_path(path: &str) -> Option<String> {
    path.split('/')
        .filter(|s| {
            !s.is_empty()
                && !s.starts_with('{')
                && !s.chars().all(|c| c.is_ascii_digit())
                && *s != "api"
                && !(s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit()))
        })
        .next_back()
        .map(wayfarer_core::routes::singularize)
}
