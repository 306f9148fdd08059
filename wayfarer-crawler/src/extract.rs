// Component extraction from DOM snapshots. Everything here is synchronous
// and works on an HTML string, so it unit-tests without a browser.

use crate::heuristics;
use scraper::{ElementRef, Html, Selector};
use wayfarer_core::model::{Component, ComponentKind, Field};

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorInfo {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub components: Vec<Component>,
    pub anchors: Vec<AnchorInfo>,
    pub headers: Vec<String>,
    pub title: Option<String>,
    pub form_field_names: Vec<String>,
    pub table_headers: Vec<String>,
    pub excerpt: String,
}

fn sel(css: &str) -> Selector {
    Selector::parse(css).unwrap()
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shallow text: direct child text nodes only, skipping nested markup.
fn shallow_text(el: &ElementRef) -> String {
    el.children()
        .filter_map(|child| child.value().as_text().map(|t| t.to_string()))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn underscore_slug(text: &str) -> String {
    heuristics::slugify(text).replace('-', "_")
}

/// Stable-ish CSS selector for an element: id, data-testid, name, first
/// class, positional fallback.
fn css_for(el: &ElementRef, tag: &str, position: usize) -> String {
    let v = el.value();
    if let Some(id) = v.attr("id")
        && !id.is_empty()
    {
        return format!("#{}", id);
    }
    if let Some(testid) = v.attr("data-testid") {
        return format!("[data-testid='{}']", testid);
    }
    if let Some(name) = v.attr("name")
        && !name.is_empty()
    {
        return format!("{}[name='{}']", tag, name);
    }
    if let Some(class) = v.attr("class")
        && let Some(first) = class.split_whitespace().next()
    {
        return format!("{}.{}", tag, first);
    }
    format!("{}:nth-of-type({})", tag, position)
}

pub fn extract_page(html: &str) -> ExtractedPage {
    let doc = Html::parse_document(html);
    let mut page = ExtractedPage::default();

    page.title = doc
        .select(&sel("title"))
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty());

    for header in doc.select(&sel("h1, h2, h3")) {
        let text = element_text(&header);
        if !text.is_empty() && page.headers.len() < 10 {
            page.headers.push(text);
        }
    }

    extract_forms(&doc, &mut page);
    extract_buttons(&doc, &mut page);
    extract_lists(&doc, &mut page);
    extract_tables(&doc, &mut page);

    for anchor in doc.select(&sel("a[href]")) {
        if let Some(href) = anchor.value().attr("href") {
            page.anchors.push(AnchorInfo {
                href: href.to_string(),
                text: element_text(&anchor),
            });
        }
    }

    if let Some(body) = doc.select(&sel("body")).next() {
        let text = element_text(&body);
        page.excerpt = text.chars().take(300).collect();
    }

    page
}

fn extract_forms(doc: &Html, page: &mut ExtractedPage) {
    for (i, form) in doc.select(&sel("form")).enumerate() {
        let form_selector = css_for(&form, "form", i + 1);
        let mut fields = Vec::new();

        for (j, input) in form.select(&sel("input, textarea, select")).enumerate() {
            let tag = input.value().name().to_string();
            let input_kind = match tag.as_str() {
                "input" => input.value().attr("type").unwrap_or("text").to_string(),
                other => other.to_string(),
            };
            if matches!(input_kind.as_str(), "hidden" | "submit" | "button") {
                continue;
            }
            let name = input
                .value()
                .attr("name")
                .or_else(|| input.value().attr("id"))
                .unwrap_or_default()
                .to_string();
            let selector = if let Some(n) = input.value().attr("name") {
                format!("{} [name='{}']", form_selector, n)
            } else {
                css_for(&input, &tag, j + 1)
            };
            if !name.is_empty() {
                page.form_field_names.push(name.clone());
            }
            fields.push(Field {
                name,
                input_kind,
                selector,
                tag,
            });
        }

        let role = role_for_form(&form, &fields);
        let mut component = Component::new(ComponentKind::Form, role, form_selector);
        component.fields = fields;
        page.components.push(component);
    }
}

fn role_for_form(form: &ElementRef, fields: &[Field]) -> String {
    if fields.iter().any(|f| f.input_kind == "password") {
        return "login_form".to_string();
    }
    if fields
        .iter()
        .any(|f| f.name.to_lowercase().contains("search"))
    {
        return "search_form".to_string();
    }
    let hint = form
        .value()
        .attr("id")
        .or_else(|| form.value().attr("name"))
        .or_else(|| form.value().attr("class"))
        .unwrap_or_default();
    if !hint.is_empty() {
        let slug = underscore_slug(hint.split_whitespace().next().unwrap_or(hint));
        if slug != "page" {
            return ensure_suffix(&slug, "_form");
        }
    }
    match fields.first() {
        Some(first) if !first.name.is_empty() => {
            ensure_suffix(&underscore_slug(&first.name), "_form")
        }
        _ => "form".to_string(),
    }
}

fn ensure_suffix(slug: &str, suffix: &str) -> String {
    if slug.ends_with(suffix.trim_start_matches('_')) {
        slug.to_string()
    } else {
        format!("{}{}", slug, suffix)
    }
}

fn extract_buttons(doc: &Html, page: &mut ExtractedPage) {
    let button_sel = sel("button, input[type='submit'], input[type='button'], [role='button']");
    for (i, button) in doc.select(&button_sel).enumerate() {
        let text = if button.value().name() == "input" {
            button.value().attr("value").unwrap_or_default().to_string()
        } else {
            element_text(&button)
        };
        let class_attr = button.value().attr("class").unwrap_or_default();
        let aria_label = button.value().attr("aria-label").unwrap_or_default();
        if heuristics::is_noise_button(&text, class_attr, aria_label) {
            continue;
        }

        let tag = button.value().name().to_string();
        let selector = css_for(&button, &tag, i + 1);
        let label = if text.is_empty() {
            aria_label
        } else {
            text.as_str()
        };
        let role = if label.is_empty() {
            "button".to_string()
        } else {
            ensure_suffix(&underscore_slug(label), "_button")
        };
        page.components
            .push(Component::new(ComponentKind::Button, role, selector));
    }
}

fn extract_lists(doc: &Html, page: &mut ExtractedPage) {
    let li = sel("li");
    for (i, list) in doc.select(&sel("ul, ol")).enumerate() {
        let class_attr = list.value().attr("class").unwrap_or_default().to_lowercase();
        // Navigation chrome, not data
        if ["nav", "menu", "breadcrumb", "pagination", "tab"]
            .iter()
            .any(|t| class_attr.contains(t))
        {
            continue;
        }
        if list.select(&li).count() < 2 {
            continue;
        }
        let tag = list.value().name().to_string();
        let selector = css_for(&list, &tag, i + 1);
        let hint = list.value().attr("id").unwrap_or(&class_attr);
        let role = if hint.is_empty() {
            "list".to_string()
        } else {
            ensure_suffix(
                &underscore_slug(hint.split_whitespace().next().unwrap_or(hint)),
                "_list",
            )
        };
        page.components
            .push(Component::new(ComponentKind::List, role, selector));
    }
}

fn extract_tables(doc: &Html, page: &mut ExtractedPage) {
    let th_sel = sel("th");
    for (i, table) in doc.select(&sel("table")).enumerate() {
        let table_selector = css_for(&table, "table", i + 1);
        let hint = table.value().attr("id").unwrap_or_default();
        let role = if hint.is_empty() {
            "data_table".to_string()
        } else {
            ensure_suffix(&underscore_slug(hint), "_table")
        };
        page.components
            .push(Component::new(ComponentKind::List, role, table_selector.clone()));

        for (col, th) in table.select(&th_sel).enumerate() {
            let header = column_header_text(&th, col);
            page.table_headers.push(header.clone());
            let selector = format!("{} th:nth-child({})", table_selector, col + 1);
            page.components.push(Component::new(
                ComponentKind::TableColumn,
                format!("column_{}", underscore_slug(&header)),
                selector,
            ));
        }
    }
}

/// Header cell text through several strategies: shallow text first (skips
/// sort glyphs in nested markup), full descendant text, title/aria-label
/// attributes, positional fallback.
fn column_header_text(th: &ElementRef, column_index: usize) -> String {
    let shallow = shallow_text(th);
    if !shallow.is_empty() {
        return shallow;
    }
    let full = element_text(th);
    if !full.is_empty() {
        return full;
    }
    if let Some(attr) = th
        .value()
        .attr("title")
        .or_else(|| th.value().attr("aria-label"))
        && !attr.is_empty()
    {
        return attr.to_string();
    }
    format!("column {}", column_index + 1)
}

/// Anchor hrefs present in `after` but not in `before`: links revealed by
/// a click.
pub fn diff_new_anchors(before: &[AnchorInfo], after: &[AnchorInfo]) -> Vec<AnchorInfo> {
    after
        .iter()
        .filter(|a| !before.iter().any(|b| b.href == a.href))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHOP_PAGE: &str = r#"
        <html><head><title>Catalog</title></head><body>
        <h1>Product Catalog</h1>
        <form id="add-product">
            <input type="text" name="title" />
            <input type="number" name="price" />
            <input type="hidden" name="csrf" value="x" />
            <button type="submit">Save</button>
        </form>
        <table id="products">
            <tr>
                <th><span class="sort-arrow">▲</span>Name</th>
                <th>Price</th>
                <th title="Stock level"><i class="icon"></i></th>
            </tr>
            <tr><td>Widget</td><td>$19.99</td><td>4</td></tr>
        </table>
        <ul class="pagination"><li>1</li><li>2</li></ul>
        <button class="page-link">2</button>
        <button id="delete-all" aria-label="Delete everything"></button>
        <a href="/products/7">Widget</a>
        <a href="/orders">Orders</a>
        </body></html>
    "#;

    #[test]
    fn test_form_extraction_with_fields() {
        let page = extract_page(SHOP_PAGE);
        let form = page
            .components
            .iter()
            .find(|c| c.kind == ComponentKind::Form)
            .unwrap();
        assert_eq!(form.selector, "#add-product");
        // hidden input excluded
        assert_eq!(form.fields.len(), 2);
        assert_eq!(form.fields[0].name, "title");
        assert_eq!(form.fields[1].input_kind, "number");
    }

    #[test]
    fn test_noise_buttons_filtered() {
        let page = extract_page(SHOP_PAGE);
        let buttons: Vec<&Component> = page
            .components
            .iter()
            .filter(|c| c.kind == ComponentKind::Button)
            .collect();
        // "Save" and the aria-labelled delete button survive; the
        // pagination button does not.
        assert_eq!(buttons.len(), 2);
        assert!(buttons.iter().any(|b| b.selector == "#delete-all"));
        assert!(!buttons.iter().any(|b| b.selector.contains("page-link")));
    }

    #[test]
    fn test_column_header_strategies() {
        let page = extract_page(SHOP_PAGE);
        // Shallow text skips the sort arrow; attribute fallback covers the
        // icon-only header.
        assert_eq!(
            page.table_headers,
            vec!["Name", "Price", "Stock level"]
        );
        let columns: Vec<&Component> = page
            .components
            .iter()
            .filter(|c| c.kind == ComponentKind::TableColumn)
            .collect();
        assert_eq!(columns.len(), 3);
        assert_eq!(columns[0].role, "column_name");
        assert_eq!(columns[0].selector, "#products th:nth-child(1)");
    }

    #[test]
    fn test_pagination_list_filtered() {
        let page = extract_page(SHOP_PAGE);
        assert!(
            !page
                .components
                .iter()
                .any(|c| c.kind == ComponentKind::List && c.selector.contains("pagination"))
        );
    }

    #[test]
    fn test_anchor_collection() {
        let page = extract_page(SHOP_PAGE);
        assert_eq!(page.anchors.len(), 2);
        assert_eq!(page.anchors[0].href, "/products/7");
    }

    #[test]
    fn test_login_form_role() {
        let html = r#"<form><input name="user" /><input type="password" name="pass" /></form>"#;
        let page = extract_page(html);
        assert_eq!(page.components[0].role, "login_form");
    }

    #[test]
    fn test_diff_new_anchors() {
        let before = vec![AnchorInfo {
            href: "/a".into(),
            text: "A".into(),
        }];
        let after = vec![
            AnchorInfo {
                href: "/a".into(),
                text: "A".into(),
            },
            AnchorInfo {
                href: "/b".into(),
                text: "B".into(),
            },
        ];
        let new = diff_new_anchors(&before, &after);
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].href, "/b");
    }
}
