// End-to-end discovery tests against the scripted browser surface

use std::sync::Arc;
use wayfarer_core::model::ComponentKind;
use wayfarer_core::reasoning::CannedReasoner;
use wayfarer_crawler::crawler::DiscoveryCrawler;
use wayfarer_crawler::scripted::{ApiCall, ClickEffect, ScriptedBrowser};

fn silent_reasoner() -> Arc<CannedReasoner> {
    // No canned replies: labeling falls back to structural labels,
    // which keeps visit-order out of the assertions.
    Arc::new(CannedReasoner::new(vec![]))
}

fn shop_browser() -> ScriptedBrowser {
    ScriptedBrowser::new()
        .page(
            "/",
            r#"<html><head><title>Shop</title></head><body>
                <h1>Dashboard</h1>
                <a href="/products">Products</a>
                <a href="/orders">Orders</a>
            </body></html>"#,
        )
        .on_load_call("/", ApiCall::new("GET", "/api/dashboard", 200, None))
        .page(
            "/products",
            r#"<html><body>
                <h1>Product Catalog</h1>
                <a href="/products/7">Widget</a>
                <a href="/products/9">Gadget</a>
                <a href="/">Home</a>
            </body></html>"#,
        )
        .on_load_call("/products", ApiCall::new("GET", "/api/products", 200, None))
        .page(
            "/products/7",
            r#"<html><body><h1>Product Detail</h1></body></html>"#,
        )
        .on_load_call(
            "/products/7",
            ApiCall::new("GET", "/api/products/7", 200, None),
        )
        .page(
            "/products/9",
            r#"<html><body><h1>Product Detail</h1></body></html>"#,
        )
        .on_load_call(
            "/products/9",
            ApiCall::new("GET", "/api/products/9", 200, None),
        )
        .page(
            "/orders",
            r#"<html><body><h1>Order History</h1>
                <table id="orders"><tr><th>Customer</th><th>Total</th></tr>
                <tr><td>Acme</td><td>$12.00</td></tr></table>
            </body></html>"#,
        )
        .on_load_call("/orders", ApiCall::new("GET", "/api/orders", 200, None))
}

#[tokio::test]
async fn test_crawl_builds_deduplicated_graph() {
    let browser = Arc::new(shop_browser());
    let crawler = DiscoveryCrawler::new(browser, silent_reasoner()).with_max_depth(4);

    let graph = crawler.crawl("http://app.local/").await.unwrap();

    // /products/7 and /products/9 collapse into one template node.
    assert_eq!(graph.nodes.len(), 4);
    let template = graph
        .nodes
        .iter()
        .find(|n| n.is_template)
        .expect("template node discovered");
    assert_eq!(template.url, "/products/{productId}");
    assert_eq!(template.parameter_name.as_deref(), Some("productId"));
    // No concrete instance node survives alongside the template.
    assert_eq!(
        graph
            .nodes
            .iter()
            .filter(|n| n.url.starts_with("/products/"))
            .count(),
        1
    );

    // Both product links resolve to edges into the template.
    let products = graph.nodes.iter().find(|n| n.url == "/products").unwrap();
    let into_template: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.from == products.id && e.to == template.id)
        .collect();
    assert_eq!(into_template.len(), 2);

    graph.validate().unwrap();
}

#[tokio::test]
async fn test_crawl_records_active_apis_per_page() {
    let browser = Arc::new(shop_browser());
    let crawler = DiscoveryCrawler::new(browser, silent_reasoner()).with_max_depth(4);

    let graph = crawler.crawl("http://app.local/").await.unwrap();

    let orders = graph.nodes.iter().find(|n| n.url == "/orders").unwrap();
    assert_eq!(orders.active_apis, vec!["GET /api/orders"]);
    assert_eq!(orders.primary_entity.as_deref(), Some("order"));

    let template = graph.nodes.iter().find(|n| n.is_template).unwrap();
    assert_eq!(template.active_apis, vec!["GET /api/products/{productId}"]);
}

#[tokio::test]
async fn test_crawl_attributes_get_calls_to_lists() {
    let browser = Arc::new(shop_browser());
    let crawler = DiscoveryCrawler::new(browser, silent_reasoner()).with_max_depth(4);

    let graph = crawler.crawl("http://app.local/").await.unwrap();
    let orders = graph.nodes.iter().find(|n| n.url == "/orders").unwrap();
    let table = orders
        .components
        .iter()
        .find(|c| c.kind == ComponentKind::List)
        .unwrap();
    assert_eq!(table.triggers_api, vec!["GET /api/orders"]);

    // Column headers never claim API calls.
    let column = orders
        .components
        .iter()
        .find(|c| c.kind == ComponentKind::TableColumn)
        .unwrap();
    assert!(column.triggers_api.is_empty());
}

#[tokio::test]
async fn test_depth_limit_prunes_traversal() {
    let browser = Arc::new(shop_browser());
    let crawler = DiscoveryCrawler::new(browser, silent_reasoner()).with_max_depth(1);

    let graph = crawler.crawl("http://app.local/").await.unwrap();
    // Only the start page fits within depth 1.
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].url, "/");
}

#[tokio::test]
async fn test_dynamic_links_found_by_reveal_click() {
    let browser = Arc::new(
        ScriptedBrowser::new()
            .page(
                "/",
                r#"<html><body><h1>Workbench</h1>
                    <button id="tools">Show tools</button>
                </body></html>"#,
            )
            .on_click(
                "/",
                "#tools",
                ClickEffect::reveal(
                    r#"<html><body><h1>Workbench</h1>
                        <button id="tools">Show tools</button>
                        <a href="/admin">Admin</a>
                    </body></html>"#,
                ),
            )
            .page("/admin", "<html><body><h1>Admin Panel</h1></body></html>"),
    );
    let crawler = DiscoveryCrawler::new(browser, silent_reasoner()).with_max_depth(3);

    let graph = crawler.crawl("http://app.local/").await.unwrap();
    assert!(graph.nodes.iter().any(|n| n.url == "/admin"));
    let edge = graph.edges.iter().find(|e| e.to != "workbench").unwrap();
    assert_eq!(edge.selector, "a[href='/admin']");
}

#[tokio::test]
async fn test_speculative_form_discovery_requires_opt_in() {
    let page_html = r#"<html><body><h1>Customers</h1>
        <button id="add-customer">Add customer</button>
    </body></html>"#;
    let revealed = r#"<html><body><h1>Customers</h1>
        <button id="add-customer">Add customer</button>
        <form id="customer-form">
            <input type="text" name="name" />
            <input type="email" name="email" />
            <button type="submit">Save</button>
        </form>
    </body></html>"#;

    let build = || {
        ScriptedBrowser::new()
            .page("/customers", page_html)
            .on_click("/customers", "#add-customer", ClickEffect::reveal(revealed))
            .on_click(
                "/customers",
                "#customer-form [type='submit']",
                ClickEffect::default().with_call(ApiCall::new("POST", "/api/customers", 201, None)),
            )
    };

    // Default: no side effects, the revealed form is not submitted.
    let browser = Arc::new(build());
    let crawler = DiscoveryCrawler::new(browser.clone(), silent_reasoner());
    let graph = crawler.crawl("http://app.local/customers").await.unwrap();
    let node = &graph.nodes[0];
    assert!(
        !node
            .components
            .iter()
            .any(|c| c.kind == ComponentKind::Form)
    );
    assert!(browser.fills().is_empty());

    // Opted in: form discovered, filled, submitted; the POST attaches to
    // both the button and the form.
    let browser = Arc::new(build());
    let crawler =
        DiscoveryCrawler::new(browser.clone(), silent_reasoner()).with_side_effects(true);
    let graph = crawler.crawl("http://app.local/customers").await.unwrap();
    let node = &graph.nodes[0];

    let form = node
        .components
        .iter()
        .find(|c| c.kind == ComponentKind::Form)
        .expect("revealed form recorded");
    assert!(form.triggers_api.contains(&"POST /api/customers".to_string()));

    let button = node
        .components
        .iter()
        .find(|c| c.selector == "#add-customer")
        .unwrap();
    assert!(button.triggers_api.contains(&"POST /api/customers".to_string()));

    let fills = browser.fills();
    assert_eq!(fills.len(), 2);
    assert!(fills.iter().any(|(_, v)| v == "qa.wayfarer@example.com"));
}
