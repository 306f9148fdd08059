// Tests for graph-path navigation with href fallbacks

use std::time::Duration;
use wayfarer_core::graph::GraphIndex;
use wayfarer_core::model::{Edge, Node, PageGraph};
use wayfarer_crawler::browser::BrowserSurface;
use wayfarer_crawler::scripted::{ClickEffect, ScriptedBrowser};
use wayfarer_runner::navigate::Navigator;

fn navigator<'a>(
    index: &'a GraphIndex,
    browser: &'a ScriptedBrowser,
) -> Navigator<'a> {
    Navigator::new(index, browser).with_edge_wait(Duration::from_millis(50))
}

fn graph_with_edge(selector: &str, href: Option<&str>) -> GraphIndex {
    GraphIndex::build(PageGraph {
        nodes: vec![
            Node::new("home", "/", "Home"),
            Node::new("orders", "/orders", "Order History"),
        ],
        edges: vec![Edge {
            from: "home".to_string(),
            to: "orders".to_string(),
            action: "navigate".to_string(),
            selector: selector.to_string(),
            description: String::new(),
            href: href.map(String::from),
            external: false,
        }],
    })
    .unwrap()
}

fn pages() -> ScriptedBrowser {
    ScriptedBrowser::new()
        .page(
            "/",
            r#"<html><body><a id="nav-orders" href="/orders">Orders</a></body></html>"#,
        )
        .page("/orders", "<html><body><h1>Order History</h1></body></html>")
}

#[tokio::test]
async fn test_path_execution_clicks_edge_selector() {
    let browser = pages().on_click("/", "#nav-orders", ClickEffect::navigate("/orders"));
    browser.goto("/").await.unwrap();

    let index = graph_with_edge("#nav-orders", None);
    let navigator = navigator(&index, &browser);

    let arrived = navigator.navigate_to(Some("home"), "orders").await.unwrap();
    assert_eq!(arrived, "orders");
    assert_eq!(browser.current_url().await.unwrap(), "/orders");
}

#[tokio::test]
async fn test_broken_selector_falls_back_to_embedded_href() {
    // The stored selector matches nothing, but carries an href.
    let browser = pages();
    browser.goto("/").await.unwrap();

    let index = graph_with_edge("a[href='/orders'].stale-class", None);
    let navigator = navigator(&index, &browser);

    let arrived = navigator.navigate_to(Some("home"), "orders").await.unwrap();
    assert_eq!(arrived, "orders");
    assert_eq!(browser.current_url().await.unwrap(), "/orders");
}

#[tokio::test]
async fn test_broken_selector_falls_back_to_edge_href() {
    let browser = pages();
    browser.goto("/").await.unwrap();

    let index = graph_with_edge("#long-gone", Some("/orders"));
    let navigator = navigator(&index, &browser);

    let arrived = navigator.navigate_to(Some("home"), "orders").await.unwrap();
    assert_eq!(arrived, "orders");
    assert_eq!(browser.current_url().await.unwrap(), "/orders");
}

#[tokio::test]
async fn test_no_path_uses_target_url_directly() {
    let browser = pages();
    browser.goto("/orders").await.unwrap();

    // No edge orders -> home exists; direct URL navigation covers it.
    let index = graph_with_edge("#nav-orders", None);
    let navigator = navigator(&index, &browser);

    let arrived = navigator.navigate_to(Some("orders"), "home").await.unwrap();
    assert_eq!(arrived, "home");
    assert_eq!(browser.current_url().await.unwrap(), "/");
}

#[tokio::test]
async fn test_unknown_target_is_an_error() {
    let browser = pages();
    browser.goto("/").await.unwrap();
    let index = graph_with_edge("#nav-orders", None);
    let navigator = navigator(&index, &browser);

    assert!(
        navigator
            .navigate_to(Some("home"), "zzz-unrelated-qqq")
            .await
            .is_err()
    );
}

#[tokio::test]
async fn test_free_text_target_resolution() {
    let browser = pages().on_click("/", "#nav-orders", ClickEffect::navigate("/orders"));
    browser.goto("/").await.unwrap();
    let index = graph_with_edge("#nav-orders", None);
    let navigator = navigator(&index, &browser);

    let arrived = navigator
        .navigate_to(Some("home"), "the order history page")
        .await
        .unwrap();
    assert_eq!(arrived, "orders");
}
