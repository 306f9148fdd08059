// Tests for the HTTP-backed browser surface against a mock server

use std::sync::Arc;
use wayfarer_core::reasoning::CannedReasoner;
use wayfarer_crawler::browser::BrowserSurface;
use wayfarer_crawler::crawler::DiscoveryCrawler;
use wayfarer_crawler::fetch::FetchBrowser;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn html_page(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_browser_navigation_and_log() {
    let server = MockServer::start().await;
    html_page(
        &server,
        "/",
        "<html><body><h1>Home</h1><a id='next' href='/about'>About</a></body></html>",
    )
    .await;
    html_page(&server, "/about", "<html><body><h2>About us</h2></body></html>").await;

    let browser = FetchBrowser::new().unwrap();
    browser.goto(&server.uri()).await.unwrap();

    assert!(browser.is_visible("h1").await.unwrap());
    assert_eq!(
        browser.text_of("#next").await.unwrap().as_deref(),
        Some("About")
    );

    // Anchor click navigates via its href.
    browser.click("#next").await.unwrap();
    assert!(browser.current_url().await.unwrap().ends_with("/about"));
    assert!(browser.is_visible("h2").await.unwrap());

    // Two document fetches, each a request/response pair.
    assert_eq!(browser.call_log().snapshot().len(), 4);
}

#[tokio::test]
async fn test_fetch_browser_records_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .set_body_string(r#"{"ok": true}"#),
        )
        .mount(&server)
        .await;

    let browser = FetchBrowser::new().unwrap();
    browser
        .goto(&format!("{}/api/ping", server.uri()))
        .await
        .unwrap();

    let responses = browser.call_log().responses_newest_first();
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body.as_ref().unwrap()["ok"], true);
}

#[tokio::test]
async fn test_discovery_crawl_over_http() {
    let server = MockServer::start().await;
    let base = server.uri();
    html_page(
        &server,
        "/",
        &format!(
            r#"<html><body><h1>Dashboard</h1>
            <a href="{base}/items">Items</a></body></html>"#
        ),
    )
    .await;
    html_page(
        &server,
        "/items",
        r#"<html><body><h1>Item List</h1>
        <a href="/items/1">One</a><a href="/items/2">Two</a></body></html>"#,
    )
    .await;
    html_page(&server, "/items/1", "<html><body><h1>Item Detail</h1></body></html>").await;
    html_page(&server, "/items/2", "<html><body><h1>Item Detail</h1></body></html>").await;

    let browser = Arc::new(FetchBrowser::new().unwrap());
    let crawler = DiscoveryCrawler::new(browser, Arc::new(CannedReasoner::new(vec![])))
        .with_max_depth(4)
        .with_probe_dynamic_links(false);

    let graph = crawler.crawl(&base).await.unwrap();

    assert_eq!(graph.nodes.len(), 3);
    let template = graph.nodes.iter().find(|n| n.is_template).unwrap();
    assert_eq!(template.url, "/items/{itemId}");
    graph.validate().unwrap();
}
