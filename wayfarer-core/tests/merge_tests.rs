// Tests for template merging across the whole graph artifact

use wayfarer_core::model::{Component, ComponentKind, Edge, Node, PageGraph};
use wayfarer_core::routes::merge_graph;

fn nav_edge(from: &str, to: &str, selector: &str) -> Edge {
    Edge {
        from: from.to_string(),
        to: to.to_string(),
        action: "navigate".to_string(),
        selector: selector.to_string(),
        description: String::new(),
        href: None,
        external: false,
    }
}

fn instance_node(id: &str, url: &str, selectors: &[&str]) -> Node {
    let mut node = Node::new(id, url, "Product Detail");
    for selector in selectors {
        node.components.push(Component::new(
            ComponentKind::Button,
            "action_button",
            *selector,
        ));
    }
    node
}

#[test]
fn test_merge_collapses_template_instances() {
    let mut graph = PageGraph {
        nodes: vec![
            Node::new("products", "/products", "Products"),
            instance_node("product-7", "/products/7", &["#edit", "#delete"]),
            instance_node("product-9", "/products/9", &["#edit", "#share"]),
        ],
        edges: vec![
            nav_edge("products", "product-7", "a[href='/products/7']"),
            nav_edge("products", "product-9", "a[href='/products/9']"),
        ],
    };

    let report = merge_graph(&mut graph);
    assert_eq!(report.merged_nodes, 1);
    assert_eq!(graph.nodes.len(), 2);

    let template = graph.node("product-7").unwrap();
    assert!(template.is_template);
    assert_eq!(template.url, "/products/{productId}");
    assert_eq!(template.parameter_name.as_deref(), Some("productId"));
    assert!(template.display_label.ends_with("(template)"));

    // Component union by selector, no duplicates, first occurrence wins.
    let selectors: Vec<&str> = template
        .components
        .iter()
        .map(|c| c.selector.as_str())
        .collect();
    assert_eq!(selectors, vec!["#edit", "#delete", "#share"]);
}

#[test]
fn test_merge_rewrites_edges_to_surviving_id() {
    let mut graph = PageGraph {
        nodes: vec![
            Node::new("products", "/products", "Products"),
            instance_node("product-7", "/products/7", &[]),
            instance_node("product-9", "/products/9", &[]),
        ],
        edges: vec![
            nav_edge("products", "product-7", "a.item"),
            nav_edge("products", "product-9", "a.item"),
        ],
    };

    merge_graph(&mut graph);

    // Both edges now point at the template; identical edges deduplicate.
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].to, "product-7");
    graph.validate().unwrap();
}

#[test]
fn test_merge_unions_and_normalizes_active_apis() {
    let mut a = instance_node("product-3", "/products/3", &[]);
    a.active_apis = vec!["GET /api/products/3".to_string()];
    let mut b = instance_node("product-4", "/products/4", &[]);
    b.active_apis = vec![
        "GET /api/products/4".to_string(),
        "GET /api/reviews?product=4".to_string(),
    ];

    let mut graph = PageGraph {
        nodes: vec![a, b],
        edges: vec![],
    };
    merge_graph(&mut graph);

    let template = &graph.nodes[0];
    assert_eq!(
        template.active_apis,
        vec![
            "GET /api/products/{productId}".to_string(),
            "GET /api/reviews".to_string(),
        ]
    );
}

#[test]
fn test_merge_is_digit_invariant() {
    let mut g1 = PageGraph {
        nodes: vec![instance_node("p1", "/products/1", &[])],
        edges: vec![],
    };
    let mut g2 = PageGraph {
        nodes: vec![instance_node("p2", "/products/882611", &[])],
        edges: vec![],
    };
    merge_graph(&mut g1);
    merge_graph(&mut g2);
    assert_eq!(g1.nodes[0].url, g2.nodes[0].url);
}

#[test]
fn test_merge_leaves_concrete_nodes_alone() {
    let mut graph = PageGraph {
        nodes: vec![
            Node::new("home", "/", "Home"),
            Node::new("about", "/about", "About"),
        ],
        edges: vec![nav_edge("home", "about", "a[href='/about']")],
    };
    let report = merge_graph(&mut graph);
    assert_eq!(report.merged_nodes, 0);
    assert_eq!(graph.nodes.len(), 2);
    assert!(!graph.nodes[0].is_template);
}
