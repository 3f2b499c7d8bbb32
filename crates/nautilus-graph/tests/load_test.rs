use nautilus_graph::{EdgeSpec, NodeKind, NodeSpec, SceneGraph, SceneOptions};

#[test]
fn node_specs_deserialize_with_defaults() {
    let nodes: Vec<NodeSpec> = serde_json::from_str(
        r#"[
            {"id": "src", "kind": "container"},
            {"id": "src/lib.rs", "parent": "src", "x": 10.0, "y": 20.0, "width": 30.0, "height": 12.0}
        ]"#,
    )
    .unwrap();

    assert_eq!(nodes[0].kind, NodeKind::Container);
    assert_eq!(nodes[0].width, 40.0);
    assert_eq!(nodes[1].kind, NodeKind::Leaf);
    assert_eq!(nodes[1].parent.as_deref(), Some("src"));
}

#[test]
fn load_keeps_untrusted_references_for_later_healing() {
    let g = SceneGraph::load(
        SceneOptions::default(),
        vec![
            NodeSpec::container("a"),
            NodeSpec::leaf("b").in_parent("ghost"),
            NodeSpec::leaf("a"),
        ],
        vec![EdgeSpec::new("e1", "a", "b"), EdgeSpec::new("e2", "a", "nowhere")],
    );

    assert_eq!(g.node_count(), 2);
    assert_eq!(g.kind("a"), Some(NodeKind::Container));
    assert_eq!(g.parent("b"), Some("ghost"));
    assert!(g.roots().contains(&"a"));
    assert!(!g.roots().contains(&"b"));
    assert_eq!(g.edge_count(), 2);
    assert_eq!(g.edge_endpoints("e2"), Some(("a", "nowhere")));
}

#[test]
fn neighbors_skip_missing_nodes_and_duplicates() {
    let g = SceneGraph::load(
        SceneOptions::default(),
        vec![NodeSpec::leaf("a"), NodeSpec::leaf("b")],
        vec![
            EdgeSpec::new("e1", "a", "b"),
            EdgeSpec::new("e2", "b", "a"),
            EdgeSpec::new("e3", "a", "ghost"),
        ],
    );
    assert_eq!(g.neighbors("a"), vec!["b"]);
    assert_eq!(g.connected_edges("a").len(), 3);
}

#[test]
fn version_matches_cargo_pkg_version() {
    assert_eq!(nautilus_graph::VERSION, env!("CARGO_PKG_VERSION"));
}
