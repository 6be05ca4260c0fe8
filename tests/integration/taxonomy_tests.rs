//! Taxonomy scans against a mock catalog site

use crate::{http_fetcher, mount_page};
use catalog_crawl::config::TaxonomyConfig;
use catalog_crawl::taxonomy::{NodeKind, TaxonomyNode, TaxonomyScanner};
use wiremock::MockServer;

fn scanner() -> TaxonomyScanner {
    TaxonomyScanner::new(
        http_fetcher(),
        TaxonomyConfig {
            max_depth: 4,
            shallow_candidate_cap: 40,
            politeness_delay_ms: 0,
        },
    )
}

/// Two families; "Garden" links back to "Tools" and shares "Saws"
async fn mount_site(server: &MockServer) {
    mount_page(
        server,
        "/",
        r#"<html><body><nav>
            <a href="/category/tools">Tools</a>
            <a href="/category/garden">Garden</a>
        </nav></body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/category/tools",
        r#"<html><body>
            <a href="/category/drills">Drills</a>
            <a href="/category/saws">Saws</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/category/garden",
        r#"<html><body>
            <a href="/category/saws">Saws</a>
            <a href="/category/tools">Tools</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/category/drills",
        r#"<html><body>
            <a href="/product/drill-one">Drill One</a>
            <a href="/product/drill-two">Drill Two</a>
        </body></html>"#,
    )
    .await;
    mount_page(
        server,
        "/category/saws",
        r#"<html><body><a href="/product/saw-one">Saw One</a></body></html>"#,
    )
    .await;
}

fn urls(node: &TaxonomyNode, out: &mut Vec<String>) {
    if let Some(url) = &node.url {
        out.push(url.clone());
    }
    for child in &node.children {
        urls(child, out);
    }
}

#[tokio::test]
async fn test_deep_scan_visits_each_category_once() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let tree = scanner().scan(&server.uri(), true).await.unwrap();
    assert!(tree.is_valid());
    assert_eq!(tree.kind, NodeKind::Catalog);
    assert_eq!(tree.children.len(), 2);

    let mut seen = Vec::new();
    urls(&tree, &mut seen);
    let saws = seen.iter().filter(|u| u.ends_with("/category/saws")).count();
    let tools = seen.iter().filter(|u| u.ends_with("/category/tools")).count();
    assert_eq!(saws, 1);
    assert_eq!(tools, 1);

    let tools = &tree.children[0];
    assert_eq!(tools.kind, NodeKind::Family);
    let drills = tools
        .children
        .iter()
        .find(|c| c.name == "Drills")
        .expect("drills attached under tools");
    assert_eq!(drills.kind, NodeKind::ProductLeaf);
    assert_eq!(drills.product_urls.len(), 2);
    assert_eq!(drills.product_count, Some(2));
}

#[tokio::test]
async fn test_shallow_scan_then_expand_is_idempotent() {
    let server = MockServer::start().await;
    mount_site(&server).await;
    let scanner = scanner();

    let tree = scanner.scan(&server.uri(), false).await.unwrap();
    assert_eq!(tree.children.len(), 2);
    assert!(tree.children.iter().all(|c| c.children.is_empty()));

    let tools = &tree.children[0];
    let first = scanner.expand_node(tools).await.unwrap();
    let second = scanner.expand_node(tools).await.unwrap();

    let triples = |nodes: &[TaxonomyNode]| -> Vec<(String, Option<String>, NodeKind)> {
        nodes
            .iter()
            .map(|n| (n.name.clone(), n.url.clone(), n.kind))
            .collect()
    };
    assert_eq!(triples(&first), triples(&second));
    assert_eq!(first.len(), 2);
    assert!(first.iter().all(|c| c.parent_id.as_deref() == Some(tools.id.as_str())));
}

#[tokio::test]
async fn test_leaf_root_is_returned_directly() {
    let server = MockServer::start().await;
    mount_page(&server, "/category/saws", r#"<a href="/product/saw-one">Saw One</a>"#).await;

    let root = format!("{}/category/saws", server.uri());
    let node = scanner().scan(&root, true).await.unwrap();
    assert_eq!(node.kind, NodeKind::ProductLeaf);
    assert_eq!(node.product_urls.len(), 1);
    assert!(node.children.is_empty());
}

#[tokio::test]
async fn test_unreachable_root_fails_scan() {
    let server = MockServer::start().await;
    let result = scanner().scan(&format!("{}/missing", server.uri()), false).await;
    assert!(result.is_err());
}
