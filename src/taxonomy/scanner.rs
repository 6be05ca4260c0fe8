//! Taxonomy scanning
//!
//! A shallow scan visits only the root's direct category links, one fetch
//! per candidate. A deep scan recurses into every hub up to the depth cap.
//! Both share a per-scan visited set, so a category reachable through two
//! menus is fetched once and attached once.

use crate::config::TaxonomyConfig;
use crate::extract::{extract_navigation, name_from_url, LinkRef, NavigationLinks, PageClass};
use crate::fetcher::{FetchedPage, PageFetcher, SessionFetcher};
use crate::jobs::SessionGate;
use crate::taxonomy::{NodeKind, TaxonomyNode};
use crate::url::{canonical_string, canonicalize_url, extract_host};
use crate::Result;
use scraper::Html;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

type NodeFuture<'a> = Pin<Box<dyn Future<Output = TaxonomyNode> + Send + 'a>>;

/// Classification and links of one fetched page
struct PageAnalysis {
    class: PageClass,
    nav: NavigationLinks,
}

fn analyze(page: &FetchedPage, requested: &Url) -> PageAnalysis {
    let base = Url::parse(&page.final_url).unwrap_or_else(|_| requested.clone());
    let document = Html::parse_document(&page.html);
    let nav = extract_navigation(&document, &base);
    PageAnalysis {
        class: PageClass::from_navigation(&nav),
        nav,
    }
}

fn display_name(link: &LinkRef) -> String {
    let name = link.name.trim();
    if !name.is_empty() {
        return name.to_string();
    }
    Url::parse(&link.url)
        .map(|u| name_from_url(&u))
        .unwrap_or_else(|_| link.url.clone())
}

fn leaf_node(url: &str, name: &str, nav: &NavigationLinks) -> TaxonomyNode {
    let mut node = TaxonomyNode::for_url(url, name, NodeKind::ProductLeaf);
    node.product_urls = nav.product_links.iter().map(|l| l.url.clone()).collect();
    node.product_count = Some(node.product_urls.len() as u32);
    node
}

fn summed_count(children: &[TaxonomyNode]) -> Option<u32> {
    let counts: Vec<u32> = children.iter().filter_map(|c| c.product_count).collect();
    (!counts.is_empty()).then(|| counts.iter().sum())
}

/// Builds category trees by fetching and classifying pages
pub struct TaxonomyScanner {
    pages: SessionFetcher,
    config: TaxonomyConfig,
    auth_profile: Option<String>,
}

impl TaxonomyScanner {
    /// Creates a scanner with its own session gate and a single attempt per page
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: TaxonomyConfig) -> Self {
        Self::with_fetcher(SessionFetcher::new(fetcher, Arc::new(SessionGate::new())), config)
    }

    /// Creates a scanner on a configured [`SessionFetcher`], sharing its
    /// session gate, pool and retry budget
    pub fn with_fetcher(pages: SessionFetcher, config: TaxonomyConfig) -> Self {
        Self {
            pages,
            config,
            auth_profile: None,
        }
    }

    /// Scans inside a profile's authenticated session
    pub fn with_auth_profile(mut self, profile_id: Option<String>) -> Self {
        self.auth_profile = profile_id;
        self
    }

    /// Scans from `root_url`
    ///
    /// Returns the root page as a product leaf when it lists products
    /// directly; otherwise a synthetic `catalog` root wrapping the
    /// discovered categories.
    pub async fn scan(&self, root_url: &str, deep: bool) -> Result<TaxonomyNode> {
        let root = canonicalize_url(root_url)?;
        tracing::info!(url = %root, deep, "starting taxonomy scan");

        let page = self.fetch_page(root.as_str()).await?;
        let analysis = analyze(&page, &root);
        let root_name = extract_host(&root).unwrap_or_else(|| root.to_string());

        if analysis.class == PageClass::Leaf {
            return Ok(leaf_node(root.as_str(), &name_from_url(&root), &analysis.nav));
        }

        let mut visited = HashSet::new();
        visited.insert(root.to_string());

        let children = self.scan_children(&analysis.nav, 1, deep, &mut visited).await;
        let mut tree = TaxonomyNode::synthetic_root(&root_name);
        tree.product_count = summed_count(&children);
        for child in children {
            tree.attach(child);
        }

        tracing::info!(url = %root, nodes = tree.node_count(), "taxonomy scan finished");
        Ok(tree)
    }

    /// Lists a node's direct children by rescanning its page
    ///
    /// Ids derive from URLs, so expanding an unchanged page twice yields the
    /// same children. Grouping nodes without a URL have nothing to expand.
    pub async fn expand_node(&self, node: &TaxonomyNode) -> Result<Vec<TaxonomyNode>> {
        let Some(url) = node.url.as_deref() else {
            tracing::debug!(node = %node.id, "node has no URL, nothing to expand");
            return Ok(Vec::new());
        };
        if node.kind == NodeKind::ProductLeaf {
            return Ok(Vec::new());
        }

        let parsed = canonicalize_url(url)?;
        let page = self.fetch_page(parsed.as_str()).await?;
        let analysis = analyze(&page, &parsed);
        if analysis.class == PageClass::Leaf {
            return Ok(Vec::new());
        }

        let mut visited = HashSet::new();
        visited.insert(parsed.to_string());

        let depth = if node.kind == NodeKind::Catalog { 1 } else { 2 };
        let mut children = self.scan_children(&analysis.nav, depth, false, &mut visited).await;
        for child in children.iter_mut() {
            child.parent_id = Some(node.id.clone());
        }
        Ok(children)
    }

    async fn fetch_page(&self, url: &str) -> Result<FetchedPage> {
        self.pages.fetch(url, self.auth_profile.as_deref()).await
    }

    async fn scan_children(
        &self,
        nav: &NavigationLinks,
        depth: u32,
        deep: bool,
        visited: &mut HashSet<String>,
    ) -> Vec<TaxonomyNode> {
        let mut children = Vec::new();
        for link in &nav.category_links {
            if !deep && children.len() >= self.config.shallow_candidate_cap {
                tracing::debug!(cap = self.config.shallow_candidate_cap, "shallow candidate cap reached");
                break;
            }
            let canonical = canonical_string(&link.url);
            if !visited.insert(canonical.clone()) {
                continue;
            }
            let link = LinkRef {
                url: canonical,
                name: display_name(link),
            };
            children.push(self.build_node(link, depth, deep, visited).await);
        }
        children
    }

    fn build_node<'a>(
        &'a self,
        link: LinkRef,
        depth: u32,
        deep: bool,
        visited: &'a mut HashSet<String>,
    ) -> NodeFuture<'a> {
        Box::pin(async move {
            if deep && self.config.politeness_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.politeness_delay_ms)).await;
            }

            let requested = match Url::parse(&link.url) {
                Ok(u) => u,
                Err(_) => return TaxonomyNode::for_url(&link.url, &link.name, NodeKind::Collection),
            };
            let page = match self.fetch_page(&link.url).await {
                Ok(page) => page,
                Err(e) => {
                    tracing::warn!(url = %link.url, error = %e, "could not classify category page");
                    return TaxonomyNode::for_url(&link.url, &link.name, NodeKind::Collection);
                }
            };
            let analysis = analyze(&page, &requested);

            match analysis.class {
                PageClass::Leaf => leaf_node(&link.url, &link.name, &analysis.nav),
                PageClass::Unknown => TaxonomyNode::for_url(&link.url, &link.name, NodeKind::Collection),
                PageClass::Hub => {
                    let kind = if depth <= 1 {
                        NodeKind::Family
                    } else {
                        NodeKind::Collection
                    };
                    let mut node = TaxonomyNode::for_url(&link.url, &link.name, kind);
                    if deep && depth < self.config.max_depth {
                        let children = self.scan_children(&analysis.nav, depth + 1, deep, visited).await;
                        node.product_count = summed_count(&children);
                        for child in children {
                            node.attach(child);
                        }
                    }
                    node
                }
            }
        })
    }
}
