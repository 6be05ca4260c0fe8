//! Taxonomy tree nodes

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Id of the synthetic root wrapping a scan's discovered children
pub const SYNTHETIC_ROOT_ID: &str = "root";

/// Structural role of a node in a brand's catalog tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Catalog,
    Family,
    Collection,
    ProductLeaf,
}

impl NodeKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Catalog => "catalog",
            Self::Family => "family",
            Self::Collection => "collection",
            Self::ProductLeaf => "product-leaf",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "catalog" => Some(Self::Catalog),
            "family" => Some(Self::Family),
            "collection" => Some(Self::Collection),
            "product-leaf" => Some(Self::ProductLeaf),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One category, family, collection, or product-leaf node
///
/// Leaves never hold structural children; their products are listed in
/// `product_urls`. A node without a URL is a grouping only and is never
/// crawl-selectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyNode {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    pub url: Option<String>,
    pub kind: NodeKind,
    pub product_count: Option<u32>,
    #[serde(default)]
    pub children: Vec<TaxonomyNode>,
    #[serde(default)]
    pub product_urls: Vec<String>,
}

impl TaxonomyNode {
    /// A node for a crawlable page; the id is derived from the URL so that
    /// rescanning the same page yields the same id
    pub fn for_url(url: &str, name: &str, kind: NodeKind) -> Self {
        Self {
            id: node_id(url),
            parent_id: None,
            name: name.to_string(),
            url: Some(url.to_string()),
            kind,
            product_count: None,
            children: Vec::new(),
            product_urls: Vec::new(),
        }
    }

    /// A URL-less `catalog` node wrapping discovered children
    pub fn synthetic_root(name: &str) -> Self {
        Self {
            id: SYNTHETIC_ROOT_ID.to_string(),
            parent_id: None,
            name: name.to_string(),
            url: None,
            kind: NodeKind::Catalog,
            product_count: None,
            children: Vec::new(),
            product_urls: Vec::new(),
        }
    }

    pub fn is_selectable(&self) -> bool {
        self.url.is_some()
    }

    pub fn is_synthetic(&self) -> bool {
        self.id == SYNTHETIC_ROOT_ID && self.url.is_none()
    }

    /// Appends a child, setting its parent id; leaves refuse children
    pub fn attach(&mut self, mut child: TaxonomyNode) -> bool {
        if self.kind == NodeKind::ProductLeaf {
            tracing::warn!(node = %self.id, child = %child.id, "refusing to attach a child to a product leaf");
            return false;
        }
        child.parent_id = Some(self.id.clone());
        self.children.push(child);
        true
    }

    /// Checks the leaf invariant across the whole subtree
    pub fn is_valid(&self) -> bool {
        let own = !(self.kind == NodeKind::ProductLeaf && !self.children.is_empty());
        own && self.children.iter().all(TaxonomyNode::is_valid)
    }

    /// Depth-first search by id
    pub fn find(&self, id: &str) -> Option<&TaxonomyNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut TaxonomyNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }

    /// Number of nodes in the subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(TaxonomyNode::node_count).sum::<usize>()
    }

    /// Unwraps a synthetic root holding exactly one child
    pub fn unwrap_single(self) -> TaxonomyNode {
        if !self.is_synthetic() || self.children.len() != 1 {
            return self;
        }
        let mut children = self.children;
        match children.pop() {
            Some(mut only) => {
                only.parent_id = None;
                only
            }
            None => TaxonomyNode::synthetic_root(&self.name),
        }
    }
}

/// Stable short id for a page URL
pub fn node_id(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..8])
}
