//! Taxonomy Scanner: discovers a brand's category tree to pick crawl targets

mod node;
mod scanner;

pub use node::{node_id, NodeKind, TaxonomyNode, SYNTHETIC_ROOT_ID};
pub use scanner::TaxonomyScanner;
