//! Pattern engine: learn a URL template from one annotated example and
//! expand it against lists of product codes
//!
//! # Example
//!
//! ```
//! use catalog_crawl::pattern::{apply, detect, SampleRow};
//!
//! let row = SampleRow::new("ABC123", "Drill");
//! let pattern = detect(&row, "https://x.com/p/abc123.html").unwrap();
//! assert_eq!(pattern.template, "https://x.com/p/{code_lower}.html");
//!
//! let urls = apply(&pattern, &["XYZ9"]).unwrap();
//! assert_eq!(urls, vec!["https://x.com/p/xyz9.html".to_string()]);
//! ```

mod apply;
mod detect;
mod template;

pub use apply::{apply, apply_template};
pub use detect::detect;
pub use template::{
    encode_value, escape_braces, parse_template, slugify, Placeholder, Segment, TokenField,
    TokenTransform,
};

use serde::{Deserialize, Serialize};

/// One annotated example row: the product's reference code and display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRow {
    pub code: String,
    #[serde(default)]
    pub name: String,
}

impl SampleRow {
    pub fn new(code: &str, name: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
        }
    }

    /// Field values in tie-break priority order
    pub(crate) fn fields(&self) -> [(TokenField, &str); 2] {
        [
            (TokenField::Code, self.code.as_str()),
            (TokenField::Name, self.name.as_str()),
        ]
    }
}

/// A placeholder occurrence and the literal text it replaced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedToken {
    pub token: String,
    pub literal: String,
}

/// A learned, reusable URL template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    pub template: String,
    /// Distinct placeholder names in order of first appearance
    pub placeholders: Vec<String>,
    pub example_url: String,
    /// One entry per replaced occurrence, left to right
    pub matched_tokens: Vec<MatchedToken>,
}

impl UrlPattern {
    /// Wraps a hand-written or stored template
    pub fn from_template(template: &str) -> Self {
        let mut placeholders: Vec<String> = Vec::new();
        for segment in parse_template(template) {
            if let Segment::Slot(placeholder) = segment {
                let name = placeholder.name();
                if !placeholders.contains(&name) {
                    placeholders.push(name);
                }
            }
        }

        Self {
            template: template.to_string(),
            placeholders,
            example_url: String::new(),
            matched_tokens: Vec::new(),
        }
    }

    pub fn has_code_placeholder(&self) -> bool {
        parse_template(&self.template)
            .iter()
            .any(|s| matches!(s, Segment::Slot(p) if p.field == TokenField::Code))
    }

    /// Literal recorded for a placeholder when the pattern was learned
    pub(crate) fn recorded_literal(&self, token: &str) -> Option<&str> {
        self.matched_tokens
            .iter()
            .find(|m| m.token == token)
            .map(|m| m.literal.as_str())
    }
}
