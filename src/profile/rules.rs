//! Extraction rules and their historical shapes
//!
//! Rules reach the engine as JSON (database) or TOML (configuration) in one
//! of several shapes accumulated over time. [`RawExtractionRules`] accepts
//! all of them and [`RawExtractionRules::migrate`] produces the single
//! in-memory [`ExtractionRules`] the extraction engine works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current rules document version
pub const RULES_VERSION: u32 = 2;

/// Logical kind of resource a URL template produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Web,
    Image,
    Pdf,
    Cad,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Cad => "cad",
        }
    }
}

/// How a selector target turns matched elements into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStrategy {
    Text,
    Attribute,
    Html,
}

/// One field of a declarative selector recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorTarget {
    pub selector: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExtractStrategy>,

    /// Keep only values containing one of these substrings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<String>,

    /// Drop values containing any of these substrings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
}

impl SelectorTarget {
    /// Attribute targets are inferred when an attribute is named or the
    /// field holds URLs
    pub fn effective_strategy(&self, field: &str) -> ExtractStrategy {
        match (self.strategy, &self.attribute) {
            (Some(strategy), _) => strategy,
            (None, Some(_)) => ExtractStrategy::Attribute,
            (None, None) if is_url_field(field) => ExtractStrategy::Attribute,
            (None, None) => ExtractStrategy::Text,
        }
    }

    /// Attribute to read, defaulting to `src` for image fields and `href` otherwise
    pub fn effective_attribute(&self, field: &str) -> String {
        match &self.attribute {
            Some(attr) => attr.clone(),
            None if is_image_field(field) => "src".to_string(),
            None => "href".to_string(),
        }
    }

    /// Applies the include/exclude substring filters
    pub fn accepts(&self, value: &str) -> bool {
        if self.excludes.iter().any(|e| value.contains(e.as_str())) {
            return false;
        }
        self.includes.is_empty() || self.includes.iter().any(|i| value.contains(i.as_str()))
    }
}

/// Returns true for recipe fields holding image URLs
pub fn is_image_field(field: &str) -> bool {
    matches!(field, "image" | "hero_image" | "gallery" | "images")
}

/// Returns true for recipe fields whose values are URLs
pub fn is_url_field(field: &str) -> bool {
    is_image_field(field) || field == "files"
}

/// Field name -> selector target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorRecipe {
    #[serde(default)]
    pub targets: BTreeMap<String, SelectorTarget>,
}

impl SelectorRecipe {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn target(&self, field: &str) -> Option<&SelectorTarget> {
        self.targets.get(field)
    }
}

/// The single current in-memory shape of a profile's extraction rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRules {
    pub version: u32,

    #[serde(default)]
    pub patterns: BTreeMap<TargetKind, String>,

    #[serde(default)]
    pub recipe: SelectorRecipe,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            version: RULES_VERSION,
            patterns: BTreeMap::new(),
            recipe: SelectorRecipe::default(),
        }
    }
}

impl ExtractionRules {
    /// Learned URL template for a target kind, if any
    pub fn pattern_for(&self, kind: TargetKind) -> Option<&str> {
        self.patterns.get(&kind).map(String::as_str)
    }

    /// Parses stored rules JSON in any historical shape
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawExtractionRules = serde_json::from_str(json)?;
        Ok(raw.migrate())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A template given either as a bare string or as `{ template = "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TemplateRef {
    Plain(String),
    Object { template: String },
}

impl TemplateRef {
    fn into_template(self) -> String {
        match self {
            Self::Plain(template) | Self::Object { template } => template,
        }
    }
}

/// Every shape extraction rules have been stored in
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawExtractionRules {
    /// Already in the current shape
    Current(ExtractionRules),

    /// `{ targets: {...}, patterns?: {...} }`
    FullSelectorRecipe {
        targets: BTreeMap<String, SelectorTarget>,
        #[serde(default)]
        patterns: BTreeMap<TargetKind, TemplateRef>,
    },

    /// `{ patterns: { web: { template }, pdf: ... } }`
    PatternsByTargetKind {
        patterns: BTreeMap<TargetKind, TemplateRef>,
    },

    /// `{ url_pattern_template: "..." }`, a single web template
    LegacySingleTemplate { url_pattern_template: String },
}

impl RawExtractionRules {
    /// Converts any stored shape into the current one
    pub fn migrate(self) -> ExtractionRules {
        match self {
            Self::Current(mut rules) => {
                rules.version = RULES_VERSION;
                rules
            }
            Self::FullSelectorRecipe { targets, patterns } => ExtractionRules {
                version: RULES_VERSION,
                patterns: flatten_patterns(patterns),
                recipe: SelectorRecipe { targets },
            },
            Self::PatternsByTargetKind { patterns } => ExtractionRules {
                version: RULES_VERSION,
                patterns: flatten_patterns(patterns),
                recipe: SelectorRecipe::default(),
            },
            Self::LegacySingleTemplate {
                url_pattern_template,
            } => {
                let mut patterns = BTreeMap::new();
                if !url_pattern_template.trim().is_empty() {
                    patterns.insert(TargetKind::Web, url_pattern_template);
                }
                ExtractionRules {
                    version: RULES_VERSION,
                    patterns,
                    recipe: SelectorRecipe::default(),
                }
            }
        }
    }
}

fn flatten_patterns(patterns: BTreeMap<TargetKind, TemplateRef>) -> BTreeMap<TargetKind, String> {
    patterns
        .into_iter()
        .map(|(kind, template)| (kind, template.into_template()))
        .filter(|(_, template)| !template.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_legacy_single_template() {
        let rules =
            ExtractionRules::from_json(r#"{"url_pattern_template":"https://x.com/p/{code}"}"#)
                .unwrap();
        assert_eq!(rules.version, RULES_VERSION);
        assert_eq!(rules.pattern_for(TargetKind::Web), Some("https://x.com/p/{code}"));
        assert!(rules.recipe.is_empty());
    }

    #[test]
    fn test_migrate_patterns_by_kind() {
        let rules = ExtractionRules::from_json(
            r#"{"patterns":{"web":{"template":"https://x.com/{code}"},"pdf":"https://x.com/{code}.pdf"}}"#,
        )
        .unwrap();
        assert_eq!(rules.pattern_for(TargetKind::Web), Some("https://x.com/{code}"));
        assert_eq!(rules.pattern_for(TargetKind::Pdf), Some("https://x.com/{code}.pdf"));
        assert_eq!(rules.pattern_for(TargetKind::Cad), None);
    }

    #[test]
    fn test_migrate_full_recipe() {
        let rules = ExtractionRules::from_json(
            r#"{"targets":{"name":{"selector":"h1.title"},"image":{"selector":".hero img","excludes":["placeholder"]}}}"#,
        )
        .unwrap();
        let name = rules.recipe.target("name").unwrap();
        assert_eq!(name.effective_strategy("name"), ExtractStrategy::Text);

        let image = rules.recipe.target("image").unwrap();
        assert_eq!(image.effective_strategy("image"), ExtractStrategy::Attribute);
        assert_eq!(image.effective_attribute("image"), "src");
        assert!(!image.accepts("/img/placeholder.png"));
        assert!(image.accepts("/img/drill.png"));
    }

    #[test]
    fn test_current_shape_roundtrips() {
        let mut rules = ExtractionRules::default();
        rules
            .patterns
            .insert(TargetKind::Image, "https://cdn.x.com/{code_lower}.jpg".to_string());
        rules.recipe.targets.insert(
            "files".to_string(),
            SelectorTarget {
                selector: "a.download".to_string(),
                attribute: None,
                strategy: Some(ExtractStrategy::Attribute),
                includes: vec![".pdf".to_string()],
                excludes: vec![],
            },
        );

        let json = rules.to_json().unwrap();
        assert_eq!(ExtractionRules::from_json(&json).unwrap(), rules);
    }

    #[test]
    fn test_unknown_shape_is_rejected() {
        assert!(ExtractionRules::from_json(r#"{"foo":1}"#).is_err());
    }

    #[test]
    fn test_attribute_defaults() {
        let target = SelectorTarget {
            selector: "a".to_string(),
            attribute: None,
            strategy: Some(ExtractStrategy::Attribute),
            includes: vec![],
            excludes: vec![],
        };
        assert_eq!(target.effective_attribute("files"), "href");
        assert_eq!(target.effective_attribute("gallery"), "src");
    }
}
