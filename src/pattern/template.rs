//! Placeholder names and template parsing

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters left as-is when a raw value is substituted into a URL
const VALUE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Sample-row field a placeholder draws from, in tie-break priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenField {
    Code,
    Name,
}

/// Transformation applied to a field value before substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransform {
    Raw,
    Lower,
    Upper,
    Slug,
}

impl TokenTransform {
    pub const ALL: [TokenTransform; 4] = [Self::Raw, Self::Lower, Self::Upper, Self::Slug];

    /// Renders a value exactly as it appears inside a URL
    pub fn render(&self, value: &str) -> String {
        match self {
            Self::Raw => encode_value(value),
            Self::Lower => encode_value(&value.to_lowercase()),
            Self::Upper => encode_value(&value.to_uppercase()),
            Self::Slug => slugify(value),
        }
    }
}

/// A named slot in a template, e.g. `{code_lower}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placeholder {
    pub field: TokenField,
    pub transform: TokenTransform,
}

impl Placeholder {
    pub fn new(field: TokenField, transform: TokenTransform) -> Self {
        Self { field, transform }
    }

    pub fn name(&self) -> String {
        let field = match self.field {
            TokenField::Code => "code",
            TokenField::Name => "name",
        };
        match self.transform {
            TokenTransform::Raw => field.to_string(),
            TokenTransform::Lower => format!("{}_lower", field),
            TokenTransform::Upper => format!("{}_upper", field),
            TokenTransform::Slug => format!("{}_slug", field),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let (field, rest) = if let Some(rest) = name.strip_prefix("code") {
            (TokenField::Code, rest)
        } else if let Some(rest) = name.strip_prefix("name") {
            (TokenField::Name, rest)
        } else {
            return None;
        };

        let transform = match rest {
            "" => TokenTransform::Raw,
            "_lower" => TokenTransform::Lower,
            "_upper" => TokenTransform::Upper,
            "_slug" => TokenTransform::Slug,
            _ => return None,
        };

        Some(Self { field, transform })
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.name())
    }
}

/// A parsed piece of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Slot(Placeholder),
}

/// Splits a template into literal text and known placeholders
///
/// Braces that do not enclose a known placeholder name stay literal.
/// `{{` and `}}` are escapes for a literal `{` and `}`.
pub fn parse_template(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        literal.push_str(&unescape_braces(&rest[..open]));
        let after = &rest[open + 1..];
        if let Some(escaped) = after.strip_prefix('{') {
            literal.push('{');
            rest = escaped;
            continue;
        }

        let slot = after
            .find('}')
            .and_then(|close| Placeholder::parse(&after[..close]).map(|p| (p, close)));

        match slot {
            Some((placeholder, close)) => {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Slot(placeholder));
                rest = &after[close + 1..];
            }
            None => {
                literal.push('{');
                rest = after;
            }
        }
    }

    literal.push_str(&unescape_braces(rest));
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

/// Escapes braces so literal URL text never parses as a placeholder
pub fn escape_braces(text: &str) -> String {
    text.replace('{', "{{").replace('}', "}}")
}

fn unescape_braces(text: &str) -> String {
    text.replace("}}", "}")
}

/// Lowercases and replaces every run of non-alphanumerics with a single dash
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Percent-encodes a value for use inside a URL path or query
pub fn encode_value(value: &str) -> String {
    utf8_percent_encode(value, VALUE_ENCODE_SET).to_string()
}
