use crate::pattern::template::{escape_braces, Placeholder, TokenField, TokenTransform};
use crate::pattern::{MatchedToken, SampleRow, UrlPattern};
use crate::{CatalogError, Result};
use std::collections::HashSet;
use url::Url;

/// Values shorter than this are too ambiguous to locate in a URL
const MIN_TOKEN_CHARS: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    start: usize,
    end: usize,
    field: TokenField,
    transform: TokenTransform,
}

impl Candidate {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn overlaps(&self, other: &Candidate) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Learns a URL template from one (sample row, example URL) pair
///
/// Every rendering of the row's values (raw, lower-cased, upper-cased,
/// slugified) is searched for in the example URL after its origin. Matches
/// are accepted longest first, then leftmost, then by field priority
/// (code before name), and never overlap. Each accepted match becomes a
/// placeholder named after its source field and rendering.
///
/// # Returns
///
/// * `Ok(UrlPattern)` - a template that reproduces `example_url` when the
///   sample's own values are substituted back
/// * `Err(CatalogError::NoTokenMatch)` - no value of the row occurs in the URL
pub fn detect(sample: &SampleRow, example_url: &str) -> Result<UrlPattern> {
    Url::parse(example_url)?;

    let scan_start = path_offset(example_url);
    let haystack = &example_url[scan_start..];

    let mut candidates = Vec::new();
    for (field, value) in sample.fields() {
        let value = value.trim();
        if value.chars().count() < MIN_TOKEN_CHARS {
            continue;
        }

        let mut seen = HashSet::new();
        for transform in TokenTransform::ALL {
            let needle = transform.render(value);
            if needle.chars().count() < MIN_TOKEN_CHARS || !seen.insert(needle.clone()) {
                continue;
            }
            for (idx, _) in haystack.match_indices(needle.as_str()) {
                candidates.push(Candidate {
                    start: scan_start + idx,
                    end: scan_start + idx + needle.len(),
                    field,
                    transform,
                });
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(a.start.cmp(&b.start))
            .then(a.field.cmp(&b.field))
            .then(a.transform.cmp(&b.transform))
    });

    let mut accepted: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if accepted.iter().all(|a| !a.overlaps(&candidate)) {
            accepted.push(candidate);
        }
    }

    if accepted.is_empty() {
        return Err(CatalogError::NoTokenMatch);
    }
    accepted.sort_by_key(|c| c.start);

    let mut template = String::with_capacity(example_url.len());
    let mut placeholders: Vec<String> = Vec::new();
    let mut matched_tokens = Vec::with_capacity(accepted.len());
    let mut cursor = 0;

    for candidate in &accepted {
        let placeholder = Placeholder::new(candidate.field, candidate.transform);
        let name = placeholder.name();

        template.push_str(&escape_braces(&example_url[cursor..candidate.start]));
        template.push_str(&placeholder.to_string());
        cursor = candidate.end;

        if !placeholders.contains(&name) {
            placeholders.push(name.clone());
        }
        matched_tokens.push(MatchedToken {
            token: name,
            literal: example_url[candidate.start..candidate.end].to_string(),
        });
    }
    template.push_str(&escape_braces(&example_url[cursor..]));

    tracing::debug!(
        template = %template,
        tokens = matched_tokens.len(),
        "detected URL pattern"
    );

    Ok(UrlPattern {
        template,
        placeholders,
        example_url: example_url.to_string(),
        matched_tokens,
    })
}

/// Byte offset where the path begins (just past `scheme://authority`)
fn path_offset(url: &str) -> usize {
    match url.find("://") {
        Some(scheme_end) => {
            let authority_start = scheme_end + 3;
            url[authority_start..]
                .find(|c| c == '/' || c == '?' || c == '#')
                .map(|i| authority_start + i)
                .unwrap_or(url.len())
        }
        None => 0,
    }
}
