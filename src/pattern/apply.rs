use crate::pattern::template::{parse_template, Segment, TokenField};
use crate::pattern::UrlPattern;
use crate::{CatalogError, Result};

/// Expands a pattern against a list of codes
///
/// Pure substitution, no network I/O. Code placeholders receive each code
/// in the placeholder's rendering. Name placeholders are constant across
/// rows: they receive the literal recorded when the pattern was learned, or
/// an empty string for templates that carry no recorded literal.
///
/// # Returns
///
/// * `Ok(Vec<String>)` - one URL per input code, in input order
/// * `Err(CatalogError::PatternNotParametrized)` - the template has no code
///   placeholder and would emit the same URL for every code
pub fn apply<S: AsRef<str>>(pattern: &UrlPattern, codes: &[S]) -> Result<Vec<String>> {
    let segments = parse_template(&pattern.template);

    let parametrized = segments
        .iter()
        .any(|s| matches!(s, Segment::Slot(p) if p.field == TokenField::Code));
    if !parametrized {
        return Err(CatalogError::PatternNotParametrized {
            template: pattern.template.clone(),
        });
    }

    let urls = codes
        .iter()
        .map(|code| {
            let code = code.as_ref().trim();
            segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(text) => text.clone(),
                    Segment::Slot(p) if p.field == TokenField::Code => p.transform.render(code),
                    Segment::Slot(p) => pattern
                        .recorded_literal(&p.name())
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect::<String>()
        })
        .collect();

    Ok(urls)
}

/// Expands a bare template string, as stored in a profile's rules
pub fn apply_template<S: AsRef<str>>(template: &str, codes: &[S]) -> Result<Vec<String>> {
    apply(&UrlPattern::from_template(template), codes)
}
