//! Pattern detection and application through the public API

use catalog_crawl::{apply, detect, CatalogError, SampleRow, UrlPattern};

#[test]
fn test_detect_then_apply_reproduces_example() {
    let sample = SampleRow::new("ABC123", "Drill");
    let pattern = detect(&sample, "https://x.com/p/abc123.html").unwrap();
    assert_eq!(pattern.template, "https://x.com/p/{code_lower}.html");

    let urls = apply(&pattern, &["XYZ9"]).unwrap();
    assert_eq!(urls, vec!["https://x.com/p/xyz9.html".to_string()]);

    let again = apply(&pattern, &[sample.code.as_str()]).unwrap();
    assert_eq!(again[0], "https://x.com/p/abc123.html");
}

#[test]
fn test_detect_code_and_name_slug() {
    let sample = SampleRow::new("HX-200", "Hammer Drill");
    let url = "https://shop.example.com/tools/hammer-drill/HX-200";
    let pattern = detect(&sample, url).unwrap();

    assert!(pattern.template.contains("{code}"));
    assert_eq!(apply(&pattern, &[sample.code.as_str()]).unwrap()[0], url);
}

#[test]
fn test_detect_without_match_fails() {
    let sample = SampleRow::new("QQ-1", "Nothing");
    let result = detect(&sample, "https://x.com/catalog/index.html");
    assert!(matches!(result, Err(CatalogError::NoTokenMatch)));
}

#[test]
fn test_apply_constant_template_fails() {
    let pattern = UrlPattern::from_template("https://x.com/catalog.html");
    let result = apply(&pattern, &["A1", "B2"]);
    assert!(matches!(
        result,
        Err(CatalogError::PatternNotParametrized { .. })
    ));
}
