//! Downloadable file discovery

use crate::extract::links::resolve_link;
use crate::extract::text::{collapse_whitespace, element_text, selector, truncate_chars};
use scraper::Html;
use serde::{Deserialize, Serialize};
use url::Url;

/// Display name used when a link has neither text nor title
pub const FALLBACK_FILE_NAME: &str = "File";

const MAX_FILE_NAME_CHARS: usize = 100;

/// Extension family of a linked file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Document,
    Cad,
    Archive,
}

impl FileKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Cad => "cad",
            Self::Archive => "archive",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "document" => Some(Self::Document),
            "cad" => Some(Self::Cad),
            "archive" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Extension used when a download carries no usable file name
    pub fn default_extension(&self) -> &'static str {
        match self {
            Self::Document => "pdf",
            Self::Cad => "stp",
            Self::Archive => "zip",
        }
    }

    /// Classifies a bare extension (without dot)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Document),
            "dwg" | "dxf" | "stp" | "step" | "igs" | "iges" | "stl" => Some(Self::Cad),
            "zip" | "rar" | "7z" => Some(Self::Archive),
            _ => None,
        }
    }

    /// Classifies a URL by its path extension, falling back to query values
    /// such as `download.php?file=manual.pdf`
    pub fn from_url(url: &Url) -> Option<Self> {
        let from_path = url
            .path()
            .rsplit('/')
            .next()
            .and_then(|segment| segment.rsplit_once('.'))
            .and_then(|(_, ext)| Self::from_extension(ext));

        from_path.or_else(|| {
            url.query_pairs()
                .filter_map(|(_, v)| v.rsplit_once('.').and_then(|(_, ext)| Self::from_extension(ext)))
                .next()
        })
    }
}

/// A downloadable document, CAD model, or archive linked from a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub name: String,
    pub kind: FileKind,
}

/// Normalizes a visible label into a file display name
pub fn file_display_name(label: &str) -> String {
    let name = truncate_chars(&collapse_whitespace(label), MAX_FILE_NAME_CHARS);
    if name.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        name
    }
}

/// Adds a file, deduplicating by absolute URL
///
/// A later occurrence only replaces the name when the kept one is the fallback.
pub fn push_file(files: &mut Vec<FileRef>, file: FileRef) {
    match files.iter_mut().find(|f| f.url == file.url) {
        Some(existing) => {
            if existing.name == FALLBACK_FILE_NAME && file.name != FALLBACK_FILE_NAME {
                existing.name = file.name;
            }
        }
        None => files.push(file),
    }
}

/// Scans every hyperlink for document, CAD, and archive targets
pub fn discover_files(document: &Html, page_url: &Url) -> Vec<FileRef> {
    let mut files = Vec::new();
    let Some(sel) = selector("a[href]") else {
        return files;
    };

    for element in document.select(&sel) {
        let Some(url) = element
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, page_url))
        else {
            continue;
        };
        let Some(kind) = FileKind::from_url(&url) else {
            continue;
        };

        let mut label = element_text(&element);
        if label.is_empty() {
            label = element.value().attr("title").unwrap_or_default().to_string();
        }

        push_file(
            &mut files,
            FileRef {
                url: url.to_string(),
                name: file_display_name(&label),
                kind,
            },
        );
    }

    files
}
