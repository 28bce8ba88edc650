//! Source loading and text extraction.

use crate::types::{Document, SourceMetadata};
use cyclecare_core::{AppError, AppResult};
use std::fs;
use std::path::Path;

/// Form feed; paginated exports use it as a page break.
const PAGE_BREAK: char = '\u{000C}';

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unsupported,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Documents found under a source location.
#[derive(Debug, Default)]
pub struct LoadedSources {
    pub documents: Vec<Document>,
    /// Files that were found but could not be read as text
    pub skipped_files: usize,
}

/// Load every supported file under `source` (a file or a directory).
///
/// Each page of a file becomes one document; files without page breaks
/// produce a single document with no page number. Hidden entries are
/// ignored and traversal order is sorted by file name.
///
/// # Errors
/// `AppError::Ingest` when `source` does not exist or a single-file source
/// cannot be read.
pub fn load_documents(source: &Path) -> AppResult<LoadedSources> {
    if !source.exists() {
        return Err(AppError::Ingest(format!(
            "Source not found: {:?}",
            source
        )));
    }

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source.display().to_string());
        let documents = parse_file(source, &name)?;
        return Ok(LoadedSources {
            documents,
            skipped_files: 0,
        });
    }

    let mut loaded = LoadedSources::default();

    let walker = walkdir::WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry: {}", e);
                loaded.skipped_files += 1;
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if ContentType::from_path(path) == ContentType::Unsupported {
            tracing::debug!("Ignoring unsupported file: {:?}", path);
            continue;
        }

        let name = path
            .strip_prefix(source)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        match parse_file(path, &name) {
            Ok(documents) => loaded.documents.extend(documents),
            Err(e) => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                loaded.skipped_files += 1;
            }
        }
    }

    tracing::info!(
        documents = loaded.documents.len(),
        skipped = loaded.skipped_files,
        "Loaded sources from {:?}",
        source
    );

    Ok(loaded)
}

/// Parse one file into per-page documents.
pub fn parse_file(path: &Path, source_name: &str) -> AppResult<Vec<Document>> {
    let content_type = ContentType::from_path(path);
    if content_type == ContentType::Unsupported {
        return Err(AppError::Ingest(format!(
            "Unsupported file type: {:?}",
            path
        )));
    }

    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Ingest(format!("Failed to read {:?}: {}", path, e)))?;

    if raw.contains('\0') {
        return Err(AppError::Ingest(format!("Binary content in {:?}", path)));
    }

    let section = match content_type {
        ContentType::Markdown => first_heading(&raw),
        _ => None,
    };

    let pages: Vec<&str> = raw.split(PAGE_BREAK).collect();
    let paginated = pages.len() > 1;

    let mut documents = Vec::new();
    for (index, page) in pages.into_iter().enumerate() {
        let text = match content_type {
            ContentType::Markdown => clean_markdown(page),
            ContentType::Html => clean_html(page),
            _ => page.trim().to_string(),
        };
        if text.is_empty() {
            continue;
        }

        let mut metadata = SourceMetadata::new(source_name);
        if paginated {
            metadata = metadata.with_page(index as u32 + 1);
        }
        if let Some(section) = &section {
            metadata = metadata.with_section(section.clone());
        }
        documents.push(Document::new(text, metadata));
    }

    Ok(documents)
}

fn first_heading(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| line.starts_with('#'))
        .map(|line| line.trim_start_matches('#').trim().to_string())
        .filter(|heading| !heading.is_empty())
}

/// Clean markdown by removing heading markers, rules and fences.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Strip tags, scripts and styles, then collapse whitespace.
fn clean_html(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    let mut skip_until: Option<&str> = None;

    for (i, ch) in text.char_indices() {
        let rest = &text[i..];

        if let Some(closing) = skip_until {
            if starts_with_ignore_case(rest, closing) {
                skip_until = None;
                in_tag = true;
            }
            continue;
        }

        match ch {
            '<' => {
                in_tag = true;
                if starts_with_ignore_case(rest, "<script") {
                    skip_until = Some("</script");
                } else if starts_with_ignore_case(rest, "<style") {
                    skip_until = Some("</style");
                }
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    result
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    haystack
        .get(..prefix.len())
        .map(|head| head.eq_ignore_ascii_case(prefix))
        .unwrap_or(false)
}
