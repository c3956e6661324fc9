//! Source descriptors and source-kind detection.
//!
//! A [`Source`] is the opaque input of an ingest: a file path, raw text, a
//! URL, or an in-memory byte stream. Detection maps a source to the
//! capability class of converter it needs, using the file extension and the
//! guessed MIME type.

use std::path::{Path, PathBuf};

/// An opaque ingest source.
#[derive(Debug, Clone)]
pub enum Source {
    /// A file on the local filesystem.
    File(PathBuf),

    /// Raw text, ingested as-is.
    Text(String),

    /// A URL to fetch before conversion.
    Url(String),

    /// An already-materialized byte stream.
    Stream {
        /// The raw bytes.
        data: Vec<u8>,
        /// Content type reported by the producer, if any.
        content_type: Option<String>,
    },
}

impl Source {
    /// Short human-readable description used in errors and payloads.
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.to_string_lossy().to_string(),
            Self::Text(_) => "<text>".to_string(),
            Self::Url(url) => url.clone(),
            Self::Stream { .. } => "<stream>".to_string(),
        }
    }
}

/// The capability class a source needs for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// UTF-8 text, markdown, source code: passthrough.
    Text,
    /// Raster images: needs vision captioning.
    Image,
    /// PDF documents: needs OCR.
    Pdf,
    /// Office documents: needs a document parser.
    Office,
    /// Audio streams: needs speech recognition.
    Audio,
    /// Video streams: needs speech recognition.
    Video,
    /// Anything else.
    Unknown,
}

impl SourceKind {
    /// Whether the built-in UTF-8 passthrough converter can handle this kind.
    pub fn is_text_like(&self) -> bool {
        matches!(self, Self::Text)
    }
}

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "tsv", "log", "json", "yaml", "yml", "toml", "xml",
    "html", "htm", "css", "js", "ts", "rs", "py", "go", "java", "c", "h", "cpp", "rb", "sh",
];

const OFFICE_EXTENSIONS: &[&str] = &["doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods"];

/// Detect the source kind of a path from its extension and MIME type.
pub fn detect_path_kind(path: &Path) -> SourceKind {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        return SourceKind::Text;
    }
    if OFFICE_EXTENSIONS.contains(&extension.as_str()) {
        return SourceKind::Office;
    }
    if extension == "pdf" {
        return SourceKind::Pdf;
    }

    let mime = mime_guess::from_path(path).first();
    match mime {
        Some(mime) => detect_mime_kind(mime.essence_str()),
        None => SourceKind::Unknown,
    }
}

/// Detect the source kind from a MIME essence string.
pub fn detect_mime_kind(mime: &str) -> SourceKind {
    let (top, sub) = mime.split_once('/').unwrap_or((mime, ""));
    match top {
        "text" => SourceKind::Text,
        "image" => SourceKind::Image,
        "audio" => SourceKind::Audio,
        "video" => SourceKind::Video,
        "application" => match sub {
            "pdf" => SourceKind::Pdf,
            "json" | "xml" | "javascript" | "x-sh" | "toml" | "yaml" => SourceKind::Text,
            _ if sub.contains("officedocument") || sub.contains("msword") => SourceKind::Office,
            _ => SourceKind::Unknown,
        },
        _ => SourceKind::Unknown,
    }
}

/// Detect the kind of an arbitrary source.
///
/// Text sources are always text-like; URLs and streams fall back to their
/// content-type hint, then to UTF-8 validity for streams.
pub fn detect_kind(source: &Source) -> SourceKind {
    match source {
        Source::File(path) => detect_path_kind(path),
        Source::Text(_) => SourceKind::Text,
        Source::Url(url) => detect_path_kind(Path::new(url.trim_end_matches('/'))),
        Source::Stream { data, content_type } => match content_type {
            Some(mime) => detect_mime_kind(mime),
            None if std::str::from_utf8(data).is_ok() => SourceKind::Text,
            None => SourceKind::Unknown,
        },
    }
}
