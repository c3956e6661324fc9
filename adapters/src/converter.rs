//! Source-to-text conversion capability.
//!
//! A converter turns an opaque [`Source`] into plain text plus conversion
//! metadata that ends up in the chunk payloads. Heavy conversions (OCR, ASR,
//! vision captioning, Office parsing) are external capabilities injected by
//! the caller; the built-in converter only handles UTF-8 text sources.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::fs;
use tracing::debug;

use crate::context::{OpContext, ProgressStage};
use crate::error::{AdapterError, Result};
use crate::source::{Source, detect_kind};

/// Output of a conversion: plain text plus metadata about how it was made.
#[derive(Debug, Clone, Default)]
pub struct Converted {
    /// The extracted plain text.
    pub text: String,

    /// Conversion metadata, merged into chunk payloads.
    pub metadata: Map<String, Value>,
}

/// Capability interface for source-to-text conversion.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name used in metadata and error context.
    fn name(&self) -> &str;

    /// Convert a source to plain text.
    async fn convert(&self, source: &Source, ctx: &OpContext) -> Result<Converted>;
}

/// UTF-8 passthrough converter for text-like sources.
#[derive(Debug, Clone, Default)]
pub struct PlainTextConverter;

impl PlainTextConverter {
    /// Create a new passthrough converter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Converter for PlainTextConverter {
    fn name(&self) -> &str {
        "utf8"
    }

    async fn convert(&self, source: &Source, ctx: &OpContext) -> Result<Converted> {
        ctx.started(ProgressStage::Converter);
        ctx.checkpoint()?;

        let text = match source {
            Source::Text(text) => text.clone(),
            Source::File(path) => fs::read_to_string(path).await?,
            Source::Stream { data, .. } => String::from_utf8(data.clone()).map_err(|_| {
                AdapterError::InvalidInput("stream is not valid UTF-8".to_string())
            })?,
            Source::Url(url) => {
                return Err(AdapterError::UnsupportedSource(format!(
                    "URL sources must be fetched before conversion: {url}"
                )));
            }
        };

        let mut metadata = Map::new();
        metadata.insert("converter".to_string(), Value::from(self.name()));
        metadata.insert("source".to_string(), Value::from(source.describe()));
        metadata.insert("bytes".to_string(), Value::from(text.len() as u64));

        debug!("converted {} ({} bytes)", source.describe(), text.len());
        ctx.completed(ProgressStage::Converter);

        Ok(Converted { text, metadata })
    }
}

/// Auto-detect a converter for the given source.
///
/// Only text-like sources have a built-in converter; every other capability
/// class (OCR, vision captioning, speech recognition, Office parsing) must be
/// injected explicitly, so detection returns `None` for them. Detection never
/// fabricates a capability it cannot satisfy.
pub fn detect_converter(source: &Source) -> Option<Arc<dyn Converter>> {
    if detect_kind(source).is_text_like() {
        Some(Arc::new(PlainTextConverter::new()))
    } else {
        None
    }
}
