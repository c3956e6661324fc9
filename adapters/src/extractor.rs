//! Entity and relationship extraction capability.
//!
//! An extractor maps a list of texts to one [`ExtractionResult`] per input,
//! order preserving. Node ids in a result are suggestions only; the graph
//! store assigns canonical ids when the results are persisted. Relationship
//! `start`/`end` reference suggested ids within the same result.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::{OpContext, ProgressStage, ProgressStatus};
use crate::error::Result;

/// An extracted entity candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedNode {
    /// Suggested identifier, unique within the owning result.
    pub id: String,

    /// Entity name as it appeared in the text.
    pub name: String,

    /// Entity type ("Person", "Organization", ...); may be empty.
    pub node_type: String,

    /// Short description of the entity.
    pub description: String,

    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f32,
}

/// An extracted relationship candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Suggested id of the start entity within the same result.
    pub start: String,

    /// Suggested id of the end entity within the same result.
    pub end: String,

    /// Relationship type ("WORKS_AT", "LIVES_IN", ...).
    pub rel_type: String,

    /// Short description of the relationship.
    pub description: String,

    /// Confidence score in `[0.0, 1.0]`.
    pub confidence: f32,

    /// Optional strength weight.
    pub weight: Option<f32>,
}

/// Extraction output for one input text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Extracted entity candidates.
    pub nodes: Vec<ExtractedNode>,

    /// Extracted relationship candidates.
    pub relationships: Vec<ExtractedRelationship>,

    /// Model or method that produced the extraction.
    pub model: String,
}

/// Capability interface for extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short name used in error context.
    fn name(&self) -> &str;

    /// Extract entities and relationships from each text.
    ///
    /// Returns exactly one result per input, in input order.
    async fn extract(&self, texts: &[String], ctx: &OpContext) -> Result<Vec<ExtractionResult>>;
}

/// Configuration for the pattern extractor.
#[derive(Debug, Clone)]
pub struct PatternExtractorConfig {
    /// Minimum confidence for emitted nodes.
    pub min_confidence: f32,

    /// Whether to match the known-technology lexicon.
    pub extract_technologies: bool,

    /// Whether to extract URLs and e-mail addresses.
    pub extract_contacts: bool,
}

impl Default for PatternExtractorConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            extract_technologies: true,
            extract_contacts: true,
        }
    }
}

/// Heuristic extractor using subject-verb-object patterns.
///
/// This is the built-in stand-in for an LLM-backed extractor: good enough for
/// structured prose and for exercising the full pipeline offline.
pub struct PatternExtractor {
    config: PatternExtractorConfig,
    verb_patterns: Vec<VerbPattern>,
    technologies: Vec<&'static str>,
}

struct VerbPattern {
    regex: regex_lite::Regex,
    rel_type: &'static str,
    subject_type: &'static str,
    object_type: &'static str,
}

const NAME: &str = r"([A-Z][A-Za-z0-9]*(?:\s+[A-Z][A-Za-z0-9]*)*)";

const VERB_TABLE: &[(&str, &str, &str, &str)] = &[
    (r"works?\s+(?:at|for)", "WORKS_AT", "Person", "Organization"),
    (r"lives?\s+in", "LIVES_IN", "Person", "Location"),
    (r"(?:is\s+)?located\s+in", "LOCATED_IN", "Organization", "Location"),
    (r"founded", "FOUNDED", "Person", "Organization"),
    (r"(?:was\s+)?created\s+by", "CREATED_BY", "", "Person"),
    (r"maintains?", "MAINTAINS", "Person", "Project"),
    (r"uses?", "USES", "", "Technology"),
    (r"depends?\s+on", "DEPENDS_ON", "", ""),
    (r"is\s+part\s+of", "PART_OF", "", ""),
];

const TECHNOLOGIES: &[&str] = &[
    "rust", "python", "javascript", "typescript", "java", "go", "kotlin", "swift", "tokio",
    "react", "django", "postgresql", "postgres", "mysql", "mongodb", "redis", "neo4j", "sqlite",
    "docker", "kubernetes", "kafka", "openai", "pytorch", "tensorflow",
];

impl PatternExtractor {
    /// Create an extractor with default configuration.
    pub fn new() -> Self {
        Self::with_config(PatternExtractorConfig::default())
    }

    /// Create an extractor with custom configuration.
    pub fn with_config(config: PatternExtractorConfig) -> Self {
        let verb_patterns = VERB_TABLE
            .iter()
            .filter_map(|(verb, rel_type, subject_type, object_type)| {
                let pattern = format!(r"{NAME}\s+{verb}\s+{NAME}");
                regex_lite::Regex::new(&pattern).ok().map(|regex| VerbPattern {
                    regex,
                    rel_type,
                    subject_type,
                    object_type,
                })
            })
            .collect();

        Self {
            config,
            verb_patterns,
            technologies: TECHNOLOGIES.to_vec(),
        }
    }

    /// Extract from a single text.
    fn extract_one(&self, text: &str) -> ExtractionResult {
        let mut nodes: HashMap<String, ExtractedNode> = HashMap::new();
        let mut relationships: Vec<ExtractedRelationship> = Vec::new();

        let intern =
            |nodes: &mut HashMap<String, ExtractedNode>, name: &str, node_type: &str, confidence: f32| {
                let id = suggest_id(name);
                nodes
                    .entry(id.clone())
                    .and_modify(|node| {
                        node.confidence = node.confidence.max(confidence);
                        if node.node_type.is_empty() {
                            node.node_type = node_type.to_string();
                        }
                    })
                    .or_insert_with(|| ExtractedNode {
                        id: id.clone(),
                        name: name.to_string(),
                        node_type: node_type.to_string(),
                        description: String::new(),
                        confidence,
                    });
                id
            };

        for pattern in &self.verb_patterns {
            for capture in pattern.regex.captures_iter(text) {
                let (Some(subject), Some(object)) = (capture.get(1), capture.get(2)) else {
                    continue;
                };
                let matched = capture.get(0).map(|m| m.as_str()).unwrap_or_default();

                let start = intern(&mut nodes, subject.as_str(), pattern.subject_type, 0.8);
                let end = intern(&mut nodes, object.as_str(), pattern.object_type, 0.8);
                if start == end {
                    continue;
                }

                relationships.push(ExtractedRelationship {
                    start,
                    end,
                    rel_type: pattern.rel_type.to_string(),
                    description: matched.trim().to_string(),
                    confidence: 0.8,
                    weight: None,
                });
            }
        }

        if self.config.extract_technologies {
            let lowered = text.to_lowercase();
            for tech in &self.technologies {
                let pattern = format!(r"\b{}\b", regex_lite::escape(tech));
                let Ok(regex) = regex_lite::Regex::new(&pattern) else {
                    continue;
                };
                if let Some(found) = regex.find(&lowered) {
                    let original = &text[found.start()..found.end()];
                    intern(&mut nodes, original, "Technology", 0.9);
                }
            }
        }

        if self.config.extract_contacts {
            for pattern in [
                (r"https?://[^\s)\]>]+", "Url"),
                (r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}", "Email"),
            ] {
                let Ok(regex) = regex_lite::Regex::new(pattern.0) else {
                    continue;
                };
                for found in regex.find_iter(text) {
                    let value = found.as_str().trim_end_matches(['.', ',']);
                    intern(&mut nodes, value, pattern.1, 1.0);
                }
            }
        }

        let mut nodes: Vec<ExtractedNode> = nodes
            .into_values()
            .filter(|node| node.confidence >= self.config.min_confidence)
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        // Drop relationships whose endpoints were filtered out.
        relationships.retain(|rel| {
            nodes.iter().any(|n| n.id == rel.start) && nodes.iter().any(|n| n.id == rel.end)
        });

        ExtractionResult {
            nodes,
            relationships,
            model: "pattern/v1".to_string(),
        }
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn extract(&self, texts: &[String], ctx: &OpContext) -> Result<Vec<ExtractionResult>> {
        ctx.started(ProgressStage::Extraction);

        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            ctx.checkpoint()?;
            results.push(self.extract_one(text));
            ctx.emit(
                ProgressStage::Extraction,
                ProgressStatus::Progress,
                Some((i + 1) as f32 / texts.len().max(1) as f32),
                None,
            );
        }

        ctx.completed(ProgressStage::Extraction);
        Ok(results)
    }
}

/// Suggested id for an entity name: lowercase, whitespace collapsed to `_`.
pub fn suggest_id(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}
