//! LLM-assisted relationship assessment.
//!
//! The assessor sees both contacts and the discovery provenance, and answers
//! with a small JSON object. Anything that does not parse is a
//! MalformedResponse; nothing is retried.

use std::fmt::Write as _;
use std::sync::Arc;

use ai_client::util::{strip_code_blocks, truncate_to_char_boundary};
use ai_client::ChatCompletion;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

use rapport_common::{
    ConnectionType, Contact, LlmAssessment, PendingRelationship, SimilarityMethod, SuggestedAction,
};

use crate::error::AssessmentError;

const MAX_NOTES_BYTES: usize = 500;

const SYSTEM_PROMPT: &str = "You review suspected professional relationships between two contacts \
in a person's address book. Judge whether the two people plausibly know each other or belong \
together, using only the information provided.

Respond with a single JSON object and nothing else:
{
  \"explanation\": \"one or two sentences\",
  \"connectionType\": \"same_company\" | \"former_colleagues\" | \"industry_peers\" | \"shared_interests\" | \"professional_network\" | \"unclear\",
  \"confidence\": integer from 1 (very unsure) to 10 (certain),
  \"suggestedAction\": \"approve\" | \"reject\" | \"needs_more_info\"
}";

/// Everything the assessor gets to see about a candidate relationship.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub source: Contact,
    pub target: Contact,
    pub relationship: PendingRelationship,
}

#[async_trait]
pub trait RelationshipAssessor: Send + Sync {
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmAssessment, AssessmentError>;
}

/// Assessor backed by a chat model.
pub struct ClaudeAssessor {
    llm: Arc<dyn ChatCompletion>,
}

impl ClaudeAssessor {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl RelationshipAssessor for ClaudeAssessor {
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmAssessment, AssessmentError> {
        let prompt = build_prompt(request);
        let raw = self
            .llm
            .chat_completion(SYSTEM_PROMPT, &prompt)
            .await
            .map_err(|e| AssessmentError::Llm(e.to_string()))?;

        match parse_assessment(&raw) {
            Ok(assessment) => {
                debug!(
                    source_id = request.relationship.source_id.as_str(),
                    target_id = request.relationship.target_id.as_str(),
                    confidence = assessment.confidence,
                    "Relationship assessed"
                );
                Ok(assessment)
            }
            Err(e) => {
                warn!(
                    source_id = request.relationship.source_id.as_str(),
                    target_id = request.relationship.target_id.as_str(),
                    response = truncate_to_char_boundary(&raw, 200),
                    "Unparseable assessment response"
                );
                Err(e)
            }
        }
    }
}

fn describe_contact(out: &mut String, label: &str, contact: &Contact) {
    let _ = writeln!(out, "{label}:");
    let _ = writeln!(out, "- Name: {}", contact.name);
    let field = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).unwrap_or("unknown").to_string();
    let _ = writeln!(out, "- Company: {}", field(&contact.company));
    let _ = writeln!(out, "- Job title: {}", field(&contact.job_title));
    let domain = contact
        .email
        .as_deref()
        .and_then(|e| e.rsplit_once('@'))
        .map(|(_, d)| d.to_string());
    let _ = writeln!(out, "- Email domain: {}", field(&domain));
    let tags = contact.normalized_tags();
    let _ = writeln!(
        out,
        "- Tags: {}",
        if tags.is_empty() { "none".to_string() } else { tags.join(", ") }
    );
    if let Some(notes) = contact.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = writeln!(out, "- Notes: {}", truncate_to_char_boundary(notes.trim(), MAX_NOTES_BYTES));
    }
}

pub fn build_prompt(request: &AssessmentRequest) -> String {
    let rel = &request.relationship;
    let mut out = String::new();
    describe_contact(&mut out, "Contact A", &request.source);
    out.push('\n');
    describe_contact(&mut out, "Contact B", &request.target);
    out.push('\n');

    let _ = writeln!(out, "Why they were matched:");
    match rel.method {
        SimilarityMethod::Vector => {
            let _ = writeln!(out, "- Profile similarity score {:.2} ({} confidence)", rel.score, rel.tier);
        }
        SimilarityMethod::Tags => {
            let _ = writeln!(
                out,
                "- {} shared tags: {} ({} confidence)",
                rel.shared_tags.len(),
                rel.shared_tags.join(", "),
                rel.tier
            );
        }
    }
    out.push_str("\nShould these two contacts be linked?");
    out
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAssessment {
    explanation: String,
    #[serde(alias = "connection_type")]
    connection_type: String,
    confidence: f64,
    #[serde(alias = "suggested_action")]
    suggested_action: String,
}

/// Parse and validate a model response. Confidence is clamped to 1..=10;
/// unknown labels fall back to `unclear` / `needs_more_info`.
pub fn parse_assessment(raw: &str) -> Result<LlmAssessment, AssessmentError> {
    let body = strip_code_blocks(raw);
    let parsed: RawAssessment =
        serde_json::from_str(body).map_err(|e| AssessmentError::MalformedResponse(e.to_string()))?;

    let explanation = parsed.explanation.trim();
    if explanation.is_empty() {
        return Err(AssessmentError::MalformedResponse("empty explanation".into()));
    }
    if !parsed.confidence.is_finite() {
        return Err(AssessmentError::MalformedResponse("confidence is not a number".into()));
    }

    Ok(LlmAssessment {
        explanation: explanation.to_string(),
        connection_type: ConnectionType::parse_lenient(&parsed.connection_type),
        confidence: parsed.confidence.round().clamp(1.0, 10.0) as u8,
        suggested_action: SuggestedAction::parse_lenient(&parsed.suggested_action),
        assessed_at: Utc::now(),
    })
}
