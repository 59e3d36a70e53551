use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Contacts ---

/// An address-book record as held by the source of truth. Contact ids are
/// unique within a tenant only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Contact {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// Tags trimmed, lowercased and deduplicated, in first-seen order.
    pub fn normalized_tags(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for tag in &self.tags {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !seen.contains(&tag) {
                seen.push(tag);
            }
        }
        seen
    }
}

// --- Enums ---

/// How strongly two contacts are believed to be related.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 3] = [
        ConfidenceTier::High,
        ConfidenceTier::Medium,
        ConfidenceTier::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "high",
            ConfidenceTier::Medium => "medium",
            ConfidenceTier::Low => "low",
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ConfidenceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(ConfidenceTier::High),
            "medium" => Ok(ConfidenceTier::Medium),
            "low" => Ok(ConfidenceTier::Low),
            other => Err(format!("unknown confidence tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMethod {
    Vector,
    Tags,
}

impl SimilarityMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityMethod::Vector => "vector",
            SimilarityMethod::Tags => "tags",
        }
    }
}

impl std::fmt::Display for SimilarityMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review state of a relationship. `AutoApproved` is only ever written on
/// HIGH-tier edges created by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    AutoApproved,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
            ReviewStatus::AutoApproved => "auto_approved",
        }
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted endpoints of an unordered contact pair.
pub type PairKey = (String, String);

pub fn pair_key(a: &str, b: &str) -> PairKey {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

// --- Graph edges ---

/// A SIMILARITY edge between two contacts of one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityEdge {
    pub source_id: String,
    pub target_id: String,
    pub score: f64,
    pub method: SimilarityMethod,
    pub tier: ConfidenceTier,
    #[serde(default)]
    pub shared_tags: Vec<String>,
    pub review_status: ReviewStatus,
}

impl SimilarityEdge {
    pub fn pair_key(&self) -> PairKey {
        pair_key(&self.source_id, &self.target_id)
    }
}

// --- LLM assessment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    SameCompany,
    FormerColleagues,
    IndustryPeers,
    SharedInterests,
    ProfessionalNetwork,
    Unclear,
}

impl ConnectionType {
    /// Parse a model-supplied label, falling back to `Unclear`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "same_company" => ConnectionType::SameCompany,
            "former_colleagues" => ConnectionType::FormerColleagues,
            "industry_peers" => ConnectionType::IndustryPeers,
            "shared_interests" => ConnectionType::SharedInterests,
            "professional_network" => ConnectionType::ProfessionalNetwork,
            _ => ConnectionType::Unclear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Approve,
    Reject,
    NeedsMoreInfo,
}

impl SuggestedAction {
    /// Parse a model-supplied label, falling back to `NeedsMoreInfo`.
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "approve" => SuggestedAction::Approve,
            "reject" => SuggestedAction::Reject,
            _ => SuggestedAction::NeedsMoreInfo,
        }
    }
}

/// Validated LLM explanation of a candidate relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmAssessment {
    pub explanation: String,
    pub connection_type: ConnectionType,
    /// 1..=10
    pub confidence: u8,
    pub suggested_action: SuggestedAction,
    pub assessed_at: DateTime<Utc>,
}

// --- Pending relationships ---

/// A discovered relationship held inside a discovery job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRelationship {
    pub source_id: String,
    pub target_id: String,
    pub method: SimilarityMethod,
    pub score: f64,
    pub tier: ConfidenceTier,
    pub review_status: ReviewStatus,
    #[serde(default)]
    pub shared_tags: Vec<String>,
    #[serde(default)]
    pub llm_assessment: Option<LlmAssessment>,
}

impl PendingRelationship {
    pub fn pair_key(&self) -> PairKey {
        pair_key(&self.source_id, &self.target_id)
    }

    /// Whether this entry describes the unordered pair (a, b).
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.source_id == a && self.target_id == b) || (self.source_id == b && self.target_id == a)
    }

    pub fn to_edge(&self, review_status: ReviewStatus) -> SimilarityEdge {
        SimilarityEdge {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            score: self.score,
            method: self.method,
            tier: self.tier,
            shared_tags: self.shared_tags.clone(),
            review_status,
        }
    }
}

/// Discovered relationships grouped by tier, each in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipBuckets {
    pub high: Vec<PendingRelationship>,
    pub medium: Vec<PendingRelationship>,
    pub low: Vec<PendingRelationship>,
}

impl RelationshipBuckets {
    pub fn bucket(&self, tier: ConfidenceTier) -> &Vec<PendingRelationship> {
        match tier {
            ConfidenceTier::High => &self.high,
            ConfidenceTier::Medium => &self.medium,
            ConfidenceTier::Low => &self.low,
        }
    }

    pub fn bucket_mut(&mut self, tier: ConfidenceTier) -> &mut Vec<PendingRelationship> {
        match tier {
            ConfidenceTier::High => &mut self.high,
            ConfidenceTier::Medium => &mut self.medium,
            ConfidenceTier::Low => &mut self.low,
        }
    }

    pub fn push(&mut self, relationship: PendingRelationship) {
        self.bucket_mut(relationship.tier).push(relationship);
    }

    pub fn counts(&self) -> RelationshipCounts {
        RelationshipCounts::new(self.high.len(), self.medium.len(), self.low.len())
    }

    /// Find the entry for an unordered pair in any tier.
    pub fn find_mut(&mut self, a: &str, b: &str) -> Option<&mut PendingRelationship> {
        self.high
            .iter_mut()
            .chain(self.medium.iter_mut())
            .chain(self.low.iter_mut())
            .find(|r| r.connects(a, b))
    }

    pub fn find(&self, a: &str, b: &str) -> Option<&PendingRelationship> {
        self.high
            .iter()
            .chain(self.medium.iter())
            .chain(self.low.iter())
            .find(|r| r.connects(a, b))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub total: usize,
}

impl RelationshipCounts {
    pub fn new(high: usize, medium: usize, low: usize) -> Self {
        Self {
            high,
            medium,
            low,
            total: high + medium + low,
        }
    }
}

// --- Discovery statistics ---

/// Contacts sharing a normalized company name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyGroup {
    pub company: String,
    pub contact_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub contacts_synced: usize,
    pub contacts_failed: usize,
    pub company_groups: Vec<CompanyGroup>,
    pub vector_processed: usize,
    pub vector_skipped: usize,
    pub edges_written: usize,
}

// --- Discovery jobs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Started => write!(f, "started"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One execution of the discovery pipeline for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryJob {
    pub id: String,
    pub tenant_id: String,
    pub status: JobStatus,
    /// 0..=100
    pub progress: u8,
    pub current_step: String,
    #[serde(default)]
    pub relationships: RelationshipBuckets,
    #[serde(default)]
    pub counts: RelationshipCounts,
    #[serde(default)]
    pub stats: Option<DiscoveryStats>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl DiscoveryJob {
    pub fn new(id: impl Into<String>, tenant_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            tenant_id: tenant_id.into(),
            status: JobStatus::Started,
            progress: 0,
            current_step: "Starting discovery".to_string(),
            relationships: RelationshipBuckets::default(),
            counts: RelationshipCounts::default(),
            stats: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(a: &str, b: &str, tier: ConfidenceTier) -> PendingRelationship {
        PendingRelationship {
            source_id: a.into(),
            target_id: b.into(),
            method: SimilarityMethod::Vector,
            score: 0.5,
            tier,
            review_status: ReviewStatus::Pending,
            shared_tags: vec![],
            llm_assessment: None,
        }
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key("b", "a"), pair_key("a", "b"));
        assert_eq!(pair_key("b", "a"), ("a".to_string(), "b".to_string()));
    }

    #[test]
    fn pair_key_keeps_ids_containing_separators_apart() {
        assert_ne!(pair_key("a|b", "c"), pair_key("a", "b|c"));
    }

    #[test]
    fn normalized_tags_dedupes_case_and_whitespace() {
        let mut c = Contact::new("1", "Ada");
        c.tags = vec![" Rust ".into(), "rust".into(), "".into(), "AI".into()];
        assert_eq!(c.normalized_tags(), vec!["rust".to_string(), "ai".to_string()]);
    }

    #[test]
    fn bucket_counts_total_is_sum_of_tiers() {
        let mut buckets = RelationshipBuckets::default();
        buckets.push(rel("a", "b", ConfidenceTier::High));
        buckets.push(rel("a", "c", ConfidenceTier::Medium));
        buckets.push(rel("a", "d", ConfidenceTier::Medium));
        buckets.push(rel("b", "d", ConfidenceTier::Low));
        let counts = buckets.counts();
        assert_eq!((counts.high, counts.medium, counts.low), (1, 2, 1));
        assert_eq!(counts.total, 4);
    }

    #[test]
    fn find_matches_either_direction() {
        let mut buckets = RelationshipBuckets::default();
        buckets.push(rel("a", "c", ConfidenceTier::Low));
        assert!(buckets.find("c", "a").is_some());
        assert!(buckets.find_mut("a", "c").is_some());
        assert!(buckets.find("a", "b").is_none());
    }

    #[test]
    fn lenient_enums_fall_back_to_safe_defaults() {
        assert_eq!(ConnectionType::parse_lenient("Same Company"), ConnectionType::SameCompany);
        assert_eq!(ConnectionType::parse_lenient("soulmates"), ConnectionType::Unclear);
        assert_eq!(SuggestedAction::parse_lenient("APPROVE"), SuggestedAction::Approve);
        assert_eq!(SuggestedAction::parse_lenient("maybe"), SuggestedAction::NeedsMoreInfo);
    }

    #[test]
    fn tiers_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&ConfidenceTier::Medium).unwrap(), "\"medium\"");
        assert_eq!(
            serde_json::to_string(&ReviewStatus::AutoApproved).unwrap(),
            "\"auto_approved\""
        );
        assert_eq!("HIGH".parse::<ConfidenceTier>().unwrap(), ConfidenceTier::High);
    }
}
