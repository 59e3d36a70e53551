//! Confidence classification. Pure functions of the signal strength; the
//! thresholds are fixed and monotonic.

use rapport_common::ConfidenceTier;

pub const VECTOR_HIGH_THRESHOLD: f64 = 0.60;
pub const VECTOR_MEDIUM_THRESHOLD: f64 = 0.35;
pub const VECTOR_LOW_THRESHOLD: f64 = 0.20;

pub const TAGS_HIGH_THRESHOLD: usize = 4;
pub const TAGS_MEDIUM_THRESHOLD: usize = 3;
pub const TAGS_LOW_THRESHOLD: usize = 2;

/// Tier for a vector similarity score; `None` below the LOW threshold.
pub fn classify_score(score: f64) -> Option<ConfidenceTier> {
    if score >= VECTOR_HIGH_THRESHOLD {
        Some(ConfidenceTier::High)
    } else if score >= VECTOR_MEDIUM_THRESHOLD {
        Some(ConfidenceTier::Medium)
    } else if score >= VECTOR_LOW_THRESHOLD {
        Some(ConfidenceTier::Low)
    } else {
        // Also catches NaN.
        None
    }
}

/// Tier for a shared-tag count; `None` below two shared tags.
pub fn classify_shared_tags(shared: usize) -> Option<ConfidenceTier> {
    if shared >= TAGS_HIGH_THRESHOLD {
        Some(ConfidenceTier::High)
    } else if shared >= TAGS_MEDIUM_THRESHOLD {
        Some(ConfidenceTier::Medium)
    } else if shared >= TAGS_LOW_THRESHOLD {
        Some(ConfidenceTier::Low)
    } else {
        None
    }
}
