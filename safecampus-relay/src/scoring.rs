//! Report scoring engine
//!
//! Pure, deterministic heuristics mapping a report's text and metadata to a
//! confidence score plus a derived classification. Two independent paths
//! feed the classification: the numeric tier derived from the confidence
//! value, and a keyword override that can force critical priority when the
//! text sounds dangerous even if the numeric score is borderline. The two
//! paths are intentionally not collapsed into one comparison.
//!
//! Keyword matching is case-insensitive substring containment, matching the
//! lenient behavior of the deployed mobile clients.

use async_trait::async_trait;

use safecampus_common::model::{Category, Priority, ReportStatus, VerificationTag};

use crate::error::Result;

/// Starting confidence before any adjustment
const BASELINE: i32 = 35;
/// Bonus per distinct high-severity term matched
const HIGH_SEVERITY_WEIGHT: i32 = 25;
/// Bonus per distinct medium-severity term matched
const MEDIUM_SEVERITY_WEIGHT: i32 = 12;
/// Bonus per distinct infrastructure/low-severity term matched
const LOW_SEVERITY_WEIGHT: i32 = 6;
/// Bonus applied at each description-length threshold
const LENGTH_BONUS: i32 = 5;
const LENGTH_THRESHOLD_1: usize = 50;
const LENGTH_THRESHOLD_2: usize = 150;
/// Bonus when at least one evidence image is attached
const EVIDENCE_BONUS: i32 = 10;
/// Bonus when the category is in the high-priority subset
const CATEGORY_BONUS: i32 = 5;
/// Penalty when promotional/spam wording is present
const SPAM_PENALTY: i32 = 40;
/// Penalty when test/demo wording is present
const TEST_PENALTY: i32 = 35;

/// Final confidence clamp range
const CONFIDENCE_MIN: i32 = 15;
const CONFIDENCE_MAX: i32 = 95;

/// Tier boundaries (inclusive lower bounds)
pub const HIGH_TIER_MIN: u8 = 70;
pub const MEDIUM_TIER_MIN: u8 = 30;

const HIGH_SEVERITY_TERMS: &[&str] = &[
    "weapon", "gun", "knife", "armed", "robbery", "theft", "stolen", "assault",
    "attack", "stab", "shoot", "kidnap", "bomb", "explosion", "fire", "rape",
    "hostage", "emergency",
];

const MEDIUM_SEVERITY_TERMS: &[&str] = &[
    "suspicious", "stalking", "following me", "harass", "vandal", "graffiti",
    "drunk", "trespass", "loiter", "threat", "drug", "fight",
];

const LOW_SEVERITY_TERMS: &[&str] = &[
    "broken", "streetlight", "light out", "pothole", "leak", "flood", "blocked",
    "damaged", "hazard", "spill", "elevator", "power outage",
];

/// Terms that force critical priority independent of the numeric tier
const CRITICAL_TERMS: &[&str] = &[
    "weapon", "gun", "knife", "armed", "bomb", "shoot", "stab", "kidnap",
    "rape", "hostage", "explosion", "fire",
];

const SPAM_PATTERNS: &[&str] = &[
    "click here", "buy now", "promo", "discount", "free money", "limited offer",
    "subscribe", "http://", "https://", "www.",
];

const TEST_PATTERNS: &[&str] = &["test", "demo", "sample", "asdf", "lorem ipsum"];

/// Output of the scoring engine
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Authenticity estimate, 0-100 (clamped to [15, 95] in practice)
    pub confidence: u8,
    pub status: ReportStatus,
    pub priority: Priority,
    pub verification_tag: VerificationTag,
    /// Human-readable summary of the factors behind the score
    pub explanation: String,
}

/// Map a confidence value to its numeric tier
///
/// Boundaries are inclusive on the lower edge: 70 is the verified tier,
/// 30 is the needs-review tier.
pub fn classify_confidence(confidence: u8) -> (ReportStatus, VerificationTag, Priority) {
    if confidence >= HIGH_TIER_MIN {
        (ReportStatus::Verified, VerificationTag::Verified, Priority::High)
    } else if confidence >= MEDIUM_TIER_MIN {
        (ReportStatus::NeedsReview, VerificationTag::NeedsReview, Priority::Medium)
    } else {
        (ReportStatus::Unverified, VerificationTag::Unverified, Priority::Low)
    }
}

fn matched_terms<'a>(haystack: &str, terms: &[&'a str]) -> Vec<&'a str> {
    terms.iter().filter(|t| haystack.contains(*t)).copied().collect()
}

/// Score a report description plus metadata
///
/// Pure and deterministic; an empty description still yields a valid score.
pub fn score(description: &str, evidence_image_count: usize, category: Category) -> ScoreResult {
    let text = description.to_lowercase();
    let mut confidence = BASELINE;
    let mut factors: Vec<String> = Vec::new();

    let high = matched_terms(&text, HIGH_SEVERITY_TERMS);
    if !high.is_empty() {
        confidence += HIGH_SEVERITY_WEIGHT * high.len() as i32;
        factors.push(format!("high-severity terms: {}", high.join(", ")));
    }

    let medium = matched_terms(&text, MEDIUM_SEVERITY_TERMS);
    if !medium.is_empty() {
        confidence += MEDIUM_SEVERITY_WEIGHT * medium.len() as i32;
        factors.push(format!("medium-severity terms: {}", medium.join(", ")));
    }

    let low = matched_terms(&text, LOW_SEVERITY_TERMS);
    if !low.is_empty() {
        confidence += LOW_SEVERITY_WEIGHT * low.len() as i32;
        factors.push(format!("infrastructure terms: {}", low.join(", ")));
    }

    if description.chars().count() > LENGTH_THRESHOLD_1 {
        confidence += LENGTH_BONUS;
        factors.push("detailed description".to_string());
    }
    if description.chars().count() > LENGTH_THRESHOLD_2 {
        confidence += LENGTH_BONUS;
        factors.push("extended description".to_string());
    }

    if evidence_image_count > 0 {
        confidence += EVIDENCE_BONUS;
        factors.push(format!("{} evidence image(s) attached", evidence_image_count));
    }

    if category.is_high_priority() {
        confidence += CATEGORY_BONUS;
        factors.push(format!("high-priority category: {}", category));
    }

    if SPAM_PATTERNS.iter().any(|p| text.contains(p)) {
        confidence -= SPAM_PENALTY;
        factors.push("promotional wording penalty".to_string());
    }

    if TEST_PATTERNS.iter().any(|p| text.contains(p)) {
        confidence -= TEST_PENALTY;
        factors.push("test/demo wording penalty".to_string());
    }

    let confidence = confidence.clamp(CONFIDENCE_MIN, CONFIDENCE_MAX) as u8;
    let (status, verification_tag, mut priority) = classify_confidence(confidence);

    // Keyword override: dangerous-sounding text forces critical priority,
    // unless the score landed in the bottom band (spam/test penalties win).
    let critical = matched_terms(&text, CRITICAL_TERMS);
    if !critical.is_empty() && confidence >= MEDIUM_TIER_MIN {
        priority = Priority::Critical;
        factors.push(format!("critical terms: {}", critical.join(", ")));
    }

    if factors.is_empty() {
        factors.push("no notable signals".to_string());
    }

    ScoreResult {
        confidence,
        status,
        priority,
        verification_tag,
        explanation: format!("{}% authenticity estimate: {}", confidence, factors.join("; ")),
    }
}

/// Capability interface for authenticity classification
///
/// The relay's own heuristic engine is the default implementation; an
/// externally hosted model can be substituted behind the same seam. Callers
/// are expected to wrap invocations in a timeout and fall back to a
/// conservative pending-review classification on failure.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        description: &str,
        evidence_image_count: usize,
        category: Category,
    ) -> Result<ScoreResult>;
}

/// The built-in keyword-heuristic classifier
#[derive(Debug, Default)]
pub struct HeuristicClassifier;

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(
        &self,
        description: &str,
        evidence_image_count: usize,
        category: Category,
    ) -> Result<ScoreResult> {
        Ok(score(description, evidence_image_count, category))
    }
}
