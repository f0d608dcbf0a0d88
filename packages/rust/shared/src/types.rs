//! Core domain types for ExamForge questions and the question cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RecordId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for cache record identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a new time-sortable record identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Question building blocks
// ---------------------------------------------------------------------------

/// Identifier of an answer option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionId {
    A,
    B,
    C,
    D,
}

impl OptionId {
    /// All option ids in display order.
    pub const ALL: [OptionId; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }

    /// Parse a model-provided id, tolerating case, whitespace and a trailing
    /// `)` or `.` (e.g. `"b)"`).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let trimmed = raw.trim().trim_end_matches([')', '.']).trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            _ => None,
        }
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    pub text: String,
}

/// Cognitive-demand level attached to each served question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloomLevel {
    #[serde(rename = "Comprensión", alias = "Comprension")]
    Comprehension,
    #[serde(rename = "Aplicación", alias = "Aplicacion")]
    Application,
    #[serde(rename = "Análisis", alias = "Analisis")]
    Analysis,
    #[serde(rename = "Evaluación", alias = "Evaluacion")]
    Evaluation,
}

impl BloomLevel {
    /// Label used on the wire and inside generation directives.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Comprehension => "Comprensión",
            Self::Application => "Aplicación",
            Self::Analysis => "Análisis",
            Self::Evaluation => "Evaluación",
        }
    }

    /// Map a free-form level name (Spanish or English, with or without
    /// accents) onto the fixed enumeration.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        if lower.starts_with("compren") || lower.starts_with("understand") {
            Some(Self::Comprehension)
        } else if lower.starts_with("aplic") || lower.starts_with("appl") {
            Some(Self::Application)
        } else if lower.starts_with("análi") || lower.starts_with("anali") || lower.starts_with("analy") {
            Some(Self::Analysis)
        } else if lower.starts_with("evalu") {
            Some(Self::Evaluation)
        } else {
            None
        }
    }
}

impl std::fmt::Display for BloomLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Normative reference as produced upstream; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormativeDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub law: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Fully populated normative reference on a served question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Normative {
    pub law: String,
    pub article: String,
    pub explanation: String,
}

/// Where a served question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Cache,
    Generated,
}

// ---------------------------------------------------------------------------
// QuestionContent / Question
// ---------------------------------------------------------------------------

/// The persisted payload of a question: everything except the per-response
/// `id` and `provenance`. Optional fields are filled in at response time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContent {
    pub text: String,
    #[serde(default)]
    pub context: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: OptionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_level: Option<BloomLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normative: Option<NormativeDraft>,
    #[serde(
        default,
        rename = "difficulty_analysis",
        skip_serializing_if = "Option::is_none"
    )]
    pub difficulty_analysis: Option<String>,
}

/// A question as served to clients. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Identifier scoped to a single response (UUID v4).
    pub id: String,
    pub text: String,
    pub context: String,
    pub options: Vec<QuestionOption>,
    pub correct_option_id: OptionId,
    pub competency: String,
    pub bloom_level: BloomLevel,
    pub normative: Normative,
    #[serde(rename = "difficulty_analysis")]
    pub difficulty_analysis: String,
    pub provenance: Provenance,
}

// ---------------------------------------------------------------------------
// Cache records
// ---------------------------------------------------------------------------

/// One persisted question in the content store. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub id: RecordId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competency: Option<String>,
    pub content: QuestionContent,
    /// SHA-256 of the instruction payload that produced this question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Category filter for cache reads. `None` fields match any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheFilter {
    pub role: String,
    pub area: Option<String>,
    pub competency: Option<String>,
}

impl CacheFilter {
    /// Whether a record falls within this filter.
    pub fn matches(&self, record: &CacheRecord) -> bool {
        record.role == self.role
            && self
                .area
                .as_ref()
                .is_none_or(|area| record.area.as_ref() == Some(area))
            && self
                .competency
                .as_ref()
                .is_none_or(|c| record.competency.as_ref() == Some(c))
    }
}

/// Record count for one (role, area, competency) bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStat {
    pub role: String,
    pub area: Option<String>,
    pub competency: Option<String>,
    pub count: u64,
}

// ---------------------------------------------------------------------------
// Requests and directives
// ---------------------------------------------------------------------------

/// Inbound request for a batch of questions (JSON body of the HTTP API).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub role: String,
    #[serde(default)]
    pub area: Option<String>,
    /// Falls back to `generation.default_count` when absent.
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub competency: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

/// The assembled generation directive handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionPayload {
    /// System-level instructions (role context, mode, output contract).
    pub system: String,
    /// The concrete task for this request.
    pub user: String,
    /// SHA-256 over `system` + `user`, used to tag cache records.
    pub fingerprint: String,
}
