//! Final response assembly: ordering, truncation, ids, provenance and
//! defaults for fields the model or cache left out.

use uuid::Uuid;

use examforge_shared::{
    BloomLevel, CacheRecord, Normative, NormativeDraft, Provenance, Question, QuestionContent,
};

pub const DEFAULT_BLOOM_LEVEL: BloomLevel = BloomLevel::Application;
pub const DEFAULT_DIFFICULTY_ANALYSIS: &str = "Sin análisis de dificultad disponible.";
pub const DEFAULT_NORMATIVE_REFERENCE: &str = "No aplica";
pub const DEFAULT_NORMATIVE_EXPLANATION: &str = "Sin explicación disponible.";
pub const DEFAULT_COMPETENCY: &str = "General";

/// Combines cache hits and generated items into the served list.
#[derive(Debug, Clone)]
pub struct ResponseAssembler {
    fallback_competency: String,
}

impl ResponseAssembler {
    /// `competency` and `area` are the request's; the first non-empty one
    /// labels items that carry no competency of their own.
    pub fn new(competency: Option<&str>, area: Option<&str>) -> Self {
        let fallback = competency
            .or(area)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_COMPETENCY);
        Self {
            fallback_competency: fallback.to_string(),
        }
    }

    /// Cache items first, then generated ones, at most `requested` in total.
    pub fn assemble(
        &self,
        cached: Vec<CacheRecord>,
        generated: Vec<QuestionContent>,
        requested: usize,
    ) -> Vec<Question> {
        cached
            .into_iter()
            .map(|r| (r.content, Provenance::Cache))
            .chain(generated.into_iter().map(|c| (c, Provenance::Generated)))
            .take(requested)
            .map(|(content, provenance)| self.finish(content, provenance))
            .collect()
    }

    fn finish(&self, content: QuestionContent, provenance: Provenance) -> Question {
        let NormativeDraft {
            law,
            article,
            explanation,
        } = content.normative.unwrap_or_default();

        Question {
            id: Uuid::new_v4().to_string(),
            text: content.text,
            context: content.context,
            options: content.options,
            correct_option_id: content.correct_option_id,
            competency: non_blank(content.competency)
                .unwrap_or_else(|| self.fallback_competency.clone()),
            bloom_level: content.bloom_level.unwrap_or(DEFAULT_BLOOM_LEVEL),
            normative: Normative {
                law: non_blank(law).unwrap_or_else(|| DEFAULT_NORMATIVE_REFERENCE.into()),
                article: non_blank(article).unwrap_or_else(|| DEFAULT_NORMATIVE_REFERENCE.into()),
                explanation: non_blank(explanation)
                    .unwrap_or_else(|| DEFAULT_NORMATIVE_EXPLANATION.into()),
            },
            difficulty_analysis: non_blank(content.difficulty_analysis)
                .unwrap_or_else(|| DEFAULT_DIFFICULTY_ANALYSIS.into()),
            provenance,
        }
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new(None, None)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
