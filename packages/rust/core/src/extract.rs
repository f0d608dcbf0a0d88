//! Extraction and validation of questions from raw model output.
//!
//! Model output is untrusted: it may be wrapped in code fences or prose, use
//! an envelope object, or contain individually malformed items. Each
//! candidate is validated on its own and invalid ones are dropped.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use examforge_shared::{BloomLevel, NormativeDraft, OptionId, QuestionContent, QuestionOption};

/// Why model output (or one candidate within it) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("no JSON array or object found in model output")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("invalid question: {0}")]
    InvalidQuestion(String),
}

impl ExtractError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidQuestion(msg.into())
    }
}

// ---------------------------------------------------------------------------
// Locating the payload
// ---------------------------------------------------------------------------

/// Return the body of the first fenced code block, or the input unchanged.
fn strip_fences(raw: &str) -> &str {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").expect("valid regex")
    });

    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
}

/// Parse the first JSON value at the start of `text`, ignoring what follows.
fn leading_value(text: &str) -> Result<Value, serde_json::Error> {
    match serde_json::Deserializer::from_str(text).into_iter::<Value>().next() {
        Some(result) => result,
        None => serde_json::from_str(text),
    }
}

/// Interpret a parsed value as a list of candidates: an array, an object
/// with a `questions` array, or a single candidate object.
fn shape(value: Value) -> Result<Vec<Value>, ExtractError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(ExtractError::Malformed(
                "`questions` is not an array".into(),
            )),
            None => Ok(vec![Value::Object(map)]),
        },
        _ => Err(ExtractError::NoJson),
    }
}

/// Locate the question payload and split it into candidates.
///
/// Parsing is attempted at every `[` or `{` in order, so bracketed prose
/// ahead of the payload does not hide it. The first value holding at least
/// one object wins. Failing that, the first parsed value is returned, and if
/// nothing parses the first parse error is reported.
fn candidates(raw: &str) -> Result<Vec<Value>, ExtractError> {
    let text = strip_fences(raw);
    let mut fallback: Option<Vec<Value>> = None;
    let mut first_error: Option<ExtractError> = None;

    for (at, _) in text.match_indices(['[', '{']) {
        let shaped = leading_value(&text[at..])
            .map_err(|e| ExtractError::Malformed(e.to_string()))
            .and_then(shape);
        match shaped {
            Ok(items) if items.iter().any(Value::is_object) => return Ok(items),
            Ok(items) => {
                if fallback.is_none() {
                    fallback = Some(items);
                }
            }
            Err(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match (fallback, first_error) {
        (Some(items), _) => Ok(items),
        (None, Some(e)) => Err(e),
        (None, None) => Err(ExtractError::NoJson),
    }
}

// ---------------------------------------------------------------------------
// Candidate validation
// ---------------------------------------------------------------------------

fn string_field<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| map.get(*k))
        .find_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_options(value: &Value) -> Result<Vec<QuestionOption>, ExtractError> {
    let items = value
        .as_array()
        .ok_or_else(|| ExtractError::invalid("`options` is not an array"))?;

    let mut options = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let option = match item {
            // Bare strings take their id from their position.
            Value::String(text) => OptionId::ALL.get(idx).map(|id| QuestionOption {
                id: *id,
                text: text.trim().to_string(),
            }),
            Value::Object(map) => {
                let id = string_field(map, &["id", "letter", "key"]).and_then(OptionId::parse_lenient);
                let text = string_field(map, &["text", "option", "value"]);
                id.zip(text).map(|(id, text)| QuestionOption {
                    id,
                    text: text.to_string(),
                })
            }
            _ => None,
        };
        options.push(option.ok_or_else(|| {
            ExtractError::invalid(format!("option {} has no usable id and text", idx + 1))
        })?);
    }
    Ok(options)
}

fn parse_normative(value: Option<&Value>) -> Option<NormativeDraft> {
    let map = value?.as_object()?;
    let field = |key: &str| string_field(map, &[key]).map(str::to_string);
    Some(NormativeDraft {
        law: field("law"),
        article: field("article"),
        explanation: field("explanation"),
    })
}

/// Check the structural invariants every served question must hold.
pub fn validate_content(content: &QuestionContent) -> Result<(), ExtractError> {
    if content.text.trim().is_empty() {
        return Err(ExtractError::invalid("empty question text"));
    }
    if content.options.len() != OptionId::ALL.len() {
        return Err(ExtractError::invalid(format!(
            "expected 4 options, found {}",
            content.options.len()
        )));
    }
    let ids: HashSet<OptionId> = content.options.iter().map(|o| o.id).collect();
    if ids.len() != content.options.len() {
        return Err(ExtractError::invalid("duplicate option ids"));
    }
    if content.options.iter().any(|o| o.text.trim().is_empty()) {
        return Err(ExtractError::invalid("empty option text"));
    }
    if !ids.contains(&content.correct_option_id) {
        return Err(ExtractError::invalid(format!(
            "correct option {} is not among the options",
            content.correct_option_id
        )));
    }
    Ok(())
}

/// Turn one JSON candidate into validated question content.
pub fn parse_candidate(value: &Value) -> Result<QuestionContent, ExtractError> {
    let map = value
        .as_object()
        .ok_or_else(|| ExtractError::invalid("candidate is not an object"))?;

    let text = string_field(map, &["text", "question"])
        .ok_or_else(|| ExtractError::invalid("missing question text"))?;

    let options = parse_options(
        map.get("options")
            .ok_or_else(|| ExtractError::invalid("missing options"))?,
    )?;

    let correct = string_field(map, &["correctOptionId", "correct_option_id", "answer"])
        .ok_or_else(|| ExtractError::invalid("missing correctOptionId"))?;
    let correct_option_id = OptionId::parse_lenient(correct)
        .ok_or_else(|| ExtractError::invalid(format!("unknown correct option '{correct}'")))?;

    let content = QuestionContent {
        text: text.to_string(),
        context: string_field(map, &["context"]).unwrap_or_default().to_string(),
        options,
        correct_option_id,
        competency: string_field(map, &["competency"]).map(str::to_string),
        bloom_level: string_field(map, &["bloomLevel", "bloom_level"])
            .and_then(BloomLevel::parse_lenient),
        normative: parse_normative(map.get("normative")),
        difficulty_analysis: string_field(map, &["difficulty_analysis", "difficultyAnalysis"])
            .map(str::to_string),
    };

    validate_content(&content)?;
    Ok(content)
}

/// Extract every valid question from raw model output.
///
/// Fails only when no JSON payload can be located or parsed. Invalid
/// candidates are dropped individually, so an `Ok` result may be empty.
pub fn extract_questions(raw: &str) -> Result<Vec<QuestionContent>, ExtractError> {
    let values = candidates(raw)?;
    let total = values.len();

    let questions: Vec<QuestionContent> = values
        .iter()
        .enumerate()
        .filter_map(|(idx, value)| match parse_candidate(value) {
            Ok(q) => Some(q),
            Err(e) => {
                debug!(index = idx, error = %e, "dropping invalid candidate");
                None
            }
        })
        .collect();

    debug!(total, valid = questions.len(), "extracted candidates");
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question_json(text: &str, correct: &str) -> String {
        format!(
            r#"{{"text":"{text}","context":"ctx","options":[{{"id":"A","text":"a"}},{{"id":"B","text":"b"}},{{"id":"C","text":"c"}},{{"id":"D","text":"d"}}],"correctOptionId":"{correct}","bloomLevel":"Análisis"}}"#
        )
    }

    #[test]
    fn parses_plain_array() {
        let raw = format!("[{},{}]", question_json("q1", "A"), question_json("q2", "D"));
        let questions = extract_questions(&raw).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].correct_option_id, OptionId::D);
        assert_eq!(questions[0].bloom_level, Some(BloomLevel::Analysis));
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = format!(
            "Claro, aquí están las preguntas:\n```json\n[{}]\n```\nÉxitos.",
            question_json("q1", "B")
        );
        let questions = extract_questions(&raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "q1");
    }

    #[test]
    fn bracketed_prose_before_the_payload_is_skipped() {
        let raw = format!(
            "Aquí tienes las preguntas [formato JSON]:\n[{},{}]\nNota: revisa {{todo}}.",
            question_json("q1", "A"),
            question_json("q2", "C")
        );
        let questions = extract_questions(&raw).unwrap();
        let texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, ["q1", "q2"]);
    }

    #[test]
    fn accepts_questions_envelope_and_single_object() {
        let raw = format!(r#"{{"questions":[{}]}}"#, question_json("q1", "C"));
        assert_eq!(extract_questions(&raw).unwrap().len(), 1);

        let raw = question_json("solo", "A");
        let questions = extract_questions(&raw).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].text, "solo");
    }

    #[test]
    fn drops_invalid_candidates_individually() {
        let three_options = r#"{"text":"bad","options":[{"id":"A","text":"a"},{"id":"B","text":"b"},{"id":"C","text":"c"}],"correctOptionId":"A"}"#;
        let wrong_key = question_json("bad key", "E");
        let raw = format!(
            "[{},{three_options},{wrong_key},{}]",
            question_json("ok1", "A"),
            question_json("ok2", "B")
        );
        let questions = extract_questions(&raw).unwrap();
        let texts: Vec<&str> = questions.iter().map(|q| q.text.as_str()).collect();
        assert_eq!(texts, ["ok1", "ok2"]);
    }

    #[test]
    fn rejects_duplicate_option_ids() {
        let raw = r#"[{"text":"dup","options":[{"id":"A","text":"a"},{"id":"A","text":"b"},{"id":"C","text":"c"},{"id":"D","text":"d"}],"correctOptionId":"A"}]"#;
        assert!(extract_questions(raw).unwrap().is_empty());
    }

    #[test]
    fn lenient_field_forms() {
        let raw = r#"[{"question":"q","options":["uno","dos","tres","cuatro"],"answer":"c)","difficultyAnalysis":"media","normative":{"law":"Ley 115 de 1994"}}]"#;
        let questions = extract_questions(raw).unwrap();
        assert_eq!(questions.len(), 1);
        let q = &questions[0];
        assert_eq!(q.options[2].id, OptionId::C);
        assert_eq!(q.correct_option_id, OptionId::C);
        assert_eq!(q.difficulty_analysis.as_deref(), Some("media"));
        let normative = q.normative.as_ref().unwrap();
        assert_eq!(normative.law.as_deref(), Some("Ley 115 de 1994"));
        assert!(normative.article.is_none());
    }

    #[test]
    fn unparsable_output_is_an_error() {
        assert_eq!(
            extract_questions("Lo siento, no puedo ayudar con eso."),
            Err(ExtractError::NoJson)
        );
        assert!(matches!(
            extract_questions("[{\"text\": \"unterminated\""),
            Err(ExtractError::NoJson | ExtractError::Malformed(_))
        ));
        assert!(matches!(
            extract_questions("[not json]"),
            Err(ExtractError::Malformed(_))
        ));
    }

    #[test]
    fn validate_content_checks_correct_option_membership() {
        let mut content = parse_candidate(&serde_json::from_str(&question_json("q", "A")).unwrap())
            .unwrap();
        assert!(validate_content(&content).is_ok());

        content.options.truncate(3);
        assert!(validate_content(&content).is_err());
    }
}
