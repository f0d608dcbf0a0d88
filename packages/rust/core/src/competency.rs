//! Competency resolution and content modes.
//!
//! A request's free-text competency is resolved once, at validation time,
//! into a [`ResolvedCompetency`]: the optional sub-competency refinement from
//! the role's table and the [`ContentMode`] that drives the directive.

use crate::catalog::{RoleProfile, SubCompetency};

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Lowercase, fold Spanish accents and collapse whitespace so that
/// "Gestión  Directiva" and "gestion directiva" compare equal.
pub(crate) fn normalize(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// ContentMode
// ---------------------------------------------------------------------------

/// Instructional mode. Every non-standard mode fully replaces the default
/// item-writing instructions and output contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentMode {
    #[default]
    Standard,
    /// Numeric reasoning; legal citations are forbidden.
    Quantitative,
    /// `context` carries the reading passage; `normative` explains from the text.
    ReadingComprehension,
    /// No absolute correctness; the keyed option is the most appropriate one.
    SituationalJudgment,
}

const QUANTITATIVE_KEYWORDS: &[&str] = &["cuantitativ", "numeric", "razonamiento matematico"];
const READING_KEYWORDS: &[&str] = &["lectura critica", "comprension lectora", "lectora"];
const JUDGMENT_KEYWORDS: &[&str] = &["juicio situacional", "socioemocional", "comportamental"];

impl ContentMode {
    /// Pick the mode for a competency. Only the competency is inspected;
    /// role and area never switch modes.
    pub fn detect(competency: Option<&str>) -> Self {
        let Some(raw) = competency else {
            return Self::Standard;
        };
        let norm = normalize(raw);
        let hit = |keywords: &[&str]| keywords.iter().any(|k| norm.contains(k));

        if hit(QUANTITATIVE_KEYWORDS) {
            Self::Quantitative
        } else if hit(READING_KEYWORDS) {
            Self::ReadingComprehension
        } else if hit(JUDGMENT_KEYWORDS) {
            Self::SituationalJudgment
        } else {
            Self::Standard
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Quantitative => "quantitative",
            Self::ReadingComprehension => "reading_comprehension",
            Self::SituationalJudgment => "situational_judgment",
        }
    }

    /// Item-writing instructions for this mode.
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Standard => {
                "Redacta preguntas de selección múltiple con única respuesta basadas en casos \
                 reales del contexto escolar colombiano. Cada pregunta presenta una situación \
                 concreta en `context`, un enunciado claro en `text` y cuatro opciones \
                 plausibles. Fundamenta la respuesta correcta en la normativa educativa vigente \
                 cuando aplique."
            }
            Self::Quantitative => {
                "Redacta preguntas de razonamiento cuantitativo. Cada pregunta plantea un \
                 problema con datos numéricos, tablas o gráficas descritas en `context`, y exige \
                 cálculo, estimación o interpretación de datos. Las opciones incorrectas deben \
                 corresponder a errores de procedimiento típicos. No cites leyes, decretos ni \
                 artículos: esta competencia no tiene sustento normativo."
            }
            Self::ReadingComprehension => {
                "Redacta preguntas de lectura crítica. Escribe en `context` un texto original \
                 de 150 a 250 palabras (argumentativo, expositivo o narrativo) y formula sobre \
                 él preguntas de nivel literal, inferencial y crítico. La respuesta correcta \
                 debe poder justificarse únicamente con el texto."
            }
            Self::SituationalJudgment => {
                "Redacta preguntas de juicio situacional. Cada pregunta describe en `context` \
                 un dilema profesional o socioemocional realista. Ninguna opción es absurda: \
                 todas son acciones posibles, y la opción marcada como correcta es la MÁS \
                 apropiada según criterios éticos, pedagógicos y de bienestar."
            }
        }
    }

    /// How the `normative` object must be filled in this mode.
    pub fn normative_contract(&self) -> &'static str {
        match self {
            Self::Standard => {
                "`normative`: `law` (ley o decreto que sustenta la respuesta), `article` \
                 (artículo específico) y `explanation` (por qué la opción correcta se ajusta a \
                 la norma). Usa \"No aplica\" si no hay norma pertinente."
            }
            Self::Quantitative => {
                "`normative`: `law` y `article` deben ser exactamente \"No aplica\"; \
                 `explanation` muestra el procedimiento de solución paso a paso."
            }
            Self::ReadingComprehension => {
                "`normative`: `law` y `article` deben ser \"No aplica\"; `explanation` cita \
                 el fragmento del texto que sustenta la respuesta."
            }
            Self::SituationalJudgment => {
                "`normative`: `law` y `article` pueden citar la norma de convivencia o ética \
                 relacionada, o \"No aplica\"; `explanation` justifica por qué la opción es la \
                 más apropiada frente a las demás."
            }
        }
    }
}

impl std::fmt::Display for ContentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// The competency of a request, resolved against the role's table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedCompetency {
    /// The competency as sent by the client, trimmed.
    pub requested: Option<String>,
    /// Matching entry of the role's sub-competency table, if any.
    pub refinement: Option<SubCompetency>,
    pub mode: ContentMode,
}

impl ResolvedCompetency {
    /// Resolve `competency` against `role`.
    ///
    /// Matching runs on normalized names: an exact match wins; otherwise an
    /// entry whose name contains the competency (or is contained by it)
    /// matches, preferring the longest name and then table order.
    pub fn resolve(role: &RoleProfile, competency: Option<&str>) -> Self {
        let requested = competency
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        let refinement = requested
            .as_deref()
            .and_then(|c| find_refinement(&role.competencies, c))
            .cloned();

        Self {
            mode: ContentMode::detect(requested.as_deref()),
            requested,
            refinement,
        }
    }
}

fn find_refinement<'a>(table: &'a [SubCompetency], competency: &str) -> Option<&'a SubCompetency> {
    let wanted = normalize(competency);
    if wanted.is_empty() {
        return None;
    }

    if let Some(exact) = table.iter().find(|s| normalize(&s.name) == wanted) {
        return Some(exact);
    }

    let mut best: Option<(&SubCompetency, usize)> = None;
    for entry in table {
        let key = normalize(&entry.name);
        if key.contains(&wanted) || wanted.contains(&key) {
            let len = key.chars().count();
            // Strictly greater keeps the earlier entry on ties.
            if best.is_none_or(|(_, best_len)| len > best_len) {
                best = Some((entry, len));
            }
        }
    }
    best.map(|(entry, _)| entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role_with(names: &[&str]) -> RoleProfile {
        RoleProfile {
            name: "Docente de Aula".into(),
            context: "ctx".into(),
            competencies: names
                .iter()
                .map(|n| SubCompetency {
                    name: (*n).into(),
                    focus: format!("foco {n}"),
                })
                .collect(),
        }
    }

    #[test]
    fn normalize_folds_accents_and_spaces() {
        assert_eq!(normalize("  Gestión   DIRECTIVA "), "gestion directiva");
        assert_eq!(normalize("Comprensión lectora"), "comprension lectora");
    }

    #[test]
    fn detect_modes_from_competency_only() {
        assert_eq!(ContentMode::detect(None), ContentMode::Standard);
        assert_eq!(
            ContentMode::detect(Some("Razonamiento Cuantitativo")),
            ContentMode::Quantitative
        );
        assert_eq!(
            ContentMode::detect(Some("Lectura Crítica")),
            ContentMode::ReadingComprehension
        );
        assert_eq!(
            ContentMode::detect(Some("Juicio situacional")),
            ContentMode::SituationalJudgment
        );
        assert_eq!(ContentMode::detect(Some("Pedagógica")), ContentMode::Standard);
    }

    #[test]
    fn exact_match_beats_containment() {
        let role = role_with(&["Gestión académica", "Académica"]);
        let resolved = ResolvedCompetency::resolve(&role, Some("academica"));
        assert_eq!(resolved.refinement.unwrap().name, "Académica");
    }

    #[test]
    fn containment_prefers_longest_then_table_order() {
        let role = role_with(&["Convivencia", "Convivencia escolar", "Escolar"]);
        let resolved =
            ResolvedCompetency::resolve(&role, Some("Convivencia escolar y ciudadanía"));
        assert_eq!(resolved.refinement.unwrap().name, "Convivencia escolar");

        let role = role_with(&["Didáctica A", "Didáctica B"]);
        let resolved = ResolvedCompetency::resolve(&role, Some("didáctica"));
        assert_eq!(resolved.refinement.unwrap().name, "Didáctica A");
    }

    #[test]
    fn blank_or_unknown_competency_has_no_refinement() {
        let role = role_with(&["Pedagógica"]);
        let blank = ResolvedCompetency::resolve(&role, Some("   "));
        assert!(blank.requested.is_none());
        assert!(blank.refinement.is_none());

        let unknown = ResolvedCompetency::resolve(&role, Some("Lectura crítica"));
        assert_eq!(unknown.requested.as_deref(), Some("Lectura crítica"));
        assert!(unknown.refinement.is_none());
        assert_eq!(unknown.mode, ContentMode::ReadingComprehension);
    }
}
