//! Generation directive assembly.
//!
//! Merges the role context, the optional sub-competency refinement and the
//! content mode with two injected requirements: a fixed Bloom-level target
//! distribution and near-uniform answer-letter targets.

use std::fmt::Write as _;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use examforge_shared::{BloomLevel, InstructionPayload, OptionId};

use crate::catalog::InstructionCatalog;
use crate::request::ValidatedRequest;

/// Target share of each Bloom level, in percent, lowest cognitive demand first.
pub const BLOOM_TARGETS: [(BloomLevel, u32); 4] = [
    (BloomLevel::Comprehension, 20),
    (BloomLevel::Application, 40),
    (BloomLevel::Analysis, 30),
    (BloomLevel::Evaluation, 10),
];

/// How many items still have to be generated after the cache hits.
pub fn needed_count(requested: usize, cache_hits: usize) -> usize {
    requested.saturating_sub(cache_hits)
}

/// Split `total` items across the Bloom levels by largest remainder.
/// Ties go to the level listed first.
pub fn bloom_distribution(total: usize) -> [(BloomLevel, usize); 4] {
    let mut out = BLOOM_TARGETS.map(|(level, pct)| (level, total * pct as usize / 100));
    let assigned: usize = out.iter().map(|(_, n)| n).sum();

    let mut order: Vec<usize> = (0..out.len()).collect();
    // Stable sort keeps table order among equal remainders.
    order.sort_by_key(|&i| std::cmp::Reverse(total * BLOOM_TARGETS[i].1 as usize % 100));
    for &i in order.iter().take(total - assigned) {
        out[i].1 += 1;
    }
    out
}

/// Per-letter targets for `correctOptionId`, differing by at most one.
pub fn answer_distribution(total: usize) -> [(OptionId, usize); 4] {
    let base = total / OptionId::ALL.len();
    let extra = total % OptionId::ALL.len();
    let mut i = 0;
    OptionId::ALL.map(|id| {
        let n = base + usize::from(i < extra);
        i += 1;
        (id, n)
    })
}

/// SHA-256 over the directive, used to tag the records it produces.
pub fn fingerprint(system: &str, user: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(system.as_bytes());
    hasher.update(b"\n\n");
    hasher.update(user.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

const PREAMBLE: &str = "Eres un experto en evaluación docente que redacta preguntas para \
                        el concurso de méritos del magisterio colombiano.";

const OUTPUT_SCHEMA: &str = r#"[
  {
    "text": "enunciado de la pregunta",
    "context": "situación o texto base",
    "options": [
      {"id": "A", "text": "..."},
      {"id": "B", "text": "..."},
      {"id": "C", "text": "..."},
      {"id": "D", "text": "..."}
    ],
    "correctOptionId": "A|B|C|D",
    "competency": "competencia evaluada",
    "bloomLevel": "Comprensión|Aplicación|Análisis|Evaluación",
    "normative": {"law": "...", "article": "...", "explanation": "..."},
    "difficulty_analysis": "por qué la pregunta discrimina entre aspirantes"
  }
]"#;

/// Builds the [`InstructionPayload`] for a validated request.
#[derive(Debug, Clone)]
pub struct InstructionAssembler {
    catalog: Arc<InstructionCatalog>,
}

impl InstructionAssembler {
    pub fn new(catalog: Arc<InstructionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &InstructionCatalog {
        &self.catalog
    }

    /// Assemble the directive for `needed` new items.
    pub fn assemble(&self, request: &ValidatedRequest, needed: usize) -> InstructionPayload {
        let role = self.catalog.role(&request.profile_role);
        let mode = request.competency.mode;

        let mut system = String::new();
        let _ = writeln!(system, "{PREAMBLE}\n");
        let _ = writeln!(system, "## Rol evaluado\n{}\n{}\n", role.name, role.context);

        if let Some(area) = &request.area {
            let _ = writeln!(system, "## Área\n{area}\n");
        }

        if let Some(competency) = &request.competency.requested {
            let _ = writeln!(system, "## Competencia\n{competency}");
            if let Some(refinement) = &request.competency.refinement {
                let _ = writeln!(system, "Enfoque ({}): {}", refinement.name, refinement.focus);
            }
            system.push('\n');
        }

        let _ = writeln!(system, "## Instrucciones\n{}\n", mode.instructions());

        let _ = writeln!(system, "## Nivel cognitivo (taxonomía de Bloom)");
        let _ = writeln!(system, "Distribuye las {needed} preguntas así:");
        for ((level, n), (_, pct)) in bloom_distribution(needed).iter().zip(BLOOM_TARGETS) {
            let _ = writeln!(system, "- {}: {n} ({pct} %)", level.label());
        }
        system.push('\n');

        let _ = writeln!(system, "## Respuestas correctas");
        let targets: Vec<String> = answer_distribution(needed)
            .iter()
            .map(|(id, n)| format!("{id}: {n}"))
            .collect();
        let _ = writeln!(
            system,
            "Distribuye `correctOptionId` de forma equilibrada ({}). \
             No concentres las respuestas correctas en una misma letra.\n",
            targets.join(", ")
        );

        let _ = writeln!(system, "## Formato de salida");
        let _ = writeln!(
            system,
            "Responde únicamente con un arreglo JSON, sin texto adicional, con esta forma:\n{OUTPUT_SCHEMA}"
        );
        let _ = writeln!(
            system,
            "Cada pregunta tiene exactamente cuatro opciones con ids A, B, C y D."
        );
        system.push_str(mode.normative_contract());

        let mut user = format!(
            "Genera {needed} preguntas de selección múltiple para el rol \"{}\"",
            request.role
        );
        if let Some(area) = &request.area {
            let _ = write!(user, ", área \"{area}\"");
        }
        if let Some(competency) = &request.competency.requested {
            let _ = write!(user, ", competencia \"{competency}\"");
        }
        user.push_str(". Responde solo con el arreglo JSON.");

        let fingerprint = fingerprint(&system, &user);
        InstructionPayload {
            system,
            user,
            fingerprint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use examforge_shared::{GenerationRequest, PipelineConfig};

    fn assembler() -> InstructionAssembler {
        InstructionAssembler::new(Arc::new(InstructionCatalog::builtin()))
    }

    fn validated(role: &str, area: Option<&str>, competency: Option<&str>) -> ValidatedRequest {
        let req = GenerationRequest {
            role: role.into(),
            area: area.map(Into::into),
            competency: competency.map(Into::into),
            ..Default::default()
        };
        ValidatedRequest::validate(&req, &PipelineConfig::default(), &InstructionCatalog::builtin())
            .unwrap()
    }

    #[test]
    fn needed_count_saturates() {
        assert_eq!(needed_count(5, 3), 2);
        assert_eq!(needed_count(5, 5), 0);
        assert_eq!(needed_count(5, 9), 0);
    }

    #[test]
    fn bloom_distribution_sums_to_total() {
        for total in 0..=20 {
            let sum: usize = bloom_distribution(total).iter().map(|(_, n)| n).sum();
            assert_eq!(sum, total, "total {total}");
        }
        let ten = bloom_distribution(10);
        assert_eq!(ten.map(|(_, n)| n), [2, 4, 3, 1]);
        assert_eq!(bloom_distribution(1).map(|(_, n)| n), [0, 1, 0, 0]);
        assert_eq!(bloom_distribution(5).map(|(_, n)| n), [1, 2, 2, 0]);
    }

    #[test]
    fn answer_targets_differ_by_at_most_one() {
        for total in 0..=20 {
            let counts = answer_distribution(total).map(|(_, n)| n);
            let max = counts.iter().max().unwrap();
            let min = counts.iter().min().unwrap();
            assert!(max - min <= 1);
            assert_eq!(counts.iter().sum::<usize>(), total);
        }
        assert_eq!(answer_distribution(6).map(|(_, n)| n), [2, 2, 1, 1]);
    }

    #[test]
    fn payload_carries_role_area_and_targets() {
        let payload = assembler().assemble(&validated("Docente de Aula", Some("Matemáticas"), None), 2);
        assert!(payload.system.contains("Docente de Aula"));
        assert!(payload.system.contains("## Área\nMatemáticas"));
        assert!(payload.system.contains("- Aplicación: 1 (40 %)"));
        assert!(payload.system.contains("A: 1, B: 1, C: 0, D: 0"));
        assert!(payload.user.starts_with("Genera 2 preguntas"));
        assert_eq!(payload.fingerprint.len(), 64);
    }

    #[test]
    fn mode_replaces_standard_instructions() {
        let payload =
            assembler().assemble(&validated("Docente de Aula", None, Some("Lectura crítica")), 3);
        assert!(payload.system.contains("lectura crítica"));
        assert!(!payload.system.contains("casos reales del contexto escolar"));

        let payload = assembler().assemble(
            &validated("Docente de Aula", None, Some("Razonamiento cuantitativo")),
            3,
        );
        assert!(payload.system.contains("No cites leyes"));
    }

    #[test]
    fn refinement_focus_is_included() {
        let payload = assembler().assemble(
            &validated("Directivo Docente - Rector", None, Some("gestión comunitaria")),
            4,
        );
        assert!(payload.system.contains("Enfoque (Gestión comunitaria)"));
    }

    #[test]
    fn unknown_role_uses_baseline_context() {
        let payload = assembler().assemble(&validated("Bibliotecario", None, None), 1);
        assert!(payload.system.contains("docente de aula de educación preescolar"));
        assert!(payload.user.contains("\"Bibliotecario\""));
    }

    #[test]
    fn fingerprint_is_stable_and_input_sensitive() {
        let a = assembler().assemble(&validated("Orientador", None, None), 2);
        let b = assembler().assemble(&validated("Orientador", None, None), 2);
        let c = assembler().assemble(&validated("Orientador", None, None), 3);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }
}
