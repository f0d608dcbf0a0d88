//! Instruction catalog: role context templates and the nested
//! role → sub-competency table.
//!
//! Built once at startup, from the built-in tables or a TOML override
//! (`instructions.catalog_path`), and shared read-only via `Arc`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use examforge_shared::{ExamForgeError, InstructionsConfig, Result};

use crate::competency::normalize;

/// Role every unrecognized request falls back to.
pub const BASELINE_ROLE: &str = "Docente de Aula";

/// A refinement of the directive for one named sub-competency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubCompetency {
    pub name: String,
    /// What the questions of this sub-competency must focus on.
    pub focus: String,
}

/// Context template for one role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub name: String,
    pub context: String,
    #[serde(default)]
    pub competencies: Vec<SubCompetency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionCatalog {
    #[serde(default = "default_baseline")]
    pub baseline_role: String,
    pub roles: Vec<RoleProfile>,
}

fn default_baseline() -> String {
    BASELINE_ROLE.into()
}

impl InstructionCatalog {
    /// Load the catalog named by the config, or the built-in one.
    pub fn load(config: &InstructionsConfig) -> Result<Self> {
        match &config.catalog_path {
            Some(path) => Self::from_toml_file(Path::new(path)),
            None => Ok(Self::builtin()),
        }
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ExamForgeError::io(path, e))?;
        let catalog = Self::from_toml_str(&content).map_err(|e| {
            ExamForgeError::config(format!("invalid catalog {}: {e}", path.display()))
        })?;
        info!(path = %path.display(), roles = catalog.roles.len(), "loaded instruction catalog");
        Ok(catalog)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let catalog: Self =
            toml::from_str(content).map_err(|e| ExamForgeError::config(e.to_string()))?;
        catalog.check()?;
        Ok(catalog)
    }

    fn check(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(ExamForgeError::config("catalog defines no roles"));
        }
        if self.find(&self.baseline_role).is_none() {
            return Err(ExamForgeError::config(format!(
                "baseline role '{}' is not defined in the catalog",
                self.baseline_role
            )));
        }
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&RoleProfile> {
        let wanted = normalize(name);
        self.roles.iter().find(|r| normalize(&r.name) == wanted)
    }

    /// Context for `name`, falling back to the baseline role.
    pub fn role(&self, name: &str) -> &RoleProfile {
        self.find(name)
            .or_else(|| self.find(&self.baseline_role))
            .unwrap_or(&self.roles[0])
    }

    /// Whether `name` has its own entry (as opposed to the fallback).
    pub fn knows_role(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        let sub = |name: &str, focus: &str| SubCompetency {
            name: name.into(),
            focus: focus.into(),
        };

        let roles = vec![
            RoleProfile {
                name: BASELINE_ROLE.into(),
                context: "El aspirante es un docente de aula de educación preescolar, básica o \
                          media en Colombia. Las preguntas evalúan su desempeño en el aula: \
                          planeación, didáctica, evaluación del aprendizaje, inclusión y \
                          convivencia, según la Ley 115 de 1994, el Decreto 1278 de 2002 y el \
                          Decreto 1290 de 2009."
                    .into(),
                competencies: vec![
                    sub(
                        "Pedagógica",
                        "modelos pedagógicos, planeación de clase y adecuación curricular al contexto del estudiante",
                    ),
                    sub(
                        "Didáctica",
                        "estrategias de enseñanza, uso de recursos y secuencias didácticas del área",
                    ),
                    sub(
                        "Evaluativa",
                        "evaluación formativa, criterios del SIEE y retroalimentación según el Decreto 1290 de 2009",
                    ),
                    sub(
                        "Convivencia escolar",
                        "rutas de atención integral y manejo de conflictos según la Ley 1620 de 2013",
                    ),
                    sub(
                        "Educación inclusiva",
                        "ajustes razonables y PIAR según el Decreto 1421 de 2017",
                    ),
                ],
            },
            RoleProfile {
                name: "Directivo Docente - Rector".into(),
                context: "El aspirante es rector de una institución educativa oficial en \
                          Colombia. Las preguntas evalúan el liderazgo institucional, la \
                          gestión del PEI, el manejo de recursos y la relación con la \
                          comunidad, según la Ley 115 de 1994, la Ley 715 de 2001 y el \
                          Decreto 1075 de 2015."
                    .into(),
                competencies: vec![
                    sub(
                        "Gestión directiva",
                        "direccionamiento estratégico, gobierno escolar y toma de decisiones institucionales",
                    ),
                    sub(
                        "Gestión académica",
                        "diseño curricular, seguimiento académico y planes de mejoramiento",
                    ),
                    sub(
                        "Gestión administrativa y financiera",
                        "fondos de servicios educativos, talento humano y apoyo logístico según la Ley 715 de 2001",
                    ),
                    sub(
                        "Gestión comunitaria",
                        "participación de familias, proyección a la comunidad y prevención de riesgos",
                    ),
                ],
            },
            RoleProfile {
                name: "Directivo Docente - Coordinador".into(),
                context: "El aspirante es coordinador de una institución educativa oficial en \
                          Colombia. Las preguntas evalúan el acompañamiento a docentes, la \
                          organización académica y la convivencia escolar, según la Ley 115 de \
                          1994, la Ley 1620 de 2013 y el Decreto 1075 de 2015."
                    .into(),
                competencies: vec![
                    sub(
                        "Convivencia escolar",
                        "comité de convivencia, manual de convivencia y protocolos de la Ley 1620 de 2013",
                    ),
                    sub(
                        "Gestión académica",
                        "horarios, seguimiento al plan de estudios y acompañamiento pedagógico a docentes",
                    ),
                ],
            },
            RoleProfile {
                name: "Orientador".into(),
                context: "El aspirante es docente orientador en una institución educativa \
                          oficial en Colombia. Las preguntas evalúan la atención psicosocial, \
                          la orientación vocacional y la activación de rutas de protección, \
                          según la Ley 1620 de 2013, la Ley 1098 de 2006 y el Decreto 1075 de \
                          2015."
                    .into(),
                competencies: vec![
                    sub(
                        "Orientación escolar",
                        "orientación socio-ocupacional, proyecto de vida y acompañamiento a familias",
                    ),
                    sub(
                        "Convivencia escolar",
                        "activación de rutas de atención y restablecimiento de derechos según la Ley 1098 de 2006",
                    ),
                ],
            },
        ];

        Self {
            baseline_role: BASELINE_ROLE.into(),
            roles,
        }
    }
}

impl Default for InstructionCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_consistent() {
        let catalog = InstructionCatalog::builtin();
        catalog.check().expect("builtin catalog");
        assert!(catalog.knows_role("Orientador"));
    }

    #[test]
    fn role_lookup_is_accent_and_case_insensitive() {
        let catalog = InstructionCatalog::builtin();
        let role = catalog.role("directivo docente - RECTOR");
        assert_eq!(role.name, "Directivo Docente - Rector");
    }

    #[test]
    fn unknown_role_falls_back_to_baseline() {
        let catalog = InstructionCatalog::builtin();
        assert!(!catalog.knows_role("Bibliotecario"));
        assert_eq!(catalog.role("Bibliotecario").name, BASELINE_ROLE);
    }

    #[test]
    fn parses_toml_override() {
        let toml = r#"
baseline_role = "Docente"

[[roles]]
name = "Docente"
context = "Contexto docente."

[[roles.competencies]]
name = "Didáctica"
focus = "secuencias"
"#;
        let catalog = InstructionCatalog::from_toml_str(toml).expect("parse");
        assert_eq!(catalog.roles.len(), 1);
        assert_eq!(catalog.role("otro").competencies[0].name, "Didáctica");
    }

    #[test]
    fn rejects_catalog_without_baseline() {
        let toml = r#"
baseline_role = "Rector"

[[roles]]
name = "Docente"
context = "x"
"#;
        let err = InstructionCatalog::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("baseline role"));
    }

    #[test]
    fn load_reads_catalog_file() {
        let path = std::env::temp_dir().join(format!("ef_catalog_{}.toml", uuid::Uuid::now_v7()));
        let builtin = InstructionCatalog::builtin();
        std::fs::write(&path, toml::to_string(&builtin).unwrap()).unwrap();

        let config = InstructionsConfig {
            catalog_path: Some(path.to_string_lossy().into_owned()),
        };
        let loaded = InstructionCatalog::load(&config).expect("load");
        assert_eq!(loaded.roles, builtin.roles);

        let _ = std::fs::remove_file(&path);
    }
}
