//! Request validation.

use examforge_shared::{CacheFilter, ExamForgeError, GenerationRequest, PipelineConfig, Result};
use tracing::debug;

use crate::catalog::InstructionCatalog;
use crate::competency::ResolvedCompetency;

/// A request that passed validation, with its competency resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Cache key for the role: the catalog's spelling for known roles, the
    /// client's (trimmed) otherwise.
    pub role: String,
    /// Catalog role whose context drives generation (may be the baseline).
    pub profile_role: String,
    pub area: Option<String>,
    pub count: usize,
    pub force_refresh: bool,
    pub competency: ResolvedCompetency,
}

impl ValidatedRequest {
    pub fn validate(
        request: &GenerationRequest,
        config: &PipelineConfig,
        catalog: &InstructionCatalog,
    ) -> Result<Self> {
        let role = request.role.trim();
        if role.is_empty() {
            return Err(ExamForgeError::validation("role must not be empty"));
        }

        let count = request.count.unwrap_or(config.default_count);
        if count == 0 {
            return Err(ExamForgeError::validation("count must be at least 1"));
        }
        if count > config.max_count {
            return Err(ExamForgeError::validation(format!(
                "count must not exceed {}",
                config.max_count
            )));
        }

        let profile = catalog.role(role);
        let competency = ResolvedCompetency::resolve(profile, request.competency.as_deref());

        let cache_role = if catalog.knows_role(role) {
            profile.name.clone()
        } else {
            debug!(role, baseline = %profile.name, "unknown role, using baseline context");
            role.to_string()
        };

        Ok(Self {
            role: cache_role,
            profile_role: profile.name.clone(),
            area: non_blank(request.area.as_deref()),
            count,
            force_refresh: request.force_refresh,
            competency,
        })
    }

    /// Category filter for cache reads and writes.
    pub fn filter(&self) -> CacheFilter {
        CacheFilter {
            role: self.role.clone(),
            area: self.area.clone(),
            competency: self.competency.requested.clone(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
