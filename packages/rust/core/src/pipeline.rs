//! End-to-end question pipeline:
//! request → validation → cache read → directive → cascade → cache write →
//! response assembly → total-failure guard.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use examforge_backends::Backend;
use examforge_shared::{
    ExamForgeError, GenerationRequest, PipelineConfig, Question, QuestionContent, Result,
};
use examforge_storage::ContentStore;

use crate::cache::{CacheReader, CacheWriter};
use crate::cascade::GenerationCascade;
use crate::catalog::InstructionCatalog;
use crate::instructions::{InstructionAssembler, needed_count};
use crate::request::ValidatedRequest;
use crate::response::ResponseAssembler;

/// Counters describing one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStats {
    pub requested: usize,
    pub cache_hits: usize,
    pub needed: usize,
    pub generated: usize,
    pub served: usize,
    /// Backend that supplied the generated items, if any.
    pub backend: Option<String>,
    pub attempts: usize,
    pub elapsed_ms: u64,
}

/// Result of a successful run.
#[derive(Debug)]
pub struct PipelineOutput {
    pub questions: Vec<Question>,
    pub stats: PipelineStats,
    /// Detached cache write for the generated items. Callers that exit
    /// right after the run (the CLI, tests) await it; the server drops it.
    pub persist: Option<JoinHandle<()>>,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the run completes successfully.
    fn done(&self, stats: &PipelineStats);
}

/// No-op progress reporter for headless/server usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _stats: &PipelineStats) {}
}

/// Fail only when nothing at all could be assembled.
pub fn guard_total_failure(questions: Vec<Question>) -> Result<Vec<Question>> {
    if questions.is_empty() {
        return Err(ExamForgeError::ContentUnavailable);
    }
    Ok(questions)
}

/// The cache-augmented generation pipeline. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct QuestionPipeline {
    config: PipelineConfig,
    assembler: InstructionAssembler,
    reader: CacheReader,
    cascade: GenerationCascade,
    writer: CacheWriter,
}

impl QuestionPipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<InstructionCatalog>,
        store: Arc<dyn ContentStore>,
        backends: Vec<Arc<dyn Backend>>,
    ) -> Self {
        Self {
            assembler: InstructionAssembler::new(catalog),
            reader: CacheReader::new(Arc::clone(&store), config.oversample_factor),
            cascade: GenerationCascade::new(backends, config.attempt_timeout),
            writer: CacheWriter::new(store, config.cache_write_timeout),
            config,
        }
    }

    /// Generative backends in priority order.
    pub fn backend_names(&self) -> Vec<String> {
        self.cascade.backend_names()
    }

    pub fn validate(&self, request: &GenerationRequest) -> Result<ValidatedRequest> {
        ValidatedRequest::validate(request, &self.config, self.assembler.catalog())
    }

    /// Serve one request.
    ///
    /// Returns at most `count` questions, cache hits first. Fails with
    /// [`ExamForgeError::Validation`] for a bad request and with
    /// [`ExamForgeError::ContentUnavailable`] when neither the cache nor any
    /// backend produced a single question. Every other failure is absorbed.
    #[instrument(skip_all, fields(role = %request.role, count = ?request.count, force_refresh = request.force_refresh))]
    pub async fn run(
        &self,
        request: &GenerationRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutput> {
        let start = Instant::now();
        let request = self.validate(request)?;
        let filter = request.filter();

        let mut stats = PipelineStats {
            requested: request.count,
            ..Default::default()
        };

        // --- Phase 1: Cache ---
        let cached = if request.force_refresh {
            debug!("force refresh, bypassing cache");
            Vec::new()
        } else {
            progress.phase("Reading cache");
            self.reader.read(&filter, request.count).await
        };
        stats.cache_hits = cached.len();
        stats.needed = needed_count(request.count, cached.len());

        // --- Phase 2: Generation ---
        let mut generated: Vec<QuestionContent> = Vec::new();
        let mut persist = None;

        if stats.needed > 0 {
            progress.phase("Generating questions");
            let payload = self.assembler.assemble(&request, stats.needed);
            debug!(
                mode = %request.competency.mode,
                fingerprint = %payload.fingerprint,
                "assembled directive"
            );

            let outcome = self.cascade.run(&payload).await;
            stats.attempts = outcome.attempts;
            stats.backend = outcome.backend;
            generated = outcome.questions;
            stats.generated = generated.len();

            // --- Phase 3: Persist (detached) ---
            if !generated.is_empty() {
                persist = Some(self.writer.persist(
                    &filter,
                    generated.clone(),
                    Some(payload.fingerprint),
                ));
            }
        }

        // --- Phase 4: Assemble ---
        progress.phase("Assembling response");
        let responder = ResponseAssembler::new(
            request.competency.requested.as_deref(),
            request.area.as_deref(),
        );
        let questions = responder.assemble(cached, generated, request.count);

        let questions = match guard_total_failure(questions) {
            Ok(questions) => questions,
            Err(e) => {
                warn!(
                    role = %request.role,
                    attempts = stats.attempts,
                    "no questions available from cache or backends"
                );
                return Err(e);
            }
        };

        stats.served = questions.len();
        stats.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            requested = stats.requested,
            cache_hits = stats.cache_hits,
            generated = stats.generated,
            served = stats.served,
            backend = stats.backend.as_deref().unwrap_or("-"),
            elapsed_ms = stats.elapsed_ms,
            "pipeline complete"
        );
        progress.done(&stats);

        Ok(PipelineOutput {
            questions,
            stats,
            persist,
        })
    }
}
