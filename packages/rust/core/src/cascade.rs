//! Prioritized fallback across generative backends.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use examforge_backends::{Backend, BackendError};
use examforge_shared::{InstructionPayload, QuestionContent};

use crate::extract::{ExtractError, extract_questions};

/// Why one backend attempt produced nothing usable.
#[derive(Debug, thiserror::Error)]
enum AttemptFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("attempt timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("unusable output: {0}")]
    Extract(#[from] ExtractError),

    #[error("output contained no valid questions")]
    NoValidCandidates,
}

/// Result of running the cascade.
#[derive(Debug, Clone, Default)]
pub struct CascadeOutcome {
    /// Valid questions from the first backend that produced any.
    pub questions: Vec<QuestionContent>,
    /// Name of that backend; `None` when every backend failed.
    pub backend: Option<String>,
    /// Number of backends invoked.
    pub attempts: usize,
}

/// Ordered list of backends tried until one yields at least one valid item.
#[derive(Clone)]
pub struct GenerationCascade {
    backends: Vec<Arc<dyn Backend>>,
    attempt_timeout: Duration,
}

impl GenerationCascade {
    pub fn new(backends: Vec<Arc<dyn Backend>>, attempt_timeout: Duration) -> Self {
        Self {
            backends,
            attempt_timeout,
        }
    }

    /// Backend names in priority order.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    async fn attempt(
        &self,
        backend: &dyn Backend,
        payload: &InstructionPayload,
    ) -> Result<Vec<QuestionContent>, AttemptFailure> {
        let raw = tokio::time::timeout(self.attempt_timeout, backend.invoke(payload))
            .await
            .map_err(|_| AttemptFailure::Timeout(self.attempt_timeout))??;

        let questions = extract_questions(&raw)?;
        if questions.is_empty() {
            return Err(AttemptFailure::NoValidCandidates);
        }
        Ok(questions)
    }

    /// Try each backend in order. The first one returning at least one valid
    /// question ends the cascade, even if it returned fewer than asked for.
    /// Exhaustion yields an empty outcome, never an error.
    #[instrument(skip_all, fields(backends = self.backends.len(), fingerprint = %payload.fingerprint))]
    pub async fn run(&self, payload: &InstructionPayload) -> CascadeOutcome {
        let mut outcome = CascadeOutcome::default();

        for backend in &self.backends {
            outcome.attempts += 1;
            let started = Instant::now();

            match self.attempt(backend.as_ref(), payload).await {
                Ok(questions) => {
                    info!(
                        backend = backend.name(),
                        valid = questions.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "backend produced questions"
                    );
                    outcome.questions = questions;
                    outcome.backend = Some(backend.name().to_string());
                    return outcome;
                }
                Err(e) => {
                    warn!(
                        backend = backend.name(),
                        error = %e,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "backend attempt failed, trying next"
                    );
                }
            }
        }

        warn!(attempts = outcome.attempts, "all generative backends failed");
        outcome
    }
}

impl std::fmt::Debug for GenerationCascade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationCascade")
            .field("backends", &self.backend_names())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    /// Scripted backend for cascade and pipeline tests.
    pub(crate) struct MockBackend {
        name: String,
        reply: Result<String, String>,
        delay: Duration,
        pub(crate) calls: AtomicUsize,
    }

    impl MockBackend {
        pub(crate) fn ok(name: &str, body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                reply: Ok(body.into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                reply: Err("HTTP 500".into()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn slow(name: &str, delay: Duration, body: impl Into<String>) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                reply: Ok(body.into()),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn invoke(&self, _payload: &InstructionPayload) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone().map_err(|message| BackendError::Provider {
                backend: self.name.clone(),
                status: 500,
                message,
            })
        }
    }

    /// JSON array with `n` valid questions, texts prefixed by `tag`.
    pub(crate) fn valid_batch(tag: &str, n: usize) -> String {
        let items: Vec<serde_json::Value> = (0..n)
            .map(|i| {
                let letter = ["A", "B", "C", "D"][i % 4];
                serde_json::json!({
                    "text": format!("{tag} {i}"),
                    "context": "contexto",
                    "options": [
                        {"id": "A", "text": "a"},
                        {"id": "B", "text": "b"},
                        {"id": "C", "text": "c"},
                        {"id": "D", "text": "d"}
                    ],
                    "correctOptionId": letter,
                })
            })
            .collect();
        serde_json::to_string(&items).unwrap()
    }

    pub(crate) fn payload() -> InstructionPayload {
        InstructionPayload {
            system: "sistema".into(),
            user: "usuario".into(),
            fingerprint: "0123456789abcdef0123".into(),
        }
    }

    fn cascade(backends: Vec<Arc<dyn Backend>>) -> GenerationCascade {
        GenerationCascade::new(backends, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn first_success_stops_the_cascade() {
        let primary = MockBackend::ok("primary", valid_batch("p", 3));
        let secondary = MockBackend::ok("secondary", valid_batch("s", 3));
        let outcome = cascade(vec![primary.clone(), secondary.clone()])
            .run(&payload())
            .await;

        assert_eq!(outcome.backend.as_deref(), Some("primary"));
        assert_eq!(outcome.questions.len(), 3);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn unparsable_primary_falls_through_to_secondary() {
        let primary = MockBackend::ok("primary", "no puedo generar eso");
        let secondary = MockBackend::ok("secondary", valid_batch("s", 2));
        let outcome = cascade(vec![primary.clone(), secondary]).run(&payload()).await;

        assert_eq!(outcome.backend.as_deref(), Some("secondary"));
        assert_eq!(outcome.questions.len(), 2);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(primary.call_count(), 1);
    }

    #[tokio::test]
    async fn all_invalid_batch_counts_as_failure() {
        let primary = MockBackend::ok(
            "primary",
            r#"[{"text":"x","options":[],"correctOptionId":"A"}]"#,
        );
        let secondary = MockBackend::ok("secondary", valid_batch("s", 1));
        let outcome = cascade(vec![primary, secondary]).run(&payload()).await;
        assert_eq!(outcome.backend.as_deref(), Some("secondary"));
    }

    #[tokio::test]
    async fn short_batch_is_accepted_without_advancing() {
        let primary = MockBackend::ok("primary", valid_batch("p", 1));
        let secondary = MockBackend::ok("secondary", valid_batch("s", 5));
        let outcome = cascade(vec![primary, secondary.clone()]).run(&payload()).await;
        assert_eq!(outcome.questions.len(), 1);
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn exhaustion_is_empty_not_error() {
        let outcome = cascade(vec![MockBackend::failing("a"), MockBackend::failing("b")])
            .run(&payload())
            .await;
        assert!(outcome.backend.is_none());
        assert!(outcome.questions.is_empty());
        assert_eq!(outcome.attempts, 2);

        let outcome = cascade(Vec::new()).run(&payload()).await;
        assert!(outcome.backend.is_none());
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn slow_backend_times_out_and_cascade_advances() {
        let slow = MockBackend::slow("slow", Duration::from_secs(10), valid_batch("x", 2));
        let fast = MockBackend::ok("fast", valid_batch("f", 2));
        let cascade = GenerationCascade::new(vec![slow, fast], Duration::from_millis(50));
        let outcome = cascade.run(&payload()).await;
        assert_eq!(outcome.backend.as_deref(), Some("fast"));
    }

    #[test]
    fn names_follow_priority_order() {
        let c = cascade(vec![MockBackend::failing("gemini"), MockBackend::failing("groq")]);
        assert_eq!(c.backend_names(), ["gemini", "groq"]);
    }
}
