//! Cache-augmented question generation for ExamForge.
//!
//! This crate ties together the question cache, the instruction catalog and
//! the generative backends into a single request pipeline
//! ([`pipeline::QuestionPipeline`]).

pub mod cache;
pub mod cascade;
pub mod catalog;
pub mod competency;
pub mod extract;
pub mod instructions;
pub mod pipeline;
pub mod request;
pub mod response;

pub use cache::{CacheReader, CacheWriter};
pub use cascade::{CascadeOutcome, GenerationCascade};
pub use catalog::{InstructionCatalog, RoleProfile, SubCompetency};
pub use competency::{ContentMode, ResolvedCompetency};
pub use extract::{ExtractError, extract_questions};
pub use instructions::InstructionAssembler;
pub use pipeline::{
    PipelineOutput, PipelineStats, ProgressReporter, QuestionPipeline, SilentProgress,
    guard_total_failure,
};
pub use request::ValidatedRequest;
pub use response::ResponseAssembler;
