//! Shared types, error model, and configuration for ExamForge.
//!
//! This crate is the foundation depended on by all other ExamForge crates.
//! It provides:
//! - [`ExamForgeError`]: the unified error type
//! - Domain types ([`Question`], [`QuestionContent`], [`CacheRecord`], [`GenerationRequest`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, BackendKind, GenerationConfig, InstructionsConfig, PipelineConfig,
    ServerConfig, StorageConfig, StorageKind, config_dir, config_file_path, init_config,
    load_config, load_config_from, resolve_api_key, validate_config,
};
pub use error::{ExamForgeError, Result};
pub use types::{
    BloomLevel, CacheFilter, CacheRecord, CacheStat, GenerationRequest, InstructionPayload,
    Normative, NormativeDraft, OptionId, Provenance, Question, QuestionContent, QuestionOption,
    RecordId,
};
