//! Shared types, error model, and configuration for the catalog enricher.
//!
//! This crate is the foundation depended on by all other enricher crates.
//! It provides:
//! - [`EnricherError`]: the unified error type
//! - Domain types ([`Product`], [`Specification`], [`EnrichedProduct`], [`OutputArtifact`])
//! - Configuration ([`AppConfig`], [`GenerationConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GenerationConfig, OpenRouterConfig, PipelineConfig, PipelineSection, RetryConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{EnricherError, Result};
pub use types::{
    Catalog, Category, EnrichedProduct, GeneratedCopy, GraphicArea, LEGACY_NOTES_KEY,
    OutputArtifact, OutputStats, PRINT_METHOD_NOT_APPLICABLE, PaperFormat, Product,
    ProductDimensions, RecordId, Specification,
};
