//! Batch enrichment for product catalogs.
//!
//! This crate ties together specification extraction, copy generation, and
//! checkpointing into the resumable `run_enrichment` workflow.

pub mod catalog;
pub mod enrichment;
pub mod prompt;
