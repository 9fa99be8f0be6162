//! The compliance-check pipeline.
//!
//! [`Pipeline::check`] takes one piece of ad copy through identification,
//! taxonomy filtering, concurrent per-tag evidence retrieval, risk
//! aggregation and advisory generation, and assembles a
//! [`ComplianceReport`](adsentry_core::ComplianceReport). Only empty input is
//! an error; every upstream failure degrades to a neutral partial result.

mod assemble;
mod context;
mod orchestrator;
mod retriever;
mod risk;

#[cfg(test)]
mod testing;

pub use assemble::assemble;
pub use context::{AppContext, Settings};
pub use orchestrator::{Pipeline, Stage};
pub use retriever::EvidenceRetriever;
pub use risk::{RiskAggregator, RiskAssessment};
