pub mod case;
pub mod locate;
pub mod report;
pub mod retry;
pub mod risk;
pub mod schema;
pub mod taxonomy;
pub mod validate;

pub use case::{CaseReference, EvidenceGroup, HistoricalCase, Industry, RetrievedCase};
pub use locate::{Location, Span, find_all, find_all_bytes};
pub use report::{
    Advisory, Analysis, ApiResponse, CitedCase, ComplianceReport, Highlight, Identification,
    IdentifiedTag, TagRisk,
};
pub use retry::RetryPolicy;
pub use risk::{RiskLevel, RiskPolicy, prevalence};
pub use schema::vectors;
pub use taxonomy::{Tag, TagRegistry, TaxonomyError};
pub use validate::{ValidationError, validate_text};
