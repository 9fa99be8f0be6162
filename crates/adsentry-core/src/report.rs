//! Per-request results: what was identified, what the advisor said, and the
//! assembled compliance report.

use serde::{Deserialize, Serialize};

use crate::case::{CaseReference, Industry};
use crate::locate::Location;
use crate::risk::RiskLevel;
use crate::taxonomy::{Tag, TagRegistry};

/// A tag the identifier found, with the phrases that triggered it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentifiedTag {
    pub tag: Tag,
    /// Trimmed, non-empty, de-duplicated, in the order the model gave them.
    /// Not yet verified to occur in the text.
    pub trigger_words: Vec<String>,
}

/// Output of the identification stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Identification {
    pub industry: Industry,
    pub identified_tags: Vec<IdentifiedTag>,
}

impl Identification {
    /// The result used when identification fails: unknown industry, no tags.
    pub fn degraded() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.identified_tags.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.identified_tags.iter().map(|t| &t.tag)
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags().any(|t| t == tag)
    }

    /// Keep only tags `registry` recognises. Returns the names that were dropped.
    ///
    /// Filtering an already-filtered identification changes nothing.
    pub fn retain_known(&mut self, registry: &TagRegistry) -> Vec<String> {
        let mut dropped = Vec::new();
        self.identified_tags.retain(|it| {
            let keep = registry.recognises(&it.tag);
            if !keep {
                dropped.push(it.tag.name().to_string());
            }
            keep
        });
        dropped
    }
}

/// A case the advisor cited, as it named it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitedCase {
    pub product_name: String,
    pub date: String,
}

/// The advisor's explanation for one trigger phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub trigger_word: String,
    pub tag: Tag,
    pub reason: String,
    /// Legal citation, e.g. `食品安全衛生管理法第28條`.
    pub law: String,
    /// Phrase-level replacement hint.
    pub suggestion: String,
    /// At most two, all present in the evidence supplied to the advisor.
    pub reference_cases: Vec<CitedCase>,
}

/// Output of the advisory stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Advisory {
    pub analyses: Vec<Analysis>,
    /// A drop-in compliant rewrite of the whole text.
    pub rewrite: Option<String>,
}

impl Advisory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The analysis for `trigger` under `tag`, if the advisor produced one.
    pub fn analysis_for(&self, tag: &Tag, trigger: &str) -> Option<&Analysis> {
        self.analyses
            .iter()
            .find(|a| &a.tag == tag && a.trigger_word.trim() == trigger.trim())
    }
}

/// One highlighted occurrence of a trigger phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Highlight {
    pub tag: Tag,
    /// Historical prevalence of `tag`.
    pub tag_risk: f64,
    pub trigger: String,
    pub location: Location,
    pub rationale: String,
    pub law: String,
    pub suggestion: String,
    pub cases: Vec<CaseReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRisk {
    pub tag: Tag,
    pub risk: f64,
}

/// Final result of one compliance check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplianceReport {
    pub industry: Industry,
    /// Combined risk over all identified tags, in `[0, 1]`.
    pub risk: f64,
    pub risk_level: RiskLevel,
    pub tag_risks: Vec<TagRisk>,
    pub highlights: Vec<Highlight>,
    pub suggestion: Option<String>,
    /// Tag names the model produced that are not in the taxonomy.
    pub dropped_tags: Vec<String>,
}

impl ComplianceReport {
    /// A report for text where nothing was identified.
    pub fn clean(industry: Industry) -> Self {
        Self {
            industry,
            risk: 0.0,
            risk_level: RiskLevel::Low,
            tag_risks: Vec::new(),
            highlights: Vec::new(),
            suggestion: None,
            dropped_tags: Vec::new(),
        }
    }

    pub fn to_api(&self) -> ApiResponse {
        ApiResponse::from(self)
    }
}

// ── Request-facing shape ──

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub data: ApiData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiData {
    pub category: String,
    pub risk: f64,
    pub risk_level: RiskLevel,
    pub highlights: Vec<ApiHighlight>,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHighlight {
    pub original_text: String,
    /// `-1` when the phrase was not found in the text.
    pub start_index: i64,
    pub end_index: i64,
    pub tag: String,
    pub risk: f64,
    pub details: ApiDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDetails {
    pub reason: String,
    pub law: String,
    pub suggestion: String,
    pub cases: Vec<CaseReference>,
}

impl From<&ComplianceReport> for ApiResponse {
    fn from(report: &ComplianceReport) -> Self {
        let highlights = report
            .highlights
            .iter()
            .map(|h| {
                let (start_index, end_index) = h.location.bounds();
                ApiHighlight {
                    original_text: h.trigger.clone(),
                    start_index,
                    end_index,
                    tag: h.tag.name().to_string(),
                    risk: round3(h.tag_risk),
                    details: ApiDetails {
                        reason: h.rationale.clone(),
                        law: h.law.clone(),
                        suggestion: h.suggestion.clone(),
                        cases: h.cases.clone(),
                    },
                }
            })
            .collect();

        Self {
            status: "success".to_string(),
            data: ApiData {
                category: report.industry.to_string(),
                risk: round3(report.risk),
                risk_level: report.risk_level,
                highlights,
                suggestion: report.suggestion.clone().unwrap_or_default(),
            },
        }
    }
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
