//! Risk arithmetic: per-tag prevalence and how several tags combine.
//!
//! A tag's risk is the share of historical cases flagged with it. When one
//! submission triggers several tags the individual risks are combined under a
//! [`RiskPolicy`]:
//!
//! - `CombinedProbability` (default): `1 - Π(1 - rᵢ)`. Each tag is an
//!   independent chance of violation, so simultaneous violations compound and
//!   the score never decreases as tags are added.
//! - `Max`: the single worst tag. Tags act as independent alarms.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskPolicy {
    Max,
    #[default]
    CombinedProbability,
}

impl RiskPolicy {
    /// Combine per-tag risks. Inputs are clamped to `[0, 1]`; NaN counts as 0.
    ///
    /// An empty input yields 0.0 under both policies, and a 0.0 risk never
    /// changes the result.
    pub fn combine<I>(&self, risks: I) -> f64
    where
        I: IntoIterator<Item = f64>,
    {
        let risks = risks.into_iter().map(clamp_unit);
        match self {
            Self::Max => risks.fold(0.0, f64::max),
            Self::CombinedProbability => {
                let survive: f64 = risks.map(|r| 1.0 - r).product();
                clamp_unit(1.0 - survive)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Max => "max",
            Self::CombinedProbability => "combined-probability",
        }
    }
}

impl fmt::Display for RiskPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "combined-probability" | "combined" | "probability" => Ok(Self::CombinedProbability),
            other => Err(format!(
                "unknown risk policy {other:?} (expected \"max\" or \"combined-probability\")"
            )),
        }
    }
}

/// Share of `total` cases that are flagged; 0.0 when there are no cases.
pub fn prevalence(flagged: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    clamp_unit(flagged as f64 / total as f64)
}

/// Coarse banding of a risk score for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const MEDIUM_FROM: f64 = 0.3;
    pub const HIGH_FROM: f64 = 0.6;

    pub fn from_score(score: f64) -> Self {
        let score = clamp_unit(score);
        if score >= Self::HIGH_FROM {
            Self::High
        } else if score >= Self::MEDIUM_FROM {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn empty_set_is_zero() {
        assert_eq!(RiskPolicy::Max.combine([]), 0.0);
        assert_eq!(RiskPolicy::CombinedProbability.combine([]), 0.0);
    }

    #[test]
    fn single_tag_is_its_own_risk() {
        for policy in [RiskPolicy::Max, RiskPolicy::CombinedProbability] {
            assert!((policy.combine([0.37]) - 0.37).abs() < EPS, "{policy}");
        }
    }

    #[test]
    fn combined_probability_compounds() {
        let r = RiskPolicy::CombinedProbability.combine([0.5, 0.5]);
        assert!((r - 0.75).abs() < EPS);
        assert_eq!(RiskPolicy::Max.combine([0.5, 0.5]), 0.5);
    }

    #[test]
    fn combined_probability_is_monotone() {
        let policy = RiskPolicy::CombinedProbability;
        let mut risks = Vec::new();
        let mut prev = policy.combine(risks.iter().copied());
        for r in [0.1, 0.0, 0.35, 0.8, 0.02, 1.0, 0.4] {
            risks.push(r);
            let next = policy.combine(risks.iter().copied());
            assert!(next >= prev, "adding {r} lowered risk {prev} -> {next}");
            prev = next;
        }
        assert_eq!(prev, 1.0);
    }

    #[test]
    fn zero_risk_is_identity() {
        for policy in [RiskPolicy::Max, RiskPolicy::CombinedProbability] {
            let base = policy.combine([0.2, 0.4]);
            assert!((policy.combine([0.2, 0.0, 0.4]) - base).abs() < EPS);
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        assert_eq!(RiskPolicy::Max.combine([1.7, -3.0]), 1.0);
        assert_eq!(RiskPolicy::CombinedProbability.combine([f64::NAN]), 0.0);
    }

    #[test]
    fn prevalence_handles_zero_total() {
        assert_eq!(prevalence(0, 0), 0.0);
        assert_eq!(prevalence(5, 0), 0.0);
        assert!((prevalence(1, 4) - 0.25).abs() < EPS);
    }

    #[test]
    fn policy_parses_from_config() {
        assert_eq!("max".parse::<RiskPolicy>(), Ok(RiskPolicy::Max));
        assert_eq!(
            "Combined-Probability".parse::<RiskPolicy>(),
            Ok(RiskPolicy::CombinedProbability)
        );
        assert!("median".parse::<RiskPolicy>().is_err());
        assert_eq!(RiskPolicy::default(), RiskPolicy::CombinedProbability);
    }

    #[test]
    fn level_bands() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.29), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(2.0), RiskLevel::High);
    }
}
