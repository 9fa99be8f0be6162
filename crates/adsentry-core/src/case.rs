//! Historical adjudicated cases and the evidence drawn from them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::taxonomy::Tag;

/// Regulated product industry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Industry {
    Food,
    Cosmetic,
    Medicine,
    Device,
    #[default]
    Unknown,
}

impl Industry {
    pub const KNOWN: [Industry; 4] = [
        Industry::Food,
        Industry::Cosmetic,
        Industry::Medicine,
        Industry::Device,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "Food",
            Self::Cosmetic => "Cosmetic",
            Self::Medicine => "Medicine",
            Self::Device => "Device",
            Self::Unknown => "Unknown",
        }
    }

    /// Lenient parse of model or database output; anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "food" | "食品" => Self::Food,
            "cosmetic" | "cosmetics" | "化妝品" => Self::Cosmetic,
            "medicine" | "drug" | "藥品" => Self::Medicine,
            "device" | "medical device" | "醫療器材" => Self::Device,
            _ => Self::Unknown,
        }
    }

    /// `None` for `Unknown`, so it can be used directly as an optional filter.
    pub fn known(self) -> Option<Self> {
        (self != Self::Unknown).then_some(self)
    }
}

impl fmt::Display for Industry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Industry {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl Serialize for Industry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Industry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.map(|s| Self::parse_lenient(&s)).unwrap_or_default())
    }
}

/// An adjudicated case from the `violation_cases` table.
///
/// `tags` holds every tag whose flag column is set for this case.
#[derive(Debug, Clone, Serialize)]
pub struct HistoricalCase {
    pub id: i64,
    pub product_name: String,
    pub explanation: String,
    pub law: String,
    pub date: String,
    pub link: String,
    pub industry: Industry,
    pub tags: Vec<Tag>,
}

/// A historical case surfaced by similarity search for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedCase {
    pub case_id: String,
    pub product_name: String,
    pub explanation: String,
    pub law: String,
    pub date: String,
    pub link: String,
    #[serde(default)]
    pub industry: Industry,
    /// Cosine similarity to the query text, in `[0, 1]`.
    pub similarity_score: f32,
}

/// Retrieved cases for one identified tag, ranked by similarity.
#[derive(Debug, Clone, Serialize)]
pub struct EvidenceGroup {
    pub tag: Tag,
    pub cases: Vec<RetrievedCase>,
}

impl EvidenceGroup {
    pub fn empty(tag: Tag) -> Self {
        Self {
            tag,
            cases: Vec::new(),
        }
    }

    /// Find a case by product name and date, ignoring surrounding whitespace.
    pub fn find(&self, product_name: &str, date: &str) -> Option<&RetrievedCase> {
        self.cases
            .iter()
            .find(|c| c.product_name.trim() == product_name.trim() && c.date.trim() == date.trim())
    }
}

/// A case as shown to the user: enough to look it up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReference {
    pub product_name: String,
    pub date: String,
    /// Source link recovered from the evidence; empty when it could not be matched.
    pub link: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagRegistry;

    fn case(name: &str, date: &str) -> RetrievedCase {
        RetrievedCase {
            case_id: "1".into(),
            product_name: name.into(),
            explanation: String::new(),
            law: "食安法第28條".into(),
            date: date.into(),
            link: format!("https://example.test/{name}"),
            industry: Industry::Food,
            similarity_score: 0.9,
        }
    }

    #[test]
    fn industry_lenient_parse() {
        assert_eq!(Industry::parse_lenient("Food"), Industry::Food);
        assert_eq!(Industry::parse_lenient(" cosmetic "), Industry::Cosmetic);
        assert_eq!(Industry::parse_lenient("藥品"), Industry::Medicine);
        assert_eq!(Industry::parse_lenient("DEVICE"), Industry::Device);
        assert_eq!(Industry::parse_lenient("Supplements"), Industry::Unknown);
        assert_eq!(Industry::parse_lenient(""), Industry::Unknown);
    }

    #[test]
    fn industry_known_filters_unknown() {
        assert_eq!(Industry::Food.known(), Some(Industry::Food));
        assert_eq!(Industry::Unknown.known(), None);
    }

    #[test]
    fn industry_deserialises_null_and_garbage() {
        let v: Industry = serde_json::from_str("null").unwrap();
        assert_eq!(v, Industry::Unknown);
        let v: Industry = serde_json::from_str("\"Spaceship\"").unwrap();
        assert_eq!(v, Industry::Unknown);
        let v: Industry = serde_json::from_str("\"Medicine\"").unwrap();
        assert_eq!(v, Industry::Medicine);
    }

    #[test]
    fn evidence_lookup_by_name_and_date() {
        let reg = TagRegistry::builtin();
        let group = EvidenceGroup {
            tag: reg.get("燃脂瘦身").unwrap().clone(),
            cases: vec![case("XX綠茶", "2023-10"), case("YY膠囊", "2024-01")],
        };
        assert_eq!(group.find("XX綠茶", "2023-10").unwrap().case_id, "1");
        assert!(group.find("XX綠茶", "2024-01").is_none());
        assert_eq!(group.find(" YY膠囊", "2024-01 ").unwrap().product_name, "YY膠囊");
        assert!(group.find("ZZ茶", "2023-10").is_none());
    }

    #[test]
    fn retrieved_case_tolerates_missing_industry() {
        let json = r#"{
            "case_id": "42",
            "product_name": "XX綠茶",
            "explanation": "宣稱可消除腹部脂肪",
            "law": "食安法第28條",
            "date": "2024-01-15",
            "link": "",
            "similarity_score": 0.87
        }"#;
        let parsed: RetrievedCase = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.industry, Industry::Unknown);
        assert!((parsed.similarity_score - 0.87).abs() < 1e-6);
    }
}
