//! Closed taxonomy of advertising-violation tags.
//!
//! Every tag belongs to exactly one category bucket and maps one-to-one to a
//! flag column of the `violation_cases` table. The registry is the only way to
//! obtain a [`Tag`], so storage and index code never receives a name that was
//! not validated against it.
//!
//! # Category buckets
//!
//! - 提及醫療與治療行為: claims of medical treatment
//! - 宣稱生理機能改變: claims of changing physiological function
//! - 語氣過度誇大與絕對: exaggerated or absolute wording
//! - 提及權威與高風險疾病: appeals to authority, high-risk diseases

use std::collections::{BTreeSet, HashMap};

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Builtin taxonomy: category → `(tag name, storage column)`.
const BUILTIN: &[(&str, &[(&str, &str)])] = &[
    (
        "提及醫療與治療行為",
        &[
            ("治療", "tag_treatment"),
            ("症狀緩解", "tag_symptom_relief"),
            ("預防", "tag_prevention"),
            ("痊癒", "tag_cure"),
            ("消腫", "tag_swelling"),
            ("矯正復健", "tag_rehabilitation"),
            ("療法", "tag_therapy"),
            ("傷口護理", "tag_wound_care"),
        ],
    ),
    (
        "宣稱生理機能改變",
        &[
            ("再生抗老", "tag_anti_aging"),
            ("增生", "tag_proliferation"),
            ("活化機能", "tag_activation"),
            ("燃脂瘦身", "tag_slimming"),
            ("排毒解酒", "tag_detox"),
            ("拉提緊緻", "tag_lifting"),
            ("生髮育髮", "tag_hair_growth"),
            ("豐胸", "tag_breast_enhancement"),
            ("長高發育", "tag_growth"),
            ("生殖機能", "tag_reproductive"),
            ("睡眠情緒", "tag_sleep_mood"),
            ("免疫體質", "tag_immunity"),
        ],
    ),
    (
        "語氣過度誇大與絕對",
        &[
            ("唯一第一", "tag_top_rank"),
            ("完全永久", "tag_permanent"),
            ("奇蹟神效", "tag_miracle"),
            ("保證承諾", "tag_guarantee"),
            ("立即速效", "tag_immediate_effect"),
        ],
    ),
    (
        "提及權威與高風險疾病",
        &[
            ("臨床實驗", "tag_clinical_trial"),
            ("醫師專家", "tag_expert"),
            ("見證推薦", "tag_testimonial"),
            ("癌症", "tag_cancer"),
            ("三高心血管", "tag_cardiovascular"),
            ("發炎", "tag_inflammation"),
        ],
    ),
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxonomyError {
    #[error("duplicate tag name: {0}")]
    DuplicateTag(String),

    #[error("duplicate storage column: {0}")]
    DuplicateColumn(String),

    #[error("invalid storage column identifier: {0:?}")]
    InvalidColumn(String),

    #[error("empty tag name in category {0:?}")]
    EmptyName(String),
}

/// A validated violation tag.
///
/// Only [`TagRegistry`] hands these out. Serialises as its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    name: String,
    category: String,
    column: String,
}

impl Tag {
    /// Canonical name, as the language model is asked to emit it.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category bucket this tag belongs to.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Flag column in the relational store (always `[a-z0-9_]+`).
    pub fn column(&self) -> &str {
        &self.column
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Bidirectional tag registry: name ↔ column, grouped by category.
///
/// Built once at startup and shared behind an `Arc`; never mutated afterwards.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    tags: Vec<Tag>,
    by_name: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl TagRegistry {
    /// The 31-tag taxonomy used for Taiwanese food, cosmetic, medicine and
    /// device advertising.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for (category, entries) in BUILTIN {
            for (name, column) in *entries {
                registry.push(category, name, column);
            }
        }
        registry
    }

    /// Build a registry from `(category, name, column)` triples.
    ///
    /// Names and columns must be unique; columns must be lowercase ASCII
    /// identifiers since they are interpolated into SQL and index filters.
    pub fn from_table<I, S>(entries: I) -> Result<Self, TaxonomyError>
    where
        I: IntoIterator<Item = (S, S, S)>,
        S: AsRef<str>,
    {
        let mut registry = Self::empty();
        for (category, name, column) in entries {
            let (category, name, column) =
                (category.as_ref(), name.as_ref().trim(), column.as_ref());
            if name.is_empty() {
                return Err(TaxonomyError::EmptyName(category.to_string()));
            }
            if !is_identifier(column) {
                return Err(TaxonomyError::InvalidColumn(column.to_string()));
            }
            if registry.by_name.contains_key(name) {
                return Err(TaxonomyError::DuplicateTag(name.to_string()));
            }
            if registry.by_column.contains_key(column) {
                return Err(TaxonomyError::DuplicateColumn(column.to_string()));
            }
            registry.push(category, name, column);
        }
        Ok(registry)
    }

    fn empty() -> Self {
        Self {
            tags: Vec::new(),
            by_name: HashMap::new(),
            by_column: HashMap::new(),
        }
    }

    fn push(&mut self, category: &str, name: &str, column: &str) {
        let idx = self.tags.len();
        self.tags.push(Tag {
            name: name.to_string(),
            category: category.to_string(),
            column: column.to_string(),
        });
        self.by_name.insert(name.to_string(), idx);
        self.by_column.insert(column.to_string(), idx);
    }

    /// Look up a tag by name. Surrounding whitespace is ignored.
    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.by_name.get(name.trim()).map(|&i| &self.tags[i])
    }

    /// Storage column for a tag name, if the name is in the taxonomy.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.get(name).map(Tag::column)
    }

    /// Reverse lookup: the tag stored in `column`.
    pub fn tag_for_column(&self, column: &str) -> Option<&Tag> {
        self.by_column.get(column).map(|&i| &self.tags[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True if `tag` is exactly the tag this registry holds under its name.
    pub fn recognises(&self, tag: &Tag) -> bool {
        self.get(&tag.name) == Some(tag)
    }

    /// The closed set of valid tag names.
    pub fn all_tags(&self) -> BTreeSet<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }

    /// All tags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.iter()
    }

    /// All flag columns in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.column.as_str())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Category buckets in declaration order, each with its tags.
    pub fn categories(&self) -> Vec<(&str, Vec<&Tag>)> {
        let mut out: Vec<(&str, Vec<&Tag>)> = Vec::new();
        for tag in &self.tags {
            match out.iter_mut().find(|(c, _)| *c == tag.category) {
                Some((_, tags)) => tags.push(tag),
                None => out.push((tag.category.as_str(), vec![tag])),
            }
        }
        out
    }

    /// Render the taxonomy as the bullet list embedded in identification prompts.
    ///
    /// `- 【category】: tag_a, tag_b`
    pub fn prompt_listing(&self) -> String {
        let mut out = String::new();
        for (category, tags) in self.categories() {
            let names: Vec<&str> = tags.iter().map(|t| t.name()).collect();
            out.push_str(&format!("- 【{category}】: {}\n", names.join(", ")));
        }
        out
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
        && !s.as_bytes()[0].is_ascii_digit()
}
