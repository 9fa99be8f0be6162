//! Final report assembly from the outputs of every stage.

use std::collections::HashSet;

use adsentry_core::{
    Advisory, CaseReference, CitedCase, ComplianceReport, EvidenceGroup, Highlight,
    Identification, Location, RiskLevel, Tag,
};

use crate::RiskAssessment;

/// Build the report for `text`.
///
/// Emits one highlight per occurrence of each (tag, trigger word) pair in
/// identification order, then highlights for phrases the advisor analysed
/// under an identified tag that the identifier did not list. Each pair is
/// emitted once. A phrase absent from the text yields a single highlight at
/// [`Location::NotFound`], and so does an identified tag with no trigger
/// words, under an empty trigger.
pub fn assemble(
    text: &str,
    identification: &Identification,
    dropped_tags: Vec<String>,
    risk: &RiskAssessment,
    evidence: &[EvidenceGroup],
    advisory: &Advisory,
) -> ComplianceReport {
    let mut highlights = Vec::new();
    let mut emitted: HashSet<(&Tag, &str)> = HashSet::new();

    for identified in &identification.identified_tags {
        if identified.trigger_words.is_empty() && emitted.insert((&identified.tag, "")) {
            push_highlights(&mut highlights, text, &identified.tag, "", risk, evidence, advisory);
        }
        for trigger in &identified.trigger_words {
            if emitted.insert((&identified.tag, trigger.trim())) {
                push_highlights(&mut highlights, text, &identified.tag, trigger, risk, evidence, advisory);
            }
        }
    }

    for analysis in &advisory.analyses {
        if identification.contains(&analysis.tag)
            && emitted.insert((&analysis.tag, analysis.trigger_word.trim()))
        {
            push_highlights(
                &mut highlights,
                text,
                &analysis.tag,
                &analysis.trigger_word,
                risk,
                evidence,
                advisory,
            );
        }
    }

    ComplianceReport {
        industry: identification.industry,
        risk: risk.combined,
        risk_level: RiskLevel::from_score(risk.combined),
        tag_risks: risk.per_tag.clone(),
        highlights,
        suggestion: advisory.rewrite.clone(),
        dropped_tags,
    }
}

fn push_highlights(
    out: &mut Vec<Highlight>,
    text: &str,
    tag: &Tag,
    trigger: &str,
    risk: &RiskAssessment,
    evidence: &[EvidenceGroup],
    advisory: &Advisory,
) {
    let analysis = advisory.analysis_for(tag, trigger);
    let cases: Vec<CaseReference> = analysis
        .map(|a| {
            a.reference_cases
                .iter()
                .map(|c| resolve_case(c, tag, evidence))
                .collect()
        })
        .unwrap_or_default();

    for location in Location::locate_all(text, trigger) {
        out.push(Highlight {
            tag: tag.clone(),
            tag_risk: risk.risk_of(tag),
            trigger: trigger.to_string(),
            location,
            rationale: analysis.map(|a| a.reason.clone()).unwrap_or_default(),
            law: analysis.map(|a| a.law.clone()).unwrap_or_default(),
            suggestion: analysis.map(|a| a.suggestion.clone()).unwrap_or_default(),
            cases: cases.clone(),
        });
    }
}

/// Recover a cited case's source link: the tag's own evidence first, then
/// any group. Unmatched citations keep an empty link.
fn resolve_case(cited: &CitedCase, tag: &Tag, evidence: &[EvidenceGroup]) -> CaseReference {
    let own = evidence
        .iter()
        .filter(|g| &g.tag == tag)
        .find_map(|g| g.find(&cited.product_name, &cited.date));
    let found = own.or_else(|| {
        evidence
            .iter()
            .find_map(|g| g.find(&cited.product_name, &cited.date))
    });
    CaseReference {
        product_name: cited.product_name.clone(),
        date: cited.date.clone(),
        link: found.map(|c| c.link.clone()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsentry_core::{Analysis, IdentifiedTag, Industry, RetrievedCase, TagRegistry, TagRisk};

    const TEXT: &str = "這款產品能幫你甩油，保證三天甩油成功";

    fn slimming(reg: &TagRegistry) -> Tag {
        reg.get("燃脂瘦身").unwrap().clone()
    }

    fn identification(reg: &TagRegistry) -> Identification {
        Identification {
            industry: Industry::Food,
            identified_tags: vec![
                IdentifiedTag {
                    tag: slimming(reg),
                    trigger_words: vec!["甩油".into(), "暴瘦".into()],
                },
                IdentifiedTag {
                    tag: reg.get("保證承諾").unwrap().clone(),
                    trigger_words: vec!["保證".into()],
                },
            ],
        }
    }

    fn risk(reg: &TagRegistry) -> RiskAssessment {
        RiskAssessment {
            per_tag: vec![
                TagRisk { tag: slimming(reg), risk: 0.4 },
                TagRisk { tag: reg.get("保證承諾").unwrap().clone(), risk: 0.1 },
            ],
            combined: 0.46,
        }
    }

    fn evidence(reg: &TagRegistry) -> Vec<EvidenceGroup> {
        let case = |name: &str, date: &str, link: &str| RetrievedCase {
            case_id: "1".into(),
            product_name: name.into(),
            explanation: String::new(),
            law: String::new(),
            date: date.into(),
            link: link.into(),
            industry: Industry::Food,
            similarity_score: 0.9,
        };
        vec![
            EvidenceGroup {
                tag: slimming(reg),
                cases: vec![case("纖體茶", "2023-10", "https://a")],
            },
            EvidenceGroup {
                tag: reg.get("保證承諾").unwrap().clone(),
                cases: vec![case("保證錠", "2022-01", "https://b")],
            },
        ]
    }

    fn analysis(tag: Tag, trigger: &str, cited: &[(&str, &str)]) -> Analysis {
        Analysis {
            trigger_word: trigger.into(),
            tag,
            reason: format!("{trigger} 違規"),
            law: "食品安全衛生管理法第28條".into(),
            suggestion: "修改".into(),
            reference_cases: cited
                .iter()
                .map(|(p, d)| CitedCase { product_name: p.to_string(), date: d.to_string() })
                .collect(),
        }
    }

    #[test]
    fn one_highlight_per_occurrence_in_order() {
        let reg = TagRegistry::builtin();
        let report = assemble(
            TEXT,
            &identification(&reg),
            vec![],
            &risk(&reg),
            &evidence(&reg),
            &Advisory::empty(),
        );

        let spans: Vec<(&str, (i64, i64))> = report
            .highlights
            .iter()
            .map(|h| (h.trigger.as_str(), h.location.bounds()))
            .collect();
        assert_eq!(
            spans,
            vec![("甩油", (7, 9)), ("甩油", (14, 16)), ("暴瘦", (-1, -1)), ("保證", (10, 12))]
        );
        assert_eq!(report.highlights[0].tag_risk, 0.4);
        assert_eq!(report.risk_level, RiskLevel::Medium);
        assert!(report.suggestion.is_none());
        assert!(report.highlights.iter().all(|h| h.cases.is_empty() && h.rationale.is_empty()));
    }

    #[test]
    fn analyses_fill_details_and_links() {
        let reg = TagRegistry::builtin();
        let advisory = Advisory {
            analyses: vec![
                analysis(slimming(&reg), "甩油", &[("纖體茶", "2023-10"), ("保證錠", "2022-01"), ("不明", "2020")]),
            ],
            rewrite: Some("幫助維持體態".into()),
        };
        let report = assemble(TEXT, &identification(&reg), vec![], &risk(&reg), &evidence(&reg), &advisory);

        let first = &report.highlights[0];
        assert_eq!(first.rationale, "甩油 違規");
        assert_eq!(first.law, "食品安全衛生管理法第28條");
        let links: Vec<&str> = first.cases.iter().map(|c| c.link.as_str()).collect();
        assert_eq!(links, vec!["https://a", "https://b", ""]);
        assert_eq!(report.highlights[1].cases.len(), 3);
        assert_eq!(report.suggestion.as_deref(), Some("幫助維持體態"));
    }

    #[test]
    fn extra_analysed_phrase_is_appended() {
        let reg = TagRegistry::builtin();
        let advisory = Advisory {
            analyses: vec![analysis(slimming(&reg), "三天", &[])],
            rewrite: None,
        };
        let report = assemble(TEXT, &identification(&reg), vec![], &risk(&reg), &evidence(&reg), &advisory);
        let last = report.highlights.last().unwrap();
        assert_eq!(last.trigger, "三天");
        assert_eq!(last.location, Location::Found { start: 12, end: 14 });
    }

    #[test]
    fn repeated_extra_phrase_is_emitted_once() {
        let reg = TagRegistry::builtin();
        let advisory = Advisory {
            analyses: vec![
                analysis(slimming(&reg), "三天", &[]),
                analysis(slimming(&reg), " 三天", &[]),
                analysis(slimming(&reg), "甩油", &[]),
            ],
            rewrite: None,
        };
        let report = assemble(TEXT, &identification(&reg), vec![], &risk(&reg), &evidence(&reg), &advisory);
        let triggers: Vec<&str> = report.highlights.iter().map(|h| h.trigger.as_str()).collect();
        assert_eq!(triggers, vec!["甩油", "甩油", "暴瘦", "保證", "三天"]);
    }

    #[test]
    fn tag_without_trigger_words_still_gets_a_highlight() {
        let reg = TagRegistry::builtin();
        let identification = Identification {
            industry: Industry::Food,
            identified_tags: vec![IdentifiedTag {
                tag: slimming(&reg),
                trigger_words: vec![],
            }],
        };
        let report = assemble(TEXT, &identification, vec![], &risk(&reg), &evidence(&reg), &Advisory::empty());
        assert_eq!(report.highlights.len(), 1);
        let only = &report.highlights[0];
        assert_eq!(only.tag, slimming(&reg));
        assert_eq!(only.trigger, "");
        assert_eq!(only.location, Location::NotFound);
        assert_eq!(only.tag_risk, 0.4);
    }

    #[test]
    fn nothing_identified_is_clean() {
        let report = assemble(
            TEXT,
            &Identification::degraded(),
            vec!["高風險疾病".into()],
            &RiskAssessment::zero(),
            &[],
            &Advisory::empty(),
        );
        assert!(report.highlights.is_empty());
        assert_eq!(report.risk, 0.0);
        assert_eq!(report.dropped_tags, vec!["高風險疾病"]);
    }
}
