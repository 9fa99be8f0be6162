//! Human-readable rendering of reports, the taxonomy and job results.

use adsentry_core::{ComplianceReport, Highlight, Location, TagRegistry, TagRisk};
use adsentry_sync::{SyncStats, TaggerStats};

const MAX_CASES: usize = 2;
const OPEN: char = '【';
const CLOSE: char = '】';

// ── Compliance report ──

/// Print a report as a vertical card: summary, marked-up text, then one
/// block per highlight.
pub fn print_report_card(text: &str, report: &ComplianceReport) {
    println!("=== Compliance check ===");
    println!("  {:<14} {}", "industry", report.industry);
    println!(
        "  {:<14} {:.2} ({})",
        "risk",
        report.risk,
        report.risk_level.as_str()
    );
    if !report.dropped_tags.is_empty() {
        println!("  {:<14} {}", "dropped tags", report.dropped_tags.join(", "));
    }
    println!();

    if report.highlights.is_empty() {
        println!("No violations identified.");
        return;
    }

    println!("Text");
    println!("  {}", mark_spans(text, &report.highlights));
    println!();

    if !report.tag_risks.is_empty() {
        println!("Tag risk");
        for TagRisk { tag, risk } in &report.tag_risks {
            println!("  {:<14} {:.2}", tag.name(), risk);
        }
        println!();
    }

    println!("Findings ({})", report.highlights.len());
    for h in &report.highlights {
        print_highlight(h);
    }

    if let Some(rewrite) = &report.suggestion {
        println!("Suggested rewrite");
        println!("  {rewrite}");
    }
}

fn print_highlight(h: &Highlight) {
    let at = match h.location {
        Location::Found { start, end } => format!("{start}..{end}"),
        Location::NotFound => "not in text".to_string(),
    };
    println!("  「{}」 {} [{}] risk {:.2}", h.trigger, h.tag.name(), at, h.tag_risk);
    if !h.rationale.is_empty() {
        println!("    {:<12} {}", "reason", h.rationale);
    }
    if !h.law.is_empty() {
        println!("    {:<12} {}", "law", h.law);
    }
    if !h.suggestion.is_empty() {
        println!("    {:<12} {}", "suggestion", h.suggestion);
    }
    for case in h.cases.iter().take(MAX_CASES) {
        print!("    {:<12} {} ({})", "case", case.product_name, case.date);
        if !case.link.is_empty() {
            print!("  {}", case.link);
        }
        println!();
    }
    println!();
}

/// Bracket every located span of `text`. Spans overlapping an earlier one
/// are left unmarked.
pub fn mark_spans(text: &str, highlights: &[Highlight]) -> String {
    let mut spans: Vec<(usize, usize)> = highlights
        .iter()
        .filter_map(|h| match h.location {
            Location::Found { start, end } if start < end => Some((start, end)),
            _ => None,
        })
        .collect();
    spans.sort_unstable();

    let mut kept: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for span in spans {
        if kept.last().is_none_or(|&(_, end)| span.0 >= end) {
            kept.push(span);
        }
    }

    let mut out = String::with_capacity(text.len() + kept.len() * 6);
    let mut next = kept.iter().peekable();
    let mut open_until = None;
    for (i, c) in text.chars().enumerate() {
        if open_until == Some(i) {
            out.push(CLOSE);
            open_until = None;
        }
        if let Some(&&(start, end)) = next.peek()
            && start == i
        {
            out.push(OPEN);
            open_until = Some(end);
            next.next();
        }
        out.push(c);
    }
    if open_until.is_some() {
        out.push(CLOSE);
    }
    out
}

// ── Taxonomy ──

pub fn print_taxonomy(registry: &TagRegistry) {
    println!("=== Violation taxonomy ({} tags) ===", registry.len());
    for (category, tags) in registry.categories() {
        println!("{category}");
        for tag in tags {
            println!("  {:<14} {}", tag.name(), tag.column());
        }
    }
}

pub fn print_risk_table(total: u64, risks: &[TagRisk]) {
    println!("=== Historical tag risk ({total} cases) ===");
    let mut sorted: Vec<&TagRisk> = risks.iter().collect();
    sorted.sort_by(|a, b| b.risk.total_cmp(&a.risk));
    for r in sorted {
        println!("  {:<14} {:>6.2}%", r.tag.name(), r.risk * 100.0);
    }
}

// ── Jobs ──

pub fn print_tagger_stats(stats: &TaggerStats) {
    println!("=== Backlog tagging ===");
    println!("  {:<18} {}", "scanned", stats.scanned);
    println!("  {:<18} {}", "tagged", stats.tagged);
    println!("  {:<18} {}", "blank explanation", stats.skipped_blank);
    println!("  {:<18} {}", "no tags", stats.skipped_untagged);
    println!("  {:<18} {}", "batches", stats.batches);
}

pub fn print_sync_stats(stats: &SyncStats, indexed: usize) {
    println!("=== Index sync ===");
    println!("  {:<18} {}", "scanned", stats.scanned);
    println!("  {:<18} {}", "upserted", stats.upserted);
    println!("  {:<18} {}", "blank explanation", stats.skipped_blank);
    println!("  {:<18} {}", "embedding failed", stats.failed);
    println!("  {:<18} {}", "index size", indexed);
}
