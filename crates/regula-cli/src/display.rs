//! Human-readable rendering of command results.
//!
//! Single records print as vertical cards; collections print as one line per
//! row with long text shortened.

use regula_core::{ComplianceFinding, Page, Requirement, SearchResult};
use regula_engine::{BatchSummary, ConsultAnswer, GapAnalysis, ReindexSummary};

const MAX_LIST_ITEMS: usize = 10;
const TITLE_WIDTH: usize = 60;

// ── Requirements ──

pub fn print_requirement(req: &Requirement) {
    println!("=== {} - {} ===", req.framework, req.code);
    println!("{}", req.title);
    println!();
    field("id", &req.id);
    field("description", &req.description);
    if let Some(category) = &req.category {
        field("category", category);
    }
    if let Some(version) = &req.version {
        field("version", version);
    }
    field("tenant", req.tenant_id.as_deref().unwrap_or("(global)"));
    field("created_at", &req.created_at.to_rfc3339());
    match req.vectorized_at {
        Some(at) => field("vectorized_at", &at.to_rfc3339()),
        None => field("vectorized_at", "not vectorized"),
    }
    println!();
}

pub fn print_page(page: &Page<Requirement>) {
    for req in &page.items {
        println!(
            "  {:<6} {:<16} {:<60} {}",
            req.framework.as_str(),
            req.code,
            shorten(&req.title, TITLE_WIDTH),
            if req.vectorized_at.is_some() { "" } else { "(no vector)" }
        );
    }
    let end = page.offset + page.items.len();
    println!();
    println!(
        "  {}-{} of {} (limit {})",
        if page.items.is_empty() { 0 } else { page.offset + 1 },
        end,
        page.total,
        page.limit
    );
}

pub fn print_batch_summary(summary: &BatchSummary) {
    println!("Imported {} requirement(s), {} failed.", summary.succeeded, summary.failed);
    for err in summary.errors.iter().take(MAX_LIST_ITEMS) {
        println!("  {:<16} {}", err.code, err.error);
    }
    if summary.errors.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", summary.errors.len() - MAX_LIST_ITEMS);
    }
}

pub fn print_reindex_summary(summary: &ReindexSummary) {
    println!("Indexed {} requirement(s), {} failed.", summary.indexed, summary.failed);
}

// ── Retrieval ──

pub fn print_results(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No requirements above the similarity threshold.");
        return;
    }
    for r in results {
        println!(
            "  {:>5.1}%  {:<6} {:<16} {}",
            r.similarity * 100.0,
            r.framework.as_str(),
            r.code,
            shorten(&r.title, TITLE_WIDTH)
        );
    }
}

pub fn print_answer(answer: &ConsultAnswer) {
    println!("{}", answer.answer);
    if !answer.rules.is_empty() {
        println!();
        println!("Rules");
        for rule in &answer.rules {
            println!(
                "  {:>5.1}%  {} - {}: {}",
                rule.similarity * 100.0,
                rule.framework,
                rule.code,
                shorten(&rule.title, TITLE_WIDTH)
            );
        }
    }
    if let Some(context) = &answer.context {
        println!();
        println!("Context");
        println!("{context}");
    }
    if let Some(usage) = answer.usage {
        println!();
        println!("  tokens: {} in, {} out", usage.input_tokens, usage.output_tokens);
    }
}

// ── Compliance ──

pub fn print_findings(findings: &[ComplianceFinding]) {
    if findings.is_empty() {
        println!("No findings.");
        return;
    }
    for f in findings {
        println!(
            "  {}  {:>5.1}%  {:<22} {}",
            f.analysed_at.format("%Y-%m-%d %H:%M:%S"),
            f.similarity * 100.0,
            f.status.as_str(),
            f.requirement_id
        );
    }
}

pub fn print_analyses(analyses: &[GapAnalysis]) {
    for a in analyses {
        println!("=== {}: score {}/100 ===", a.framework, a.score);
        if !a.gaps.is_empty() {
            println!("Gaps");
            for gap in &a.gaps {
                println!("  [{:?}] {}: {}", gap.severity, gap.step, gap.problem);
                println!("  {:<8} {}", "", gap.recommendation);
            }
        }
        if !a.strengths.is_empty() {
            println!("Strengths");
            for s in &a.strengths {
                println!("  {s}");
            }
        }
        println!();
    }
}

// ── Helpers ──

fn field(name: &str, value: &str) {
    println!("  {:<26} {}", name, value);
}

/// Cut `s` to at most `width` characters, marking the cut with `...`.
fn shorten(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
