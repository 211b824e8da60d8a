//! Answer synthesizer
//!
//! Merges retrieved rules, executed rows and a possible validator rejection
//! into one answer. The answer always ends with a deterministic evidence
//! section: exact row values and numbered rule snippets, so every figure in
//! the text can be traced back to its source. An optional model narrative
//! is placed in front of it, but only when every figure it states also
//! appears in the question, the rows or the rule snippets.

use crate::llm::LanguageModel;
use crate::models::{ComplianceFlags, Rejection, Row};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, warn};

pub const NO_RULES_FOUND: &str = "No relevant rules were found in the regulatory documents.";
pub const NO_RECORDS_FOUND: &str = "No matching records were found in the invoice data.";
pub const NOTHING_TO_REPORT: &str = "No information was available to answer this question.";

/// Signals available to the synthesizer for one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evidence<'a> {
    /// `None`: retrieval did not run. `Some(&[])`: it ran and found nothing.
    pub context: Option<&'a [String]>,
    /// `None`: no query was executed. `Some(&[])`: it ran and matched nothing.
    pub rows: Option<&'a [Row]>,
    pub rejection: Option<&'a Rejection>,
}

impl Evidence<'_> {
    fn has_substance(&self) -> bool {
        self.context.is_some_and(|c| !c.is_empty()) || self.rows.is_some_and(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Synthesis {
    pub answer: String,
    pub flags: ComplianceFlags,
}

pub struct AnswerSynthesizer {
    model: Option<Arc<dyn LanguageModel>>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Synthesizer that never calls a model.
    pub fn deterministic() -> Self {
        Self { model: None }
    }

    /// Never fails: a failed narrative call degrades to the evidence alone.
    pub async fn synthesize(&self, question: &str, evidence: Evidence<'_>) -> Synthesis {
        let body = compose_evidence(evidence);

        let narrative = match (&self.model, evidence.rejection) {
            (Some(model), None) if evidence.has_substance() => {
                let prompt = build_prompt(question, &evidence);
                match model.generate_text(&prompt).await {
                    Ok(text) if !text.trim().is_empty() => {
                        let text = text.trim();
                        let unsupported = unsupported_figures(text, question, &body, &evidence);
                        if unsupported.is_empty() {
                            Some(text.to_string())
                        } else {
                            warn!(
                                figures = ?unsupported,
                                "Synthesis narrative states figures absent from the evidence, using evidence only"
                            );
                            None
                        }
                    }
                    Ok(_) => {
                        warn!("Synthesis model returned empty text, using evidence only");
                        None
                    }
                    Err(e) => {
                        warn!("Synthesis model call failed, using evidence only: {}", e);
                        None
                    }
                }
            }
            _ => None,
        };

        let flags = ComplianceFlags {
            has_violations: narrative.as_deref().is_some_and(mentions_violation),
            regulatory_cited: evidence.context.is_some_and(|c| !c.is_empty()),
            data_analyzed: evidence.rows.is_some_and(|r| !r.is_empty()),
        };

        let answer = match narrative {
            Some(text) => format!("{}\n\n{}", text, body),
            None => body,
        };

        debug!(answer_len = answer.len(), ?flags, "Answer synthesized");
        Synthesis { answer, flags }
    }
}

/// Figures in `narrative` that appear nowhere in the question or the
/// rendered evidence. Bracketed citation numbers count as supported.
fn unsupported_figures(
    narrative: &str,
    question: &str,
    rendered: &str,
    evidence: &Evidence<'_>,
) -> Vec<String> {
    let mut known: HashSet<String> = figures(question)
        .into_iter()
        .chain(figures(rendered))
        .collect();
    let cited = evidence.context.map_or(0, |c| c.len());
    known.extend((1..=cited).map(|n| n.to_string()));

    figures(narrative)
        .into_iter()
        .filter(|figure| !known.contains(figure))
        .collect()
}

/// Numeric tokens in normalized form: grouping commas removed, leading
/// zeros and trailing fractional zeros dropped, so `6,200,000.00` and
/// `6200000` compare equal.
fn figures(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut found = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let mut raw = String::new();
        while i < chars.len() {
            let c = chars[i];
            let joins_digits = (c == ',' || c == '.')
                && chars.get(i + 1).is_some_and(|next| next.is_ascii_digit());
            if c.is_ascii_digit() || joins_digits {
                raw.push(c);
                i += 1;
            } else {
                break;
            }
        }
        found.push(normalize_figure(&raw));
    }
    found
}

fn normalize_figure(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| *c != ',').collect();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction.trim_end_matches('0')),
        None => (digits.as_str(), ""),
    };
    let whole = match whole.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

fn mentions_violation(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("violation") || lower.contains("exceed")
}

/// Deterministic part of every answer. Never empty.
pub fn compose_evidence(evidence: Evidence<'_>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(rejection) = evidence.rejection {
        sections.push(format!(
            "The request could not be safely executed: {} (reason: {}). No data was read.",
            rejection.kind.explanation(),
            rejection.kind
        ));
    }

    match evidence.rows {
        Some([]) => sections.push(NO_RECORDS_FOUND.to_string()),
        Some(rows) => sections.push(render_rows(rows)),
        None => {}
    }

    match evidence.context {
        Some([]) => sections.push(NO_RULES_FOUND.to_string()),
        Some(snippets) => sections.push(render_snippets(snippets)),
        None => {}
    }

    if sections.is_empty() {
        return NOTHING_TO_REPORT.to_string();
    }
    sections.join("\n\n")
}

fn render_rows(rows: &[Row]) -> String {
    let mut out = format!("Matching records ({}):", rows.len());
    for row in rows {
        let fields: Vec<String> = row
            .iter()
            .map(|(column, value)| format!("{}: {}", column, render_value(value)))
            .collect();
        let _ = write!(out, "\n- {}", fields.join(", "));
    }
    out
}

fn render_snippets(snippets: &[String]) -> String {
    let mut out = String::from("Relevant rules:");
    for (i, snippet) in snippets.iter().enumerate() {
        let _ = write!(out, "\n[{}] {}", i + 1, snippet);
    }
    out
}

/// Values exactly as returned; strings without JSON quoting.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn build_prompt(question: &str, evidence: &Evidence<'_>) -> String {
    let mut prompt = format!(
        "You are a GST compliance assistant. Provide a clear, direct, and actionable answer \
         to the user's question.\n\nUser Question: {}\n\n",
        question
    );

    if let Some(snippets) = evidence.context.filter(|c| !c.is_empty()) {
        prompt.push_str("Relevant GST Rules:\n");
        for (i, snippet) in snippets.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {}", i + 1, snippet);
        }
        prompt.push('\n');
    }

    if let Some(rows) = evidence.rows.filter(|r| !r.is_empty()) {
        prompt.push_str("Database Query Results:\n");
        prompt.push_str(&serde_json::to_string_pretty(rows).unwrap_or_default());
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        r#"Generate a clear, direct answer following these guidelines:

1. Start with a direct answer: begin with "Yes" or "No" where the question allows it
2. List violations clearly: if violations exist, list them with period, amount and threshold exceeded
3. Keep it concise: avoid lengthy explanations unless critical
4. Use only the figures in the database results; do not invent numbers
5. Cite rules briefly by their number in brackets, e.g. [1]

Answer:"#,
    );
    prompt
}
