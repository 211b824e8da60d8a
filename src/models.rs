//! Core data models for the GST query orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//
// ================= Intent =================
//

/// Information need of a user question. Decides the route through the
/// orchestrator and nothing else does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Data,
    Regulatory,
    Hybrid,
}

impl Intent {
    pub const ALL: [Intent; 3] = [Intent::Data, Intent::Regulatory, Intent::Hybrid];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Data => "data",
            Intent::Regulatory => "regulatory",
            Intent::Hybrid => "hybrid",
        }
    }

    /// Exact label match, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Intent> {
        let normalized = label.trim().to_lowercase();
        Intent::ALL
            .into_iter()
            .find(|intent| intent.as_str() == normalized)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Intent::from_label(s).ok_or_else(|| format!("unknown intent '{}'", s.trim()))
    }
}

//
// ================= Validation =================
//

/// Closed set of reasons an access-query is refused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    MultipleStatements,
    NonReadOperation,
    ForbiddenKeyword,
    Unparseable,
}

impl RejectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::MultipleStatements => "multiple_statements",
            RejectionKind::NonReadOperation => "non_read_operation",
            RejectionKind::ForbiddenKeyword => "forbidden_keyword",
            RejectionKind::Unparseable => "unparseable",
        }
    }

    /// Plain-language explanation shown to the user.
    pub fn explanation(&self) -> &'static str {
        match self {
            RejectionKind::MultipleStatements => {
                "the generated query contained more than one statement"
            }
            RejectionKind::NonReadOperation => {
                "the generated query was not a read-only lookup"
            }
            RejectionKind::ForbiddenKeyword => {
                "the generated query contained a data-modifying or administrative command"
            }
            RejectionKind::Unparseable => {
                "the generated query was not a well-formed read statement"
            }
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

/// Outcome of validating one access-query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verdict {
    /// `canonical` is the parsed statement re-rendered without comments or
    /// terminators. It is the text handed to the executor.
    Accepted { canonical: String },
    Rejected(Rejection),
}

impl Verdict {
    pub fn reject(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Verdict::Rejected(Rejection {
            kind,
            detail: detail.into(),
        })
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Verdict::Rejected(rejection) => Some(rejection),
            Verdict::Accepted { .. } => None,
        }
    }
}

//
// ================= Rows =================
//

/// One record returned by the data executor, keyed by column name in
/// select-list order.
pub type Row = serde_json::Map<String, serde_json::Value>;

//
// ================= Final Result =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplianceFlags {
    pub has_violations: bool,
    pub regulatory_cited: bool,
    pub data_analyzed: bool,
}

/// Everything a front end needs to render one answered question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub request_id: Uuid,
    pub question: String,
    pub intent: Intent,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub row_count: usize,
    pub context_snippets: usize,
    pub compliance_flags: ComplianceFlags,
    pub trace: Vec<String>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_label_parsing() {
        assert_eq!(Intent::from_label("data"), Some(Intent::Data));
        assert_eq!(Intent::from_label("  Regulatory\n"), Some(Intent::Regulatory));
        assert_eq!(Intent::from_label("HYBRID"), Some(Intent::Hybrid));

        assert_eq!(Intent::from_label("hybrid query"), None);
        assert_eq!(Intent::from_label("data."), None);
        assert_eq!(Intent::from_label(""), None);
    }

    #[test]
    fn test_verdict_serialization() {
        let verdict = Verdict::reject(RejectionKind::ForbiddenKeyword, "drop");
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["kind"], "forbidden_keyword");

        let accepted = Verdict::Accepted {
            canonical: "SELECT 1".into(),
        };
        assert!(accepted.is_accepted());
        assert!(accepted.rejection().is_none());
    }
}
