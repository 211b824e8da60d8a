//! Access-query validator
//!
//! Static safety checks on a generated query before it can reach the
//! executor. Rules run in a fixed order and the first failing rule decides
//! the rejection kind:
//!
//! 1. multiple statements
//! 2. non-read root operation
//! 3. forbidden keyword (anywhere, comments included)
//! 4. unparseable (not exactly one well-formed read statement)
//!
//! Execution also happens under a read-only role; this layer must hold on
//! its own if that role is ever misconfigured.

use crate::config::ValidatorConfig;
use crate::models::{RejectionKind, Verdict};
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use std::collections::HashSet;
use tracing::{debug, warn};

pub mod lexer;
use lexer::{QueryView, RootToken};

/// Trait for structural validation rules
pub trait ValidationRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rejection reported when this rule fails
    fn kind(&self) -> RejectionKind;

    /// `Some(detail)` when the query violates the rule.
    fn check(&self, view: &QueryView) -> Option<String>;
}

/// Validator that enforces rules in order
pub struct QueryValidator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl QueryValidator {
    pub fn new(config: &ValidatorConfig) -> Self {
        let rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(SingleStatementRule),
            Box::new(ReadOnlyRootRule),
            Box::new(ForbiddenKeywordRule::new(&config.forbidden_keywords)),
        ];
        Self { rules }
    }

    /// Validate one access-query. Pure: the same text always yields the
    /// same verdict.
    pub fn validate(&self, query: &str) -> Verdict {
        let verdict = self.evaluate(query);

        match &verdict {
            Verdict::Accepted { .. } => {
                debug!(rule_count = self.rules.len(), "Access-query accepted");
            }
            Verdict::Rejected(rejection) => {
                warn!(
                    kind = %rejection.kind,
                    detail = %rejection.detail,
                    "Access-query rejected"
                );
            }
        }

        verdict
    }

    fn evaluate(&self, query: &str) -> Verdict {
        let view = QueryView::tokenize(query);

        for rule in &self.rules {
            if let Some(detail) = rule.check(&view) {
                return Verdict::reject(rule.kind(), format!("{}: {}", rule.name(), detail));
            }
        }

        if let Some(e) = view.error() {
            return Verdict::reject(RejectionKind::Unparseable, format!("tokenizer: {}", e));
        }

        if view.is_blank() {
            return Verdict::reject(RejectionKind::Unparseable, "empty query");
        }

        match parse_single_read(query) {
            Ok(canonical) => Verdict::Accepted { canonical },
            Err(detail) => Verdict::reject(RejectionKind::Unparseable, detail),
        }
    }
}

fn parse_single_read(query: &str) -> Result<String, String> {
    let dialect = PostgreSqlDialect {};
    let statements = Parser::parse_sql(&dialect, query).map_err(|e| e.to_string())?;

    match statements.as_slice() {
        [statement @ Statement::Query(_)] => Ok(statement.to_string()),
        [] => Err("no statement found".to_string()),
        [_] => Err("statement is not a query".to_string()),
        _ => Err(format!("expected one statement, parsed {}", statements.len())),
    }
}

//
// ================= Rules =================
//

/// Rule: at most one non-empty statement
pub struct SingleStatementRule;

impl ValidationRule for SingleStatementRule {
    fn name(&self) -> &'static str {
        "single_statement"
    }

    fn kind(&self) -> RejectionKind {
        RejectionKind::MultipleStatements
    }

    fn check(&self, view: &QueryView) -> Option<String> {
        let count = view.statement_count();
        (count > 1).then(|| format!("found {} statements", count))
    }
}

/// Rule: the root operation is SELECT (or a WITH ... SELECT)
pub struct ReadOnlyRootRule;

impl ValidationRule for ReadOnlyRootRule {
    fn name(&self) -> &'static str {
        "read_only_root"
    }

    fn kind(&self) -> RejectionKind {
        RejectionKind::NonReadOperation
    }

    fn check(&self, view: &QueryView) -> Option<String> {
        match view.root()? {
            RootToken::Keyword(Keyword::SELECT | Keyword::WITH, _) => None,
            RootToken::Keyword(_, spelling) => {
                Some(format!("root operation is {}", spelling.to_uppercase()))
            }
            // Not an operation at all; left to the parser
            RootToken::Other(_) => None,
        }
    }
}

/// Rule: no denylisted word anywhere in the text
pub struct ForbiddenKeywordRule {
    keywords: HashSet<String>,
}

impl ForbiddenKeywordRule {
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|kw| kw.to_lowercase()).collect(),
        }
    }
}

impl ValidationRule for ForbiddenKeywordRule {
    fn name(&self) -> &'static str {
        "forbidden_keyword"
    }

    fn kind(&self) -> RejectionKind {
        RejectionKind::ForbiddenKeyword
    }

    fn check(&self, view: &QueryView) -> Option<String> {
        if view.has_unicode_identifier() {
            return Some("unicode-escaped identifier is not allowed".to_string());
        }
        view.words()
            .into_iter()
            .find(|word| self.keywords.contains(word))
            .map(|word| format!("'{}' is not allowed", word.to_uppercase()))
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_FORBIDDEN_KEYWORDS;
    use proptest::prelude::*;

    fn validator() -> QueryValidator {
        QueryValidator::new(&ValidatorConfig::default())
    }

    fn rejection_kind(query: &str) -> Option<RejectionKind> {
        validator().validate(query).rejection().map(|r| r.kind)
    }

    #[test]
    fn test_accepts_reads() {
        let cases = vec![
            "SELECT vendor_name, state FROM vendors WHERE state = 'Gujarat'",
            "select * from vendors where state = 'Gujarat';",
            "SELECT invoice_id, created_at, updated_at FROM invoices",
            "SELECT * FROM invoice_items WHERE description = 'drop shipping insert'",
            "-- vendors by state\nSELECT state, COUNT(*) FROM vendors GROUP BY state",
            "WITH paid AS (SELECT * FROM invoices WHERE status = 'PAID') SELECT COUNT(*) FROM paid",
            "SELECT to_char(invoice_date, 'YYYY-MM') AS month, SUM(total_amount) AS monthly_total, \
             COUNT(*) AS invoice_count FROM invoices GROUP BY to_char(invoice_date, 'YYYY-MM') \
             HAVING SUM(total_amount) > 5000000",
            "SELECT v.vendor_name, SUM(i.igst) FROM invoices i JOIN vendors v ON v.vendor_id = i.vendor_id \
             WHERE i.place_of_supply = 'Karnataka' AND i.igst > 0 GROUP BY v.vendor_name ORDER BY 2 DESC LIMIT 10",
        ];

        for query in cases {
            let verdict = validator().validate(query);
            assert!(verdict.is_accepted(), "expected accept for {:?}: {:?}", query, verdict);
        }
    }

    #[test]
    fn test_canonical_drops_comments_and_terminator() {
        let verdict = validator().validate("SELECT 1 -- note\n;");
        match verdict {
            Verdict::Accepted { canonical } => assert_eq!(canonical, "SELECT 1"),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn test_multiple_statements() {
        assert_eq!(
            rejection_kind("SELECT 1; SELECT 2"),
            Some(RejectionKind::MultipleStatements)
        );
        // Checked before anything else
        assert_eq!(
            rejection_kind("SELECT * FROM vendors; DROP TABLE vendors"),
            Some(RejectionKind::MultipleStatements)
        );
        assert_eq!(
            rejection_kind("DELETE FROM invoices; SELECT 1"),
            Some(RejectionKind::MultipleStatements)
        );
    }

    #[test]
    fn test_non_read_roots() {
        let cases = vec![
            "INSERT INTO vendors (vendor_name) VALUES ('x')",
            "UPDATE invoices SET status = 'PAID'",
            "delete from invoices",
            "DROP TABLE vendors",
            "ALTER TABLE vendors ADD COLUMN note TEXT",
            "/* harmless */ ( TRUNCATE invoices",
            "EXPLAIN ANALYZE SELECT 1",
            "SET statement_timeout = 0",
        ];

        for query in cases {
            assert_eq!(
                rejection_kind(query),
                Some(RejectionKind::NonReadOperation),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_forbidden_keywords() {
        let cases = vec![
            "SELECT * FROM vendors -- DROP TABLE vendors",
            "SELECT * FROM vendors /* dRoP */",
            "SELECT * INTO vendors_copy FROM vendors",
            "SELECT pg_sleep(10)",
            "WITH gone AS (DELETE FROM invoices RETURNING *) SELECT * FROM gone",
            "SELECT * FROM vendors WHERE vendor_id IN (SELECT vendor_id FROM invoices FOR UPDATE)",
            "SELECT \"pg_sleep\"(30)",
            "SELECT \"pg_read_file\"('/etc/passwd')",
            "SELECT U&\"pg_sleep\"(30)",
            "SELECT U&\"\\0070g_sleep\"(30)",
            "SELECT setval('invoices_invoice_id_seq', 1)",
            "SELECT nextval('invoices_invoice_id_seq')",
            "SELECT set_config('statement_timeout', '0', false)",
            "SELECT pg_advisory_lock(42)",
            "SELECT pg_advisory_xact_lock(42)",
            "SELECT lo_unlink(16401)",
            "SELECT pg_cancel_backend(1234)",
            "SELECT pg_reload_conf()",
        ];

        for query in cases {
            assert_eq!(
                rejection_kind(query),
                Some(RejectionKind::ForbiddenKeyword),
                "{}",
                query
            );
        }
    }

    #[test]
    fn test_tokenizer_error_keeps_rule_order() {
        assert_eq!(
            rejection_kind("DELETE FROM invoices WHERE status = 'PAID"),
            Some(RejectionKind::NonReadOperation)
        );
        assert_eq!(
            rejection_kind("SELECT 1; DROP TABLE vendors; SELECT 'x"),
            Some(RejectionKind::MultipleStatements)
        );
        assert_eq!(
            rejection_kind("SELECT * FROM vendors /* drop everything"),
            Some(RejectionKind::ForbiddenKeyword)
        );
        assert_eq!(
            rejection_kind("SELECT * FROM vendors /* never closed"),
            Some(RejectionKind::Unparseable)
        );
    }

    #[test]
    fn test_unparseable() {
        let cases = vec![
            "",
            "   \n\t",
            "-- only a comment",
            "SELECT * FROM",
            "SELECT 'unterminated",
            "vendors in gujarat",
        ];

        for query in cases {
            assert_eq!(
                rejection_kind(query),
                Some(RejectionKind::Unparseable),
                "{:?}",
                query
            );
        }
    }

    #[test]
    fn test_custom_denylist() {
        let validator = QueryValidator::new(&ValidatorConfig {
            forbidden_keywords: vec!["Salary".to_string()],
        });
        let verdict = validator.validate("SELECT salary FROM staff");
        assert_eq!(verdict.rejection().map(|r| r.kind), Some(RejectionKind::ForbiddenKeyword));

        // Default denylist no longer applies
        assert!(validator.validate("SELECT 1 -- drop").is_accepted());
    }

    #[test]
    fn test_rejection_detail_names_rule() {
        let verdict = validator().validate("SELECT 1 /* truncate */");
        let rejection = verdict.rejection().unwrap();
        assert!(rejection.detail.starts_with("forbidden_keyword"));
        assert!(rejection.detail.contains("TRUNCATE"));
    }

    fn mixed_case(word: &str, flips: &[bool]) -> String {
        word.chars()
            .zip(flips.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        #[test]
        fn denylisted_keyword_always_rejected(
            keyword in prop::sample::select(DEFAULT_FORBIDDEN_KEYWORDS.to_vec()),
            flips in prop::collection::vec(any::<bool>(), 1..8),
            pad_left in "[ \t\n]{1,4}",
            pad_right in "[ \t\n]{0,4}",
            placement in 0..3u8,
        ) {
            let word = mixed_case(keyword, &flips);
            let query = match placement {
                0 => format!("SELECT * FROM invoices WHERE status = 'PAID'{}{}{}", pad_left, word, pad_right),
                1 => format!("SELECT * FROM invoices --{}{}{}", pad_left, word, pad_right),
                _ => format!("SELECT{}\"{}\"(1){}FROM invoices", pad_left, word, pad_right),
            };
            let verdict = validator().validate(&query);
            prop_assert_eq!(
                verdict.rejection().map(|r| r.kind),
                Some(RejectionKind::ForbiddenKeyword),
                "query: {:?}", query
            );
        }

        #[test]
        fn two_reads_are_multiple_statements(
            left in "[a-z]{1,8}",
            right in "[a-z]{1,8}",
            pad in "[ \t\n]{0,3}",
        ) {
            let query = format!("SELECT {} FROM vendors;{}SELECT {} FROM invoices", left, pad, right);
            prop_assert_eq!(
                rejection_kind(&query),
                Some(RejectionKind::MultipleStatements)
            );
        }

        #[test]
        fn mutating_roots_are_non_read(
            statement in prop::sample::select(vec![
                "insert into vendors values (1)",
                "update invoices set status = 'PAID'",
                "delete from invoices",
                "drop table vendors",
                "alter table vendors add column x int",
            ]),
            flips in prop::collection::vec(any::<bool>(), 1..8),
            pad in "[ \t\n]{0,4}",
        ) {
            let query = format!("{}{}", pad, mixed_case(statement, &flips));
            prop_assert_eq!(
                rejection_kind(&query),
                Some(RejectionKind::NonReadOperation)
            );
        }

        #[test]
        fn validation_is_idempotent(query in "[ -~\n]{0,80}") {
            let validator = validator();
            prop_assert_eq!(validator.validate(&query), validator.validate(&query));
        }
    }
}
