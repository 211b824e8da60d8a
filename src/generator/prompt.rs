//! Prompt material for access-query generation

/// Invoice database schema as described to the model.
pub const SCHEMA_CONTEXT: &str = r#"
Database Schema (PostgreSQL):

1. vendors table:
   - vendor_id (INT, PRIMARY KEY)
   - vendor_name (VARCHAR)
   - gstin (VARCHAR) - GST Identification Number
   - state (VARCHAR)
   - city (VARCHAR)

2. invoices table:
   - invoice_id (INT, PRIMARY KEY)
   - vendor_id (INT, FOREIGN KEY to vendors)
   - invoice_number (VARCHAR)
   - invoice_date (DATE)
   - total_amount (NUMERIC)
   - tax_amount (NUMERIC)
   - cgst (NUMERIC) - Central GST
   - sgst (NUMERIC) - State GST
   - igst (NUMERIC) - Integrated GST
   - status (VARCHAR: 'PAID', 'UNPAID', 'OVERDUE')
   - place_of_supply (VARCHAR)
   - is_reverse_charge (BOOLEAN)

3. invoice_items table:
   - item_id (INT, PRIMARY KEY)
   - invoice_id (INT, FOREIGN KEY to invoices)
   - description (VARCHAR)
   - hsn_code (VARCHAR) - Harmonized System Nomenclature
   - quantity (INT)
   - unit_price (NUMERIC)
   - tax_rate (NUMERIC)

Important Notes:
- Intra-state transactions have CGST and SGST (both are equal, each is half of total tax)
- Inter-state transactions have only IGST (no CGST/SGST)
- tax_amount = cgst + sgst + igst
- Use JOINs to combine data from multiple tables
"#;

pub const QUERY_PATTERNS: &str = r#"
Task: Convert the following natural language query to a single PostgreSQL SELECT query.

Requirements:
- Generate ONLY the SQL query, no explanations
- Use proper JOIN syntax when querying multiple tables
- Use appropriate aggregation functions (SUM, COUNT, AVG, etc.)
- Include ORDER BY and LIMIT clauses when appropriate

IMPORTANT PATTERNS:

1. Location-Based Invoice Queries:
   - "[State] invoices" means invoices.place_of_supply, NOT vendors.state
     Example: "Karnataka invoices with IGST" means
     WHERE i.place_of_supply = 'Karnataka' AND i.igst > 0
   - Only use vendors.state when asking about vendors FROM a location
   - IGST applies to inter-state transactions (place_of_supply differs from vendor state)

2. Time-Based Aggregation (Monthly/Yearly):
   - For "monthly" questions group by to_char(invoice_date, 'YYYY-MM')
   - For totals per month use SUM(total_amount) AS monthly_total

3. Rule 86B Compliance:
   - Applies to MONTHLY AGGREGATE purchases exceeding 5000000 (50 lakh rupees)
   - Query pattern:
     SELECT to_char(invoice_date, 'YYYY-MM') AS month,
            SUM(total_amount) AS monthly_total,
            COUNT(*) AS invoice_count
     FROM invoices
     GROUP BY to_char(invoice_date, 'YYYY-MM')
     HAVING SUM(total_amount) > 5000000
   - Do not check individual invoices against the limit, check monthly aggregates

4. Compliance Threshold Queries:
   - When context mentions limits, apply them to aggregates, not individual rows
   - Include both the threshold check and supporting invoice details
"#;

/// Full generation prompt for one question.
pub fn build_generation_prompt(question: &str, context: &[String]) -> String {
    let mut prompt = String::with_capacity(SCHEMA_CONTEXT.len() + QUERY_PATTERNS.len() + 512);
    prompt.push_str(SCHEMA_CONTEXT);
    prompt.push_str(QUERY_PATTERNS);
    prompt.push('\n');

    if !context.is_empty() {
        prompt.push_str("Additional Context (GST Rules):\n");
        for snippet in context {
            prompt.push_str(snippet);
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Use this context to inform your SQL query (e.g., if the context mentions specific \
             limits or thresholds, incorporate them).\nPay special attention to whether the rule \
             applies to individual transactions or aggregated amounts.\n\n",
        );
    }

    prompt.push_str(&format!("Natural Language Query: {}\n\nSQL Query:", question));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_context() {
        let prompt = build_generation_prompt("List vendors in Gujarat", &[]);
        assert!(prompt.contains("vendors table"));
        assert!(prompt.ends_with("Natural Language Query: List vendors in Gujarat\n\nSQL Query:"));
        assert!(!prompt.contains("Additional Context"));
    }

    #[test]
    fn test_prompt_with_context() {
        let context = vec!["[Source: rule86b.txt]\nLimit of Rs 50 lakh per month".to_string()];
        let prompt = build_generation_prompt("Show invoices violating Rule 86B", &context);
        let context_at = prompt.find("Additional Context (GST Rules)").unwrap();
        let question_at = prompt.find("Natural Language Query").unwrap();
        assert!(context_at < question_at);
        assert!(prompt.contains("Limit of Rs 50 lakh per month"));
    }
}
