/// The one table this system serves. The descriptor below is embedded in
/// the system prompt verbatim; no dynamic introspection feeds generation.
pub const ORDERS_TABLE: &str = "orders";

pub const ORDERS_DDL: &str = r#"CREATE TABLE IF NOT EXISTS "orders" (
    "InvoiceNo" TEXT,
    "StockCode" TEXT,
    "Description" TEXT,
    "Quantity" INTEGER,
    "InvoiceDate" TIMESTAMP,
    "UnitPrice" REAL,
    "CustomerID" REAL,
    "Country" TEXT
);"#;

/// Tables the statement gate accepts in FROM/JOIN position.
pub fn allowed_tables() -> &'static [&'static str] {
    &[ORDERS_TABLE]
}

/// Fixed system message: schema plus the hard rules. The SELECT-only rule
/// here is an instruction to the model, not a guarantee; the statement gate
/// enforces it independently before execution.
pub fn system_prompt() -> String {
    format!(
        r#"You are an expert data analyst who writes clean, executable SQL queries based on a given database schema and user request. Additionally, identify the primary table involved in the query.

## Rules:
- Respond with a JSON object containing two keys:
  - "sql_query": the valid SQL query as a string
  - "table_name": an appropriate name for a table of results based on the user query as a string. Capitalise the first letter of each word and use spaces
- Do NOT include any commentary or explanations
- Use only the tables and columns defined in the schema
- Only use SELECT queries - never write INSERT, UPDATE, DELETE, DROP, etc.
- Use double quotes for table and column names if needed

## Database schema:
{}"#,
        ORDERS_DDL
    )
}

/// Folds a follow-up instruction into the original question so the model
/// sees both. The exact wording is part of the interface contract.
pub fn compose_refinement(original: &str, refinement: &str) -> String {
    format!("Original query: {}. Refinement: {}", original, refinement)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refinement_keeps_the_original_question() {
        let prompt = compose_refinement(
            "show all orders from Germany",
            "only include orders above quantity 10",
        );
        assert_eq!(
            prompt,
            "Original query: show all orders from Germany. Refinement: only include orders above quantity 10"
        );
    }

    #[test]
    fn system_prompt_carries_the_schema() {
        let prompt = system_prompt();
        assert!(prompt.contains("\"InvoiceDate\" TIMESTAMP"));
        assert!(prompt.contains("sql_query"));
        assert!(prompt.contains("table_name"));
    }
}
