use serde::{Deserialize, Serialize};

/// What the generator hands back: the SQL text and a display label for the
/// result table. An empty `sql` means the model produced nothing usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedQuery {
    pub sql: String,
    pub table_label: String,
}

impl GeneratedQuery {
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

#[derive(Deserialize)]
struct ModelReply {
    #[serde(default)]
    sql_query: String,
    #[serde(default)]
    table_name: String,
}

/// Parses the model's reply. The model is asked for a bare JSON object but
/// some backends wrap it in a markdown fence anyway; both forms are
/// accepted. Anything else degrades to an empty result rather than an
/// error - the caller treats empty SQL as "no usable result".
pub fn parse_model_reply(raw: &str) -> GeneratedQuery {
    let body = strip_code_fence(raw.trim());

    match serde_json::from_str::<ModelReply>(body) {
        Ok(reply) => GeneratedQuery {
            sql: reply.sql_query,
            table_label: reply.table_name,
        },
        Err(_) => GeneratedQuery::default(),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the optional language tag on the opening fence
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.rfind("```").map_or(rest, |end| &rest[..end]).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_reply_is_parsed() {
        let parsed = parse_model_reply(
            r#"{"sql_query": "SELECT * FROM \"orders\"", "table_name": "All Orders"}"#,
        );
        assert_eq!(parsed.sql, "SELECT * FROM \"orders\"");
        assert_eq!(parsed.table_label, "All Orders");
    }

    #[test]
    fn fenced_reply_is_parsed() {
        let raw = "```json\n{\"sql_query\": \"SELECT 1\", \"table_name\": \"One\"}\n```";
        let parsed = parse_model_reply(raw);
        assert_eq!(parsed.sql, "SELECT 1");
        assert_eq!(parsed.table_label, "One");
    }

    #[test]
    fn malformed_reply_degrades_to_empty() {
        let parsed = parse_model_reply("Sure! Here is the SQL you asked for: SELECT 1");
        assert!(parsed.is_empty());
        assert_eq!(parsed, GeneratedQuery::default());
    }

    #[test]
    fn missing_fields_default_to_empty_strings() {
        let parsed = parse_model_reply(r#"{"table_name": "Orders"}"#);
        assert!(parsed.is_empty());
        assert_eq!(parsed.table_label, "Orders");
    }
}
