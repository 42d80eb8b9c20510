use crate::sql::{lex, Token};

// Keywords that get uppercased and start a new line at the top nesting level.
const CLAUSE_KEYWORDS: &[&str] = &[
    "select", "from", "where", "group", "having", "order", "limit", "offset", "union",
    "intersect", "except", "join", "left", "right", "inner", "outer", "full", "cross",
];

// Join modifiers; a JOIN preceded by one of these continues the same line.
const JOIN_MODIFIERS: &[&str] = &["left", "right", "inner", "outer", "full", "cross", "natural"];

// Keywords that get uppercased in place.
const PLAIN_KEYWORDS: &[&str] = &[
    "by", "as", "on", "and", "or", "not", "in", "is", "null", "like", "ilike", "between",
    "case", "when", "then", "else", "end", "distinct", "all", "asc", "desc", "with",
    "exists", "any", "cast", "using", "natural",
];

// Function names the model tends to emit; uppercased, no space before the paren.
const FUNCTION_KEYWORDS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "coalesce", "round", "abs", "lower", "upper",
    "substr", "strftime", "date_trunc", "least", "greatest",
];

fn is_clause(word: &str) -> bool {
    CLAUSE_KEYWORDS.contains(&word)
}

fn is_keyword(word: &str) -> bool {
    is_clause(word) || PLAIN_KEYWORDS.contains(&word) || FUNCTION_KEYWORDS.contains(&word)
}

/// Cosmetic canonicalization of a SQL statement: keywords uppercased,
/// major clauses on their own line, AND/OR indented beneath their clause.
/// Quoted literals and identifiers pass through untouched, so the rewrite
/// never changes what the statement means.
pub fn format_sql(sql: &str) -> String {
    let tokens = lex(sql);
    let mut out = String::new();
    let mut depth: i32 = 0;
    let mut prev_word: Option<String> = None;
    let mut prev_token: Option<Token> = None;

    for token in &tokens {
        match token {
            Token::Word(w) => {
                let lower = w.to_lowercase();
                let rendered = if is_keyword(&lower) { lower.to_uppercase() } else { w.clone() };

                let starts_line = depth == 0
                    && !out.is_empty()
                    && (break_before_clause(&lower, prev_word.as_deref())
                        || lower == "and"
                        || lower == "or");

                if starts_line {
                    out.push('\n');
                    if lower == "and" || lower == "or" {
                        out.push_str("  ");
                    }
                } else if needs_space(&out, prev_token.as_ref()) {
                    out.push(' ');
                }

                out.push_str(&rendered);
                prev_word = Some(lower);
            }
            Token::Quoted(q) => {
                if needs_space(&out, prev_token.as_ref()) {
                    out.push(' ');
                }
                out.push_str(q);
            }
            Token::Symbol(s) => {
                match s.as_str() {
                    "(" => {
                        depth += 1;
                        // Function calls hug the paren, clauses keep the space
                        let hug = matches!(&prev_token, Some(Token::Word(w))
                            if !is_clause(&w.to_lowercase())
                                && !PLAIN_KEYWORDS.contains(&w.to_lowercase().as_str()));
                        if !hug && needs_space(&out, prev_token.as_ref()) {
                            out.push(' ');
                        }
                        out.push('(');
                    }
                    ")" => {
                        depth -= 1;
                        out.push(')');
                    }
                    "," | ";" => out.push_str(s),
                    "." => out.push('.'),
                    _ => {
                        if needs_space(&out, prev_token.as_ref()) {
                            out.push(' ');
                        }
                        out.push_str(s);
                    }
                }
            }
            Token::Comment(c) => {
                if needs_space(&out, prev_token.as_ref()) {
                    out.push(' ');
                }
                out.push_str(c);
            }
        }
        prev_token = Some(token.clone());
    }

    out.trim().to_string()
}

fn break_before_clause(word: &str, prev: Option<&str>) -> bool {
    if !is_clause(word) {
        return false;
    }
    match word {
        // JOIN continues the line after LEFT/RIGHT/... modifiers
        "join" => !prev.is_some_and(|p| JOIN_MODIFIERS.contains(&p)),
        _ => true,
    }
}

fn needs_space(out: &str, prev: Option<&Token>) -> bool {
    if out.is_empty() || out.ends_with('\n') || out.ends_with(' ') {
        return false;
    }
    match prev {
        Some(Token::Symbol(s)) if s == "(" || s == "." => false,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uppercases_keywords_and_breaks_clauses() {
        let formatted = format_sql("select * from \"orders\" where \"Country\" = 'Germany'");
        assert_eq!(
            formatted,
            "SELECT *\nFROM \"orders\"\nWHERE \"Country\" = 'Germany'"
        );
    }

    #[test]
    fn string_literals_survive_verbatim() {
        let formatted = format_sql("select * from \"orders\" where \"Description\" like '%select from%'");
        assert!(formatted.contains("'%select from%'"));
    }

    #[test]
    fn and_predicates_are_indented() {
        let formatted =
            format_sql("select * from \"orders\" where \"Country\" = 'Germany' and \"Quantity\" > 10");
        assert!(formatted.contains("WHERE \"Country\" = 'Germany'\n  AND \"Quantity\" > 10"));
    }

    #[test]
    fn function_calls_hug_their_parens() {
        let formatted = format_sql("select count(*), max(\"UnitPrice\") from \"orders\" group by \"Country\"");
        assert!(formatted.contains("COUNT(*)"));
        assert!(formatted.contains("MAX(\"UnitPrice\")"));
        assert!(formatted.contains("\nGROUP BY"));
    }

    #[test]
    fn comparison_operators_stay_intact() {
        let formatted = format_sql("select * from \"orders\" where \"Quantity\" >= 10");
        assert!(formatted.contains(">= 10"));
    }

    #[test]
    fn left_join_stays_on_one_line() {
        let formatted = format_sql("select * from \"orders\" o left join \"orders\" p on o.\"InvoiceNo\" = p.\"InvoiceNo\"");
        assert!(formatted.contains("\nLEFT JOIN"));
        assert!(!formatted.contains("LEFT\nJOIN"));
    }
}
