use crate::sql::{lex, Token};
use std::collections::HashSet;
use std::error::Error;
use std::fmt;

/// Why a generated statement was refused before reaching the store.
#[derive(Debug, PartialEq)]
pub enum ValidateError {
    Empty,
    MultipleStatements,
    NotSelect(String),
    ForbiddenKeyword(String),
    UnknownTable(String),
}

impl fmt::Display for ValidateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidateError::Empty => write!(f, "statement is empty"),
            ValidateError::MultipleStatements => write!(f, "only a single statement is allowed"),
            ValidateError::NotSelect(kw) => {
                write!(f, "only SELECT statements are allowed, got '{}'", kw)
            }
            ValidateError::ForbiddenKeyword(kw) => {
                write!(f, "statement contains forbidden keyword '{}'", kw)
            }
            ValidateError::UnknownTable(t) => {
                write!(f, "statement references unknown table '{}'", t)
            }
        }
    }
}

impl Error for ValidateError {}

// Anything that writes, changes schema, touches files or reconfigures the
// engine. PRAGMA and the DuckDB extension verbs are included because they
// reach outside the one table this system serves.
const FORBIDDEN: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "truncate", "attach", "detach",
    "pragma", "copy", "install", "load", "export", "import", "call", "set", "grant", "revoke",
    "vacuum", "begin", "commit", "rollback", "merge", "replace",
];

/// Best-effort lexical gate over model-generated SQL: a single read-only
/// SELECT (or WITH ... SELECT) referencing only the allow-listed tables.
/// Not a parser; a statement that passes here can still fail in the store.
pub fn ensure_read_only(sql: &str, allowed_tables: &[&str]) -> Result<(), ValidateError> {
    let tokens: Vec<Token> = lex(sql)
        .into_iter()
        .filter(|t| !matches!(t, Token::Comment(_)))
        .collect();

    if tokens.is_empty() {
        return Err(ValidateError::Empty);
    }

    // A trailing semicolon is fine, anything after one is a second statement
    for (idx, token) in tokens.iter().enumerate() {
        if matches!(token, Token::Symbol(s) if s == ";") && idx + 1 < tokens.len() {
            return Err(ValidateError::MultipleStatements);
        }
    }

    let first_word = tokens.iter().find_map(|t| match t {
        Token::Word(w) => Some(w.to_lowercase()),
        _ => None,
    });
    match first_word {
        Some(w) if w == "select" || w == "with" => {}
        Some(w) => return Err(ValidateError::NotSelect(w)),
        None => return Err(ValidateError::Empty),
    }

    for token in &tokens {
        if let Token::Word(w) = token {
            let lower = w.to_lowercase();
            if FORBIDDEN.contains(&lower.as_str()) {
                return Err(ValidateError::ForbiddenKeyword(lower));
            }
        }
    }

    let allowed: HashSet<String> = allowed_tables
        .iter()
        .map(|t| t.to_lowercase())
        .chain(collect_cte_names(&tokens))
        .collect();

    for name in referenced_tables(&tokens)? {
        if !allowed.contains(&name) {
            return Err(ValidateError::UnknownTable(name));
        }
    }

    Ok(())
}

// CTE definitions look like `name AS (`; their names are legal FROM targets.
fn collect_cte_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    for window in tokens.windows(3) {
        let [first, second, third] = window else { continue };
        let is_as = matches!(second, Token::Word(w) if w.eq_ignore_ascii_case("as"));
        let opens = matches!(third, Token::Symbol(s) if s == "(");
        if is_as && opens {
            if let Some(name) = identifier_name(first) {
                names.push(name);
            }
        }
    }
    names
}

fn identifier_name(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) => Some(w.to_lowercase()),
        Token::Quoted(q) if q.starts_with('"') && q.len() >= 2 => {
            Some(q[1..q.len() - 1].to_lowercase())
        }
        _ => None,
    }
}

// Walks FROM/JOIN targets, following comma-separated table lists. Subqueries
// recurse naturally since their own FROM keywords are in the same stream.
fn referenced_tables(tokens: &[Token]) -> Result<Vec<String>, ValidateError> {
    let mut names = Vec::new();
    let mut in_from_list = false;
    let mut expect_table = false;

    let mut i = 0;
    while i < tokens.len() {
        match &tokens[i] {
            Token::Word(w) => {
                let lower = w.to_lowercase();
                if lower == "from" || lower == "join" {
                    in_from_list = lower == "from";
                    expect_table = true;
                    i += 1;
                    continue;
                }
                // Any clause keyword ends a FROM list
                if matches!(
                    lower.as_str(),
                    "where" | "group" | "order" | "having" | "limit" | "offset" | "union"
                        | "intersect" | "except" | "on" | "select"
                ) {
                    in_from_list = false;
                    expect_table = false;
                }
            }
            Token::Symbol(s) if s == "," && in_from_list => {
                expect_table = true;
                i += 1;
                continue;
            }
            _ => {}
        }

        if expect_table {
            match &tokens[i] {
                // A parenthesized subquery carries its own FROM
                Token::Symbol(s) if s == "(" => {
                    expect_table = false;
                }
                token => {
                    if let Some(mut name) = identifier_name(token) {
                        // Qualified reference: keep the last path component
                        let mut j = i + 1;
                        while j + 1 < tokens.len()
                            && matches!(&tokens[j], Token::Symbol(s) if s == ".")
                        {
                            if let Some(part) = identifier_name(&tokens[j + 1]) {
                                name = part;
                                j += 2;
                            } else {
                                break;
                            }
                        }
                        // Identifier followed by '(' is a table function
                        if matches!(tokens.get(j), Some(Token::Symbol(s)) if s == "(") {
                            return Err(ValidateError::UnknownTable(name));
                        }
                        names.push(name);
                        expect_table = false;
                        i = j;
                        continue;
                    }
                    expect_table = false;
                }
            }
        }

        i += 1;
    }

    Ok(names)
}
