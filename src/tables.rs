//! Table-name extraction from statement text.
//!
//! Extraction is a lightweight token walk, not a SQL parse: it scans for the
//! keywords that introduce a table reference (`FROM`, the `JOIN` family,
//! `UPDATE`, `INSERT|REPLACE INTO`, `DELETE FROM`, `TRUNCATE [TABLE]`,
//! `ALTER TABLE`, `DROP TABLE [IF EXISTS]`) and captures the identifier that
//! follows. Quoting characters (backticks, double quotes, brackets) are
//! stripped and names are folded to lowercase, so a read of `Users` and a
//! write to `users` land on the same invalidation index key.
//!
//! Statements that contain none of the trigger keywords (`PRAGMA`, `SHOW`,
//! `EXPLAIN`, ...) produce an empty set. For a write statement the caller
//! must treat that as "affected tables unknown" and invalidate everything,
//! never as "nothing to do".

use std::collections::BTreeSet;

use dashmap::DashMap;

/// Extract the set of table names a statement references.
///
/// The result is a sorted set; a self-join contributes its table once.
///
/// # Examples
///
/// ```
/// use relcache::tables::extract_tables;
///
/// let tables = extract_tables("SELECT * FROM users JOIN orders ON orders.user_id = users.id");
/// assert!(tables.contains("users"));
/// assert!(tables.contains("orders"));
/// assert_eq!(tables.len(), 2);
/// ```
#[must_use]
pub fn extract_tables(sql: &str) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();
    let words: Vec<&str> = sql.split_whitespace().collect();

    for (i, word) in words.iter().enumerate() {
        let trigger = word.to_uppercase();
        let capture_at = match trigger.as_str() {
            "FROM" | "JOIN" | "INTO" | "UPDATE" => Some(i + 1),
            // TRUNCATE TABLE t is handled by the TABLE arm below.
            "TRUNCATE" => match words.get(i + 1) {
                Some(next) if next.eq_ignore_ascii_case("TABLE") => None,
                Some(_) => Some(i + 1),
                None => None,
            },
            "TABLE" => match words.get(i + 1) {
                // DROP TABLE IF EXISTS t
                Some(next) if next.eq_ignore_ascii_case("IF") => Some(i + 3),
                Some(_) => Some(i + 1),
                None => None,
            },
            _ => None,
        };

        if let Some(pos) = capture_at {
            if let Some(name) = words.get(pos).and_then(|tok| clean_identifier(tok)) {
                if !is_sql_keyword(&name.to_uppercase()) {
                    tables.insert(name);
                }
            }
        }
    }

    tables
}

/// Reduce a raw token to a table identifier, or reject it.
///
/// Strips the three quoting styles, leading parentheses, and anything from
/// the first structural character on (`(`, `)`, `,`, `;`), so `users(id,`
/// and `` `users`, `` both yield `users`. Tokens that do not start like an
/// identifier are rejected.
fn clean_identifier(token: &str) -> Option<String> {
    let unquoted: String =
        token.chars().filter(|c| !matches!(c, '`' | '"' | '[' | ']')).collect();
    let unwrapped = unquoted.trim_start_matches('(');
    let end = unwrapped
        .find(|c| matches!(c, '(' | ')' | ',' | ';'))
        .unwrap_or(unwrapped.len());
    let name = &unwrapped[..end];

    let first = name.chars().next()?;
    if first.is_alphabetic() || first == '_' {
        Some(name.to_lowercase())
    } else {
        None
    }
}

/// Words that can follow a trigger keyword without naming a table.
fn is_sql_keyword(word: &str) -> bool {
    matches!(
        word,
        "SELECT"
            | "FROM"
            | "WHERE"
            | "JOIN"
            | "INNER"
            | "LEFT"
            | "RIGHT"
            | "FULL"
            | "CROSS"
            | "OUTER"
            | "ON"
            | "USING"
            | "AS"
            | "AND"
            | "OR"
            | "NOT"
            | "NULL"
            | "IN"
            | "IS"
            | "IF"
            | "EXISTS"
            | "SET"
            | "VALUES"
            | "INTO"
            | "UPDATE"
            | "DELETE"
            | "INSERT"
            | "REPLACE"
            | "CREATE"
            | "ALTER"
            | "DROP"
            | "TRUNCATE"
            | "TABLE"
            | "INDEX"
            | "VIEW"
            | "ORDER"
            | "GROUP"
            | "BY"
            | "HAVING"
            | "LIMIT"
            | "OFFSET"
            | "UNION"
            | "ALL"
            | "DISTINCT"
            | "CASE"
            | "WHEN"
            | "THEN"
            | "ELSE"
            | "END"
            | "OF"
            | "ONLY"
            | "DEFAULT"
    )
}

/// Memoizing wrapper around [`extract_tables`].
///
/// The same statement text recurs heavily within a process, and extraction
/// is purely syntactic, so results are cached per exact input string for the
/// lifetime of this instance.
#[derive(Debug, Default)]
pub struct TableExtractor {
    memo: DashMap<String, BTreeSet<String>>,
}

impl TableExtractor {
    /// Create an extractor with an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the table set for a statement, consulting the memo first.
    #[must_use]
    pub fn extract(&self, sql: &str) -> BTreeSet<String> {
        if let Some(cached) = self.memo.get(sql) {
            return cached.clone();
        }
        let tables = extract_tables(sql);
        self.memo.insert(sql.to_string(), tables.clone());
        tables
    }

    /// Number of distinct statements memoized so far.
    #[must_use]
    pub fn memo_len(&self) -> usize {
        self.memo.len()
    }
}
