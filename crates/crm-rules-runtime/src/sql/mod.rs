//! SQL rendering of predicates
//!
//! The predicate tree is query-language independent; this module renders it
//! into a `WHERE` fragment over the contacts table with positional bind
//! parameters.

mod renderer;
#[cfg(feature = "sqlx")]
pub mod sqlite;

pub use renderer::SqlRenderer;

use serde::{Deserialize, Serialize};

/// SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// MySQL / MariaDB, the host default
    #[default]
    MySql,
    /// SQLite
    Sqlite,
}

impl SqlDialect {
    /// Quote an identifier
    pub fn quote(&self, ident: &str) -> String {
        match self {
            SqlDialect::MySql => format!("`{}`", ident.replace('`', "``")),
            SqlDialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

/// Bind parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlParam {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<u64> for SqlParam {
    fn from(v: u64) -> Self {
        SqlParam::Int(v as i64)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Text(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Text(v)
    }
}

/// Rendered SQL with `?` placeholders and their parameters in order
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Number of `?` placeholders outside string literals
    pub fn placeholder_count(&self) -> usize {
        let mut count = 0;
        let mut in_literal = false;
        for c in self.sql.chars() {
            match c {
                '\'' => in_literal = !in_literal,
                '?' if !in_literal => count += 1,
                _ => {}
            }
        }
        count
    }
}

/// Escape `LIKE` metacharacters with a backslash
pub fn escape_like(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_quote() {
        assert_eq!(SqlDialect::MySql.quote("wp_posts"), "`wp_posts`");
        assert_eq!(SqlDialect::Sqlite.quote("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_placeholder_count_skips_literals() {
        let fragment = SqlFragment::new("a = ? AND b LIKE ? ESCAPE '\\' AND c = '?'");
        assert_eq!(fragment.placeholder_count(), 2);
    }
}
