//! Query templates: SQL text with positional `?` placeholders and the
//! ordered names of the values bound to them.

use crate::contract::{Row, Value};
use tracing::warn;

/// Anything parameter values can be read from by name
pub trait ParamSource: Sync {
    fn param(&self, name: &str) -> Option<Value>;
}

impl ParamSource for Row {
    fn param(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// SQL statement with named positional parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
    params: Vec<String>,
}

/// A statement ready to run: SQL plus bound values
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryTemplate {
    /// Parse SQL where parameters appear inline as `:name`
    ///
    /// Quoted literals and `::` casts are left untouched.
    pub fn parse(text: &str) -> Self {
        let chars: Vec<char> = text.trim().chars().collect();
        let mut sql = String::with_capacity(chars.len());
        let mut params = Vec::new();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                sql.push(c);
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' | '"' => {
                    quote = Some(c);
                    sql.push(c);
                    i += 1;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if chars.get(i + 1).is_some_and(|n| is_ident_start(*n)) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_ident_char(chars[end]) {
                        end += 1;
                    }
                    params.push(chars[start..end].iter().collect());
                    sql.push('?');
                    i = end;
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        Self { sql, params }
    }

    /// Template from SQL already using `?`, with explicit parameter names
    pub fn with_params(sql: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Split a block on `;` (outside quotes) into independently parsed
    /// statements; empty fragments are dropped
    pub fn split_statements(text: &str) -> Vec<Self> {
        let mut fragments = Vec::new();
        let mut current = String::new();
        let mut quote: Option<char> = None;

        for c in text.chars() {
            match quote {
                Some(q) => {
                    current.push(c);
                    if c == q {
                        quote = None;
                    }
                }
                None if c == '\'' || c == '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                None if c == ';' => fragments.push(std::mem::take(&mut current)),
                None => current.push(c),
            }
        }
        fragments.push(current);

        fragments
            .iter()
            .filter(|f| !f.trim().is_empty())
            .map(|f| Self::parse(f))
            .collect()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Resolve every parameter against `source`
    ///
    /// Missing or null values are bound as SQL NULL after a warning.
    pub fn bind(&self, source: &dyn ParamSource, owner: &str) -> Vec<Value> {
        self.params
            .iter()
            .map(|name| match source.param(name) {
                Some(value) if !value.is_null() => value,
                _ => {
                    warn!(owner, param = %name, "query parameter has no value, binding NULL");
                    Value::Null
                }
            })
            .collect()
    }

    pub fn bind_statement(&self, source: &dyn ParamSource, owner: &str) -> BoundStatement {
        BoundStatement {
            sql: self.sql.clone(),
            params: self.bind(source, owner),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
