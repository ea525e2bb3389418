//! Queries, bound parameters, destinations, and SQL rendering

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use crate::executor::Row;

/// A bound parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl From<bool> for Param {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Param {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Param {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for Param {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Param {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Param {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Param {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Param {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Param>> From<Option<T>> for Param {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A statement with its ordered bound parameters
///
/// Built once with [`Query::new`] and [`Query::bind`]; read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    statement: String,
    params: Vec<Param>,
}

impl Query {
    /// Create a query with no parameters
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    /// Create a query from a statement and an already collected parameter list
    pub fn with_params(statement: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            statement: statement.into(),
            params,
        }
    }

    /// Bind the next positional parameter
    pub fn bind(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

/// Placeholder style used by a SQL dialect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    /// `?` positional placeholders (MySQL, SQLite)
    #[default]
    Question,
    /// `$1`, `$2`, ... numbered placeholders (PostgreSQL)
    Dollar,
}

/// Renders a statement with its parameters inlined
pub trait Dialect: Send + Sync {
    fn explain(&self, statement: &str, params: &[Param]) -> String;
}

/// Dialect rendering SQL-standard literals
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect {
    placeholder: Placeholder,
}

impl StandardDialect {
    pub fn new(placeholder: Placeholder) -> Self {
        Self { placeholder }
    }

    /// Render a parameter as a SQL literal
    pub fn literal(param: &Param) -> String {
        match param {
            Param::Null => "NULL".to_string(),
            Param::Bool(true) => "TRUE".to_string(),
            Param::Bool(false) => "FALSE".to_string(),
            Param::Int(v) => v.to_string(),
            Param::Float(v) => v.to_string(),
            Param::Text(v) => format!("'{}'", v.replace('\'', "''")),
            Param::Bytes(v) => format!("X'{}'", hex::encode(v)),
        }
    }
}

impl Dialect for StandardDialect {
    fn explain(&self, statement: &str, params: &[Param]) -> String {
        let mut out = String::with_capacity(statement.len() + params.len() * 8);
        let mut chars = statement.chars().peekable();
        let mut in_literal = false;
        let mut next = 0;

        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    in_literal = !in_literal;
                    out.push(c);
                }
                '?' if !in_literal && self.placeholder == Placeholder::Question => {
                    match params.get(next) {
                        Some(param) => out.push_str(&Self::literal(param)),
                        None => out.push(c),
                    }
                    next += 1;
                }
                '$' if !in_literal && self.placeholder == Placeholder::Dollar => {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    let param = digits
                        .parse::<usize>()
                        .ok()
                        .and_then(|n| n.checked_sub(1))
                        .and_then(|idx| params.get(idx));
                    match param {
                        Some(param) => out.push_str(&Self::literal(param)),
                        None => {
                            let _ = write!(out, "${digits}");
                        }
                    }
                }
                _ => out.push(c),
            }
        }

        out
    }
}

/// Shape of a query destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Single,
    Collection,
    /// Untyped column maps; never cached
    Rows,
}

impl Shape {
    pub fn is_cacheable(self) -> bool {
        matches!(self, Self::Single | Self::Collection)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Collection => "collection",
            Self::Rows => "rows",
        }
    }
}

/// Destination of a query: the template that execution or decoding fills in
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSet<R> {
    Single(R),
    Collection(Vec<R>),
    Rows(Vec<Row>),
}

impl<R> ResultSet<R> {
    pub fn shape(&self) -> Shape {
        match self {
            Self::Single(_) => Shape::Single,
            Self::Collection(_) => Shape::Collection,
            Self::Rows(_) => Shape::Rows,
        }
    }

    pub fn as_single(&self) -> Option<&R> {
        match self {
            Self::Single(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[R]> {
        match self {
            Self::Collection(records) => Some(records),
            _ => None,
        }
    }

    pub fn into_single(self) -> Option<R> {
        match self {
            Self::Single(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Vec<R>> {
        match self {
            Self::Collection(records) => Some(records),
            _ => None,
        }
    }
}

/// A query paired with the destination it should populate
#[derive(Debug, Clone)]
pub struct Statement<R> {
    query: Query,
    dest: ResultSet<R>,
    dry_run: bool,
}

impl<R: Default> Statement<R> {
    /// Fetch one record into a default-valued destination
    pub fn single(query: Query) -> Self {
        Self::with_dest(query, ResultSet::Single(R::default()))
    }

    /// Fetch an ordered collection of records
    pub fn collection(query: Query) -> Self {
        Self::with_dest(query, ResultSet::Collection(Vec::new()))
    }
}

impl<R> Statement<R> {
    /// Fetch raw column maps (never cached)
    pub fn rows(query: Query) -> Self {
        Self::with_dest(query, ResultSet::Rows(Vec::new()))
    }

    /// Use a caller-provided destination template
    pub fn with_dest(query: Query, dest: ResultSet<R>) -> Self {
        Self {
            query,
            dest,
            dry_run: false,
        }
    }

    /// Build the statement without executing it or touching the cache
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn dest(&self) -> &ResultSet<R> {
        &self.dest
    }

    pub fn dest_mut(&mut self) -> &mut ResultSet<R> {
        &mut self.dest
    }

    pub fn into_dest(self) -> ResultSet<R> {
        self.dest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_question_placeholders() {
        let dialect = StandardDialect::default();
        let sql = dialect.explain(
            "SELECT * FROM users WHERE name = ? AND age > ? AND active = ?",
            &["o'neil".into(), 30.into(), true.into()],
        );
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE name = 'o''neil' AND age > 30 AND active = TRUE"
        );
    }

    #[test]
    fn test_explain_skips_placeholders_inside_literals() {
        let dialect = StandardDialect::default();
        let sql = dialect.explain("SELECT '?' AS q, id FROM t WHERE id = ?", &[7.into()]);
        assert_eq!(sql, "SELECT '?' AS q, id FROM t WHERE id = 7");
    }

    #[test]
    fn test_explain_dollar_placeholders() {
        let dialect = StandardDialect::new(Placeholder::Dollar);
        let sql = dialect.explain(
            "SELECT * FROM pets WHERE owner = $2 AND name = $1 AND tag = $3",
            &["rex".into(), Param::Null],
        );
        assert_eq!(
            sql,
            "SELECT * FROM pets WHERE owner = NULL AND name = 'rex' AND tag = $3"
        );
    }

    #[test]
    fn test_explain_missing_params_left_in_place() {
        let dialect = StandardDialect::default();
        let sql = dialect.explain("SELECT ? , ?", &[Param::Bytes(vec![0xde, 0xad])]);
        assert_eq!(sql, "SELECT X'dead' , ?");
    }

    #[test]
    fn test_statement_destinations() {
        let stmt: Statement<u32> = Statement::single(Query::new("SELECT 1"));
        assert_eq!(stmt.dest().shape(), Shape::Single);
        assert!(!stmt.is_dry_run());

        let stmt: Statement<u32> = Statement::collection(Query::new("SELECT 1")).dry_run();
        assert_eq!(stmt.dest().shape(), Shape::Collection);
        assert!(stmt.is_dry_run());

        let stmt: Statement<u32> = Statement::rows(Query::new("SELECT 1"));
        assert!(!stmt.dest().shape().is_cacheable());
    }

    #[test]
    fn test_option_params() {
        let query = Query::new("SELECT ?, ?")
            .bind(Some("x"))
            .bind(None::<i64>);
        assert_eq!(query.params(), &[Param::Text("x".into()), Param::Null]);
    }
}
