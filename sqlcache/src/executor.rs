//! Query execution boundary and row scanning

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::QueryError;
use crate::model::{Field, Record};
use crate::query::{Query, ResultSet};

/// One result row: column name to value, in select-list order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// The relational data-access layer the cache sits in front of
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute the query now and return its rows
    async fn query(&self, query: &Query) -> Result<Vec<Row>, QueryError>;
}

/// Materialize rows into the destination, returning the number of records produced.
///
/// A single-record destination takes the first row only. Unknown columns are
/// ignored and SQL NULLs leave the field at its current value.
pub fn scan<R: Record>(rows: &[Row], dest: &mut ResultSet<R>) -> Result<u64, QueryError> {
    match dest {
        ResultSet::Single(record) => match rows.first() {
            Some(row) => {
                scan_row(row, record)?;
                Ok(1)
            }
            None => Ok(0),
        },
        ResultSet::Collection(records) => {
            let mut scanned = Vec::with_capacity(rows.len());
            for row in rows {
                let mut record = R::default();
                scan_row(row, &mut record)?;
                scanned.push(record);
            }
            *records = scanned;
            Ok(records.len() as u64)
        }
        ResultSet::Rows(out) => {
            *out = rows.to_vec();
            Ok(out.len() as u64)
        }
    }
}

fn scan_row<R: Record>(row: &Row, record: &mut R) -> Result<(), QueryError> {
    for (column, value) in row.iter() {
        if value.is_null() {
            continue;
        }
        let Some(field) = field_for_column::<R>(column) else {
            continue;
        };
        (field.set)(record, value.clone()).map_err(|err| QueryError::Scan {
            column: column.to_string(),
            message: err.to_string(),
        })?;
    }
    Ok(())
}

fn field_for_column<R: Record>(column: &str) -> Option<&'static Field<R>> {
    R::fields()
        .iter()
        .find(|field| field.column.eq_ignore_ascii_case(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Pet {
        id: u64,
        name: String,
        owner_id: Option<u64>,
    }

    record!(Pet {
        id,
        name as "pet_name",
        owner_id,
    });

    fn rows() -> Vec<Row> {
        vec![
            Row::new()
                .with("id", 1)
                .with("pet_name", "rex")
                .with("owner_id", 9),
            Row::new()
                .with("id", 2)
                .with("pet_name", "tom")
                .with("owner_id", Value::Null)
                .with("extra", "ignored"),
        ]
    }

    #[test]
    fn test_scan_collection() {
        let mut dest = ResultSet::<Pet>::Collection(Vec::new());
        let affected = scan(&rows(), &mut dest).unwrap();

        assert_eq!(affected, 2);
        let pets = dest.into_collection().unwrap();
        assert_eq!(pets[0].name, "rex");
        assert_eq!(pets[0].owner_id, Some(9));
        assert_eq!(pets[1].id, 2);
        assert_eq!(pets[1].owner_id, None);
    }

    #[test]
    fn test_scan_single_takes_first_row() {
        let mut dest = ResultSet::Single(Pet::default());
        assert_eq!(scan(&rows(), &mut dest).unwrap(), 1);
        assert_eq!(dest.as_single().unwrap().id, 1);

        let mut empty = ResultSet::Single(Pet::default());
        assert_eq!(scan(&[], &mut empty).unwrap(), 0);
        assert_eq!(empty.as_single(), Some(&Pet::default()));
    }

    #[test]
    fn test_scan_type_mismatch() {
        let bad = vec![Row::new().with("id", "not a number")];
        let mut dest = ResultSet::Single(Pet::default());
        let err = scan(&bad, &mut dest).unwrap_err();
        assert!(matches!(err, QueryError::Scan { column, .. } if column == "id"));
    }

    #[test]
    fn test_scan_raw_rows() {
        let mut dest = ResultSet::<Pet>::Rows(Vec::new());
        assert_eq!(scan(&rows(), &mut dest).unwrap(), 2);
        let ResultSet::Rows(out) = dest else {
            panic!("expected rows");
        };
        assert_eq!(out[1].get("extra"), Some(&Value::from("ignored")));
    }
}
